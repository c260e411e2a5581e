// SPDX-License-Identifier: CEPL-1.0
//! Validation-layer messages, routed to a caller-supplied sink.

use std::ffi::{c_void, CStr};

use ash::ext::debug_utils as ext_debug;
use ash::{vk, Entry, Instance};

pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum DiagnosticSeverity {
    Verbose,
    Info,
    Warning,
    Error,
}

impl From<vk::DebugUtilsMessageSeverityFlagsEXT> for DiagnosticSeverity {
    fn from(flags: vk::DebugUtilsMessageSeverityFlagsEXT) -> Self {
        if flags.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
            DiagnosticSeverity::Error
        } else if flags.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
            DiagnosticSeverity::Warning
        } else if flags.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
            DiagnosticSeverity::Info
        } else {
            DiagnosticSeverity::Verbose
        }
    }
}

/// Receives every message the validation layer emits.
pub type DiagnosticsSink = Box<dyn Fn(DiagnosticSeverity, &str) + Send + Sync>;

/// Explicit device setup options.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceConfig {
    pub app_name: String,
    /// Enable the Khronos validation layer and the debug messenger.
    pub validation: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            app_name: "lumen".to_owned(),
            validation: false,
        }
    }
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    user: *mut c_void,
) -> vk::Bool32 {
    if data.is_null() || user.is_null() {
        return vk::FALSE;
    }
    // SAFETY: `user` is the boxed sink registered in `Messenger::new`, which
    // outlives the messenger; `data` is valid for the duration of the call.
    let (sink, msg) = unsafe {
        let sink = &*(user as *const DiagnosticsSink);
        let p_message = (*data).p_message;
        if p_message.is_null() {
            return vk::FALSE;
        }
        (sink, CStr::from_ptr(p_message))
    };
    sink(severity.into(), &msg.to_string_lossy());
    vk::FALSE
}

/// Debug-utils messenger plus the sink it calls into.
pub(crate) struct Messenger {
    loader: ext_debug::Instance,
    handle: vk::DebugUtilsMessengerEXT,
    // Boxed twice so the callback gets a thin pointer with a stable address.
    _sink: Box<DiagnosticsSink>,
}

impl Messenger {
    pub(crate) unsafe fn new(
        entry: &Entry,
        instance: &Instance,
        sink: DiagnosticsSink,
    ) -> Result<Self, vk::Result> {
        let sink = Box::new(sink);
        let loader = ext_debug::Instance::new(entry, instance);
        let ci = vk::DebugUtilsMessengerCreateInfoEXT {
            message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            pfn_user_callback: Some(debug_callback),
            p_user_data: &*sink as *const DiagnosticsSink as *mut c_void,
            ..Default::default()
        };
        let handle = unsafe { loader.create_debug_utils_messenger(&ci, None)? };
        Ok(Self {
            loader,
            handle,
            _sink: sink,
        })
    }

    /// Must run before the instance is destroyed.
    pub(crate) unsafe fn destroy(&self) {
        unsafe { self.loader.destroy_debug_utils_messenger(self.handle, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;
    use std::sync::{Arc, Mutex};

    #[test]
    fn severity_maps_to_most_severe_bit() {
        type F = vk::DebugUtilsMessageSeverityFlagsEXT;
        assert_eq!(DiagnosticSeverity::from(F::ERROR | F::WARNING), DiagnosticSeverity::Error);
        assert_eq!(DiagnosticSeverity::from(F::WARNING), DiagnosticSeverity::Warning);
        assert_eq!(DiagnosticSeverity::from(F::INFO), DiagnosticSeverity::Info);
        assert_eq!(DiagnosticSeverity::from(F::VERBOSE), DiagnosticSeverity::Verbose);
    }

    #[test]
    fn callback_forwards_message_to_sink() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&seen);
        let sink: DiagnosticsSink = Box::new(move |severity, msg| {
            captured.lock().unwrap().push((severity, msg.to_owned()));
        });
        let boxed = Box::new(sink);
        let text = CString::new("vkQueueSubmit: fence already in use").unwrap();
        let data = vk::DebugUtilsMessengerCallbackDataEXT {
            p_message: text.as_ptr(),
            ..Default::default()
        };

        let ret = unsafe {
            debug_callback(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING,
                vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION,
                &data,
                &*boxed as *const DiagnosticsSink as *mut c_void,
            )
        };

        assert_eq!(ret, vk::FALSE);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![(
                DiagnosticSeverity::Warning,
                "vkQueueSubmit: fence already in use".to_owned()
            )]
        );
    }

    #[test]
    fn callback_ignores_missing_sink() {
        let data = vk::DebugUtilsMessengerCallbackDataEXT::default();
        let ret = unsafe {
            debug_callback(
                vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL,
                &data,
                std::ptr::null_mut(),
            )
        };
        assert_eq!(ret, vk::FALSE);
    }
}
