// SPDX-License-Identifier: CEPL-1.0
//! Instance, physical device and logical device bring-up.

use std::ffi::{c_char, CStr, CString};

use anyhow::{Context, Result};
use ash::khr::{surface, swapchain};
use ash::{vk, Entry, Instance};
use lumen_render::PresentError;
use raw_window_handle::RawDisplayHandle;
use tracing::{info, warn};

use crate::diagnostics::{DeviceConfig, VALIDATION_LAYER};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilies {
    #[inline]
    pub fn shared(&self) -> bool {
        self.graphics == self.present
    }

    /// Distinct family indices, graphics first.
    pub fn unique(&self) -> Vec<u32> {
        if self.shared() {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }
}

/// Picks a graphics family and a present-capable family, preferring one
/// family that does both.
pub fn select_queue_families(
    props: &[vk::QueueFamilyProperties],
    supports_present: impl Fn(u32) -> bool,
) -> Option<QueueFamilies> {
    let graphics: Vec<u32> = props
        .iter()
        .enumerate()
        .filter(|(_, p)| p.queue_count > 0 && p.queue_flags.contains(vk::QueueFlags::GRAPHICS))
        .map(|(i, _)| i as u32)
        .collect();

    if let Some(&both) = graphics.iter().find(|&&i| supports_present(i)) {
        return Some(QueueFamilies {
            graphics: both,
            present: both,
        });
    }
    let present = (0..props.len() as u32)
        .find(|&i| props[i as usize].queue_count > 0 && supports_present(i))?;
    Some(QueueFamilies {
        graphics: *graphics.first()?,
        present,
    })
}

fn layer_available(entry: &Entry, name: &CStr) -> bool {
    // SAFETY: plain enumeration call on a loaded entry.
    match unsafe { entry.enumerate_instance_layer_properties() } {
        Ok(layers) => layers
            .iter()
            .any(|l| l.layer_name_as_c_str().is_ok_and(|n| n == name)),
        Err(_) => false,
    }
}

/// Returns the instance and whether validation was actually enabled.
pub unsafe fn create_instance(
    entry: &Entry,
    display_raw: RawDisplayHandle,
    config: &DeviceConfig,
) -> Result<(Instance, bool)> {
    let app_name = CString::new(config.app_name.as_str()).context("app_name contains NUL")?;
    let app_info = vk::ApplicationInfo {
        p_application_name: app_name.as_ptr(),
        application_version: 0,
        p_engine_name: c"lumen".as_ptr(),
        engine_version: 0,
        api_version: vk::API_VERSION_1_0,
        ..Default::default()
    };

    let mut extensions: Vec<*const c_char> = ash_window::enumerate_required_extensions(display_raw)
        .context("enumerate_required_extensions")?
        .to_vec();

    let validation = config.validation && layer_available(entry, VALIDATION_LAYER);
    if config.validation && !validation {
        warn!("validation requested but VK_LAYER_KHRONOS_validation is not installed");
    }
    let layers: Vec<*const c_char> = if validation {
        extensions.push(ash::ext::debug_utils::NAME.as_ptr());
        vec![VALIDATION_LAYER.as_ptr()]
    } else {
        Vec::new()
    };

    let create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_extension_names(&extensions)
        .enabled_layer_names(&layers);

    let instance = unsafe { entry.create_instance(&create_info, None) }.context("create_instance")?;
    info!(
        "Vulkan instance ready ({} extensions, validation = {validation})",
        extensions.len()
    );
    Ok((instance, validation))
}

fn supports_swapchain(instance: &Instance, phys: vk::PhysicalDevice) -> bool {
    // SAFETY: `phys` was enumerated from `instance`.
    match unsafe { instance.enumerate_device_extension_properties(phys) } {
        Ok(exts) => exts
            .iter()
            .any(|e| e.extension_name_as_c_str().is_ok_and(|n| n == swapchain::NAME)),
        Err(_) => false,
    }
}

/// First device with swapchain support and usable queues; discrete GPUs first.
pub unsafe fn pick_device(
    instance: &Instance,
    surface_loader: &surface::Instance,
    surface: vk::SurfaceKHR,
) -> Result<(vk::PhysicalDevice, QueueFamilies)> {
    let mut devices = unsafe { instance.enumerate_physical_devices() }
        .context("enumerate_physical_devices")?;
    devices.sort_by_key(|&phys| {
        let props = unsafe { instance.get_physical_device_properties(phys) };
        props.device_type != vk::PhysicalDeviceType::DISCRETE_GPU
    });

    for phys in devices {
        if !supports_swapchain(instance, phys) {
            continue;
        }
        let props = unsafe { instance.get_physical_device_queue_family_properties(phys) };
        let families = select_queue_families(&props, |i| unsafe {
            surface_loader
                .get_physical_device_surface_support(phys, i, surface)
                .unwrap_or(false)
        });
        if let Some(families) = families {
            let props = unsafe { instance.get_physical_device_properties(phys) };
            info!(
                "physical device: {} (graphics family {}, present family {})",
                props
                    .device_name_as_c_str()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                families.graphics,
                families.present
            );
            return Ok((phys, families));
        }
    }
    Err(PresentError::NoSuitableQueue.into())
}

pub unsafe fn create_device(
    instance: &Instance,
    phys: vk::PhysicalDevice,
    families: QueueFamilies,
) -> Result<ash::Device> {
    let priorities = [1.0_f32];
    let queue_infos: Vec<vk::DeviceQueueCreateInfo> = families
        .unique()
        .into_iter()
        .map(|family| {
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(family)
                .queue_priorities(&priorities)
        })
        .collect();

    let device_exts = [swapchain::NAME.as_ptr()];
    let dinfo = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_infos)
        .enabled_extension_names(&device_exts);

    unsafe { instance.create_device(phys, &dinfo, None) }.context("create_device")
}
