// SPDX-License-Identifier: CEPL-1.0
//! Desktop window on winit, driven by pumping rather than `run_app` so the
//! presentation loop keeps control of the thread.

use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use lumen_render::{RenderSize, WindowProvider};
use tracing::{debug, info};
use winit::{
    application::ApplicationHandler,
    dpi::{LogicalSize, PhysicalSize},
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    platform::pump_events::{EventLoopExtPumpEvents, PumpStatus},
    raw_window_handle::{
        DisplayHandle, HandleError, HasDisplayHandle, HasWindowHandle, WindowHandle,
    },
    window::{Window, WindowId},
};

pub use winit;

const STARTUP_PUMPS: usize = 64;
const STARTUP_PUMP_TIMEOUT: Duration = Duration::from_millis(16);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WindowSettings {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            title: "lumen".to_owned(),
            width: 800,
            height: 600,
        }
    }
}

/// What the presentation core reads back from the event stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct WindowFlags {
    size: RenderSize,
    close: bool,
    resized: bool,
}

impl WindowFlags {
    fn apply(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                if !self.close {
                    info!("CloseRequested");
                }
                self.close = true;
            }
            WindowEvent::Resized(PhysicalSize { width, height }) => {
                let size = RenderSize::new(*width, *height);
                if size != self.size {
                    debug!("Resized → {}x{}", width, height);
                    self.size = size;
                    self.resized = true;
                }
            }
            _ => {}
        }
    }
}

struct WindowState {
    settings: WindowSettings,
    window: Option<Window>,
    flags: WindowFlags,
    create_error: Option<String>,
}

impl ApplicationHandler for WindowState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        event_loop.set_control_flow(ControlFlow::Wait);
        if self.window.is_some() {
            return;
        }
        let attrs = Window::default_attributes()
            .with_title(self.settings.title.as_str())
            .with_inner_size(LogicalSize::new(
                self.settings.width as f64,
                self.settings.height as f64,
            ));
        match event_loop.create_window(attrs) {
            Ok(window) => {
                let size = window.inner_size();
                self.flags.size = RenderSize::new(size.width, size.height);
                info!("window created ({}x{})", size.width, size.height);
                self.window = Some(window);
            }
            Err(e) => self.create_error = Some(e.to_string()),
        }
    }

    fn window_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if let Some(window) = &self.window {
            if window_id != window.id() {
                return;
            }
        }
        self.flags.apply(&event);
    }
}

pub struct DesktopWindow {
    state: WindowState,
    event_loop: EventLoop<()>,
}

impl DesktopWindow {
    /// Creates the event loop and pumps it until the window exists.
    pub fn new(settings: WindowSettings) -> Result<Self> {
        let mut event_loop = EventLoop::new().map_err(|e| anyhow!("create event loop: {e}"))?;
        let mut state = WindowState {
            settings,
            window: None,
            flags: WindowFlags {
                size: RenderSize::new(0, 0),
                close: false,
                resized: false,
            },
            create_error: None,
        };

        for _ in 0..STARTUP_PUMPS {
            if let PumpStatus::Exit(code) =
                event_loop.pump_app_events(Some(STARTUP_PUMP_TIMEOUT), &mut state)
            {
                bail!("event loop exited during startup (code {code})");
            }
            if let Some(e) = state.create_error.take() {
                return Err(anyhow!("create_window: {e}"));
            }
            if state.window.is_some() {
                // The initial size is not a resize.
                state.flags.resized = false;
                return Ok(Self { state, event_loop });
            }
        }
        bail!("window was not created after {STARTUP_PUMPS} event pumps")
    }

    #[inline]
    pub fn window(&self) -> Option<&Window> {
        self.state.window.as_ref()
    }

    fn pump(&mut self, timeout: Option<Duration>) {
        if let PumpStatus::Exit(_) = self.event_loop.pump_app_events(timeout, &mut self.state) {
            self.state.flags.close = true;
        }
    }
}

impl WindowProvider for DesktopWindow {
    fn framebuffer_size(&self) -> RenderSize {
        self.state.flags.size
    }

    fn close_requested(&self) -> bool {
        self.state.flags.close
    }

    fn resize_pending(&self) -> bool {
        self.state.flags.resized
    }

    fn clear_resize(&mut self) {
        self.state.flags.resized = false;
    }

    fn pump_events(&mut self) {
        self.pump(Some(Duration::ZERO));
    }

    fn wait_events(&mut self) {
        self.pump(None);
    }
}

impl HasWindowHandle for DesktopWindow {
    fn window_handle(&self) -> Result<WindowHandle<'_>, HandleError> {
        self.window().ok_or(HandleError::Unavailable)?.window_handle()
    }
}

impl HasDisplayHandle for DesktopWindow {
    fn display_handle(&self) -> Result<DisplayHandle<'_>, HandleError> {
        self.window().ok_or(HandleError::Unavailable)?.display_handle()
    }
}
