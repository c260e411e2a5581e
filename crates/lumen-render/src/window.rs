// SPDX-License-Identifier: CEPL-1.0
use crate::RenderSize;

/// What the presentation core needs from the windowing layer.
pub trait WindowProvider {
    /// Current drawable size in physical pixels; zero while minimized.
    fn framebuffer_size(&self) -> RenderSize;
    fn close_requested(&self) -> bool;
    /// Edge-triggered: stays set until [`clear_resize`](Self::clear_resize).
    fn resize_pending(&self) -> bool;
    fn clear_resize(&mut self);
    /// Dispatches queued events without blocking. Called once per loop tick.
    fn pump_events(&mut self);
    /// Blocks until at least one event arrives.
    fn wait_events(&mut self);
}
