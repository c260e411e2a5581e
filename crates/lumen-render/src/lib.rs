// SPDX-License-Identifier: CEPL-1.0
//! Backend-neutral swapchain lifecycle and frame pacing.
//!
//! The device is reached through [`Gpu`] and the window through
//! [`WindowProvider`]; everything in between (chain creation, render targets,
//! command recording, frame scheduling, recreation, the presentation loop)
//! lives here and is driven from a single control thread.

pub mod chain;
pub mod error;
pub mod gpu;
pub mod presentation;
pub mod recorder;
pub mod scheduler;
pub mod swapchain;
pub mod sync;
pub mod targets;
pub mod window;

#[cfg(test)]
pub(crate) mod testing;

pub use chain::{ChainSettings, PresentationChain};
pub use error::{ErrorKind, PresentError, PresentResult};
pub use gpu::{AcquireOutcome, ChainHandle, Gpu, GraphicsPipeline, PresentOutcome, SwapchainDesc};
pub use presentation::{LoopState, PresentationLoop};
pub use recorder::CommandRecorder;
pub use scheduler::{FrameScheduler, FrameStatus};
pub use swapchain::{PresentModePreference, Swapchain, SwapchainManager};
pub use sync::{FrameSlot, ImageFenceTrack, SlotId};
pub use targets::{RenderTarget, RenderTargetSet};
pub use window::WindowProvider;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A minimized window reports a zero dimension.
    pub fn is_zero_area(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}
