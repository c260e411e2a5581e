// SPDX-License-Identifier: CEPL-1.0
//! Frames-in-flight scheduling and swapchain recreation.
//!
//! One call to [`FrameScheduler::draw_frame`] runs a whole frame:
//!
//! ```text
//! throttle  wait slot.frame_complete
//! acquire   → image_index        (out of date: rebuild, abandon frame)
//! ownership wait the fence of whichever slot last used image_index
//! submit    reset frame_complete, wait image_available, signal render_finished
//! present   wait render_finished (out of date / suboptimal + resize: rebuild)
//! advance   slot = (slot + 1) % frames_in_flight
//! ```
//!
//! The fence is reset immediately before submission and never earlier, so an
//! abandoned frame leaves its slot signaled and the next throttle wait returns.

use ash::vk;
use tracing::{debug, info, warn};

use crate::chain::PresentationChain;
use crate::error::{PresentError, PresentResult};
use crate::gpu::{AcquireOutcome, Gpu, PresentOutcome};
use crate::sync::{create_slots, FrameSlot, ImageFenceTrack, SlotId};
use crate::window::WindowProvider;

/// What happened to the frame a `draw_frame` call attempted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStatus {
    Presented { image_index: u32 },
    /// Presented, then the chain was rebuilt because the present reported it stale.
    PresentedAndRecreated { image_index: u32 },
    /// Acquire reported the chain out of date. Nothing was submitted and the
    /// frame counter did not move.
    Abandoned,
    /// Close was requested while waiting for the window to become drawable.
    Cancelled,
}

#[derive(Debug)]
pub struct FrameScheduler {
    slots: Vec<FrameSlot>,
    current: usize,
    image_owners: ImageFenceTrack,
}

impl FrameScheduler {
    pub fn new<G: Gpu>(
        gpu: &G,
        frames_in_flight: usize,
        image_count: usize,
    ) -> PresentResult<Self> {
        let frames_in_flight = frames_in_flight.max(1);
        let slots = create_slots(gpu, frames_in_flight)?;
        info!("frames in flight: {frames_in_flight}, swapchain images: {image_count}");
        Ok(Self {
            slots,
            current: 0,
            image_owners: ImageFenceTrack::new(image_count),
        })
    }

    #[inline]
    pub fn current_slot(&self) -> SlotId {
        SlotId(self.current)
    }

    #[inline]
    pub fn frames_in_flight(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn image_owners(&self) -> &ImageFenceTrack {
        &self.image_owners
    }

    pub fn draw_frame<G: Gpu, W: WindowProvider>(
        &mut self,
        gpu: &G,
        chain: &mut PresentationChain,
        window: &mut W,
    ) -> PresentResult<FrameStatus> {
        if window.resize_pending() || chain.handle().is_none() {
            debug!("resize pending at frame start");
            if !self.recreate(gpu, chain, window)? {
                return Ok(FrameStatus::Cancelled);
            }
        }

        let slot_id = self.current_slot();
        let slot = self.slots[self.current];

        gpu.wait_fence(slot.frame_complete)?;

        let Some(handle) = chain.handle() else {
            return Err(PresentError::SurfaceStale);
        };
        let image_index = match gpu.acquire_next_image(handle, slot.image_available)? {
            AcquireOutcome::Ready { index, suboptimal } => {
                if suboptimal {
                    debug!("acquire reported suboptimal; keeping the chain");
                }
                index
            }
            AcquireOutcome::OutOfDate => {
                debug!("acquire reported out of date on {slot_id}; abandoning frame");
                return Ok(if self.recreate(gpu, chain, window)? {
                    FrameStatus::Abandoned
                } else {
                    FrameStatus::Cancelled
                });
            }
        };
        let image = image_index as usize;
        let cmd = chain
            .command_buffer(image)
            .ok_or(PresentError::PresentationFailure {
                op: "acquire_next_image",
                result: vk::Result::ERROR_UNKNOWN,
            })?;

        if let Some(owner) = self.image_owners.owner(image) {
            if owner != slot_id {
                gpu.wait_fence(self.slots[owner.0].frame_complete)?;
            }
        }
        self.image_owners.claim(image, slot_id);

        gpu.reset_fence(slot.frame_complete)?;
        gpu.submit(
            cmd,
            slot.image_available,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            slot.render_finished,
            slot.frame_complete,
        )?;

        let stale = match gpu.present(handle, image_index, slot.render_finished)? {
            PresentOutcome::Optimal => false,
            PresentOutcome::Suboptimal => window.resize_pending(),
            PresentOutcome::OutOfDate => true,
        };

        self.current = (self.current + 1) % self.slots.len();

        if !stale {
            return Ok(FrameStatus::Presented { image_index });
        }
        debug!("present reported a stale chain after image {image_index}");
        if self.recreate(gpu, chain, window)? {
            Ok(FrameStatus::PresentedAndRecreated { image_index })
        } else {
            Ok(FrameStatus::Cancelled)
        }
    }

    /// Rebuilds the chain for the current window size.
    ///
    /// Blocks on window events while the framebuffer has zero area. Returns
    /// `Ok(false)` without touching the chain if close is requested meanwhile.
    pub fn recreate<G: Gpu, W: WindowProvider>(
        &mut self,
        gpu: &G,
        chain: &mut PresentationChain,
        window: &mut W,
    ) -> PresentResult<bool> {
        let mut deferred = false;
        let size = loop {
            let size = window.framebuffer_size();
            if !size.is_zero_area() {
                break size;
            }
            if window.close_requested() {
                info!("close requested while minimized; recreation cancelled");
                return Ok(false);
            }
            if !deferred {
                info!("window has zero area; deferring swapchain recreation");
                deferred = true;
            }
            window.wait_events();
        };

        gpu.wait_idle()?;
        if let Err(e) = chain.rebuild(gpu, size) {
            warn!("swapchain recreation failed: {e}");
            return Err(e);
        }
        self.image_owners.reset(chain.image_count());
        window.clear_resize();

        info!(
            "swapchain recreated at {}x{} (generation {}, {} images)",
            size.width,
            size.height,
            chain.generation(),
            chain.image_count()
        );
        Ok(true)
    }

    /// The device must be idle.
    pub fn destroy<G: Gpu>(self, gpu: &G) {
        for slot in self.slots {
            slot.destroy(gpu);
        }
    }
}
