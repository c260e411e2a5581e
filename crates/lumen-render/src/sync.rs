// SPDX-License-Identifier: CEPL-1.0
//! Per-frame synchronization objects.
//!
//! ```text
//! 1. wait frame_complete            (host waits for this slot's last use)
//! 2. acquire → image_available      (presentation engine → queue)
//! 3. submit: wait image_available @ COLOR_ATTACHMENT_OUTPUT
//!            signal render_finished + frame_complete
//! 4. present: wait render_finished
//! ```
//!
//! Slots are created once and never touched by swapchain recreation.

use std::fmt;

use ash::vk;
use tracing::debug;

use crate::error::PresentResult;
use crate::gpu::Gpu;

/// Index of a slot in the frames-in-flight ring.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SlotId(pub usize);

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot {}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameSlot {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    /// Created signaled so the first throttle wait returns immediately.
    pub frame_complete: vk::Fence,
}

impl FrameSlot {
    pub fn new<G: Gpu>(gpu: &G) -> PresentResult<Self> {
        let image_available = gpu.create_semaphore()?;
        let render_finished = match gpu.create_semaphore() {
            Ok(s) => s,
            Err(e) => {
                gpu.destroy_semaphore(image_available);
                return Err(e);
            }
        };
        let frame_complete = match gpu.create_fence(true) {
            Ok(f) => f,
            Err(e) => {
                gpu.destroy_semaphore(render_finished);
                gpu.destroy_semaphore(image_available);
                return Err(e);
            }
        };
        Ok(Self {
            image_available,
            render_finished,
            frame_complete,
        })
    }

    pub fn destroy<G: Gpu>(self, gpu: &G) {
        gpu.destroy_fence(self.frame_complete);
        gpu.destroy_semaphore(self.render_finished);
        gpu.destroy_semaphore(self.image_available);
    }
}

/// Creates `count` slots, releasing the partial ring on failure.
pub fn create_slots<G: Gpu>(gpu: &G, count: usize) -> PresentResult<Vec<FrameSlot>> {
    let mut slots = Vec::with_capacity(count);
    for i in 0..count {
        match FrameSlot::new(gpu) {
            Ok(slot) => {
                debug!("created frame sync for {}", SlotId(i));
                slots.push(slot);
            }
            Err(e) => {
                for slot in slots {
                    slot.destroy(gpu);
                }
                return Err(e);
            }
        }
    }
    Ok(slots)
}

/// Which slot last submitted work against each swapchain image.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImageFenceTrack {
    owners: Vec<Option<SlotId>>,
}

impl ImageFenceTrack {
    pub fn new(image_count: usize) -> Self {
        Self {
            owners: vec![None; image_count],
        }
    }

    /// Drops every claim and matches the new image count.
    pub fn reset(&mut self, image_count: usize) {
        self.owners.clear();
        self.owners.resize(image_count, None);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.owners.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    #[inline]
    pub fn owner(&self, image_index: usize) -> Option<SlotId> {
        self.owners.get(image_index).copied().flatten()
    }

    /// Marks `slot` as the user of `image_index`, returning the previous user.
    pub fn claim(&mut self, image_index: usize, slot: SlotId) -> Option<SlotId> {
        self.owners[image_index].replace(slot)
    }
}
