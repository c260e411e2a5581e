// SPDX-License-Identifier: CEPL-1.0
//! The swapchain together with everything derived from it.
//!
//! STRICT ORDER:
//! - build:   swapchain → render targets → recorded commands
//! - rebuild: recorded commands ✗ → render targets ✗ → swapchain ⟳ → targets → commands
//! - destroy: recorded commands → render targets → swapchain

use ash::vk;

use crate::error::PresentResult;
use crate::gpu::{ChainHandle, Gpu};
use crate::recorder::CommandRecorder;
use crate::swapchain::{PresentModePreference, Swapchain, SwapchainManager};
use crate::targets::RenderTargetSet;
use crate::RenderSize;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChainSettings {
    pub present_mode: PresentModePreference,
    pub clear_color: [f32; 4],
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self {
            present_mode: PresentModePreference::Mailbox,
            clear_color: [0.02, 0.02, 0.04, 1.0],
        }
    }
}

#[derive(Debug)]
pub struct PresentationChain {
    swapchain: SwapchainManager,
    targets: Option<RenderTargetSet>,
    recorder: Option<CommandRecorder>,
    settings: ChainSettings,
}

impl PresentationChain {
    pub fn build<G: Gpu>(
        gpu: &G,
        desired: RenderSize,
        settings: ChainSettings,
    ) -> PresentResult<Self> {
        let swapchain = SwapchainManager::create(gpu, desired, settings.present_mode)?;
        let mut chain = Self {
            swapchain,
            targets: None,
            recorder: None,
            settings,
        };
        if let Err(e) = chain.build_dependents(gpu) {
            chain.destroy(gpu);
            return Err(e);
        }
        Ok(chain)
    }

    /// No swapchain yet. The frame scheduler builds it on the first frame the
    /// window has a drawable area.
    pub fn deferred(settings: ChainSettings) -> Self {
        Self {
            swapchain: SwapchainManager::deferred(settings.present_mode),
            targets: None,
            recorder: None,
            settings,
        }
    }

    fn build_dependents<G: Gpu>(&mut self, gpu: &G) -> PresentResult<()> {
        let Some(swapchain) = self.swapchain.current() else {
            return Ok(());
        };
        let targets = self.targets.insert(RenderTargetSet::build(gpu, swapchain)?);
        self.recorder = Some(CommandRecorder::record(
            gpu,
            targets,
            self.settings.clear_color,
        )?);
        Ok(())
    }

    fn teardown_dependents<G: Gpu>(&mut self, gpu: &G) {
        if let Some(recorder) = self.recorder.take() {
            recorder.destroy(gpu);
        }
        if let Some(targets) = self.targets.take() {
            targets.destroy(gpu);
        }
    }

    /// Steps (c)–(e) of recreation. The device must already be idle.
    pub fn rebuild<G: Gpu>(&mut self, gpu: &G, desired: RenderSize) -> PresentResult<()> {
        self.teardown_dependents(gpu);
        self.swapchain.recreate(gpu, desired)?;
        self.build_dependents(gpu)
    }

    /// Releases everything in reverse construction order. Idempotent.
    pub fn destroy<G: Gpu>(&mut self, gpu: &G) {
        self.teardown_dependents(gpu);
        self.swapchain.destroy(gpu);
    }

    #[inline]
    pub fn swapchain(&self) -> Option<&Swapchain> {
        self.swapchain.current()
    }

    #[inline]
    pub fn handle(&self) -> Option<&ChainHandle> {
        self.swapchain.current().map(Swapchain::handle)
    }

    #[inline]
    pub fn generation(&self) -> u64 {
        self.swapchain.generation()
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.swapchain.current().map_or(0, Swapchain::image_count)
    }

    #[inline]
    pub fn targets(&self) -> Option<&RenderTargetSet> {
        self.targets.as_ref()
    }

    #[inline]
    pub fn command_buffer(&self, image_index: usize) -> Option<vk::CommandBuffer> {
        self.recorder.as_ref()?.command_buffer(image_index)
    }
}
