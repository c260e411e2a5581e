// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use tracing::debug;

use crate::error::PresentResult;
use crate::gpu::Gpu;
use crate::swapchain::Swapchain;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderTarget {
    pub view: vk::ImageView,
    pub framebuffer: vk::Framebuffer,
}

/// Render pass plus one framebuffer per swapchain image, for one generation.
#[derive(Debug)]
pub struct RenderTargetSet {
    render_pass: vk::RenderPass,
    targets: Vec<RenderTarget>,
    extent: vk::Extent2D,
    generation: u64,
}

impl RenderTargetSet {
    pub fn build<G: Gpu>(gpu: &G, chain: &Swapchain) -> PresentResult<Self> {
        let render_pass = gpu.create_render_pass(chain.format())?;
        let extent = chain.extent();

        let mut targets = Vec::with_capacity(chain.image_count());
        for &view in chain.image_views() {
            match gpu.create_framebuffer(render_pass, view, extent) {
                Ok(framebuffer) => targets.push(RenderTarget { view, framebuffer }),
                Err(e) => {
                    for t in targets {
                        gpu.destroy_framebuffer(t.framebuffer);
                    }
                    gpu.destroy_render_pass(render_pass);
                    return Err(e);
                }
            }
        }

        debug!(
            "render targets: {} framebuffers at {}x{} (generation {})",
            targets.len(),
            extent.width,
            extent.height,
            chain.generation()
        );
        Ok(Self {
            render_pass,
            targets,
            extent,
            generation: chain.generation(),
        })
    }

    #[inline]
    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RenderTarget> {
        self.targets.iter()
    }

    pub fn destroy<G: Gpu>(self, gpu: &G) {
        for t in &self.targets {
            gpu.destroy_framebuffer(t.framebuffer);
        }
        gpu.destroy_render_pass(self.render_pass);
    }
}
