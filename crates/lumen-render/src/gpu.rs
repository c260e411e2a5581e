// SPDX-License-Identifier: CEPL-1.0
//! The device seam. Handles are raw `ash::vk` values; ownership rules are
//! enforced by the components that create and destroy them.

use ash::vk;

use crate::error::PresentResult;

/// Owned swapchain handle. Not `Copy`: destroying it consumes the value, so a
/// retired chain cannot be released twice.
#[derive(Debug, PartialEq, Eq)]
pub struct ChainHandle(vk::SwapchainKHR);

impl ChainHandle {
    pub fn new(raw: vk::SwapchainKHR) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn raw(&self) -> vk::SwapchainKHR {
        self.0
    }
}

/// Everything the backend needs to build a chain; surface, usage and sharing
/// mode are the backend's concern.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapchainDesc {
    pub min_image_count: u32,
    pub surface_format: vk::SurfaceFormatKHR,
    pub extent: vk::Extent2D,
    pub present_mode: vk::PresentModeKHR,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GraphicsPipeline {
    pub layout: vk::PipelineLayout,
    pub pipeline: vk::Pipeline,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// The image is usable. `suboptimal` alone never forces recreation.
    Ready { index: u32, suboptimal: bool },
    OutOfDate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentOutcome {
    Optimal,
    Suboptimal,
    OutOfDate,
}

/// Device, queues and surface as seen by the presentation core.
///
/// Fatal results from `acquire_next_image`, `submit` and `present` must be
/// reported as [`PresentError::PresentationFailure`](crate::PresentError).
pub trait Gpu {
    fn surface_capabilities(&self) -> PresentResult<vk::SurfaceCapabilitiesKHR>;
    fn surface_formats(&self) -> PresentResult<Vec<vk::SurfaceFormatKHR>>;
    fn surface_present_modes(&self) -> PresentResult<Vec<vk::PresentModeKHR>>;

    /// `retired` is a creation hint only; the caller still owns and releases it.
    fn create_swapchain(
        &self,
        desc: &SwapchainDesc,
        retired: Option<&ChainHandle>,
    ) -> PresentResult<ChainHandle>;
    fn swapchain_images(&self, chain: &ChainHandle) -> PresentResult<Vec<vk::Image>>;
    fn destroy_swapchain(&self, chain: ChainHandle);

    fn create_image_view(&self, image: vk::Image, format: vk::Format)
        -> PresentResult<vk::ImageView>;
    fn destroy_image_view(&self, view: vk::ImageView);

    fn create_render_pass(&self, format: vk::Format) -> PresentResult<vk::RenderPass>;
    fn destroy_render_pass(&self, render_pass: vk::RenderPass);
    fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        view: vk::ImageView,
        extent: vk::Extent2D,
    ) -> PresentResult<vk::Framebuffer>;
    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer);
    fn create_pipeline(
        &self,
        render_pass: vk::RenderPass,
        extent: vk::Extent2D,
    ) -> PresentResult<GraphicsPipeline>;
    fn destroy_pipeline(&self, pipeline: GraphicsPipeline);

    fn allocate_command_buffers(&self, count: u32) -> PresentResult<Vec<vk::CommandBuffer>>;
    fn free_command_buffers(&self, buffers: &[vk::CommandBuffer]);
    fn begin_commands(&self, cmd: vk::CommandBuffer) -> PresentResult<()>;
    fn cmd_begin_render_pass(
        &self,
        cmd: vk::CommandBuffer,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        clear: [f32; 4],
    );
    fn cmd_bind_pipeline(&self, cmd: vk::CommandBuffer, pipeline: &GraphicsPipeline);
    fn cmd_draw(&self, cmd: vk::CommandBuffer, vertex_count: u32, instance_count: u32);
    fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer);
    fn end_commands(&self, cmd: vk::CommandBuffer) -> PresentResult<()>;

    fn create_fence(&self, signaled: bool) -> PresentResult<vk::Fence>;
    fn destroy_fence(&self, fence: vk::Fence);
    fn create_semaphore(&self) -> PresentResult<vk::Semaphore>;
    fn destroy_semaphore(&self, semaphore: vk::Semaphore);
    /// Blocks without timeout.
    fn wait_fence(&self, fence: vk::Fence) -> PresentResult<()>;
    fn reset_fence(&self, fence: vk::Fence) -> PresentResult<()>;

    fn acquire_next_image(
        &self,
        chain: &ChainHandle,
        signal: vk::Semaphore,
    ) -> PresentResult<AcquireOutcome>;
    fn submit(
        &self,
        cmd: vk::CommandBuffer,
        wait: vk::Semaphore,
        wait_stage: vk::PipelineStageFlags,
        signal: vk::Semaphore,
        fence: vk::Fence,
    ) -> PresentResult<()>;
    fn present(
        &self,
        chain: &ChainHandle,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> PresentResult<PresentOutcome>;

    fn wait_idle(&self) -> PresentResult<()>;
}
