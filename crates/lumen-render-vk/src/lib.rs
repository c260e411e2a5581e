// SPDX-License-Identifier: CEPL-1.0
//! ash-backed [`Gpu`]: instance, surface, device, queues and a command pool.

#![deny(unsafe_op_in_unsafe_fn)]

mod diagnostics;
mod pipeline;
mod setup;

use anyhow::{Context, Result};
use ash::khr::{surface, swapchain};
use ash::{vk, Entry, Instance};
use lumen_render::{
    AcquireOutcome, ChainHandle, Gpu, GraphicsPipeline, PresentError, PresentOutcome,
    PresentResult, SwapchainDesc,
};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{info, warn};

pub use diagnostics::{DeviceConfig, DiagnosticSeverity, DiagnosticsSink};
pub use setup::{select_queue_families, QueueFamilies};

use diagnostics::Messenger;

// STRICT TEARDOWN ORDER (Drop):
// - device_wait_idle()
// - command pool → device
// - surface → debug messenger → instance
pub struct SurfaceContext {
    _entry: Entry,
    instance: Instance,
    messenger: Option<Messenger>,
    surface_loader: surface::Instance,
    surface: vk::SurfaceKHR,

    phys: vk::PhysicalDevice,
    device: ash::Device,
    families: QueueFamilies,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,

    swapchain_loader: swapchain::Device,
    cmd_pool: vk::CommandPool,
}

impl SurfaceContext {
    /// Brings up everything needed to present to `window`.
    ///
    /// `sink` receives validation messages when `config.validation` is set and
    /// the layer is installed.
    pub fn new<W>(
        window: &W,
        config: &DeviceConfig,
        sink: Option<DiagnosticsSink>,
    ) -> Result<Self>
    where
        W: HasWindowHandle + HasDisplayHandle,
    {
        // SAFETY: every handle created here is owned by the returned value and
        // destroyed in `Drop`; partial failures release what was created.
        unsafe { Self::build(window, config, sink) }
    }

    unsafe fn build<W>(
        window: &W,
        config: &DeviceConfig,
        sink: Option<DiagnosticsSink>,
    ) -> Result<Self>
    where
        W: HasWindowHandle + HasDisplayHandle,
    {
        let entry = unsafe { Entry::load() }.context("load Vulkan loader")?;

        let dh = window.display_handle()?.as_raw();
        let wh = window.window_handle()?.as_raw();

        let (instance, validation) = unsafe { setup::create_instance(&entry, dh, config)? };

        let messenger = match (validation, sink) {
            (true, Some(sink)) => match unsafe { Messenger::new(&entry, &instance, sink) } {
                Ok(m) => Some(m),
                Err(e) => {
                    warn!("debug messenger unavailable: {e:?}");
                    None
                }
            },
            _ => None,
        };

        let destroy_instance = |messenger: &Option<Messenger>| unsafe {
            if let Some(m) = messenger {
                m.destroy();
            }
            instance.destroy_instance(None);
        };

        let surface = match unsafe { ash_window::create_surface(&entry, &instance, dh, wh, None) } {
            Ok(s) => s,
            Err(e) => {
                destroy_instance(&messenger);
                return Err(anyhow::Error::new(e).context("create_surface"));
            }
        };
        let surface_loader = surface::Instance::new(&entry, &instance);

        let picked = unsafe { setup::pick_device(&instance, &surface_loader, surface) }
            .and_then(|(phys, families)| {
                let device = unsafe { setup::create_device(&instance, phys, families)? };
                Ok((phys, families, device))
            });
        let (phys, families, device) = match picked {
            Ok(p) => p,
            Err(e) => {
                unsafe { surface_loader.destroy_surface(surface, None) };
                destroy_instance(&messenger);
                return Err(e);
            }
        };

        let pool_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(families.graphics);
        let cmd_pool = match unsafe { device.create_command_pool(&pool_info, None) } {
            Ok(p) => p,
            Err(e) => {
                unsafe {
                    device.destroy_device(None);
                    surface_loader.destroy_surface(surface, None);
                }
                destroy_instance(&messenger);
                return Err(anyhow::Error::new(e).context("create_command_pool"));
            }
        };

        let graphics_queue = unsafe { device.get_device_queue(families.graphics, 0) };
        let present_queue = unsafe { device.get_device_queue(families.present, 0) };
        let swapchain_loader = swapchain::Device::new(&instance, &device);

        info!(
            "Vulkan device ready (queues: graphics {}, present {})",
            families.graphics, families.present
        );

        Ok(Self {
            _entry: entry,
            instance,
            messenger,
            surface_loader,
            surface,
            phys,
            device,
            families,
            graphics_queue,
            present_queue,
            swapchain_loader,
            cmd_pool,
        })
    }

    #[inline]
    pub fn validation_enabled(&self) -> bool {
        self.messenger.is_some()
    }
}

impl Drop for SurfaceContext {
    fn drop(&mut self) {
        // SAFETY: reverse creation order; every child object of the device has
        // already been released by the presentation core.
        unsafe {
            self.device.device_wait_idle().ok();
            self.device.destroy_command_pool(self.cmd_pool, None);
            self.device.destroy_device(None);
            self.surface_loader.destroy_surface(self.surface, None);
            if let Some(m) = &self.messenger {
                m.destroy();
            }
            self.instance.destroy_instance(None);
        }
    }
}

fn failure(op: &'static str) -> impl FnOnce(vk::Result) -> PresentError {
    move |result| PresentError::PresentationFailure { op, result }
}

impl Gpu for SurfaceContext {
    fn surface_capabilities(&self) -> PresentResult<vk::SurfaceCapabilitiesKHR> {
        Ok(unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(self.phys, self.surface)?
        })
    }

    fn surface_formats(&self) -> PresentResult<Vec<vk::SurfaceFormatKHR>> {
        Ok(unsafe {
            self.surface_loader
                .get_physical_device_surface_formats(self.phys, self.surface)?
        })
    }

    fn surface_present_modes(&self) -> PresentResult<Vec<vk::PresentModeKHR>> {
        Ok(unsafe {
            self.surface_loader
                .get_physical_device_surface_present_modes(self.phys, self.surface)?
        })
    }

    fn create_swapchain(
        &self,
        desc: &SwapchainDesc,
        retired: Option<&ChainHandle>,
    ) -> PresentResult<ChainHandle> {
        let caps = self.surface_capabilities()?;
        let composite_alpha = [
            vk::CompositeAlphaFlagsKHR::OPAQUE,
            vk::CompositeAlphaFlagsKHR::INHERIT,
            vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
            vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
        ]
        .into_iter()
        .find(|&a| caps.supported_composite_alpha.contains(a))
        .unwrap_or(vk::CompositeAlphaFlagsKHR::OPAQUE);

        let family_indices = [self.families.graphics, self.families.present];
        let mut info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface)
            .min_image_count(desc.min_image_count)
            .image_format(desc.surface_format.format)
            .image_color_space(desc.surface_format.color_space)
            .image_extent(desc.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(desc.pre_transform)
            .composite_alpha(composite_alpha)
            .present_mode(desc.present_mode)
            .clipped(true)
            .old_swapchain(retired.map_or(vk::SwapchainKHR::null(), ChainHandle::raw));
        info = if self.families.shared() {
            info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        } else {
            info.image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&family_indices)
        };

        let raw = unsafe { self.swapchain_loader.create_swapchain(&info, None)? };
        Ok(ChainHandle::new(raw))
    }

    fn swapchain_images(&self, chain: &ChainHandle) -> PresentResult<Vec<vk::Image>> {
        Ok(unsafe { self.swapchain_loader.get_swapchain_images(chain.raw())? })
    }

    fn destroy_swapchain(&self, chain: ChainHandle) {
        unsafe { self.swapchain_loader.destroy_swapchain(chain.raw(), None) };
    }

    fn create_image_view(
        &self,
        image: vk::Image,
        format: vk::Format,
    ) -> PresentResult<vk::ImageView> {
        let info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });
        Ok(unsafe { self.device.create_image_view(&info, None)? })
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe { self.device.destroy_image_view(view, None) };
    }

    fn create_render_pass(&self, format: vk::Format) -> PresentResult<vk::RenderPass> {
        unsafe { pipeline::create_render_pass(&self.device, format) }
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        unsafe { self.device.destroy_render_pass(render_pass, None) };
    }

    fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        view: vk::ImageView,
        extent: vk::Extent2D,
    ) -> PresentResult<vk::Framebuffer> {
        let attachments = [view];
        let info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass)
            .attachments(&attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);
        Ok(unsafe { self.device.create_framebuffer(&info, None)? })
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        unsafe { self.device.destroy_framebuffer(framebuffer, None) };
    }

    fn create_pipeline(
        &self,
        render_pass: vk::RenderPass,
        extent: vk::Extent2D,
    ) -> PresentResult<GraphicsPipeline> {
        unsafe { pipeline::create_pipeline(&self.device, render_pass, extent) }
    }

    fn destroy_pipeline(&self, pipeline: GraphicsPipeline) {
        unsafe {
            self.device.destroy_pipeline(pipeline.pipeline, None);
            self.device.destroy_pipeline_layout(pipeline.layout, None);
        }
    }

    fn allocate_command_buffers(&self, count: u32) -> PresentResult<Vec<vk::CommandBuffer>> {
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.cmd_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);
        Ok(unsafe { self.device.allocate_command_buffers(&info)? })
    }

    fn free_command_buffers(&self, buffers: &[vk::CommandBuffer]) {
        unsafe { self.device.free_command_buffers(self.cmd_pool, buffers) };
    }

    fn begin_commands(&self, cmd: vk::CommandBuffer) -> PresentResult<()> {
        let begin = vk::CommandBufferBeginInfo::default();
        Ok(unsafe { self.device.begin_command_buffer(cmd, &begin)? })
    }

    fn cmd_begin_render_pass(
        &self,
        cmd: vk::CommandBuffer,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        clear: [f32; 4],
    ) {
        let clears = [vk::ClearValue {
            color: vk::ClearColorValue { float32: clear },
        }];
        let rp_begin = vk::RenderPassBeginInfo::default()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .clear_values(&clears);
        unsafe {
            self.device
                .cmd_begin_render_pass(cmd, &rp_begin, vk::SubpassContents::INLINE)
        };
    }

    fn cmd_bind_pipeline(&self, cmd: vk::CommandBuffer, pipeline: &GraphicsPipeline) {
        unsafe {
            self.device
                .cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline.pipeline)
        };
    }

    fn cmd_draw(&self, cmd: vk::CommandBuffer, vertex_count: u32, instance_count: u32) {
        unsafe { self.device.cmd_draw(cmd, vertex_count, instance_count, 0, 0) };
    }

    fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer) {
        unsafe { self.device.cmd_end_render_pass(cmd) };
    }

    fn end_commands(&self, cmd: vk::CommandBuffer) -> PresentResult<()> {
        Ok(unsafe { self.device.end_command_buffer(cmd)? })
    }

    fn create_fence(&self, signaled: bool) -> PresentResult<vk::Fence> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let info = vk::FenceCreateInfo::default().flags(flags);
        Ok(unsafe { self.device.create_fence(&info, None)? })
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.device.destroy_fence(fence, None) };
    }

    fn create_semaphore(&self) -> PresentResult<vk::Semaphore> {
        let info = vk::SemaphoreCreateInfo::default();
        Ok(unsafe { self.device.create_semaphore(&info, None)? })
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.device.destroy_semaphore(semaphore, None) };
    }

    fn wait_fence(&self, fence: vk::Fence) -> PresentResult<()> {
        unsafe { self.device.wait_for_fences(&[fence], true, u64::MAX) }
            .map_err(failure("wait_for_fences"))
    }

    fn reset_fence(&self, fence: vk::Fence) -> PresentResult<()> {
        Ok(unsafe { self.device.reset_fences(&[fence])? })
    }

    fn acquire_next_image(
        &self,
        chain: &ChainHandle,
        signal: vk::Semaphore,
    ) -> PresentResult<AcquireOutcome> {
        let acquired = unsafe {
            self.swapchain_loader
                .acquire_next_image(chain.raw(), u64::MAX, signal, vk::Fence::null())
        };
        match acquired {
            Ok((index, suboptimal)) => Ok(AcquireOutcome::Ready { index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(result) => Err(failure("acquire_next_image")(result)),
        }
    }

    fn submit(
        &self,
        cmd: vk::CommandBuffer,
        wait: vk::Semaphore,
        wait_stage: vk::PipelineStageFlags,
        signal: vk::Semaphore,
        fence: vk::Fence,
    ) -> PresentResult<()> {
        let waits = [wait];
        let stages = [wait_stage];
        let cmds = [cmd];
        let signals = [signal];
        let submit = vk::SubmitInfo::default()
            .wait_semaphores(&waits)
            .wait_dst_stage_mask(&stages)
            .command_buffers(&cmds)
            .signal_semaphores(&signals);
        unsafe {
            self.device
                .queue_submit(self.graphics_queue, std::slice::from_ref(&submit), fence)
        }
        .map_err(failure("queue_submit"))
    }

    fn present(
        &self,
        chain: &ChainHandle,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> PresentResult<PresentOutcome> {
        let waits = [wait];
        let swapchains = [chain.raw()];
        let indices = [image_index];
        let present = vk::PresentInfoKHR::default()
            .wait_semaphores(&waits)
            .swapchains(&swapchains)
            .image_indices(&indices);
        match unsafe { self.swapchain_loader.queue_present(self.present_queue, &present) } {
            Ok(false) => Ok(PresentOutcome::Optimal),
            Ok(true) => Ok(PresentOutcome::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
            Err(result) => Err(failure("queue_present")(result)),
        }
    }

    fn wait_idle(&self) -> PresentResult<()> {
        unsafe { self.device.device_wait_idle() }.map_err(failure("device_wait_idle"))
    }
}
