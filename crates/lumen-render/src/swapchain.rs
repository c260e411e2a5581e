// SPDX-License-Identifier: CEPL-1.0
//! Swapchain creation, recreation and teardown.
//!
//! The manager owns at most one live [`Swapchain`]. Recreation moves the live
//! chain out of its slot, lends its handle to the driver as the
//! `old_swapchain` hint, then releases it whether or not the new chain was
//! built. Callers must have torn down every dependent (render targets,
//! recorded commands) and idled the device first.

use ash::vk;
use tracing::{debug, info};

use crate::error::{PresentError, PresentResult};
use crate::gpu::{ChainHandle, Gpu, SwapchainDesc};
use crate::RenderSize;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PresentModePreference {
    /// Always FIFO: never tears, caps to the refresh rate.
    Fifo,
    /// MAILBOX when the surface offers it, FIFO otherwise.
    #[default]
    Mailbox,
}

#[derive(Debug)]
pub struct Swapchain {
    handle: ChainHandle,
    generation: u64,
    extent: vk::Extent2D,
    surface_format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
}

impl Swapchain {
    #[inline]
    pub fn handle(&self) -> &ChainHandle {
        &self.handle
    }

    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn surface_format(&self) -> vk::SurfaceFormatKHR {
        self.surface_format
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.surface_format.format
    }

    #[inline]
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    #[inline]
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }
}

pub fn select_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .copied()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first().copied())
}

pub fn select_present_mode(
    modes: &[vk::PresentModeKHR],
    preference: PresentModePreference,
) -> vk::PresentModeKHR {
    match preference {
        PresentModePreference::Mailbox if modes.contains(&vk::PresentModeKHR::MAILBOX) => {
            vk::PresentModeKHR::MAILBOX
        }
        // FIFO support is mandatory for every surface.
        _ => vk::PresentModeKHR::FIFO,
    }
}

/// One more than the minimum, capped by the maximum (0 means no maximum).
pub fn select_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let wanted = caps.min_image_count + 1;
    if caps.max_image_count == 0 {
        wanted
    } else {
        wanted.min(caps.max_image_count)
    }
}

pub fn select_extent(caps: &vk::SurfaceCapabilitiesKHR, want: RenderSize) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: want
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: want
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

fn select_transform(caps: &vk::SurfaceCapabilitiesKHR) -> vk::SurfaceTransformFlagsKHR {
    if caps
        .supported_transforms
        .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
    {
        vk::SurfaceTransformFlagsKHR::IDENTITY
    } else {
        caps.current_transform
    }
}

fn describe_chain<G: Gpu>(
    gpu: &G,
    want: RenderSize,
    preference: PresentModePreference,
) -> PresentResult<SwapchainDesc> {
    let caps = gpu.surface_capabilities()?;
    let formats = gpu.surface_formats()?;
    let modes = gpu.surface_present_modes()?;

    let surface_format = select_surface_format(&formats).ok_or(
        PresentError::NoCompatibleSurfaceConfiguration("surface reports no formats"),
    )?;
    if modes.is_empty() {
        return Err(PresentError::NoCompatibleSurfaceConfiguration(
            "surface reports no present modes",
        ));
    }
    let desc = SwapchainDesc {
        min_image_count: select_image_count(&caps),
        surface_format,
        extent: select_extent(&caps, want),
        present_mode: select_present_mode(&modes, preference),
        pre_transform: select_transform(&caps),
    };

    info!(
        "swapchain: format {:?} / {:?}, present_mode {:?}, extent {}x{}, images(min={} → picked={})",
        desc.surface_format.format,
        desc.surface_format.color_space,
        desc.present_mode,
        desc.extent.width,
        desc.extent.height,
        caps.min_image_count,
        desc.min_image_count,
    );
    Ok(desc)
}

fn create_image_views<G: Gpu>(
    gpu: &G,
    images: &[vk::Image],
    format: vk::Format,
) -> PresentResult<Vec<vk::ImageView>> {
    let mut views = Vec::with_capacity(images.len());
    for &image in images {
        match gpu.create_image_view(image, format) {
            Ok(view) => views.push(view),
            Err(e) => {
                for view in views {
                    gpu.destroy_image_view(view);
                }
                return Err(e);
            }
        }
    }
    Ok(views)
}

fn build_chain<G: Gpu>(
    gpu: &G,
    desc: &SwapchainDesc,
    retired: Option<&ChainHandle>,
    generation: u64,
) -> PresentResult<Swapchain> {
    let handle = gpu.create_swapchain(desc, retired)?;
    let images = match gpu.swapchain_images(&handle) {
        Ok(images) => images,
        Err(e) => {
            gpu.destroy_swapchain(handle);
            return Err(e);
        }
    };
    let image_views = match create_image_views(gpu, &images, desc.surface_format.format) {
        Ok(views) => views,
        Err(e) => {
            gpu.destroy_swapchain(handle);
            return Err(e);
        }
    };

    Ok(Swapchain {
        handle,
        generation,
        extent: desc.extent,
        surface_format: desc.surface_format,
        present_mode: desc.present_mode,
        images,
        image_views,
    })
}

fn release_chain<G: Gpu>(gpu: &G, chain: Swapchain) {
    let Swapchain {
        handle,
        generation,
        image_views,
        ..
    } = chain;
    for view in image_views {
        gpu.destroy_image_view(view);
    }
    gpu.destroy_swapchain(handle);
    debug!("released swapchain generation {generation}");
}

#[derive(Debug)]
pub struct SwapchainManager {
    active: Option<Swapchain>,
    generation: u64,
    preference: PresentModePreference,
}

impl SwapchainManager {
    /// Builds the first chain for `desired` (clamped to the surface limits).
    pub fn create<G: Gpu>(
        gpu: &G,
        desired: RenderSize,
        preference: PresentModePreference,
    ) -> PresentResult<Self> {
        let desc = describe_chain(gpu, desired, preference)?;
        let chain = build_chain(gpu, &desc, None, 1)?;
        info!(
            "swapchain generation 1 ready ({} images)",
            chain.image_count()
        );
        Ok(Self {
            active: Some(chain),
            generation: 1,
            preference,
        })
    }

    /// A manager with no chain yet; the first [`recreate`](Self::recreate)
    /// builds generation 1.
    pub fn deferred(preference: PresentModePreference) -> Self {
        Self {
            active: None,
            generation: 0,
            preference,
        }
    }

    /// Replaces the live chain. The device must be idle and every dependent
    /// torn down. On failure no chain is live.
    pub fn recreate<G: Gpu>(&mut self, gpu: &G, desired: RenderSize) -> PresentResult<&Swapchain> {
        let retired = self.active.take();
        let built = describe_chain(gpu, desired, self.preference).and_then(|desc| {
            build_chain(
                gpu,
                &desc,
                retired.as_ref().map(Swapchain::handle),
                self.generation + 1,
            )
        });
        if let Some(old) = retired {
            release_chain(gpu, old);
        }
        let chain = built?;

        self.generation += 1;
        info!(
            "swapchain generation {} ready ({} images)",
            self.generation,
            chain.image_count()
        );
        Ok(self.active.insert(chain))
    }

    #[inline]
    pub fn current(&self) -> Option<&Swapchain> {
        self.active.as_ref()
    }

    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Releases the live chain, if any. Dependents must already be gone.
    pub fn destroy<G: Gpu>(&mut self, gpu: &G) {
        if let Some(chain) = self.active.take() {
            release_chain(gpu, chain);
        }
    }
}
