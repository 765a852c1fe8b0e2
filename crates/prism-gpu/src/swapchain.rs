//! Swapchain management.

use crate::error::{GpuError, Result};
use crate::surface::SwapchainSupport;
use ash::vk;
use std::sync::Arc;

/// Parameters negotiated against a surface before a swapchain is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainConfig {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
}

impl SwapchainConfig {
    /// Choose format, present mode, extent and image count for the given surface support.
    pub fn negotiate(
        support: &SwapchainSupport,
        framebuffer_size: (u32, u32),
        vsync: bool,
    ) -> Result<Self> {
        let surface_format = select_surface_format(&support.formats).ok_or_else(|| {
            GpuError::SwapchainCreation("Surface reports no formats".to_string())
        })?;

        Ok(Self {
            surface_format,
            present_mode: select_present_mode(&support.present_modes, vsync),
            extent: calculate_extent(&support.capabilities, framebuffer_size.0, framebuffer_size.1),
            image_count: image_count(&support.capabilities),
        })
    }
}

/// Outcome of a successful acquire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquiredImage {
    pub index: u32,
    /// The image is usable but the swapchain no longer matches the surface exactly.
    pub suboptimal: bool,
}

/// Swapchain wrapper. Destroys its image views and the swapchain on drop.
pub struct Swapchain {
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::Format,
    extent: vk::Extent2D,
    device: Arc<ash::Device>,
    loader: ash::khr::swapchain::Device,
}

impl Swapchain {
    /// Create a new swapchain.
    ///
    /// `old_swapchain` is only a hint for resource reuse; it is not destroyed here.
    pub fn new(
        device: Arc<ash::Device>,
        loader: ash::khr::swapchain::Device,
        surface: vk::SurfaceKHR,
        config: &SwapchainConfig,
        surface_capabilities: &vk::SurfaceCapabilitiesKHR,
        queue_families: [u32; 2],
        old_swapchain: Option<vk::SwapchainKHR>,
    ) -> Result<Self> {
        let mut create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(config.image_count)
            .image_format(config.surface_format.format)
            .image_color_space(config.surface_format.color_space)
            .image_extent(config.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(surface_capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(config.present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain.unwrap_or(vk::SwapchainKHR::null()));

        create_info = if queue_families[0] == queue_families[1] {
            create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        } else {
            create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&queue_families)
        };

        let swapchain = unsafe { loader.create_swapchain(&create_info, None) }
            .map_err(|e| GpuError::SwapchainCreation(e.to_string()))?;

        // From here on the wrapper owns the handle and cleans up partial state on error
        let mut this = Self {
            swapchain,
            images: Vec::new(),
            image_views: Vec::new(),
            format: config.surface_format.format,
            extent: config.extent,
            device,
            loader,
        };

        this.images = unsafe { this.loader.get_swapchain_images(swapchain)? };
        for &image in &this.images {
            let view_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(this.format)
                .components(vk::ComponentMapping::default())
                .subresource_range(
                    vk::ImageSubresourceRange::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .base_mip_level(0)
                        .level_count(1)
                        .base_array_layer(0)
                        .layer_count(1),
                );

            let view = unsafe { this.device.create_image_view(&view_info, None)? };
            this.image_views.push(view);
        }

        tracing::info!(
            images = this.images.len(),
            width = this.extent.width,
            height = this.extent.height,
            format = ?this.format,
            present_mode = ?config.present_mode,
            "Swapchain created"
        );

        Ok(this)
    }

    /// Raw swapchain handle.
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Presentable images, in swapchain order.
    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    /// One color view per presentable image.
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Acquire the next image, signaling `semaphore` when it becomes available.
    ///
    /// Returns [`GpuError::OutOfDate`] when no image could be acquired.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> Result<AcquiredImage> {
        let result = unsafe {
            self.loader
                .acquire_next_image(self.swapchain, u64::MAX, semaphore, vk::Fence::null())
        };

        match result {
            Ok((index, suboptimal)) => Ok(AcquiredImage { index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Err(GpuError::OutOfDate),
            Err(e) => Err(GpuError::from(e)),
        }
    }

    /// Present an image.
    ///
    /// Returns `true` when the swapchain should be recreated.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
    ) -> Result<bool> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match unsafe { self.loader.queue_present(queue, &present_info) } {
            Ok(suboptimal) => Ok(suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(true),
            Err(e) => Err(GpuError::from(e)),
        }
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &view in &self.image_views {
                self.device.destroy_image_view(view, None);
            }
            self.loader.destroy_swapchain(self.swapchain, None);
        }
        tracing::debug!("Swapchain destroyed");
    }
}

/// Select the best surface format.
///
/// Prefers `B8G8R8A8_SRGB` with `SRGB_NONLINEAR`, otherwise the first available.
pub fn select_surface_format(available: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    available
        .iter()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| available.first())
        .copied()
}

/// Select the best present mode.
///
/// With vsync this is always FIFO. Without it MAILBOX is preferred and FIFO,
/// which every implementation must support, is the fallback.
pub fn select_present_mode(available: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    if !vsync && available.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// Calculate swapchain extent.
///
/// Uses the surface's current extent unless it reports "any size" (`u32::MAX`),
/// in which case the framebuffer size is clamped to the supported range.
pub fn calculate_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    framebuffer_width: u32,
    framebuffer_height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: framebuffer_width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: framebuffer_height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    }
}

/// One more image than the minimum, capped at the maximum when the surface has one.
pub fn image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        count.min(capabilities.max_image_count)
    } else {
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(current: (u32, u32), min: (u32, u32), max: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 3,
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D {
                width: min.0,
                height: min.1,
            },
            max_image_extent: vk::Extent2D {
                width: max.0,
                height: max.1,
            },
            ..Default::default()
        }
    }

    #[test]
    fn prefers_bgra_srgb() {
        let unorm = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        let srgb = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        assert_eq!(select_surface_format(&[unorm, srgb]), Some(srgb));
        assert_eq!(select_surface_format(&[unorm]), Some(unorm));
        assert_eq!(select_surface_format(&[]), None);
    }

    #[test]
    fn only_fifo_yields_fifo() {
        let fifo = [vk::PresentModeKHR::FIFO];
        assert_eq!(select_present_mode(&fifo, false), vk::PresentModeKHR::FIFO);
        assert_eq!(select_present_mode(&fifo, true), vk::PresentModeKHR::FIFO);

        // IMMEDIATE is never chosen even when offered
        let modes = [vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO];
        assert_eq!(select_present_mode(&modes, false), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn mailbox_preferred_without_vsync() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(select_present_mode(&modes, false), vk::PresentModeKHR::MAILBOX);
        assert_eq!(select_present_mode(&modes, true), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn extent_uses_current_when_fixed() {
        let c = caps((800, 600), (1, 1), (4096, 4096));
        let extent = calculate_extent(&c, 1920, 1080);
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn extent_clamps_framebuffer_size_when_any() {
        let c = caps((u32::MAX, u32::MAX), (64, 64), (1024, 768));

        let extent = calculate_extent(&c, 1920, 32);
        assert_eq!((extent.width, extent.height), (1024, 64));

        let extent = calculate_extent(&c, 500, 400);
        assert_eq!((extent.width, extent.height), (500, 400));
    }

    #[test]
    fn image_count_is_min_plus_one_capped() {
        let mut c = caps((1, 1), (1, 1), (1, 1));
        assert_eq!(image_count(&c), 3);

        c.max_image_count = 2;
        assert_eq!(image_count(&c), 2);

        // Zero means no upper limit
        c.max_image_count = 0;
        c.min_image_count = 4;
        assert_eq!(image_count(&c), 5);
    }

    #[test]
    fn negotiate_combines_choices() {
        let support = SwapchainSupport {
            capabilities: caps((u32::MAX, u32::MAX), (1, 1), (2048, 2048)),
            formats: vec![vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            }],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };

        let config = SwapchainConfig::negotiate(&support, (640, 480), false).unwrap();
        assert_eq!(config.surface_format.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(config.present_mode, vk::PresentModeKHR::FIFO);
        assert_eq!((config.extent.width, config.extent.height), (640, 480));
        assert_eq!(config.image_count, 3);
    }

    #[test]
    fn negotiate_without_formats_fails() {
        let support = SwapchainSupport {
            capabilities: caps((100, 100), (1, 1), (100, 100)),
            formats: vec![],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        assert!(matches!(
            SwapchainConfig::negotiate(&support, (100, 100), true),
            Err(GpuError::SwapchainCreation(_))
        ));
    }
}
