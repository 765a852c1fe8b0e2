//! Surface management for windowed rendering.
//!
//! The surface is created together with the device by
//! [`GpuContextBuilder::build_for_window`](crate::GpuContextBuilder::build_for_window)
//! so that queue family selection can take present support into account.

use crate::context::GpuContext;
use crate::error::Result;
use crate::swapchain::{Swapchain, SwapchainConfig};
use ash::vk;
use std::sync::Arc;

/// Surface context for windowed rendering.
///
/// Owns the Vulkan surface and the swapchain loader. The surface is destroyed on drop.
pub struct SurfaceContext {
    surface: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,
    swapchain_loader: ash::khr::swapchain::Device,
    gpu: Arc<GpuContext>,
}

impl SurfaceContext {
    pub(crate) fn new(
        gpu: Arc<GpuContext>,
        surface: vk::SurfaceKHR,
        surface_loader: ash::khr::surface::Instance,
    ) -> Self {
        let swapchain_loader = ash::khr::swapchain::Device::new(gpu.instance(), gpu.device());
        Self {
            surface,
            surface_loader,
            swapchain_loader,
            gpu,
        }
    }

    /// Raw surface handle.
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.surface
    }

    /// Swapchain extension loader.
    pub fn swapchain_loader(&self) -> &ash::khr::swapchain::Device {
        &self.swapchain_loader
    }

    /// Re-query surface capabilities, formats and present modes.
    pub fn support(&self) -> Result<SwapchainSupport> {
        let physical_device = self.gpu.physical_device();
        unsafe {
            let capabilities = self
                .surface_loader
                .get_physical_device_surface_capabilities(physical_device, self.surface)?;

            let formats = self
                .surface_loader
                .get_physical_device_surface_formats(physical_device, self.surface)?;

            let present_modes = self
                .surface_loader
                .get_physical_device_surface_present_modes(physical_device, self.surface)?;

            Ok(SwapchainSupport {
                capabilities,
                formats,
                present_modes,
            })
        }
    }

    /// Negotiate and create a swapchain for this surface.
    ///
    /// `old` is passed to the driver as a reuse hint and is left intact; the
    /// caller destroys it once the new chain exists.
    pub fn create_swapchain(
        &self,
        framebuffer_size: (u32, u32),
        vsync: bool,
        old: Option<&Swapchain>,
    ) -> Result<Swapchain> {
        let support = self.support()?;
        let config = SwapchainConfig::negotiate(&support, framebuffer_size, vsync)?;

        Swapchain::new(
            self.gpu.device_arc(),
            self.swapchain_loader.clone(),
            self.surface,
            &config,
            &support.capabilities,
            [self.gpu.graphics_queue_family(), self.gpu.present_queue_family()],
            old.map(Swapchain::handle),
        )
    }
}

impl Drop for SurfaceContext {
    fn drop(&mut self) {
        unsafe { self.surface_loader.destroy_surface(self.surface, None) };
        tracing::debug!("Surface destroyed");
    }
}

/// Surface query result.
#[derive(Debug, Clone)]
pub struct SwapchainSupport {
    /// Raw surface capabilities.
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats.
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes.
    pub present_modes: Vec<vk::PresentModeKHR>,
}
