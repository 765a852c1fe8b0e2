//! GPU context management.

use crate::capabilities::GpuCapabilities;
use crate::error::{GpuError, Result};
use crate::instance::{create_instance, select_physical_device};
use crate::memory::{GpuAllocator, ResourceAllocator};
use crate::surface::SurfaceContext;
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::collections::BTreeSet;
use std::ffi::{c_char, CStr};
use std::sync::Arc;

/// Main GPU context holding Vulkan resources.
///
/// Components receive it as `Arc<GpuContext>` and keep it alive for as long as
/// they own device objects.
pub struct GpuContext {
    // Entry must be kept alive for the lifetime of the context
    #[allow(dead_code)]
    pub(crate) entry: ash::Entry,
    pub(crate) instance: ash::Instance,
    pub(crate) physical_device: vk::PhysicalDevice,
    pub(crate) device: Arc<ash::Device>,
    pub(crate) capabilities: GpuCapabilities,
    pub(crate) allocator: ResourceAllocator,

    pub(crate) graphics_queue_family: u32,
    pub(crate) present_queue_family: u32,
    pub(crate) graphics_queue: vk::Queue,
    pub(crate) present_queue: vk::Queue,
}

impl GpuContext {
    /// Get the Vulkan device handle.
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    /// Shared handle to the logical device, for RAII wrappers.
    pub fn device_arc(&self) -> Arc<ash::Device> {
        self.device.clone()
    }

    /// Get the physical device handle.
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Get the Vulkan instance handle.
    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    /// Get GPU capabilities.
    pub fn capabilities(&self) -> &GpuCapabilities {
        &self.capabilities
    }

    /// Get the resource allocator.
    pub fn allocator(&self) -> &ResourceAllocator {
        &self.allocator
    }

    /// Get the graphics queue.
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Get the present queue. May be the same queue as graphics.
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    /// Get the graphics queue family index.
    pub fn graphics_queue_family(&self) -> u32 {
        self.graphics_queue_family
    }

    /// Get the present queue family index.
    pub fn present_queue_family(&self) -> u32 {
        self.present_queue_family
    }

    /// Format properties reported by the physical device.
    pub fn format_properties(&self, format: vk::Format) -> vk::FormatProperties {
        unsafe {
            self.instance
                .get_physical_device_format_properties(self.physical_device, format)
        }
    }

    /// First candidate whose `tiling` features contain `features`.
    pub fn find_supported_format(
        &self,
        candidates: &[vk::Format],
        tiling: vk::ImageTiling,
        features: vk::FormatFeatureFlags,
    ) -> Option<vk::Format> {
        pick_supported_format(candidates, tiling, features, |f| self.format_properties(f))
    }

    /// Wait for device to be idle.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.device.device_wait_idle()?;
        }
        Ok(())
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();

            // Shutdown allocator BEFORE destroying device
            self.allocator.shutdown();

            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
        tracing::debug!("GPU context destroyed");
    }
}

/// Pick the first format in `candidates` supporting `features` for `tiling`.
pub fn pick_supported_format<F>(
    candidates: &[vk::Format],
    tiling: vk::ImageTiling,
    features: vk::FormatFeatureFlags,
    mut properties: F,
) -> Option<vk::Format>
where
    F: FnMut(vk::Format) -> vk::FormatProperties,
{
    candidates.iter().copied().find(|&format| {
        let props = properties(format);
        match tiling {
            vk::ImageTiling::LINEAR => props.linear_tiling_features.contains(features),
            vk::ImageTiling::OPTIMAL => props.optimal_tiling_features.contains(features),
            _ => false,
        }
    })
}

/// Builder for creating a GPU context.
pub struct GpuContextBuilder {
    app_name: String,
    enable_validation: bool,
}

impl Default for GpuContextBuilder {
    fn default() -> Self {
        Self {
            app_name: "Prism".to_string(),
            enable_validation: cfg!(debug_assertions),
        }
    }
}

impl GpuContextBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application name.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Enable or disable validation layers.
    pub fn validation(mut self, enable: bool) -> Self {
        self.enable_validation = enable;
        self
    }

    /// Build a headless context. The present queue is the graphics queue.
    pub fn build(self) -> Result<GpuContext> {
        let entry = load_entry()?;
        let instance = unsafe { create_instance(&entry, &self.app_name, self.enable_validation, &[])? };

        match unsafe { create_device_parts(&instance, None) } {
            Ok(parts) => Ok(GpuContext::from_parts(entry, instance, parts)),
            Err(e) => {
                unsafe { instance.destroy_instance(None) };
                Err(e)
            }
        }
    }

    /// Build a context able to present to `window`, together with its surface.
    pub fn build_for_window<W>(self, window: &W) -> Result<(Arc<GpuContext>, SurfaceContext)>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let display = window
            .display_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get display handle: {e}")))?;
        let window_handle = window
            .window_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get window handle: {e}")))?;

        let entry = load_entry()?;
        let surface_extensions = ash_window::enumerate_required_extensions(display.as_raw())?;
        let instance = unsafe {
            create_instance(
                &entry,
                &self.app_name,
                self.enable_validation,
                surface_extensions,
            )?
        };

        let surface = unsafe {
            ash_window::create_surface(
                &entry,
                &instance,
                display.as_raw(),
                window_handle.as_raw(),
                None,
            )
        };
        let surface = match surface {
            Ok(surface) => surface,
            Err(e) => {
                unsafe { instance.destroy_instance(None) };
                return Err(GpuError::SurfaceCreation(e.to_string()));
            }
        };
        let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);

        let parts = match unsafe { create_device_parts(&instance, Some((&surface_loader, surface))) }
        {
            Ok(parts) => parts,
            Err(e) => {
                unsafe {
                    surface_loader.destroy_surface(surface, None);
                    instance.destroy_instance(None);
                }
                return Err(e);
            }
        };

        let gpu = Arc::new(GpuContext::from_parts(entry, instance, parts));
        let surface = SurfaceContext::new(gpu.clone(), surface, surface_loader);

        Ok((gpu, surface))
    }
}

fn load_entry() -> Result<ash::Entry> {
    unsafe { ash::Entry::load() }.map_err(|e| GpuError::Other(format!("Failed to load Vulkan: {e}")))
}

impl GpuContext {
    fn from_parts(entry: ash::Entry, instance: ash::Instance, parts: DeviceParts) -> Self {
        Self {
            entry,
            instance,
            physical_device: parts.physical_device,
            device: parts.device,
            capabilities: parts.capabilities,
            allocator: parts.allocator,
            graphics_queue_family: parts.families.graphics,
            present_queue_family: parts.families.present,
            graphics_queue: parts.graphics_queue,
            present_queue: parts.present_queue,
        }
    }
}

/// Everything created after the instance.
struct DeviceParts {
    physical_device: vk::PhysicalDevice,
    capabilities: GpuCapabilities,
    device: Arc<ash::Device>,
    allocator: ResourceAllocator,
    families: QueueFamilyIndices,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
}

/// Select a physical device, create the logical device, queues and allocator.
///
/// # Safety
/// The instance and surface must be valid.
unsafe fn create_device_parts(
    instance: &ash::Instance,
    present: Option<(&ash::khr::surface::Instance, vk::SurfaceKHR)>,
) -> Result<DeviceParts> {
    let families_for = |physical_device: vk::PhysicalDevice| {
        let families = instance.get_physical_device_queue_family_properties(physical_device);
        pick_queue_families(&families, |index| match present {
            Some((loader, surface)) => loader
                .get_physical_device_surface_support(physical_device, index, surface)
                .unwrap_or(false),
            None => true,
        })
    };

    let physical_device = select_physical_device(instance, |device, _| {
        let has_formats = present.map_or(true, |(loader, surface)| {
            loader
                .get_physical_device_surface_formats(device, surface)
                .is_ok_and(|f| !f.is_empty())
                && loader
                    .get_physical_device_surface_present_modes(device, surface)
                    .is_ok_and(|m| !m.is_empty())
        });
        has_formats && families_for(device).is_some()
    })?;

    let capabilities = GpuCapabilities::query(instance, physical_device);
    tracing::info!("Selected GPU: {}", capabilities.summary());

    let families = families_for(physical_device).ok_or(GpuError::NoSuitableDevice)?;

    let device = create_device(instance, physical_device, &families)?;
    let graphics_queue = device.get_device_queue(families.graphics, 0);
    let present_queue = device.get_device_queue(families.present, 0);

    let device = Arc::new(device);
    let allocator = match GpuAllocator::new(instance, device.clone(), physical_device) {
        Ok(allocator) => ResourceAllocator::new(allocator),
        Err(e) => {
            device.destroy_device(None);
            return Err(e);
        }
    };

    tracing::debug!(
        graphics = families.graphics,
        present = families.present,
        "Logical device created"
    );

    Ok(DeviceParts {
        physical_device,
        capabilities,
        device,
        allocator,
        families,
        graphics_queue,
        present_queue,
    })
}

/// Queue family indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: u32,
    pub present: u32,
}

/// Pick graphics and present queue families, preferring one family that does both.
pub fn pick_queue_families<F>(
    families: &[vk::QueueFamilyProperties],
    mut supports_present: F,
) -> Option<QueueFamilyIndices>
where
    F: FnMut(u32) -> bool,
{
    let mut graphics = None;
    let mut present = None;

    for (i, family) in families.iter().enumerate() {
        let i = i as u32;
        let is_graphics =
            family.queue_count > 0 && family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
        let can_present = family.queue_count > 0 && supports_present(i);

        if is_graphics && can_present {
            return Some(QueueFamilyIndices {
                graphics: i,
                present: i,
            });
        }
        if is_graphics && graphics.is_none() {
            graphics = Some(i);
        }
        if can_present && present.is_none() {
            present = Some(i);
        }
    }

    Some(QueueFamilyIndices {
        graphics: graphics?,
        present: present?,
    })
}

/// Required device extensions.
fn required_device_extensions() -> Vec<&'static CStr> {
    vec![
        ash::khr::swapchain::NAME,
        #[cfg(target_os = "macos")]
        ash::khr::portability_subset::NAME,
    ]
}

/// Create the logical device.
///
/// # Safety
/// The instance and physical device must be valid.
unsafe fn create_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    families: &QueueFamilyIndices,
) -> Result<ash::Device> {
    let unique_families: BTreeSet<u32> = [families.graphics, families.present].into();

    let queue_priority = 1.0_f32;
    let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
        .iter()
        .map(|&family| {
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(family)
                .queue_priorities(std::slice::from_ref(&queue_priority))
        })
        .collect();

    let extension_names: Vec<*const c_char> = required_device_extensions()
        .iter()
        .map(|ext| ext.as_ptr())
        .collect();

    let features = vk::PhysicalDeviceFeatures::default().sampler_anisotropy(true);

    let device_create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&extension_names)
        .enabled_features(&features);

    let device = instance.create_device(physical_device, &device_create_info, None)?;

    Ok(device)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn prefers_family_with_graphics_and_present() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
        ];
        let picked = pick_queue_families(&families, |i| i != 0).unwrap();
        assert_eq!(
            picked,
            QueueFamilyIndices {
                graphics: 2,
                present: 2
            }
        );
    }

    #[test]
    fn falls_back_to_distinct_families() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::TRANSFER),
        ];
        let picked = pick_queue_families(&families, |i| i == 1).unwrap();
        assert_eq!(picked.graphics, 0);
        assert_eq!(picked.present, 1);
    }

    #[test]
    fn no_present_support_is_none() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        assert!(pick_queue_families(&families, |_| false).is_none());
    }

    #[test]
    fn supported_format_respects_tiling() {
        let props = |format: vk::Format| {
            if format == vk::Format::D32_SFLOAT_S8_UINT {
                vk::FormatProperties {
                    optimal_tiling_features: vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
                    ..Default::default()
                }
            } else {
                vk::FormatProperties {
                    linear_tiling_features: vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
                    ..Default::default()
                }
            }
        };
        let candidates = [vk::Format::D32_SFLOAT, vk::Format::D32_SFLOAT_S8_UINT];

        assert_eq!(
            pick_supported_format(
                &candidates,
                vk::ImageTiling::OPTIMAL,
                vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
                props,
            ),
            Some(vk::Format::D32_SFLOAT_S8_UINT)
        );
        assert_eq!(
            pick_supported_format(
                &candidates,
                vk::ImageTiling::LINEAR,
                vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
                props,
            ),
            Some(vk::Format::D32_SFLOAT)
        );
        assert_eq!(
            pick_supported_format(
                &candidates,
                vk::ImageTiling::OPTIMAL,
                vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR,
                props,
            ),
            None
        );
    }
}
