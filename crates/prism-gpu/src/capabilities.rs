//! GPU capability detection.

use ash::vk;
use std::collections::HashSet;
use std::ffi::CStr;

/// Highest MSAA sample count the renderer will ever request.
pub const MAX_MSAA_SAMPLES: vk::SampleCountFlags = vk::SampleCountFlags::TYPE_8;

/// GPU vendor identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Apple,
    Other(u32),
}

impl GpuVendor {
    /// Identify vendor from PCI vendor ID.
    pub fn from_vendor_id(id: u32) -> Self {
        match id {
            0x10DE => Self::Nvidia,
            0x1002 => Self::Amd,
            0x8086 => Self::Intel,
            0x106B => Self::Apple,
            other => Self::Other(other),
        }
    }
}

/// Detected GPU capabilities.
#[derive(Debug, Clone)]
pub struct GpuCapabilities {
    /// GPU vendor
    pub vendor: GpuVendor,
    /// Device name
    pub device_name: String,
    /// Vulkan API version
    pub api_version: u32,
    /// Driver version
    pub driver_version: u32,

    /// Anisotropic filtering support
    pub supports_sampler_anisotropy: bool,
    /// Maximum sampler anisotropy
    pub max_sampler_anisotropy: f32,
    /// Largest sample count usable for both color and depth attachments, capped at 8x
    pub msaa_samples: vk::SampleCountFlags,

    // Memory info
    /// Device-local memory in MB
    pub device_local_memory_mb: u64,
    /// Maximum memory allocation count
    pub max_memory_allocation_count: u32,

    // Available extensions
    pub available_extensions: HashSet<String>,
}

impl GpuCapabilities {
    /// Query capabilities from a physical device.
    ///
    /// # Safety
    /// The instance and physical device must be valid.
    pub unsafe fn query(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> Self {
        let properties = instance.get_physical_device_properties(physical_device);
        let features = instance.get_physical_device_features(physical_device);
        let memory_properties = instance.get_physical_device_memory_properties(physical_device);

        let extensions = instance
            .enumerate_device_extension_properties(physical_device)
            .unwrap_or_default();

        let available_extensions: HashSet<String> = extensions
            .iter()
            .filter_map(|ext| {
                CStr::from_ptr(ext.extension_name.as_ptr())
                    .to_str()
                    .ok()
                    .map(String::from)
            })
            .collect();

        let vendor = GpuVendor::from_vendor_id(properties.vendor_id);
        let device_name = CStr::from_ptr(properties.device_name.as_ptr())
            .to_string_lossy()
            .into_owned();

        let device_local_memory_mb: u64 = memory_properties
            .memory_heaps
            .iter()
            .take(memory_properties.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size / (1024 * 1024))
            .sum();

        let limits = &properties.limits;
        let msaa_samples = max_usable_sample_count(
            limits.framebuffer_color_sample_counts & limits.framebuffer_depth_sample_counts,
        );

        Self {
            vendor,
            device_name,
            api_version: properties.api_version,
            driver_version: properties.driver_version,

            supports_sampler_anisotropy: features.sampler_anisotropy == vk::TRUE,
            max_sampler_anisotropy: limits.max_sampler_anisotropy,
            msaa_samples,

            device_local_memory_mb,
            max_memory_allocation_count: limits.max_memory_allocation_count,

            available_extensions,
        }
    }

    /// Check if the GPU meets minimum requirements for the renderer.
    pub fn meets_requirements(&self) -> bool {
        let swapchain = ash::khr::swapchain::NAME.to_str().unwrap_or_default();
        self.supports_sampler_anisotropy && self.available_extensions.contains(swapchain)
    }

    /// Get a human-readable summary of capabilities.
    pub fn summary(&self) -> String {
        format!(
            "{} ({:?}) - Vulkan {}.{}.{} - {} MB VRAM - {}x MSAA",
            self.device_name,
            self.vendor,
            vk::api_version_major(self.api_version),
            vk::api_version_minor(self.api_version),
            vk::api_version_patch(self.api_version),
            self.device_local_memory_mb,
            self.msaa_samples.as_raw(),
        )
    }
}

/// Pick the highest sample count in `counts`, never above [`MAX_MSAA_SAMPLES`].
pub fn max_usable_sample_count(counts: vk::SampleCountFlags) -> vk::SampleCountFlags {
    let above_cap = vk::SampleCountFlags::TYPE_64
        | vk::SampleCountFlags::TYPE_32
        | vk::SampleCountFlags::TYPE_16
        | MAX_MSAA_SAMPLES;
    if counts.intersects(above_cap) {
        return MAX_MSAA_SAMPLES;
    }

    [vk::SampleCountFlags::TYPE_4, vk::SampleCountFlags::TYPE_2]
        .into_iter()
        .find(|&c| counts.contains(c))
        .unwrap_or(vk::SampleCountFlags::TYPE_1)
}
