//! Vulkan instance creation and physical device selection.

use crate::capabilities::GpuCapabilities;
use crate::error::{GpuError, Result};
use ash::vk;
use std::ffi::{c_char, CStr, CString};

/// Minimum Vulkan API version the renderer targets.
pub const TARGET_API_VERSION: u32 = vk::API_VERSION_1_2;

/// Validation layers to enable in debug builds.
pub fn validation_layers() -> Vec<&'static CStr> {
    vec![c"VK_LAYER_KHRONOS_validation"]
}

/// Platform extensions that are always requested on top of the surface extensions.
fn platform_instance_extensions() -> Vec<*const c_char> {
    #[cfg(target_os = "macos")]
    {
        vec![ash::khr::portability_enumeration::NAME.as_ptr()]
    }
    #[cfg(not(target_os = "macos"))]
    {
        Vec::new()
    }
}

/// Create a Vulkan instance.
///
/// `surface_extensions` are the windowing extensions required by the target
/// display, or empty for a headless instance.
///
/// # Safety
/// The entry must be a valid Vulkan entry point.
pub unsafe fn create_instance(
    entry: &ash::Entry,
    app_name: &str,
    enable_validation: bool,
    surface_extensions: &[*const c_char],
) -> Result<ash::Instance> {
    let app_name = CString::new(app_name)
        .map_err(|e| GpuError::Other(format!("Invalid application name: {e}")))?;

    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(vk::make_api_version(0, 0, 1, 0))
        .engine_name(c"Prism")
        .engine_version(vk::make_api_version(0, 0, 1, 0))
        .api_version(TARGET_API_VERSION);

    let mut extension_names = surface_extensions.to_vec();
    extension_names.extend(platform_instance_extensions());

    let layers = if enable_validation {
        validation_layers()
    } else {
        vec![]
    };

    // Skip layers the loader does not know about rather than failing instance creation
    let available_layers = entry.enumerate_instance_layer_properties()?;
    let layers: Vec<&CStr> = layers
        .into_iter()
        .filter(|layer| {
            let found = available_layers
                .iter()
                .any(|props| CStr::from_ptr(props.layer_name.as_ptr()) == *layer);
            if !found {
                tracing::warn!("Validation layer {:?} not available", layer);
            }
            found
        })
        .collect();

    let layer_names: Vec<*const c_char> = layers.iter().map(|l| l.as_ptr()).collect();

    // Required for MoltenVK on macOS
    #[cfg(target_os = "macos")]
    let create_flags = vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
    #[cfg(not(target_os = "macos"))]
    let create_flags = vk::InstanceCreateFlags::empty();

    let create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_extension_names(&extension_names)
        .enabled_layer_names(&layer_names)
        .flags(create_flags);

    let instance = entry.create_instance(&create_info, None)?;
    tracing::debug!(
        validation = !layer_names.is_empty(),
        extensions = extension_names.len(),
        "Vulkan instance created"
    );

    Ok(instance)
}

/// Select the best physical device accepted by `is_suitable`.
///
/// # Safety
/// The instance must be valid.
pub unsafe fn select_physical_device<F>(
    instance: &ash::Instance,
    mut is_suitable: F,
) -> Result<vk::PhysicalDevice>
where
    F: FnMut(vk::PhysicalDevice, &GpuCapabilities) -> bool,
{
    let devices = instance.enumerate_physical_devices()?;

    let mut best_device = None;
    let mut best_score = -1i32;

    for device in devices {
        let capabilities = GpuCapabilities::query(instance, device);
        if !capabilities.meets_requirements() || !is_suitable(device, &capabilities) {
            tracing::debug!("Skipping unsuitable GPU: {}", capabilities.device_name);
            continue;
        }

        let score = score_physical_device(instance, device);
        if score > best_score {
            best_score = score;
            best_device = Some(device);
        }
    }

    best_device.ok_or(GpuError::NoSuitableDevice)
}

/// Score a physical device for selection. Negative scores are rejected.
unsafe fn score_physical_device(instance: &ash::Instance, device: vk::PhysicalDevice) -> i32 {
    let properties = instance.get_physical_device_properties(device);

    if properties.api_version < TARGET_API_VERSION {
        return -1;
    }

    let mut score = 0;

    match properties.device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => score += 1000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => score += 100,
        vk::PhysicalDeviceType::VIRTUAL_GPU => score += 50,
        _ => {}
    }

    // +1 per GB of device-local memory
    let memory = instance.get_physical_device_memory_properties(device);
    let vram_mb: u64 = memory
        .memory_heaps
        .iter()
        .take(memory.memory_heap_count as usize)
        .filter(|h| h.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
        .map(|h| h.size / (1024 * 1024))
        .sum();
    score += i32::try_from(vram_mb / 1024).unwrap_or(i32::MAX / 2);

    score
}
