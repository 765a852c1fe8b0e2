//! GPU memory management.
//!
//! Every buffer and image gets its own dedicated allocation, bound at creation
//! time. [`GpuBuffer`] and [`GpuImage`] return their memory on drop.

use crate::error::{GpuError, Result};
use ash::vk;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use gpu_allocator::{AllocationError, MemoryLocation};
use parking_lot::Mutex;
use std::sync::Arc;

/// Where a resource's memory must live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// Device-local memory, not mappable.
    DeviceLocal,
    /// Host-visible, host-coherent memory written by the CPU.
    HostVisible,
    /// Host-visible, host-coherent memory read back by the CPU.
    HostReadback,
}

impl Visibility {
    /// Memory property flags a matching memory type must have.
    pub fn required_flags(self) -> vk::MemoryPropertyFlags {
        match self {
            Self::DeviceLocal => vk::MemoryPropertyFlags::DEVICE_LOCAL,
            Self::HostVisible | Self::HostReadback => {
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
            }
        }
    }

    fn location(self) -> MemoryLocation {
        match self {
            Self::DeviceLocal => MemoryLocation::GpuOnly,
            Self::HostVisible => MemoryLocation::CpuToGpu,
            Self::HostReadback => MemoryLocation::GpuToCpu,
        }
    }
}

/// Find the first memory type allowed by `type_bits` that has all `required` properties.
pub fn find_memory_type(
    properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
) -> Result<u32> {
    properties
        .memory_types
        .iter()
        .take(properties.memory_type_count as usize)
        .enumerate()
        .find(|&(i, ty)| type_bits & (1u32 << i) != 0 && ty.property_flags.contains(required))
        .map(|(i, _)| i as u32)
        .ok_or(GpuError::UnsupportedMemoryType {
            type_bits,
            required,
        })
}

fn map_allocation_error(err: AllocationError) -> GpuError {
    match err {
        AllocationError::OutOfMemory => GpuError::OutOfDeviceMemory,
        other => GpuError::AllocationFailed(other.to_string()),
    }
}

/// GPU memory allocator wrapper.
pub struct GpuAllocator {
    allocator: Option<Allocator>,
    device: Arc<ash::Device>,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
}

impl GpuAllocator {
    /// Create a new allocator.
    ///
    /// # Safety
    /// The instance, device, and physical device must be valid.
    pub unsafe fn new(
        instance: &ash::Instance,
        device: Arc<ash::Device>,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Self> {
        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: (*device).clone(),
            physical_device,
            debug_settings: gpu_allocator::AllocatorDebugSettings {
                log_memory_information: cfg!(debug_assertions),
                log_leaks_on_shutdown: true,
                store_stack_traces: false,
                log_allocations: false,
                log_frees: false,
                log_stack_traces: false,
            },
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })
        .map_err(map_allocation_error)?;

        let memory_properties = instance.get_physical_device_memory_properties(physical_device);

        Ok(Self {
            allocator: Some(allocator),
            device,
            memory_properties,
        })
    }

    fn allocate(
        &mut self,
        name: &str,
        requirements: vk::MemoryRequirements,
        visibility: Visibility,
        linear: bool,
        allocation_scheme: AllocationScheme,
    ) -> Result<Allocation> {
        find_memory_type(
            &self.memory_properties,
            requirements.memory_type_bits,
            visibility.required_flags(),
        )?;

        self.allocator
            .as_mut()
            .ok_or_else(|| GpuError::InvalidState("Allocator not initialized".to_string()))?
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location: visibility.location(),
                linear,
                allocation_scheme,
            })
            .map_err(map_allocation_error)
    }

    fn free(&mut self, allocation: Allocation) {
        let Some(allocator) = self.allocator.as_mut() else {
            tracing::warn!("Freeing allocation after allocator shutdown");
            return;
        };
        if let Err(e) = allocator.free(allocation) {
            tracing::error!("Failed to free GPU allocation: {e}");
        }
    }

    /// Shutdown the allocator, freeing all GPU memory.
    ///
    /// This must be called before the Vulkan device is destroyed.
    /// Any remaining allocations will be freed (and logged as leaks).
    pub fn shutdown(&mut self) {
        if let Some(allocator) = self.allocator.take() {
            drop(allocator);
        }
    }
}

impl Drop for GpuAllocator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Shared handle used to create buffers and images.
///
/// Cloning is cheap; all clones refer to the same underlying allocator.
#[derive(Clone)]
pub struct ResourceAllocator {
    inner: Arc<Mutex<GpuAllocator>>,
    device: Arc<ash::Device>,
}

impl ResourceAllocator {
    pub(crate) fn new(allocator: GpuAllocator) -> Self {
        let device = allocator.device.clone();
        Self {
            inner: Arc::new(Mutex::new(allocator)),
            device,
        }
    }

    pub(crate) fn shutdown(&self) {
        self.inner.lock().shutdown();
    }

    /// Create a buffer and bind a dedicated allocation to it.
    pub fn allocate_buffer(
        &self,
        size: u64,
        usage: vk::BufferUsageFlags,
        visibility: Visibility,
        name: &str,
    ) -> Result<GpuBuffer> {
        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { self.device.create_buffer(&buffer_info, None)? };
        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };

        let allocation = self.inner.lock().allocate(
            name,
            requirements,
            visibility,
            true,
            AllocationScheme::DedicatedBuffer(buffer),
        );
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { self.device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        let bind = unsafe {
            self.device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
        };
        if let Err(e) = bind {
            self.inner.lock().free(allocation);
            unsafe { self.device.destroy_buffer(buffer, None) };
            return Err(e.into());
        }

        tracing::trace!(name, size, ?visibility, "Buffer allocated");

        Ok(GpuBuffer {
            buffer,
            allocation: Some(allocation),
            size,
            allocator: self.clone(),
        })
    }

    /// Create an image and bind a dedicated allocation to it.
    pub fn allocate_image(
        &self,
        create_info: &vk::ImageCreateInfo,
        visibility: Visibility,
        name: &str,
    ) -> Result<GpuImage> {
        let image = unsafe { self.device.create_image(create_info, None)? };
        let requirements = unsafe { self.device.get_image_memory_requirements(image) };

        let allocation = self.inner.lock().allocate(
            name,
            requirements,
            visibility,
            create_info.tiling == vk::ImageTiling::LINEAR,
            AllocationScheme::DedicatedImage(image),
        );
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { self.device.destroy_image(image, None) };
                return Err(e);
            }
        };

        let bind = unsafe {
            self.device
                .bind_image_memory(image, allocation.memory(), allocation.offset())
        };
        if let Err(e) = bind {
            self.inner.lock().free(allocation);
            unsafe { self.device.destroy_image(image, None) };
            return Err(e.into());
        }

        tracing::trace!(
            name,
            extent = ?create_info.extent,
            format = ?create_info.format,
            "Image allocated"
        );

        Ok(GpuImage {
            image,
            allocation: Some(allocation),
            format: create_info.format,
            extent: create_info.extent,
            mip_levels: create_info.mip_levels,
            allocator: self.clone(),
        })
    }
}

/// A GPU buffer with its allocation.
pub struct GpuBuffer {
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    size: u64,
    allocator: ResourceAllocator,
}

impl GpuBuffer {
    /// Raw buffer handle.
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Size in bytes requested at creation.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Map the buffer memory for CPU access.
    pub fn mapped_ptr(&self) -> Option<*mut u8> {
        self.allocation
            .as_ref()
            .and_then(Allocation::mapped_ptr)
            .map(|p| p.as_ptr().cast::<u8>())
    }

    /// Write typed data to the start of the buffer (must be host-visible).
    pub fn write<T: bytemuck::Pod>(&self, data: &[T]) -> Result<()> {
        self.write_bytes(0, bytemuck::cast_slice(data))
    }

    /// Write raw bytes to the buffer at the given offset (must be host-visible).
    pub fn write_bytes(&self, offset: u64, data: &[u8]) -> Result<()> {
        let ptr = self
            .mapped_ptr()
            .ok_or_else(|| GpuError::InvalidState("Buffer not mapped".to_string()))?;

        let end = offset
            .checked_add(data.len() as u64)
            .ok_or_else(|| GpuError::InvalidState("Offset overflow".to_string()))?;
        if end > self.size {
            return Err(GpuError::InvalidState(
                "Data range too large for buffer".to_string(),
            ));
        }

        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.add(offset as usize), data.len());
        }

        Ok(())
    }

    /// Copy the buffer contents back to the CPU (must be host-visible).
    pub fn read_bytes(&self) -> Result<Vec<u8>> {
        let slice = self
            .allocation
            .as_ref()
            .and_then(Allocation::mapped_slice)
            .ok_or_else(|| GpuError::InvalidState("Buffer not mapped".to_string()))?;

        Ok(slice[..self.size as usize].to_vec())
    }
}

impl Drop for GpuBuffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            self.allocator.inner.lock().free(allocation);
        }
        unsafe { self.allocator.device.destroy_buffer(self.buffer, None) };
    }
}

/// A GPU image with its allocation.
pub struct GpuImage {
    image: vk::Image,
    allocation: Option<Allocation>,
    format: vk::Format,
    extent: vk::Extent3D,
    mip_levels: u32,
    allocator: ResourceAllocator,
}

impl GpuImage {
    /// Raw image handle.
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }

    pub fn extent(&self) -> vk::Extent3D {
        self.extent
    }

    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }
}

impl Drop for GpuImage {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            self.allocator.inner.lock().free(allocation);
        }
        unsafe { self.allocator.device.destroy_image(self.image, None) };
    }
}
