//! Synchronization primitives.
//!
//! [`Fence`] and [`Semaphore`] own their Vulkan handle and destroy it on drop.

use crate::error::Result;
use ash::vk;
use std::sync::Arc;

/// Create a semaphore.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_semaphore(device: &ash::Device) -> Result<vk::Semaphore> {
    let create_info = vk::SemaphoreCreateInfo::default();
    let semaphore = device.create_semaphore(&create_info, None)?;
    Ok(semaphore)
}

/// Create a fence.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_fence(device: &ash::Device, signaled: bool) -> Result<vk::Fence> {
    let flags = if signaled {
        vk::FenceCreateFlags::SIGNALED
    } else {
        vk::FenceCreateFlags::empty()
    };

    let create_info = vk::FenceCreateInfo::default().flags(flags);
    let fence = device.create_fence(&create_info, None)?;
    Ok(fence)
}

/// GPU-to-GPU ordering primitive.
pub struct Semaphore {
    handle: vk::Semaphore,
    device: Arc<ash::Device>,
}

impl Semaphore {
    pub fn new(device: Arc<ash::Device>) -> Result<Self> {
        let handle = unsafe { create_semaphore(&device)? };
        Ok(Self { handle, device })
    }

    pub fn handle(&self) -> vk::Semaphore {
        self.handle
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe { self.device.destroy_semaphore(self.handle, None) };
    }
}

/// CPU-waitable completion primitive.
pub struct Fence {
    handle: vk::Fence,
    device: Arc<ash::Device>,
}

impl Fence {
    /// Create a fence, optionally already signaled so the first wait returns immediately.
    pub fn new(device: Arc<ash::Device>, signaled: bool) -> Result<Self> {
        let handle = unsafe { create_fence(&device, signaled)? };
        Ok(Self { handle, device })
    }

    pub fn handle(&self) -> vk::Fence {
        self.handle
    }

    /// Block until the fence is signaled. There is no timeout.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub fn wait(&self) -> Result<()> {
        unsafe { self.device.wait_for_fences(&[self.handle], true, u64::MAX)? };
        Ok(())
    }

    /// Reset the fence to the unsignaled state.
    pub fn reset(&self) -> Result<()> {
        unsafe { self.device.reset_fences(&[self.handle])? };
        Ok(())
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe { self.device.destroy_fence(self.handle, None) };
    }
}
