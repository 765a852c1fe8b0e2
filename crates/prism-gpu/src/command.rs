//! Command buffer management.

use crate::error::Result;
use crate::sync::Fence;
use ash::vk;
use std::sync::Arc;

/// Command pool for allocating command buffers. Destroyed on drop, which also
/// frees every buffer allocated from it.
pub struct CommandPool {
    pool: vk::CommandPool,
    queue_family: u32,
    device: Arc<ash::Device>,
}

impl CommandPool {
    /// Create a new command pool.
    pub fn new(
        device: Arc<ash::Device>,
        queue_family: u32,
        flags: vk::CommandPoolCreateFlags,
    ) -> Result<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(flags);

        let pool = unsafe { device.create_command_pool(&create_info, None)? };

        Ok(Self {
            pool,
            queue_family,
            device,
        })
    }

    /// Get the raw pool handle.
    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    /// Get the queue family index.
    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }

    /// Allocate primary command buffers.
    pub fn allocate(&self, count: u32) -> Result<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        let buffers = unsafe { self.device.allocate_command_buffers(&alloc_info)? };
        Ok(buffers)
    }

    /// Record `f` into a fresh command buffer, submit it to `queue` and block
    /// until the GPU has finished executing it.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub fn execute_one_shot<F>(&self, queue: vk::Queue, f: F) -> Result<()>
    where
        F: FnOnce(vk::CommandBuffer) -> Result<()>,
    {
        let cmd = self.allocate(1)?[0];
        let result = self.record_and_wait(cmd, queue, f);
        unsafe { self.device.free_command_buffers(self.pool, &[cmd]) };
        result
    }

    fn record_and_wait<F>(&self, cmd: vk::CommandBuffer, queue: vk::Queue, f: F) -> Result<()>
    where
        F: FnOnce(vk::CommandBuffer) -> Result<()>,
    {
        unsafe {
            begin_command_buffer(&self.device, cmd, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
        }
        f(cmd)?;
        unsafe { end_command_buffer(&self.device, cmd)? };

        let fence = Fence::new(self.device.clone(), false)?;
        unsafe {
            submit_command_buffers(&self.device, queue, &[cmd], &[], &[], &[], fence.handle())?;
        }
        fence.wait()
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe { self.device.destroy_command_pool(self.pool, None) };
    }
}

/// Begin recording a command buffer.
///
/// # Safety
/// The device and command buffer must be valid.
pub unsafe fn begin_command_buffer(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    flags: vk::CommandBufferUsageFlags,
) -> Result<()> {
    let begin_info = vk::CommandBufferBeginInfo::default().flags(flags);
    device.begin_command_buffer(cmd, &begin_info)?;
    Ok(())
}

/// End recording a command buffer.
///
/// # Safety
/// The device and command buffer must be valid.
pub unsafe fn end_command_buffer(device: &ash::Device, cmd: vk::CommandBuffer) -> Result<()> {
    device.end_command_buffer(cmd)?;
    Ok(())
}

/// Submit command buffers to a queue.
///
/// # Safety
/// All handles must be valid.
#[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
pub unsafe fn submit_command_buffers(
    device: &ash::Device,
    queue: vk::Queue,
    command_buffers: &[vk::CommandBuffer],
    wait_semaphores: &[vk::Semaphore],
    wait_stages: &[vk::PipelineStageFlags],
    signal_semaphores: &[vk::Semaphore],
    fence: vk::Fence,
) -> Result<()> {
    let submit_info = vk::SubmitInfo::default()
        .command_buffers(command_buffers)
        .wait_semaphores(wait_semaphores)
        .wait_dst_stage_mask(wait_stages)
        .signal_semaphores(signal_semaphores);

    device.queue_submit(queue, &[submit_info], fence)?;
    Ok(())
}
