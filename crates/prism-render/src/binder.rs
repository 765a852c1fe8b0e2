//! Per-image uniform buffers and descriptor sets.

use crate::error::Result;
use crate::texture::Texture;
use crate::uniforms::UniformBufferObject;
use ash::vk;
use prism_gpu::{
    write_combined_image_sampler, write_uniform_buffer, DescriptorPool, DescriptorSetLayout,
    DescriptorSetLayoutBuilder, GpuBuffer, GpuContext, Visibility,
};
use std::sync::Arc;

/// Binding of the transform uniform buffer.
pub const UNIFORM_BINDING: u32 = 0;
/// Binding of the texture sampler.
pub const TEXTURE_BINDING: u32 = 1;

/// Layout shared by every per-image set: transforms for the vertex stage,
/// the texture for the fragment stage.
pub fn layout_builder<'a>() -> DescriptorSetLayoutBuilder<'a> {
    DescriptorSetLayoutBuilder::new()
        .uniform_buffer(UNIFORM_BINDING, vk::ShaderStageFlags::VERTEX)
        .combined_image_sampler(TEXTURE_BINDING, vk::ShaderStageFlags::FRAGMENT)
}

/// One host-visible uniform buffer and one descriptor set per swapchain image.
///
/// Keyed by image index rather than frame slot, so two frames in flight that
/// target different images never write the same buffer.
pub struct UniformBinder {
    sets: Vec<vk::DescriptorSet>,
    _pool: DescriptorPool,
    buffers: Vec<GpuBuffer>,
}

impl UniformBinder {
    pub fn new(
        gpu: &GpuContext,
        layout: &DescriptorSetLayout,
        texture: &Texture,
        image_count: usize,
    ) -> Result<Self> {
        let device: Arc<ash::Device> = gpu.device_arc();
        let count = image_count as u32;

        let buffers = (0..image_count)
            .map(|i| {
                gpu.allocator().allocate_buffer(
                    UniformBufferObject::SIZE,
                    vk::BufferUsageFlags::UNIFORM_BUFFER,
                    Visibility::HostVisible,
                    &format!("uniforms-{i}"),
                )
            })
            .collect::<prism_gpu::Result<Vec<_>>>()?;

        let pool = DescriptorPool::new(device.clone(), count, &layout_builder().pool_sizes(count))?;
        let sets = pool.allocate(&vec![layout.handle(); image_count])?;

        for (set, buffer) in sets.iter().zip(&buffers) {
            unsafe {
                write_uniform_buffer(
                    &device,
                    *set,
                    UNIFORM_BINDING,
                    buffer.handle(),
                    0,
                    UniformBufferObject::SIZE,
                );
                write_combined_image_sampler(
                    &device,
                    *set,
                    TEXTURE_BINDING,
                    texture.view(),
                    texture.sampler(),
                );
            }
        }

        tracing::debug!(image_count, "Descriptor sets written");

        Ok(Self {
            sets,
            _pool: pool,
            buffers,
        })
    }

    pub fn descriptor_set(&self, image_index: u32) -> vk::DescriptorSet {
        self.sets[image_index as usize]
    }

    /// Copy `ubo` into the buffer for `image_index`.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub fn update(&self, image_index: u32, ubo: &UniformBufferObject) -> Result<()> {
        self.buffers[image_index as usize].write_bytes(0, ubo.as_bytes())?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_holds_one_of_each_per_image() {
        let sizes = layout_builder().pool_sizes(3);
        assert_eq!(sizes.len(), 2);
        assert!(sizes
            .iter()
            .any(|s| s.ty == vk::DescriptorType::UNIFORM_BUFFER && s.descriptor_count == 3));
        assert!(sizes.iter().any(
            |s| s.ty == vk::DescriptorType::COMBINED_IMAGE_SAMPLER && s.descriptor_count == 3
        ));
    }
}
