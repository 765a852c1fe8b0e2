//! Staging uploads from host memory into device-local resources.
//!
//! Every operation records a one-shot command buffer and blocks until the GPU
//! has finished it. Staging buffers are released before returning.

use crate::command::CommandPool;
use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::layout::{record_transition, MipRange};
use crate::memory::{GpuBuffer, GpuImage, Visibility};
use crate::mipmap::{check_linear_blit, mip_levels, record_mipmaps};
use ash::vk;
use std::sync::Arc;

/// Description of a 2D image to upload.
#[derive(Debug, Clone, Copy)]
pub struct ImageUpload<'a> {
    pub texels: &'a [u8],
    pub width: u32,
    pub height: u32,
    pub format: vk::Format,
    /// Generate a full mip chain after the copy.
    pub mipmapped: bool,
}

/// Bytes per texel for the formats [`TransferPipeline::upload_image`] accepts.
pub fn bytes_per_texel(format: vk::Format) -> Option<u64> {
    match format {
        vk::Format::R8G8B8A8_SRGB
        | vk::Format::R8G8B8A8_UNORM
        | vk::Format::B8G8R8A8_SRGB
        | vk::Format::B8G8R8A8_UNORM => Some(4),
        _ => None,
    }
}

impl ImageUpload<'_> {
    /// Reject zero extents, unsupported formats and texel data that does not
    /// exactly cover the extent.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(GpuError::InvalidState(format!(
                "Image upload has zero extent {}x{}",
                self.width, self.height
            )));
        }
        let texel = bytes_per_texel(self.format).ok_or_else(|| {
            GpuError::InvalidState(format!("Unsupported upload format {:?}", self.format))
        })?;
        let expected = u64::from(self.width) * u64::from(self.height) * texel;
        if self.texels.len() as u64 != expected {
            return Err(GpuError::InvalidState(format!(
                "Image upload of {}x{} {:?} needs {expected} bytes, got {}",
                self.width,
                self.height,
                self.format,
                self.texels.len()
            )));
        }
        Ok(())
    }
}

/// Performs blocking transfers on the graphics queue.
pub struct TransferPipeline {
    pool: CommandPool,
    gpu: Arc<GpuContext>,
}

impl TransferPipeline {
    pub fn new(gpu: Arc<GpuContext>) -> Result<Self> {
        let pool = CommandPool::new(
            gpu.device_arc(),
            gpu.graphics_queue_family(),
            vk::CommandPoolCreateFlags::TRANSIENT,
        )?;
        Ok(Self { pool, gpu })
    }

    fn staging(&self, bytes: &[u8]) -> Result<GpuBuffer> {
        let staging = self.gpu.allocator().allocate_buffer(
            bytes.len() as u64,
            vk::BufferUsageFlags::TRANSFER_SRC,
            Visibility::HostVisible,
            "staging",
        )?;
        staging.write_bytes(0, bytes)?;
        Ok(staging)
    }

    /// Upload `bytes` into a new device-local buffer with `usage | TRANSFER_DST`.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub fn upload_buffer(
        &self,
        bytes: &[u8],
        usage: vk::BufferUsageFlags,
        name: &str,
    ) -> Result<GpuBuffer> {
        self.upload_buffer_to(bytes, usage, Visibility::DeviceLocal, name)
    }

    /// Like [`upload_buffer`](Self::upload_buffer) with an explicit destination visibility.
    pub fn upload_buffer_to(
        &self,
        bytes: &[u8],
        usage: vk::BufferUsageFlags,
        visibility: Visibility,
        name: &str,
    ) -> Result<GpuBuffer> {
        if bytes.is_empty() {
            return Err(GpuError::InvalidState(format!("Empty upload for {name}")));
        }

        let staging = self.staging(bytes)?;
        let destination = self.gpu.allocator().allocate_buffer(
            bytes.len() as u64,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            visibility,
            name,
        )?;

        self.copy_buffer(&staging, &destination)?;

        tracing::debug!(name, bytes = bytes.len(), "Buffer uploaded");
        Ok(destination)
    }

    /// Copy the whole of `src` into `dst`.
    pub fn copy_buffer(&self, src: &GpuBuffer, dst: &GpuBuffer) -> Result<()> {
        let size = src.size().min(dst.size());
        let device = self.gpu.device();

        self.pool.execute_one_shot(self.gpu.graphics_queue(), |cmd| {
            let region = vk::BufferCopy::default().size(size);
            unsafe { device.cmd_copy_buffer(cmd, src.handle(), dst.handle(), &[region]) };
            Ok(())
        })
    }

    /// Upload texels into a new sampled image, leaving every level in
    /// `SHADER_READ_ONLY_OPTIMAL`.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub fn upload_image(&self, upload: &ImageUpload<'_>, name: &str) -> Result<GpuImage> {
        upload.validate()?;

        let levels = if upload.mipmapped {
            check_linear_blit(upload.format, &self.gpu.format_properties(upload.format))?;
            mip_levels(upload.width, upload.height)
        } else {
            1
        };

        let staging = self.staging(upload.texels)?;

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(upload.format)
            .extent(vk::Extent3D {
                width: upload.width,
                height: upload.height,
                depth: 1,
            })
            .mip_levels(levels)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(
                vk::ImageUsageFlags::TRANSFER_SRC
                    | vk::ImageUsageFlags::TRANSFER_DST
                    | vk::ImageUsageFlags::SAMPLED,
            )
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = self
            .gpu
            .allocator()
            .allocate_image(&image_info, Visibility::DeviceLocal, name)?;

        let device = self.gpu.device();
        self.pool.execute_one_shot(self.gpu.graphics_queue(), |cmd| unsafe {
            record_transition(
                device,
                cmd,
                image.handle(),
                upload.format,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                MipRange::all(levels),
            )?;

            let region = vk::BufferImageCopy::default()
                .buffer_offset(0)
                .buffer_row_length(0)
                .buffer_image_height(0)
                .image_subresource(
                    vk::ImageSubresourceLayers::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .mip_level(0)
                        .base_array_layer(0)
                        .layer_count(1),
                )
                .image_offset(vk::Offset3D::default())
                .image_extent(image_info.extent);

            device.cmd_copy_buffer_to_image(
                cmd,
                staging.handle(),
                image.handle(),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );

            if upload.mipmapped {
                record_mipmaps(
                    device,
                    cmd,
                    image.handle(),
                    upload.format,
                    upload.width,
                    upload.height,
                )
            } else {
                record_transition(
                    device,
                    cmd,
                    image.handle(),
                    upload.format,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    MipRange::single(0),
                )
            }
        })?;

        tracing::debug!(
            name,
            width = upload.width,
            height = upload.height,
            mip_levels = levels,
            "Image uploaded"
        );
        Ok(image)
    }

    /// Move every level of `image` from `old` to `new`.
    pub fn transition_image(
        &self,
        image: &GpuImage,
        old: vk::ImageLayout,
        new: vk::ImageLayout,
    ) -> Result<()> {
        let device = self.gpu.device();
        self.pool
            .execute_one_shot(self.gpu.graphics_queue(), |cmd| unsafe {
                record_transition(
                    device,
                    cmd,
                    image.handle(),
                    image.format(),
                    old,
                    new,
                    MipRange::all(image.mip_levels()),
                )
            })
    }

    /// Copy a device buffer into host-visible memory and return its contents.
    pub fn read_back(&self, buffer: &GpuBuffer) -> Result<Vec<u8>> {
        let readback = self.gpu.allocator().allocate_buffer(
            buffer.size(),
            vk::BufferUsageFlags::TRANSFER_DST,
            Visibility::HostReadback,
            "readback",
        )?;
        self.copy_buffer(buffer, &readback)?;
        readback.read_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgba(texels: &[u8], width: u32, height: u32) -> ImageUpload<'_> {
        ImageUpload {
            texels,
            width,
            height,
            format: vk::Format::R8G8B8A8_SRGB,
            mipmapped: true,
        }
    }

    #[test]
    fn exact_texel_data_is_accepted() {
        let texels = vec![0u8; 4 * 4 * 4];
        assert!(rgba(&texels, 4, 4).validate().is_ok());
    }

    #[test]
    fn short_texel_data_is_rejected() {
        let texels = vec![0u8; 4];
        assert!(matches!(
            rgba(&texels, 4, 4).validate(),
            Err(GpuError::InvalidState(_))
        ));
        let long = vec![0u8; 4 * 4 * 4 + 1];
        assert!(rgba(&long, 4, 4).validate().is_err());
    }

    #[test]
    fn zero_extent_and_empty_data_are_rejected() {
        assert!(rgba(&[], 0, 0).validate().is_err());
        assert!(rgba(&[0; 4], 1, 0).validate().is_err());
        assert!(rgba(&[0; 4], 0, 1).validate().is_err());
        assert!(rgba(&[], 1, 1).validate().is_err());
    }

    #[test]
    fn unknown_formats_are_rejected() {
        let upload = ImageUpload {
            format: vk::Format::R16G16B16A16_SFLOAT,
            ..rgba(&[0; 8], 1, 1)
        };
        assert!(upload.validate().is_err());
        assert_eq!(bytes_per_texel(vk::Format::B8G8R8A8_UNORM), Some(4));
    }
}
