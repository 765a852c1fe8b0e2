//! Sampled textures.

use crate::error::{RenderError, Result};
use ash::vk;
use prism_gpu::{GpuContext, GpuImage, ImageUpload, ImageView, Sampler, TransferPipeline};
use std::path::Path;

/// Decoded RGBA8 pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl TextureData {
    /// Decode an image file into RGBA8.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let image = image::open(path).map_err(|source| RenderError::Texture {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self::from_image(image))
    }

    /// Convert an already decoded image.
    pub fn from_image(image: image::DynamicImage) -> Self {
        let rgba = image.into_rgba8();
        Self {
            width: rgba.width(),
            height: rgba.height(),
            pixels: rgba.into_raw(),
        }
    }

    /// Single-colour texture, useful when a model has no texture.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Result<Self> {
        let texels = u64::from(width)
            .checked_mul(u64::from(height))
            .and_then(|n| usize::try_from(n).ok())
            .filter(|&n| n > 0)
            .ok_or_else(|| RenderError::Config(format!("Bad texture size {width}x{height}")))?;
        Ok(Self {
            width,
            height,
            pixels: rgba.repeat(texels),
        })
    }

    /// Mip-mapped sRGB upload of these pixels.
    pub fn as_upload(&self) -> ImageUpload<'_> {
        ImageUpload {
            texels: &self.pixels,
            width: self.width,
            height: self.height,
            format: Texture::FORMAT,
            mipmapped: true,
        }
    }
}

/// Mip-mapped texture with its view and sampler.
pub struct Texture {
    sampler: Sampler,
    view: ImageView,
    image: GpuImage,
}

impl Texture {
    pub const FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

    /// Upload `data` with a full mip chain.
    pub fn upload(gpu: &GpuContext, transfer: &TransferPipeline, data: &TextureData) -> Result<Self> {
        let image = transfer.upload_image(&data.as_upload(), "texture")?;

        let view = ImageView::new(
            gpu.device_arc(),
            image.handle(),
            Self::FORMAT,
            vk::ImageAspectFlags::COLOR,
            image.mip_levels(),
        )?;

        let sampler = Sampler::linear_repeat(
            gpu.device_arc(),
            gpu.capabilities().max_sampler_anisotropy,
        )?;

        tracing::info!(
            width = data.width,
            height = data.height,
            mip_levels = image.mip_levels(),
            "Texture uploaded"
        );

        Ok(Self {
            sampler,
            view,
            image,
        })
    }

    pub fn view(&self) -> vk::ImageView {
        self.view.handle()
    }

    pub fn sampler(&self) -> vk::Sampler {
        self.sampler.handle()
    }

    pub fn mip_levels(&self) -> u32 {
        self.image.mip_levels()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_to_rgba8() {
        let rgb = image::RgbImage::from_pixel(3, 2, image::Rgb([10, 20, 30]));
        let data = TextureData::from_image(image::DynamicImage::ImageRgb8(rgb));

        assert_eq!((data.width, data.height), (3, 2));
        assert_eq!(data.pixels.len(), 3 * 2 * 4);
        assert_eq!(&data.pixels[..4], &[10, 20, 30, 255]);
    }

    #[test]
    fn solid_fills_every_texel() {
        let data = TextureData::solid(2, 2, [1, 2, 3, 4]).unwrap();
        assert_eq!(data.pixels, [1u8, 2, 3, 4].repeat(4));
        assert!(TextureData::solid(0, 8, [0; 4]).is_err());
    }

    #[test]
    fn mismatched_pixels_fail_before_touching_the_device() {
        let data = TextureData {
            width: 4,
            height: 4,
            pixels: vec![0; 4],
        };
        assert!(matches!(
            data.as_upload().validate(),
            Err(prism_gpu::GpuError::InvalidState(_))
        ));
    }

    #[test]
    fn missing_file_is_a_texture_error() {
        let err = TextureData::load("/nonexistent/prism/texture.png").unwrap_err();
        assert!(matches!(err, RenderError::Texture { .. }));
    }
}
