//! Mip chain generation by repeated linear blits.

use crate::error::{GpuError, Result};
use crate::layout::{record_transition, MipRange};
use ash::vk;

/// Number of levels in a full mip chain: `floor(log2(max(width, height))) + 1`.
pub fn mip_levels(width: u32, height: u32) -> u32 {
    let largest = width.max(height).max(1);
    u32::BITS - largest.leading_zeros()
}

/// Extent of every level in the chain, base level first.
///
/// Each level halves the previous one, rounding down and never going below 1.
pub fn mip_extents(width: u32, height: u32) -> Vec<(u32, u32)> {
    let levels = mip_levels(width, height);
    let mut extent = (width.max(1), height.max(1));
    let mut extents = Vec::with_capacity(levels as usize);
    for _ in 0..levels {
        extents.push(extent);
        extent = ((extent.0 / 2).max(1), (extent.1 / 2).max(1));
    }
    extents
}

/// Fail unless `format` can be the source and destination of a linear blit.
pub fn check_linear_blit(format: vk::Format, properties: &vk::FormatProperties) -> Result<()> {
    if properties
        .optimal_tiling_features
        .contains(vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR)
    {
        Ok(())
    } else {
        Err(GpuError::UnsupportedBlitFormat(format))
    }
}

/// Record the mip chain for `image`.
///
/// Every level must be in `TRANSFER_DST_OPTIMAL` with level 0 holding the base
/// image. All levels end in `SHADER_READ_ONLY_OPTIMAL`.
///
/// # Safety
/// The device, command buffer and image must be valid and the command buffer recording.
#[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
pub unsafe fn record_mipmaps(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    format: vk::Format,
    width: u32,
    height: u32,
) -> Result<()> {
    let extents = mip_extents(width, height);

    for (level, pair) in (1u32..).zip(extents.windows(2)) {
        let (src, dst) = (pair[0], pair[1]);
        let src_level = level - 1;

        record_transition(
            device,
            cmd,
            image,
            format,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            MipRange::single(src_level),
        )?;

        let blit = vk::ImageBlit::default()
            .src_subresource(color_layer(src_level))
            .src_offsets([vk::Offset3D::default(), far_corner(src)])
            .dst_subresource(color_layer(level))
            .dst_offsets([vk::Offset3D::default(), far_corner(dst)]);

        device.cmd_blit_image(
            cmd,
            image,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[blit],
            vk::Filter::LINEAR,
        );

        record_transition(
            device,
            cmd,
            image,
            format,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            MipRange::single(src_level),
        )?;
    }

    // The last level was only ever a blit destination
    let last = extents.len() as u32 - 1;
    record_transition(
        device,
        cmd,
        image,
        format,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        MipRange::single(last),
    )
}

fn color_layer(mip_level: u32) -> vk::ImageSubresourceLayers {
    vk::ImageSubresourceLayers::default()
        .aspect_mask(vk::ImageAspectFlags::COLOR)
        .mip_level(mip_level)
        .base_array_layer(0)
        .layer_count(1)
}

fn far_corner((width, height): (u32, u32)) -> vk::Offset3D {
    vk::Offset3D {
        x: width as i32,
        y: height as i32,
        z: 1,
    }
}
