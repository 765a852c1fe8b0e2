//! Multisampled colour and depth attachments sized to the swapchain.

use crate::error::Result;
use ash::vk;
use prism_gpu::{
    has_stencil_component, GpuContext, GpuError, GpuImage, ImageView, TransferPipeline, Visibility,
};

/// Depth formats in order of preference.
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

const DEPTH_TILING: vk::ImageTiling = vk::ImageTiling::OPTIMAL;
const DEPTH_FEATURES: vk::FormatFeatureFlags = vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT;

/// First depth candidate usable as an optimal-tiling depth attachment.
pub fn depth_format(gpu: &GpuContext) -> Result<vk::Format> {
    require_depth_format(gpu.find_supported_format(
        &DEPTH_FORMAT_CANDIDATES,
        DEPTH_TILING,
        DEPTH_FEATURES,
    ))
}

fn require_depth_format(found: Option<vk::Format>) -> Result<vk::Format> {
    found.ok_or_else(|| GpuError::UnsupportedDepthFormat.into())
}

/// One attachment image with its view.
pub struct RenderTarget {
    view: ImageView,
    image: GpuImage,
}

impl RenderTarget {
    fn new(
        gpu: &GpuContext,
        extent: vk::Extent2D,
        format: vk::Format,
        samples: vk::SampleCountFlags,
        usage: vk::ImageUsageFlags,
        aspect: vk::ImageAspectFlags,
        name: &str,
    ) -> Result<Self> {
        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(samples)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = gpu
            .allocator()
            .allocate_image(&image_info, Visibility::DeviceLocal, name)?;
        let view = ImageView::new(gpu.device_arc(), image.handle(), format, aspect, 1)?;

        Ok(Self { view, image })
    }

    pub fn view(&self) -> vk::ImageView {
        self.view.handle()
    }

    pub fn format(&self) -> vk::Format {
        self.image.format()
    }
}

/// The multisampled colour and depth attachments shared by every framebuffer.
pub struct RenderTargets {
    pub color: RenderTarget,
    pub depth: RenderTarget,
    pub samples: vk::SampleCountFlags,
}

impl RenderTargets {
    /// Create both attachments and move the depth image into its attachment layout.
    pub fn new(
        gpu: &GpuContext,
        transfer: &TransferPipeline,
        extent: vk::Extent2D,
        color_format: vk::Format,
        depth_format: vk::Format,
        samples: vk::SampleCountFlags,
    ) -> Result<Self> {
        let color = RenderTarget::new(
            gpu,
            extent,
            color_format,
            samples,
            vk::ImageUsageFlags::TRANSIENT_ATTACHMENT | vk::ImageUsageFlags::COLOR_ATTACHMENT,
            vk::ImageAspectFlags::COLOR,
            "msaa-color",
        )?;

        let depth = RenderTarget::new(
            gpu,
            extent,
            depth_format,
            samples,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            vk::ImageAspectFlags::DEPTH,
            "depth",
        )?;
        transfer.transition_image(
            &depth.image,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        )?;

        tracing::debug!(
            width = extent.width,
            height = extent.height,
            samples = samples.as_raw(),
            depth_format = ?depth_format,
            stencil = has_stencil_component(depth_format),
            "Render targets created"
        );

        Ok(Self {
            color,
            depth,
            samples,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RenderError;
    use prism_gpu::context::pick_supported_format;

    fn choose(properties: impl FnMut(vk::Format) -> vk::FormatProperties) -> Option<vk::Format> {
        pick_supported_format(&DEPTH_FORMAT_CANDIDATES, DEPTH_TILING, DEPTH_FEATURES, properties)
    }

    fn supports(format: vk::Format) -> impl FnMut(vk::Format) -> vk::FormatProperties {
        move |f| {
            if f == format {
                vk::FormatProperties {
                    optimal_tiling_features: vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
                    ..Default::default()
                }
            } else {
                vk::FormatProperties::default()
            }
        }
    }

    #[test]
    fn prefers_d32() {
        let all = |_| vk::FormatProperties {
            optimal_tiling_features: vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            ..Default::default()
        };
        assert_eq!(choose(all), Some(vk::Format::D32_SFLOAT));
    }

    #[test]
    fn falls_back_through_candidates() {
        assert_eq!(
            choose(supports(vk::Format::D24_UNORM_S8_UINT)),
            Some(vk::Format::D24_UNORM_S8_UINT)
        );
    }

    #[test]
    fn no_depth_format_is_fatal() {
        let err = require_depth_format(choose(supports(vk::Format::D16_UNORM))).unwrap_err();
        assert!(matches!(
            err,
            RenderError::Gpu(GpuError::UnsupportedDepthFormat)
        ));
    }
}
