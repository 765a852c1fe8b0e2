//! GPU error types.

use ash::vk;
use thiserror::Error;

/// How a caller is expected to react to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Capability mismatch or setup failure. Abort.
    Fatal,
    /// The presentation surface changed. Rebuild the swapchain and drop the frame.
    Transient,
}

/// GPU-related errors.
#[derive(Error, Debug)]
pub enum GpuError {
    /// Vulkan error.
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    /// No suitable GPU found.
    #[error("No suitable GPU found")]
    NoSuitableDevice,

    /// The device ran out of memory while allocating a resource.
    #[error("Out of device memory")]
    OutOfDeviceMemory,

    /// No memory type satisfies both the resource requirements and the requested visibility.
    #[error("No memory type matches type bits {type_bits:#b} with properties {required:?}")]
    UnsupportedMemoryType {
        type_bits: u32,
        required: vk::MemoryPropertyFlags,
    },

    /// The (old, new) layout pair is not in the supported transition table.
    #[error("Unsupported layout transition: {old:?} -> {new:?}")]
    UnsupportedLayoutTransition {
        old: vk::ImageLayout,
        new: vk::ImageLayout,
    },

    /// The format cannot be blitted with linear filtering.
    #[error("Format {0:?} does not support linear blitting")]
    UnsupportedBlitFormat(vk::Format),

    /// None of the candidate depth formats is supported.
    #[error("No supported depth format")]
    UnsupportedDepthFormat,

    /// Memory allocation failed.
    #[error("Memory allocation failed: {0}")]
    AllocationFailed(String),

    /// Surface creation failed.
    #[error("Surface creation failed: {0}")]
    SurfaceCreation(String),

    /// Swapchain creation failed.
    #[error("Swapchain creation failed: {0}")]
    SwapchainCreation(String),

    /// Shader module creation failed.
    #[error("Shader module creation failed: {0}")]
    ShaderModule(String),

    /// Pipeline creation failed.
    #[error("Pipeline creation failed: {0}")]
    PipelineCreation(String),

    /// The swapchain no longer matches the surface.
    #[error("Swapchain is out of date")]
    OutOfDate,

    /// Invalid state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl GpuError {
    /// Classify the error for recovery.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::OutOfDate
            | Self::Vulkan(vk::Result::ERROR_OUT_OF_DATE_KHR | vk::Result::SUBOPTIMAL_KHR) => {
                ErrorKind::Transient
            }
            _ => ErrorKind::Fatal,
        }
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, GpuError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_date_is_transient() {
        for transient in [
            GpuError::OutOfDate,
            GpuError::Vulkan(vk::Result::ERROR_OUT_OF_DATE_KHR),
            GpuError::Vulkan(vk::Result::SUBOPTIMAL_KHR),
        ] {
            assert_eq!(transient.kind(), ErrorKind::Transient);
        }
    }

    #[test]
    fn capability_mismatches_are_fatal() {
        assert_eq!(GpuError::UnsupportedDepthFormat.kind(), ErrorKind::Fatal);
        assert_eq!(
            GpuError::UnsupportedBlitFormat(vk::Format::R8G8B8A8_SRGB).kind(),
            ErrorKind::Fatal
        );
        assert_eq!(
            GpuError::Vulkan(vk::Result::ERROR_DEVICE_LOST).kind(),
            ErrorKind::Fatal
        );
    }
}
