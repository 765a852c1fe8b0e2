//! Renderer error types.

use prism_gpu::{ErrorKind, GpuError};
use thiserror::Error;

/// Errors raised while building or driving the renderer.
#[derive(Error, Debug)]
pub enum RenderError {
    /// Error from the GPU layer.
    #[error(transparent)]
    Gpu(#[from] GpuError),

    /// Texture could not be read or decoded.
    #[error("Failed to load texture {path}: {source}")]
    Texture {
        path: String,
        #[source]
        source: image::ImageError,
    },

    /// Mesh has no vertices or an index points past the vertex array.
    #[error("Invalid mesh: {0}")]
    InvalidMesh(String),

    /// Operation not allowed in the current swapchain state.
    #[error("Swapchain is {state:?}, cannot {operation}")]
    InvalidSwapchainState {
        state: crate::swapchain_manager::SwapchainState,
        operation: &'static str,
    },

    /// Renderer configuration rejected.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl RenderError {
    /// Classify the error for recovery.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Gpu(e) => e.kind(),
            _ => ErrorKind::Fatal,
        }
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, RenderError>;

#[cfg(test)]
mod tests {
    use super::*;
    use prism_gpu::vk;

    #[test]
    fn gpu_kind_is_preserved() {
        let transient = RenderError::from(GpuError::Vulkan(vk::Result::ERROR_OUT_OF_DATE_KHR));
        assert_eq!(transient.kind(), ErrorKind::Transient);

        let fatal = RenderError::from(GpuError::UnsupportedDepthFormat);
        assert_eq!(fatal.kind(), ErrorKind::Fatal);

        assert_eq!(
            RenderError::InvalidMesh("empty".into()).kind(),
            ErrorKind::Fatal
        );
    }
}
