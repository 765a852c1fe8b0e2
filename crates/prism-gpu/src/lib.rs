//! Vulkan abstraction layer for the Prism renderer.
//!
//! This crate provides:
//! - Vulkan instance, device and surface setup
//! - GPU capability detection
//! - Memory allocation via gpu-allocator, one dedicated allocation per resource
//! - Staging uploads, image layout transitions and mip chain generation
//! - Command pools, fences and semaphores
//! - Swapchain negotiation and handling
//! - Descriptor, shader and graphics pipeline helpers
//!
//! Every wrapper that owns a Vulkan handle releases it on drop.

pub mod capabilities;
pub mod command;
pub mod context;
pub mod descriptors;
pub mod error;
pub mod instance;
pub mod layout;
pub mod memory;
pub mod mipmap;
pub mod pipeline;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;
pub mod transfer;
pub mod view;

pub use ash::vk;

pub use capabilities::{GpuCapabilities, GpuVendor};
pub use command::CommandPool;
pub use context::{GpuContext, GpuContextBuilder};
pub use descriptors::{
    write_combined_image_sampler, write_uniform_buffer, DescriptorPool, DescriptorSetLayout,
    DescriptorSetLayoutBuilder,
};
pub use error::{ErrorKind, GpuError, Result};
pub use layout::{has_stencil_component, transition_masks, MipRange, TransitionMasks};
pub use memory::{GpuBuffer, GpuImage, ResourceAllocator, Visibility};
pub use mipmap::mip_levels;
pub use pipeline::{GraphicsPipeline, GraphicsPipelineConfig};
pub use shader::ShaderModule;
pub use surface::{SurfaceContext, SwapchainSupport};
pub use swapchain::{AcquiredImage, Swapchain, SwapchainConfig};
pub use sync::{Fence, Semaphore};
pub use transfer::{ImageUpload, TransferPipeline};
pub use view::{ImageView, Sampler};
