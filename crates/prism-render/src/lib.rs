//! Frame rendering for Prism.
//!
//! Builds the swapchain-dependent resources on top of `prism-gpu` and drives
//! the per-frame protocol: wait for a free frame slot, acquire an image,
//! update its uniforms, record, submit, present, and rebuild the swapchain
//! when the surface changes.

pub mod binder;
pub mod error;
pub mod frame;
pub mod recorder;
pub mod render_pass;
pub mod renderer;
pub mod swapchain_manager;
pub mod targets;
pub mod texture;
pub mod uniforms;
pub mod vertex;

pub use binder::UniformBinder;
pub use error::{RenderError, Result};
pub use frame::{FrameBackend, FrameController, FrameOutcome, FrameRing, ImageTracker, ResizeSignal};
pub use recorder::{DrawCommand, DrawKind};
pub use renderer::{Renderer, RendererConfig, Scene};
pub use swapchain_manager::{
    ChainFactory, DeviceIdle, SurfaceSizeSource, SwapchainManager, SwapchainState,
};
pub use texture::{Texture, TextureData};
pub use uniforms::UniformBufferObject;
pub use vertex::{Mesh, MeshBuilder, Vertex};
