//! Windowed application runner for the Prism renderer.
//!
//! Handles the boilerplate around [`prism_render::Renderer`]:
//! - Logging initialization
//! - Window creation and the winit event loop
//! - GPU context and surface setup
//! - Forwarding resizes and minimise state to the renderer
//!
//! # Example
//!
//! ```no_run
//! use prism_app::{run_app, AppConfig};
//! use prism_render::{Scene, TextureData};
//!
//! fn main() -> anyhow::Result<()> {
//!     let scene = Scene {
//!         mesh: Default::default(),
//!         texture: TextureData::solid(1, 1, [255; 4])?,
//!         vertex_shader: std::fs::read("shaders/mesh.vert.spv")?,
//!         fragment_shader: std::fs::read("shaders/mesh.frag.spv")?,
//!     };
//!     run_app(AppConfig::new("Prism"), scene)
//! }
//! ```

mod runner;
mod stats;
mod window;

pub use runner::{init_logging, run_app, AppConfig};
pub use stats::FrameStats;
pub use window::WindowSizeSource;

pub use prism_gpu::{GpuContext, GpuContextBuilder};
pub use prism_render::{FrameOutcome, Renderer, RendererConfig, Scene};
