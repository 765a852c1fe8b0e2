//! Prism model viewer
//!
//! Renders a spinning textured model with depth buffering, MSAA and mip-mapped
//! sampling.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p prism-viewer -- [OPTIONS]
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

mod args;
mod model;

use anyhow::Context;
use prism_app::{run_app, AppConfig};
use prism_render::{Scene, TextureData};

use crate::args::Args;

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;

fn main() {
    if let Err(e) = run() {
        // Logging may not be up yet if argument parsing failed
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let args = Args::parse(std::env::args().skip(1))?;
    if args.help {
        print_help();
        return Ok(());
    }

    prism_app::init_logging();
    let scene = load_scene(&args)?;

    run_app(
        AppConfig::new("Prism Viewer")
            .with_size(WIDTH, HEIGHT)
            .with_vsync(args.vsync)
            .with_frames_in_flight(args.frames_in_flight),
        scene,
    )
}

fn load_scene(args: &Args) -> anyhow::Result<Scene> {
    let mesh = match &args.model {
        Some(path) => model::load_obj(path)?,
        None => model::demo_mesh(),
    };
    let texture = match &args.texture {
        Some(path) => TextureData::load(path)?,
        None => model::checkerboard(256, 32),
    };

    let vertex_shader = std::fs::read(&args.vert)
        .with_context(|| format!("Failed to read vertex shader {}", args.vert.display()))?;
    let fragment_shader = std::fs::read(&args.frag)
        .with_context(|| format!("Failed to read fragment shader {}", args.frag.display()))?;

    tracing::info!(
        vertices = mesh.vertices.len(),
        indices = mesh.indices.len(),
        texture = ?(texture.width, texture.height),
        "Scene loaded"
    );

    Ok(Scene {
        mesh,
        texture,
        vertex_shader,
        fragment_shader,
    })
}

fn print_help() {
    eprintln!(
        "Prism model viewer

USAGE:
    cargo run -p prism-viewer -- [OPTIONS]

OPTIONS:
    --model <PATH>            OBJ model to display (default: two demo quads)
    --texture <PATH>          Texture image (default: checkerboard)
    --vert <PATH>             Vertex shader SPIR-V (default: {vert})
    --frag <PATH>             Fragment shader SPIR-V (default: {frag})
    --vsync                   Present with FIFO instead of MAILBOX
    --frames-in-flight <N>    Frames recorded ahead of the GPU (default: 2)
    -h, --help                Print this help message

ENVIRONMENT VARIABLES:
    RUST_LOG                  Set log level (e.g., info, debug, trace)",
        vert = args::DEFAULT_VERT,
        frag = args::DEFAULT_FRAG,
    );
}
