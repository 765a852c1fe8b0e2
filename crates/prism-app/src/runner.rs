//! Application runner and event loop.

use std::sync::Arc;
use std::thread;
use std::time::Instant;

use prism_gpu::GpuContextBuilder;
use prism_render::{FrameOutcome, Renderer, RendererConfig, Scene};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::stats::{frame_budget, FrameStats};
use crate::window::WindowSizeSource;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Window title.
    pub title: String,
    /// Initial window width.
    pub width: u32,
    /// Initial window height.
    pub height: u32,
    /// Target frames per second (None for unlimited).
    pub target_fps: Option<u32>,
    /// Enable vsync.
    pub vsync: bool,
    /// Enable Vulkan validation layers (default: debug builds only).
    pub validation: bool,
    /// Frames the CPU may record ahead of the GPU.
    pub frames_in_flight: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "Prism".to_string(),
            width: 1280,
            height: 720,
            target_fps: None,
            vsync: false,
            validation: cfg!(debug_assertions),
            frames_in_flight: 2,
        }
    }
}

impl AppConfig {
    /// Create a new config with the given title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Set the window dimensions.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set the target FPS.
    pub fn with_target_fps(mut self, fps: u32) -> Self {
        self.target_fps = Some(fps);
        self
    }

    /// Enable or disable vsync.
    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    /// Enable or disable validation layers.
    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    pub fn with_frames_in_flight(mut self, frames: usize) -> Self {
        self.frames_in_flight = frames;
        self
    }

    pub fn renderer_config(&self) -> RendererConfig {
        RendererConfig {
            frames_in_flight: self.frames_in_flight,
            vsync: self.vsync,
            ..Default::default()
        }
    }
}

/// Install the global `tracing` subscriber. `RUST_LOG` overrides the default `info` filter.
pub fn init_logging() {
    let result = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
    if result.is_err() {
        debug!("Logging already initialised");
    }
}

/// Open a window and render `scene` until it is closed.
///
/// Initializes logging, creates the window, GPU context and renderer, and
/// runs the event loop. Fatal errors end the loop and are returned.
pub fn run_app(config: AppConfig, scene: Scene) -> anyhow::Result<()> {
    init_logging();
    info!("{} starting...", config.title);

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut runner = AppRunner {
        config,
        scene,
        state: None,
        failure: None,
    };

    event_loop.run_app(&mut runner)?;

    match runner.failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Internal application runner that implements winit's ApplicationHandler.
struct AppRunner {
    config: AppConfig,
    scene: Scene,
    state: Option<AppState>,
    failure: Option<anyhow::Error>,
}

/// Internal application state. The renderer drops before the window it presents to.
struct AppState {
    renderer: Renderer,
    window: Arc<Window>,
    stats: FrameStats,
    minimised: bool,
    target_frame_time: Option<std::time::Duration>,
}

impl AppRunner {
    /// Stop the loop. `run_app` returns `e` to the caller, which reports it.
    fn fail(&mut self, event_loop: &ActiveEventLoop, e: anyhow::Error) {
        if let Some(mut state) = self.state.take() {
            state.cleanup();
        }
        self.failure.get_or_insert(e);
        event_loop.exit();
    }

    fn create_state(&self, event_loop: &ActiveEventLoop) -> anyhow::Result<AppState> {
        let window_attrs = Window::default_attributes()
            .with_title(&self.config.title)
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height));

        let window = Arc::new(event_loop.create_window(window_attrs)?);

        let (gpu, surface) = GpuContextBuilder::new()
            .app_name(&self.config.title)
            .validation(self.config.validation)
            .build_for_window(window.as_ref())?;

        info!("GPU: {}", gpu.capabilities().summary());

        let renderer = Renderer::new(
            gpu,
            surface,
            Box::new(WindowSizeSource::new(window.clone())),
            &self.scene,
            self.config.renderer_config(),
        )?;

        Ok(AppState {
            renderer,
            window,
            stats: FrameStats::new(Instant::now()),
            minimised: false,
            target_frame_time: frame_budget(self.config.target_fps),
        })
    }
}

impl ApplicationHandler for AppRunner {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        info!("Creating application state...");

        match self.create_state(event_loop) {
            Ok(state) => {
                self.state = Some(state);
                info!("Application ready!");
            }
            Err(e) => self.fail(event_loop, e.context("Failed to initialize application")),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                if let Some(mut state) = self.state.take() {
                    state.cleanup();
                }
                event_loop.exit();
            }
            WindowEvent::RedrawRequested => {
                let Some(state) = &mut self.state else {
                    return;
                };
                if let Err(e) = state.render_frame() {
                    self.fail(event_loop, e.context("Render error"));
                }
            }
            WindowEvent::Resized(size) => {
                if let Some(state) = &mut self.state {
                    state.handle_resize(size);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            state.window.request_redraw();
        }
    }
}

impl AppState {
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    fn render_frame(&mut self) -> anyhow::Result<()> {
        if self.minimised {
            return Ok(());
        }

        let frame_start = Instant::now();

        match self.renderer.draw_frame()? {
            FrameOutcome::Presented => {}
            FrameOutcome::Deferred => debug!("Swapchain rebuild waiting for a non-zero size"),
            outcome => debug!(?outcome, "Swapchain rebuilt"),
        }
        self.stats.record(Instant::now());

        if let Some(target) = self.target_frame_time {
            let elapsed = frame_start.elapsed();
            if elapsed < target {
                thread::sleep(target - elapsed);
            }
        }

        Ok(())
    }

    fn handle_resize(&mut self, size: PhysicalSize<u32>) {
        self.minimised = size.width == 0 || size.height == 0;
        if self.minimised {
            debug!("Window minimised, pausing rendering");
            return;
        }
        self.renderer.notify_resized();
        info!("Resized to {}x{}", size.width, size.height);
    }

    fn cleanup(&mut self) {
        if let Some((min, max, avg)) = self.stats.summary() {
            info!("FPS Statistics:");
            info!("  Min: {min:.1}");
            info!("  Max: {max:.1}");
            info!("  Avg: {avg:.1}");
            info!("  Total frames: {}", self.renderer.frame_counter());
        }
        info!("Starting cleanup...");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let config = AppConfig::new("viewer")
            .with_size(800, 600)
            .with_vsync(true)
            .with_target_fps(60)
            .with_validation(false)
            .with_frames_in_flight(3);

        assert_eq!(config.title, "viewer");
        assert_eq!((config.width, config.height), (800, 600));
        assert_eq!(config.target_fps, Some(60));
        assert!(!config.validation);

        let renderer = config.renderer_config();
        assert_eq!(renderer.frames_in_flight, 3);
        assert!(renderer.vsync);
    }

    #[test]
    fn defaults_match_double_buffered_window() {
        let config = AppConfig::default();
        assert_eq!((config.width, config.height), (1280, 720));
        assert!(!config.vsync);
        assert_eq!(config.frames_in_flight, 2);
        assert_eq!(config.validation, cfg!(debug_assertions));
    }
}
