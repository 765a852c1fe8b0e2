//! Window side of the renderer's surface queries.

use prism_render::SurfaceSizeSource;
use std::sync::Arc;
use winit::window::Window;

/// Reports the window's framebuffer size to the swapchain manager.
pub struct WindowSizeSource {
    window: Arc<Window>,
}

impl WindowSizeSource {
    pub fn new(window: Arc<Window>) -> Self {
        Self { window }
    }
}

impl SurfaceSizeSource for WindowSizeSource {
    fn framebuffer_size(&self) -> (u32, u32) {
        let size = self.window.inner_size();
        (size.width, size.height)
    }

    // Called from inside event handlers, where the loop cannot be pumped.
    // The size only changes once the handler returns.
    fn wait_events(&self) -> bool {
        false
    }
}
