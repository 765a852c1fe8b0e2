//! The renderer: builds every GPU resource and drives one frame per call.

use crate::binder::{self, UniformBinder};
use crate::error::{RenderError, Result};
use crate::frame::{FrameBackend, FrameController, FrameOutcome, FrameSlot, ResizeSignal};
use crate::recorder::{record_draw, DrawCommand, DrawKind};
use crate::render_pass::{Framebuffers, RenderPass};
use crate::swapchain_manager::{SurfaceSizeSource, SwapchainManager, SwapchainState};
use crate::targets::{self, RenderTargets};
use crate::texture::{Texture, TextureData};
use crate::uniforms::UniformBufferObject;
use crate::vertex::{Mesh, Vertex};
use ash::vk;
use prism_gpu::command::submit_command_buffers;
use prism_gpu::{
    AcquiredImage, CommandPool, DescriptorSetLayout, GpuBuffer, GpuContext, GraphicsPipeline,
    GraphicsPipelineConfig, SurfaceContext, Swapchain, TransferPipeline,
};
use std::sync::Arc;
use std::time::Instant;

/// Renderer configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RendererConfig {
    /// Number of frames the CPU may record ahead of the GPU.
    pub frames_in_flight: usize,
    /// Prefer FIFO presentation.
    pub vsync: bool,
    pub clear_color: [f32; 4],
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            vsync: false,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

impl RendererConfig {
    pub fn validate(&self) -> Result<()> {
        self.slot_count().map(|_| ())
    }

    /// `frames_in_flight` as the command buffer count Vulkan takes.
    fn slot_count(&self) -> Result<u32> {
        match u32::try_from(self.frames_in_flight) {
            Ok(0) => Err(RenderError::Config(
                "frames_in_flight must be at least 1".to_string(),
            )),
            Ok(count) => Ok(count),
            Err(_) => Err(RenderError::Config(format!(
                "frames_in_flight {} does not fit in a u32",
                self.frames_in_flight
            ))),
        }
    }
}

/// CPU-side inputs the renderer uploads at startup.
#[derive(Debug, Clone)]
pub struct Scene {
    pub mesh: Mesh,
    pub texture: TextureData,
    /// SPIR-V of the vertex stage.
    pub vertex_shader: Vec<u8>,
    /// SPIR-V of the fragment stage.
    pub fragment_shader: Vec<u8>,
}

/// Everything sized or formatted after the current swapchain.
struct SwapchainResources {
    framebuffers: Framebuffers,
    pipeline: GraphicsPipeline,
    render_pass: RenderPass,
    _targets: RenderTargets,
}

impl SwapchainResources {
    /// render targets -> render pass -> pipeline -> framebuffers
    fn build(
        gpu: &GpuContext,
        transfer: &TransferPipeline,
        swapchain: &Swapchain,
        depth_format: vk::Format,
        pipeline_config: &GraphicsPipelineConfig,
        descriptor_layout: &DescriptorSetLayout,
    ) -> Result<Self> {
        let extent = swapchain.extent();
        let targets = RenderTargets::new(
            gpu,
            transfer,
            extent,
            swapchain.format(),
            depth_format,
            pipeline_config.samples,
        )?;
        let render_pass = RenderPass::new(
            gpu.device_arc(),
            swapchain.format(),
            depth_format,
            pipeline_config.samples,
        )?;
        let pipeline = GraphicsPipeline::new(
            gpu.device_arc(),
            pipeline_config,
            render_pass.handle(),
            &[descriptor_layout.handle()],
        )?;
        let framebuffers = Framebuffers::new(
            gpu.device_arc(),
            &render_pass,
            targets.color.view(),
            targets.depth.view(),
            swapchain.image_views(),
            extent,
        )?;

        Ok(Self {
            framebuffers,
            pipeline,
            render_pass,
            _targets: targets,
        })
    }
}

/// GPU state touched by the per-frame protocol.
///
/// Fields drop in declaration order: frame slots and per-image resources go
/// before the swapchain, which goes before the context.
struct RenderState {
    frames: Vec<FrameSlot>,
    _command_pool: CommandPool,
    binder: UniformBinder,
    resources: SwapchainResources,
    vertex_buffer: GpuBuffer,
    index_buffer: Option<GpuBuffer>,
    draw_kind: DrawKind,
    texture: Texture,
    descriptor_layout: DescriptorSetLayout,
    pipeline_config: GraphicsPipelineConfig,
    depth_format: vk::Format,
    clear_color: [f32; 4],
    started: Instant,
    swapchain: SwapchainManager,
    size_source: Box<dyn SurfaceSizeSource>,
    transfer: TransferPipeline,
    gpu: Arc<GpuContext>,
}

impl FrameBackend for RenderState {
    fn wait_fence(&mut self, slot: usize) -> Result<()> {
        Ok(self.frames[slot].in_flight.wait()?)
    }

    fn reset_fence(&mut self, slot: usize) -> Result<()> {
        Ok(self.frames[slot].in_flight.reset()?)
    }

    fn acquire(&mut self, slot: usize) -> Result<AcquiredImage> {
        let semaphore = self.frames[slot].image_available.handle();
        Ok(self.swapchain.swapchain()?.acquire_next_image(semaphore)?)
    }

    fn record(&mut self, slot: usize, image: u32) -> Result<()> {
        let extent = self.swapchain.swapchain()?.extent();
        let aspect = extent.width as f32 / extent.height.max(1) as f32;
        let ubo = UniformBufferObject::spinning(self.started.elapsed().as_secs_f32(), aspect);
        self.binder.update(image, &ubo)?;

        let draw = DrawCommand {
            render_pass: self.resources.render_pass.handle(),
            framebuffer: self.resources.framebuffers.get(image),
            extent,
            clear_color: self.clear_color,
            pipeline: self.resources.pipeline.handle(),
            pipeline_layout: self.resources.pipeline.layout(),
            vertex_buffer: self.vertex_buffer.handle(),
            index_buffer: self.index_buffer.as_ref().map(GpuBuffer::handle),
            descriptor_set: self.binder.descriptor_set(image),
            kind: self.draw_kind,
        };
        unsafe { record_draw(self.gpu.device(), self.frames[slot].command_buffer, &draw) }
    }

    fn submit(&mut self, slot: usize, _image: u32) -> Result<()> {
        let frame = &self.frames[slot];
        unsafe {
            submit_command_buffers(
                self.gpu.device(),
                self.gpu.graphics_queue(),
                &[frame.command_buffer],
                &[frame.image_available.handle()],
                &[vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT],
                &[frame.render_finished.handle()],
                frame.in_flight.handle(),
            )?;
        }
        Ok(())
    }

    fn present(&mut self, slot: usize, image: u32) -> Result<bool> {
        let wait = [self.frames[slot].render_finished.handle()];
        Ok(self
            .swapchain
            .swapchain()?
            .present(self.gpu.present_queue(), image, &wait)?)
    }

    fn recreate(&mut self) -> Result<Option<usize>> {
        self.swapchain.mark_stale()?;
        let Some(swapchain) = self
            .swapchain
            .recreate(&*self.gpu, self.size_source.as_ref())?
        else {
            return Ok(None);
        };

        let resources = SwapchainResources::build(
            &self.gpu,
            &self.transfer,
            swapchain,
            self.depth_format,
            &self.pipeline_config,
            &self.descriptor_layout,
        )?;
        let binder = UniformBinder::new(
            &self.gpu,
            &self.descriptor_layout,
            &self.texture,
            swapchain.image_count(),
        )?;
        let image_count = swapchain.image_count();

        self.resources = resources;
        self.binder = binder;
        Ok(Some(image_count))
    }
}

/// Draws a textured mesh into a window surface with N frames in flight.
pub struct Renderer {
    controller: FrameController,
    state: RenderState,
}

impl Renderer {
    /// Build every GPU resource.
    ///
    /// Order: swapchain, render targets, render pass, pipeline, framebuffers,
    /// mesh and texture uploads, uniform binder, frame slots.
    pub fn new(
        gpu: Arc<GpuContext>,
        surface: SurfaceContext,
        size_source: Box<dyn SurfaceSizeSource>,
        scene: &Scene,
        config: RendererConfig,
    ) -> Result<Self> {
        let slot_count = config.slot_count()?;
        scene.mesh.validate()?;

        let transfer = TransferPipeline::new(gpu.clone())?;

        let mut swapchain = SwapchainManager::new(surface, config.vsync);
        swapchain.create(size_source.as_ref())?;

        let depth_format = targets::depth_format(&gpu)?;
        let samples = gpu.capabilities().msaa_samples;
        let descriptor_layout = binder::layout_builder().build(gpu.device_arc())?;
        let pipeline_config = GraphicsPipelineConfig {
            vertex_shader: scene.vertex_shader.clone(),
            fragment_shader: scene.fragment_shader.clone(),
            vertex_bindings: vec![Vertex::binding_description()],
            vertex_attributes: Vertex::attribute_descriptions().to_vec(),
            samples,
            ..Default::default()
        };

        let resources = SwapchainResources::build(
            &gpu,
            &transfer,
            swapchain.swapchain()?,
            depth_format,
            &pipeline_config,
            &descriptor_layout,
        )?;

        let vertex_buffer = transfer.upload_buffer(
            bytemuck::cast_slice(&scene.mesh.vertices),
            vk::BufferUsageFlags::VERTEX_BUFFER,
            "vertices",
        )?;
        let index_buffer = if scene.mesh.is_indexed() {
            Some(transfer.upload_buffer(
                bytemuck::cast_slice(&scene.mesh.indices),
                vk::BufferUsageFlags::INDEX_BUFFER,
                "indices",
            )?)
        } else {
            None
        };
        let texture = Texture::upload(&gpu, &transfer, &scene.texture)?;

        let image_count = swapchain.swapchain()?.image_count();
        let binder = UniformBinder::new(&gpu, &descriptor_layout, &texture, image_count)?;

        let command_pool = CommandPool::new(
            gpu.device_arc(),
            gpu.graphics_queue_family(),
            vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
        )?;
        let device = gpu.device_arc();
        let frames = command_pool
            .allocate(slot_count)?
            .into_iter()
            .map(|cmd| FrameSlot::new(&device, cmd))
            .collect::<Result<Vec<_>>>()?;
        let controller = FrameController::new(frames.len(), image_count)?;

        tracing::info!(
            frames_in_flight = frames.len(),
            image_count,
            vertices = scene.mesh.vertices.len(),
            indices = scene.mesh.indices.len(),
            samples = samples.as_raw(),
            "Renderer ready"
        );

        Ok(Self {
            controller,
            state: RenderState {
                frames,
                _command_pool: command_pool,
                binder,
                resources,
                vertex_buffer,
                index_buffer,
                draw_kind: DrawKind::for_mesh(&scene.mesh),
                texture,
                descriptor_layout,
                pipeline_config,
                depth_format,
                clear_color: config.clear_color,
                started: Instant::now(),
                swapchain,
                size_source,
                transfer,
                gpu,
            },
        })
    }

    /// Render and present one frame.
    ///
    /// Out-of-date and suboptimal swapchains are rebuilt here; only fatal
    /// errors are returned. A rebuild while the window is 0x0 is put off
    /// until a later call.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub fn draw_frame(&mut self) -> Result<FrameOutcome> {
        self.controller.run_frame(&mut self.state)
    }

    /// Handle for the windowing layer to report resizes.
    pub fn resize_signal(&self) -> ResizeSignal {
        self.controller.resize_signal()
    }

    pub fn notify_resized(&self) {
        self.controller.resize_signal().notify();
    }

    pub fn swapchain_state(&self) -> SwapchainState {
        self.state.swapchain.state()
    }

    pub fn extent(&self) -> Result<vk::Extent2D> {
        Ok(self.state.swapchain.swapchain()?.extent())
    }

    pub fn frame_counter(&self) -> u64 {
        self.controller.frame_counter()
    }

    pub fn texture_mip_levels(&self) -> u32 {
        self.state.texture.mip_levels()
    }

    pub fn gpu(&self) -> &Arc<GpuContext> {
        &self.state.gpu
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.state.gpu.wait_idle() {
            tracing::warn!("wait_idle failed during renderer teardown: {e}");
        }
        tracing::info!(
            frames = self.controller.frame_counter(),
            "Renderer shut down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_double_buffers() {
        let config = RendererConfig::default();
        assert_eq!(config.frames_in_flight, 2);
        assert!(!config.vsync);
        assert_eq!(config.clear_color, [0.0, 0.0, 0.0, 1.0]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_frames_in_flight_is_rejected() {
        let config = RendererConfig {
            frames_in_flight: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(RenderError::Config(_))));
    }

    #[test]
    fn slot_count_matches_frames_in_flight() {
        let config = RendererConfig {
            frames_in_flight: 3,
            ..Default::default()
        };
        assert_eq!(config.slot_count().unwrap(), 3);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn frames_in_flight_beyond_u32_is_rejected() {
        let config = RendererConfig {
            frames_in_flight: u32::MAX as usize + 1,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(RenderError::Config(_))));
    }
}
