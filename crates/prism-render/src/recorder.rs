//! Per-frame command recording.

use crate::error::Result;
use crate::vertex::Mesh;
use ash::vk;
use prism_gpu::command::{begin_command_buffer, end_command_buffer};

/// Draw call issued for the mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawKind {
    Indexed { index_count: u32 },
    NonIndexed { vertex_count: u32 },
}

impl DrawKind {
    pub fn for_mesh(mesh: &Mesh) -> Self {
        if mesh.is_indexed() {
            Self::Indexed {
                index_count: mesh.indices.len() as u32,
            }
        } else {
            Self::NonIndexed {
                vertex_count: mesh.vertices.len() as u32,
            }
        }
    }
}

/// Everything one frame's draw sequence binds.
#[derive(Debug, Clone, Copy)]
pub struct DrawCommand {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
    pub clear_color: [f32; 4],
    pub pipeline: vk::Pipeline,
    pub pipeline_layout: vk::PipelineLayout,
    pub vertex_buffer: vk::Buffer,
    /// Required for [`DrawKind::Indexed`].
    pub index_buffer: Option<vk::Buffer>,
    pub descriptor_set: vk::DescriptorSet,
    pub kind: DrawKind,
}

/// Clear values for the colour and depth attachments, in attachment order.
pub fn clear_values(clear_color: [f32; 4]) -> [vk::ClearValue; 2] {
    [
        vk::ClearValue {
            color: vk::ClearColorValue {
                float32: clear_color,
            },
        },
        vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: 1.0,
                stencil: 0,
            },
        },
    ]
}

/// Full-extent viewport with the standard 0..1 depth range.
pub fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

pub fn full_scissor(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

/// Record the fixed draw sequence into `cmd`.
///
/// The buffer is reset first; its pool must allow per-buffer resets.
///
/// # Safety
/// Every handle in `draw` must be valid, and `cmd` must not be pending execution.
#[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
pub unsafe fn record_draw(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    draw: &DrawCommand,
) -> Result<()> {
    unsafe {
        device
            .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
            .map_err(prism_gpu::GpuError::from)?;
        begin_command_buffer(device, cmd, vk::CommandBufferUsageFlags::empty())?;

        let clear_values = clear_values(draw.clear_color);
        let render_pass_begin = vk::RenderPassBeginInfo::default()
            .render_pass(draw.render_pass)
            .framebuffer(draw.framebuffer)
            .render_area(full_scissor(draw.extent))
            .clear_values(&clear_values);

        device.cmd_begin_render_pass(cmd, &render_pass_begin, vk::SubpassContents::INLINE);
        device.cmd_set_viewport(cmd, 0, &[full_viewport(draw.extent)]);
        device.cmd_set_scissor(cmd, 0, &[full_scissor(draw.extent)]);
        device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, draw.pipeline);
        device.cmd_bind_vertex_buffers(cmd, 0, &[draw.vertex_buffer], &[0]);
        device.cmd_bind_descriptor_sets(
            cmd,
            vk::PipelineBindPoint::GRAPHICS,
            draw.pipeline_layout,
            0,
            &[draw.descriptor_set],
            &[],
        );

        match (draw.kind, draw.index_buffer) {
            (DrawKind::Indexed { index_count }, Some(index_buffer)) => {
                device.cmd_bind_index_buffer(cmd, index_buffer, 0, vk::IndexType::UINT32);
                device.cmd_draw_indexed(cmd, index_count, 1, 0, 0, 0);
            }
            (DrawKind::NonIndexed { vertex_count }, _) => {
                device.cmd_draw(cmd, vertex_count, 1, 0, 0);
            }
            (DrawKind::Indexed { .. }, None) => {
                device.cmd_end_render_pass(cmd);
                end_command_buffer(device, cmd)?;
                return Err(prism_gpu::GpuError::InvalidState(
                    "indexed draw recorded without an index buffer".to_string(),
                )
                .into());
            }
        }

        device.cmd_end_render_pass(cmd);
        end_command_buffer(device, cmd)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vertex::{MeshBuilder, Vertex};
    use glam::{Vec2, Vec3};

    #[test]
    fn draw_kind_follows_mesh() {
        let quad: MeshBuilder = [0.0, 1.0, 1.0, 0.0]
            .into_iter()
            .map(|x| Vertex::new(Vec3::new(x, 0.0, 0.0), Vec3::ONE, Vec2::ZERO))
            .collect();
        let mesh = quad.build();
        assert_eq!(DrawKind::for_mesh(&mesh), DrawKind::Indexed { index_count: 4 });

        let unindexed = Mesh {
            vertices: mesh.vertices.clone(),
            indices: Vec::new(),
        };
        assert_eq!(
            DrawKind::for_mesh(&unindexed),
            DrawKind::NonIndexed { vertex_count: 2 }
        );
    }

    #[test]
    fn clears_colour_and_far_depth() {
        let values = clear_values([0.0, 0.0, 0.0, 1.0]);
        unsafe {
            assert_eq!(values[0].color.float32, [0.0, 0.0, 0.0, 1.0]);
            assert_eq!(values[1].depth_stencil.depth, 1.0);
            assert_eq!(values[1].depth_stencil.stencil, 0);
        }
    }

    #[test]
    fn viewport_covers_extent() {
        let extent = vk::Extent2D {
            width: 800,
            height: 600,
        };
        let viewport = full_viewport(extent);
        assert_eq!((viewport.width, viewport.height), (800.0, 600.0));
        assert_eq!((viewport.min_depth, viewport.max_depth), (0.0, 1.0));
        assert_eq!(full_scissor(extent).extent, extent);
    }
}
