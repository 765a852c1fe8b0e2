//! Vertex layout and mesh de-duplication.

use crate::error::{RenderError, Result};
use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::mem::{offset_of, size_of};

/// Vertex consumed by the graphics pipeline.
///
/// Equality and hashing compare the raw bits of every component, so two
/// vertices are the same exactly when they would upload the same bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct Vertex {
    pub pos: Vec3,
    pub color: Vec3,
    pub tex_coord: Vec2,
}

impl Vertex {
    pub const fn new(pos: Vec3, color: Vec3, tex_coord: Vec2) -> Self {
        Self {
            pos,
            color,
            tex_coord,
        }
    }

    fn bits(&self) -> [u32; 8] {
        bytemuck::cast(*self)
    }

    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription::default()
            .binding(0)
            .stride(size_of::<Self>() as u32)
            .input_rate(vk::VertexInputRate::VERTEX)
    }

    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 3] {
        [
            vk::VertexInputAttributeDescription::default()
                .binding(0)
                .location(0)
                .format(vk::Format::R32G32B32_SFLOAT)
                .offset(offset_of!(Self, pos) as u32),
            vk::VertexInputAttributeDescription::default()
                .binding(0)
                .location(1)
                .format(vk::Format::R32G32B32_SFLOAT)
                .offset(offset_of!(Self, color) as u32),
            vk::VertexInputAttributeDescription::default()
                .binding(0)
                .location(2)
                .format(vk::Format::R32G32_SFLOAT)
                .offset(offset_of!(Self, tex_coord) as u32),
        ]
    }
}

impl PartialEq for Vertex {
    fn eq(&self, other: &Self) -> bool {
        self.bits() == other.bits()
    }
}

impl Eq for Vertex {}

impl Hash for Vertex {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bits().hash(state);
    }
}

/// Vertex and index arrays ready for upload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl Mesh {
    /// Reject empty meshes and out-of-range indices.
    pub fn validate(&self) -> Result<()> {
        if self.vertices.is_empty() {
            return Err(RenderError::InvalidMesh("mesh has no vertices".to_string()));
        }
        let count = self.vertices.len();
        if let Some(bad) = self.indices.iter().find(|&&i| i as usize >= count) {
            return Err(RenderError::InvalidMesh(format!(
                "index {bad} out of range for {count} vertices"
            )));
        }
        Ok(())
    }

    pub fn is_indexed(&self) -> bool {
        !self.indices.is_empty()
    }
}

/// Collapses identical vertices while recording the index stream.
#[derive(Debug, Default)]
pub struct MeshBuilder {
    unique: HashMap<Vertex, u32>,
    mesh: Mesh,
}

impl MeshBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one vertex to the index stream, reusing an existing slot if an
    /// identical vertex was already pushed. Returns the index written.
    pub fn push(&mut self, vertex: Vertex) -> u32 {
        let vertices = &mut self.mesh.vertices;
        let index = *self.unique.entry(vertex).or_insert_with(|| {
            vertices.push(vertex);
            (vertices.len() - 1) as u32
        });
        self.mesh.indices.push(index);
        index
    }

    pub fn unique_vertices(&self) -> usize {
        self.mesh.vertices.len()
    }

    pub fn build(self) -> Mesh {
        self.mesh
    }
}

impl Extend<Vertex> for MeshBuilder {
    fn extend<I: IntoIterator<Item = Vertex>>(&mut self, iter: I) {
        for vertex in iter {
            self.push(vertex);
        }
    }
}

impl FromIterator<Vertex> for MeshBuilder {
    fn from_iter<I: IntoIterator<Item = Vertex>>(iter: I) -> Self {
        let mut builder = Self::new();
        builder.extend(iter);
        builder
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(x: f32, u: f32) -> Vertex {
        Vertex::new(Vec3::new(x, 0.0, 0.0), Vec3::ONE, Vec2::new(u, 0.0))
    }

    #[test]
    fn layout_matches_shader_contract() {
        assert_eq!(size_of::<Vertex>(), 32);
        assert_eq!(Vertex::binding_description().stride, 32);

        let offsets: Vec<u32> = Vertex::attribute_descriptions()
            .iter()
            .map(|a| a.offset)
            .collect();
        assert_eq!(offsets, vec![0, 12, 24]);
    }

    #[test]
    fn identical_vertices_collapse() {
        let mut builder = MeshBuilder::new();
        builder.push(v(1.0, 0.5));
        builder.push(v(1.0, 0.5));

        let mesh = builder.build();
        assert_eq!(mesh.vertices.len(), 1);
        assert_eq!(mesh.indices, vec![0, 0]);
    }

    #[test]
    fn any_differing_field_keeps_vertices_apart() {
        let base = v(1.0, 0.5);
        let mut other_color = base;
        other_color.color = Vec3::ZERO;

        let mesh = [base, v(1.0, 0.25), other_color, base]
            .into_iter()
            .collect::<MeshBuilder>()
            .build();
        assert_eq!(mesh.vertices.len(), 3);
        assert_eq!(mesh.indices, vec![0, 1, 2, 0]);
    }

    #[test]
    fn signed_zero_is_a_distinct_vertex() {
        let mesh = [v(0.0, 0.0), v(-0.0, 0.0)]
            .into_iter()
            .collect::<MeshBuilder>()
            .build();
        assert_eq!(mesh.vertices.len(), 2);
    }

    #[test]
    fn validation_catches_bad_meshes() {
        assert!(Mesh::default().validate().is_err());

        let mesh = Mesh {
            vertices: vec![v(0.0, 0.0)],
            indices: vec![0, 1],
        };
        assert!(matches!(mesh.validate(), Err(RenderError::InvalidMesh(_))));

        let mesh = Mesh {
            vertices: vec![v(0.0, 0.0)],
            indices: vec![],
        };
        assert!(mesh.validate().is_ok());
        assert!(!mesh.is_indexed());
    }
}
