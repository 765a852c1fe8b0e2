//! OBJ model loading and the built-in demo scene.

use std::path::Path;

use anyhow::{bail, Context};
use glam::{Vec2, Vec3};
use prism_render::{Mesh, MeshBuilder, TextureData, Vertex};

fn load_options() -> tobj::LoadOptions {
    tobj::LoadOptions {
        triangulate: true,
        single_index: false,
        ..Default::default()
    }
}

/// Load every model in an OBJ file into one de-duplicated mesh.
pub fn load_obj(path: &Path) -> anyhow::Result<Mesh> {
    let (models, _materials) = tobj::load_obj(path, &load_options())
        .with_context(|| format!("Failed to load OBJ {}", path.display()))?;
    mesh_from_models(&models)
}

/// Parse OBJ text. Material libraries are ignored.
pub fn parse_obj(text: &str) -> anyhow::Result<Mesh> {
    let (models, _materials) = tobj::load_obj_buf(
        &mut std::io::Cursor::new(text),
        &load_options(),
        |_| Err(tobj::LoadError::OpenFileFailed),
    )
    .context("Failed to parse OBJ")?;
    mesh_from_models(&models)
}

/// Flatten `models` into white vertices with V flipped for Vulkan's image origin.
fn mesh_from_models(models: &[tobj::Model]) -> anyhow::Result<Mesh> {
    let mut builder = MeshBuilder::new();

    for model in models {
        let mesh = &model.mesh;
        for (corner, &index) in mesh.indices.iter().enumerate() {
            let p = index as usize * 3;
            let Some(pos) = mesh.positions.get(p..p + 3) else {
                bail!("{}: position index {index} out of range", model.name);
            };

            let tex_coord = if mesh.texcoords.is_empty() {
                Vec2::ZERO
            } else {
                let t = mesh.texcoord_indices.get(corner).copied().unwrap_or(index) as usize * 2;
                let Some(uv) = mesh.texcoords.get(t..t + 2) else {
                    bail!("{}: texcoord index {} out of range", model.name, t / 2);
                };
                Vec2::new(uv[0], 1.0 - uv[1])
            };

            builder.push(Vertex::new(
                Vec3::new(pos[0], pos[1], pos[2]),
                Vec3::ONE,
                tex_coord,
            ));
        }
    }

    let mesh = builder.build();
    if mesh.vertices.is_empty() {
        bail!("OBJ contains no faces");
    }
    Ok(mesh)
}

/// Two stacked coloured quads.
pub fn demo_mesh() -> Mesh {
    let corners = [
        (Vec2::new(-0.5, -0.5), Vec3::X, Vec2::new(1.0, 0.0)),
        (Vec2::new(0.5, -0.5), Vec3::Y, Vec2::new(0.0, 0.0)),
        (Vec2::new(0.5, 0.5), Vec3::Z, Vec2::new(0.0, 1.0)),
        (Vec2::new(-0.5, 0.5), Vec3::ONE, Vec2::new(1.0, 1.0)),
    ];
    let quad = [0usize, 1, 2, 2, 3, 0];

    [0.0, -0.5]
        .into_iter()
        .flat_map(|z| {
            quad.iter().map(move |&i| {
                let (xy, color, uv) = corners[i];
                Vertex::new(xy.extend(z), color, uv)
            })
        })
        .collect::<MeshBuilder>()
        .build()
}

/// Grey and white checkerboard with `cell`-pixel squares.
pub fn checkerboard(size: u32, cell: u32) -> TextureData {
    let cell = cell.max(1);
    let pixels = (0..size)
        .flat_map(|y| (0..size).map(move |x| ((x / cell) + (y / cell)) % 2 == 0))
        .flat_map(|light| if light { [255u8; 4] } else { [96, 96, 96, 255] })
        .collect();

    TextureData {
        width: size,
        height: size,
        pixels,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUAD_OBJ: &str = "\
o quad
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
vt 0 0
vt 1 0
vt 1 1
vt 0 1
f 1/1 2/2 3/3 4/4
";

    #[test]
    fn quad_is_triangulated_and_deduplicated() {
        let mesh = parse_obj(QUAD_OBJ).unwrap();
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.indices.len(), 6);
        mesh.validate().unwrap();
    }

    #[test]
    fn texcoords_are_flipped_and_colour_is_white() {
        let mesh = parse_obj(QUAD_OBJ).unwrap();
        let origin = mesh
            .vertices
            .iter()
            .find(|v| v.pos == Vec3::ZERO)
            .unwrap();
        assert_eq!(origin.tex_coord, Vec2::new(0.0, 1.0));
        assert!(mesh.vertices.iter().all(|v| v.color == Vec3::ONE));
    }

    #[test]
    fn shared_position_with_different_uv_stays_distinct() {
        let obj = "\
v 0 0 0
v 1 0 0
v 0 1 0
vt 0 0
vt 1 1
f 1/1 2/1 3/1
f 1/2 3/2 2/2
";
        let mesh = parse_obj(obj).unwrap();
        assert_eq!(mesh.vertices.len(), 6);
        assert_eq!(mesh.indices.len(), 6);
    }

    #[test]
    fn empty_obj_is_rejected() {
        assert!(parse_obj("# nothing\n").is_err());
    }

    #[test]
    fn demo_mesh_shares_quad_corners() {
        let mesh = demo_mesh();
        assert_eq!(mesh.vertices.len(), 8);
        assert_eq!(mesh.indices.len(), 12);
    }

    #[test]
    fn checkerboard_alternates() {
        let texture = checkerboard(4, 2);
        assert_eq!(texture.pixels.len(), 4 * 4 * 4);
        assert_eq!(&texture.pixels[..4], &[255, 255, 255, 255]);
        // Third texel of the first row sits in the next cell
        assert_eq!(&texture.pixels[8..12], &[96, 96, 96, 255]);
    }
}
