//! Per-frame uniform payload.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

/// Model, view and projection matrices as the vertex shader reads them.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct UniformBufferObject {
    pub model: Mat4,
    pub view: Mat4,
    pub proj: Mat4,
}

/// Model rotation speed, degrees per second about +Z.
pub const ROTATION_DEGREES_PER_SECOND: f32 = 45.0;

impl UniformBufferObject {
    /// Size of the payload in bytes.
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;

    /// Model spinning about +Z, viewed from (2, 2, 2) with +Z up.
    ///
    /// The projection's Y axis is flipped for Vulkan clip space.
    pub fn spinning(elapsed_seconds: f32, aspect: f32) -> Self {
        let model =
            Mat4::from_rotation_z((elapsed_seconds * ROTATION_DEGREES_PER_SECOND).to_radians());
        let view = Mat4::look_at_rh(Vec3::splat(2.0), Vec3::ZERO, Vec3::Z);
        let mut proj = Mat4::perspective_rh(45f32.to_radians(), aspect, 0.1, 10.0);
        proj.y_axis.y *= -1.0;

        Self { model, view, proj }
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use glam::Vec4;

    fn assert_vec4_eq(a: Vec4, b: Vec4) {
        for (x, y) in a.to_array().into_iter().zip(b.to_array()) {
            assert_abs_diff_eq!(x, y, epsilon = 1e-5);
        }
    }

    #[test]
    fn payload_is_192_bytes() {
        assert_eq!(UniformBufferObject::SIZE, 192);
        assert_eq!(std::mem::align_of::<UniformBufferObject>() % 16, 0);

        let ubo = UniformBufferObject::spinning(0.0, 1.0);
        assert_eq!(ubo.as_bytes().len(), 192);
    }

    #[test]
    fn model_rotates_45_degrees_per_second() {
        let ubo = UniformBufferObject::spinning(2.0, 1.0);
        // 90 degrees about Z maps +X to +Y
        let rotated = ubo.model * Vec4::new(1.0, 0.0, 0.0, 1.0);
        assert_vec4_eq(rotated, Vec4::new(0.0, 1.0, 0.0, 1.0));

        let still = UniformBufferObject::spinning(0.0, 1.0);
        assert_eq!(still.model, Mat4::IDENTITY);
    }

    #[test]
    fn view_looks_at_origin() {
        let ubo = UniformBufferObject::spinning(0.0, 1.0);
        let eye = ubo.view * Vec4::new(2.0, 2.0, 2.0, 1.0);
        assert_vec4_eq(eye, Vec4::new(0.0, 0.0, 0.0, 1.0));

        // Origin lies straight ahead on -Z in a right-handed view space
        let origin = ubo.view * Vec4::W;
        assert_abs_diff_eq!(origin.x, 0.0, epsilon = 1e-5);
        assert_abs_diff_eq!(origin.y, 0.0, epsilon = 1e-5);
        assert_abs_diff_eq!(origin.z, -(12f32).sqrt(), epsilon = 1e-5);
    }

    #[test]
    fn projection_flips_y_and_uses_aspect() {
        let wide = UniformBufferObject::spinning(0.0, 2.0);
        let reference = Mat4::perspective_rh(45f32.to_radians(), 2.0, 0.1, 10.0);

        assert_abs_diff_eq!(wide.proj.y_axis.y, -reference.y_axis.y, epsilon = 1e-6);
        assert_abs_diff_eq!(wide.proj.x_axis.x, reference.x_axis.x, epsilon = 1e-6);
        assert_abs_diff_eq!(
            wide.proj.x_axis.x * 2.0,
            reference.y_axis.y,
            epsilon = 1e-5
        );
    }
}
