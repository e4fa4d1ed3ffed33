// Transform utilities for Mat4
//
// Extends glam::Mat4 with the conversions the renderer-facing graph needs.
// Note: glam::Mat4 is column-major; renderers expect row-major arrays.

use glam::{Mat4, Vec3};

/// Extension trait for Mat4 to provide additional transform utilities
pub trait Mat4Ext {
    /// Flatten to 16 floats in row-major order (translation in the last row).
    fn to_row_major(&self) -> [f32; 16];

    /// Component-wise comparison with an absolute tolerance.
    fn approx_eq(&self, other: &Mat4, epsilon: f32) -> bool;
}

impl Mat4Ext for Mat4 {
    fn to_row_major(&self) -> [f32; 16] {
        // glam's column array read as rows is exactly the row-vector convention
        self.to_cols_array()
    }

    fn approx_eq(&self, other: &Mat4, epsilon: f32) -> bool {
        self.to_cols_array()
            .iter()
            .zip(other.to_cols_array().iter())
            .all(|(a, b)| (a - b).abs() <= epsilon)
    }
}

/// View a point array as a flat float slice (x0, y0, z0, x1, ...).
pub fn points_as_floats(points: &[Vec3]) -> &[f32] {
    bytemuck::cast_slice(points)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_major_translation_last() {
        let mat = Mat4::from_translation(Vec3::new(10.0, 20.0, 30.0));
        let rows = mat.to_row_major();

        assert_eq!(&rows[12..15], &[10.0, 20.0, 30.0]);
        assert_eq!(rows[15], 1.0);
    }

    #[test]
    fn test_approx_eq() {
        let a = Mat4::from_rotation_y(std::f32::consts::FRAC_PI_4);
        let b = Mat4::from_rotation_y(std::f32::consts::FRAC_PI_4 + 1e-7);
        assert!(a.approx_eq(&b, 1e-5));
        assert!(!a.approx_eq(&Mat4::IDENTITY, 1e-5));
    }
}
