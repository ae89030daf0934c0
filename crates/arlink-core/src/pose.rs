//! Pose conversion from tracker matrices to node rotation and position
//!
//! The tracker reports each marker as a flat 16-element homogeneous matrix
//! (right-handed, marker relative to camera). A [`Pose`] is what an anchor
//! node needs from it: a rotation, the equivalent intrinsic X-Y-Z Euler
//! angles, and the position of the marker origin.

use bevy_math::{EulerRot, Mat3, Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::PoseError;

/// Number of elements in a flat pose payload
pub const POSE_ELEMENTS: usize = 16;

/// Homogeneous weights smaller than this are treated as affine (no divide)
const MIN_HOMOGENEOUS_W: f32 = 1e-8;

/// Storage order of the flat pose payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatrixLayout {
    /// OpenGL order: translation in elements 12, 13, 14
    #[default]
    ColumnMajor,
    /// Translation in elements 3, 7, 11
    RowMajor,
}

/// A validated 4x4 marker pose
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseMatrix(Mat4);

impl PoseMatrix {
    /// Reinterpret a flat payload as a matrix, rejecting wrong lengths and
    /// non-finite elements
    pub fn from_slice(values: &[f32], layout: MatrixLayout) -> Result<Self, PoseError> {
        if values.len() != POSE_ELEMENTS {
            return Err(PoseError::WrongLength(values.len()));
        }
        if let Some(index) = values.iter().position(|v| !v.is_finite()) {
            return Err(PoseError::NonFinite { index });
        }

        let mut elements = [0.0f32; POSE_ELEMENTS];
        elements.copy_from_slice(values);
        let matrix = Mat4::from_cols_array(&elements);

        Ok(Self(match layout {
            MatrixLayout::ColumnMajor => matrix,
            MatrixLayout::RowMajor => matrix.transpose(),
        }))
    }

    pub fn from_mat4(matrix: Mat4) -> Self {
        Self(matrix)
    }

    pub fn as_mat4(&self) -> &Mat4 {
        &self.0
    }

    /// Upper-left 3x3 block
    pub fn rotation_block(&self) -> Mat3 {
        Mat3::from_mat4(self.0)
    }

    /// Image of the origin under the full matrix, including the homogeneous
    /// divide
    pub fn origin(&self) -> Vec3 {
        let w_axis = self.0.w_axis;
        if w_axis.w.abs() < MIN_HOMOGENEOUS_W {
            w_axis.truncate()
        } else {
            w_axis.truncate() / w_axis.w
        }
    }
}

/// Rotation and position extracted from one tracking frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub rotation: Quat,
    /// Intrinsic X-Y-Z Euler angles in radians
    pub euler: Vec3,
    pub position: Vec3,
}

impl Pose {
    pub const IDENTITY: Self = Self {
        rotation: Quat::IDENTITY,
        euler: Vec3::ZERO,
        position: Vec3::ZERO,
    };

    pub fn from_matrix(matrix: &PoseMatrix) -> Self {
        let rotation = quat_from_rotation(&matrix.rotation_block());
        let (x, y, z) = rotation.to_euler(EulerRot::XYZ);

        Self {
            rotation,
            euler: Vec3::new(x, y, z),
            position: matrix.origin(),
        }
    }

    /// Convenience for a raw payload
    pub fn from_slice(values: &[f32], layout: MatrixLayout) -> Result<Self, PoseError> {
        PoseMatrix::from_slice(values, layout).map(|m| Self::from_matrix(&m))
    }

    /// Rotation rebuilt from the Euler angles, which is what nodes are
    /// assigned
    pub fn rotation_from_euler(&self) -> Quat {
        Quat::from_euler(EulerRot::XYZ, self.euler.x, self.euler.y, self.euler.z)
    }
}

/// Convert a rotation block to a unit quaternion.
///
/// Scale is stripped from each axis first. When the trace is not positive
/// the largest diagonal element picks the formula, so the square root is
/// always taken of a value of at least one.
pub fn quat_from_rotation(block: &Mat3) -> Quat {
    let x_axis = block.x_axis.normalize_or_zero();
    let y_axis = block.y_axis.normalize_or_zero();
    let z_axis = block.z_axis.normalize_or_zero();

    // mRC = row R, column C
    let (m00, m10, m20) = (x_axis.x, x_axis.y, x_axis.z);
    let (m01, m11, m21) = (y_axis.x, y_axis.y, y_axis.z);
    let (m02, m12, m22) = (z_axis.x, z_axis.y, z_axis.z);

    let trace = m00 + m11 + m22;

    let quat = if trace > 0.0 {
        let s = 0.5 / (trace + 1.0).sqrt();
        Quat::from_xyzw((m21 - m12) * s, (m02 - m20) * s, (m10 - m01) * s, 0.25 / s)
    } else if m00 > m11 && m00 > m22 {
        let s = 2.0 * (1.0 + m00 - m11 - m22).sqrt();
        Quat::from_xyzw(0.25 * s, (m01 + m10) / s, (m02 + m20) / s, (m21 - m12) / s)
    } else if m11 > m22 {
        let s = 2.0 * (1.0 + m11 - m00 - m22).sqrt();
        Quat::from_xyzw((m01 + m10) / s, 0.25 * s, (m12 + m21) / s, (m02 - m20) / s)
    } else {
        let s = 2.0 * (1.0 + m22 - m00 - m11).sqrt();
        Quat::from_xyzw((m02 + m20) / s, (m12 + m21) / s, 0.25 * s, (m10 - m01) / s)
    };

    quat.normalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::{FRAC_PI_2, FRAC_PI_3, FRAC_PI_4, PI};

    const EPS: f32 = 1e-5;

    fn column_major(matrix: Mat4) -> [f32; 16] {
        matrix.to_cols_array()
    }

    fn sample_rotations() -> Vec<Mat3> {
        let mut rotations = vec![
            Mat3::IDENTITY,
            Mat3::from_rotation_x(PI),
            Mat3::from_rotation_y(PI),
            Mat3::from_rotation_z(PI),
            Mat3::from_rotation_x(FRAC_PI_2),
            Mat3::from_rotation_y(-FRAC_PI_3),
            Mat3::from_rotation_z(3.0),
            Mat3::from_axis_angle(Vec3::new(1.0, 1.0, 0.0).normalize(), PI),
            Mat3::from_axis_angle(Vec3::new(-0.3, 0.8, 0.5).normalize(), 2.9),
        ];
        for (x, y, z) in [(0.1, 0.2, 0.3), (-1.2, 0.7, 2.5), (2.8, -0.4, -3.0), (FRAC_PI_4, 1.3, -FRAC_PI_4)] {
            rotations.push(Mat3::from_euler(EulerRot::XYZ, x, y, z));
        }
        rotations
    }

    #[test]
    fn test_identity_pose() {
        let pose = Pose::from_slice(&column_major(Mat4::IDENTITY), MatrixLayout::ColumnMajor).unwrap();

        assert!(pose.position.abs_diff_eq(Vec3::ZERO, EPS));
        assert!(pose.euler.abs_diff_eq(Vec3::ZERO, EPS));
        assert!(pose.rotation.abs_diff_eq(Quat::IDENTITY, EPS));
    }

    #[test]
    fn test_rotation_round_trip() {
        for rotation in sample_rotations() {
            let matrix = PoseMatrix::from_mat4(Mat4::from_mat3(rotation));
            let pose = Pose::from_matrix(&matrix);
            let rebuilt = Mat3::from_quat(pose.rotation_from_euler());

            assert!(
                rebuilt.abs_diff_eq(rotation, 1e-4),
                "round trip failed for {rotation:?}: got {rebuilt:?}"
            );
        }
    }

    #[test]
    fn test_matches_reference_conversion() {
        for rotation in sample_rotations() {
            let ours = quat_from_rotation(&rotation);
            let reference = Quat::from_mat3(&rotation);
            // q and -q are the same rotation
            assert_relative_eq!(ours.dot(reference).abs(), 1.0, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_half_turns_stay_finite() {
        for rotation in [Mat3::from_rotation_x(PI), Mat3::from_rotation_y(PI), Mat3::from_rotation_z(PI)] {
            let quat = quat_from_rotation(&rotation);
            assert!(quat.is_finite());
            assert!(quat.is_normalized());
        }
    }

    #[test]
    fn test_position_is_transformed_origin() {
        let transform = Mat4::from_rotation_translation(
            Quat::from_rotation_y(0.6),
            Vec3::new(12.5, -40.0, -310.0),
        );
        let pose = Pose::from_slice(&column_major(transform), MatrixLayout::ColumnMajor).unwrap();

        assert!(pose.position.abs_diff_eq(Vec3::new(12.5, -40.0, -310.0), EPS));
        assert!(pose.rotation.abs_diff_eq(Quat::from_rotation_y(0.6), EPS));
    }

    #[test]
    fn test_homogeneous_divide() {
        let mut transform = Mat4::from_translation(Vec3::new(2.0, 4.0, 6.0));
        transform.w_axis.w = 2.0;
        let pose = Pose::from_matrix(&PoseMatrix::from_mat4(transform));

        assert!(pose.position.abs_diff_eq(Vec3::new(1.0, 2.0, 3.0), EPS));
    }

    #[test]
    fn test_scaled_matrix_gives_unit_rotation() {
        let transform = Mat4::from_scale_rotation_translation(
            Vec3::splat(15.0),
            Quat::from_rotation_z(FRAC_PI_3),
            Vec3::new(1.0, 2.0, 3.0),
        );
        let pose = Pose::from_matrix(&PoseMatrix::from_mat4(transform));

        assert!(pose.rotation.is_normalized());
        assert!(pose.rotation.abs_diff_eq(Quat::from_rotation_z(FRAC_PI_3), EPS));
        assert!(pose.position.abs_diff_eq(Vec3::new(1.0, 2.0, 3.0), EPS));
    }

    #[test]
    fn test_row_major_layout() {
        let transform = Mat4::from_rotation_translation(
            Quat::from_rotation_x(0.4),
            Vec3::new(5.0, 6.0, 7.0),
        );
        let column = Pose::from_slice(&transform.to_cols_array(), MatrixLayout::ColumnMajor).unwrap();
        let row = Pose::from_slice(&transform.transpose().to_cols_array(), MatrixLayout::RowMajor).unwrap();

        assert!(column.position.abs_diff_eq(row.position, EPS));
        assert!(column.rotation.abs_diff_eq(row.rotation, EPS));
    }

    #[test]
    fn test_conversion_is_deterministic() {
        let values = column_major(Mat4::from_rotation_translation(
            Quat::from_axis_angle(Vec3::new(0.2, -0.9, 0.4).normalize(), 1.7),
            Vec3::new(-3.0, 8.0, -150.0),
        ));
        let first = Pose::from_slice(&values, MatrixLayout::ColumnMajor).unwrap();
        let second = Pose::from_slice(&values, MatrixLayout::ColumnMajor).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_malformed_payloads() {
        assert_eq!(
            PoseMatrix::from_slice(&[0.0; 15], MatrixLayout::ColumnMajor),
            Err(PoseError::WrongLength(15))
        );
        assert_eq!(
            PoseMatrix::from_slice(&[], MatrixLayout::ColumnMajor),
            Err(PoseError::WrongLength(0))
        );

        let mut values = column_major(Mat4::IDENTITY);
        values[13] = f32::NAN;
        assert_eq!(
            PoseMatrix::from_slice(&values, MatrixLayout::ColumnMajor),
            Err(PoseError::NonFinite { index: 13 })
        );
    }
}
