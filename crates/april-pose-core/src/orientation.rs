//! Orientation engine: detector rotation matrices to yaw/pitch/roll.
//!
//! Angles are intrinsic Tait-Bryan angles expressed from the marker's own
//! perspective. Decomposition and composition are exact inverses of each
//! other: `R = R_x(roll) * R_y(pitch) * R_z(yaw)`.

use nalgebra::{Matrix3, Quaternion, Rotation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::coords::AxisConvention;

/// How the marker's own frame is interpreted when deriving angles.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrientationConvention {
    /// Rotate by 180 degrees about the marker's x axis after remapping, so
    /// the printed-upright pose reads as zero roll (ArUco-style).
    ///
    /// The zero pose is the detector rotation `diag(-1, -1, 1)`, a marker
    /// seen square-on; the identity matrix reads as a roll of +/-pi.
    MarkerFacing,
    /// Use the remapped detector rotation as-is.
    #[default]
    Raw,
}

impl OrientationConvention {
    /// Map the `aruco_orientation` flag used in configuration onto a convention.
    pub fn from_aruco_flag(aruco_orientation: bool) -> Self {
        if aruco_orientation {
            Self::MarkerFacing
        } else {
            Self::Raw
        }
    }
}

/// Quaternion of `diag(1, -1, -1)`.
fn marker_facing_correction() -> UnitQuaternion<f64> {
    UnitQuaternion::new_unchecked(Quaternion::new(0.0, 1.0, 0.0, 0.0))
}

/// Quaternion of `diag(-1, 1, -1)`.
fn legacy_correction() -> UnitQuaternion<f64> {
    UnitQuaternion::new_unchecked(Quaternion::new(0.0, 0.0, 1.0, 0.0))
}

/// Convert a (near-)orthonormal rotation matrix into a unit quaternion with a
/// non-negative scalar part.
pub fn quaternion_from_matrix(matrix: &Matrix3<f64>) -> UnitQuaternion<f64> {
    let q = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(*matrix));
    canonical(q)
}

fn canonical(q: UnitQuaternion<f64>) -> UnitQuaternion<f64> {
    if q.w < 0.0 {
        UnitQuaternion::new_unchecked(-q.into_inner())
    } else {
        q
    }
}

/// The orientation of a marker in 3D space.
///
/// Yaw, pitch, roll and the rotation matrix always come from the standard
/// remapped rotation. The `rot_*` accessors follow the [`AxisConvention`]
/// the orientation was built with, and only differ under
/// [`AxisConvention::Legacy`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Orientation {
    quaternion: UnitQuaternion<f64>,
    axis_quaternion: UnitQuaternion<f64>,
}

impl Orientation {
    /// Build from a rotation matrix in the detector's camera frame.
    pub fn from_rotation_matrix(matrix: &Matrix3<f64>, convention: OrientationConvention) -> Self {
        Self::from_rotation_matrix_with(matrix, convention, AxisConvention::Standard)
    }

    /// Build from a detector rotation matrix with an explicit axis convention.
    ///
    /// Under the legacy convention the `rot_*` accessors read the detector
    /// frame flipped to face the camera, ignoring the orientation convention.
    pub fn from_rotation_matrix_with(
        matrix: &Matrix3<f64>,
        convention: OrientationConvention,
        axes: AxisConvention,
    ) -> Self {
        let initial = quaternion_from_matrix(matrix);
        let remapped = UnitQuaternion::new_normalize(Quaternion::new(
            initial.w,
            -initial.k,
            -initial.i,
            initial.j,
        ));
        let quaternion = match convention {
            OrientationConvention::MarkerFacing => remapped * marker_facing_correction(),
            OrientationConvention::Raw => remapped,
        };
        let axis_quaternion = match axes {
            AxisConvention::Standard => quaternion,
            AxisConvention::Legacy => initial * legacy_correction(),
        };
        Self {
            quaternion,
            axis_quaternion,
        }
    }

    fn from_quaternion(quaternion: UnitQuaternion<f64>) -> Self {
        Self {
            quaternion,
            axis_quaternion: quaternion,
        }
    }

    /// Build from a rotation already expressed in the world frame.
    pub fn from_world_rotation(matrix: &Matrix3<f64>) -> Self {
        Self::from_quaternion(quaternion_from_matrix(matrix))
    }

    /// Build from yaw, pitch and roll in radians.
    pub fn from_yaw_pitch_roll(yaw: f64, pitch: f64, roll: f64) -> Self {
        Self::from_quaternion(to_quaternion(yaw, pitch, roll))
    }

    /// Rotation about the vertical axis, clockwise positive from the marker's
    /// perspective. Zero when the marker faces the camera square-on.
    #[inline]
    pub fn yaw(&self) -> f64 {
        self.yaw_pitch_roll()[0]
    }

    /// Rotation about the transverse axis, upward positive.
    #[inline]
    pub fn pitch(&self) -> f64 {
        self.yaw_pitch_roll()[1]
    }

    /// Rotation about the longitudinal axis, clockwise positive.
    #[inline]
    pub fn roll(&self) -> f64 {
        self.yaw_pitch_roll()[2]
    }

    /// Rotation about the x axis: [`Orientation::roll`] in the standard
    /// convention. Legacy: inverted pitch, +/-pi for a square-on marker.
    #[inline]
    pub fn rot_x(&self) -> f64 {
        tait_bryan(&self.axis_quaternion)[2]
    }

    /// Rotation about the y axis: [`Orientation::pitch`] in the standard
    /// convention. Legacy: inverted yaw.
    #[inline]
    pub fn rot_y(&self) -> f64 {
        tait_bryan(&self.axis_quaternion)[1]
    }

    /// Rotation about the z axis: [`Orientation::yaw`] in the standard
    /// convention. Legacy: roll.
    #[inline]
    pub fn rot_z(&self) -> f64 {
        tait_bryan(&self.axis_quaternion)[0]
    }

    /// `[yaw, pitch, roll]` in radians.
    ///
    /// At exactly +/-90 degrees of pitch the split between yaw and roll is
    /// arbitrary; the values stay finite.
    pub fn yaw_pitch_roll(&self) -> [f64; 3] {
        tait_bryan(&self.quaternion)
    }

    /// The unit quaternion behind yaw, pitch and roll.
    #[inline]
    pub fn quaternion(&self) -> UnitQuaternion<f64> {
        self.quaternion
    }

    /// The unit quaternion behind the `rot_*` accessors.
    #[inline]
    pub fn axis_quaternion(&self) -> UnitQuaternion<f64> {
        self.axis_quaternion
    }

    /// The equivalent 3x3 rotation matrix.
    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        self.quaternion.to_rotation_matrix().into_inner()
    }
}

impl std::fmt::Display for Orientation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let [yaw, pitch, roll] = self.yaw_pitch_roll();
        write!(f, "Orientation(yaw={yaw:.4}, pitch={pitch:.4}, roll={roll:.4})")
    }
}

/// Intrinsic z-y'-x'' angles of a quaternion as `[yaw, pitch, roll]`.
fn tait_bryan(q: &UnitQuaternion<f64>) -> [f64; 3] {
    let (w, x, y, z) = (q.w, q.i, q.j, q.k);
    let yaw = (2.0 * (w * z - x * y)).atan2(1.0 - 2.0 * (y * y + z * z));
    let pitch = (2.0 * (w * y + z * x)).clamp(-1.0, 1.0).asin();
    let roll = (2.0 * (w * x - y * z)).atan2(1.0 - 2.0 * (x * x + y * y));
    [yaw, pitch, roll]
}

/// Compose yaw, pitch and roll into a unit quaternion.
pub fn to_quaternion(yaw: f64, pitch: f64, roll: f64) -> UnitQuaternion<f64> {
    let qx = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), roll);
    let qy = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), pitch);
    let qz = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), yaw);
    canonical(qx * qy * qz)
}

/// Compose yaw, pitch and roll into a rotation matrix.
pub fn to_rotation_matrix(yaw: f64, pitch: f64, roll: f64) -> Matrix3<f64> {
    let rx = Rotation3::from_axis_angle(&Vector3::x_axis(), roll);
    let ry = Rotation3::from_axis_angle(&Vector3::y_axis(), pitch);
    let rz = Rotation3::from_axis_angle(&Vector3::z_axis(), yaw);
    (rx * ry * rz).into_inner()
}
