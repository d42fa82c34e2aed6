//! Coordinate primitives and the detector-to-world axis remap.
//!
//! The pose estimator reports translations in the camera frame used by
//! AprilTag/OpenCV: `x` to the right of the image, `y` down the image and `z`
//! out through the lens, in meters. Everything exposed by this crate is in
//! the conventional right-handed frame instead: `x` forward (away from the
//! camera), `y` to the left and `z` upward, in millimeters.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_PI_2;

/// Axis convention used when converting detector translations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AxisConvention {
    /// Right-handed: `x` forward, `y` left, `z` up.
    #[default]
    Standard,
    /// The detector's own axes scaled to millimeters: `x` right, `y` down,
    /// `z` forward. Kept for consumers written against older releases.
    Legacy,
}

/// Coordinates within an image, in pixels.
///
/// Floating point so that subpixel detections can be represented.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PixelCoordinates {
    pub x: f64,
    pub y: f64,
}

impl PixelCoordinates {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another pixel location.
    #[inline]
    pub fn distance_to(&self, other: &PixelCoordinates) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

impl From<[f64; 2]> for PixelCoordinates {
    fn from([x, y]: [f64; 2]) -> Self {
        Self { x, y }
    }
}

/// A 3D cartesian location relative to the camera, in millimeters.
///
/// With [`AxisConvention::Standard`] the `x` axis extends directly away from
/// the camera, `y` grows towards the left of the image and `z` grows towards
/// the top of the image. The origin is the camera's optical centre.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CartesianCoordinates {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl CartesianCoordinates {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Convert a detector translation vector (meters) into millimeters in the
    /// standard right-handed frame.
    pub fn from_tvec(tvec: &Vector3<f64>) -> Self {
        Self::from_tvec_with(tvec, AxisConvention::Standard)
    }

    /// Convert a detector translation vector using an explicit axis convention.
    pub fn from_tvec_with(tvec: &Vector3<f64>, axes: AxisConvention) -> Self {
        match axes {
            AxisConvention::Standard => Self {
                x: tvec.z * 1000.0,
                y: -tvec.x * 1000.0,
                z: -tvec.y * 1000.0,
            },
            AxisConvention::Legacy => Self {
                x: tvec.x * 1000.0,
                y: tvec.y * 1000.0,
                z: tvec.z * 1000.0,
            },
        }
    }

    /// Length of the vector from the camera to this point.
    #[inline]
    pub fn norm(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Horizontal angle from the camera's forward axis, in degrees.
    ///
    /// Positive values are clockwise when viewed from above, i.e. towards the
    /// right of the image. Only meaningful for [`AxisConvention::Standard`].
    #[inline]
    pub fn bearing_degrees(&self) -> f64 {
        (-self.y).atan2(self.x).to_degrees()
    }
}

/// A 3D spherical location relative to the camera.
///
/// `theta` is the azimuth in the horizontal plane, zero straight ahead and
/// positive counter-clockwise (towards the left of the image). `phi` is the
/// polar angle measured down from the vertical axis, zero straight up.
///
/// The `rot_*` accessors depend on `axes`: the standard convention exposes
/// `rot_y`/`rot_z`, the legacy convention `rot_x`/`rot_y`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SphericalCoordinate {
    /// Radial distance from the camera, in whole millimeters.
    pub r: u32,
    /// Azimuth angle in radians.
    pub theta: f64,
    /// Polar angle in radians, within `[0, pi]`.
    pub phi: f64,
    #[serde(default)]
    pub axes: AxisConvention,
}

impl SphericalCoordinate {
    /// Build from a detector translation vector (meters).
    pub fn from_tvec(tvec: &Vector3<f64>) -> Self {
        Self::from_tvec_with(tvec, AxisConvention::Standard)
    }

    /// Build from a detector translation vector, selecting which `rot_*`
    /// accessors are available.
    ///
    /// The vector is always remapped to the standard right-handed frame
    /// first, so `r`, `theta` and `phi` do not depend on `axes`.
    pub fn from_tvec_with(tvec: &Vector3<f64>, axes: AxisConvention) -> Self {
        let (x, y, z) = (tvec.z, -tvec.x, -tvec.y);
        let dist = (x * x + y * y + z * z).sqrt();
        let theta = y.atan2(x);
        let phi = if dist > 0.0 {
            (z / dist).clamp(-1.0, 1.0).acos()
        } else {
            FRAC_PI_2
        };
        Self {
            r: (dist * 1000.0) as u32,
            theta,
            phi,
            axes,
        }
    }

    /// Legacy only: vertical angle in radians, zero at the image centre line
    /// and growing towards the bottom of the image.
    pub fn rot_x(&self) -> Option<f64> {
        match self.axes {
            AxisConvention::Standard => None,
            AxisConvention::Legacy => Some(self.phi - FRAC_PI_2),
        }
    }

    /// Standard: vertical angle in radians, growing towards the bottom of the
    /// image. Legacy: horizontal angle, growing towards the right.
    pub fn rot_y(&self) -> f64 {
        match self.axes {
            AxisConvention::Standard => self.phi - FRAC_PI_2,
            AxisConvention::Legacy => -self.theta,
        }
    }

    /// Standard only: horizontal angle in radians, zero at the image centre
    /// line and growing towards the left of the image.
    pub fn rot_z(&self) -> Option<f64> {
        match self.axes {
            AxisConvention::Standard => Some(self.theta),
            AxisConvention::Legacy => None,
        }
    }
}
