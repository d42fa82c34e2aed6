//! Marker records built from raw detector output.
//!
//! A [`RawDetection`] is what an AprilTag-style detector reports for one
//! marker in one frame. [`Marker::from_detection`] turns it into an immutable
//! record with the pose expressed in the conventions of [`crate::coords`] and
//! [`crate::orientation`].

use std::fmt;
use std::str::FromStr;

use nalgebra::{Matrix3, Point2, Vector3};
use serde::{Deserialize, Serialize};

use crate::coords::{AxisConvention, CartesianCoordinates, PixelCoordinates, SphericalCoordinate};
use crate::orientation::{Orientation, OrientationConvention};

/// The supported tag families.
///
/// Each family maps onto fixed decoder parameters owned by the detector, so
/// the set is closed. Use `tag36h11` for compatibility with AprilTag 2.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarkerType {
    #[serde(rename = "tag16h5")]
    AprilTag16h5,
    #[serde(rename = "tag25h9")]
    AprilTag25h9,
    #[default]
    #[serde(rename = "tag36h11")]
    AprilTag36h11,
    #[serde(rename = "tagCircle21h7")]
    AprilTagCircle21h7,
    #[serde(rename = "tagCircle49h12")]
    AprilTagCircle49h12,
    #[serde(rename = "tagCustom48h12")]
    AprilTagCustom48h12,
    #[serde(rename = "tagStandard41h12")]
    AprilTagStandard41h12,
    #[serde(rename = "tagStandard52h13")]
    AprilTagStandard52h13,
}

impl MarkerType {
    pub const ALL: [MarkerType; 8] = [
        MarkerType::AprilTag16h5,
        MarkerType::AprilTag25h9,
        MarkerType::AprilTag36h11,
        MarkerType::AprilTagCircle21h7,
        MarkerType::AprilTagCircle49h12,
        MarkerType::AprilTagCustom48h12,
        MarkerType::AprilTagStandard41h12,
        MarkerType::AprilTagStandard52h13,
    ];

    /// Family name as understood by the AprilTag detector.
    pub fn family_name(self) -> &'static str {
        match self {
            MarkerType::AprilTag16h5 => "tag16h5",
            MarkerType::AprilTag25h9 => "tag25h9",
            MarkerType::AprilTag36h11 => "tag36h11",
            MarkerType::AprilTagCircle21h7 => "tagCircle21h7",
            MarkerType::AprilTagCircle49h12 => "tagCircle49h12",
            MarkerType::AprilTagCustom48h12 => "tagCustom48h12",
            MarkerType::AprilTagStandard41h12 => "tagStandard41h12",
            MarkerType::AprilTagStandard52h13 => "tagStandard52h13",
        }
    }
}

impl fmt::Display for MarkerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.family_name())
    }
}

impl FromStr for MarkerType {
    type Err = MarkerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MarkerType::ALL
            .into_iter()
            .find(|t| t.family_name() == s)
            .ok_or_else(|| MarkerError::UnknownFamily(s.to_owned()))
    }
}

/// Errors raised while building a [`Marker`] from a detection.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum MarkerError {
    #[error("unknown tag family {0:?}")]
    UnknownFamily(String),
    #[error("marker {id}: expected 4 corners, got {got}")]
    CornerCount { id: u32, got: usize },
    #[error("marker {id}: invalid tag size {size} m")]
    InvalidSize { id: u32, size: f64 },
    #[error("marker {id}: pose contains non-finite values")]
    NonFinitePose { id: u32 },
}

/// Returned when pose data is requested from a marker that has none.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("marker {id} was detected with an uncalibrated camera")]
pub struct PoseUnavailable {
    pub id: u32,
}

/// One marker as reported by the external detector.
///
/// Lengths are in meters and the pose, when present, is in the detector's
/// camera frame (`x` right, `y` down, `z` forward).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub id: u32,
    pub tag_family: String,
    /// Corner pixels in the detector's winding order.
    pub corners: Vec<Point2<f64>>,
    pub center: Point2<f64>,
    /// Physical side length used for pose estimation.
    #[serde(default)]
    pub tag_size: Option<f64>,
    #[serde(default)]
    pub pose_r: Option<Matrix3<f64>>,
    #[serde(default)]
    pub pose_t: Option<Vector3<f64>>,
}

/// Conventions applied when building a marker record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerOptions {
    #[serde(default)]
    pub orientation: OrientationConvention,
    #[serde(default)]
    pub axes: AxisConvention,
}

impl MarkerOptions {
    pub fn new(orientation: OrientationConvention, axes: AxisConvention) -> Self {
        Self { orientation, axes }
    }

    /// Options for the `aruco_orientation` flag with standard axes.
    pub fn aruco(aruco_orientation: bool) -> Self {
        Self {
            orientation: OrientationConvention::from_aruco_flag(aruco_orientation),
            axes: AxisConvention::Standard,
        }
    }
}

/// Pose-derived fields, only present when the detector estimated a pose.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarkerPose {
    /// Distance from the camera to the marker centre, in millimeters.
    pub distance: u32,
    /// Horizontal angle to the marker in degrees, clockwise positive.
    pub bearing: f64,
    pub cartesian: CartesianCoordinates,
    pub spherical: SphericalCoordinate,
    pub orientation: Orientation,
    /// Detector rotation matrix, camera frame.
    pub rotation: Matrix3<f64>,
    /// Detector translation, camera frame, meters.
    pub translation: Vector3<f64>,
}

impl MarkerPose {
    /// Derive every pose field from a detector rotation and translation.
    pub fn from_detector_pose(
        rotation: &Matrix3<f64>,
        translation: &Vector3<f64>,
        options: MarkerOptions,
    ) -> Self {
        let standard = CartesianCoordinates::from_tvec(translation);
        Self {
            distance: (translation.norm() * 1000.0) as u32,
            bearing: standard.bearing_degrees(),
            cartesian: CartesianCoordinates::from_tvec_with(translation, options.axes),
            spherical: SphericalCoordinate::from_tvec_with(translation, options.axes),
            orientation: Orientation::from_rotation_matrix_with(
                rotation,
                options.orientation,
                options.axes,
            ),
            rotation: *rotation,
            translation: *translation,
        }
    }
}

/// A detected marker with its location and orientation resolved.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    id: u32,
    size: u32,
    marker_type: MarkerType,
    pixel_corners: [PixelCoordinates; 4],
    pixel_centre: PixelCoordinates,
    pose: Option<MarkerPose>,
}

impl Marker {
    /// Build a marker record from one raw detection.
    pub fn from_detection(
        detection: &RawDetection,
        options: MarkerOptions,
    ) -> Result<Self, MarkerError> {
        let id = detection.id;
        let marker_type = detection.tag_family.parse::<MarkerType>()?;

        let pixel_corners: [PixelCoordinates; 4] = match detection.corners.as_slice() {
            [a, b, c, d] => [a, b, c, d].map(|p| PixelCoordinates::new(p.x, p.y)),
            other => {
                return Err(MarkerError::CornerCount {
                    id,
                    got: other.len(),
                })
            }
        };

        let size = match detection.tag_size {
            None => 0,
            Some(s) if s.is_finite() && s >= 0.0 => (s * 1000.0).round() as u32,
            Some(s) => return Err(MarkerError::InvalidSize { id, size: s }),
        };

        let pose = match (&detection.pose_r, &detection.pose_t) {
            (Some(r), Some(t)) => {
                if !r.iter().chain(t.iter()).all(|v| v.is_finite()) {
                    return Err(MarkerError::NonFinitePose { id });
                }
                Some(MarkerPose::from_detector_pose(r, t, options))
            }
            _ => None,
        };

        Ok(Self {
            id,
            size,
            marker_type,
            pixel_corners,
            pixel_centre: PixelCoordinates::new(detection.center.x, detection.center.y),
            pose,
        })
    }

    /// The marker id number.
    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Copy of this marker with a different id, for filters that renumber.
    pub fn with_id(&self, id: u32) -> Self {
        Self { id, ..self.clone() }
    }

    /// Physical side length in millimeters, 0 when unknown.
    #[inline]
    pub fn size(&self) -> u32 {
        self.size
    }

    #[inline]
    pub fn marker_type(&self) -> MarkerType {
        self.marker_type
    }

    /// Corner pixels in the detector's winding order.
    #[inline]
    pub fn pixel_corners(&self) -> &[PixelCoordinates; 4] {
        &self.pixel_corners
    }

    #[inline]
    pub fn pixel_centre(&self) -> PixelCoordinates {
        self.pixel_centre
    }

    /// Whether the detector estimated a pose for this marker.
    #[inline]
    pub fn has_pose(&self) -> bool {
        self.pose.is_some()
    }

    #[inline]
    pub fn pose(&self) -> Option<&MarkerPose> {
        self.pose.as_ref()
    }

    fn require_pose(&self) -> Result<&MarkerPose, PoseUnavailable> {
        self.pose.as_ref().ok_or(PoseUnavailable { id: self.id })
    }

    /// Distance from the camera in millimeters.
    pub fn distance(&self) -> Result<u32, PoseUnavailable> {
        self.require_pose().map(|p| p.distance)
    }

    /// Horizontal angle to the marker in degrees, clockwise positive.
    pub fn bearing(&self) -> Result<f64, PoseUnavailable> {
        self.require_pose().map(|p| p.bearing)
    }

    pub fn cartesian(&self) -> Result<CartesianCoordinates, PoseUnavailable> {
        self.require_pose().map(|p| p.cartesian)
    }

    pub fn spherical(&self) -> Result<SphericalCoordinate, PoseUnavailable> {
        self.require_pose().map(|p| p.spherical)
    }

    pub fn orientation(&self) -> Result<Orientation, PoseUnavailable> {
        self.require_pose().map(|p| p.orientation)
    }

    /// Flat summary suitable for serialization.
    pub fn record(&self) -> MarkerRecord {
        MarkerRecord {
            id: self.id,
            size: self.size,
            pixel_corners: self.pixel_corners.map(|p| [p.x, p.y]),
            rvec: self.pose.map(|p| {
                let r = p.rotation;
                [
                    [r[(0, 0)], r[(0, 1)], r[(0, 2)]],
                    [r[(1, 0)], r[(1, 1)], r[(1, 2)]],
                    [r[(2, 0)], r[(2, 1)], r[(2, 2)]],
                ]
            }),
            tvec: self
                .pose
                .map(|p| [p.translation.x, p.translation.y, p.translation.z]),
        }
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Marker id={} size={} type={}",
            self.id, self.size, self.marker_type
        )?;
        match &self.pose {
            Some(p) => write!(f, " distance={}>", p.distance),
            None => f.write_str(" distance=none>"),
        }
    }
}

/// Serializable summary of a marker: id, size, corners and the raw pose.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarkerRecord {
    pub id: u32,
    pub size: u32,
    pub pixel_corners: [[f64; 2]; 4],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rvec: Option<[[f64; 3]; 3]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tvec: Option<[f64; 3]>,
}

impl MarkerRecord {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
