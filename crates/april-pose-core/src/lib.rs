//! Coordinate conventions, orientation engine and marker records for
//! AprilTag-style fiducial markers.
//!
//! This crate is purely geometric. It does not depend on a concrete detector
//! or image type: it takes the raw id, corners and pose reported by a
//! detector ([`RawDetection`]) and turns them into immutable [`Marker`]
//! records in a right-handed, millimeter world frame.

mod coords;
mod logger;
mod marker;
mod orientation;

pub use coords::{AxisConvention, CartesianCoordinates, PixelCoordinates, SphericalCoordinate};
pub use marker::{
    Marker, MarkerError, MarkerOptions, MarkerPose, MarkerRecord, MarkerType, PoseUnavailable,
    RawDetection,
};
pub use orientation::{
    quaternion_from_matrix, to_quaternion, to_rotation_matrix, Orientation,
    OrientationConvention,
};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{init_with_level, level_from_verbosity};
