//! Fiducial marker detection pipeline with normalised poses.
//!
//! This crate provides:
//! - re-exports of `april-pose-core` (coordinates, orientation, markers)
//! - a [`Processor`] that captures frames, runs an external AprilTag-style
//!   detector behind the [`MarkerDetector`] trait and turns its output into
//!   [`Marker`] records
//! - calibration loading, frame annotation and a frame sender for telemetry.
//!
//! ## Quickstart
//!
//! ```no_run
//! use april_pose::{
//!     load_calibration, ImageSource, Processor, ProcessorConfig, MarkerDetector,
//! };
//!
//! # fn run(detector: impl MarkerDetector) -> Result<(), Box<dyn std::error::Error>> {
//! let (_, intrinsics) = load_calibration("calibrations/c270.json")?;
//! let mut processor = Processor::new(detector, ProcessorConfig::default())
//!     .with_frame_source(ImageSource::open("arena.jpg")?)
//!     .with_calibration(intrinsics)
//!     .with_marker_sizes(0.2);
//!
//! for marker in processor.see()? {
//!     if let Ok(cartesian) = marker.cartesian() {
//!         println!("{marker}: {:.0} mm ahead", cartesian.x);
//!     }
//! }
//! processor.close();
//! # Ok(())
//! # }
//! ```
//!
//! ## Coordinates
//!
//! Positions are right-handed and in millimeters: `x` away from the camera,
//! `y` to the left, `z` up. Bearings are degrees clockwise from straight
//! ahead. Orientation is yaw/pitch/roll from the marker's point of view. See
//! [`core::AxisConvention`] and [`core::OrientationConvention`] for the
//! alternatives.
//!
//! ## API map
//! - `april_pose::core`: coordinate types, orientation engine, marker records.
//! - [`processor`]: the capture/detect pipeline and its configuration.
//! - [`detector`]: the detector backend contract.
//! - [`calibration`]: OpenCV-style calibration files.
//! - [`annotate`], [`sender`], [`helpers`]: overlays, telemetry, utilities.

pub use april_pose_core as core;

pub mod annotate;
pub mod calibration;
pub mod detector;
pub mod frame;
pub mod frame_source;
pub mod helpers;
pub mod processor;
pub mod sender;

pub use april_pose_core::{
    CartesianCoordinates, Marker, MarkerRecord, MarkerType, Orientation, PixelCoordinates,
    PoseUnavailable, RawDetection, SphericalCoordinate,
};

pub use annotate::{annotate_text, Annotator};
pub use calibration::{
    load_calibration, load_calibration_extra, CalibrationError, CameraCalibration,
    CameraIntrinsics, Resolution,
};
pub use detector::{DetectionRequest, DetectorError, MarkerDetector, PoseRequest, TagSizes};
pub use frame::Frame;
pub use frame_source::{FrameSequence, FrameSource, ImageSource, NoFrameSource};
pub use helpers::{generate_marker_size_mapping, normalise_marker_text, RollingAverage};
pub use processor::{Processor, ProcessorConfig, ProcessorError, ProcessorState};
pub use sender::{FrameSender, Payload, SenderError};
