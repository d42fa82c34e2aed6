//! Capture, detect, filter and annotate pipeline.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use image::RgbImage;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::annotate::Annotator;
use crate::calibration::CameraIntrinsics;
use crate::core::{AxisConvention, Marker, MarkerError, MarkerOptions, MarkerType};
use crate::detector::{DetectionRequest, DetectorError, MarkerDetector, PoseRequest, TagSizes};
use crate::frame::Frame;
use crate::frame_source::{FrameSource, NoFrameSource};

/// Errors returned by [`Processor`] operations.
#[derive(thiserror::Error, Debug)]
pub enum ProcessorError {
    #[error("processor has been closed")]
    Closed,
    #[error("failed to capture frame")]
    Capture(#[source] io::Error),
    #[error(transparent)]
    Detector(#[from] DetectorError),
    #[error(transparent)]
    Marker(#[from] MarkerError),
    #[error("failed to save frame to {}", path.display())]
    Save {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigIoError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Lifecycle of a [`Processor`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessorState {
    Ready,
    Capturing,
    Detecting,
    Closed,
}

impl fmt::Display for ProcessorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProcessorState::Ready => "ready",
            ProcessorState::Capturing => "capturing",
            ProcessorState::Detecting => "detecting",
            ProcessorState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Processor settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    pub tag_family: MarkerType,
    /// Worker threads requested from the detector.
    pub threads: usize,
    /// Image decimation applied by the detector before quad detection.
    pub quad_decimate: f32,
    /// Report orientation with the marker-facing convention.
    pub aruco_orientation: bool,
    pub axes: AxisConvention,
    /// With a per-id size map, drop detections whose id has no size.
    pub mask_unknown_size_tags: bool,
    pub name: String,
    /// USB `vendor:product` id of the camera, informational.
    pub vidpid: String,
    pub line_thickness: u32,
    pub text_scale: f64,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            tag_family: MarkerType::AprilTag36h11,
            threads: 4,
            quad_decimate: 2.0,
            aruco_orientation: false,
            axes: AxisConvention::Standard,
            mask_unknown_size_tags: false,
            name: "Camera".to_owned(),
            vidpid: String::new(),
            line_thickness: 2,
            text_scale: 1.0,
        }
    }
}

impl ProcessorConfig {
    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigIoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigIoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn marker_options(&self) -> MarkerOptions {
        MarkerOptions {
            axes: self.axes,
            ..MarkerOptions::aruco(self.aruco_orientation)
        }
    }

    pub fn annotator(&self) -> Annotator {
        Annotator {
            aruco_orientation: self.aruco_orientation,
            line_thickness: self.line_thickness,
            text_scale: self.text_scale,
        }
    }
}

pub type CaptureFilter = Box<dyn FnMut(RgbImage) -> RgbImage + Send>;
pub type MarkerFilter = Box<dyn FnMut(Vec<Marker>) -> Vec<Marker> + Send>;
pub type DetectionHook = Box<dyn FnMut(&Frame, &[Marker]) + Send>;

/// Drives a frame source and a marker detector.
///
/// Each detection pass runs: capture filter, detector, unknown-size masking,
/// marker construction, marker filter, detection hook.
pub struct Processor<D> {
    detector: D,
    config: ProcessorConfig,
    frame_source: Box<dyn FrameSource + Send>,
    calibration: Option<CameraIntrinsics>,
    sizes: TagSizes,
    state: ProcessorState,
    capture_filter: CaptureFilter,
    marker_filter: MarkerFilter,
    detection_hook: DetectionHook,
}

impl<D: MarkerDetector> Processor<D> {
    /// A processor with no frame source, no calibration and no sizes.
    pub fn new(detector: D, config: ProcessorConfig) -> Self {
        Self {
            detector,
            config,
            frame_source: Box::new(NoFrameSource),
            calibration: None,
            sizes: TagSizes::default(),
            state: ProcessorState::Ready,
            capture_filter: Box::new(|frame: RgbImage| frame),
            marker_filter: Box::new(|markers: Vec<Marker>| markers),
            detection_hook: Box::new(|_: &Frame, _: &[Marker]| {}),
        }
    }

    pub fn with_frame_source(mut self, source: impl FrameSource + Send + 'static) -> Self {
        self.frame_source = Box::new(source);
        self
    }

    /// Enable pose estimation with these intrinsics.
    pub fn with_calibration(mut self, intrinsics: CameraIntrinsics) -> Self {
        self.calibration = Some(intrinsics);
        self
    }

    pub fn with_marker_sizes(mut self, sizes: impl Into<TagSizes>) -> Self {
        self.sizes = sizes.into();
        self
    }

    /// Replace the hook applied to each raw captured image.
    pub fn set_capture_filter(
        &mut self,
        filter: impl FnMut(RgbImage) -> RgbImage + Send + 'static,
    ) {
        self.capture_filter = Box::new(filter);
    }

    /// Replace the hook that may drop, reorder or renumber markers.
    pub fn set_marker_filter(
        &mut self,
        filter: impl FnMut(Vec<Marker>) -> Vec<Marker> + Send + 'static,
    ) {
        self.marker_filter = Box::new(filter);
    }

    /// Replace the hook called with every frame and its final markers.
    pub fn set_detection_hook(&mut self, hook: impl FnMut(&Frame, &[Marker]) + Send + 'static) {
        self.detection_hook = Box::new(hook);
    }

    /// Replace the marker sizes (meters) used for pose estimation.
    pub fn set_marker_sizes(&mut self, sizes: impl Into<TagSizes>) {
        self.sizes = sizes.into();
    }

    pub fn marker_sizes(&self) -> &TagSizes {
        &self.sizes
    }

    pub fn calibration(&self) -> Option<&CameraIntrinsics> {
        self.calibration.as_ref()
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    pub fn state(&self) -> ProcessorState {
        self.state
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }

    fn ensure_open(&self) -> Result<(), ProcessorError> {
        if self.state == ProcessorState::Closed {
            return Err(ProcessorError::Closed);
        }
        Ok(())
    }

    /// Read a fresh frame from the source and apply the capture filter.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self), fields(name = %self.config.name))
    )]
    pub fn capture(&mut self) -> Result<Frame, ProcessorError> {
        self.ensure_open()?;
        self.state = ProcessorState::Capturing;
        let raw = self.frame_source.read(true);
        self.state = ProcessorState::Ready;

        let colour = raw.map_err(|e| {
            log::warn!("{}: capture failed: {e}", self.config.name);
            ProcessorError::Capture(e)
        })?;
        let colour = (self.capture_filter)(colour);
        Ok(Frame::from_colour(colour))
    }

    fn request(&self) -> DetectionRequest {
        DetectionRequest {
            family: self.config.tag_family,
            threads: self.config.threads,
            quad_decimate: self.config.quad_decimate,
            pose: self.calibration.map(|intrinsics| PoseRequest {
                intrinsics,
                sizes: self.sizes.clone(),
            }),
        }
    }

    /// Locate markers in a frame.
    #[cfg_attr(
        feature = "tracing",
        instrument(
            level = "info",
            skip(self, frame),
            fields(width = frame.grey.width(), height = frame.grey.height())
        )
    )]
    pub fn detect(&mut self, frame: &Frame) -> Result<Vec<Marker>, ProcessorError> {
        self.ensure_open()?;
        self.state = ProcessorState::Detecting;
        let result = self.run_detection(frame);
        self.state = ProcessorState::Ready;
        result
    }

    fn run_detection(&mut self, frame: &Frame) -> Result<Vec<Marker>, ProcessorError> {
        let request = self.request();
        let detections = self.detector.detect(&frame.grey, &request)?;

        let mask = self.config.mask_unknown_size_tags && self.sizes.is_per_id();
        let options = self.config.marker_options();

        let mut markers = Vec::with_capacity(detections.len());
        for detection in &detections {
            if mask && !self.sizes.contains(detection.id) {
                log::trace!("dropping marker {} with unknown size", detection.id);
                continue;
            }
            markers.push(Marker::from_detection(detection, options)?);
        }
        log::debug!(
            "{}: {} detections, {} markers kept",
            self.config.name,
            detections.len(),
            markers.len()
        );

        let markers = (self.marker_filter)(markers);
        (self.detection_hook)(frame, &markers);
        Ok(markers)
    }

    /// Capture a frame and return the markers in it.
    pub fn see(&mut self) -> Result<Vec<Marker>, ProcessorError> {
        let frame = self.capture()?;
        self.detect(&frame)
    }

    /// Detect markers in an image supplied by the caller.
    pub fn see_image(&mut self, colour: RgbImage) -> Result<Vec<Marker>, ProcessorError> {
        let frame = Frame::from_colour(colour);
        self.detect(&frame)
    }

    /// Ids of the markers currently visible.
    pub fn see_ids(&mut self) -> Result<Vec<u32>, ProcessorError> {
        Ok(self.see()?.iter().map(Marker::id).collect())
    }

    /// Draw outlines, origin corners and labels onto a frame in place.
    pub fn annotate(&self, frame: &mut Frame, markers: &[Marker]) {
        self.config.annotator().annotate(frame, markers);
    }

    /// Save a frame's colour image, annotated unless `annotated` is false.
    ///
    /// Without `frame` a new one is captured; without `detections` the frame
    /// is run through [`Processor::detect`] first. A path with no extension
    /// gets `.jpg`. Returns the path written.
    pub fn save(
        &mut self,
        path: impl AsRef<Path>,
        frame: Option<Frame>,
        detections: Option<&[Marker]>,
        annotated: bool,
    ) -> Result<PathBuf, ProcessorError> {
        let mut frame = match frame {
            Some(f) => f,
            None => self.capture()?,
        };
        if annotated {
            let markers = match detections {
                Some(m) => m.to_vec(),
                None => self.detect(&frame)?,
            };
            self.annotate(&mut frame, &markers);
        }

        let mut path = path.as_ref().to_path_buf();
        if path.extension().is_none() {
            log::warn!("no file extension given, defaulting to jpg");
            path.set_extension("jpg");
        }
        frame
            .colour
            .save(&path)
            .map_err(|source| ProcessorError::Save {
                path: path.clone(),
                source,
            })?;
        Ok(path)
    }

    /// Release the frame source. Later captures fail with
    /// [`ProcessorError::Closed`].
    pub fn close(&mut self) {
        if self.state != ProcessorState::Closed {
            self.frame_source.close();
            self.state = ProcessorState::Closed;
            log::info!("{}: closed", self.config.name);
        }
    }
}

impl<D> fmt::Debug for Processor<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Processor")
            .field("config", &self.config)
            .field("calibration", &self.calibration)
            .field("sizes", &self.sizes)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
