//! Boundary to the external marker detector.
//!
//! Quad finding and bit decoding live outside this workspace. A backend
//! implements [`MarkerDetector`] and reports one [`RawDetection`] per marker;
//! when the request carries a [`PoseRequest`] and a size is known for a
//! marker id, the detection also carries the estimated pose.

use std::collections::HashMap;

use image::GrayImage;

use crate::calibration::CameraIntrinsics;
use crate::core::{MarkerType, RawDetection};

/// Physical marker sizes in meters, used for pose estimation.
#[derive(Clone, Debug, PartialEq)]
pub enum TagSizes {
    /// Every marker has the same side length.
    Uniform(f64),
    /// Side length per marker id; ids absent from the map get no pose.
    PerId(HashMap<u32, f64>),
}

impl Default for TagSizes {
    fn default() -> Self {
        TagSizes::PerId(HashMap::new())
    }
}

impl TagSizes {
    /// Size to use for a marker id, if any.
    pub fn size_for(&self, id: u32) -> Option<f64> {
        match self {
            TagSizes::Uniform(size) => Some(*size),
            TagSizes::PerId(map) => map.get(&id).copied(),
        }
    }

    /// `false` only for a per-id map that lacks `id`.
    pub fn contains(&self, id: u32) -> bool {
        match self {
            TagSizes::Uniform(_) => true,
            TagSizes::PerId(map) => map.contains_key(&id),
        }
    }

    #[inline]
    pub fn is_per_id(&self) -> bool {
        matches!(self, TagSizes::PerId(_))
    }
}

impl From<f64> for TagSizes {
    fn from(size: f64) -> Self {
        TagSizes::Uniform(size)
    }
}

impl From<HashMap<u32, f64>> for TagSizes {
    fn from(map: HashMap<u32, f64>) -> Self {
        TagSizes::PerId(map)
    }
}

/// Inputs needed for pose estimation.
#[derive(Clone, Debug, PartialEq)]
pub struct PoseRequest {
    pub intrinsics: CameraIntrinsics,
    pub sizes: TagSizes,
}

/// Everything a detector backend needs for one pass over an image.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectionRequest {
    pub family: MarkerType,
    pub threads: usize,
    pub quad_decimate: f32,
    /// `None` runs detection without pose estimation.
    pub pose: Option<PoseRequest>,
}

/// Failure reported by a detector backend.
#[derive(thiserror::Error, Debug)]
pub enum DetectorError {
    #[error("detector does not support tag family {0}")]
    UnsupportedFamily(MarkerType),
    #[error("detector backend failed: {0}")]
    Backend(String),
}

/// A marker detector backend.
pub trait MarkerDetector {
    fn detect(
        &mut self,
        image: &GrayImage,
        request: &DetectionRequest,
    ) -> Result<Vec<RawDetection>, DetectorError>;
}

impl<D: MarkerDetector + ?Sized> MarkerDetector for Box<D> {
    fn detect(
        &mut self,
        image: &GrayImage,
        request: &DetectionRequest,
    ) -> Result<Vec<RawDetection>, DetectorError> {
        (**self).detect(image, request)
    }
}
