//! Camera calibration files.
//!
//! Calibrations are stored in OpenCV `FileStorage` JSON form: matrices are
//! objects with `type_id: "opencv-matrix"`, `rows`, `cols`, `dt` and a
//! row-major `data` array.
//!
//! ```json
//! {
//!   "cameraResolution": [1280, 720],
//!   "cameraMatrix": {
//!     "type_id": "opencv-matrix", "rows": 3, "cols": 3, "dt": "d",
//!     "data": [1293.09, 0.0, 640.0, 0.0, 1293.09, 360.0, 0.0, 0.0, 1.0]
//!   },
//!   "vidpid": ["046d:0825"]
//! }
//! ```
//!
//! Only the JSON form is read. XML `FileStorage` files can be converted with
//! OpenCV (`cv::FileStorage` writes JSON when the target path ends in
//! `.json`).

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug)]
pub enum CalibrationError {
    #[error("calibration file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("{key}: expected a {expected} matrix, got {rows}x{cols}")]
    MatrixShape {
        key: &'static str,
        expected: &'static str,
        rows: usize,
        cols: usize,
    },
    #[error("{key}: {rows}x{cols} matrix has {len} values")]
    MatrixData {
        key: &'static str,
        rows: usize,
        cols: usize,
        len: usize,
    },
    #[error("invalid camera resolution {width}x{height}")]
    InvalidResolution { width: f64, height: f64 },
    #[error("camera matrix contains non-finite or non-positive focal lengths")]
    InvalidIntrinsics,
}

/// Camera resolution in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

/// Pinhole intrinsics: focal lengths and principal point, in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl CameraIntrinsics {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self { fx, fy, cx, cy }
    }

    /// The 3x3 camera matrix `K`.
    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, 0.0, self.cx, //
            0.0, self.fy, self.cy, //
            0.0, 0.0, 1.0,
        )
    }
}

/// Everything stored in a calibration file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraCalibration {
    pub resolution: Resolution,
    pub intrinsics: CameraIntrinsics,
    #[serde(default)]
    pub dist_coeffs: Vec<f64>,
    /// USB `vendor:product` ids this calibration applies to.
    #[serde(default)]
    pub vidpids: Vec<String>,
    /// Capture property id to value, applied when opening the camera.
    #[serde(default)]
    pub camera_properties: BTreeMap<i32, f64>,
    #[serde(default)]
    pub avg_reprojection_error: Option<f64>,
}

#[derive(Deserialize)]
struct OpenCvMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl OpenCvMatrix {
    fn checked(&self, key: &'static str) -> Result<&[f64], CalibrationError> {
        if self.data.len() != self.rows * self.cols {
            return Err(CalibrationError::MatrixData {
                key,
                rows: self.rows,
                cols: self.cols,
                len: self.data.len(),
            });
        }
        Ok(&self.data)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum VidPidNode {
    One(String),
    Many(Vec<String>),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CalibrationFile {
    camera_resolution: [f64; 2],
    camera_matrix: OpenCvMatrix,
    #[serde(default)]
    camera_properties: Option<OpenCvMatrix>,
    #[serde(default)]
    vidpid: Option<VidPidNode>,
    #[serde(default, rename = "dist_coeffs", alias = "distCoeffs")]
    dist_coeffs: Option<OpenCvMatrix>,
    #[serde(default, rename = "avg_reprojection_error")]
    avg_reprojection_error: Option<f64>,
}

impl CameraCalibration {
    /// Parse calibration JSON text.
    pub fn from_json_str(raw: &str) -> Result<Self, CalibrationError> {
        let file: CalibrationFile = serde_json::from_str(raw)?;
        Self::from_file(file)
    }

    fn from_file(file: CalibrationFile) -> Result<Self, CalibrationError> {
        let [width, height] = file.camera_resolution;
        let valid_dim =
            |v: f64| v.is_finite() && v >= 1.0 && v.fract() == 0.0 && v <= u32::MAX as f64;
        if !valid_dim(width) || !valid_dim(height) {
            return Err(CalibrationError::InvalidResolution { width, height });
        }

        let m = &file.camera_matrix;
        if (m.rows, m.cols) != (3, 3) {
            return Err(CalibrationError::MatrixShape {
                key: "cameraMatrix",
                expected: "3x3",
                rows: m.rows,
                cols: m.cols,
            });
        }
        let k = m.checked("cameraMatrix")?;
        let intrinsics = CameraIntrinsics::new(k[0], k[4], k[2], k[5]);
        let focal_ok = |f: f64| f.is_finite() && f > 0.0;
        if !focal_ok(intrinsics.fx)
            || !focal_ok(intrinsics.fy)
            || !intrinsics.cx.is_finite()
            || !intrinsics.cy.is_finite()
        {
            return Err(CalibrationError::InvalidIntrinsics);
        }

        let mut camera_properties = BTreeMap::new();
        if let Some(props) = &file.camera_properties {
            if props.cols != 2 {
                return Err(CalibrationError::MatrixShape {
                    key: "cameraProperties",
                    expected: "Nx2",
                    rows: props.rows,
                    cols: props.cols,
                });
            }
            for pair in props.checked("cameraProperties")?.chunks_exact(2) {
                camera_properties.insert(pair[0] as i32, pair[1]);
            }
        }

        let dist_coeffs = match &file.dist_coeffs {
            Some(d) => d.checked("dist_coeffs")?.to_vec(),
            None => Vec::new(),
        };

        let vidpids = match file.vidpid {
            Some(VidPidNode::One(v)) => vec![v],
            Some(VidPidNode::Many(v)) => v,
            None => Vec::new(),
        };

        Ok(Self {
            resolution: Resolution {
                width: width as u32,
                height: height as u32,
            },
            intrinsics,
            dist_coeffs,
            vidpids,
            camera_properties,
            avg_reprojection_error: file.avg_reprojection_error,
        })
    }
}

/// Load every field of a calibration file.
pub fn load_calibration_extra(
    path: impl AsRef<Path>,
) -> Result<CameraCalibration, CalibrationError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(CalibrationError::NotFound(path.to_path_buf()));
    }
    let raw = fs::read_to_string(path)?;
    let calibration = CameraCalibration::from_json_str(&raw)?;
    log::debug!(
        "loaded calibration {} ({}x{}, {} vidpids)",
        path.display(),
        calibration.resolution.width,
        calibration.resolution.height,
        calibration.vidpids.len()
    );
    Ok(calibration)
}

/// Load the resolution and intrinsics from a calibration file.
pub fn load_calibration(
    path: impl AsRef<Path>,
) -> Result<(Resolution, CameraIntrinsics), CalibrationError> {
    let calibration = load_calibration_extra(path)?;
    Ok((calibration.resolution, calibration.intrinsics))
}
