use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};

use approx::assert_abs_diff_eq;
use april_pose::core::AxisConvention;
use april_pose::{
    load_calibration, CameraIntrinsics, DetectionRequest, DetectorError, FrameSender,
    FrameSequence, ImageSource, MarkerDetector, Processor, ProcessorConfig, ProcessorError,
    ProcessorState, RawDetection, TagSizes,
};
use image::{GrayImage, Rgb, RgbImage};
use nalgebra::{Matrix3, Point2, Vector3};

/// A marker placed in front of the camera, in detector coordinates.
#[derive(Clone)]
struct Placed {
    id: u32,
    rotation: Matrix3<f64>,
    translation: Vector3<f64>,
}

/// Returns the same markers for every image, with a pose only when the
/// request asks for one and a size is known for the id.
#[derive(Default)]
struct ScriptedDetector {
    placed: Vec<Placed>,
    requests: Arc<Mutex<Vec<DetectionRequest>>>,
}

impl ScriptedDetector {
    fn new(placed: Vec<Placed>) -> Self {
        Self {
            placed,
            ..Self::default()
        }
    }
}

impl MarkerDetector for ScriptedDetector {
    fn detect(
        &mut self,
        _image: &GrayImage,
        request: &DetectionRequest,
    ) -> Result<Vec<RawDetection>, DetectorError> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.clone());
        Ok(self
            .placed
            .iter()
            .map(|p| {
                let size = request.pose.as_ref().and_then(|r| r.sizes.size_for(p.id));
                let (corners, center) = project(p, request);
                RawDetection {
                    id: p.id,
                    tag_family: request.family.family_name().to_owned(),
                    corners,
                    center,
                    tag_size: size,
                    pose_r: size.map(|_| p.rotation),
                    pose_t: size.map(|_| p.translation),
                }
            })
            .collect())
    }
}

/// Image-space square around the projected marker centre.
fn project(p: &Placed, request: &DetectionRequest) -> (Vec<Point2<f64>>, Point2<f64>) {
    let k = request
        .pose
        .as_ref()
        .map(|r| r.intrinsics)
        .unwrap_or_else(|| CameraIntrinsics::new(500.0, 500.0, 320.0, 240.0));
    let t = p.translation;
    let u = k.fx * t.x / t.z + k.cx;
    let v = k.fy * t.y / t.z + k.cy;
    let half = 0.05 * k.fx / t.z;
    let corners = vec![
        Point2::new(u - half, v + half),
        Point2::new(u + half, v + half),
        Point2::new(u + half, v - half),
        Point2::new(u - half, v - half),
    ];
    (corners, Point2::new(u, v))
}

fn at(id: u32, x: f64, y: f64, z: f64) -> Placed {
    Placed {
        id,
        rotation: Matrix3::identity(),
        translation: Vector3::new(x, y, z),
    }
}

fn blank(w: u32, h: u32) -> RgbImage {
    RgbImage::from_pixel(w, h, Rgb([30, 30, 30]))
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn intrinsics() -> CameraIntrinsics {
    CameraIntrinsics::new(1293.09, 1293.09, 400.0, 400.0)
}

#[test]
fn reports_size_and_position_with_uniform_size() {
    init_logging();
    let detector = ScriptedDetector::new(vec![at(12, 0.2, 0.0, 2.0)]);
    let mut processor = Processor::new(detector, ProcessorConfig::default())
        .with_frame_source(ImageSource::new(blank(800, 800)))
        .with_calibration(intrinsics())
        .with_marker_sizes(0.2);

    let markers = processor.see().expect("markers");
    assert_eq!(markers.len(), 1);
    let marker = &markers[0];
    assert!(marker.has_pose());
    assert_eq!(marker.size(), 200);

    let cartesian = marker.cartesian().expect("cartesian");
    assert_abs_diff_eq!(cartesian.x, 2000.0, epsilon = 5.0);
    assert_abs_diff_eq!(cartesian.y, -200.0, epsilon = 1e-9);
    assert_abs_diff_eq!(cartesian.z, 0.0, epsilon = 1e-9);
    assert_eq!(marker.distance(), Ok(2009));
    assert!(marker.bearing().expect("bearing") > 0.0);
}

#[test]
fn unknown_sizes_are_masked_only_when_asked() {
    init_logging();
    let placed = vec![at(3, -0.3, 0.0, 1.5), at(5, 0.0, 0.0, 1.5), at(7, 0.3, 0.0, 1.5)];
    let sizes = HashMap::from([(5u32, 0.1)]);

    let strict = ProcessorConfig {
        mask_unknown_size_tags: true,
        ..ProcessorConfig::default()
    };
    let mut processor = Processor::new(ScriptedDetector::new(placed.clone()), strict)
        .with_calibration(intrinsics())
        .with_marker_sizes(sizes.clone());
    let markers = processor.see_image(blank(64, 64)).expect("markers");
    assert_eq!(markers.iter().map(|m| m.id()).collect::<Vec<_>>(), vec![5]);

    let mut lenient = Processor::new(ScriptedDetector::new(placed), ProcessorConfig::default())
        .with_calibration(intrinsics())
        .with_marker_sizes(sizes);
    let markers = lenient.see_image(blank(64, 64)).expect("markers");
    assert_eq!(markers.len(), 3);
    let posed: Vec<u32> = markers
        .iter()
        .filter(|m| m.has_pose())
        .map(|m| m.id())
        .collect();
    assert_eq!(posed, vec![5]);
}

#[test]
fn uncalibrated_markers_have_no_pose() {
    let detector = ScriptedDetector::new(vec![at(4, 0.0, 0.0, 1.0)]);
    let requests = Arc::clone(&detector.requests);
    let mut processor =
        Processor::new(detector, ProcessorConfig::default()).with_marker_sizes(0.15);

    let markers = processor.see_image(blank(64, 64)).expect("markers");
    let marker = &markers[0];
    assert!(!marker.has_pose());
    assert_eq!(marker.id(), 4);
    assert_eq!(marker.size(), 0);
    assert_eq!(
        marker.orientation().expect_err("no pose").to_string(),
        "marker 4 was detected with an uncalibrated camera"
    );
    assert!(requests.lock().expect("lock")[0].pose.is_none());
}

#[test]
fn hooks_run_in_order_once_per_pass() {
    let log: Arc<Mutex<Vec<String>>> = Arc::default();
    let detector = ScriptedDetector::new(vec![at(1, 0.0, 0.0, 1.0), at(7, 0.1, 0.0, 1.0)]);
    let mut processor = Processor::new(detector, ProcessorConfig::default())
        .with_frame_source(ImageSource::new(blank(64, 64)));

    let l = Arc::clone(&log);
    processor.set_capture_filter(move |img| {
        l.lock().expect("log").push("capture".into());
        img
    });
    let l = Arc::clone(&log);
    processor.set_marker_filter(move |markers| {
        l.lock().expect("log").push(format!("filter {}", markers.len()));
        markers
            .into_iter()
            .filter(|m| m.id() != 7)
            .map(|m| m.with_id(m.id() + 100))
            .collect()
    });
    let l = Arc::clone(&log);
    processor.set_detection_hook(move |frame, markers| {
        let ids: Vec<String> = markers.iter().map(|m| m.id().to_string()).collect();
        l.lock()
            .expect("log")
            .push(format!("hook {}x{} [{}]", frame.width(), frame.height(), ids.join(",")));
    });

    let ids = processor.see_ids().expect("ids");
    assert_eq!(ids, vec![101]);
    assert_eq!(
        *log.lock().expect("log"),
        vec!["capture", "filter 2", "hook 64x64 [101]"]
    );
}

#[test]
fn capture_failure_leaves_processor_usable() {
    init_logging();
    let detector = ScriptedDetector::new(vec![at(2, 0.0, 0.0, 1.0)]);
    let mut processor = Processor::new(detector, ProcessorConfig::default())
        .with_frame_source(FrameSequence::new([blank(16, 16)]));

    assert_eq!(processor.see_ids().expect("first frame"), vec![2]);
    match processor.capture() {
        Err(ProcessorError::Capture(e)) => assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof),
        other => panic!("expected capture error, got {other:?}"),
    }
    assert_eq!(processor.state(), ProcessorState::Ready);
    assert_eq!(processor.see_image(blank(16, 16)).expect("markers").len(), 1);
}

#[test]
fn default_source_produces_no_frames() {
    let mut processor = Processor::new(ScriptedDetector::default(), ProcessorConfig::default());
    assert!(matches!(processor.capture(), Err(ProcessorError::Capture(_))));
}

#[test]
fn closed_processor_refuses_work() {
    let mut processor = Processor::new(ScriptedDetector::default(), ProcessorConfig::default())
        .with_frame_source(ImageSource::new(blank(8, 8)));
    processor.close();
    assert_eq!(processor.state(), ProcessorState::Closed);
    assert!(matches!(processor.capture(), Err(ProcessorError::Closed)));
    assert!(matches!(
        processor.see_image(blank(8, 8)),
        Err(ProcessorError::Closed)
    ));
}

#[test]
fn marker_sizes_can_be_replaced() {
    let detector = ScriptedDetector::new(vec![at(9, 0.0, 0.0, 1.0)]);
    let mut processor =
        Processor::new(detector, ProcessorConfig::default()).with_calibration(intrinsics());
    assert_eq!(processor.marker_sizes(), &TagSizes::default());
    assert!(!processor.see_image(blank(8, 8)).expect("markers")[0].has_pose());

    processor.set_marker_sizes(0.08);
    let markers = processor.see_image(blank(8, 8)).expect("markers");
    assert!(markers[0].has_pose());
    assert_eq!(markers[0].size(), 80);
}

#[test]
fn marker_facing_convention_zeroes_a_square_on_marker() {
    let square_on = Placed {
        id: 0,
        rotation: Matrix3::from_diagonal(&Vector3::new(-1.0, -1.0, 1.0)),
        translation: Vector3::new(0.0, 0.0, 1.0),
    };
    let config = ProcessorConfig {
        aruco_orientation: true,
        ..ProcessorConfig::default()
    };
    let mut processor = Processor::new(ScriptedDetector::new(vec![square_on]), config)
        .with_calibration(intrinsics())
        .with_marker_sizes(0.1);
    let markers = processor.see_image(blank(8, 8)).expect("markers");
    let o = markers[0].orientation().expect("orientation");
    assert_abs_diff_eq!(o.yaw(), 0.0, epsilon = 1e-9);
    assert_abs_diff_eq!(o.pitch(), 0.0, epsilon = 1e-9);
    assert_abs_diff_eq!(o.roll(), 0.0, epsilon = 1e-9);
}

#[test]
fn legacy_axes_reach_the_markers() {
    let config = ProcessorConfig {
        axes: AxisConvention::Legacy,
        ..ProcessorConfig::default()
    };
    let mut processor = Processor::new(ScriptedDetector::new(vec![at(1, 0.1, 0.2, 1.0)]), config)
        .with_calibration(intrinsics())
        .with_marker_sizes(0.1);
    let markers = processor.see_image(blank(8, 8)).expect("markers");
    let c = markers[0].cartesian().expect("cartesian");
    assert_abs_diff_eq!(c.x, 100.0, epsilon = 1e-9);
    assert_abs_diff_eq!(c.y, 200.0, epsilon = 1e-9);
    assert_abs_diff_eq!(c.z, 1000.0, epsilon = 1e-9);

    let s = markers[0].spherical().expect("spherical");
    assert!(s.rot_x().is_some());
    assert_eq!(s.rot_z(), None);

    let mut standard = Processor::new(
        ScriptedDetector::new(vec![at(1, 0.1, 0.2, 1.0)]),
        ProcessorConfig::default(),
    )
    .with_calibration(intrinsics())
    .with_marker_sizes(0.1);
    let reference = standard.see_image(blank(8, 8)).expect("markers");
    let legacy = markers[0].orientation().expect("orientation");
    let expected = reference[0].orientation().expect("orientation");
    assert_abs_diff_eq!(legacy.yaw(), expected.yaw(), epsilon = 1e-12);
    assert_abs_diff_eq!(legacy.pitch(), expected.pitch(), epsilon = 1e-12);
    assert_abs_diff_eq!(legacy.roll(), expected.roll(), epsilon = 1e-12);
}

#[test]
fn calibration_file_drives_pose_estimation() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("camera.json");
    std::fs::write(
        &path,
        r#"{
            "cameraResolution": [800, 800],
            "cameraMatrix": {
                "type_id": "opencv-matrix", "rows": 3, "cols": 3, "dt": "d",
                "data": [1293.09, 0.0, 400.0, 0.0, 1293.09, 400.0, 0.0, 0.0, 1.0]
            },
            "vidpid": "046d:0825"
        }"#,
    )
    .expect("write calibration");

    let (resolution, k) = load_calibration(&path).expect("calibration");
    assert_eq!((resolution.width, resolution.height), (800, 800));
    assert_eq!(k, intrinsics());

    let mut processor = Processor::new(
        ScriptedDetector::new(vec![at(3, 0.0, 0.0, 1.2)]),
        ProcessorConfig::default(),
    )
    .with_calibration(k)
    .with_marker_sizes(0.1);
    let markers = processor.see_image(blank(8, 8)).expect("markers");
    assert_eq!(markers[0].distance(), Ok(1200));

    let bad = dir.path().join("bad.json");
    std::fs::write(
        &bad,
        r#"{"cameraResolution": [800, 800], "cameraMatrix": {"rows": 1, "cols": 3, "data": [1, 2, 3]}}"#,
    )
    .expect("write calibration");
    assert!(load_calibration(&bad).is_err());
    assert!(load_calibration(dir.path().join("missing.json")).is_err());
}

#[test]
fn save_defaults_to_jpg_and_annotates() {
    init_logging();
    let dir = tempfile::tempdir().expect("tempdir");
    let detector = ScriptedDetector::new(vec![at(1, 0.0, 0.0, 0.5)]);
    let mut processor = Processor::new(detector, ProcessorConfig::default())
        .with_frame_source(ImageSource::new(blank(640, 480)));

    let written = processor
        .save(dir.path().join("snapshot"), None, None, true)
        .expect("save");
    assert_eq!(written, dir.path().join("snapshot.jpg"));
    assert!(written.exists());

    let png = processor
        .save(dir.path().join("plain.png"), None, None, false)
        .expect("save");
    let reloaded = image::open(&png).expect("reload").to_rgb8();
    assert_eq!(reloaded, blank(640, 480));
}

#[test]
fn config_round_trips_through_json() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("processor.json");
    let config = ProcessorConfig {
        name: "front".into(),
        mask_unknown_size_tags: true,
        quad_decimate: 1.0,
        ..ProcessorConfig::default()
    };
    config.write_json(&path).expect("write");
    assert_eq!(ProcessorConfig::load_json(&path).expect("load"), config);
}

#[test]
fn frame_sender_publishes_from_the_detection_hook() {
    let published: Arc<Mutex<Vec<String>>> = Arc::default();
    let sink = Arc::clone(&published);
    let sender = FrameSender::new(move |topic: &str, bytes: &[u8]| {
        assert!(bytes.starts_with(b"data:image/jpeg;base64, "));
        sink.lock().expect("sink").push(topic.to_owned());
        Ok(())
    })
    .threaded(false);

    let detector = ScriptedDetector::new(vec![at(1, 0.0, 0.0, 1.0)]);
    let mut processor = Processor::new(detector, ProcessorConfig::default())
        .with_frame_source(ImageSource::new(blank(64, 48)));
    processor.set_detection_hook(sender.hook());

    processor.see().expect("first");
    processor.see().expect("second");
    assert_eq!(
        *published.lock().expect("published"),
        vec!["camera/annotated", "camera/annotated"]
    );
}
