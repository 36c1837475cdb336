use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use approx::assert_relative_eq;
use nalgebra::{Isometry3, Matrix3, Point2, Rotation3, Translation3, UnitQuaternion, Vector3};
use topview_calib::{
    CalibrationConfig, CalibrationController, CalibrationNode, CalibrationState, CameraInfo,
    TickOutcome, TransformationMatrices,
};
use topview_core::{
    CalibrationError, CameraIntrinsics, DegenerateGeometry, FramePoint, FrameTransformer,
    Homography, TransformBuffer,
};

fn config(distance_ahead: f64) -> CalibrationConfig {
    CalibrationConfig::from_json_str(&format!(
        r#"{{
            "camera_frame": "camera_optical",
            "base_frame": "base_link",
            "distance_ahead": {distance_ahead},
            "lane_width": 3.0,
            "camera_info_topic": "/camera/camera_info",
            "matrix_topic": "/topview/matrices",
            "tick_period_ms": 5,
            "transform_timeout_ms": 20
        }}"#
    ))
    .expect("valid config")
}

fn vga() -> CameraIntrinsics {
    CameraIntrinsics {
        fx: 500.0,
        fy: 500.0,
        cx: 320.0,
        cy: 240.0,
        width: 640,
        height: 480,
    }
}

/// Optical axes (x right, y down, z forward) expressed in the body frame.
fn optical_in_body() -> UnitQuaternion<f64> {
    let r = Matrix3::new(
        0.0, 0.0, 1.0, //
        -1.0, 0.0, 0.0, //
        0.0, -1.0, 0.0,
    );
    UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(r))
}

/// Camera 1 m above the body origin, rotated by `extra` in the body frame.
fn mount(extra: UnitQuaternion<f64>) -> Arc<TransformBuffer> {
    let frames = Arc::new(TransformBuffer::new());
    frames.set_transform(
        "base_link",
        "camera_optical",
        Isometry3::from_parts(Translation3::new(0.0, 0.0, 1.0), extra * optical_in_body()),
    );
    frames
}

fn apply(flat: &[f64; 9], p: Point2<f64>) -> Point2<f64> {
    Homography::from_row_major(*flat).apply(p)
}

#[test]
fn forward_camera_scenario() {
    let frames = mount(UnitQuaternion::identity());
    let mut ctl = CalibrationController::new(config(5.0), frames, Vec::new());
    assert!(ctl.on_intrinsics(vga()));
    assert_eq!(ctl.tick(), Ok(TickOutcome::Published));

    let result = *ctl.result().expect("calibrated");
    let expected_scale = 1.28 / 1.64_f64.sqrt();
    assert!(result.footprint.x_scale.is_finite());
    assert_relative_eq!(result.footprint.x_scale, expected_scale, epsilon = 1e-9);
    assert_eq!(result.footprint.sign, 1.0);

    let l_w = 320.0 * (1.0 - expected_scale / 3.0);
    let r_w = 320.0 * (1.0 + expected_scale / 3.0);

    let published = ctl.publisher();
    assert_eq!(published.len(), 1);
    let msg: TransformationMatrices = published[0];
    assert_eq!(msg, result.to_message());

    assert_relative_eq!(
        apply(&msg.forward_warp, Point2::new(0.0, 480.0)),
        Point2::new(l_w, 480.0),
        epsilon = 1e-6
    );
    assert_relative_eq!(
        apply(&msg.forward_warp, Point2::new(640.0, 480.0)),
        Point2::new(r_w, 480.0),
        epsilon = 1e-6
    );
    assert_relative_eq!(
        apply(&msg.inverse_warp, Point2::new(l_w, 480.0)),
        Point2::new(0.0, 480.0),
        epsilon = 1e-6
    );

    // far points project symmetrically above the bottom edge
    let [ul, ur, _, _] = result.quads.src;
    assert_relative_eq!(ul.y, ur.y, epsilon = 1e-9);
    assert!(ul.y < 480.0);
    assert_relative_eq!(ul.x + ur.x, 640.0, epsilon = 1e-9);

    for (s, d) in result.quads.src.iter().zip(result.quads.dst.iter()) {
        assert_relative_eq!(apply(&msg.forward_warp, *s), *d, epsilon = 1e-6);
        assert_relative_eq!(apply(&msg.inverse_warp, *d), *s, epsilon = 1e-6);
    }

    assert_relative_eq!(result.x_px_per_m, 640.0 / 3.0);
    assert_relative_eq!(result.y_px_per_m, 480.0 / 5.0);
}

#[test]
fn calibrated_controller_ignores_later_events() {
    let frames = mount(UnitQuaternion::identity());
    let mut ctl = CalibrationController::new(config(5.0), Arc::clone(&frames), Vec::new());
    ctl.on_intrinsics(vga());
    assert_eq!(ctl.tick(), Ok(TickOutcome::Published));
    let first = *ctl.result().unwrap();

    let mut other = vga();
    other.fx = 900.0;
    assert!(!ctl.on_intrinsics(other));
    frames.set_transform(
        "base_link",
        "camera_optical",
        Isometry3::from_parts(Translation3::new(0.0, 0.0, 2.0), optical_in_body()),
    );
    for _ in 0..5 {
        assert_eq!(ctl.tick(), Ok(TickOutcome::Idle));
    }

    assert_eq!(ctl.attempts(), 1);
    assert_eq!(ctl.publisher().len(), 1);
    assert_eq!(ctl.result(), Some(&first));
}

#[test]
fn waits_until_transform_appears() {
    let frames = Arc::new(TransformBuffer::new());
    let mut ctl = CalibrationController::new(config(5.0), Arc::clone(&frames), Vec::new());
    ctl.on_intrinsics(vga());
    for _ in 0..3 {
        assert_eq!(ctl.tick(), Ok(TickOutcome::AwaitingTransform));
    }
    assert_eq!(ctl.attempts(), 0);

    frames.set_transform(
        "base_link",
        "camera_optical",
        Isometry3::from_parts(Translation3::new(0.0, 0.0, 1.0), optical_in_body()),
    );
    assert_eq!(ctl.tick(), Ok(TickOutcome::Published));
    assert!(ctl.is_calibrated());
}

/// Reports availability but fails the first `failures` lookups.
struct Flaky {
    inner: Arc<TransformBuffer>,
    failures: AtomicUsize,
}

impl FrameTransformer for Flaky {
    fn can_transform(&self, target: &str, source: &str) -> bool {
        self.inner.can_transform(target, source)
    }

    fn transform(
        &self,
        point: &FramePoint,
        target: &str,
        timeout: Duration,
    ) -> Result<FramePoint, CalibrationError> {
        let left = self.failures.load(Ordering::SeqCst);
        if left > 0 {
            self.failures.store(left - 1, Ordering::SeqCst);
            return Err(CalibrationError::TransformUnavailable {
                source_frame: point.frame.clone(),
                target_frame: target.to_string(),
                reason: "extrapolation into the future".to_string(),
            });
        }
        self.inner.transform(point, target, timeout)
    }
}

#[test]
fn transient_lookup_failures_are_retried() {
    let flaky = Flaky {
        inner: mount(UnitQuaternion::identity()),
        failures: AtomicUsize::new(2),
    };
    let mut ctl = CalibrationController::new(config(5.0), flaky, Vec::new());
    ctl.on_intrinsics(vga());
    assert_eq!(ctl.tick(), Ok(TickOutcome::AwaitingTransform));
    assert_eq!(ctl.tick(), Ok(TickOutcome::AwaitingTransform));
    assert_eq!(ctl.state(), &CalibrationState::WaitingForTransform);
    assert_eq!(ctl.tick(), Ok(TickOutcome::Published));
    assert_eq!(ctl.attempts(), 3);
    assert_eq!(ctl.publisher().len(), 1);
}

#[test]
fn horizon_aligned_camera_is_degenerate() {
    // pitch up until the bottom image row lies on the horizon
    let pitch = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), -(0.48_f64).atan());
    let mut ctl = CalibrationController::new(config(5.0), mount(pitch), Vec::new());
    ctl.on_intrinsics(vga());

    let err = ctl.tick().unwrap_err();
    assert!(
        matches!(
            err,
            CalibrationError::GeometryDegenerate(DegenerateGeometry::RayParallelToGround { .. })
        ),
        "unexpected {err:?}"
    );
    assert_eq!(ctl.state(), &CalibrationState::WaitingForTransform);
    assert!(ctl.publisher().is_empty());
}

#[test]
fn rear_facing_camera_translates_backwards() {
    let yaw = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), std::f64::consts::PI);
    let mut ctl = CalibrationController::new(config(5.0), mount(yaw), Vec::new());
    ctl.on_intrinsics(vga());
    assert_eq!(ctl.tick(), Ok(TickOutcome::Published));

    let fp = ctl.result().unwrap().footprint;
    assert_eq!(fp.sign, -1.0);
    assert_relative_eq!(fp.far_left.x - fp.near_left.x, -5.0, epsilon = 1e-9);
    assert_relative_eq!(fp.far_right.x - fp.near_right.x, -5.0, epsilon = 1e-9);
}

#[test]
fn look_ahead_behind_the_camera_is_rejected() {
    let mut ctl = CalibrationController::new(
        config(-5.0),
        mount(UnitQuaternion::identity()),
        Vec::new(),
    );
    ctl.on_intrinsics(vga());
    let err = ctl.tick().unwrap_err();
    assert!(matches!(
        err,
        CalibrationError::GeometryDegenerate(DegenerateGeometry::PointBehindCamera { .. })
    ));
    assert!(!ctl.is_calibrated());
}

#[test]
fn node_calibrates_from_async_inputs() {
    let frames = Arc::new(TransformBuffer::new());
    let (out_tx, out_rx) = crossbeam_channel::unbounded::<TransformationMatrices>();
    let (mut node, handle) = CalibrationNode::new(config(5.0), Arc::clone(&frames), out_tx);

    let feeder = {
        let handle = handle.clone();
        let frames = Arc::clone(&frames);
        thread::spawn(move || {
            let info = CameraInfo::from_intrinsics("camera_optical", &vga());
            for _ in 0..3 {
                handle.send_camera_info(info.clone());
                thread::sleep(Duration::from_millis(10));
            }
            frames.set_transform(
                "base_link",
                "camera_optical",
                Isometry3::from_parts(Translation3::new(0.0, 0.0, 1.0), optical_in_body()),
            );
        })
    };

    let result = node.run().expect("calibrated before shutdown");
    feeder.join().unwrap();
    drop(handle);

    let published: Vec<_> = out_rx.try_iter().collect();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0], result.to_message());
    assert_eq!(node.controller().attempts(), 1);
    assert_eq!(node.run(), Some(result));
}
