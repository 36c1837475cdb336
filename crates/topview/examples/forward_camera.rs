use std::f64::consts::FRAC_PI_2;
use std::sync::Arc;
use std::time::Duration;

use topview::extrinsics::{transform_buffer, StaticTransform};
use topview::{run_static, CalibrationConfig, CameraInfo, CameraIntrinsics};

#[cfg(feature = "tracing")]
use topview::core::init_tracing;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    #[cfg(feature = "tracing")]
    init_tracing(log::LevelFilter::Info, false);
    #[cfg(not(feature = "tracing"))]
    topview::core::init_with_level(log::LevelFilter::Info)?;

    let config = CalibrationConfig::from_json_str(
        r#"{
            "camera_frame": "camera_optical",
            "base_frame": "base_link",
            "distance_ahead": 5.0,
            "lane_width": 3.0,
            "camera_info_topic": "/camera/camera_info",
            "matrix_topic": "/topview/matrices"
        }"#,
    )?;

    // VGA camera 1 m above the body origin, looking straight ahead
    let intrinsics = CameraIntrinsics {
        fx: 500.0,
        fy: 500.0,
        cx: 320.0,
        cy: 240.0,
        width: 640,
        height: 480,
    };
    let mount = StaticTransform {
        parent: "base_link".into(),
        child: "camera_optical".into(),
        translation: [0.0, 0.0, 1.0],
        rotation_rpy: [-FRAC_PI_2, 0.0, -FRAC_PI_2],
    };

    let (result, matrices) = run_static(
        config,
        Arc::new(transform_buffer(&[mount])),
        CameraInfo::from_intrinsics("camera_optical", &intrinsics),
        Duration::from_secs(2),
    )?;

    println!("x scale: {:.4}", result.footprint.x_scale);
    println!("px/m: {:.2} x {:.2}", result.x_px_per_m, result.y_px_per_m);
    println!("{}", serde_json::to_string_pretty(&matrices)?);
    Ok(())
}
