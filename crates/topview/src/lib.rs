//! High-level facade for the `topview-*` workspace.
//!
//! This crate provides:
//! - re-exports of the geometry (`topview-core`) and calibration
//!   (`topview-calib`) crates
//! - [`run_static`], which runs the calibration node against a fixed
//!   camera mounting, delivering intrinsics the way a camera driver would
//! - (feature `image`) top-view rendering of camera frames
//! - (feature `cli`) the `topview` binary
//!
//! ## API map
//! - `topview::core`: intrinsics, frames, ground plane, homographies, images.
//! - `topview::calib`: configuration, controller state machine, node runner.
//! - `topview::extrinsics`: static transforms from JSON.
//! - `topview::render` (feature `image`): warps `image::GrayImage` frames.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub use topview_calib as calib;
pub use topview_core as core;

pub use topview_calib::{
    CalibrationConfig, CalibrationResult, CameraInfo, ConfigError, TransformationMatrices,
};
pub use topview_core::{CalibrationError, CameraIntrinsics, TransformBuffer};

pub mod extrinsics;
#[cfg(feature = "image")]
pub mod render;

/// Errors produced by the facade helpers and the CLI.
#[derive(thiserror::Error, Debug)]
pub enum TopviewError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid JSON input: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "image")]
    #[error(transparent)]
    Image(#[from] ::image::ImageError),

    #[error("calibration did not complete within {0:?}")]
    Timeout(Duration),
}

/// Calibrate against a fixed frame graph.
///
/// The camera info is delivered from a separate thread, as it would be by a
/// subscriber. Gives up after `max_wait` and reports [`TopviewError::Timeout`];
/// degenerate geometry keeps retrying until then.
pub fn run_static(
    config: CalibrationConfig,
    frames: Arc<TransformBuffer>,
    camera_info: CameraInfo,
    max_wait: Duration,
) -> Result<(CalibrationResult, TransformationMatrices), TopviewError> {
    let (out_tx, out_rx) = crossbeam_channel::bounded::<TransformationMatrices>(1);
    let (mut node, handle) = calib::CalibrationNode::new(config, frames, out_tx);

    let driver = handle.clone();
    let feeder = thread::spawn(move || {
        if !driver.send_camera_info(camera_info) {
            log::warn!("calibration node stopped before camera info was delivered");
        }
    });

    let result = node.run_for(max_wait);
    drop(handle);
    if feeder.join().is_err() {
        log::error!("camera info feeder panicked");
    }
    let result = result.ok_or(TopviewError::Timeout(max_wait))?;
    let matrices = out_rx
        .try_recv()
        .unwrap_or_else(|_| result.to_message());
    Ok((result, matrices))
}
