//! One-shot top-view calibration.
//!
//! Given a camera's intrinsics and its rigid transform to a reference frame,
//! compute the pair of perspective warps between the camera image and a
//! fixed-scale top view of the ground plane, publish them once and stop.
//!
//! ## Quickstart
//!
//! ```no_run
//! use std::sync::Arc;
//! use topview_calib::{CalibrationConfig, CalibrationNode, TransformationMatrices};
//! use topview_core::TransformBuffer;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CalibrationConfig::from_path("topview.json")?;
//! let frames = Arc::new(TransformBuffer::new());
//! let (out_tx, out_rx) = crossbeam_channel::bounded::<TransformationMatrices>(1);
//! let (mut node, handle) = CalibrationNode::new(config, Arc::clone(&frames), out_tx);
//!
//! // elsewhere: frames.set_transform(..) and handle.send_camera_info(..)
//! # let _ = (&handle, out_rx);
//! let result = node.run();
//! println!("calibrated: {}", result.is_some());
//! # Ok(())
//! # }
//! ```

mod config;
mod controller;
mod messages;
mod node;
mod pipeline;

pub use config::{CalibrationConfig, ConfigError};
pub use controller::{CalibrationController, CalibrationState, ResultPublisher, TickOutcome};
pub use messages::{CameraInfo, TransformationMatrices};
pub use node::{CalibrationNode, NodeHandle};
pub use pipeline::{calibrate, CalibrationResult};
