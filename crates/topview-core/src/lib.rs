//! Geometry for top-view (bird's-eye) calibration of a forward camera.
//!
//! This crate is purely geometric and single-threaded apart from the
//! shared [`IntrinsicsModel`] and [`TransformBuffer`]. It knows nothing about
//! message transport or scheduling; see `topview-calib` for the state machine
//! that drives it.
//!
//! Conventions: the camera frame is an optical frame (+z forward, +x right,
//! +y down). The reference frame has +x forward, +y left, +z up.

mod error;
mod frames;
mod ground_plane;
mod homography;
mod image;
mod intrinsics;
mod logger;

pub use error::{CalibrationError, DegenerateGeometry};
pub use frames::{FramePoint, FramePose, FrameTransformer, TransformBuffer};
pub use ground_plane::{
    GroundFootprint, GroundPlane, GroundPlaneSolver, FORWARD_AXIS, LATERAL_AXIS, VERTICAL_AXIS,
};
pub use homography::{
    check_quad, homography_from_4pt, Homography, HomographyBuilder, HomographyPair, TopViewQuads,
};
pub use image::{sample_bilinear, warp_perspective_gray, GrayImage, GrayImageView};
pub use intrinsics::{CameraIntrinsics, IntrinsicsModel, Ray3D};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{filter_directives, init_with_level, parse_level, LoggerError};
