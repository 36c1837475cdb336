//! One calibration attempt: rays -> ground footprint -> warps.

use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};
use topview_core::{
    CalibrationError, FramePoint, FrameTransformer, GroundFootprint, GroundPlaneSolver,
    HomographyBuilder, HomographyPair, IntrinsicsModel, TopViewQuads,
};

use crate::{CalibrationConfig, TransformationMatrices};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Outcome of a successful calibration. Never modified once built.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationResult {
    pub warps: HomographyPair,
    /// Ground geometry in the reference frame.
    pub footprint: GroundFootprint,
    pub quads: TopViewQuads,
    /// Top-view pixels per meter across the track (`width / lane_width`).
    pub x_px_per_m: f64,
    /// Top-view pixels per meter along the track (`height / distance_ahead`).
    pub y_px_per_m: f64,
}

impl CalibrationResult {
    pub fn to_message(&self) -> TransformationMatrices {
        TransformationMatrices::from(&self.warps)
    }
}

/// Run the full geometry once.
///
/// Transform lookups each wait at most `config.transform_timeout()`.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip_all, fields(camera = %config.camera_frame, base = %config.base_frame))
)]
pub fn calibrate<T: FrameTransformer + ?Sized>(
    intrinsics: &IntrinsicsModel,
    transformer: &T,
    config: &CalibrationConfig,
) -> Result<CalibrationResult, CalibrationError> {
    let w = intrinsics.width()? as f64;
    let h = intrinsics.height()? as f64;
    log::info!("calibrating top view for {w}x{h} image");

    let timeout = config.transform_timeout();
    let to_base = |p: Point3<f64>| {
        transformer
            .transform(
                &FramePoint::new(config.camera_frame.as_str(), p),
                &config.base_frame,
                timeout,
            )
            .map(|fp| fp.position)
    };
    let to_camera = |p: Point3<f64>| {
        transformer
            .transform(
                &FramePoint::new(config.base_frame.as_str(), p),
                &config.camera_frame,
                timeout,
            )
            .map(|fp| fp.position)
    };

    let left_ray = intrinsics.ray_from_pixel(Point2::new(0.0, h))?;
    let right_ray = intrinsics.ray_from_pixel(Point2::new(w, h))?;
    log::debug!("left bottom ray (camera) {:?}", left_ray.direction);
    log::debug!("right bottom ray (camera) {:?}", right_ray.direction);

    let center = to_base(Point3::origin())?;
    let left_point = to_base(left_ray.at(1.0))?;
    let right_point = to_base(right_ray.at(1.0))?;
    log::debug!("camera center (base) {center:?}");
    log::debug!("left ray point (base) {left_point:?}");
    log::debug!("right ray point (base) {right_point:?}");

    let footprint =
        GroundPlaneSolver::new(config.distance_ahead).solve(&center, &left_point, &right_point)?;

    let upper_left = intrinsics.pixel_from_point(&to_camera(footprint.far_left)?)?;
    let upper_right = intrinsics.pixel_from_point(&to_camera(footprint.far_right)?)?;

    let builder = HomographyBuilder::new(config.lane_width);
    let quads = builder.quads(upper_left, upper_right, w, h, footprint.x_scale);
    let warps = builder.build(&quads)?;

    let x_px_per_m = w / config.lane_width;
    let y_px_per_m = h / config.distance_ahead;
    log::info!(
        "ground width {:.4} m, scale {x_px_per_m:.3} px/m across, {y_px_per_m:.3} px/m along",
        footprint.x_scale
    );

    Ok(CalibrationResult {
        warps,
        footprint,
        quads,
        x_px_per_m,
        y_px_per_m,
    })
}
