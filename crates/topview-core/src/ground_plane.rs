//! Ground-plane footprint of the image's bottom edge.
//!
//! Everything here is expressed in the reference (body) frame: +x forward,
//! +y left, +z up.

use nalgebra::{Point3, Unit, Vector3};
use serde::{Deserialize, Serialize};

use crate::{CalibrationError, DegenerateGeometry};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Reference-frame axis pointing forward.
pub const FORWARD_AXIS: usize = 0;
/// Reference-frame axis pointing across the track.
pub const LATERAL_AXIS: usize = 1;
/// Reference-frame axis pointing up.
pub const VERTICAL_AXIS: usize = 2;

const PARALLEL_EPS: f64 = 1e-9;
const COINCIDENT_EPS: f64 = 1e-9;

/// Infinite plane given by a point and a unit normal.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GroundPlane {
    pub point: Point3<f64>,
    pub normal: Unit<Vector3<f64>>,
}

impl GroundPlane {
    /// Horizontal plane at the given elevation.
    pub fn horizontal(elevation: f64) -> Self {
        let mut point = Point3::origin();
        point[VERTICAL_AXIS] = elevation;
        Self {
            point,
            normal: Vector3::z_axis(),
        }
    }

    /// Intersection with the line through `a` and `b`, or `None` when the
    /// line runs parallel to the plane.
    pub fn intersect_line(&self, a: &Point3<f64>, b: &Point3<f64>) -> Option<Point3<f64>> {
        let dir = b - a;
        let len = dir.norm();
        let denom = self.normal.dot(&dir);
        if len <= f64::EPSILON || denom.abs() <= PARALLEL_EPS * len {
            return None;
        }
        let t = self.normal.dot(&(self.point - a)) / denom;
        Some(a + dir * t)
    }
}

/// Near and far ground points spanned by the image's bottom edge.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroundFootprint {
    /// Ground point under the bottom-left pixel.
    pub near_left: Point3<f64>,
    /// Ground point under the bottom-right pixel.
    pub near_right: Point3<f64>,
    /// `near_left` moved `look_ahead` meters along the forward axis.
    pub far_left: Point3<f64>,
    /// `near_right` moved `look_ahead` meters along the forward axis.
    pub far_right: Point3<f64>,
    /// Ground width in meters covered by the bottom image edge.
    pub x_scale: f64,
    /// +1 or -1: direction of travel along the forward axis.
    pub sign: f64,
}

/// Intersects the bottom-corner camera rays with the ground and pushes the
/// result forward by a fixed look-ahead distance.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GroundPlaneSolver {
    look_ahead: f64,
}

impl GroundPlaneSolver {
    /// `look_ahead` in meters. A negative value flips the translation.
    pub fn new(look_ahead: f64) -> Self {
        Self { look_ahead }
    }

    pub fn look_ahead(&self) -> f64 {
        self.look_ahead
    }

    /// Solve from reference-frame points: the camera center and one sampled
    /// point on each bottom-corner ray.
    ///
    /// The plane elevation comes from `left_ray_point` alone, which makes
    /// the result sensitive to camera roll. Nothing checks that the plane
    /// lies below `center`: when the bottom rays point above the horizon the
    /// "ground" sits above the camera, the solve still succeeds, and the far
    /// points later project below the bottom image edge.
    ///
    /// The travel sign is guessed from the lateral coordinate of
    /// `left_ray_point`. This covers cameras mounted looking along either
    /// direction of the forward axis and nothing more general.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    pub fn solve(
        &self,
        center: &Point3<f64>,
        left_ray_point: &Point3<f64>,
        right_ray_point: &Point3<f64>,
    ) -> Result<GroundFootprint, CalibrationError> {
        let all = [center, left_ray_point, right_ray_point];
        if all.iter().any(|p| p.coords.iter().any(|v| !v.is_finite())) {
            return Err(DegenerateGeometry::NonFinite.into());
        }

        let plane = GroundPlane::horizontal(left_ray_point[VERTICAL_AXIS]);

        let near_left = plane
            .intersect_line(center, left_ray_point)
            .ok_or(DegenerateGeometry::RayParallelToGround { corner: "left" })?;
        let near_right = plane
            .intersect_line(center, right_ray_point)
            .ok_or(DegenerateGeometry::RayParallelToGround { corner: "right" })?;

        let x_scale = nalgebra::distance(&near_left, &near_right);
        if x_scale <= COINCIDENT_EPS {
            return Err(DegenerateGeometry::CoincidentGroundPoints { distance: x_scale }.into());
        }

        let sign = if left_ray_point[LATERAL_AXIS] > 0.0 {
            1.0
        } else {
            -1.0
        };
        let mut shift = Vector3::zeros();
        shift[FORWARD_AXIS] = sign * self.look_ahead;

        let footprint = GroundFootprint {
            near_left,
            near_right,
            far_left: near_left + shift,
            far_right: near_right + shift,
            x_scale,
            sign,
        };
        log::debug!(
            "ground footprint: near=({:?}, {:?}) far=({:?}, {:?}) x_scale={:.4} sign={}",
            footprint.near_left,
            footprint.near_right,
            footprint.far_left,
            footprint.far_right,
            x_scale,
            sign
        );
        Ok(footprint)
    }
}
