use std::sync::OnceLock;

use nalgebra::{Point2, Point3, Unit, Vector3};
use serde::{Deserialize, Serialize};

use crate::{CalibrationError, DegenerateGeometry};

/// Pinhole parameters of a rectified camera, in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    /// Focal length along image x.
    pub fx: f64,
    /// Focal length along image y.
    pub fy: f64,
    /// Principal point x.
    pub cx: f64,
    /// Principal point y.
    pub cy: f64,
    pub width: u32,
    pub height: u32,
}

impl CameraIntrinsics {
    /// Focal lengths must be non-zero and the image non-empty.
    pub fn is_valid(&self) -> bool {
        let finite = [self.fx, self.fy, self.cx, self.cy]
            .iter()
            .all(|v| v.is_finite());
        finite && self.fx != 0.0 && self.fy != 0.0 && self.width > 0 && self.height > 0
    }

    /// Unit ray through `pixel`, starting at the camera center.
    pub fn ray(&self, pixel: Point2<f64>) -> Ray3D {
        let dir = Vector3::new(
            (pixel.x - self.cx) / self.fx,
            (pixel.y - self.cy) / self.fy,
            1.0,
        );
        Ray3D {
            origin: Point3::origin(),
            direction: Unit::new_normalize(dir),
        }
    }

    /// Project a camera-frame point onto the image plane.
    pub fn project(&self, p: &Point3<f64>) -> Result<Point2<f64>, CalibrationError> {
        if !(p.x.is_finite() && p.y.is_finite() && p.z.is_finite()) {
            return Err(DegenerateGeometry::NonFinite.into());
        }
        if p.z <= f64::EPSILON {
            return Err(DegenerateGeometry::PointBehindCamera { depth: p.z }.into());
        }
        Ok(Point2::new(
            self.fx * p.x / p.z + self.cx,
            self.fy * p.y / p.z + self.cy,
        ))
    }
}

/// A half-line in the camera frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ray3D {
    pub origin: Point3<f64>,
    pub direction: Unit<Vector3<f64>>,
}

impl Ray3D {
    /// Point at distance `t` along the ray.
    #[inline]
    pub fn at(&self, t: f64) -> Point3<f64> {
        self.origin + self.direction.into_inner() * t
    }
}

/// Write-once holder for the camera intrinsics.
///
/// Intrinsics may be delivered from a subscriber thread while the calibration
/// loop is polling; the first valid message wins and later ones are dropped.
#[derive(Debug, Default)]
pub struct IntrinsicsModel {
    inner: OnceLock<CameraIntrinsics>,
}

impl IntrinsicsModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load intrinsics unless already set. Returns `true` if this call set them.
    ///
    /// Invalid intrinsics (zero focal length, empty image) are rejected and
    /// leave the model unset.
    pub fn load(&self, intrinsics: CameraIntrinsics) -> bool {
        if !intrinsics.is_valid() {
            log::warn!("rejecting invalid camera intrinsics {intrinsics:?}");
            return false;
        }
        let mut accepted = false;
        self.inner.get_or_init(|| {
            accepted = true;
            intrinsics
        });
        if accepted {
            log::info!(
                "camera intrinsics loaded: {}x{} fx={:.3} fy={:.3} cx={:.3} cy={:.3}",
                intrinsics.width,
                intrinsics.height,
                intrinsics.fx,
                intrinsics.fy,
                intrinsics.cx,
                intrinsics.cy
            );
        } else {
            log::debug!("camera intrinsics already set, ignoring update");
        }
        accepted
    }

    #[inline]
    pub fn is_loaded(&self) -> bool {
        self.inner.get().is_some()
    }

    pub fn intrinsics(&self) -> Result<&CameraIntrinsics, CalibrationError> {
        self.inner.get().ok_or(CalibrationError::NotInitialized)
    }

    pub fn ray_from_pixel(&self, pixel: Point2<f64>) -> Result<Ray3D, CalibrationError> {
        Ok(self.intrinsics()?.ray(pixel))
    }

    pub fn pixel_from_point(&self, point: &Point3<f64>) -> Result<Point2<f64>, CalibrationError> {
        self.intrinsics()?.project(point)
    }

    pub fn width(&self) -> Result<u32, CalibrationError> {
        Ok(self.intrinsics()?.width)
    }

    pub fn height(&self) -> Result<u32, CalibrationError> {
        Ok(self.intrinsics()?.height)
    }
}
