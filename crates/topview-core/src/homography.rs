use nalgebra::{Matrix3, Point2, SMatrix, SVector, Vector3};
use serde::{Deserialize, Serialize};

use crate::{CalibrationError, DegenerateGeometry};

#[cfg(feature = "tracing")]
use tracing::instrument;

const DISTINCT_EPS: f64 = 1e-9;
const COLLINEAR_EPS: f64 = 1e-9;

/// Planar perspective transform, normalized so that `h[(2, 2)] == 1`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Homography {
    pub h: Matrix3<f64>,
}

impl Homography {
    pub fn new(h: Matrix3<f64>) -> Self {
        Self { h }
    }

    pub fn from_row_major(values: [f64; 9]) -> Self {
        Self::new(Matrix3::from_row_slice(&values))
    }

    /// Row-major flattening used on the wire.
    pub fn to_row_major(&self) -> [f64; 9] {
        let mut out = [0.0; 9];
        for r in 0..3 {
            for c in 0..3 {
                out[r * 3 + c] = self.h[(r, c)];
            }
        }
        out
    }

    #[inline]
    pub fn apply(&self, p: Point2<f64>) -> Point2<f64> {
        let v = self.h * Vector3::new(p.x, p.y, 1.0);
        Point2::new(v[0] / v[2], v[1] / v[2])
    }
}

fn hartley_normalization(cx: f64, cy: f64, mean_dist: f64) -> Matrix3<f64> {
    let s = if mean_dist > 1e-12 {
        (2.0_f64).sqrt() / mean_dist
    } else {
        1.0
    };

    Matrix3::<f64>::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0)
}

fn normalize_points4(pts: &[Point2<f64>; 4]) -> ([Point2<f64>; 4], Matrix3<f64>) {
    // translate to centroid, scale so mean distance = sqrt(2)
    let cx = pts.iter().map(|p| p.x).sum::<f64>() / 4.0;
    let cy = pts.iter().map(|p| p.y).sum::<f64>() / 4.0;
    let mean_dist = pts
        .iter()
        .map(|p| ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt())
        .sum::<f64>()
        / 4.0;

    let t = hartley_normalization(cx, cy, mean_dist);
    let out = pts.map(|p| {
        let v = t * Vector3::new(p.x, p.y, 1.0);
        Point2::new(v[0], v[1])
    });
    (out, t)
}

fn normalize_homography(h: Matrix3<f64>) -> Option<Matrix3<f64>> {
    let s = h[(2, 2)];
    if s.abs() < 1e-12 {
        return None;
    }
    Some(h / s)
}

fn denormalize_homography(
    hn: Matrix3<f64>,
    t_src: Matrix3<f64>,
    t_dst: Matrix3<f64>,
) -> Option<Matrix3<f64>> {
    let t_dst_inv = t_dst.try_inverse()?;
    Some(t_dst_inv * hn * t_src)
}

/// Reject quads that cannot define a unique perspective transform.
pub fn check_quad(pts: &[Point2<f64>; 4]) -> Result<(), DegenerateGeometry> {
    if pts.iter().any(|p| !(p.x.is_finite() && p.y.is_finite())) {
        return Err(DegenerateGeometry::NonFinite);
    }

    let extent = pts
        .iter()
        .flat_map(|a| pts.iter().map(move |b| nalgebra::distance(a, b)))
        .fold(0.0_f64, f64::max);

    for i in 0..4 {
        for j in (i + 1)..4 {
            if nalgebra::distance(&pts[i], &pts[j]) <= DISTINCT_EPS * extent.max(1.0) {
                return Err(DegenerateGeometry::CoincidentPoints {
                    first: i,
                    second: j,
                });
            }
        }
    }

    for (a, b, c) in [(0, 1, 2), (0, 1, 3), (0, 2, 3), (1, 2, 3)] {
        let ab = pts[b] - pts[a];
        let ac = pts[c] - pts[a];
        let cross = ab.x * ac.y - ab.y * ac.x;
        if cross.abs() <= COLLINEAR_EPS * extent * extent {
            return Err(DegenerateGeometry::CollinearPoints { indices: [a, b, c] });
        }
    }
    Ok(())
}

/// Compute H such that `dst ~ H * src` from exactly four correspondences.
///
/// Corner order must be consistent between `src` and `dst`. Both quads are
/// validated first; degenerate input is an error, never a matrix.
pub fn homography_from_4pt(
    src: &[Point2<f64>; 4],
    dst: &[Point2<f64>; 4],
) -> Result<Homography, DegenerateGeometry> {
    check_quad(src)?;
    check_quad(dst)?;

    // Unknowns: [h11 h12 h13 h21 h22 h23 h31 h32], with h33 = 1
    // h11 x + h12 y + h13 - u h31 x - u h32 y = u
    // h21 x + h22 y + h23 - v h31 x - v h32 y = v
    let (src_n, t_src) = normalize_points4(src);
    let (dst_n, t_dst) = normalize_points4(dst);

    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();

    for k in 0..4 {
        let x = src_n[k].x;
        let y = src_n[k].y;
        let u = dst_n[k].x;
        let v = dst_n[k].y;

        let r0 = 2 * k;
        a[(r0, 0)] = x;
        a[(r0, 1)] = y;
        a[(r0, 2)] = 1.0;
        a[(r0, 6)] = -u * x;
        a[(r0, 7)] = -u * y;
        b[r0] = u;

        let r1 = 2 * k + 1;
        a[(r1, 3)] = x;
        a[(r1, 4)] = y;
        a[(r1, 5)] = 1.0;
        a[(r1, 6)] = -v * x;
        a[(r1, 7)] = -v * y;
        b[r1] = v;
    }

    let x = a.lu().solve(&b).ok_or(DegenerateGeometry::SingularSystem)?;

    let hn = Matrix3::<f64>::new(
        x[0], x[1], x[2], //
        x[3], x[4], x[5], //
        x[6], x[7], 1.0,
    );

    let h = denormalize_homography(hn, t_src, t_dst)
        .and_then(normalize_homography)
        .ok_or(DegenerateGeometry::SingularSystem)?;
    if h.iter().any(|v| !v.is_finite()) {
        return Err(DegenerateGeometry::NonFinite);
    }

    Ok(Homography::new(h))
}

/// Camera-image quad and the top-view rectangle it maps onto.
///
/// Order: upper-left, upper-right, lower-right, lower-left.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TopViewQuads {
    pub src: [Point2<f64>; 4],
    pub dst: [Point2<f64>; 4],
}

/// Forward (image -> top view) and inverse (top view -> image) warps.
///
/// Each is solved from its own correspondence set rather than by inverting
/// the other.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HomographyPair {
    pub forward: Homography,
    pub inverse: Homography,
}

/// Places the top-view rectangle and solves both warps.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HomographyBuilder {
    lane_width: f64,
}

impl HomographyBuilder {
    /// `lane_width` in meters; the image width is mapped onto it.
    pub fn new(lane_width: f64) -> Self {
        Self { lane_width }
    }

    pub fn lane_width(&self) -> f64 {
        self.lane_width
    }

    /// Build the correspondence quads.
    ///
    /// `upper_left`/`upper_right` are the far ground points projected into
    /// the image. The destination columns straddle the image midline, spread
    /// by the ratio of the ground width `x_scale` to the lane width.
    pub fn quads(
        &self,
        upper_left: Point2<f64>,
        upper_right: Point2<f64>,
        width: f64,
        height: f64,
        x_scale: f64,
    ) -> TopViewQuads {
        let half = width / 2.0;
        let spread = x_scale / self.lane_width;
        let l_w = half * (1.0 - spread);
        let r_w = half * (1.0 + spread);
        TopViewQuads {
            src: [
                upper_left,
                upper_right,
                Point2::new(width, height),
                Point2::new(0.0, height),
            ],
            dst: [
                Point2::new(l_w, 0.0),
                Point2::new(r_w, 0.0),
                Point2::new(r_w, height),
                Point2::new(l_w, height),
            ],
        }
    }

    /// Two independent four-point solves: `src -> dst` and `dst -> src`.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    pub fn build(&self, quads: &TopViewQuads) -> Result<HomographyPair, CalibrationError> {
        log::debug!("src quad = {:?}", quads.src);
        log::debug!("dst quad = {:?}", quads.dst);
        let forward = homography_from_4pt(&quads.src, &quads.dst)?;
        let inverse = homography_from_4pt(&quads.dst, &quads.src)?;
        Ok(HomographyPair { forward, inverse })
    }
}
