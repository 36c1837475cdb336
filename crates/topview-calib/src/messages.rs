//! Messages exchanged with the outside world.

use serde::{Deserialize, Serialize};
use topview_core::{CameraIntrinsics, HomographyPair};

/// Camera description as published by a camera driver.
///
/// `k` is the row-major 3x3 intrinsic matrix. When the 3x4 projection
/// matrix `p` is present, its focal lengths and principal point take
/// precedence, matching rectified-image consumers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraInfo {
    #[serde(default)]
    pub frame_id: String,
    pub width: u32,
    pub height: u32,
    pub k: [f64; 9],
    #[serde(default)]
    pub p: Option<[f64; 12]>,
}

impl CameraInfo {
    pub fn from_intrinsics(frame_id: impl Into<String>, k: &CameraIntrinsics) -> Self {
        Self {
            frame_id: frame_id.into(),
            width: k.width,
            height: k.height,
            k: [k.fx, 0.0, k.cx, 0.0, k.fy, k.cy, 0.0, 0.0, 1.0],
            p: None,
        }
    }

    pub fn intrinsics(&self) -> CameraIntrinsics {
        let (fx, fy, cx, cy) = match &self.p {
            Some(p) => (p[0], p[5], p[2], p[6]),
            None => (self.k[0], self.k[4], self.k[2], self.k[5]),
        };
        CameraIntrinsics {
            fx,
            fy,
            cx,
            cy,
            width: self.width,
            height: self.height,
        }
    }
}

/// The calibration output: two row-major 3x3 pixel-to-pixel warps.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransformationMatrices {
    /// Camera image -> top view.
    pub forward_warp: [f64; 9],
    /// Top view -> camera image.
    pub inverse_warp: [f64; 9],
}

impl From<&HomographyPair> for TransformationMatrices {
    fn from(pair: &HomographyPair) -> Self {
        Self {
            forward_warp: pair.forward.to_row_major(),
            inverse_warp: pair.inverse.to_row_major(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projection_matrix_overrides_k() {
        let info: CameraInfo = serde_json::from_str(
            r#"{
                "width": 640, "height": 480,
                "k": [500, 0, 320, 0, 500, 240, 0, 0, 1],
                "p": [450, 0, 318, 0, 0, 460, 242, 0, 0, 0, 1, 0]
            }"#,
        )
        .unwrap();
        let k = info.intrinsics();
        assert_eq!((k.fx, k.fy, k.cx, k.cy), (450.0, 460.0, 318.0, 242.0));
        assert_eq!(info.frame_id, "");
    }

    #[test]
    fn intrinsics_survive_conversion() {
        let k = CameraIntrinsics {
            fx: 500.0,
            fy: 510.0,
            cx: 320.0,
            cy: 240.0,
            width: 640,
            height: 480,
        };
        assert_eq!(CameraInfo::from_intrinsics("cam", &k).intrinsics(), k);
    }
}
