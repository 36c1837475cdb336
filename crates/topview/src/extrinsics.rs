//! Static camera mounting loaded from JSON.

use std::path::Path;

use nalgebra::{Isometry3, Translation3, UnitQuaternion};
use serde::{Deserialize, Serialize};
use topview_core::TransformBuffer;

use crate::TopviewError;

/// One fixed `parent -> child` transform.
///
/// `rotation_rpy` is roll, pitch, yaw in radians, applied as
/// `Rz(yaw) * Ry(pitch) * Rx(roll)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StaticTransform {
    pub parent: String,
    pub child: String,
    pub translation: [f64; 3],
    #[serde(default)]
    pub rotation_rpy: [f64; 3],
}

impl StaticTransform {
    /// Transform taking child coordinates into parent coordinates.
    pub fn isometry(&self) -> Isometry3<f64> {
        let [x, y, z] = self.translation;
        let [roll, pitch, yaw] = self.rotation_rpy;
        Isometry3::from_parts(
            Translation3::new(x, y, z),
            UnitQuaternion::from_euler_angles(roll, pitch, yaw),
        )
    }
}

pub fn load_static_transforms(path: impl AsRef<Path>) -> Result<Vec<StaticTransform>, TopviewError> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Fill a fresh buffer with the given transforms.
pub fn transform_buffer(transforms: &[StaticTransform]) -> TransformBuffer {
    let buffer = TransformBuffer::new();
    for t in transforms {
        buffer.set_transform(t.parent.as_str(), t.child.as_str(), t.isometry());
    }
    buffer
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Point3, Vector3};
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn optical_rpy_points_camera_forward() {
        let t = StaticTransform {
            parent: "base_link".into(),
            child: "camera_optical".into(),
            translation: [0.0, 0.0, 1.0],
            rotation_rpy: [-FRAC_PI_2, 0.0, -FRAC_PI_2],
        };
        let iso = t.isometry();
        // optical +z is body +x, optical +x is body -y, optical +y is body -z
        assert_relative_eq!(iso.rotation * Vector3::z(), Vector3::x(), epsilon = 1e-12);
        assert_relative_eq!(iso.rotation * Vector3::x(), -Vector3::y(), epsilon = 1e-12);
        assert_relative_eq!(iso.rotation * Vector3::y(), -Vector3::z(), epsilon = 1e-12);
        assert_relative_eq!(iso * Point3::origin(), Point3::new(0.0, 0.0, 1.0));
    }

    #[test]
    fn rotation_defaults_to_identity() {
        let t: StaticTransform = serde_json::from_str(
            r#"{"parent": "a", "child": "b", "translation": [1, 2, 3]}"#,
        )
        .unwrap();
        assert_eq!(t.rotation_rpy, [0.0; 3]);
        let buffer = transform_buffer(&[t]);
        let iso = buffer.lookup("a", "b").unwrap();
        assert_relative_eq!(iso * Point3::origin(), Point3::new(1.0, 2.0, 3.0));
    }
}
