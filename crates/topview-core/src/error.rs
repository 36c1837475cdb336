use std::fmt;

/// Why a geometric construction has no valid answer.
#[derive(Clone, Debug, PartialEq)]
pub enum DegenerateGeometry {
    /// A camera ray does not cross the ground plane.
    RayParallelToGround { corner: &'static str },
    /// Both bottom-corner rays land on the same ground point.
    CoincidentGroundPoints { distance: f64 },
    /// A point at or behind the camera center cannot be projected.
    PointBehindCamera { depth: f64 },
    /// Two correspondence points share a location.
    CoincidentPoints { first: usize, second: usize },
    /// Three correspondence points lie on one line.
    CollinearPoints { indices: [usize; 3] },
    /// NaN or infinity in the input.
    NonFinite,
    /// The 8x8 perspective system has no unique solution.
    SingularSystem,
}

impl fmt::Display for DegenerateGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RayParallelToGround { corner } => {
                write!(f, "{corner} ray is parallel to the ground plane")
            }
            Self::CoincidentGroundPoints { distance } => {
                write!(f, "bottom ground points coincide (distance={distance:e})")
            }
            Self::PointBehindCamera { depth } => {
                write!(f, "point lies behind the camera (depth={depth:.6})")
            }
            Self::CoincidentPoints { first, second } => {
                write!(f, "points {first} and {second} coincide")
            }
            Self::CollinearPoints { indices } => write!(
                f,
                "points {}, {} and {} are collinear",
                indices[0], indices[1], indices[2]
            ),
            Self::NonFinite => write!(f, "non-finite coordinate"),
            Self::SingularSystem => write!(f, "perspective system is singular"),
        }
    }
}

/// Errors raised by the calibration geometry.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("camera intrinsics have not been loaded")]
    NotInitialized,

    /// Lookup, connectivity or extrapolation failure. Callers retry.
    #[error("transform {source_frame} -> {target_frame} unavailable: {reason}")]
    TransformUnavailable {
        source_frame: String,
        target_frame: String,
        reason: String,
    },

    #[error("degenerate geometry: {0}")]
    GeometryDegenerate(DegenerateGeometry),
}

impl CalibrationError {
    /// True for failures that may clear up on a later attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransformUnavailable { .. })
    }
}

impl From<DegenerateGeometry> for CalibrationError {
    fn from(value: DegenerateGeometry) -> Self {
        Self::GeometryDegenerate(value)
    }
}
