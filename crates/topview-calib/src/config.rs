use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Errors raised while loading the startup configuration. All are fatal.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("required configuration key `{0}` is missing")]
    Missing(&'static str),

    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

const DEFAULT_TICK_PERIOD_MS: u64 = 100;
const DEFAULT_TRANSFORM_TIMEOUT_MS: u64 = 50;

fn default_tick_period_ms() -> u64 {
    DEFAULT_TICK_PERIOD_MS
}

fn default_transform_timeout_ms() -> u64 {
    DEFAULT_TRANSFORM_TIMEOUT_MS
}

/// Startup configuration of the calibrator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawConfig")]
pub struct CalibrationConfig {
    /// Frame the camera intrinsics are expressed in (optical frame).
    pub camera_frame: String,
    /// Reference frame: +x forward, +y left, +z up.
    pub base_frame: String,
    /// How far ahead of the bottom image edge the top view reaches, meters.
    /// Negative values flip the travel direction.
    pub distance_ahead: f64,
    /// Lane width in meters; the image width is scaled onto it.
    pub lane_width: f64,
    /// Channel the camera intrinsics arrive on.
    pub camera_info_topic: String,
    /// Channel the warp matrices are published on.
    pub matrix_topic: String,
    /// Poll period of the calibration loop.
    pub tick_period_ms: u64,
    /// Upper bound on a single transform lookup.
    pub transform_timeout_ms: u64,
}

/// Wire shape: every key optional so absent keys can be named in the error.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    camera_frame: Option<String>,
    base_frame: Option<String>,
    distance_ahead: Option<f64>,
    lane_width: Option<f64>,
    camera_info_topic: Option<String>,
    matrix_topic: Option<String>,
    #[serde(default = "default_tick_period_ms")]
    tick_period_ms: u64,
    #[serde(default = "default_transform_timeout_ms")]
    transform_timeout_ms: u64,
}

fn required<T>(value: Option<T>, key: &'static str) -> Result<T, ConfigError> {
    value.ok_or(ConfigError::Missing(key))
}

fn non_empty(value: String, key: &'static str) -> Result<String, ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Invalid {
            field: key,
            reason: "must not be empty".to_string(),
        });
    }
    Ok(value)
}

impl TryFrom<RawConfig> for CalibrationConfig {
    type Error = ConfigError;

    fn try_from(raw: RawConfig) -> Result<Self, Self::Error> {
        let cfg = Self {
            camera_frame: non_empty(required(raw.camera_frame, "camera_frame")?, "camera_frame")?,
            base_frame: non_empty(required(raw.base_frame, "base_frame")?, "base_frame")?,
            distance_ahead: required(raw.distance_ahead, "distance_ahead")?,
            lane_width: required(raw.lane_width, "lane_width")?,
            camera_info_topic: non_empty(
                required(raw.camera_info_topic, "camera_info_topic")?,
                "camera_info_topic",
            )?,
            matrix_topic: non_empty(required(raw.matrix_topic, "matrix_topic")?, "matrix_topic")?,
            tick_period_ms: raw.tick_period_ms,
            transform_timeout_ms: raw.transform_timeout_ms,
        };
        cfg.validate()?;
        Ok(cfg)
    }
}

impl CalibrationConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_json::from_str(raw)?;
        Self::try_from(raw)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.camera_frame == self.base_frame {
            return Err(ConfigError::Invalid {
                field: "base_frame",
                reason: "must differ from camera_frame".to_string(),
            });
        }
        if !self.distance_ahead.is_finite() || self.distance_ahead == 0.0 {
            return Err(ConfigError::Invalid {
                field: "distance_ahead",
                reason: format!("expected a finite non-zero value, got {}", self.distance_ahead),
            });
        }
        if !self.lane_width.is_finite() || self.lane_width <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "lane_width",
                reason: format!("expected a positive value, got {}", self.lane_width),
            });
        }
        if self.tick_period_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "tick_period_ms",
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }

    #[inline]
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms)
    }

    #[inline]
    pub fn transform_timeout(&self) -> Duration {
        Duration::from_millis(self.transform_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const FULL: &str = r#"{
        "camera_frame": "camera_optical",
        "base_frame": "base_link",
        "distance_ahead": 5.0,
        "lane_width": 3.0,
        "camera_info_topic": "/camera/camera_info",
        "matrix_topic": "/topview/matrices"
    }"#;

    fn without(key: &str) -> String {
        let mut value: serde_json::Value = serde_json::from_str(FULL).unwrap();
        value.as_object_mut().unwrap().remove(key);
        value.to_string()
    }

    #[test]
    fn parses_full_config_with_defaults() {
        let cfg = CalibrationConfig::from_json_str(FULL).unwrap();
        assert_eq!(cfg.camera_frame, "camera_optical");
        assert_eq!(cfg.distance_ahead, 5.0);
        assert_eq!(cfg.tick_period(), Duration::from_millis(100));
        assert_eq!(cfg.transform_timeout(), Duration::from_millis(50));
    }

    #[test]
    fn every_required_key_is_reported_by_name() {
        for key in [
            "camera_frame",
            "base_frame",
            "distance_ahead",
            "lane_width",
            "camera_info_topic",
            "matrix_topic",
        ] {
            match CalibrationConfig::from_json_str(&without(key)) {
                Err(ConfigError::Missing(missing)) => assert_eq!(missing, key),
                other => panic!("expected Missing({key}), got {other:?}"),
            }
        }
    }

    #[test]
    fn negative_look_ahead_is_allowed() {
        let raw = FULL.replace("5.0", "-5.0");
        let cfg = CalibrationConfig::from_json_str(&raw).unwrap();
        assert_eq!(cfg.distance_ahead, -5.0);
    }

    #[test]
    fn rejects_non_positive_lane_width() {
        let raw = FULL.replace("3.0", "0.0");
        assert!(matches!(
            CalibrationConfig::from_json_str(&raw),
            Err(ConfigError::Invalid {
                field: "lane_width",
                ..
            })
        ));
    }

    #[test]
    fn rejects_unknown_keys() {
        let raw = FULL.replace("\"lane_width\"", "\"lane_widht\": 1.0, \"lane_width\"");
        assert!(matches!(
            CalibrationConfig::from_json_str(&raw),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FULL.as_bytes()).unwrap();
        let cfg = CalibrationConfig::from_path(file.path()).unwrap();
        assert_eq!(cfg.matrix_topic, "/topview/matrices");
    }

    #[test]
    fn missing_file_is_io_error() {
        assert!(matches!(
            CalibrationConfig::from_path("/nonexistent/topview.json"),
            Err(ConfigError::Io(_))
        ));
    }
}
