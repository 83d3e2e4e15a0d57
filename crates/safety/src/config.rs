//! Monitor configuration, read from TOML with environment overrides.
//!
//! ```toml
//! [thresholds]
//! top_mm = 1500
//! left_mm = 1000
//! right_mm = 1000
//!
//! [detection]
//! min_valid_readings = 5
//! consensus_pct = 10.0
//!
//! [debounce]
//! consecutive_detections = 2
//! ```
//!
//! Every key is optional. Threshold overrides:
//!
//! | Variable | Field |
//! |---|---|
//! | `PRESENCE_GUARD_THRESHOLD_TOP` | `thresholds.top_mm` |
//! | `PRESENCE_GUARD_THRESHOLD_LEFT` | `thresholds.left_mm` |
//! | `PRESENCE_GUARD_THRESHOLD_RIGHT` | `thresholds.right_mm` |

use std::fs;
use std::path::{Path, PathBuf};

use detector::{DetectionParams, SensorId, Thresholds};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebounceParams {
    /// Detected cycles in a row before a sensor is trusted.
    pub consecutive_detections: u8,
}

impl Default for DebounceParams {
    fn default() -> Self {
        Self {
            consecutive_detections: 2,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub thresholds: Thresholds,
    pub detection: DetectionParams,
    pub debounce: DebounceParams,
}

impl MonitorConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let cfg: MonitorConfig = toml::from_str(raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load `path`, falling back to defaults when it does not exist, then
    /// apply environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut cfg = if path.exists() {
            let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            Self::from_toml_str(&raw)?
        } else {
            Self::default()
        };
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    /// Detection tuning must at least be self-consistent. Thresholds are not
    /// checked: any `u16` is a legal (if unwise) threshold.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let d = &self.detection;
        if d.min_range_mm > d.max_range_mm {
            return Err(ConfigError::Invalid(format!(
                "min_range_mm ({}) is above max_range_mm ({})",
                d.min_range_mm, d.max_range_mm
            )));
        }
        for (name, pct) in [
            ("consensus_pct", d.consensus_pct),
            ("high_confidence_pct", d.high_confidence_pct),
        ] {
            if !(0.0..=100.0).contains(&pct) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be within 0..=100, got {pct}"
                )));
            }
        }
        if self.debounce.consecutive_detections == 0 {
            return Err(ConfigError::Invalid(
                "consecutive_detections must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Override thresholds from `lookup`. Unparsable values are ignored.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        for sensor in SensorId::ALL {
            let key = format!("PRESENCE_GUARD_THRESHOLD_{sensor}");
            if let Some(mm) = lookup(&key).and_then(|v| v.trim().parse::<u16>().ok()) {
                self.thresholds.set(sensor, mm);
            }
        }
    }
}
