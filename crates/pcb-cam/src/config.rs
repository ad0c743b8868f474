use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CamError;

/// Machine parameters for G-code generation. Distances in mm, feeds in mm/min.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CamConfig {
    /// Cutting feed for isolation strokes
    pub feedrate: f64,
    /// Z feed when engaging the tool
    pub plunge_feedrate: f64,
    /// Nominal tool width, reported in comments
    pub tool_width: f64,
    /// Laser power / spindle `S` word for Gerber jobs
    pub power: u32,
    pub safe_z: f64,
    pub cut_z: f64,
    pub change_z: f64,
    pub drill_z: f64,
    pub drill_feedrate: f64,
    pub spindle_speed: u32,
}

impl Default for CamConfig {
    fn default() -> Self {
        Self {
            feedrate: 300.0,
            plunge_feedrate: 100.0,
            tool_width: 0.2,
            power: 10,
            safe_z: 1.0,
            cut_z: -0.1,
            change_z: 15.0,
            drill_z: -3.0,
            drill_feedrate: 20.0,
            spindle_speed: 10000,
        }
    }
}

impl CamConfig {
    /// Load a JSON config; missing fields keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, CamError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, CamError> {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = CamConfig::default();
        assert_eq!(cfg.feedrate, 300.0);
        assert_eq!(cfg.change_z, 15.0);
        assert_eq!(cfg.drill_z, -3.0);
        assert_eq!(cfg.drill_feedrate, 20.0);
        assert_eq!(cfg.spindle_speed, 10000);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let cfg = CamConfig::from_json_str(r#"{"safe_z": 2.5, "power": 80}"#).unwrap();
        assert_eq!(cfg.safe_z, 2.5);
        assert_eq!(cfg.power, 80);
        assert_eq!(cfg.feedrate, 300.0);
    }

    #[test]
    fn test_bad_json() {
        let err = CamConfig::from_json_str("{not json").unwrap_err();
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_round_trip_through_json() {
        let cfg = CamConfig::default();
        let text = serde_json::to_string(&cfg).unwrap();
        assert_eq!(CamConfig::from_json_str(&text).unwrap(), cfg);
    }
}
