// config.rs

// Typed configuration for the navigation core, loaded from a YAML file via
// `serde_yaml::from_reader`. Every key in the external-interface
// configuration table gets a field and a literal default.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;

/// Escape strategy selector (`escape_strategy` config key).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscapeStrategy {
    SimpleBackup,
    AlignedBackup,
}

/// All recognized configuration options, with the defaults from the
/// external interface table.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct NavConfig {
    pub rate: f64,
    pub normal_speed: f64,
    pub min_speed: f64,
    pub max_turning: f64,

    pub throttle_neutral: i32,
    pub throttle_reverse_min: i32,
    pub throttle_reverse_max: i32,
    pub throttle_fwd_min: i32,
    pub throttle_fwd_max: i32,

    pub steering_neutral: i32,
    pub steering_left_max: i32,
    pub steering_right_max: i32,

    pub cone_normal_min_area: f64,
    pub cone_recovery_min_area: f64,
    pub cone_close_distance: f64,
    pub cone_approach_use_throttle: bool,
    pub cone_approach_k_speed: f64,
    pub cone_approach_k_turning: f64,
    pub cone_timeout_seconds: f64,

    pub escape_strategy: EscapeStrategy,
    pub escape_backup_duration: f64,
    pub escape_k_speed: f64,
    pub escape_k_turning: f64,
    pub escape_min_speed: f64,
    pub escape_angle_tolerance: f64,

    pub direction_change_reverse_speed: f64,
    pub direction_change_reverse_duration: f64,
    pub direction_change_idle_duration: f64,

    pub circling_relative_speed: f64,
    pub circling_angle_tolerance: f64,

    #[serde(rename = "horz_fov")]
    pub horz_fov_deg: f64,
    pub horz_pixels: u32,

    pub cone_lost_limit: u32,

    /// When present, written to the autopilot as the `SYSID_MYGCS`
    /// parameter.
    pub gcs_id: Option<i64>,
}

impl Default for NavConfig {
    fn default() -> Self {
        NavConfig {
            rate: 10.0,
            normal_speed: 2.0,
            min_speed: 0.1,
            max_turning: 5.0,

            throttle_neutral: 1500,
            throttle_reverse_min: 1500,
            throttle_reverse_max: 1000,
            throttle_fwd_min: 1500,
            throttle_fwd_max: 2000,

            steering_neutral: 1500,
            steering_left_max: 1000,
            steering_right_max: 2000,

            cone_normal_min_area: 100.0,
            cone_recovery_min_area: 400.0,
            cone_close_distance: 2.0,
            cone_approach_use_throttle: false,
            cone_approach_k_speed: 0.25,
            cone_approach_k_turning: 0.5,
            cone_timeout_seconds: 60.0,

            escape_strategy: EscapeStrategy::SimpleBackup,
            escape_backup_duration: 1.0,
            escape_k_speed: 2.0,
            escape_k_turning: 2.0,
            escape_min_speed: 0.7,
            escape_angle_tolerance: 0.15,

            direction_change_reverse_speed: -1.0,
            direction_change_reverse_duration: 1.5,
            direction_change_idle_duration: 1.0,

            circling_relative_speed: 1.5,
            circling_angle_tolerance: 0.15,

            horz_fov_deg: 70.0,
            horz_pixels: 640,

            cone_lost_limit: 15,

            gcs_id: None,
        }
    }
}

impl NavConfig {
    /// Loads configuration from a YAML file, falling back to defaults for
    /// any field the file omits.
    pub fn load_yaml<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let file = File::open(path.as_ref())
            .map_err(|e| ConfigError::Io(path.as_ref().display().to_string(), e.to_string()))?;
        serde_yaml::from_reader(file).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn horz_fov_rad(&self) -> f64 {
        self.horz_fov_deg.to_radians()
    }
}

/// Configuration error types.
#[derive(Debug)]
pub enum ConfigError {
    Io(String, String),
    Parse(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, msg) => write!(f, "failed to open config {}: {}", path, msg),
            ConfigError::Parse(msg) => write!(f, "failed to parse config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_external_interface_table() {
        let cfg = NavConfig::default();
        assert_eq!(cfg.rate, 10.0);
        assert_eq!(cfg.throttle_fwd_max, 2000);
        assert_eq!(cfg.escape_strategy, EscapeStrategy::SimpleBackup);
        assert_eq!(cfg.cone_lost_limit, 15);
        assert!(cfg.gcs_id.is_none());
    }

    #[test]
    fn partial_yaml_falls_back_to_defaults() {
        let yaml = "normal_speed: 3.5\ncone_lost_limit: 20\n";
        let cfg: NavConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.normal_speed, 3.5);
        assert_eq!(cfg.cone_lost_limit, 20);
        assert_eq!(cfg.min_speed, NavConfig::default().min_speed);
    }

    #[test]
    fn unknown_key_is_rejected() {
        let yaml = "not_a_real_key: 1\n";
        assert!(serde_yaml::from_str::<NavConfig>(yaml).is_err());
    }
}
