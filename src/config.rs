//! # Pause / Filament-Change Configuration
//!
//! All tunables of the pause controller live in one TOML document. Every field has a
//! default that matches stock firmware behaviour, so an empty file is a valid config.
//!
//! ## Example: TOML Configuration
//!
//! ```toml
//! [pause]
//! retract_length = 2.0
//! nozzle_timeout_secs = 45
//! park_points = [{ x = 10.0, y = 190.0, z = 20.0 }]
//!
//! [filament]
//! purge_length = 50.0
//! settings = [{ load_length = 90.0, unload_length = 100.0 }]
//!
//! [runout]
//! script = "M600"
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::machine::XyzPos;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Root configuration for the pause controller.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PauseConfig {
    #[serde(default)]
    pub pause: ParkConfig,
    #[serde(default)]
    pub filament: FilamentConfig,
    #[serde(default)]
    pub thermal: ThermalConfig,
    #[serde(default)]
    pub runout: RunoutConfig,
}

/// Parking, retraction and resume behaviour.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ParkConfig {
    #[serde(default = "default_retract_length")]
    pub retract_length: f64,
    #[serde(default = "default_retract_feedrate")]
    pub retract_feedrate: f64,
    #[serde(default = "default_nozzle_timeout_secs")]
    pub nozzle_timeout_secs: u64,
    #[serde(default = "default_park_xy_feedrate")]
    pub park_xy_feedrate: f64,
    #[serde(default = "default_park_z_feedrate")]
    pub park_z_feedrate: f64,
    #[serde(default)]
    pub resume_prime: f64,
    #[serde(default = "default_true")]
    pub pause_fans: bool,
    #[serde(default = "default_park_points")]
    pub park_points: Vec<XyzPos>,
    #[serde(default = "default_power_loss_zraise")]
    pub power_loss_zraise: f64,
    #[serde(default = "default_z_max")]
    pub z_max: f64,
}

impl Default for ParkConfig {
    fn default() -> Self {
        Self {
            retract_length: default_retract_length(),
            retract_feedrate: default_retract_feedrate(),
            nozzle_timeout_secs: default_nozzle_timeout_secs(),
            park_xy_feedrate: default_park_xy_feedrate(),
            park_z_feedrate: default_park_z_feedrate(),
            resume_prime: 0.0,
            pause_fans: true,
            park_points: default_park_points(),
            power_loss_zraise: default_power_loss_zraise(),
            z_max: default_z_max(),
        }
    }
}

impl ParkConfig {
    /// Park point for an extruder; extruders past the configured list share the last one.
    pub fn park_point(&self, extruder: usize) -> XyzPos {
        self.park_points
            .get(extruder)
            .or_else(|| self.park_points.last())
            .copied()
            .unwrap_or_default()
    }
}

/// Per-extruder load/unload travel, owned by persistent settings storage.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct FilamentChangeSettings {
    #[serde(default)]
    pub load_length: f64,
    #[serde(default = "default_unload_length")]
    pub unload_length: f64,
}

impl Default for FilamentChangeSettings {
    fn default() -> Self {
        Self {
            load_length: 0.0,
            unload_length: default_unload_length(),
        }
    }
}

/// Load/unload sequencing parameters.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FilamentConfig {
    #[serde(default)]
    pub slow_load_length: f64,
    #[serde(default = "default_load_feedrate")]
    pub slow_load_feedrate: f64,
    #[serde(default = "default_load_feedrate")]
    pub fast_load_feedrate: f64,
    #[serde(default = "default_purge_length")]
    pub purge_length: f64,
    #[serde(default = "default_purge_feedrate")]
    pub purge_feedrate: f64,
    #[serde(default = "default_unload_feedrate")]
    pub unload_feedrate: f64,
    /// Retract acceleration used for the main unload move; 0 keeps the planner value.
    #[serde(default = "default_unload_accel")]
    pub unload_accel: f64,
    #[serde(default = "default_unload_purge_retract")]
    pub unload_purge_retract: f64,
    #[serde(default = "default_unload_purge_delay_ms")]
    pub unload_purge_delay_ms: u64,
    #[serde(default = "default_unload_purge_length")]
    pub unload_purge_length: f64,
    #[serde(default = "default_unload_purge_feedrate")]
    pub unload_purge_feedrate: f64,
    #[serde(default = "default_alert_beeps")]
    pub alert_beeps: i8,
    #[serde(default = "default_filament_settings")]
    pub settings: Vec<FilamentChangeSettings>,
}

impl Default for FilamentConfig {
    fn default() -> Self {
        Self {
            slow_load_length: 0.0,
            slow_load_feedrate: default_load_feedrate(),
            fast_load_feedrate: default_load_feedrate(),
            purge_length: default_purge_length(),
            purge_feedrate: default_purge_feedrate(),
            unload_feedrate: default_unload_feedrate(),
            unload_accel: default_unload_accel(),
            unload_purge_retract: default_unload_purge_retract(),
            unload_purge_delay_ms: default_unload_purge_delay_ms(),
            unload_purge_length: default_unload_purge_length(),
            unload_purge_feedrate: default_unload_purge_feedrate(),
            alert_beeps: default_alert_beeps(),
            settings: default_filament_settings(),
        }
    }
}

impl FilamentConfig {
    pub fn settings_for(&self, extruder: usize) -> FilamentChangeSettings {
        self.settings.get(extruder).copied().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ThermalConfig {
    #[serde(default = "default_min_extrude_temp")]
    pub min_extrude_temp: f64,
    #[serde(default = "default_heatup_timeout_secs")]
    pub heatup_timeout_secs: u64,
}

impl Default for ThermalConfig {
    fn default() -> Self {
        Self {
            min_extrude_temp: default_min_extrude_temp(),
            heatup_timeout_secs: default_heatup_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunoutConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_runout_script")]
    pub script: String,
    /// Consecutive "absent" sensor readings required before a runout fires.
    #[serde(default = "default_debounce_threshold")]
    pub debounce_threshold: u32,
    #[serde(default)]
    pub multi_sensor: bool,
}

impl Default for RunoutConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            script: default_runout_script(),
            debounce_threshold: default_debounce_threshold(),
            multi_sensor: false,
        }
    }
}

impl PauseConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let feedrates = [
            ("pause.retract_feedrate", self.pause.retract_feedrate),
            ("pause.park_xy_feedrate", self.pause.park_xy_feedrate),
            ("pause.park_z_feedrate", self.pause.park_z_feedrate),
            ("filament.slow_load_feedrate", self.filament.slow_load_feedrate),
            ("filament.fast_load_feedrate", self.filament.fast_load_feedrate),
            ("filament.purge_feedrate", self.filament.purge_feedrate),
            ("filament.unload_feedrate", self.filament.unload_feedrate),
            ("filament.unload_purge_feedrate", self.filament.unload_purge_feedrate),
        ];
        for (name, value) in feedrates {
            if value <= 0.0 {
                return Err(ConfigError::Invalid(format!("{} must be > 0", name)));
            }
        }
        if self.filament.unload_accel < 0.0 {
            return Err(ConfigError::Invalid("filament.unload_accel must be >= 0".to_string()));
        }
        if self.pause.nozzle_timeout_secs == 0 {
            return Err(ConfigError::Invalid("pause.nozzle_timeout_secs must be > 0".to_string()));
        }
        if self.pause.park_points.is_empty() {
            return Err(ConfigError::Invalid("pause.park_points needs at least one entry".to_string()));
        }
        if self.runout.debounce_threshold == 0 {
            return Err(ConfigError::Invalid("runout.debounce_threshold must be > 0".to_string()));
        }
        Ok(())
    }
}

/// Load and validate a configuration file.
pub fn load_config(path: &str) -> Result<PauseConfig, ConfigError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            tracing::error!("Failed to read config file '{}': {}", path, e);
            return Err(ConfigError::Io(e));
        }
    };
    let config: PauseConfig = match toml::from_str(&contents) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to parse config TOML: {}", e);
            return Err(ConfigError::Toml(e));
        }
    };
    config.validate()?;
    Ok(config)
}

// Default value functions
fn default_true() -> bool { true }
fn default_retract_length() -> f64 { 2.0 }
fn default_retract_feedrate() -> f64 { 60.0 }
fn default_nozzle_timeout_secs() -> u64 { 45 }
fn default_park_xy_feedrate() -> f64 { 100.0 }
fn default_park_z_feedrate() -> f64 { 5.0 }
fn default_park_points() -> Vec<XyzPos> {
    vec![XyzPos::new(10.0, 190.0, 20.0), XyzPos::new(300.0, 190.0, 20.0)]
}
fn default_power_loss_zraise() -> f64 { 2.0 }
fn default_z_max() -> f64 { 300.0 }
fn default_unload_length() -> f64 { 100.0 }
fn default_load_feedrate() -> f64 { 6.0 }
fn default_purge_length() -> f64 { 50.0 }
fn default_purge_feedrate() -> f64 { 3.0 }
fn default_unload_feedrate() -> f64 { 10.0 }
fn default_unload_accel() -> f64 { 25.0 }
fn default_unload_purge_retract() -> f64 { 13.0 }
fn default_unload_purge_delay_ms() -> u64 { 5000 }
fn default_unload_purge_length() -> f64 { 8.0 }
fn default_unload_purge_feedrate() -> f64 { 25.0 }
fn default_alert_beeps() -> i8 { 10 }
fn default_filament_settings() -> Vec<FilamentChangeSettings> {
    vec![FilamentChangeSettings::default(); 2]
}
fn default_min_extrude_temp() -> f64 { 170.0 }
fn default_heatup_timeout_secs() -> u64 { 600 }
fn default_runout_script() -> String { "M600".to_string() }
fn default_debounce_threshold() -> u32 { 5 }

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_default_values() {
        let config = PauseConfig::default();
        assert_eq!(config.pause.retract_length, 2.0);
        assert_eq!(config.pause.retract_feedrate, 60.0);
        assert_eq!(config.pause.nozzle_timeout_secs, 45);
        assert_eq!(config.filament.purge_length, 50.0);
        assert_eq!(config.filament.unload_purge_retract, 13.0);
        assert_eq!(config.thermal.min_extrude_temp, 170.0);
        assert_eq!(config.runout.script, "M600");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: PauseConfig = toml::from_str("").unwrap();
        assert_eq!(config.filament.unload_feedrate, 10.0);
        assert_eq!(config.pause.park_points.len(), 2);
        assert_eq!(config.filament.settings_for(0).unload_length, 100.0);
    }

    #[test]
    fn test_load_config_success() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("pause.toml");
        let mut file = File::create(&file_path).unwrap();
        writeln!(
            file,
            "[pause]\nretract_length = 4.5\npark_points = [{{ x = 1.0, y = 2.0, z = 3.0 }}]\n\n[runout]\nscript = \"M25\""
        )
        .unwrap();
        file.flush().unwrap();
        let config = load_config(file_path.to_str().unwrap()).unwrap();
        assert_eq!(config.pause.retract_length, 4.5);
        assert_eq!(config.pause.park_point(0), XyzPos::new(1.0, 2.0, 3.0));
        // Extruders past the list fall back to the last park point
        assert_eq!(config.pause.park_point(3), XyzPos::new(1.0, 2.0, 3.0));
        assert_eq!(config.runout.script, "M25");
        assert_eq!(config.filament.purge_length, 50.0);
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("nonexistent_pause_config.toml");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("bad.toml");
        let mut file = File::create(&file_path).unwrap();
        writeln!(file, "not a valid toml").unwrap();
        file.flush().unwrap();
        let result = load_config(file_path.to_str().unwrap());
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = PauseConfig::default();
        config.filament.unload_feedrate = 0.0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = PauseConfig::default();
        config.pause.park_points.clear();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = PauseConfig::default();
        config.runout.debounce_threshold = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
