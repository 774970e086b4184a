//! Configuration System using Figment
//!
//! Settings are loaded from:
//! 1. `config/default.toml` (or an explicit file)
//! 2. Environment variables prefixed with `SONAR_DAQ_` (nested keys split on `__`)
//!
//! Survey metadata is deliberately not part of the settings: it lives in the survey
//! configuration file and is carried around as an immutable [`crate::metadata::Metadata`].
//!
//! # Example
//! ```no_run
//! use sonar_daq::config::Settings;
//!
//! let settings = Settings::load()?;
//! println!("Resync every {} cycles", settings.acquisition.resync_interval);
//! # Ok::<(), sonar_daq::error::DaqError>(())
//! ```

use crate::error::{AppResult, DaqError};
use crate::validation::{is_in_range, is_valid_log_level};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Acquisition loop tuning
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
    /// Log file destination
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

/// Acquisition loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Number of cycles between probe resyncs when the probe is the sound-speed source
    #[serde(default = "default_resync_interval")]
    pub resync_interval: u32,
    /// GNSS frame read timeout in milliseconds
    #[serde(default = "default_gnss_timeout")]
    pub gnss_timeout_ms: u64,
    /// Sonar reply timeout in milliseconds
    #[serde(default = "default_sonar_timeout")]
    pub sonar_timeout_ms: u64,
    /// Probe reply timeout in milliseconds
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,
    /// Undecodable GNSS frames tolerated before one read gives up
    #[serde(default = "default_max_decode_attempts")]
    pub max_decode_attempts: u32,
    /// Lowest accepted manually entered sound speed (m/s)
    #[serde(default = "default_manual_min")]
    pub manual_sound_speed_min: f64,
    /// Highest accepted manually entered sound speed (m/s)
    #[serde(default = "default_manual_max")]
    pub manual_sound_speed_max: f64,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Output directory for raw and simplified logs
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

// Default value functions
fn default_name() -> String {
    "sonar-daq".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_resync_interval() -> u32 {
    100
}

fn default_gnss_timeout() -> u64 {
    1000
}

fn default_sonar_timeout() -> u64 {
    1000
}

fn default_probe_timeout() -> u64 {
    2500
}

fn default_max_decode_attempts() -> u32 {
    20
}

fn default_manual_min() -> f64 {
    1400.0
}

fn default_manual_max() -> f64 {
    1600.0
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("Output")
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            resync_interval: default_resync_interval(),
            gnss_timeout_ms: default_gnss_timeout(),
            sonar_timeout_ms: default_sonar_timeout(),
            probe_timeout_ms: default_probe_timeout(),
            max_decode_attempts: default_max_decode_attempts(),
            manual_sound_speed_min: default_manual_min(),
            manual_sound_speed_max: default_manual_max(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
        }
    }
}

impl AcquisitionConfig {
    /// GNSS read timeout as a [`Duration`]
    pub fn gnss_timeout(&self) -> Duration {
        Duration::from_millis(self.gnss_timeout_ms)
    }

    /// Sonar reply timeout as a [`Duration`]
    pub fn sonar_timeout(&self) -> Duration {
        Duration::from_millis(self.sonar_timeout_ms)
    }

    /// Probe reply timeout as a [`Duration`]
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

impl Settings {
    /// Load settings from `config/default.toml` and environment variables
    ///
    /// Environment variables override file values with prefix `SONAR_DAQ_`.
    /// Example: `SONAR_DAQ_ACQUISITION__RESYNC_INTERVAL=50`
    pub fn load() -> AppResult<Self> {
        Self::load_from("config/default.toml")
    }

    /// Load settings from a specific file path
    ///
    /// Missing keys (or a missing file) fall back to built-in defaults.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let settings: Settings = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("SONAR_DAQ_").split("__"))
            .extract()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate settings after loading
    pub fn validate(&self) -> AppResult<()> {
        is_valid_log_level(&self.application.log_level).map_err(|e| {
            DaqError::Configuration(format!("log_level '{}': {}", self.application.log_level, e))
        })?;

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.application.log_format.as_str()) {
            return Err(DaqError::Configuration(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                valid_formats.join(", ")
            )));
        }

        let acq = &self.acquisition;
        is_in_range(acq.resync_interval, 1..=u32::MAX)
            .map_err(|e| DaqError::Configuration(format!("resync_interval: {}", e)))?;
        is_in_range(acq.max_decode_attempts, 1..=u32::MAX)
            .map_err(|e| DaqError::Configuration(format!("max_decode_attempts: {}", e)))?;
        for (name, value) in [
            ("gnss_timeout_ms", acq.gnss_timeout_ms),
            ("sonar_timeout_ms", acq.sonar_timeout_ms),
            ("probe_timeout_ms", acq.probe_timeout_ms),
        ] {
            if value == 0 {
                return Err(DaqError::Configuration(format!("{} must be non-zero", name)));
            }
        }

        if !(acq.manual_sound_speed_min > 0.0
            && acq.manual_sound_speed_min < acq.manual_sound_speed_max)
        {
            return Err(DaqError::Configuration(format!(
                "Manual sound speed range {}..{} is not a valid interval",
                acq.manual_sound_speed_min, acq.manual_sound_speed_max
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.acquisition.resync_interval, 100);
        assert_eq!(settings.acquisition.gnss_timeout(), Duration::from_millis(1000));
    }

    #[test]
    fn file_values_override_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[acquisition]\nresync_interval = 10\nprobe_timeout_ms = 500\n\n[storage]\noutput_dir = \"logs\""
        )
        .unwrap();

        let settings = Settings::load_from(file.path()).unwrap();
        assert_eq!(settings.acquisition.resync_interval, 10);
        assert_eq!(settings.acquisition.probe_timeout_ms, 500);
        assert_eq!(settings.acquisition.sonar_timeout_ms, 1000);
        assert_eq!(settings.storage.output_dir, PathBuf::from("logs"));
    }

    #[test]
    fn invalid_log_level_rejected() {
        let mut settings = Settings::default();
        settings.application.log_level = "loud".into();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn inverted_manual_range_rejected() {
        let mut settings = Settings::default();
        settings.acquisition.manual_sound_speed_min = 1600.0;
        settings.acquisition.manual_sound_speed_max = 1400.0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn zero_timeout_rejected() {
        let mut settings = Settings::default();
        settings.acquisition.sonar_timeout_ms = 0;
        assert!(settings.validate().is_err());
    }
}
