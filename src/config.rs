//! Run configuration loaded with Figment.
//!
//! Values come from a TOML file, then from environment variables prefixed
//! with `RUSTSURVEY_`. Nested keys are separated by a double underscore:
//!
//! ```text
//! RUSTSURVEY_LOG_LEVEL=debug
//! RUSTSURVEY_INSTRUMENT__PORT=/dev/ttyUSB1
//! RUSTSURVEY_TRACKING__MODE=5
//! ```
//!
//! Every section has defaults, so an empty file is a valid configuration.

use crate::angle::{Angle, AngleUnit};
use crate::error::SurveyError;
use crate::error_recovery::RetryPolicy;
use crate::instrument::InstrumentModel;
use crate::procedures::{SectionSettings, TrackingMode, TrackingSettings};
use crate::writer::WriterOptions;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration load error: {0}")]
    LoadError(#[from] Box<figment::Error>),
    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for SurveyError {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::ValidationError(msg) => SurveyError::Configuration(msg),
            other => SurveyError::Configuration(other.to_string()),
        }
    }
}

/// Top-level settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub instrument: InstrumentConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub horizontal_section: SectionConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
}

/// Instrument and port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentConfig {
    #[serde(default = "default_model")]
    pub model: InstrumentModel,
    /// Serial device, or a file of recorded replies
    #[serde(default = "default_port")]
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Read timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_edm_mode")]
    pub edm_mode: String,
}

/// Polling of results that are not ready on the first read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay between attempts in milliseconds
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

/// Where and how records are written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// CSV file to append to; stdout when unset
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_angle_unit")]
    pub angle_unit: AngleUnit,
    #[serde(default = "default_decimals")]
    pub decimals: usize,
    #[serde(default = "default_separator")]
    pub separator: char,
    /// Fields to keep, in output order
    #[serde(default)]
    pub filter: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionConfig {
    #[serde(default = "default_step_deg")]
    pub step_deg: f64,
    #[serde(default = "default_max_angle_deg")]
    pub max_angle_deg: f64,
    /// Accepted distance from the plane [m]
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Plane height [m]; taken from the first point when unset
    #[serde(default)]
    pub elevation: Option<f64>,
    #[serde(default)]
    pub start_hz_deg: Option<f64>,
    /// EDM mode for the scan
    #[serde(default = "default_section_edm_mode")]
    pub edm_mode: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingConfig {
    #[serde(default = "default_tracking_mode")]
    pub mode: u8,
    /// Stop detector threshold, DMS literal
    #[serde(default = "default_limit")]
    pub limit: String,
    #[serde(default = "default_stable_cycles")]
    pub stable_cycles: u32,
    #[serde(default)]
    pub max_cycles: Option<u64>,
}

// ============================================================================
// Default value functions
// ============================================================================

fn default_log_level() -> String {
    "info".to_string()
}

fn default_model() -> InstrumentModel {
    InstrumentModel::Tps1200
}

fn default_port() -> String {
    "/dev/ttyUSB0".to_string()
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_timeout_ms() -> u64 {
    15000
}

fn default_edm_mode() -> String {
    "FAST".to_string()
}

fn default_section_edm_mode() -> String {
    "RLSTANDARD".to_string()
}

fn default_max_attempts() -> u32 {
    20
}

fn default_delay_ms() -> u64 {
    2000
}

fn default_angle_unit() -> AngleUnit {
    AngleUnit::Gon
}

fn default_decimals() -> usize {
    3
}

fn default_separator() -> char {
    ';'
}

fn default_step_deg() -> f64 {
    45.0
}

fn default_max_angle_deg() -> f64 {
    360.0
}

fn default_tolerance() -> f64 {
    0.01
}

fn default_max_iterations() -> u32 {
    10
}

fn default_tracking_mode() -> u8 {
    4
}

fn default_limit() -> String {
    "0-03-00".to_string()
}

fn default_stable_cycles() -> u32 {
    3
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            port: default_port(),
            baud_rate: default_baud_rate(),
            timeout_ms: default_timeout_ms(),
            edm_mode: default_edm_mode(),
        }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_delay_ms(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: None,
            angle_unit: default_angle_unit(),
            decimals: default_decimals(),
            separator: default_separator(),
            filter: None,
        }
    }
}

impl Default for SectionConfig {
    fn default() -> Self {
        Self {
            step_deg: default_step_deg(),
            max_angle_deg: default_max_angle_deg(),
            tolerance: default_tolerance(),
            max_iterations: default_max_iterations(),
            elevation: None,
            start_hz_deg: None,
            edm_mode: default_section_edm_mode(),
        }
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            mode: default_tracking_mode(),
            limit: default_limit(),
            stable_cycles: default_stable_cycles(),
            max_cycles: None,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            instrument: InstrumentConfig::default(),
            poll: PollConfig::default(),
            output: OutputConfig::default(),
            horizontal_section: SectionConfig::default(),
            tracking: TrackingConfig::default(),
        }
    }
}

// ============================================================================
// Loading and validation
// ============================================================================

impl Settings {
    /// Load from `path` (if it exists) and the environment, then validate.
    ///
    /// # Errors
    ///
    /// Returns a ConfigError if the sources cannot be merged or a value is
    /// out of range.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings: Self = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("RUSTSURVEY_").split("__"))
            .extract()
            .map_err(|e| ConfigError::LoadError(Box::new(e)))?;

        settings.validate()?;
        Ok(settings)
    }

    /// Environment and defaults only.
    pub fn load_env() -> Result<Self, ConfigError> {
        let settings: Self = Figment::new()
            .merge(Env::prefixed("RUSTSURVEY_").split("__"))
            .extract()
            .map_err(|e| ConfigError::LoadError(Box::new(e)))?;

        settings.validate()?;
        Ok(settings)
    }

    /// Check value ranges.
    ///
    /// An EDM mode name the selected model does not know is not an error:
    /// it is reported and FAST is used instead.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.poll.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "poll.max_attempts must be at least 1".to_string(),
            ));
        }

        let section = &self.horizontal_section;
        if section.step_deg <= 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "Invalid horizontal_section.step_deg {}. Must be positive",
                section.step_deg
            )));
        }
        if section.max_angle_deg <= 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "Invalid horizontal_section.max_angle_deg {}. Must be positive",
                section.max_angle_deg
            )));
        }
        if section.tolerance <= 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "Invalid horizontal_section.tolerance {}. Must be positive",
                section.tolerance
            )));
        }
        if section.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "horizontal_section.max_iterations must be at least 1".to_string(),
            ));
        }

        TrackingMode::try_from(self.tracking.mode).map_err(ConfigError::ValidationError)?;
        self.tracking_limit()?;

        let unit = self.instrument.model.build();
        if unit.edm_mode(&self.instrument.edm_mode).is_none() {
            warn!(
                "EDM mode '{}' unknown to {}, FAST will be used",
                self.instrument.edm_mode,
                unit.name()
            );
        }
        Ok(())
    }

    fn tracking_limit(&self) -> Result<Angle, ConfigError> {
        Angle::parse(&self.tracking.limit, AngleUnit::Dms).map_err(|e| {
            ConfigError::ValidationError(format!("Invalid tracking.limit: {e}"))
        })
    }

    pub fn poll_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.poll.max_attempts,
            Duration::from_millis(self.poll.delay_ms),
        )
    }

    pub fn writer_options(&self) -> WriterOptions {
        WriterOptions {
            angle_unit: self.output.angle_unit,
            decimals: self.output.decimals,
            separator: self.output.separator,
            filter: self.output.filter.clone(),
            ..Default::default()
        }
    }

    pub fn section_settings(&self) -> SectionSettings {
        let section = &self.horizontal_section;
        SectionSettings {
            step: Angle::from_deg(section.step_deg),
            max_angle: Angle::from_deg(section.max_angle_deg),
            tolerance: section.tolerance,
            max_iterations: section.max_iterations,
            elevation: section.elevation,
            start_hz: section.start_hz_deg.map(Angle::from_deg),
            edm_mode: section.edm_mode.clone(),
        }
    }

    pub fn tracking_settings(&self) -> Result<TrackingSettings, ConfigError> {
        Ok(TrackingSettings {
            mode: TrackingMode::try_from(self.tracking.mode)
                .map_err(ConfigError::ValidationError)?,
            edm_mode: self.instrument.edm_mode.clone(),
            limit: self.tracking_limit()?,
            stable_cycles: self.tracking.stable_cycles,
            max_cycles: self.tracking.max_cycles,
        })
    }
}
