//! Run configuration.
//!
//! Every knob has a default matching the reference study, so an empty TOML
//! file (or no file at all) reproduces it. Command-line flags are applied on
//! top of the loaded file before validation.

use crate::calibration::{CalibrationError, CalibrationTable};
use crate::interval::IntervalMethod;
use crate::risk::{DEFAULT_BMI_DECAY_RATE, EnabledTerms, RiskModel};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_PATIENTS: usize = 1_000_000;
pub const DEFAULT_TRIALS: usize = 2_500;
pub const DEFAULT_SEED: u64 = 67;
pub const DEFAULT_MEAN_BMI: f64 = 27.0;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse TOML configuration: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize configuration to TOML format: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error("The cohort size must be at least 1 patient.")]
    EmptyCohort,
    #[error(
        "The number of bootstrap trials must be at least {required} for the '{method}' interval method, found {found}."
    )]
    TooFewTrials {
        method: &'static str,
        required: usize,
        found: usize,
    },
    #[error("The number of bootstrap partitions must be at least 1.")]
    NoPartitions,
    #[error("Configuration value '{field}' must be finite, found {value}.")]
    NonFinite { field: &'static str, value: f64 },
    #[error("At least one risk term must be enabled.")]
    NoRiskTerms,
    #[error("Invalid calibration table: {0}")]
    Calibration(#[from] CalibrationError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Cohort size for synthetic generation. Ignored when a cohort is loaded.
    pub patients: usize,
    /// BMI mean for patients under 25 during generation.
    pub mean_bmi: f64,
    /// Decay of the BMI odds ratio per year of age past 15.
    pub bmi_decay_rate: f64,
    pub trials: usize,
    pub seed: u64,
    pub interval: IntervalMethod,
    /// 1 runs the bootstrap sequentially on the seeded stream. Larger values
    /// split trials across independently seeded streams on the rayon pool.
    pub partitions: usize,
    pub enabled_terms: EnabledTerms,
    pub calibration: CalibrationTable,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            patients: DEFAULT_PATIENTS,
            mean_bmi: DEFAULT_MEAN_BMI,
            bmi_decay_rate: DEFAULT_BMI_DECAY_RATE,
            trials: DEFAULT_TRIALS,
            seed: DEFAULT_SEED,
            interval: IntervalMethod::default(),
            partitions: 1,
            enabled_terms: EnabledTerms::all(),
            calibration: CalibrationTable::default(),
        }
    }
}

impl SimulationConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let toml_string = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&toml_string)
    }

    pub fn from_toml_str(toml_string: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_string)?)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Checks everything a full run depends on except the cohort size, which
    /// only matters when generating (see [`SimulationConfig::validate_generation`]).
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_model()?;
        self.validate_bootstrap()
    }

    /// Risk model and calibration settings, shared by generation and analysis.
    pub fn validate_model(&self) -> Result<(), ConfigError> {
        if !self.bmi_decay_rate.is_finite() {
            return Err(ConfigError::NonFinite {
                field: "bmi_decay_rate",
                value: self.bmi_decay_rate,
            });
        }
        if self.enabled_terms.iter().next().is_none() {
            return Err(ConfigError::NoRiskTerms);
        }
        self.calibration.validate()?;
        Ok(())
    }

    pub fn validate_bootstrap(&self) -> Result<(), ConfigError> {
        let estimator = self.interval.estimator();
        if self.trials < estimator.min_trials() {
            return Err(ConfigError::TooFewTrials {
                method: estimator.name(),
                required: estimator.min_trials(),
                found: self.trials,
            });
        }
        if self.partitions == 0 {
            return Err(ConfigError::NoPartitions);
        }
        Ok(())
    }

    pub fn validate_generation(&self) -> Result<(), ConfigError> {
        if self.patients == 0 {
            return Err(ConfigError::EmptyCohort);
        }
        if !self.mean_bmi.is_finite() {
            return Err(ConfigError::NonFinite {
                field: "mean_bmi",
                value: self.mean_bmi,
            });
        }
        Ok(())
    }

    pub fn risk_model(&self) -> RiskModel {
        RiskModel::new(self.bmi_decay_rate, self.enabled_terms.clone())
    }
}
