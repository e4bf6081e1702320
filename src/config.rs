use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::artifacts::{ArtifactStore, SampleSource};
use crate::compensator::{CompensationKey, CompensationOptions, Compensator};
use crate::deskewer::Deskewer;
use crate::error::ConfigurationError;
use crate::taxonomy::Taxonomy;
use crate::units::Unit;
use crate::Result;

/// Default confidence threshold a class call must reach to be counted
pub const CONFIDENCE_THRESHOLD: f64 = 0.90;

/// Everything needed to build the correctors for one model
///
/// Read from TOML:
///
/// ```toml
/// data_dir = "data_files"
/// model_name = "frightful-wendigo-1931"
///
/// [compensation]
/// confidence_threshold = 0.9
/// clinical = true
/// heatmaps = false
/// ```
///
/// The `taxonomy` table is optional and defaults to [`Taxonomy::yogo`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CorrectionConfig {
    /// Root of the artifact store, relative paths resolve against the config file
    pub data_dir: PathBuf,
    pub model_name: String,
    #[serde(default)]
    pub compensation: CompensationConfig,
    #[serde(default)]
    pub taxonomy: Taxonomy,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompensationConfig {
    pub confidence_threshold: f64,
    /// Clinical samples if true, laboratory cultures otherwise
    pub clinical: bool,
    pub heatmaps: bool,
    pub clamp_negative_intercept: bool,
    pub intercept_unit: Unit,
    /// Report raw parasitemia with Poisson error instead of compensating
    pub skip: bool,
}

impl Default for CompensationConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: CONFIDENCE_THRESHOLD,
            clinical: true,
            heatmaps: false,
            clamp_negative_intercept: true,
            intercept_unit: Unit::PerMicrolitre,
            skip: false,
        }
    }
}

impl CompensationConfig {
    #[must_use]
    pub const fn key(&self) -> CompensationKey {
        CompensationKey {
            confidence_threshold: self.confidence_threshold,
            source: if self.clinical {
                SampleSource::Clinical
            } else {
                SampleSource::Cultured
            },
            heatmaps: self.heatmaps,
        }
    }

    #[must_use]
    pub const fn options(&self) -> CompensationOptions {
        CompensationOptions {
            clamp_negative_intercept: self.clamp_negative_intercept,
            intercept_unit: self.intercept_unit,
        }
    }
}

impl FromStr for CorrectionConfig {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }
}

impl CorrectionConfig {
    /// Read a configuration file
    ///
    /// A relative `data_dir` is taken relative to the directory holding `path`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is not a valid configuration.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents =
            fs::read_to_string(path).map_err(|e| ConfigurationError::io("reading config", e))?;
        let mut config: Self = contents.parse()?;
        if config.data_dir.is_relative() {
            if let Some(parent) = path.parent() {
                config.data_dir = parent.join(&config.data_dir);
            }
        }
        info!(path = %path.display(), model = %config.model_name, "read correction config");
        Ok(config)
    }

    #[must_use]
    pub fn store(&self) -> ArtifactStore {
        ArtifactStore::new(&self.data_dir)
    }

    /// Build the deskewer for the configured model
    ///
    /// # Errors
    /// Returns an error if the confusion matrix artifacts are missing or invalid.
    pub fn deskewer(&self) -> Result<Deskewer> {
        Deskewer::load(&self.store(), &self.model_name, &self.taxonomy)
    }

    /// Build the compensator for the configured model and threshold
    ///
    /// # Errors
    /// Returns an error if the fit table is missing, has no row for the threshold, or
    /// holds an unusable fit. Never fails when compensation is skipped.
    pub fn compensator(&self) -> Result<Compensator> {
        if self.compensation.skip {
            return Compensator::uncompensated(&self.taxonomy);
        }
        Compensator::load(
            &self.store(),
            &self.model_name,
            &self.compensation.key(),
            &self.compensation.options(),
            &self.taxonomy,
        )
    }
}
