//! Configuration for the model provider and inference pipeline

use crate::model_loader::ModelSource;
use crate::preprocess::PreprocessConfig;
use leafscan_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Number of classes in the PlantVillage label set
pub const DEFAULT_NUM_CLASSES: usize = 38;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeafScanConfig {
    /// Model artifact settings
    #[serde(default)]
    pub model: ModelSettings,

    /// Label table settings
    #[serde(default)]
    pub labels: LabelSettings,

    /// Image preprocessing settings
    #[serde(default)]
    pub preprocess: PreprocessConfig,
}

/// Where to get the model and how to fetch it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    /// Model source; must point at an ONNX export before a provider can be built
    #[serde(default)]
    pub source: Option<ModelSource>,

    /// Overall download timeout; unset means wait indefinitely
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Directory for the transient artifact file (defaults to the system temp dir)
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
}

/// Label table location and expected cardinality
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelSettings {
    /// Path to the JSON label table
    #[serde(default = "default_labels_path")]
    pub path: PathBuf,

    /// Number of model output classes the table must cover
    #[serde(default = "default_expected_classes")]
    pub expected_classes: Option<usize>,
}

impl Default for LabelSettings {
    fn default() -> Self {
        Self {
            path: default_labels_path(),
            expected_classes: default_expected_classes(),
        }
    }
}

fn default_labels_path() -> PathBuf {
    PathBuf::from("data/plant_disease.json")
}

fn default_expected_classes() -> Option<usize> {
    Some(DEFAULT_NUM_CLASSES)
}

impl LeafScanConfig {
    /// Parse configuration from YAML text
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| Error::config(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Failed to read configuration {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&contents)
    }

    /// Load the file if it exists, otherwise fall back to defaults
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_file(path)
        } else {
            tracing::debug!("No configuration at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Check values that deserialization alone cannot
    pub fn validate(&self) -> Result<()> {
        if self.preprocess.target_size == 0 {
            return Err(Error::config("preprocess.target_size must be greater than zero"));
        }

        if self.labels.expected_classes == Some(0) {
            return Err(Error::config("labels.expected_classes must be greater than zero"));
        }

        if let Some(digest) = self.model.source.as_ref().and_then(|s| s.sha256()) {
            let digest = digest.trim();
            if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(Error::config(format!(
                    "model.source.sha256 must be 64 hex characters, got '{}'",
                    digest
                )));
            }
        }

        if let Some(ModelSource::Url { url, .. }) = &self.model.source {
            reqwest::Url::parse(url)
                .map_err(|e| Error::config(format!("Invalid model URL '{}': {}", url, e)))?;
        }

        Ok(())
    }
}

/// Load configuration from file
pub fn load_config(path: impl AsRef<Path>) -> Result<LeafScanConfig> {
    LeafScanConfig::from_file(path)
}
