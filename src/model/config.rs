//! # Model Configuration
//!
//! Parses the `config.toml` shipped with a model directory. The file names
//! the predictor architecture, the weight file, the feature encoder, and the
//! label scheme; free-form `kwargs` tables carry architecture parameters.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{GraylingError, Result};

/// The `[model]` section.
#[derive(Clone, Debug, Deserialize)]
pub struct ModelSection {
    /// Architecture tag: `GruModel`, `LatentSpaceLstm`, or `ScriptedModel`.
    #[serde(rename = "type")]
    pub model_type: String,
    /// Weight file name, relative to the model directory.
    pub file: String,
    #[serde(default)]
    pub kwargs: HashMap<String, String>,
}

/// The `[feature_encoder]` section.
#[derive(Clone, Debug, Deserialize)]
pub struct FeatureEncoderSection {
    /// Encoder tag: `CountsEncoder` or `ReadAlignmentEncoder`.
    #[serde(rename = "type")]
    pub encoder_type: String,
    #[serde(default)]
    pub kwargs: HashMap<String, String>,
}

/// The `[label_scheme]` section.
#[derive(Clone, Debug, Deserialize)]
pub struct LabelSchemeSection {
    /// Scheme tag, e.g. `HaploidLabelScheme`.
    #[serde(rename = "type")]
    pub scheme_type: String,
}

/// Parsed model configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct ModelConfig {
    pub model: ModelSection,
    pub feature_encoder: FeatureEncoderSection,
    pub label_scheme: LabelSchemeSection,
    /// Directory the config was loaded from; resolves the weight file.
    #[serde(skip)]
    pub model_dir: PathBuf,
}

impl ModelConfig {
    /// Load and parse `config.toml` from a model directory.
    pub fn load(model_dir: &Path) -> Result<Self> {
        let config_path = model_dir.join("config.toml");
        if !config_path.exists() {
            return Err(GraylingError::FileNotFound { path: config_path });
        }
        let text = std::fs::read_to_string(&config_path)?;
        let mut config: ModelConfig = toml::from_str(&text)?;
        config.model_dir = model_dir.to_path_buf();
        Ok(config)
    }

    /// Absolute path of the weight file.
    pub fn weights_path(&self) -> PathBuf {
        self.model_dir.join(&self.model.file)
    }
}

/// Look up an integer kwarg, falling back to a default when absent.
pub fn kwarg_usize(kwargs: &HashMap<String, String>, key: &str, default: usize) -> Result<usize> {
    match kwargs.get(key) {
        None => Ok(default),
        Some(text) => text.parse().map_err(|_| {
            GraylingError::format(format!("Model kwarg '{key}' is not an integer: '{text}'"))
        }),
    }
}
