//! Model configuration
//!
//! A [`ModelConfig`] is the full description of one evaluation model: which
//! model to route to, sampling parameters, and knobs handed through to the
//! completion backend. It can be built in code (all fields have defaults) or
//! loaded from a JSON file.

use std::{
    fs,
    path::{Path, PathBuf},
};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{EvalError, Result};

/// Open-ended keyword arguments forwarded to the provider
pub type Kwargs = IndexMap<String, serde_json::Value>;

/// Model used when none is configured
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Configuration record for a routed evaluation model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// The model name to use
    #[serde(default = "default_model")]
    pub model: String,

    /// What sampling temperature to use
    #[serde(default)]
    pub temperature: f64,

    /// The maximum number of tokens to generate in the completion
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Total probability mass of tokens to consider at each step
    #[serde(default = "default_top_p")]
    pub top_p: f64,

    /// How many times the backend may retry a rate-limited or unavailable request
    #[serde(default)]
    pub num_retries: u32,

    /// Seconds to wait for a single request
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    /// Provider-specific parameters
    #[serde(default)]
    pub model_kwargs: Kwargs,

    /// Minimum number of seconds to wait when retrying (not sent to the backend)
    #[serde(default = "default_retry_min_seconds")]
    pub retry_min_seconds: u64,

    /// Maximum content size for fine-tuned models (not sent to the backend)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_content_size: Option<u32>,

    /// Deprecated alias for `model`, cleared once the adapter is built
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_max_tokens() -> u32 {
    256
}

fn default_top_p() -> f64 {
    1.0
}

fn default_request_timeout() -> u64 {
    60
}

fn default_retry_min_seconds() -> u64 {
    10
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: 0.0,
            max_tokens: default_max_tokens(),
            top_p: default_top_p(),
            num_retries: 0,
            request_timeout: default_request_timeout(),
            model_kwargs: Kwargs::new(),
            retry_min_seconds: default_retry_min_seconds(),
            max_content_size: None,
            model_name: None,
        }
    }
}

impl ModelConfig {
    /// Create a config for `model` with every other field defaulted
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    /// Get the configuration directory path
    #[must_use]
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("evalmodel")
    }

    /// Get the default config file path
    #[must_use]
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("model.json")
    }

    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| EvalError::ConfigParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        serde_json::from_str(&contents).map_err(|e| EvalError::ConfigParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Save configuration to a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }
}

/// Fold the deprecated `model_name` alias into `model`.
///
/// Returns the effective model and the (always empty) legacy slot.
#[must_use]
pub fn migrate_model_name(model: String, legacy: Option<String>) -> (String, Option<String>) {
    (legacy.unwrap_or(model), None)
}
