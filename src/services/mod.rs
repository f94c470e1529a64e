//! Completion backends
//!
//! The adapter never talks HTTP itself. It hands a [`CompletionRequest`] to a
//! [`CompletionBackend`], which owns provider selection, authentication,
//! retries and timeouts. The bundled [`router::RouterBackend`] speaks to
//! OpenAI-compatible and Anthropic endpoints; tests plug in their own.

pub mod anthropic;
pub mod openai;
pub mod providers;
#[cfg(feature = "router")]
pub mod router;

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    config::Kwargs,
    error::{CompletionError, Result},
    messages::ChatMessage,
};

pub use self::providers::{EnvironmentReport, Provider, ResolvedModel};

/// Everything a backend needs for one completion call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: f64,
    pub num_retries: u32,
    pub request_timeout: u64,
    /// Provider-specific options, already merged with call-time overrides
    pub options: Kwargs,
}

/// Response in the OpenAI "choices" shape
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl CompletionResponse {
    /// Response with a single assistant choice holding `text`
    #[must_use]
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            choices: vec![Choice {
                index: 0,
                message: ChoiceMessage {
                    role: "assistant".to_string(),
                    content: Some(text.into()),
                },
                finish_reason: Some("stop".to_string()),
            }],
            ..Self::default()
        }
    }
}

/// One generated alternative
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub index: u32,
    pub message: ChoiceMessage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// Message carried by a [`Choice`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
}

fn default_role() -> String {
    "assistant".to_string()
}

/// Token usage statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// Where a backend reads provider credentials from
#[derive(Debug, Clone, Default)]
pub enum EnvSource {
    /// The process environment
    #[default]
    Process,
    /// A fixed set of variables
    Fixed(HashMap<String, String>),
}

impl EnvSource {
    /// Look up a variable; presence is all that matters
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        match self {
            Self::Process => std::env::var_os(key).map(|v| v.to_string_lossy().into_owned()),
            Self::Fixed(vars) => vars.get(key).cloned(),
        }
    }
}

/// Keys the router consumes itself and never sends upstream
pub const RESERVED_OPTIONS: [&str; 2] = ["api_base", "api_key"];

/// Serialize `body` and overlay provider options on top of it
fn with_options<T: Serialize>(
    body: &T,
    options: &Kwargs,
) -> std::result::Result<serde_json::Value, CompletionError> {
    let mut value =
        serde_json::to_value(body).map_err(|e| CompletionError::InvalidResponse(e.to_string()))?;
    if let Some(map) = value.as_object_mut() {
        for (key, option) in options {
            if !RESERVED_OPTIONS.contains(&key.as_str()) {
                map.insert(key.clone(), option.clone());
            }
        }
    }
    Ok(value)
}

/// Multi-provider completion routine the adapter delegates to
pub trait CompletionBackend: Send + Sync {
    /// Resolve which provider serves `model`
    ///
    /// # Errors
    ///
    /// Returns an error if no provider matches the identifier
    fn get_llm_provider(&self, model: &str) -> std::result::Result<ResolvedModel, CompletionError> {
        providers::resolve(model)
    }

    /// Report which of the provider's required variables are missing
    fn validate_environment(&self, provider: Provider) -> EnvironmentReport {
        providers::validate_environment(provider, |key| EnvSource::Process.get(key))
    }

    /// Run one blocking completion call
    ///
    /// # Errors
    ///
    /// Returns whatever the provider or transport failed with
    fn completion(
        &self,
        request: &CompletionRequest,
    ) -> std::result::Result<CompletionResponse, CompletionError>;
}

/// The bundled completion router, if this build includes it
///
/// # Errors
///
/// Returns [`crate::EvalError::MissingDependency`] when the crate was built
/// without the `router` feature.
#[cfg(feature = "router")]
pub fn default_backend() -> Result<Arc<dyn CompletionBackend>> {
    Ok(Arc::new(router::RouterBackend::new()))
}

/// The bundled completion router, if this build includes it
///
/// # Errors
///
/// Returns [`crate::EvalError::MissingDependency`] when the crate was built
/// without the `router` feature.
#[cfg(not(feature = "router"))]
pub fn default_backend() -> Result<Arc<dyn CompletionBackend>> {
    Err(crate::error::EvalError::MissingDependency {
        display_name: "LiteLLM",
        package: "litellm",
    })
}
