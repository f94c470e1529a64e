//! Error types for evalmodel

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using [`EvalError`]
pub type Result<T> = std::result::Result<T, EvalError>;

/// Where to look up which environment variables a provider needs
pub const PROVIDER_ENV_DOCS: &str =
    "https://docs.litellm.ai/docs/completion/input#provider-specific-params";

/// Main error type for the evaluation model adapter
#[derive(Debug, Error)]
pub enum EvalError {
    /// Required provider environment variables are absent
    #[error(
        "Missing environment variable(s): '{}', for model: {model}. \nFor additional \
         information about the right environment variables for specific model providers:\n\
         https://docs.litellm.ai/docs/completion/input#provider-specific-params.",
        .missing.join(", ")
    )]
    MissingEnvironment { missing: Vec<String>, model: String },

    /// The completion router is not compiled into this build
    #[error(
        "Could not load the {display_name} completion router (`{package}`). \
         Rebuild with `--features router` to use it."
    )]
    MissingDependency {
        display_name: &'static str,
        package: &'static str,
    },

    /// Configuration parse error
    #[error("Failed to parse config at {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error raised by the completion backend, passed through as-is
    #[error(transparent)]
    Completion(#[from] CompletionError),

    /// The backend answered without any choices
    #[error("Completion for model {model} returned no choices")]
    EmptyResponse { model: String },
}

/// Errors raised by a completion backend
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompletionError {
    /// No provider could be inferred from the model identifier
    #[error("Unable to determine provider for model: {0}")]
    UnknownProvider(String),

    /// HTTP 429 from the provider
    #[error("Rate limited by {provider}: {message}")]
    RateLimited { provider: String, message: String },

    /// Provider temporarily unavailable (502/503/504)
    #[error("Service unavailable ({provider}): {message}")]
    ServiceUnavailable { provider: String, message: String },

    /// Request exceeded the configured timeout
    #[error("Request to {provider} timed out after {seconds}s")]
    Timeout { provider: String, seconds: u64 },

    /// Any other non-success response
    #[error("API error from {provider} (HTTP {status}): {message}")]
    Api {
        provider: String,
        status: u16,
        message: String,
    },

    /// Request could not be built from local settings; nothing was sent
    #[error("Configuration error ({provider}): {message}")]
    Configuration { provider: String, message: String },

    /// Transport failure before a response arrived
    #[error("Network error: {0}")]
    Network(String),

    /// The response body could not be decoded
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl CompletionError {
    /// Whether the router should try the request again
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. }
                | Self::ServiceUnavailable { .. }
                | Self::Timeout { .. }
                | Self::Network(_)
        )
    }
}
