//! Evaluation model adapter
//!
//! [`LiteLlmModel`] turns a prompt string into a single user message, hands it
//! to a [`CompletionBackend`] together with the configured sampling knobs,
//! and returns the text of the first choice. Everything about providers,
//! retries and timeouts belongs to the backend.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::{
    config::{migrate_model_name, Kwargs, ModelConfig},
    error::{EvalError, Result},
    messages::messages_from_prompt,
    services::{default_backend, CompletionBackend, CompletionRequest, Provider},
};

const MODEL_NAME_DEPRECATION: &str = "The `model_name` field is deprecated. Use `model` instead. \
     This will be removed in a future release.";

/// Text returned when the first choice carries no content
pub const NULL_CONTENT: &str = "None";

/// A model that can be asked to complete a prompt
#[async_trait]
pub trait EvalModel: Send + Sync {
    /// Model identifier requests are routed by
    fn model_name(&self) -> &str;

    /// Complete `prompt`, with `overrides` taking precedence over configured options
    ///
    /// # Errors
    ///
    /// Returns whatever the completion backend failed with
    fn generate(&self, prompt: &str, overrides: &Kwargs) -> Result<String>;

    /// Async-compatible entry point. This blocks the calling task for the
    /// whole request, exactly like [`EvalModel::generate`].
    ///
    /// # Errors
    ///
    /// Returns whatever the completion backend failed with
    async fn async_generate(&self, prompt: &str, overrides: &Kwargs) -> Result<String>;
}

/// Routed completion model with validated environment
pub struct LiteLlmModel {
    config: ModelConfig,
    provider: Provider,
    backend: Arc<dyn CompletionBackend>,
}

impl std::fmt::Debug for LiteLlmModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiteLlmModel")
            .field("config", &self.config)
            .field("provider", &self.provider)
            .finish_non_exhaustive()
    }
}

impl LiteLlmModel {
    /// Build the model on the bundled completion router
    ///
    /// # Errors
    ///
    /// Returns [`EvalError::MissingDependency`] if the router is not compiled
    /// in, and [`EvalError::MissingEnvironment`] if the provider's
    /// environment variables are absent.
    pub fn new(config: ModelConfig) -> Result<Self> {
        let config = Self::migrate(config);
        let backend = default_backend()?;
        Self::initialize(config, backend)
    }

    /// Build the model on an explicit backend
    ///
    /// # Errors
    ///
    /// Returns [`EvalError::MissingEnvironment`] if the provider's
    /// environment variables are absent, or the backend's error if it cannot
    /// resolve a provider for the model.
    pub fn with_backend(config: ModelConfig, backend: Arc<dyn CompletionBackend>) -> Result<Self> {
        Self::initialize(Self::migrate(config), backend)
    }

    fn migrate(mut config: ModelConfig) -> ModelConfig {
        if config.model_name.is_some() {
            warn_model_name_deprecated();
        }
        let (model, legacy) = migrate_model_name(config.model, config.model_name.take());
        config.model = model;
        config.model_name = legacy;
        config
    }

    fn initialize(config: ModelConfig, backend: Arc<dyn CompletionBackend>) -> Result<Self> {
        let resolved = backend.get_llm_provider(&config.model)?;
        let report = backend.validate_environment(resolved.provider);

        if !report.keys_in_environment {
            return Err(EvalError::MissingEnvironment {
                missing: report.missing_keys,
                model: config.model,
            });
        }

        debug!(model = %config.model, provider = %resolved.provider, "model initialized");

        Ok(Self {
            config,
            provider: resolved.provider,
            backend,
        })
    }

    /// The normalized configuration
    #[must_use]
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Provider resolved for the configured model
    #[must_use]
    pub fn provider(&self) -> Provider {
        self.provider
    }

    /// Assemble the backend request for `prompt`
    #[must_use]
    pub fn request(&self, prompt: &str, overrides: &Kwargs) -> CompletionRequest {
        CompletionRequest {
            model: self.config.model.clone(),
            messages: messages_from_prompt(prompt),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            top_p: self.config.top_p,
            num_retries: self.config.num_retries,
            request_timeout: self.config.request_timeout,
            options: merge_options(&self.config.model_kwargs, overrides),
        }
    }
}

/// Configured options overlaid with call-time overrides (overrides win)
#[must_use]
pub fn merge_options(configured: &Kwargs, overrides: &Kwargs) -> Kwargs {
    let mut merged = configured.clone();
    merged.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

fn warn_model_name_deprecated() {
    warn!(target: "evalmodel::deprecation", "{MODEL_NAME_DEPRECATION}");
    eprintln!("{MODEL_NAME_DEPRECATION}");
}

#[async_trait]
impl EvalModel for LiteLlmModel {
    fn model_name(&self) -> &str {
        &self.config.model
    }

    fn generate(&self, prompt: &str, overrides: &Kwargs) -> Result<String> {
        let request = self.request(prompt, overrides);
        let response = self.backend.completion(&request)?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| EvalError::EmptyResponse {
                model: self.config.model.clone(),
            })?;

        Ok(choice
            .message
            .content
            .unwrap_or_else(|| NULL_CONTENT.to_string()))
    }

    async fn async_generate(&self, prompt: &str, overrides: &Kwargs) -> Result<String> {
        self.generate(prompt, overrides)
    }
}
