//! evalmodel: an evaluation model adapter for routed LLM completions
//!
//! This library wraps a multi-provider completion backend behind a small
//! prompt-in, text-out model: configuration with sensible defaults, provider
//! environment checks at construction time, and blocking plus async-compatible
//! generation entry points.

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions, clippy::too_many_lines)]

pub mod cli;
pub mod config;
pub mod error;
pub mod messages;
pub mod model;
pub mod services;

// Re-exports for convenience
pub use config::{Kwargs, ModelConfig};
pub use error::{CompletionError, EvalError, Result};
pub use model::{EvalModel, LiteLlmModel};
