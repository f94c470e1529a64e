//! CLI argument parsing and command routing

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::{Kwargs, ModelConfig};

/// evalmodel: run prompts through a routed evaluation model
#[derive(Debug, Parser)]
#[command(name = "evalmodel")]
#[command(about = "Run prompts through a routed evaluation model", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Model config file (JSON)
    #[arg(short, long, global = true, env = "EVALMODEL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Model identifier, overrides the config file
    #[arg(short, long, global = true)]
    pub model: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Complete a prompt and print the result
    Generate(GenerateArgs),

    /// Validate that the configured model can be used
    Check,

    /// Show version information
    Version,
}

/// Arguments for `generate`
#[derive(Debug, Args)]
pub struct GenerateArgs {
    /// The prompt, or `-` to read it from stdin
    pub prompt: String,

    /// Sampling temperature
    #[arg(long)]
    pub temperature: Option<f64>,

    /// Maximum tokens to generate
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Nucleus sampling mass
    #[arg(long)]
    pub top_p: Option<f64>,

    /// Retries the backend may attempt
    #[arg(long)]
    pub num_retries: Option<u32>,

    /// Per-request timeout in seconds
    #[arg(long)]
    pub request_timeout: Option<u64>,

    /// Provider option for this call (repeatable); VALUE is parsed as JSON,
    /// falling back to a plain string
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub set: Vec<(String, serde_json::Value)>,
}

impl GenerateArgs {
    /// Apply the sampling flags on top of `config`
    pub fn apply_to(&self, config: &mut ModelConfig) {
        if let Some(temperature) = self.temperature {
            config.temperature = temperature;
        }
        if let Some(max_tokens) = self.max_tokens {
            config.max_tokens = max_tokens;
        }
        if let Some(top_p) = self.top_p {
            config.top_p = top_p;
        }
        if let Some(num_retries) = self.num_retries {
            config.num_retries = num_retries;
        }
        if let Some(request_timeout) = self.request_timeout {
            config.request_timeout = request_timeout;
        }
    }

    /// The `--set` pairs as call-time overrides
    #[must_use]
    pub fn overrides(&self) -> Kwargs {
        self.set.iter().cloned().collect()
    }
}

fn parse_key_value(raw: &str) -> Result<(String, serde_json::Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{raw}`"))?;
    if key.is_empty() {
        return Err(format!("empty key in `{raw}`"));
    }
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

impl Cli {
    /// Parse CLI arguments from environment
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
