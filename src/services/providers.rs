//! Provider resolution and environment requirements
//!
//! Model identifiers select their provider either explicitly
//! (`"anthropic/claude-3-opus"`) or by naming convention (`"gpt-4o"`).

use std::fmt;
use std::str::FromStr;

use crate::error::CompletionError;

/// LLM providers known to the router
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    OpenAI,
    Azure,
    Anthropic,
    Gemini,
    Cohere,
    Mistral,
    Groq,
    Deepseek,
    TogetherAi,
    OpenRouter,
    Xai,
    Ollama,
}

/// Wire dialect a provider speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// `POST {base}/chat/completions`
    OpenAIChat,
    /// `POST {base}/v1/messages`
    AnthropicMessages,
}

impl Provider {
    pub const ALL: [Self; 12] = [
        Self::OpenAI,
        Self::Azure,
        Self::Anthropic,
        Self::Gemini,
        Self::Cohere,
        Self::Mistral,
        Self::Groq,
        Self::Deepseek,
        Self::TogetherAi,
        Self::OpenRouter,
        Self::Xai,
        Self::Ollama,
    ];

    /// Routing prefix, as used in `"<provider>/<model>"`
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAI => "openai",
            Self::Azure => "azure",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
            Self::Cohere => "cohere",
            Self::Mistral => "mistral",
            Self::Groq => "groq",
            Self::Deepseek => "deepseek",
            Self::TogetherAi => "together_ai",
            Self::OpenRouter => "openrouter",
            Self::Xai => "xai",
            Self::Ollama => "ollama",
        }
    }

    /// Environment variables the provider needs before any request
    #[must_use]
    pub const fn required_env_keys(&self) -> &'static [&'static str] {
        match self {
            Self::OpenAI => &["OPENAI_API_KEY"],
            Self::Azure => &["AZURE_API_KEY", "AZURE_API_BASE", "AZURE_API_VERSION"],
            Self::Anthropic => &["ANTHROPIC_API_KEY"],
            Self::Gemini => &["GEMINI_API_KEY"],
            Self::Cohere => &["COHERE_API_KEY"],
            Self::Mistral => &["MISTRAL_API_KEY"],
            Self::Groq => &["GROQ_API_KEY"],
            Self::Deepseek => &["DEEPSEEK_API_KEY"],
            Self::TogetherAi => &["TOGETHERAI_API_KEY"],
            Self::OpenRouter => &["OPENROUTER_API_KEY"],
            Self::Xai => &["XAI_API_KEY"],
            Self::Ollama => &[],
        }
    }

    /// Environment variable holding the credential, if the provider uses one
    #[must_use]
    pub fn api_key_env(&self) -> Option<&'static str> {
        self.required_env_keys().first().copied()
    }

    /// Default API base URL. Azure has none; it comes from `AZURE_API_BASE`.
    #[must_use]
    pub const fn default_base_url(&self) -> Option<&'static str> {
        match self {
            Self::OpenAI => Some("https://api.openai.com/v1"),
            Self::Azure => None,
            Self::Anthropic => Some("https://api.anthropic.com"),
            Self::Gemini => Some("https://generativelanguage.googleapis.com/v1beta/openai"),
            Self::Cohere => Some("https://api.cohere.ai/compatibility/v1"),
            Self::Mistral => Some("https://api.mistral.ai/v1"),
            Self::Groq => Some("https://api.groq.com/openai/v1"),
            Self::Deepseek => Some("https://api.deepseek.com/v1"),
            Self::TogetherAi => Some("https://api.together.xyz/v1"),
            Self::OpenRouter => Some("https://openrouter.ai/api/v1"),
            Self::Xai => Some("https://api.x.ai/v1"),
            Self::Ollama => Some("http://localhost:11434/v1"),
        }
    }

    /// Which request/response format the provider uses
    #[must_use]
    pub const fn dialect(&self) -> Dialect {
        match self {
            Self::Anthropic => Dialect::AnthropicMessages,
            _ => Dialect::OpenAIChat,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = CompletionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == lower)
            .ok_or_else(|| CompletionError::UnknownProvider(s.to_string()))
    }
}

/// A model identifier split into provider and provider-side model name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModel {
    pub provider: Provider,
    pub model: String,
}

/// Resolve the provider for a model identifier
///
/// # Errors
///
/// Returns [`CompletionError::UnknownProvider`] when neither an explicit
/// prefix nor a naming convention matches.
pub fn resolve(model: &str) -> Result<ResolvedModel, CompletionError> {
    if let Some((prefix, rest)) = model.split_once('/') {
        if let Ok(provider) = prefix.parse::<Provider>() {
            if !rest.is_empty() {
                return Ok(ResolvedModel {
                    provider,
                    model: rest.to_string(),
                });
            }
        }
    }

    infer_provider(model)
        .map(|provider| ResolvedModel {
            provider,
            model: model.to_string(),
        })
        .ok_or_else(|| CompletionError::UnknownProvider(model.to_string()))
}

fn has_prefix(model: &str, prefixes: &[&str]) -> bool {
    prefixes.iter().any(|p| model.starts_with(p))
}

fn infer_provider(model: &str) -> Option<Provider> {
    let lower = model.to_lowercase();

    if has_prefix(&lower, &["gpt-", "chatgpt-", "o1", "o3", "o4", "ft:gpt"]) {
        Some(Provider::OpenAI)
    } else if lower.starts_with("claude") {
        Some(Provider::Anthropic)
    } else if lower.starts_with("gemini") {
        Some(Provider::Gemini)
    } else if lower.starts_with("command") {
        Some(Provider::Cohere)
    } else if has_prefix(&lower, &["mistral", "mixtral", "codestral", "open-mistral"]) {
        Some(Provider::Mistral)
    } else if lower.starts_with("deepseek") {
        Some(Provider::Deepseek)
    } else if lower.starts_with("grok") {
        Some(Provider::Xai)
    } else {
        None
    }
}

/// Outcome of checking a provider's environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentReport {
    pub keys_in_environment: bool,
    pub missing_keys: Vec<String>,
}

/// Check which of the provider's required variables `lookup` cannot find
pub fn validate_environment<F>(provider: Provider, lookup: F) -> EnvironmentReport
where
    F: Fn(&str) -> Option<String>,
{
    let missing_keys: Vec<String> = provider
        .required_env_keys()
        .iter()
        .filter(|key| lookup(**key).is_none())
        .map(|key| (*key).to_string())
        .collect();

    EnvironmentReport {
        keys_in_environment: missing_keys.is_empty(),
        missing_keys,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[test]
    fn test_resolve_by_naming_convention() {
        let cases = [
            ("gpt-3.5-turbo", Provider::OpenAI),
            ("o1-mini", Provider::OpenAI),
            ("claude-3-5-sonnet-20240620", Provider::Anthropic),
            ("gemini-1.5-pro", Provider::Gemini),
            ("command-r-plus", Provider::Cohere),
            ("mixtral-8x7b", Provider::Mistral),
            ("deepseek-chat", Provider::Deepseek),
            ("grok-2", Provider::Xai),
        ];

        for (model, expected) in cases {
            let resolved = resolve(model).unwrap();
            assert_eq!(resolved.provider, expected, "model {model}");
            assert_eq!(resolved.model, model);
        }
    }

    #[test]
    fn test_resolve_explicit_prefix() {
        let resolved = resolve("groq/llama3-70b-8192").unwrap();
        assert_eq!(resolved.provider, Provider::Groq);
        assert_eq!(resolved.model, "llama3-70b-8192");

        let resolved = resolve("openrouter/meta-llama/llama-3-8b").unwrap();
        assert_eq!(resolved.provider, Provider::OpenRouter);
        assert_eq!(resolved.model, "meta-llama/llama-3-8b");
    }

    #[test]
    fn test_resolve_unknown() {
        assert_eq!(
            resolve("my-local-model"),
            Err(CompletionError::UnknownProvider("my-local-model".into()))
        );
        assert!(resolve("nobody/knows").is_err());
        assert!(resolve("ollama/").is_err());
    }

    #[test]
    fn test_provider_from_str_round_trip() {
        for provider in Provider::ALL {
            assert_eq!(provider.as_str().parse::<Provider>().unwrap(), provider);
        }
        assert_eq!("OpenAI".parse::<Provider>().unwrap(), Provider::OpenAI);
    }

    #[test]
    fn test_validate_environment_missing() {
        let env: HashMap<&str, &str> = HashMap::from([("AZURE_API_KEY", "k")]);
        let report = validate_environment(Provider::Azure, |k| env.get(k).map(|v| v.to_string()));

        assert!(!report.keys_in_environment);
        assert_eq!(
            report.missing_keys,
            vec!["AZURE_API_BASE".to_string(), "AZURE_API_VERSION".to_string()]
        );
    }

    #[test]
    fn test_validate_environment_present() {
        let report = validate_environment(Provider::OpenAI, |_| Some(String::new()));
        assert!(report.keys_in_environment);
        assert!(report.missing_keys.is_empty());
    }

    #[test]
    fn test_ollama_needs_nothing() {
        let report = validate_environment(Provider::Ollama, |_| None);
        assert!(report.keys_in_environment);
        assert_eq!(Provider::Ollama.api_key_env(), None);
    }

    #[test]
    fn test_dialects() {
        assert_eq!(Provider::Anthropic.dialect(), Dialect::AnthropicMessages);
        assert_eq!(Provider::Groq.dialect(), Dialect::OpenAIChat);
        assert!(Provider::Azure.default_base_url().is_none());
    }
}
