//! Bundled multi-provider completion router
//!
//! Resolves the provider from the model identifier, authenticates from the
//! environment (or `api_key` in the options), sends one blocking HTTP
//! request per attempt and retries rate-limit and availability failures up
//! to `num_retries` times.

use std::time::Duration;

use reqwest::{blocking::Client, header, StatusCode};
use tracing::{debug, warn};

use crate::error::CompletionError;

use super::{
    anthropic, openai,
    providers::{self, Dialect, Provider},
    CompletionBackend, CompletionRequest, CompletionResponse, EnvSource, EnvironmentReport,
    ResolvedModel,
};

/// Completion backend that calls provider HTTP APIs directly
#[derive(Debug, Clone, Default)]
pub struct RouterBackend {
    env: EnvSource,
}

impl RouterBackend {
    /// Router reading credentials from the process environment
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Router reading credentials from `env`
    #[must_use]
    pub fn with_env(env: EnvSource) -> Self {
        Self { env }
    }

    fn option_str<'a>(request: &'a CompletionRequest, key: &str) -> Option<&'a str> {
        request.options.get(key).and_then(serde_json::Value::as_str)
    }

    fn base_url(
        &self,
        provider: Provider,
        request: &CompletionRequest,
    ) -> Result<String, CompletionError> {
        if let Some(base) = Self::option_str(request, "api_base") {
            return Ok(base.to_string());
        }
        let from_env = match provider {
            Provider::Azure => self.env.get("AZURE_API_BASE"),
            Provider::OpenAI => self.env.get("OPENAI_API_BASE"),
            Provider::Ollama => self.env.get("OLLAMA_API_BASE"),
            _ => None,
        };
        from_env
            .or_else(|| provider.default_base_url().map(String::from))
            .ok_or_else(|| CompletionError::Configuration {
                provider: provider.to_string(),
                message: "no API base configured".to_string(),
            })
    }

    fn api_key(&self, provider: Provider, request: &CompletionRequest) -> Option<String> {
        Self::option_str(request, "api_key")
            .map(String::from)
            .or_else(|| provider.api_key_env().and_then(|key| self.env.get(key)))
    }

    /// Build the URL, headers and body for one attempt
    fn prepare(
        &self,
        resolved: &ResolvedModel,
        request: &CompletionRequest,
    ) -> Result<(String, header::HeaderMap, serde_json::Value), CompletionError> {
        let provider = resolved.provider;
        let base_url = self.base_url(provider, request)?;
        let api_key = self.api_key(provider, request);
        let mut headers = header::HeaderMap::new();

        let invalid_key = |_: header::InvalidHeaderValue| CompletionError::Configuration {
            provider: provider.to_string(),
            message: "Invalid API key format".to_string(),
        };

        let (url, body) = match provider.dialect() {
            Dialect::AnthropicMessages => {
                if let Some(key) = api_key {
                    headers.insert(
                        "x-api-key",
                        header::HeaderValue::from_str(&key).map_err(invalid_key)?,
                    );
                }
                headers.insert(
                    "anthropic-version",
                    header::HeaderValue::from_static(anthropic::API_VERSION),
                );
                (
                    anthropic::endpoint(&base_url),
                    anthropic::request_body(&resolved.model, request)?,
                )
            }
            Dialect::OpenAIChat if provider == Provider::Azure => {
                if let Some(key) = api_key {
                    headers.insert(
                        "api-key",
                        header::HeaderValue::from_str(&key).map_err(invalid_key)?,
                    );
                }
                let version = self.env.get("AZURE_API_VERSION").unwrap_or_default();
                (
                    openai::azure_endpoint(&base_url, &resolved.model, &version),
                    openai::request_body(&resolved.model, request)?,
                )
            }
            Dialect::OpenAIChat => {
                if let Some(key) = api_key {
                    headers.insert(
                        header::AUTHORIZATION,
                        header::HeaderValue::from_str(&format!("Bearer {key}"))
                            .map_err(invalid_key)?,
                    );
                }
                (
                    openai::endpoint(&base_url),
                    openai::request_body(&resolved.model, request)?,
                )
            }
        };

        Ok((url, headers, body))
    }

    fn send_once(
        &self,
        resolved: &ResolvedModel,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, CompletionError> {
        let provider = resolved.provider;
        let (url, headers, body) = self.prepare(resolved, request)?;

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(request.request_timeout))
            .build()
            .map_err(|e| CompletionError::Network(e.to_string()))?;

        let response = client
            .post(&url)
            .json(&body)
            .send()
            .map_err(|e| transport_error(provider, request.request_timeout, &e))?;

        let status = response.status();
        let text = response
            .text()
            .map_err(|e| transport_error(provider, request.request_timeout, &e))?;

        if !status.is_success() {
            return Err(status_error(provider, status, text));
        }

        match provider.dialect() {
            Dialect::AnthropicMessages => anthropic::parse_response(&text),
            Dialect::OpenAIChat => openai::parse_response(&text),
        }
    }

    fn send_with_retries(
        &self,
        resolved: &ResolvedModel,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, CompletionError> {
        let attempts = request.num_retries.saturating_add(1);
        let mut attempt = 1;

        loop {
            debug!(
                model = %request.model,
                provider = %resolved.provider,
                attempt,
                "sending completion request"
            );

            match self.send_once(resolved, request) {
                Err(err) if err.is_retryable() && attempt < attempts => {
                    warn!(model = %request.model, attempt, error = %err, "retrying completion");
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

fn transport_error(provider: Provider, seconds: u64, err: &reqwest::Error) -> CompletionError {
    if err.is_timeout() {
        CompletionError::Timeout {
            provider: provider.to_string(),
            seconds,
        }
    } else {
        CompletionError::Network(err.to_string())
    }
}

fn status_error(provider: Provider, status: StatusCode, message: String) -> CompletionError {
    let provider = provider.to_string();
    match status {
        StatusCode::TOO_MANY_REQUESTS => CompletionError::RateLimited { provider, message },
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
            CompletionError::ServiceUnavailable { provider, message }
        }
        _ => CompletionError::Api {
            provider,
            status: status.as_u16(),
            message,
        },
    }
}

impl CompletionBackend for RouterBackend {
    fn validate_environment(&self, provider: Provider) -> EnvironmentReport {
        providers::validate_environment(provider, |key| self.env.get(key))
    }

    fn completion(&self, request: &CompletionRequest) -> Result<CompletionResponse, CompletionError> {
        let resolved = self.get_llm_provider(&request.model)?;

        // reqwest's blocking client may not be built or dropped on an async
        // worker thread; a scoped thread is safe from any caller.
        std::thread::scope(|scope| {
            scope
                .spawn(|| self.send_with_retries(&resolved, request))
                .join()
                .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{Kwargs, ModelConfig},
        messages::messages_from_prompt,
        model::{EvalModel, LiteLlmModel},
    };
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::{collections::HashMap, sync::Arc};
    use wiremock::{
        matchers::{body_partial_json, header, method, path, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    fn request(model: &str, api_base: &str, num_retries: u32) -> CompletionRequest {
        let options: Kwargs = [
            ("api_base".to_string(), json!(api_base)),
            ("seed".to_string(), json!(7)),
        ]
        .into_iter()
        .collect();

        CompletionRequest {
            model: model.into(),
            messages: messages_from_prompt("Say hello"),
            temperature: 0.0,
            max_tokens: 16,
            top_p: 1.0,
            num_retries,
            request_timeout: 5,
            options,
        }
    }

    fn env(pairs: &[(&str, &str)]) -> EnvSource {
        EnvSource::Fixed(
            pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect::<HashMap<_, _>>(),
        )
    }

    fn chat_completion(text: &str) -> serde_json::Value {
        json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "created": 0,
            "model": "gpt-4o-mini",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": text},
                "finish_reason": "stop"
            }]
        })
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_openai_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "gpt-4o-mini",
                "messages": [{"content": "Say hello", "role": "user"}],
                "max_tokens": 16,
                "seed": 7
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_completion("hello")))
            .expect(1)
            .mount(&server)
            .await;

        let backend = RouterBackend::with_env(env(&[("OPENAI_API_KEY", "sk-test")]));
        let response = backend
            .completion(&request("gpt-4o-mini", &server.uri(), 0))
            .unwrap();

        assert_eq!(response.choices[0].message.content.as_deref(), Some("hello"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_prefixed_model_is_stripped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer gsk"))
            .and(body_partial_json(json!({"model": "llama3-8b-8192"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_completion("hi")))
            .expect(1)
            .mount(&server)
            .await;

        let backend = RouterBackend::with_env(env(&[("GROQ_API_KEY", "gsk")]));
        let response = backend
            .completion(&request("groq/llama3-8b-8192", &server.uri(), 0))
            .unwrap();

        assert_eq!(response.choices[0].message.content.as_deref(), Some("hi"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_anthropic_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "ak"))
            .and(header("anthropic-version", anthropic::API_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "msg_1",
                "type": "message",
                "role": "assistant",
                "model": "claude-3-haiku-20240307",
                "content": [{"type": "text", "text": "hello"}],
                "stop_reason": "end_turn"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let backend = RouterBackend::with_env(env(&[("ANTHROPIC_API_KEY", "ak")]));
        let response = backend
            .completion(&request("claude-3-haiku-20240307", &server.uri(), 0))
            .unwrap();

        assert_eq!(response.choices[0].message.content.as_deref(), Some("hello"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_azure_routes_by_deployment() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/openai/deployments/my-gpt4/chat/completions"))
            .and(query_param("api-version", "2024-02-01"))
            .and(header("api-key", "az"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_completion("ok")))
            .expect(1)
            .mount(&server)
            .await;

        let backend = RouterBackend::with_env(env(&[
            ("AZURE_API_KEY", "az"),
            ("AZURE_API_BASE", "http://unused.invalid"),
            ("AZURE_API_VERSION", "2024-02-01"),
        ]));
        let response = backend
            .completion(&request("azure/my-gpt4", &server.uri(), 0))
            .unwrap();

        assert_eq!(response.choices[0].message.content.as_deref(), Some("ok"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_rate_limit_without_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .expect(1)
            .mount(&server)
            .await;

        let backend = RouterBackend::with_env(env(&[("OPENAI_API_KEY", "sk")]));
        let err = backend
            .completion(&request("gpt-4o-mini", &server.uri(), 0))
            .unwrap_err();

        assert_eq!(
            err,
            CompletionError::RateLimited {
                provider: "openai".into(),
                message: "slow down".into()
            }
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_retries_until_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_completion("finally")))
            .expect(1)
            .mount(&server)
            .await;

        let backend = RouterBackend::with_env(env(&[("OPENAI_API_KEY", "sk")]));
        let response = backend
            .completion(&request("gpt-4o-mini", &server.uri(), 2))
            .unwrap();

        assert_eq!(response.choices[0].message.content.as_deref(), Some("finally"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad model"))
            .expect(1)
            .mount(&server)
            .await;

        let backend = RouterBackend::with_env(env(&[("OPENAI_API_KEY", "sk")]));
        let err = backend
            .completion(&request("gpt-4o-mini", &server.uri(), 3))
            .unwrap_err();

        assert!(matches!(err, CompletionError::Api { status: 400, .. }));
    }

    #[tokio::test]
    async fn test_completion_from_current_thread_runtime() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_completion("inline")))
            .expect(1)
            .mount(&server)
            .await;

        let backend = RouterBackend::with_env(env(&[("OPENAI_API_KEY", "sk")]));
        let response = backend
            .completion(&request("gpt-4o-mini", &server.uri(), 0))
            .unwrap();

        assert_eq!(response.choices[0].message.content.as_deref(), Some("inline"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_async_generate_over_router() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_completion("routed")))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = ModelConfig::new("gpt-4o-mini");
        config
            .model_kwargs
            .insert("api_base".to_string(), json!(server.uri()));
        let backend = Arc::new(RouterBackend::with_env(env(&[("OPENAI_API_KEY", "sk")])));
        let model = LiteLlmModel::with_backend(config, backend).unwrap();

        let text = model.async_generate("Say hello", &Kwargs::new()).await.unwrap();
        assert_eq!(text, "routed");
    }

    #[test]
    fn test_azure_without_base_is_configuration_error() {
        let backend = RouterBackend::with_env(env(&[
            ("AZURE_API_KEY", "az"),
            ("AZURE_API_VERSION", "2024-02-01"),
        ]));
        let mut request = request("azure/my-gpt4", "unused", 0);
        request.options.shift_remove("api_base");

        let err = backend.completion(&request).unwrap_err();
        assert_eq!(
            err,
            CompletionError::Configuration {
                provider: "azure".into(),
                message: "no API base configured".into()
            }
        );
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_unencodable_api_key_is_configuration_error() {
        let backend = RouterBackend::with_env(env(&[]));
        let mut request = request("gpt-4o-mini", "http://unused.invalid", 3);
        request
            .options
            .insert("api_key".to_string(), json!("sk-line\nbreak"));

        let err = backend.completion(&request).unwrap_err();
        assert_eq!(
            err,
            CompletionError::Configuration {
                provider: "openai".into(),
                message: "Invalid API key format".into()
            }
        );
    }

    #[test]
    fn test_unknown_model_fails_before_sending() {
        let backend = RouterBackend::with_env(env(&[]));
        let err = backend
            .completion(&request("mystery-model", "http://unused.invalid", 0))
            .unwrap_err();
        assert_eq!(err, CompletionError::UnknownProvider("mystery-model".into()));
    }

    #[test]
    fn test_validate_environment_uses_env_source() {
        let backend = RouterBackend::with_env(env(&[("OPENAI_API_KEY", "sk")]));
        assert!(backend.validate_environment(Provider::OpenAI).keys_in_environment);

        let report = backend.validate_environment(Provider::Anthropic);
        assert_eq!(report.missing_keys, vec!["ANTHROPIC_API_KEY".to_string()]);
    }
}
