//! OpenAI chat-completions wire format
//!
//! Spoken by OpenAI itself and by every OpenAI-compatible endpoint the
//! router knows (Azure, Groq, Mistral, Gemini/Cohere compatibility layers,
//! Ollama, ...).

use serde::Serialize;

use crate::{error::CompletionError, messages::ChatMessage};

use super::{with_options, CompletionRequest, CompletionResponse};

#[derive(Debug, Clone, Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f64,
    max_tokens: u32,
    top_p: f64,
}

/// Build the JSON body for `POST /chat/completions`
///
/// `model` is the provider-side model name (routing prefix stripped).
///
/// # Errors
///
/// Returns an error if the request cannot be serialized
pub fn request_body(
    model: &str,
    request: &CompletionRequest,
) -> Result<serde_json::Value, CompletionError> {
    let body = OpenAIRequest {
        model,
        messages: &request.messages,
        temperature: request.temperature,
        max_tokens: request.max_tokens,
        top_p: request.top_p,
    };
    with_options(&body, &request.options)
}

/// Decode a chat-completions response body
///
/// # Errors
///
/// Returns [`CompletionError::InvalidResponse`] if the body is not a
/// chat-completions object
pub fn parse_response(body: &str) -> Result<CompletionResponse, CompletionError> {
    serde_json::from_str(body).map_err(|e| CompletionError::InvalidResponse(e.to_string()))
}

/// Endpoint URL for a chat-completions call
#[must_use]
pub fn endpoint(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim_end_matches('/'))
}

/// Azure routes by deployment and pins an API version
#[must_use]
pub fn azure_endpoint(base_url: &str, deployment: &str, api_version: &str) -> String {
    format!(
        "{}/openai/deployments/{deployment}/chat/completions?api-version={api_version}",
        base_url.trim_end_matches('/')
    )
}
