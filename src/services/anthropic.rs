//! Anthropic messages wire format

use serde::{Deserialize, Serialize};

use crate::{
    error::CompletionError,
    messages::{ChatMessage, Role},
};

use super::{with_options, Choice, ChoiceMessage, CompletionRequest, CompletionResponse, Usage};

/// Value of the `anthropic-version` header
pub const API_VERSION: &str = "2023-06-01";

// Anthropic API types

#[derive(Debug, Clone, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    max_tokens: u32,
    temperature: f64,
    top_p: f64,
}

#[derive(Debug, Clone, Serialize)]
struct AnthropicMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicContentBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
struct AnthropicResponse {
    id: String,
    #[serde(default)]
    content: Vec<AnthropicContentBlock>,
    model: String,
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Clone, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

/// Build the JSON body for `POST /v1/messages`
///
/// System messages are lifted into the top-level `system` field.
///
/// # Errors
///
/// Returns an error if the request cannot be serialized
pub fn request_body(
    model: &str,
    request: &CompletionRequest,
) -> Result<serde_json::Value, CompletionError> {
    let (system, conversation): (Vec<&ChatMessage>, Vec<&ChatMessage>) = request
        .messages
        .iter()
        .partition(|m| m.role == Role::System);

    let system = if system.is_empty() {
        None
    } else {
        Some(
            system
                .iter()
                .map(|m| m.content.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
        )
    };

    let body = AnthropicRequest {
        model,
        messages: conversation
            .into_iter()
            .map(|m| AnthropicMessage {
                role: m.role.as_str(),
                content: &m.content,
            })
            .collect(),
        system,
        max_tokens: request.max_tokens,
        temperature: request.temperature,
        top_p: request.top_p,
    };
    with_options(&body, &request.options)
}

/// Decode a messages response into the choices shape
///
/// # Errors
///
/// Returns [`CompletionError::InvalidResponse`] if the body is not a
/// messages object
pub fn parse_response(body: &str) -> Result<CompletionResponse, CompletionError> {
    let response: AnthropicResponse =
        serde_json::from_str(body).map_err(|e| CompletionError::InvalidResponse(e.to_string()))?;

    let text: String = response
        .content
        .iter()
        .filter_map(|block| match block {
            AnthropicContentBlock::Text { text } => Some(text.as_str()),
            AnthropicContentBlock::Other => None,
        })
        .collect();

    Ok(CompletionResponse {
        id: Some(response.id),
        model: Some(response.model),
        choices: vec![Choice {
            index: 0,
            message: ChoiceMessage {
                role: "assistant".to_string(),
                content: Some(text),
            },
            finish_reason: response.stop_reason,
        }],
        usage: response.usage.map(|u| Usage {
            prompt_tokens: u.input_tokens,
            completion_tokens: u.output_tokens,
            total_tokens: u.input_tokens.saturating_add(u.output_tokens),
        }),
    })
}

/// Endpoint URL for a messages call
#[must_use]
pub fn endpoint(base_url: &str) -> String {
    format!("{}/v1/messages", base_url.trim_end_matches('/'))
}
