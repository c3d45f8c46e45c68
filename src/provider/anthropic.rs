//! Anthropic Messages API adapter.
//!
//! Differences from the OpenAI dialect: the API key travels in `x-api-key` with
//! a pinned `anthropic-version`, the system prompt is a top-level field rather
//! than a message, `max_tokens` is mandatory, and the stream is typed SSE events
//! (`content_block_delta`, `message_stop`) instead of bare chunks.

use std::collections::HashMap;

use serde_json::{Map, Value, json};

use crate::config::{DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, ProviderProfile};
use crate::error::LLMError;
use crate::http::HttpRequest;
use crate::types::{ChatRequest, Role};

use super::{FrameEvent, VendorAdapter, data_payload};

const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicAdapter;

impl VendorAdapter for AnthropicAdapter {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    fn build_request(
        &self,
        request: &ChatRequest,
        profile: &ProviderProfile,
        streaming: bool,
        _access_token: Option<&str>,
    ) -> Result<HttpRequest, LLMError> {
        let url = profile.endpoint(&request.model, &request.credentials.api_key);
        let (system, turns) = request.split_system();

        let messages: Vec<Value> = turns
            .iter()
            .map(|m| {
                let role = match m.role {
                    Role::Assistant => "assistant",
                    _ => "user",
                };
                json!({ "role": role, "content": m.content })
            })
            .collect();

        let mut body = Map::new();
        body.insert("model".to_string(), json!(request.model));
        body.insert("messages".to_string(), json!(messages));
        // Mandatory on this API, unlike everywhere else.
        body.insert(
            "max_tokens".to_string(),
            json!(request.params.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)),
        );
        body.insert(
            "temperature".to_string(),
            json!(request.params.temperature.unwrap_or(DEFAULT_TEMPERATURE)),
        );
        body.insert("stream".to_string(), json!(streaming));
        if let Some(system) = system {
            body.insert("system".to_string(), json!(system.content));
        }
        if let Some(top_p) = request.params.top_p {
            body.insert("top_p".to_string(), json!(top_p));
        }
        for (key, value) in &request.params.extra {
            body.insert(key.clone(), value.clone());
        }

        let payload = serde_json::to_vec(&Value::Object(body)).map_err(|err| {
            LLMError::Validation {
                message: format!("failed to serialize request: {err}"),
            }
        })?;

        let headers = HashMap::from([
            ("Content-Type".to_string(), "application/json".to_string()),
            ("Accept".to_string(), "text/event-stream".to_string()),
            ("x-api-key".to_string(), request.credentials.api_key.clone()),
            (
                "anthropic-version".to_string(),
                ANTHROPIC_VERSION.to_string(),
            ),
        ]);

        Ok(HttpRequest::post_json(url, payload).with_headers(headers))
    }

    fn parse_line(&self, line: &str) -> FrameEvent {
        let Some(payload) = data_payload(line) else {
            return FrameEvent::Ignore;
        };
        let Ok(value) = serde_json::from_str::<Value>(payload) else {
            return FrameEvent::Ignore;
        };
        match value.get("type").and_then(Value::as_str) {
            Some("content_block_delta") => {
                match value.pointer("/delta/text").and_then(Value::as_str) {
                    Some(text) => FrameEvent::Delta(text.to_string()),
                    None => FrameEvent::Ignore,
                }
            }
            Some("message_stop") => FrameEvent::Done,
            Some("error") => {
                let message = value
                    .pointer("/error/message")
                    .and_then(Value::as_str)
                    .unwrap_or("unspecified stream error");
                FrameEvent::Error(message.to_string())
            }
            // message_start, content_block_start/stop, ping, message_delta.
            _ => FrameEvent::Ignore,
        }
    }
}
