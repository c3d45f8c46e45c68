//! OpenAI Chat Completions adapter, shared by Zhipu and custom endpoints.
//!
//! Zhipu's GLM API and most self-hosted gateways speak this exact dialect, so a
//! single adapter covers all three provider tags; only the profile differs.

use std::collections::HashMap;

use serde_json::{Map, Value, json};

use crate::config::{DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, ProviderProfile};
use crate::error::LLMError;
use crate::http::HttpRequest;
use crate::types::ChatRequest;

use super::{FrameEvent, VendorAdapter, data_payload};

pub struct OpenAiCompatAdapter;

impl VendorAdapter for OpenAiCompatAdapter {
    fn name(&self) -> &'static str {
        "openai_compat"
    }

    fn build_request(
        &self,
        request: &ChatRequest,
        profile: &ProviderProfile,
        streaming: bool,
        _access_token: Option<&str>,
    ) -> Result<HttpRequest, LLMError> {
        let url = profile.endpoint(&request.model, &request.credentials.api_key);

        let messages: Vec<Value> = request
            .messages
            .iter()
            .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
            .collect();

        let mut body = Map::new();
        body.insert("model".to_string(), json!(request.model));
        body.insert("messages".to_string(), json!(messages));
        body.insert("stream".to_string(), json!(streaming));
        body.insert(
            "temperature".to_string(),
            json!(request.params.temperature.unwrap_or(DEFAULT_TEMPERATURE)),
        );
        body.insert(
            "max_tokens".to_string(),
            json!(request.params.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)),
        );
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
            (
                "Authorization".to_string(),
                format!("Bearer {}", request.credentials.api_key),
            ),
        ]);

        Ok(HttpRequest::post_json(url, payload).with_headers(headers))
    }

    fn parse_line(&self, line: &str) -> FrameEvent {
        let Some(payload) = data_payload(line) else {
            return FrameEvent::Ignore;
        };
        if payload.trim() == "[DONE]" {
            return FrameEvent::Done;
        }
        let Ok(value) = serde_json::from_str::<Value>(payload) else {
            return FrameEvent::Ignore;
        };
        match value
            .pointer("/choices/0/delta/content")
            .and_then(Value::as_str)
        {
            Some(text) => FrameEvent::Delta(text.to_string()),
            // Role-only deltas and finish-reason frames carry no content.
            None => FrameEvent::Ignore,
        }
    }
}
