//! Google Generative Language (Gemini) adapter.
//!
//! Gemini authenticates through a `key` query parameter, renames roles
//! (`assistant` becomes `model`, the system prompt rides in `systemInstruction`),
//! and streams cumulative snapshots: each SSE frame carries the full text so
//! far, which the normalizer diffs into deltas. There is no done-marker; the
//! stream ends when the body ends.

use std::collections::HashMap;

use serde_json::{Map, Value, json};

use crate::config::{DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, ProviderProfile};
use crate::error::LLMError;
use crate::http::HttpRequest;
use crate::types::{ChatRequest, Role};

use super::{FrameEvent, VendorAdapter, data_payload};

pub struct GeminiAdapter;

impl VendorAdapter for GeminiAdapter {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn build_request(
        &self,
        request: &ChatRequest,
        profile: &ProviderProfile,
        streaming: bool,
        _access_token: Option<&str>,
    ) -> Result<HttpRequest, LLMError> {
        let mut url = profile.endpoint(&request.model, &request.credentials.api_key);
        if !streaming {
            // The default profile path targets the streaming action; the
            // buffered endpoint drops the SSE hint alongside it.
            url = url.replace(":streamGenerateContent?alt=sse&", ":generateContent?");
        }

        let (system, turns) = request.split_system();
        let contents: Vec<Value> = turns
            .iter()
            .map(|m| {
                let role = match m.role {
                    Role::Assistant => "model",
                    _ => "user",
                };
                json!({ "role": role, "parts": [{ "text": m.content }] })
            })
            .collect();

        let mut body = Map::new();
        body.insert("contents".to_string(), json!(contents));
        if let Some(system) = system {
            body.insert(
                "systemInstruction".to_string(),
                json!({ "parts": [{ "text": system.content }] }),
            );
        }
        let mut generation = Map::new();
        generation.insert(
            "temperature".to_string(),
            json!(request.params.temperature.unwrap_or(DEFAULT_TEMPERATURE)),
        );
        generation.insert(
            "maxOutputTokens".to_string(),
            json!(request.params.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)),
        );
        if let Some(top_p) = request.params.top_p {
            generation.insert("topP".to_string(), json!(top_p));
        }
        for (key, value) in &request.params.extra {
            generation.insert(key.clone(), value.clone());
        }
        body.insert("generationConfig".to_string(), Value::Object(generation));

        let payload = serde_json::to_vec(&Value::Object(body)).map_err(|err| {
            LLMError::Validation {
                message: format!("failed to serialize request: {err}"),
            }
        })?;

        // The key is already in the URL; no auth header.
        let headers = HashMap::from([(
            "Content-Type".to_string(),
            "application/json".to_string(),
        )]);

        Ok(HttpRequest::post_json(url, payload).with_headers(headers))
    }

    fn parse_line(&self, line: &str) -> FrameEvent {
        let Some(payload) = data_payload(line) else {
            return FrameEvent::Ignore;
        };
        let Ok(value) = serde_json::from_str::<Value>(payload) else {
            return FrameEvent::Ignore;
        };
        if let Some(message) = value.pointer("/error/message").and_then(Value::as_str) {
            return FrameEvent::Error(message.to_string());
        }
        match value
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(Value::as_str)
        {
            Some(text) => FrameEvent::Cumulative(text.to_string()),
            // Safety-block and citation frames carry no text part.
            None => FrameEvent::Ignore,
        }
    }
}
