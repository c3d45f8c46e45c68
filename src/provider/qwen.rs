//! Alibaba DashScope (Qwen) adapter.
//!
//! DashScope nests the conversation under `input` and sampling knobs under
//! `parameters`, requires the `X-DashScope-SSE: enable` header for streaming,
//! and sometimes writes `data:` without the trailing space. Its frames are the
//! messiest of the supported vendors: depending on `incremental_output` and
//! gateway version, text arrives either as OpenAI-style deltas under
//! `choices[0].delta.content` or as full-text snapshots under `output.text`.
//! Both are classified per frame and the normalizer's diffing absorbs the
//! difference.

use std::collections::HashMap;

use serde_json::{Map, Value, json};

use crate::config::{DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, ProviderProfile};
use crate::error::LLMError;
use crate::http::HttpRequest;
use crate::types::ChatRequest;

use super::{FrameEvent, VendorAdapter, data_payload};

pub struct QwenAdapter;

impl VendorAdapter for QwenAdapter {
    fn name(&self) -> &'static str {
        "qwen"
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

        let mut parameters = Map::new();
        parameters.insert(
            "temperature".to_string(),
            json!(request.params.temperature.unwrap_or(DEFAULT_TEMPERATURE)),
        );
        parameters.insert(
            "max_tokens".to_string(),
            json!(request.params.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)),
        );
        if let Some(top_p) = request.params.top_p {
            parameters.insert("top_p".to_string(), json!(top_p));
        }
        if streaming {
            parameters.insert("incremental_output".to_string(), json!(true));
        }
        for (key, value) in &request.params.extra {
            parameters.insert(key.clone(), value.clone());
        }

        let body = json!({
            "model": request.model,
            "input": { "messages": messages },
            "parameters": Value::Object(parameters),
        });
        let payload = serde_json::to_vec(&body).map_err(|err| LLMError::Validation {
            message: format!("failed to serialize request: {err}"),
        })?;

        let mut headers = HashMap::from([
            ("Content-Type".to_string(), "application/json".to_string()),
            (
                "Authorization".to_string(),
                format!("Bearer {}", request.credentials.api_key),
            ),
        ]);
        if streaming {
            headers.insert("X-DashScope-SSE".to_string(), "enable".to_string());
            headers.insert("Accept".to_string(), "text/event-stream".to_string());
        }

        Ok(HttpRequest::post_json(url, payload).with_headers(headers))
    }

    fn parse_line(&self, line: &str) -> FrameEvent {
        let Some(payload) = data_payload(line) else {
            return FrameEvent::Ignore;
        };
        let Ok(value) = serde_json::from_str::<Value>(payload) else {
            return FrameEvent::Ignore;
        };
        if let Some(text) = value
            .pointer("/choices/0/delta/content")
            .and_then(Value::as_str)
        {
            return FrameEvent::Delta(text.to_string());
        }
        if let Some(text) = value.pointer("/output/text").and_then(Value::as_str) {
            // Snapshot convention. A final frame may carry both text and
            // finish_reason; the text wins and end-of-body completes the stream.
            return FrameEvent::Cumulative(text.to_string());
        }
        if value
            .pointer("/output/finish_reason")
            .and_then(Value::as_str)
            == Some("stop")
        {
            return FrameEvent::Done;
        }
        if let Some(message) = value.get("message").and_then(Value::as_str) {
            if value.get("code").is_some() {
                return FrameEvent::Error(message.to_string());
            }
        }
        FrameEvent::Ignore
    }
}
