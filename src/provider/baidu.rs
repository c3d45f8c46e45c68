//! Baidu ERNIE adapter and its OAuth-style token exchange.
//!
//! Baidu is the only vendor with a two-step flow: the API key and secret key
//! are first traded for a short-lived `access_token`, which then rides as a
//! query parameter on the chat call. The dispatcher runs the exchange and hands
//! the token into [`VendorAdapter::build_request`]. Streaming frames follow the
//! OpenAI `data:` framing but put incremental text under `result`.

use std::collections::HashMap;

use serde_json::{Map, Value, json};

use crate::config::{DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, ProviderProfile};
use crate::error::LLMError;
use crate::http::{HttpRequest, HttpTransport};
use crate::types::{ChatRequest, Credentials};

use super::{FrameEvent, VendorAdapter, data_payload};

pub struct BaiduAdapter;

impl VendorAdapter for BaiduAdapter {
    fn name(&self) -> &'static str {
        "baidu"
    }

    fn build_request(
        &self,
        request: &ChatRequest,
        profile: &ProviderProfile,
        streaming: bool,
        access_token: Option<&str>,
    ) -> Result<HttpRequest, LLMError> {
        let token = access_token.ok_or_else(|| {
            LLMError::config("baidu requests require an exchanged access token")
        })?;
        let url = format!(
            "{}?access_token={token}",
            profile.endpoint(&request.model, "")
        );

        let messages: Vec<Value> = request
            .messages
            .iter()
            .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
            .collect();

        let mut body = Map::new();
        body.insert("messages".to_string(), json!(messages));
        body.insert("stream".to_string(), json!(streaming));
        body.insert(
            "temperature".to_string(),
            json!(request.params.temperature.unwrap_or(DEFAULT_TEMPERATURE)),
        );
        body.insert(
            "max_output_tokens".to_string(),
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
        if payload.trim() == "[DONE]" {
            return FrameEvent::Done;
        }
        let Ok(value) = serde_json::from_str::<Value>(payload) else {
            return FrameEvent::Ignore;
        };
        if let Some(message) = value.get("error_msg").and_then(Value::as_str) {
            return FrameEvent::Error(message.to_string());
        }
        // Some relays re-frame ERNIE output in OpenAI deltas; accept both.
        if let Some(text) = value
            .pointer("/choices/0/delta/content")
            .and_then(Value::as_str)
        {
            return FrameEvent::Delta(text.to_string());
        }
        // The `is_end` flag marks the last frame; its text still counts and
        // end-of-body completes the stream.
        match value.get("result").and_then(Value::as_str) {
            Some(text) => FrameEvent::Delta(text.to_string()),
            None => FrameEvent::Ignore,
        }
    }

    fn requires_token_exchange(&self) -> bool {
        true
    }
}

/// Trades the API key pair for a bearer token on Baidu's OAuth endpoint.
///
/// Every failure on this path maps to [`LLMError::TokenExchange`] so callers can
/// tell a credential problem from a chat-call problem.
pub(crate) async fn exchange_access_token(
    transport: &dyn HttpTransport,
    profile: &ProviderProfile,
    credentials: &Credentials,
) -> Result<String, LLMError> {
    let secret = credentials
        .secret_key
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| LLMError::config("baidu requires a secret key"))?;

    let url = format!(
        "{}/oauth/2.0/token?grant_type=client_credentials&client_id={}&client_secret={}",
        profile.base_url.trim_end_matches('/'),
        credentials.api_key,
        secret,
    );

    let response = transport
        .send(HttpRequest::post_empty(url))
        .await
        .map_err(|err| LLMError::TokenExchange {
            message: err.to_string(),
        })?;

    let value: Value =
        serde_json::from_slice(&response.body).map_err(|err| LLMError::TokenExchange {
            message: format!("unreadable token response: {err}"),
        })?;

    match value.get("access_token").and_then(Value::as_str) {
        Some(token) if !token.is_empty() => Ok(token.to_string()),
        _ => {
            let detail = value
                .get("error_description")
                .or_else(|| value.get("error"))
                .and_then(Value::as_str)
                .unwrap_or("no access_token in response");
            Err(LLMError::TokenExchange {
                message: detail.to_string(),
            })
        }
    }
}
