use std::pin::Pin;

use futures_core::Stream;
use futures_util::StreamExt;
use serde_json::Value;

use crate::config::ProviderProfile;
use crate::error::{LLMError, status_line};
use crate::http::{HttpBodyStream, HttpRequest};
use crate::types::{ChatChunk, ChatRequest, ProviderKind};

pub mod anthropic;
pub mod baidu;
pub mod gemini;
pub mod openai_compat;
pub mod qwen;

/// 流式响应别名
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<ChatChunk, LLMError>> + Send>>;

/// Parsed meaning of one decoded line in a vendor's streaming format.
///
/// `Delta` carries newly produced text; `Cumulative` carries the vendor's full
/// text-so-far snapshot (Gemini, Qwen's `output.text`). The distinction lives on
/// the event rather than the adapter because a single Qwen stream may mix both
/// conventions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameEvent {
    /// Incremental text fragment.
    Delta(String),
    /// Full generated text so far, to be diffed against the accumulator.
    Cumulative(String),
    /// Explicit completion marker. Nothing after it is processed.
    Done,
    /// Vendor-reported in-stream error. Terminal.
    Error(String),
    /// Structurally valid but content-free line: keep-alives, role-only deltas,
    /// or a frame too malformed to interpret. Never aborts the stream.
    Ignore,
}

/// 统一的供应商适配器 每个厂商实现该接口即可接入
///
/// Adapters are stateless unit structs: per-stream state (the accumulator, the
/// line buffer) lives in [`crate::stream::NormalizedStream`], so one adapter
/// instance serves any number of concurrent requests.
pub trait VendorAdapter: Send + Sync {
    /// Adapter name used in error messages and logs.
    fn name(&self) -> &'static str;

    /// Maps a normalized request onto the vendor's URL, headers, and JSON body.
    ///
    /// `streaming` selects the wire mode independently of `request.streaming` so
    /// the dispatcher can force either path. `access_token` carries the exchanged
    /// Baidu bearer and is `None` for every other vendor.
    fn build_request(
        &self,
        request: &ChatRequest,
        profile: &ProviderProfile,
        streaming: bool,
        access_token: Option<&str>,
    ) -> Result<HttpRequest, LLMError>;

    /// Classifies one decoded line. Malformed input maps to [`FrameEvent::Ignore`];
    /// this method never fails.
    fn parse_line(&self, line: &str) -> FrameEvent;

    /// Extracts the completion text from a non-streaming response body.
    ///
    /// The default implementation follows the profile's `result_pointer`, keeping
    /// the extraction path configuration rather than code.
    fn parse_full_response(
        &self,
        profile: &ProviderProfile,
        body: &Value,
    ) -> Result<String, LLMError> {
        body.pointer(&profile.result_pointer)
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| {
                LLMError::provider(
                    self.name(),
                    format!("no completion text at {}", profile.result_pointer),
                )
            })
    }

    /// Whether the dispatcher must run a token exchange before the chat call.
    fn requires_token_exchange(&self) -> bool {
        false
    }
}

/// Resolves the adapter implementation for a provider tag.
///
/// Zhipu and custom endpoints share the OpenAI-compatible adapter; they differ
/// only in their [`ProviderProfile`].
pub fn adapter_for(kind: ProviderKind) -> &'static dyn VendorAdapter {
    match kind {
        ProviderKind::Openai | ProviderKind::Zhipu | ProviderKind::Custom => {
            &openai_compat::OpenAiCompatAdapter
        }
        ProviderKind::Anthropic => &anthropic::AnthropicAdapter,
        ProviderKind::Gemini => &gemini::GeminiAdapter,
        ProviderKind::Qwen => &qwen::QwenAdapter,
        ProviderKind::Baidu => &baidu::BaiduAdapter,
    }
}

/// Strips the SSE `data:` prefix, tolerating the missing space Qwen emits.
///
/// Returns `None` for non-data lines (`event:`, comments, keep-alives).
pub(crate) fn data_payload(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("data:")?;
    Some(rest.strip_prefix(' ').unwrap_or(rest))
}

/// Builds an [`LLMError::Upstream`] from a non-success response body.
///
/// Probes the common vendor error shapes (`error.message`, `error_msg`,
/// `message`, bare `error` string) and falls back to `HTTP <status>: <reason>`
/// when the body yields nothing usable.
pub(crate) fn upstream_error(status: u16, body: &str) -> LLMError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            for pointer in ["/error/message", "/error_msg", "/message", "/error"] {
                if let Some(text) = value.pointer(pointer).and_then(Value::as_str) {
                    if !text.trim().is_empty() {
                        return Some(text.to_string());
                    }
                }
            }
            None
        })
        .unwrap_or_else(|| status_line(status));
    LLMError::Upstream { status, message }
}

/// Buffers an error-response body so the dispatcher can classify it.
pub(crate) async fn collect_stream_text(
    mut body: HttpBodyStream,
    provider: &'static str,
) -> Result<String, LLMError> {
    let mut bytes = Vec::new();
    while let Some(chunk) = body.next().await {
        bytes.extend_from_slice(&chunk?);
    }
    String::from_utf8(bytes).map_err(|err| LLMError::Provider {
        provider,
        message: format!("failed to decode stream error body: {err}"),
    })
}
