//! Shared data structures modeling normalized chat requests and stream items.
//!
//! These types normalize provider-specific payloads so the rest of the crate can
//! stay agnostic of individual API differences. Everything here is value-like and
//! constructed fresh per request; nothing is shared mutably between in-flight
//! calls.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Conversation role. The set is closed on purpose: vendor-specific roles such as
/// Gemini's `model` are mapped inside the adapters, never exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    /// Wire name shared by every OpenAI-style vendor.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One turn of a conversation, in conversation order.
///
/// A request's message list contains at most one [`Role::System`] message,
/// conventionally first; adapters rely on that invariant when a vendor wants the
/// system prompt in a dedicated field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// 供应商类型 闭合枚举 按请求构造时解析一次
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// api.openai.com, OpenAI Chat Completions wire format.
    Openai,
    /// api.anthropic.com Messages API.
    Anthropic,
    /// Google Generative Language API.
    Gemini,
    /// Zhipu GLM, OpenAI-compatible framing on its own base URL.
    Zhipu,
    /// Alibaba DashScope text generation.
    Qwen,
    /// Baidu ERNIE, requires an access-token exchange first.
    Baidu,
    /// Caller-supplied OpenAI-compatible endpoint.
    Custom,
}

impl ProviderKind {
    /// Stable snake_case tag, matching the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Openai => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Gemini => "gemini",
            ProviderKind::Zhipu => "zhipu",
            ProviderKind::Qwen => "qwen",
            ProviderKind::Baidu => "baidu",
            ProviderKind::Custom => "custom",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sampling and length parameters forwarded to the vendor.
///
/// Unset fields fall back to the process-wide defaults in
/// [`crate::config::Settings`]. `extra` entries are merged verbatim into the
/// vendor body for parameters this crate does not model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationParams {
    pub temperature: Option<f64>,
    pub max_tokens: Option<u64>,
    pub top_p: Option<f64>,
    #[serde(default)]
    pub extra: HashMap<String, Value>,
}

/// Credentials supplied by the caller for one request.
///
/// The dispatcher never reads ambient storage or environment variables; keys
/// travel with the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub api_key: String,
    /// Secondary secret, required by Baidu's token exchange only.
    pub secret_key: Option<String>,
}

impl Credentials {
    pub fn api_key(key: impl Into<String>) -> Self {
        Self {
            api_key: key.into(),
            secret_key: None,
        }
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret_key = Some(secret.into());
        self
    }
}

/// One chat turn as handed to the [`crate::dispatch::Dispatcher`].
///
/// Immutable once constructed and owned exclusively by the call that produced it.
/// When `provider` is `None` the dispatcher resolves it from the known model
/// table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    #[serde(default)]
    pub provider: Option<ProviderKind>,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub streaming: bool,
    #[serde(default)]
    pub params: GenerationParams,
    pub credentials: Credentials,
}

impl ChatRequest {
    /// Returns the leading system message, if any, and the remaining turns.
    ///
    /// Adapters for vendors with a dedicated system field (Anthropic, Gemini) use
    /// this split; OpenAI-style adapters keep the system turn inline.
    pub fn split_system(&self) -> (Option<&Message>, Vec<&Message>) {
        let system = self.messages.iter().find(|m| m.role == Role::System);
        let rest = self
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .collect();
        (system, rest)
    }
}

/// One normalized increment of generated text.
///
/// `cumulative` always equals the concatenation of every `delta` emitted so far
/// in the same stream; its length never decreases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamUpdate {
    /// Text newly produced since the previous increment. Never empty.
    pub delta: String,
    /// Full generated text so far.
    pub cumulative: String,
}

/// Item yielded by a normalized token stream.
///
/// A stream yields zero or more `Delta` items followed by exactly one terminal
/// item: `Completed` on success, or the stream's `Err(LLMError)` on failure.
/// Nothing follows the terminal item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatChunk {
    /// Incremental content.
    Delta(StreamUpdate),
    /// Terminal success carrying the final text. An empty stream completes with
    /// an empty string; absence of content is not a failure.
    Completed { full_text: String },
}

/// Result of a non-streaming chat call.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    /// Completion text extracted through the provider profile's result pointer.
    pub content: String,
    /// The vendor's JSON body, passed through untouched for callers that need it.
    pub raw: Value,
}

/// Cloneable cancellation flag checked between line-processing iterations.
///
/// Tripping the token finalizes the in-flight stream as a failure
/// ([`crate::error::LLMError::Aborted`]) rather than letting it hang.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent; visible to all clones.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_system_separates_leading_system_message() {
        let request = ChatRequest {
            model: "gpt-4".to_string(),
            provider: None,
            messages: vec![
                Message::system("be terse"),
                Message::user("hi"),
                Message::assistant("hello"),
            ],
            streaming: true,
            params: GenerationParams::default(),
            credentials: Credentials::api_key("k"),
        };

        let (system, rest) = request.split_system();
        assert_eq!(system.map(|m| m.content.as_str()), Some("be terse"));
        assert_eq!(rest.len(), 2);
        assert!(rest.iter().all(|m| m.role != Role::System));
    }

    #[test]
    fn cancel_token_is_shared_across_clones() {
        let token = CancelToken::new();
        let observer = token.clone();
        assert!(!observer.is_cancelled());
        token.cancel();
        assert!(observer.is_cancelled());
    }

    #[test]
    fn provider_kind_round_trips_through_serde() {
        let json = serde_json::to_string(&ProviderKind::Qwen).expect("serialize");
        assert_eq!(json, "\"qwen\"");
        let parsed: ProviderKind = serde_json::from_str("\"baidu\"").expect("deserialize");
        assert_eq!(parsed, ProviderKind::Baidu);
    }
}
