//! 配置层 供应商端点与全局默认值
//!
//! [`ProviderProfile`] carries the per-vendor wiring (base URL, chat path,
//! result pointer); [`Profiles`] is the registry the dispatcher resolves
//! against; [`Settings`] holds the process-wide knobs.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::dispatch::Dispatcher;
use crate::error::LLMError;
use crate::http::DynHttpTransport;
use crate::http::reqwest::ReqwestTransport;
use crate::types::ProviderKind;

/// Sampling temperature applied when the caller leaves it unset.
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
/// Completion length cap applied when the caller leaves it unset.
pub const DEFAULT_MAX_TOKENS: u64 = 2000;
/// Model resolved when a request names neither model nor provider overrides.
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
/// Whole-request timeout applied by the default transport.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Retry budget advertised to callers that wrap the dispatcher.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Per-vendor endpoint wiring.
///
/// `chat_path` may contain `{model}` and `{key}` placeholders; [`Self::endpoint`]
/// substitutes them. `result_pointer` is the JSON pointer to the completion text
/// in a non-streaming response body, kept in configuration so endpoint drift is
/// fixable without touching adapter code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderProfile {
    pub base_url: String,
    pub chat_path: String,
    pub supports_streaming: bool,
    pub result_pointer: String,
}

impl ProviderProfile {
    /// Renders the chat URL, substituting `{model}` and `{key}`.
    pub fn endpoint(&self, model: &str, api_key: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        let path = self
            .chat_path
            .replace("{model}", model)
            .replace("{key}", api_key);
        format!("{base}{path}")
    }
}

/// Registry of provider profiles the dispatcher resolves against.
#[derive(Debug, Clone)]
pub struct Profiles {
    map: HashMap<ProviderKind, ProviderProfile>,
}

impl Default for Profiles {
    fn default() -> Self {
        let mut map = HashMap::new();
        map.insert(
            ProviderKind::Openai,
            ProviderProfile {
                base_url: "https://api.openai.com/v1".to_string(),
                chat_path: "/chat/completions".to_string(),
                supports_streaming: true,
                result_pointer: "/choices/0/message/content".to_string(),
            },
        );
        map.insert(
            ProviderKind::Anthropic,
            ProviderProfile {
                base_url: "https://api.anthropic.com".to_string(),
                chat_path: "/v1/messages".to_string(),
                supports_streaming: true,
                result_pointer: "/content/0/text".to_string(),
            },
        );
        map.insert(
            ProviderKind::Gemini,
            ProviderProfile {
                base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
                chat_path: "/models/{model}:streamGenerateContent?alt=sse&key={key}".to_string(),
                supports_streaming: true,
                result_pointer: "/candidates/0/content/parts/0/text".to_string(),
            },
        );
        map.insert(
            ProviderKind::Zhipu,
            ProviderProfile {
                base_url: "https://open.bigmodel.cn/api/paas/v4".to_string(),
                chat_path: "/chat/completions".to_string(),
                supports_streaming: true,
                result_pointer: "/choices/0/message/content".to_string(),
            },
        );
        map.insert(
            ProviderKind::Qwen,
            ProviderProfile {
                base_url: "https://dashscope.aliyuncs.com/api/v1".to_string(),
                chat_path: "/services/aigc/text-generation/generation".to_string(),
                supports_streaming: true,
                result_pointer: "/output/text".to_string(),
            },
        );
        map.insert(
            ProviderKind::Baidu,
            ProviderProfile {
                base_url: "https://aip.baidubce.com".to_string(),
                chat_path: "/rpc/2.0/ai/v1/chat/eb-instant".to_string(),
                supports_streaming: true,
                result_pointer: "/result".to_string(),
            },
        );
        Self { map }
    }
}

impl Profiles {
    pub fn get(&self, kind: ProviderKind) -> Option<&ProviderProfile> {
        self.map.get(&kind)
    }

    /// Registers or replaces a profile. This is how `Custom` endpoints come to
    /// exist: they have no default entry.
    pub fn insert(&mut self, kind: ProviderKind, profile: ProviderProfile) {
        self.map.insert(kind, profile);
    }

    /// Overrides a known provider's base URL, keeping the rest of its profile.
    pub fn override_base_url(&mut self, kind: ProviderKind, base_url: impl Into<String>) {
        if let Some(profile) = self.map.get_mut(&kind) {
            profile.base_url = base_url.into();
        }
    }
}

/// Maps a known model identifier to its provider.
///
/// Requests naming a model outside this table must carry an explicit provider
/// tag; otherwise the dispatcher rejects them with
/// [`LLMError::UnsupportedModel`].
pub fn provider_for_model(model: &str) -> Option<ProviderKind> {
    match model {
        "gpt-4" | "gpt-4-turbo" | "gpt-3.5-turbo" => Some(ProviderKind::Openai),
        "claude-3-opus" | "claude-3-sonnet" | "claude-3-haiku" => Some(ProviderKind::Anthropic),
        "gemini-pro" | "gemini-pro-vision" => Some(ProviderKind::Gemini),
        "glm-4" | "glm-3-turbo" => Some(ProviderKind::Zhipu),
        "qwen-turbo" | "qwen-plus" | "qwen-max" => Some(ProviderKind::Qwen),
        "ernie-bot" | "ernie-bot-turbo" => Some(ProviderKind::Baidu),
        _ => None,
    }
}

/// Process-wide defaults and transport options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Model assumed by callers that do not pick one.
    pub default_model: String,
    /// Outbound proxy URL, e.g. `http://127.0.0.1:7890`.
    pub proxy: Option<String>,
    /// Whole-request timeout, streaming included.
    pub timeout: Duration,
    /// Retry budget for callers that wrap the dispatcher in a retry loop.
    pub max_retries: u32,
    /// Per-provider base URL overrides, applied over the built-in defaults.
    #[serde(default)]
    pub base_urls: HashMap<ProviderKind, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_model: DEFAULT_MODEL.to_string(),
            proxy: None,
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            base_urls: HashMap::new(),
        }
    }
}

impl Settings {
    /// Materializes the profile registry with this settings' URL overrides.
    pub fn profiles(&self) -> Profiles {
        let mut profiles = Profiles::default();
        for (kind, url) in &self.base_urls {
            profiles.override_base_url(*kind, url.clone());
        }
        profiles
    }
}

/// Builds a ready-to-use dispatcher from settings: reqwest transport with the
/// configured proxy and timeout, plus the overridden profile registry.
pub fn build_dispatcher(settings: &Settings) -> Result<Dispatcher, LLMError> {
    let transport = ReqwestTransport::with_options(settings.proxy.as_deref(), settings.timeout)?;
    let transport: DynHttpTransport = Arc::new(transport);
    Ok(Dispatcher::new(transport).with_profiles(settings.profiles()))
}
