//! # nagare-llm
//!
//! 多供应商 LLM 流式响应归一化库
//!
//! Talks to OpenAI-compatible endpoints, Anthropic, Google Gemini, Alibaba
//! DashScope (Qwen), and Baidu ERNIE through one request shape, and normalizes
//! their divergent streaming dialects into a uniform increment stream: zero or
//! more `{delta, cumulative}` items followed by exactly one terminal outcome.
//!
//! ```no_run
//! use nagare_llm::config::{Settings, build_dispatcher};
//! use nagare_llm::types::{ChatRequest, Credentials, GenerationParams, Message};
//! use futures_util::StreamExt;
//!
//! # async fn demo() -> Result<(), nagare_llm::LLMError> {
//! let dispatcher = build_dispatcher(&Settings::default())?;
//! let request = ChatRequest {
//!     model: "gpt-4".to_string(),
//!     provider: None,
//!     messages: vec![Message::user("hello")],
//!     streaming: true,
//!     params: GenerationParams::default(),
//!     credentials: Credentials::api_key(std::env::var("OPENAI_API_KEY").unwrap_or_default()),
//! };
//! let mut stream = dispatcher.stream_chat(&request).await?;
//! while let Some(chunk) = stream.next().await {
//!     println!("{:?}", chunk?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod provider;
pub mod relay;
pub mod stream;
pub mod types;

pub use config::{Profiles, ProviderProfile, Settings, build_dispatcher};
pub use dispatch::{ChatReply, Dispatcher};
pub use error::LLMError;
pub use provider::{ChatStream, FrameEvent, VendorAdapter, adapter_for};
pub use relay::sse_relay;
pub use stream::{LineDecoder, NormalizedStream};
pub use types::{
    CancelToken, ChatChunk, ChatRequest, ChatResponse, Credentials, GenerationParams, Message,
    ProviderKind, Role, StreamUpdate,
};
