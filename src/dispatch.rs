//! 请求调度 解析供应商 校验凭据 发起调用
//!
//! The [`Dispatcher`] is the crate's front door. It resolves which vendor
//! serves a request, fails fast on missing credentials before anything touches
//! the network, runs Baidu's token exchange when needed, and hands streaming
//! bodies to the normalizer.

use crate::config::{ProviderProfile, Profiles, provider_for_model};
use crate::error::LLMError;
use crate::http::DynHttpTransport;
use crate::provider::{
    ChatStream, VendorAdapter, adapter_for, baidu, collect_stream_text, upstream_error,
};
use crate::stream::NormalizedStream;
use crate::types::{CancelToken, ChatRequest, ChatResponse, ProviderKind};

/// Outcome of [`Dispatcher::send`], shaped by the request's `streaming` flag.
pub enum ChatReply {
    /// Normalized token stream.
    Stream(ChatStream),
    /// Fully buffered response.
    Full(ChatResponse),
}

/// Routes normalized requests to vendor adapters over a shared transport.
///
/// Cheap to clone-by-construction: it holds only an `Arc`'d transport and the
/// profile registry, and keeps no per-request state.
pub struct Dispatcher {
    transport: DynHttpTransport,
    profiles: Profiles,
}

impl Dispatcher {
    /// Creates a dispatcher with the default provider profiles.
    pub fn new(transport: DynHttpTransport) -> Self {
        Self {
            transport,
            profiles: Profiles::default(),
        }
    }

    /// Replaces the profile registry, e.g. with URL overrides from settings.
    pub fn with_profiles(mut self, profiles: Profiles) -> Self {
        self.profiles = profiles;
        self
    }

    pub fn profiles(&self) -> &Profiles {
        &self.profiles
    }

    /// Picks the provider: the explicit tag wins, otherwise the model table.
    fn resolve(
        &self,
        request: &ChatRequest,
    ) -> Result<(ProviderKind, &ProviderProfile), LLMError> {
        let kind = match request.provider {
            Some(kind) => kind,
            None => provider_for_model(&request.model).ok_or_else(|| {
                LLMError::UnsupportedModel {
                    model: request.model.clone(),
                }
            })?,
        };
        let profile = self
            .profiles
            .get(kind)
            .ok_or_else(|| LLMError::UnsupportedProvider {
                provider: kind.to_string(),
            })?;
        Ok((kind, profile))
    }

    /// Credential fast-fail, guaranteed to run before any network activity.
    fn check_credentials(kind: ProviderKind, request: &ChatRequest) -> Result<(), LLMError> {
        if request.credentials.api_key.trim().is_empty() {
            return Err(LLMError::config(format!("missing api key for {kind}")));
        }
        if kind == ProviderKind::Baidu
            && request
                .credentials
                .secret_key
                .as_deref()
                .map_or(true, |s| s.trim().is_empty())
        {
            return Err(LLMError::config("baidu requires a secret key"));
        }
        Ok(())
    }

    /// Resolves, validates, exchanges tokens when required, and builds the
    /// vendor HTTP request.
    async fn prepare(
        &self,
        request: &ChatRequest,
        streaming: bool,
    ) -> Result<(&'static dyn VendorAdapter, crate::http::HttpRequest), LLMError> {
        let (kind, profile) = self.resolve(request)?;
        Self::check_credentials(kind, request)?;
        if streaming && !profile.supports_streaming {
            return Err(LLMError::Validation {
                message: format!("provider {kind} does not support streaming"),
            });
        }
        let adapter = adapter_for(kind);

        let token = if adapter.requires_token_exchange() {
            let token =
                baidu::exchange_access_token(self.transport.as_ref(), profile, &request.credentials)
                    .await?;
            Some(token)
        } else {
            None
        };

        let http = adapter.build_request(request, profile, streaming, token.as_deref())?;
        tracing::debug!(provider = adapter.name(), model = %request.model, streaming, "dispatching chat request");
        Ok((adapter, http))
    }

    /// Buffered chat call. Extracts the completion text through the profile's
    /// result pointer and returns the raw body alongside it.
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LLMError> {
        let (kind, profile) = self.resolve(request)?;
        let (adapter, http) = self.prepare(request, false).await?;

        let response = self.transport.send(http).await?;
        if !(200..300).contains(&response.status) {
            let status = response.status;
            let body = response.into_string().unwrap_or_default();
            tracing::warn!(provider = %kind, status, "chat request rejected");
            return Err(upstream_error(status, &body));
        }

        let raw: serde_json::Value =
            serde_json::from_slice(&response.body).map_err(|err| {
                LLMError::provider(adapter.name(), format!("unreadable response body: {err}"))
            })?;
        let content = adapter.parse_full_response(profile, &raw)?;
        Ok(ChatResponse { content, raw })
    }

    /// Streaming chat call yielding normalized increments.
    pub async fn stream_chat(&self, request: &ChatRequest) -> Result<ChatStream, LLMError> {
        self.stream_chat_with_cancel(request, None).await
    }

    /// Like [`Self::stream_chat`], with a cancellation token checked between
    /// processed chunks.
    pub async fn stream_chat_with_cancel(
        &self,
        request: &ChatRequest,
        cancel: Option<CancelToken>,
    ) -> Result<ChatStream, LLMError> {
        let (adapter, http) = self.prepare(request, true).await?;

        let response = self.transport.send_stream(http).await?;
        if !(200..300).contains(&response.status) {
            let status = response.status;
            let body = collect_stream_text(response.body, adapter.name()).await?;
            tracing::warn!(provider = adapter.name(), status, "stream request rejected");
            return Err(upstream_error(status, &body));
        }

        Ok(NormalizedStream::boxed(response.body, adapter, cancel))
    }

    /// Single entry point branching on the request's `streaming` flag.
    pub async fn send(&self, request: &ChatRequest) -> Result<ChatReply, LLMError> {
        if request.streaming {
            Ok(ChatReply::Stream(self.stream_chat(request).await?))
        } else {
            Ok(ChatReply::Full(self.chat(request).await?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use futures_util::{StreamExt, stream};

    use crate::http::{
        HttpBodyStream, HttpRequest, HttpResponse, HttpStreamResponse, HttpTransport,
    };
    use crate::types::{ChatChunk, Credentials, GenerationParams, Message};

    /// Counts calls; panics when a test expects the network to stay untouched.
    struct CountingTransport {
        calls: AtomicUsize,
        allowed: bool,
    }

    impl CountingTransport {
        fn denied() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                allowed: false,
            })
        }
    }

    #[async_trait]
    impl HttpTransport for CountingTransport {
        async fn send(&self, _request: HttpRequest) -> Result<HttpResponse, LLMError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert!(self.allowed, "transport must not be reached");
            unreachable!()
        }

        async fn send_stream(&self, _request: HttpRequest) -> Result<HttpStreamResponse, LLMError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert!(self.allowed, "transport must not be reached");
            unreachable!()
        }
    }

    /// Replays scripted responses and records the URLs it was asked for.
    struct ScriptedTransport {
        responses: std::sync::Mutex<Vec<HttpResponse>>,
        stream_body: std::sync::Mutex<Option<(u16, Vec<u8>)>>,
        urls: std::sync::Mutex<Vec<String>>,
    }

    impl ScriptedTransport {
        fn new() -> Self {
            Self {
                responses: std::sync::Mutex::new(Vec::new()),
                stream_body: std::sync::Mutex::new(None),
                urls: std::sync::Mutex::new(Vec::new()),
            }
        }

        fn push_response(&self, status: u16, body: &str) {
            self.responses.lock().unwrap().push(HttpResponse {
                status,
                headers: HashMap::new(),
                body: body.as_bytes().to_vec(),
            });
        }

        fn set_stream(&self, status: u16, body: &str) {
            *self.stream_body.lock().unwrap() = Some((status, body.as_bytes().to_vec()));
        }

        fn urls(&self) -> Vec<String> {
            self.urls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HttpTransport for ScriptedTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, LLMError> {
            self.urls.lock().unwrap().push(request.url);
            let mut responses = self.responses.lock().unwrap();
            assert!(!responses.is_empty(), "unexpected buffered request");
            Ok(responses.remove(0))
        }

        async fn send_stream(&self, request: HttpRequest) -> Result<HttpStreamResponse, LLMError> {
            self.urls.lock().unwrap().push(request.url);
            let (status, body) = self
                .stream_body
                .lock()
                .unwrap()
                .take()
                .expect("unexpected stream request");
            let stream: HttpBodyStream = Box::pin(stream::iter(vec![Ok(body)]));
            Ok(HttpStreamResponse {
                status,
                headers: HashMap::new(),
                body: stream,
            })
        }
    }

    fn request(model: &str, streaming: bool) -> ChatRequest {
        ChatRequest {
            model: model.to_string(),
            provider: None,
            messages: vec![Message::user("hi")],
            streaming,
            params: GenerationParams::default(),
            credentials: Credentials::api_key("key"),
        }
    }

    #[tokio::test]
    async fn unknown_model_without_provider_is_rejected() {
        let transport = CountingTransport::denied();
        let dispatcher = Dispatcher::new(transport.clone());
        let err = dispatcher
            .chat(&request("made-up-model", false))
            .await
            .expect_err("should fail");
        assert!(matches!(err, LLMError::UnsupportedModel { .. }));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_api_key_fails_before_any_network_call() {
        let transport = CountingTransport::denied();
        let dispatcher = Dispatcher::new(transport.clone());
        let mut req = request("gpt-4", true);
        req.credentials.api_key = "  ".to_string();
        let err = dispatcher
            .stream_chat(&req)
            .await
            .map(|_| ())
            .expect_err("should fail");
        assert!(matches!(err, LLMError::Config { .. }));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn baidu_without_secret_fails_before_token_exchange() {
        let transport = CountingTransport::denied();
        let dispatcher = Dispatcher::new(transport.clone());
        let err = dispatcher
            .chat(&request("ernie-bot", false))
            .await
            .expect_err("should fail");
        assert!(matches!(err, LLMError::Config { .. }));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn explicit_provider_overrides_model_table() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_response(200, r#"{"choices":[{"message":{"content":"ok"}}]}"#);
        let dispatcher = Dispatcher::new(transport.clone());

        let mut req = request("my-private-model", false);
        req.provider = Some(ProviderKind::Openai);
        let response = dispatcher.chat(&req).await.expect("chat");
        assert_eq!(response.content, "ok");
        assert_eq!(
            transport.urls(),
            vec!["https://api.openai.com/v1/chat/completions".to_string()]
        );
    }

    #[tokio::test]
    async fn chat_maps_non_success_status_to_upstream_error() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_response(401, r#"{"error":{"message":"bad key"}}"#);
        let dispatcher = Dispatcher::new(transport);

        let err = dispatcher
            .chat(&request("gpt-4", false))
            .await
            .expect_err("should fail");
        match err {
            LLMError::Upstream { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "bad key");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn stream_chat_normalizes_openai_frames() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.set_stream(
            200,
            concat!(
                "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
                "data: [DONE]\n\n",
            ),
        );
        let dispatcher = Dispatcher::new(transport);

        let mut stream = dispatcher
            .stream_chat(&request("gpt-4", true))
            .await
            .expect("stream");
        let mut deltas = Vec::new();
        let mut full = None;
        while let Some(item) = stream.next().await {
            match item.expect("chunk") {
                ChatChunk::Delta(update) => deltas.push(update.delta),
                ChatChunk::Completed { full_text } => full = Some(full_text),
            }
        }
        assert_eq!(deltas, vec!["Hel", "lo"]);
        assert_eq!(full.as_deref(), Some("Hello"));
    }

    #[tokio::test]
    async fn stream_chat_surfaces_upstream_error_body() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.set_stream(429, r#"{"error":{"message":"rate limited"}}"#);
        let dispatcher = Dispatcher::new(transport);

        let err = dispatcher
            .stream_chat(&request("gpt-4", true))
            .await
            .map(|_| ())
            .expect_err("should fail");
        match err {
            LLMError::Upstream { status, message } => {
                assert_eq!(status, 429);
                assert_eq!(message, "rate limited");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn baidu_flow_exchanges_token_then_calls_chat() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_response(200, r#"{"access_token":"tok-9"}"#);
        transport.push_response(200, r#"{"result":"你好"}"#);
        let dispatcher = Dispatcher::new(transport.clone());

        let mut req = request("ernie-bot", false);
        req.credentials = Credentials::api_key("ak").with_secret("sk");
        let response = dispatcher.chat(&req).await.expect("chat");
        assert_eq!(response.content, "你好");

        let urls = transport.urls();
        assert_eq!(urls.len(), 2);
        assert!(urls[0].contains("/oauth/2.0/token"));
        assert!(urls[1].ends_with("?access_token=tok-9"));
    }

    #[tokio::test]
    async fn baidu_token_failure_short_circuits() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_response(200, r#"{"error":"invalid_client"}"#);
        let dispatcher = Dispatcher::new(transport.clone());

        let mut req = request("ernie-bot", false);
        req.credentials = Credentials::api_key("ak").with_secret("sk");
        let err = dispatcher.chat(&req).await.expect_err("should fail");
        assert!(matches!(err, LLMError::TokenExchange { .. }));
        // Only the token endpoint was hit.
        assert_eq!(transport.urls().len(), 1);
    }

    #[tokio::test]
    async fn send_branches_on_streaming_flag() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_response(200, r#"{"choices":[{"message":{"content":"buffered"}}]}"#);
        let dispatcher = Dispatcher::new(transport);

        match dispatcher.send(&request("gpt-4", false)).await.expect("send") {
            ChatReply::Full(response) => assert_eq!(response.content, "buffered"),
            ChatReply::Stream(_) => panic!("expected buffered reply"),
        }
    }
}
