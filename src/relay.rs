//! Re-emits a normalized stream as outbound SSE frames for browser clients.
//!
//! The wire contract is intentionally tiny: one `data: {"content": delta}`
//! frame per increment, a final `data: {"fullContent": text}` frame on success,
//! or a single `data: {"error": message}` frame on failure. The frame stream
//! always ends after the terminal frame, whatever the inner stream does.

use std::pin::Pin;

use futures_core::Stream;
use futures_util::{StreamExt, stream};
use serde_json::json;

use crate::provider::ChatStream;
use crate::types::ChatChunk;

/// Outbound byte frames, ready to write to an SSE response body.
pub type SseFrameStream = Pin<Box<dyn Stream<Item = Vec<u8>> + Send>>;

fn frame(value: serde_json::Value) -> Vec<u8> {
    format!("data: {value}\n\n").into_bytes()
}

/// Wraps a normalized chat stream into SSE frames.
pub fn sse_relay(inner: ChatStream) -> SseFrameStream {
    Box::pin(stream::unfold(
        (inner, false),
        |(mut inner, done)| async move {
            if done {
                return None;
            }
            match inner.next().await {
                Some(Ok(ChatChunk::Delta(update))) => {
                    Some((frame(json!({ "content": update.delta })), (inner, false)))
                }
                Some(Ok(ChatChunk::Completed { full_text })) => {
                    Some((frame(json!({ "fullContent": full_text })), (inner, true)))
                }
                Some(Err(err)) => {
                    Some((frame(json!({ "error": err.to_string() })), (inner, true)))
                }
                None => None,
            }
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::error::LLMError;
    use crate::types::StreamUpdate;

    fn chunks(items: Vec<Result<ChatChunk, LLMError>>) -> ChatStream {
        Box::pin(stream::iter(items))
    }

    fn update(delta: &str, cumulative: &str) -> ChatChunk {
        ChatChunk::Delta(StreamUpdate {
            delta: delta.to_string(),
            cumulative: cumulative.to_string(),
        })
    }

    async fn collect(mut frames: SseFrameStream) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(bytes) = frames.next().await {
            out.push(String::from_utf8(bytes).expect("utf8 frame"));
        }
        out
    }

    #[tokio::test]
    async fn relays_deltas_then_full_content() {
        let inner = chunks(vec![
            Ok(update("Hel", "Hel")),
            Ok(update("lo", "Hello")),
            Ok(ChatChunk::Completed {
                full_text: "Hello".to_string(),
            }),
        ]);
        let frames = collect(sse_relay(inner)).await;
        assert_eq!(
            frames,
            vec![
                "data: {\"content\":\"Hel\"}\n\n",
                "data: {\"content\":\"lo\"}\n\n",
                "data: {\"fullContent\":\"Hello\"}\n\n",
            ]
        );
    }

    #[tokio::test]
    async fn failure_emits_single_error_frame_and_closes() {
        let inner = chunks(vec![
            Ok(update("Hi", "Hi")),
            Err(LLMError::transport("connection reset")),
            // Anything after the terminal item must not leak out.
            Ok(update("ghost", "ghost")),
        ]);
        let frames = collect(sse_relay(inner)).await;
        assert_eq!(frames.len(), 2);
        assert!(frames[1].starts_with("data: {\"error\":"));
        assert!(frames[1].contains("connection reset"));
    }

    #[tokio::test]
    async fn empty_stream_relays_nothing() {
        let frames = collect(sse_relay(chunks(vec![]))).await;
        assert!(frames.is_empty());
    }
}
