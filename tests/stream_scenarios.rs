//! End-to-end normalization scenarios: real adapters fed with recorded vendor
//! frames through in-memory bodies.

use futures_util::stream;

use nagare_llm::http::HttpBodyStream;
use nagare_llm::{ChatChunk, LLMError, NormalizedStream, ProviderKind, adapter_for};

fn body(chunks: Vec<Result<Vec<u8>, LLMError>>) -> HttpBodyStream {
    Box::pin(stream::iter(chunks))
}

fn ok_body(parts: &[&str]) -> HttpBodyStream {
    body(parts.iter().map(|p| Ok(p.as_bytes().to_vec())).collect())
}

async fn run(kind: ProviderKind, body: HttpBodyStream) -> Vec<Result<ChatChunk, LLMError>> {
    use futures_util::StreamExt;
    let mut stream = NormalizedStream::new(body, adapter_for(kind), None);
    let mut items = Vec::new();
    while let Some(item) = stream.next().await {
        items.push(item);
    }
    items
}

fn deltas(items: &[Result<ChatChunk, LLMError>]) -> Vec<&str> {
    items
        .iter()
        .filter_map(|item| match item {
            Ok(ChatChunk::Delta(update)) => Some(update.delta.as_str()),
            _ => None,
        })
        .collect()
}

fn completed(items: &[Result<ChatChunk, LLMError>]) -> Option<&str> {
    items.iter().find_map(|item| match item {
        Ok(ChatChunk::Completed { full_text }) => Some(full_text.as_str()),
        _ => None,
    })
}

#[tokio::test]
async fn openai_delta_stream_reaches_done_marker() {
    let items = run(
        ProviderKind::Openai,
        ok_body(&[
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\ndata: [DONE]\n\n",
        ]),
    )
    .await;

    assert_eq!(deltas(&items), vec!["Hel", "lo"]);
    assert_eq!(completed(&items), Some("Hello"));
    assert_eq!(items.len(), 3);
}

#[tokio::test]
async fn gemini_cumulative_stream_is_diffed_into_deltas() {
    let items = run(
        ProviderKind::Gemini,
        ok_body(&[
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"H\"}]}}]}\n",
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"He\"}]}}]}\n",
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Hello\"}]}}]}\n",
        ]),
    )
    .await;

    assert_eq!(deltas(&items), vec!["H", "e", "llo"]);
    // No done-marker on this dialect: end-of-body completes the stream.
    assert_eq!(completed(&items), Some("Hello"));
}

#[tokio::test]
async fn anthropic_disconnect_mid_stream_never_completes() {
    let items = run(
        ProviderKind::Anthropic,
        body(vec![
            Ok(b"data: {\"type\":\"message_start\",\"message\":{}}\n\n".to_vec()),
            Ok(
                b"data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"Hi\"}}\n\n"
                    .to_vec(),
            ),
            Err(LLMError::transport("connection reset by peer")),
        ]),
    )
    .await;

    assert_eq!(deltas(&items), vec!["Hi"]);
    assert_eq!(completed(&items), None);
    assert!(matches!(
        items.last(),
        Some(Err(LLMError::Transport { .. }))
    ));
}

#[tokio::test]
async fn anthropic_message_stop_completes() {
    let items = run(
        ProviderKind::Anthropic,
        ok_body(&[
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"Hi\"}}\n\n",
            "data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\"}}\n\n",
            "data: {\"type\":\"message_stop\"}\n\n",
        ]),
    )
    .await;

    assert_eq!(deltas(&items), vec!["Hi"]);
    assert_eq!(completed(&items), Some("Hi"));
}

#[tokio::test]
async fn qwen_mixes_snapshot_and_delta_frames() {
    let items = run(
        ProviderKind::Qwen,
        ok_body(&[
            // Snapshot convention, spaceless prefix included.
            "data:{\"output\":{\"text\":\"你\",\"finish_reason\":\"null\"}}\n",
            "data: {\"output\":{\"text\":\"你好\",\"finish_reason\":\"null\"}}\n",
            "data: {\"output\":{\"finish_reason\":\"stop\"}}\n",
        ]),
    )
    .await;

    assert_eq!(deltas(&items), vec!["你", "好"]);
    assert_eq!(completed(&items), Some("你好"));
}

#[tokio::test]
async fn baidu_result_frames_accumulate() {
    let items = run(
        ProviderKind::Baidu,
        ok_body(&[
            "data: {\"result\":\"早上\",\"is_end\":false}\n\n",
            "data: {\"result\":\"好\",\"is_end\":true}\n\n",
        ]),
    )
    .await;

    assert_eq!(deltas(&items), vec!["早上", "好"]);
    assert_eq!(completed(&items), Some("早上好"));
}

#[tokio::test]
async fn frames_split_across_chunk_boundaries_still_decode() {
    let items = run(
        ProviderKind::Openai,
        ok_body(&[
            "data: {\"choices\":[{\"delta\"",
            ":{\"content\":\"Hel\"}}]}\r\ndata: {\"choices\":[{\"delta\":{\"content\":\"lo\"",
            "}}]}\r\ndata: [DO",
            "NE]\r\n",
        ]),
    )
    .await;

    assert_eq!(deltas(&items), vec!["Hel", "lo"]);
    assert_eq!(completed(&items), Some("Hello"));
}

#[tokio::test]
async fn one_corrupt_frame_does_not_abort_the_stream() {
    let items = run(
        ProviderKind::Openai,
        ok_body(&[
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"cont\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: [DONE]\n\n",
        ]),
    )
    .await;

    assert_eq!(deltas(&items), vec!["Hel", "lo"]);
    assert_eq!(completed(&items), Some("Hello"));
    assert!(items.iter().all(|item| item.is_ok()));
}

#[tokio::test]
async fn empty_stream_completes_with_empty_text() {
    let items = run(ProviderKind::Openai, ok_body(&["data: [DONE]\n\n"])).await;
    assert_eq!(items.len(), 1);
    assert_eq!(completed(&items), Some(""));
}
