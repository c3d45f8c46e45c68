//! Frame decoding and stream normalization.
//!
//! Vendors disagree on almost everything in their streaming responses: framing
//! (`data: ` vs `data:`), payload shape, delta versus cumulative text, and how a
//! stream ends. This module funnels all of them through a single state machine,
//! [`NormalizedStream`], which yields uniform [`ChatChunk`] items regardless of
//! the upstream dialect. Byte-to-line reassembly is split out into
//! [`LineDecoder`] so it can be exercised against arbitrary chunk boundaries on
//! its own.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;

use crate::error::LLMError;
use crate::http::HttpBodyStream;
use crate::provider::{ChatStream, FrameEvent, VendorAdapter};
use crate::types::{CancelToken, ChatChunk, StreamUpdate};

/// Reassembles transport byte chunks into complete lines.
///
/// Chunk boundaries carry no meaning: a single chunk may hold many lines, and a
/// line may span many chunks. The decoder buffers the trailing partial line
/// between calls and splits on `\n`, discarding an immediately preceding `\r` so
/// CRLF and LF streams decode identically.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk and returns every line completed by it, in arrival order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.buffer.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(line);
        }
        lines
    }

    /// Flushes the trailing partial line once the body is exhausted.
    ///
    /// A vendor that omits the final newline (Gemini does) still gets its last
    /// frame processed.
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        if self.buffer.is_empty() {
            return None;
        }
        let mut line = std::mem::take(&mut self.buffer);
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(line)
    }
}

/// 把任意厂商的流式响应归一化为统一增量序列
///
/// Wraps a raw body stream and an adapter, yielding zero or more
/// [`ChatChunk::Delta`] items followed by exactly one terminal item: a
/// [`ChatChunk::Completed`] or the stream's single `Err`. After the terminal
/// item the stream is fused and every further frame is discarded, so a vendor
/// that keeps talking after its done-marker cannot produce trailing output.
///
/// Cumulative vendors are reconciled against the running accumulator: when the
/// new snapshot extends the previous text, only the suffix is emitted as a
/// delta; when it diverges, the snapshot is taken as authoritative and re-emitted
/// whole. Either way the `cumulative` field never shrinks mid-stream without a
/// corresponding delta.
pub struct NormalizedStream {
    body: HttpBodyStream,
    adapter: &'static dyn VendorAdapter,
    decoder: LineDecoder,
    cumulative: String,
    pending: VecDeque<Result<ChatChunk, LLMError>>,
    cancel: Option<CancelToken>,
    body_done: bool,
    finished: bool,
}

impl NormalizedStream {
    pub fn new(
        body: HttpBodyStream,
        adapter: &'static dyn VendorAdapter,
        cancel: Option<CancelToken>,
    ) -> Self {
        Self {
            body,
            adapter,
            decoder: LineDecoder::new(),
            cumulative: String::new(),
            pending: VecDeque::new(),
            cancel,
            body_done: false,
            finished: false,
        }
    }

    /// Boxes the normalizer behind the public stream alias.
    pub fn boxed(
        body: HttpBodyStream,
        adapter: &'static dyn VendorAdapter,
        cancel: Option<CancelToken>,
    ) -> ChatStream {
        Box::pin(Self::new(body, adapter, cancel))
    }

    fn push_delta(&mut self, delta: String) {
        if delta.is_empty() {
            return;
        }
        self.cumulative.push_str(&delta);
        self.pending.push_back(Ok(ChatChunk::Delta(StreamUpdate {
            delta,
            cumulative: self.cumulative.clone(),
        })));
    }

    fn push_terminal(&mut self, item: Result<ChatChunk, LLMError>) {
        self.pending.push_back(item);
        self.finished = true;
    }

    fn process_line(&mut self, raw: Vec<u8>) {
        if self.finished {
            return;
        }
        let line = match String::from_utf8(raw) {
            Ok(line) => line,
            Err(_) => {
                tracing::trace!(provider = self.adapter.name(), "dropping non-utf8 frame");
                return;
            }
        };
        if line.trim().is_empty() {
            return;
        }
        match self.adapter.parse_line(&line) {
            FrameEvent::Delta(delta) => self.push_delta(delta),
            FrameEvent::Cumulative(snapshot) => {
                let delta = if snapshot.starts_with(self.cumulative.as_str()) {
                    snapshot[self.cumulative.len()..].to_string()
                } else {
                    // Divergent snapshot: trust the vendor and restart from it.
                    tracing::trace!(
                        provider = self.adapter.name(),
                        "cumulative snapshot diverged from accumulator"
                    );
                    self.cumulative.clear();
                    snapshot.clone()
                };
                self.push_delta(delta);
                self.cumulative = snapshot;
            }
            FrameEvent::Done => {
                self.push_terminal(Ok(ChatChunk::Completed {
                    full_text: self.cumulative.clone(),
                }));
            }
            FrameEvent::Error(message) => {
                self.push_terminal(Err(LLMError::provider(self.adapter.name(), message)));
            }
            FrameEvent::Ignore => {}
        }
    }

    /// End of body without an explicit done-marker: for marker-less vendors this
    /// is the normal completion path, so whatever accumulated is the final text.
    fn finish_body(&mut self) {
        if let Some(tail) = self.decoder.finish() {
            self.process_line(tail);
        }
        if !self.finished {
            self.push_terminal(Ok(ChatChunk::Completed {
                full_text: self.cumulative.clone(),
            }));
        }
    }
}

impl Stream for NormalizedStream {
    type Item = Result<ChatChunk, LLMError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(item) = this.pending.pop_front() {
                return Poll::Ready(Some(item));
            }
            if this.finished || this.body_done {
                return Poll::Ready(None);
            }
            if let Some(token) = &this.cancel {
                if token.is_cancelled() {
                    this.push_terminal(Err(LLMError::aborted("cancelled by caller")));
                    continue;
                }
            }
            match this.body.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => {
                    for line in this.decoder.feed(&chunk) {
                        this.process_line(line);
                    }
                }
                Poll::Ready(Some(Err(err))) => {
                    // Mid-stream transport failure. Already-delivered increments
                    // stay valid; the stream just never completes.
                    this.push_terminal(Err(err));
                }
                Poll::Ready(None) => {
                    this.body_done = true;
                    this.finish_body();
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
