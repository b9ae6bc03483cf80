//! # Stream Consumer
//!
//! ## Responsibility
//! Drives the read loop over one streamed response body: decodes bytes
//! incrementally, runs the marker scanner over every decoded chunk, paces
//! visible text through the smoothing buffer and routes control data to a
//! [`TurnHandler`].
//!
//! ## Guarantees
//! - Chunks are processed strictly in arrival order.
//! - Text preceding a resolution block is flushed before the resolved text
//!   is shown; the rest of that chunk is dropped.
//! - Audio URL and channel id are latched (last write wins) and acted upon
//!   only after the body is drained.
//! - Once the handler's session is no longer active, nothing more is
//!   rendered, but the body is still read to the end.
//! - The smoothing timer never outlives the loop, including on read errors.

use futures_util::{Stream, StreamExt};
use tracing::{debug, info, warn};

use crate::decoder::Utf8StreamDecoder;
use crate::scanner::scan;
use crate::smoothing::{self, FlushSink, SmoothingBuffer, SmoothingPolicy};

/// Side effects of one streaming turn.
pub trait TurnHandler {
    /// Whether the conversation this stream belongs to is still in the
    /// foreground.
    fn is_active(&self) -> bool;

    /// A batch of visible text for the streaming bubble.
    fn on_visible_text(&mut self, text: &str);

    /// The server's transcription of the submitted audio.
    fn on_resolved_text(&mut self, text: &str);

    /// Called once after the body is drained, only for an active session.
    fn on_audio_url(&mut self, url: &str);

    /// Called once after the body is drained. `active` tells whether the
    /// stream's conversation is still in the foreground.
    fn on_channel_id(&mut self, id: &str, active: bool);

    /// Called last, only for an active session.
    fn on_done(&mut self, outcome: &StreamOutcome);
}

/// Summary of a drained stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamOutcome {
    /// All visible text flushed during the turn.
    pub text: String,
    pub resolved_text: Option<String>,
    pub audio_url: Option<String>,
    pub channel_id: Option<String>,
    pub chunks: usize,
    /// Whether the session was still active when the stream ended.
    pub active: bool,
    /// Read error that cut the stream short.
    pub interrupted: Option<String>,
}

/// Bridges smoothing-buffer flushes to the handler, recording everything
/// flushed and rendering only while the session is active.
struct VisibleSink<'a, H: TurnHandler> {
    handler: &'a mut H,
    accumulated: String,
}

impl<H: TurnHandler> FlushSink for VisibleSink<'_, H> {
    fn flush(&mut self, text: &str) {
        self.accumulated.push_str(text);
        if self.handler.is_active() {
            self.handler.on_visible_text(text);
        }
    }
}

/// Consume `body` to completion.
pub async fn consume<S, B, E, H>(body: S, policy: SmoothingPolicy, handler: &mut H) -> StreamOutcome
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
    H: TurnHandler,
{
    let mut body = std::pin::pin!(body);
    let mut decoder = Utf8StreamDecoder::new();
    let mut buffer = SmoothingBuffer::new(
        policy,
        VisibleSink {
            handler,
            accumulated: String::new(),
        },
    );
    let mut outcome = StreamOutcome::default();

    loop {
        let deadline = buffer.deadline();
        tokio::select! {
            biased;
            _ = smoothing::elapsed(deadline) => buffer.on_timer(),
            next = body.next() => match next {
                Some(Ok(bytes)) => {
                    outcome.chunks += 1;
                    let text = decoder.decode(bytes.as_ref());
                    handle_chunk(&text, &mut buffer, &mut outcome);
                }
                Some(Err(e)) => {
                    warn!(error = %e, chunks = outcome.chunks, "response stream interrupted");
                    outcome.interrupted = Some(e.to_string());
                    break;
                }
                None => break,
            },
        }
    }

    let tail = decoder.finish();
    if !tail.is_empty() {
        buffer.append(&tail);
    }
    buffer.flush_now();

    let VisibleSink { handler, accumulated } = buffer.into_sink();
    outcome.text = accumulated;
    outcome.active = handler.is_active();

    if let Some(id) = outcome.channel_id.as_deref() {
        handler.on_channel_id(id, outcome.active);
    }
    if outcome.active {
        if let Some(url) = outcome.audio_url.as_deref() {
            handler.on_audio_url(url);
        }
        handler.on_done(&outcome);
    } else {
        info!(chunks = outcome.chunks, "session left during stream; suppressing final render");
    }
    outcome
}

fn handle_chunk<H: TurnHandler>(
    text: &str,
    buffer: &mut SmoothingBuffer<VisibleSink<'_, H>>,
    outcome: &mut StreamOutcome,
) {
    let event = scan(text);

    if let Some(url) = &event.audio_url {
        debug!(%url, "audio url received");
        outcome.audio_url = Some(url.clone());
    }
    if let Some(id) = &event.channel_id {
        debug!(channel = %id, "channel id received");
        outcome.channel_id = Some(id.clone());
    }

    match event.resolved_text.as_deref() {
        Some(resolved) => {
            buffer.append(event.text_before_resolution());
            buffer.flush_now();
            let sink = buffer.sink_mut();
            if sink.handler.is_active() {
                sink.handler.on_resolved_text(resolved);
            }
            outcome.resolved_text = Some(resolved.to_string());
        }
        None => buffer.append(&event.visible_text),
    }
}
