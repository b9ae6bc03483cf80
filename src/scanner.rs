//! Marker scanner: strips inline control blocks out of one decoded chunk.
//!
//! Detection is per chunk. A sentinel or payload that straddles two chunks is
//! not reassembled; the text is passed through untouched for that block.

use tracing::debug;

use crate::protocol::{
    MetaPayload, ResolutionPayload, StreamEvent, JSON_END, JSON_START, META_END, META_START,
};

/// A located control block: its payload and the text with the block removed.
#[derive(Debug, PartialEq, Eq)]
struct ExtractedBlock<'a> {
    payload: &'a str,
    residual: String,
    /// Byte range of the whole block in the scanned text.
    span: std::ops::Range<usize>,
}

/// Locate the first `start` sentinel and the first `end` sentinel after it.
///
/// Returns `None` when either is missing; the caller then leaves the text as is.
fn extract_block<'a>(text: &'a str, start: &str, end: &str) -> Option<ExtractedBlock<'a>> {
    let start_idx = text.find(start)?;
    let payload_start = start_idx + start.len();
    let end_idx = payload_start + text[payload_start..].find(end)?;

    let mut residual = String::with_capacity(text.len() - (end_idx + end.len() - start_idx));
    residual.push_str(&text[..start_idx]);
    residual.push_str(&text[end_idx + end.len()..]);

    Some(ExtractedBlock {
        payload: &text[payload_start..end_idx],
        residual,
        span: start_idx..end_idx + end.len(),
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Scan one chunk.
///
/// The resolution block is stripped first, then the meta block is searched
/// in what remains. A matched block is always removed from the visible text,
/// whether or not its payload parses.
pub fn scan(chunk: &str) -> StreamEvent {
    let mut event = StreamEvent::default();

    let after_resolution = match extract_block(chunk, JSON_START, JSON_END) {
        Some(block) => {
            match serde_json::from_str::<ResolutionPayload>(block.payload) {
                Ok(payload) => {
                    event.resolved_text = non_empty(payload.resolved_text);
                    if event.resolved_text.is_some() {
                        event.resolution_offset = Some(block.span.start);
                    }
                }
                Err(e) => debug!(error = %e, "discarding malformed resolution block"),
            }
            block.residual
        }
        None => chunk.to_string(),
    };

    event.visible_text = match extract_block(&after_resolution, META_START, META_END) {
        Some(block) => {
            match serde_json::from_str::<MetaPayload>(block.payload) {
                Ok(payload) => {
                    event.audio_url = non_empty(payload.audio_url);
                    event.channel_id = non_empty(payload.channel_id);
                }
                Err(e) => debug!(error = %e, "discarding malformed meta block"),
            }
            if let Some(at) = event.resolution_offset {
                event.resolution_offset = Some(shift_past_removed(at, &block.span));
            }
            block.residual
        }
        None => after_resolution,
    };

    event
}

/// Where offset `at` lands once `removed` is cut out of the text.
fn shift_past_removed(at: usize, removed: &std::ops::Range<usize>) -> usize {
    if at <= removed.start {
        at
    } else if at >= removed.end {
        at - removed.len()
    } else {
        removed.start
    }
}
