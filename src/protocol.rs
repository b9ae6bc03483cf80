//! Wire contract with the chat backend.
//!
//! The streamed response body is plain text with two kinds of inline control
//! blocks:
//!
//! ```text
//! resolutionBlock := "$[[START_JSON]]" {"resolved_text": string} "$[[END_JSON]]"
//! metaBlock       := "$[[AUDIO_DONE]]" {"audio_url"?: string, "channel_id"?: string} "$[[AUDIO_DONE]]"
//! ```
//!
//! The meta block opens and closes with the same literal token; the second
//! occurrence terminates it.

use serde::{Deserialize, Serialize};

pub const JSON_START: &str = "$[[START_JSON]]";
pub const JSON_END: &str = "$[[END_JSON]]";
pub const META_START: &str = "$[[AUDIO_DONE]]";
pub const META_END: &str = "$[[AUDIO_DONE]]";

// -- Control block payloads -------------------------------------------------

/// Payload of a resolution block: the server's transcription of a voice
/// submission, shown as the user's own message.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ResolutionPayload {
    #[serde(default)]
    pub resolved_text: Option<String>,
}

/// Payload of a meta block.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct MetaPayload {
    #[serde(default)]
    pub audio_url: Option<String>,
    #[serde(default)]
    pub channel_id: Option<String>,
}

/// One decoded unit of the response stream, produced per chunk.
///
/// Empty strings in the control payloads are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamEvent {
    pub visible_text: String,
    pub resolved_text: Option<String>,
    pub audio_url: Option<String>,
    pub channel_id: Option<String>,
    /// Byte offset in `visible_text` where the resolution block stood.
    /// Set only together with `resolved_text`.
    pub resolution_offset: Option<usize>,
}

impl StreamEvent {
    pub fn has_control_data(&self) -> bool {
        self.resolved_text.is_some() || self.audio_url.is_some() || self.channel_id.is_some()
    }

    /// Visible text that preceded the resolution block in this chunk.
    pub fn text_before_resolution(&self) -> &str {
        match self.resolution_offset {
            Some(at) => &self.visible_text[..at],
            None => &self.visible_text,
        }
    }
}

// -- Submission -------------------------------------------------------------

/// A finished capture ready to upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedAudio {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub file_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionInput {
    Text(String),
    Audio(RecordedAudio),
}

impl SubmissionInput {
    pub fn kind(&self) -> &'static str {
        match self {
            SubmissionInput::Text(_) => "text",
            SubmissionInput::Audio(_) => "audio",
        }
    }
}

/// Form fields of `POST /api/chat/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub input: SubmissionInput,
    pub channel_id: Option<String>,
    pub model: Option<String>,
}

// -- REST DTOs --------------------------------------------------------------

/// One persisted message as returned by `GET /api/history/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub role: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
}

impl HistoryEntry {
    pub fn is_user(&self) -> bool {
        self.role.eq_ignore_ascii_case("user")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryResponse {
    #[serde(default)]
    pub history: serde_json::Value,
}

impl HistoryResponse {
    /// The entries, or `None` when the server did not send an array.
    ///
    /// Array elements that do not look like messages are skipped.
    pub fn entries(&self) -> Option<Vec<HistoryEntry>> {
        let items = self.history.as_array()?;
        Some(
            items
                .iter()
                .filter_map(|v| serde_json::from_value::<HistoryEntry>(v.clone()).ok())
                .collect(),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChannelSummary {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl ChannelSummary {
    pub fn display_name(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => &self.id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelInfo {
    pub name: String,
}

/// Body of `GET /api/data`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InitData {
    #[serde(default)]
    pub channels: Option<Vec<ChannelSummary>>,
    #[serde(default)]
    pub models: Option<Vec<ModelInfo>>,
}
