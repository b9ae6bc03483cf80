//! Crate-level error type.
//!
//! Every fallible operation in the library returns [`Result`]. Stream-level
//! protocol problems (malformed control blocks) are not errors: the scanner
//! swallows them and they never reach this type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    /// Network-level failure talking to the backend.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The backend answered with a non-2xx status.
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    /// The submit endpoint answered 404: the server has no models configured.
    #[error("no models found on server")]
    NoModels,

    /// The submission was empty or whitespace-only; nothing was sent.
    #[error("nothing to send")]
    EmptySubmission,

    /// None of the preferred capture formats is available on this platform.
    #[error("no supported audio format available")]
    UnsupportedFormat,

    #[error("a recording is already in progress")]
    AlreadyRecording,

    #[error("no recording in progress")]
    NotRecording,

    #[error("could not read config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("could not write state: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    #[error("WAV decode error: {0}")]
    Wav(#[from] hound::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChatError {
    /// The message shown in the transcript when a submission fails.
    ///
    /// Everything except a missing model collapses into one generic line;
    /// the detail goes to the log instead.
    pub fn transcript_message(&self) -> String {
        match self {
            ChatError::NoModels => "No models found on server.".to_string(),
            _ => "Failed to get response from the AI.".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;
