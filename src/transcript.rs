//! Conversation turns and the renderer contract.
//!
//! A renderer shows finalized messages plus at most one streaming AI bubble.
//! The streaming bubble is extended in place while a response arrives and is
//! finalized once; finalizing again, or with no bubble open, does nothing.

use colored::*;
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender {
    User,
    Ai,
}

impl std::fmt::Display for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sender::User => write!(f, "USER"),
            Sender::Ai => write!(f, "AI"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStyle {
    Normal,
    /// Red error message (failed request).
    Error,
    /// Informational line from the client itself.
    Notice,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub sender: Sender,
    pub content: String,
    pub audio_url: Option<String>,
    /// True only while the AI response is still arriving.
    pub streaming: bool,
    pub style: TurnStyle,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            sender: Sender::User,
            content: content.into(),
            audio_url: None,
            streaming: false,
            style: TurnStyle::Normal,
        }
    }

    pub fn ai(content: impl Into<String>) -> Self {
        Self {
            sender: Sender::Ai,
            ..Self::user(content)
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            style: TurnStyle::Error,
            ..Self::ai(content)
        }
    }

    pub fn notice(content: impl Into<String>) -> Self {
        Self {
            style: TurnStyle::Notice,
            ..Self::ai(content)
        }
    }

    pub fn with_audio(mut self, audio_url: Option<String>) -> Self {
        self.audio_url = audio_url.filter(|u| !u.is_empty());
        self
    }
}

pub trait TranscriptRenderer {
    /// Extend the streaming AI bubble, opening it on first use.
    fn append_streaming(&mut self, text: &str);

    /// Turn the streaming bubble into a permanent message with the full text
    /// and an optional replay URL.
    fn finalize_streaming(&mut self, full_text: &str, audio_url: Option<&str>);

    /// Append a finalized, non-streaming message.
    fn append_message(&mut self, turn: ChatTurn);

    fn clear(&mut self);

    fn set_status(&mut self, status: &str);
}

// ---------------------------------------------------------------------------
// In-memory transcript
// ---------------------------------------------------------------------------

/// Keeps the rendered conversation as data.
#[derive(Debug, Default, Clone)]
pub struct MemoryTranscript {
    pub turns: Vec<ChatTurn>,
    pub status: String,
    streaming: Option<usize>,
}

impl MemoryTranscript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.is_some()
    }

    pub fn contents(&self) -> Vec<&str> {
        self.turns.iter().map(|t| t.content.as_str()).collect()
    }
}

impl TranscriptRenderer for MemoryTranscript {
    fn append_streaming(&mut self, text: &str) {
        match self.streaming {
            Some(idx) => self.turns[idx].content.push_str(text),
            None => {
                let mut turn = ChatTurn::ai(text);
                turn.streaming = true;
                self.turns.push(turn);
                self.streaming = Some(self.turns.len() - 1);
            }
        }
    }

    fn finalize_streaming(&mut self, full_text: &str, audio_url: Option<&str>) {
        if let Some(idx) = self.streaming.take() {
            let turn = &mut self.turns[idx];
            turn.content = full_text.to_string();
            turn.streaming = false;
            turn.audio_url = audio_url.map(str::to_string);
        }
    }

    fn append_message(&mut self, turn: ChatTurn) {
        self.turns.push(turn);
    }

    fn clear(&mut self) {
        self.turns.clear();
        self.streaming = None;
    }

    fn set_status(&mut self, status: &str) {
        self.status = status.to_string();
    }
}

// ---------------------------------------------------------------------------
// Terminal renderer
// ---------------------------------------------------------------------------

/// Writes the conversation to a terminal as it happens.
///
/// Streaming text is printed raw; finalizing closes the line and prints the
/// replay toolbar. Status updates go to stderr.
pub struct TerminalRenderer<W: Write> {
    out: W,
    streaming: bool,
    transcript: MemoryTranscript,
}

impl<W: Write> TerminalRenderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            streaming: false,
            transcript: MemoryTranscript::new(),
        }
    }

    /// What has been rendered so far.
    pub fn transcript(&self) -> &MemoryTranscript {
        &self.transcript
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn label(sender: Sender) -> ColoredString {
        match sender {
            Sender::User => "you ›".bright_white().bold(),
            Sender::Ai => " ai ›".bright_cyan().bold(),
        }
    }

    fn toolbar(&mut self, audio_url: Option<&str>) {
        if let Some(url) = audio_url {
            let _ = writeln!(self.out, "      {} {}", "♪".bright_magenta(), url.dimmed());
        }
    }
}

impl<W: Write> TranscriptRenderer for TerminalRenderer<W> {
    fn append_streaming(&mut self, text: &str) {
        if !self.streaming {
            let _ = write!(self.out, "{} ", Self::label(Sender::Ai));
            self.streaming = true;
        }
        let _ = write!(self.out, "{}", text);
        let _ = self.out.flush();
        self.transcript.append_streaming(text);
    }

    fn finalize_streaming(&mut self, full_text: &str, audio_url: Option<&str>) {
        if !self.streaming {
            return;
        }
        self.streaming = false;
        let _ = writeln!(self.out);
        self.toolbar(audio_url);
        let _ = self.out.flush();
        self.transcript.finalize_streaming(full_text, audio_url);
    }

    fn append_message(&mut self, turn: ChatTurn) {
        let body = match turn.style {
            TurnStyle::Normal => turn.content.normal(),
            TurnStyle::Error => turn.content.bright_red(),
            TurnStyle::Notice => turn.content.yellow(),
        };
        let _ = writeln!(self.out, "{} {}", Self::label(turn.sender), body);
        self.toolbar(turn.audio_url.as_deref());
        let _ = self.out.flush();
        self.transcript.append_message(turn);
    }

    fn clear(&mut self) {
        self.streaming = false;
        let _ = writeln!(self.out, "{}", "─".repeat(50).bright_blue());
        self.transcript.clear();
    }

    fn set_status(&mut self, status: &str) {
        if !status.is_empty() {
            eprintln!("{}", status.dimmed());
        }
        self.transcript.set_status(status);
    }
}
