use crate::config::ClientConfig;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "voice-chat-client")]
#[command(version)]
#[command(about = "Terminal client for a streaming text and voice chat server")]
pub struct Args {
    /// Message to send once; omit to start an interactive session
    pub prompt: Option<String>,

    /// Server base URL (e.g. http://localhost:8000)
    #[arg(long)]
    pub server: Option<String>,

    /// Model to use; defaults to the last selection or the server's first model
    #[arg(long)]
    pub model: Option<String>,

    /// Open this channel before sending
    #[arg(long)]
    pub channel: Option<String>,

    /// Path to config.toml
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Smoothing delay for streamed text, in milliseconds
    #[arg(long)]
    pub smoothness: Option<u64>,

    /// Send a pre-recorded audio file instead of text
    #[arg(long, conflicts_with = "record_wav")]
    pub audio_file: Option<PathBuf>,

    /// Replay a WAV file through the recorder (silence auto-stop applies)
    #[arg(long)]
    pub record_wav: Option<PathBuf>,

    /// Command used to play response audio (the URL is appended)
    #[arg(long)]
    pub player: Option<String>,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}

impl Args {
    /// Flags override whatever the config layers produced.
    pub fn apply_to(&self, config: &mut ClientConfig) {
        if let Some(server) = &self.server {
            config.server_url = server.clone();
        }
        if let Some(ms) = self.smoothness {
            config.smoothness_ms = ms;
        }
        if let Some(player) = &self.player {
            config.audio_player = Some(player.clone());
        }
    }
}

/// Pick the model to use from what the server offers.
///
/// A persisted choice is kept only while the server still lists it;
/// otherwise the first offered model is the default.
pub fn resolve_model(offered: &[String], persisted: Option<&str>) -> Option<String> {
    match persisted {
        Some(name) if offered.iter().any(|m| m == name) => Some(name.to_string()),
        _ => offered.first().cloned(),
    }
}

/// MIME type for an audio file sent with `--audio-file`, from its extension.
pub fn mime_for_path(path: &std::path::Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("webm") => "audio/webm",
        Some("ogg") | Some("opus") => "audio/ogg;codecs=opus",
        Some("mp4") | Some("m4a") => "audio/mp4",
        Some("mp3") => "audio/mp3",
        _ => "audio/wav",
    }
}

// ---------------------------------------------------------------------------
// Interactive commands
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Send(String),
    New,
    Channels,
    Search(String),
    Open(String),
    Goto(String),
    Delete(String),
    DeleteAll,
    Models,
    Model(String),
    Audio(PathBuf),
    Record(PathBuf),
    Stop,
    Help,
    Quit,
    /// Unknown command or missing argument; carries the message to show.
    Invalid(String),
}

pub const REPL_HELP: &str = "\
/new              start a new chat
/channels         list channels
/search <text>    filter channels by name
/open <id>        open a channel
/goto <path>      open a location such as /c/<id>
/delete <id>      delete a channel
/delete-all       delete every channel
/models           list models
/model <name>     select a model
/audio <file>     send an audio file
/record <wav>     replay a WAV file through the recorder
/stop             stop audio playback
/help             show this help
/quit             exit";

pub fn parse_command(line: &str) -> ReplCommand {
    let line = line.trim();
    let Some(rest) = line.strip_prefix('/') else {
        return ReplCommand::Send(line.to_string());
    };
    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };
    let required = |make: fn(String) -> ReplCommand| {
        if arg.is_empty() {
            ReplCommand::Invalid(format!("/{name} needs an argument"))
        } else {
            make(arg.to_string())
        }
    };
    match name {
        "new" => ReplCommand::New,
        "channels" => ReplCommand::Channels,
        "search" => ReplCommand::Search(arg.to_string()),
        "open" => required(ReplCommand::Open),
        "goto" => required(ReplCommand::Goto),
        "delete" => required(ReplCommand::Delete),
        "delete-all" => ReplCommand::DeleteAll,
        "models" => ReplCommand::Models,
        "model" => required(ReplCommand::Model),
        "audio" => required(|a| ReplCommand::Audio(PathBuf::from(a))),
        "record" => required(|a| ReplCommand::Record(PathBuf::from(a))),
        "stop" => ReplCommand::Stop,
        "help" | "?" => ReplCommand::Help,
        "quit" | "exit" | "q" => ReplCommand::Quit,
        other => ReplCommand::Invalid(format!("unknown command /{other}, try /help")),
    }
}
