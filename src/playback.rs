//! Audio replay of synthesized responses.
//!
//! [`PlaybackState`] is the whole lifecycle:
//!
//! ```text
//! Idle --arm(url)--> Armed(url) --started--> Playing(url)
//!   ^                    |                        |
//!   +------ stop --------+------ ended / stop ----+
//! ```
//!
//! The state machine knows nothing about how audio is produced; an
//! [`AudioPlayer`] does the actual work.

use colored::*;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::error::Result;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PlaybackState {
    #[default]
    Idle,
    Armed(String),
    Playing(String),
}

impl PlaybackState {
    /// Load `url`, replacing whatever was loaded before.
    pub fn arm(&mut self, url: &str) {
        debug!(%url, from = ?self, "playback armed");
        *self = PlaybackState::Armed(url.to_string());
    }

    /// Playback actually began. Only valid from `Armed`.
    pub fn started(&mut self) -> bool {
        match std::mem::take(self) {
            PlaybackState::Armed(url) => {
                *self = PlaybackState::Playing(url);
                true
            }
            other => {
                *self = other;
                false
            }
        }
    }

    /// Playback reached its end.
    pub fn ended(&mut self) -> bool {
        match self {
            PlaybackState::Playing(_) => {
                *self = PlaybackState::Idle;
                true
            }
            _ => false,
        }
    }

    /// User or navigation stopped playback.
    pub fn stop(&mut self) -> bool {
        let was_loaded = !matches!(self, PlaybackState::Idle);
        *self = PlaybackState::Idle;
        was_loaded
    }

    pub fn is_playing(&self) -> bool {
        matches!(self, PlaybackState::Playing(_))
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            PlaybackState::Idle => None,
            PlaybackState::Armed(url) | PlaybackState::Playing(url) => Some(url),
        }
    }
}

/// Resolve a server-relative audio path (`/static/audio/x.mp3`) to an
/// absolute URL. Absolute URLs pass through.
pub fn resolve_audio_url(server_url: &str, audio_url: &str) -> String {
    match reqwest::Url::parse(server_url).and_then(|base| base.join(audio_url)) {
        Ok(url) => url.to_string(),
        Err(e) => {
            debug!(error = %e, server_url, audio_url, "could not join audio url");
            format!(
                "{}/{}",
                server_url.trim_end_matches('/'),
                audio_url.trim_start_matches('/')
            )
        }
    }
}

pub trait AudioPlayer {
    /// Begin playing `url`. Returning `Ok` means playback has started.
    fn play(&mut self, url: &str) -> Result<()>;

    /// Whether audio is still audible.
    fn is_playing(&mut self) -> bool;

    fn stop(&mut self);
}

/// Announces the URL instead of playing it.
#[derive(Debug, Default)]
pub struct AnnouncePlayer;

impl AudioPlayer for AnnouncePlayer {
    fn play(&mut self, url: &str) -> Result<()> {
        info!(%url, "audio available");
        eprintln!("{} {}", "♪ audio:".bright_magenta(), url);
        Ok(())
    }

    fn is_playing(&mut self) -> bool {
        false
    }

    fn stop(&mut self) {}
}

/// Plays through an external program, e.g. `mpv --no-video`. The URL is
/// appended as the last argument.
#[derive(Debug)]
pub struct CommandPlayer {
    program: String,
    args: Vec<String>,
    child: Option<Child>,
}

impl CommandPlayer {
    /// Split a command line on whitespace. `None` for an empty line.
    pub fn from_command_line(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
            child: None,
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl AudioPlayer for CommandPlayer {
    fn play(&mut self, url: &str) -> Result<()> {
        self.stop();
        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(url)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        info!(program = %self.program, %url, "playing audio");
        self.child = Some(child);
        Ok(())
    }

    fn is_playing(&mut self) -> bool {
        let Some(child) = self.child.as_mut() else {
            return false;
        };
        match child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                debug!(%status, "player exited");
                self.child = None;
                false
            }
            Err(e) => {
                warn!(error = %e, "could not poll player");
                self.child = None;
                false
            }
        }
    }

    fn stop(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.start_kill() {
                debug!(error = %e, "player already gone");
            }
        }
    }
}

/// Either player, chosen from configuration.
#[derive(Debug)]
pub enum ConfiguredPlayer {
    Announce(AnnouncePlayer),
    Command(CommandPlayer),
}

impl ConfiguredPlayer {
    pub fn from_config(command: Option<&str>) -> Self {
        match command.and_then(CommandPlayer::from_command_line) {
            Some(player) => ConfiguredPlayer::Command(player),
            None => ConfiguredPlayer::Announce(AnnouncePlayer),
        }
    }
}

impl AudioPlayer for ConfiguredPlayer {
    fn play(&mut self, url: &str) -> Result<()> {
        match self {
            ConfiguredPlayer::Announce(p) => p.play(url),
            ConfiguredPlayer::Command(p) => p.play(url),
        }
    }

    fn is_playing(&mut self) -> bool {
        match self {
            ConfiguredPlayer::Announce(p) => p.is_playing(),
            ConfiguredPlayer::Command(p) => p.is_playing(),
        }
    }

    fn stop(&mut self) {
        match self {
            ConfiguredPlayer::Announce(p) => p.stop(),
            ConfiguredPlayer::Command(p) => p.stop(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_full_cycle() {
        let mut s = PlaybackState::default();
        s.arm("/a.mp3");
        assert_eq!(s, PlaybackState::Armed("/a.mp3".into()));
        assert!(s.started());
        assert!(s.is_playing());
        assert!(s.ended());
        assert_eq!(s, PlaybackState::Idle);
    }

    #[test]
    fn test_started_requires_armed() {
        let mut s = PlaybackState::Idle;
        assert!(!s.started());
        assert_eq!(s, PlaybackState::Idle);
    }

    #[test]
    fn test_ended_only_from_playing() {
        let mut s = PlaybackState::Armed("/a.mp3".into());
        assert!(!s.ended());
        assert_eq!(s.url(), Some("/a.mp3"));
    }

    #[test]
    fn test_stop_from_any_state() {
        let mut s = PlaybackState::Playing("/a.mp3".into());
        assert!(s.stop());
        assert!(!s.stop());
        assert_eq!(s.url(), None);
    }

    #[test]
    fn test_arm_replaces_current() {
        let mut s = PlaybackState::Playing("/a.mp3".into());
        s.arm("/b.mp3");
        assert_eq!(s, PlaybackState::Armed("/b.mp3".into()));
    }

    #[rstest]
    #[case("http://localhost:8000", "/static/audio/x.mp3", "http://localhost:8000/static/audio/x.mp3")]
    #[case("http://localhost:8000/", "static/x.mp3", "http://localhost:8000/static/x.mp3")]
    #[case("http://localhost:8000", "https://cdn.example.com/y.mp3", "https://cdn.example.com/y.mp3")]
    #[case("not a url", "/x.mp3", "not a url/x.mp3")]
    fn test_resolve_audio_url(#[case] server: &str, #[case] audio: &str, #[case] expected: &str) {
        assert_eq!(resolve_audio_url(server, audio), expected);
    }

    #[test]
    fn test_announce_player_never_blocks() {
        let mut p = AnnouncePlayer;
        p.play("http://x/a.mp3").unwrap();
        assert!(!p.is_playing());
    }

    #[test]
    fn test_command_line_parsing() {
        let p = CommandPlayer::from_command_line("mpv --no-video").unwrap();
        assert_eq!(p.program(), "mpv");
        assert_eq!(p.args, vec!["--no-video".to_string()]);
        assert!(CommandPlayer::from_command_line("   ").is_none());
    }

    #[test]
    fn test_configured_player_selection() {
        assert!(matches!(ConfiguredPlayer::from_config(None), ConfiguredPlayer::Announce(_)));
        assert!(matches!(ConfiguredPlayer::from_config(Some("")), ConfiguredPlayer::Announce(_)));
        assert!(matches!(
            ConfiguredPlayer::from_config(Some("afplay")),
            ConfiguredPlayer::Command(_)
        ));
    }

    #[tokio::test]
    async fn test_missing_player_binary_is_an_error() {
        let mut p = CommandPlayer::from_command_line("definitely-not-a-real-player-binary").unwrap();
        assert!(p.play("http://x/a.mp3").is_err());
        assert!(!p.is_playing());
    }
}
