//! Layered client configuration and persisted UI state.
//!
//! Precedence, lowest first: built-in defaults, `config.toml`, environment,
//! command-line flags (applied by the binary).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ChatError, Result};
use crate::recording::RecordingPolicy;
use crate::smoothing::SmoothingPolicy;

pub const APP_DIR: &str = "voice-chat-client";
pub const CONFIG_FILE: &str = "config.toml";
pub const STATE_FILE: &str = "state.toml";

pub const DEFAULT_HOST: &str = "http://localhost";
pub const DEFAULT_PORT: u16 = 8000;

/// `<config_dir>/voice-chat-client`, if the platform has one.
pub fn app_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub server_url: String,
    pub smoothness_ms: u64,
    pub flush_threshold: usize,
    pub silence_timeout_ms: u64,
    pub min_recording_ms: u64,
    /// External command that plays an audio URL (the URL is appended).
    pub audio_player: Option<String>,
    pub log_level: String,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: format!("{DEFAULT_HOST}:{DEFAULT_PORT}"),
            smoothness_ms: 50,
            flush_threshold: 10,
            silence_timeout_ms: 1500,
            min_recording_ms: 1000,
            audio_player: None,
            log_level: "info".to_string(),
            request_timeout_secs: 120,
            connect_timeout_secs: 10,
        }
    }
}

impl ClientConfig {
    /// Defaults overlaid with the config file and the process environment.
    ///
    /// With `explicit` set, that file must exist. Otherwise the default
    /// location is tried and silently skipped when absent.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match app_dir().map(|d| d.join(CONFIG_FILE)) {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Overlay environment variables read through `lookup`.
    ///
    /// `HOST`/`PORT` follow the backend's own variables; `HOST` is only
    /// honoured when it carries a scheme, since shells often export a bare
    /// hostname under that name. `VOICE_CHAT_SERVER` wins over both.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let host = lookup("HOST").filter(|h| h.starts_with("http://") || h.starts_with("https://"));
        let port = lookup("PORT").and_then(|p| p.trim().parse::<u16>().ok());
        if host.is_some() || port.is_some() {
            self.server_url = format!(
                "{}:{}",
                host.as_deref().unwrap_or(DEFAULT_HOST).trim_end_matches('/'),
                port.unwrap_or(DEFAULT_PORT)
            );
        }
        if let Some(server) = lookup("VOICE_CHAT_SERVER").filter(|s| !s.trim().is_empty()) {
            self.server_url = server;
        }
        if let Some(player) = lookup("VOICE_CHAT_PLAYER").filter(|s| !s.trim().is_empty()) {
            self.audio_player = Some(player);
        }
    }

    pub fn smoothing_policy(&self) -> SmoothingPolicy {
        SmoothingPolicy {
            delay: Duration::from_millis(self.smoothness_ms),
            threshold: self.flush_threshold.max(1),
        }
    }

    pub fn recording_policy(&self) -> RecordingPolicy {
        RecordingPolicy {
            silence_timeout: Duration::from_millis(self.silence_timeout_ms),
            min_duration: Duration::from_millis(self.min_recording_ms),
            ..RecordingPolicy::default()
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// Persisted UI state
// ---------------------------------------------------------------------------

/// What the client remembers between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiState {
    /// Sent as the `session_id` cookie; the backend scopes channels by it.
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_model: Option<String>,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            selected_model: None,
        }
    }
}

impl UiState {
    /// Load the state file, creating it with a fresh session id if absent
    /// or empty.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = fs::read_to_string(path)?;
            if !content.trim().is_empty() {
                return Ok(toml::from_str(&content)?);
            }
        }
        let state = Self::default();
        state.save(path)?;
        info!(session = %state.session_id, "created new session");
        Ok(state)
    }

    /// Write through a temporary file and rename.
    pub fn save(&self, path: &Path) -> Result<()> {
        let parent = path.parent().ok_or_else(|| {
            ChatError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "state path has no parent directory",
            ))
        })?;
        fs::create_dir_all(parent)?;
        let content = toml::to_string_pretty(self)?;
        let tmp = path.with_extension("toml.tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn test_defaults() {
        let c = ClientConfig::default();
        assert_eq!(c.server_url, "http://localhost:8000");
        assert_eq!(c.smoothing_policy(), SmoothingPolicy::default());
        assert_eq!(c.recording_policy(), RecordingPolicy::default());
        assert_eq!(c.request_timeout(), Duration::from_secs(120));
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "smoothness_ms = 80\naudio_player = \"mpv\"\n").unwrap();
        let c = ClientConfig::from_file(&path).unwrap();
        assert_eq!(c.smoothness_ms, 80);
        assert_eq!(c.audio_player.as_deref(), Some("mpv"));
        assert_eq!(c.flush_threshold, 10);
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let err = ClientConfig::load(Some(Path::new("/nonexistent/voice.toml"))).unwrap_err();
        assert!(matches!(err, ChatError::Io(_)));
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "smoothness_ms = \"fast\"").unwrap();
        assert!(matches!(ClientConfig::from_file(&path), Err(ChatError::ConfigParse(_))));
    }

    #[test]
    fn test_env_host_and_port() {
        let mut c = ClientConfig::default();
        c.apply_env(env(&[("HOST", "http://10.0.0.5/"), ("PORT", "9000")]));
        assert_eq!(c.server_url, "http://10.0.0.5:9000");
    }

    #[test]
    fn test_env_port_only() {
        let mut c = ClientConfig::default();
        c.apply_env(env(&[("PORT", "8080")]));
        assert_eq!(c.server_url, "http://localhost:8080");
    }

    #[test]
    fn test_bare_hostname_env_is_ignored() {
        let mut c = ClientConfig::default();
        c.apply_env(env(&[("HOST", "my-laptop")]));
        assert_eq!(c.server_url, "http://localhost:8000");
    }

    #[test]
    fn test_explicit_server_env_wins() {
        let mut c = ClientConfig::default();
        c.apply_env(env(&[
            ("PORT", "9000"),
            ("VOICE_CHAT_SERVER", "https://chat.example.com"),
            ("VOICE_CHAT_PLAYER", "afplay"),
        ]));
        assert_eq!(c.server_url, "https://chat.example.com");
        assert_eq!(c.audio_player.as_deref(), Some("afplay"));
    }

    #[test]
    fn test_zero_threshold_clamped() {
        let c = ClientConfig { flush_threshold: 0, ..ClientConfig::default() };
        assert_eq!(c.smoothing_policy().threshold, 1);
    }

    #[test]
    fn test_state_created_then_reloaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.toml");
        let first = UiState::load_or_create(&path).unwrap();
        assert!(uuid::Uuid::parse_str(&first.session_id).is_ok());

        let mut updated = first.clone();
        updated.selected_model = Some("llama3".into());
        updated.save(&path).unwrap();

        let again = UiState::load_or_create(&path).unwrap();
        assert_eq!(again, updated);
        assert!(!path.with_extension("toml.tmp").exists());
    }
}
