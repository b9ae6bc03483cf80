pub mod api;
pub mod cli;
pub mod config;
pub mod consumer;
pub mod decoder;
pub mod error;
pub mod navigation;
pub mod playback;
pub mod protocol;
pub mod recording;
pub mod scanner;
pub mod smoothing;
pub mod transcript;

use std::path::{Path, PathBuf};

use futures_util::Stream;
use tracing::{debug, error, info, warn};

use api::ChatApi;
use config::{ClientConfig, UiState};
use consumer::{consume, StreamOutcome, TurnHandler};
use error::{ChatError, Result};
use navigation::{ChannelDirectory, ChannelNavigator, LocationOutcome, SessionToken};
use playback::{resolve_audio_url, AudioPlayer, PlaybackState};
use protocol::{ChannelSummary, RecordedAudio, Submission, SubmissionInput};
use recording::{DiscardReason, RecordingController, RecordingOutcome, StopReason};
use transcript::{ChatTurn, TranscriptRenderer};

pub const STATUS_SENDING_TEXT: &str = "Sending text...";
pub const STATUS_PROCESSING_AUDIO: &str = "Processing audio...";
pub const STATUS_RECEIVING: &str = "Receiving response...";
pub const STATUS_LISTENING: &str = "Listening...";
pub const NO_MODELS_NOTICE: &str = "No models available";
pub const HISTORY_FAILED_NOTICE: &str = "Failed to load chat history.";

// ---------------------------------------------------------------------------
// Turn results
// ---------------------------------------------------------------------------

/// How a send attempt ended. Failures are already rendered when returned.
#[derive(Debug)]
pub enum TurnReport {
    Streamed(StreamOutcome),
    /// The request failed; carries the message shown in the transcript.
    Failed(String),
    /// Audio was playing, so the send only stopped it.
    AudioStopped,
    /// A recording was dropped locally and nothing was sent.
    Discarded(DiscardReason),
}

// ---------------------------------------------------------------------------
// Per-turn side effects
// ---------------------------------------------------------------------------

/// Routes consumer events into the client's state for one turn.
struct TurnContext<'a, R, P> {
    token: SessionToken,
    server_url: &'a str,
    nav: &'a mut ChannelNavigator,
    directory: &'a mut ChannelDirectory,
    renderer: &'a mut R,
    player: &'a mut P,
    playback: &'a mut PlaybackState,
}

impl<R: TranscriptRenderer, P: AudioPlayer> TurnHandler for TurnContext<'_, R, P> {
    fn is_active(&self) -> bool {
        self.nav.is_active(&self.token)
    }

    fn on_visible_text(&mut self, text: &str) {
        self.renderer.append_streaming(text);
    }

    fn on_resolved_text(&mut self, text: &str) {
        self.renderer.append_message(ChatTurn::user(text));
    }

    fn on_audio_url(&mut self, url: &str) {
        let resolved = resolve_audio_url(self.server_url, url);
        self.playback.arm(&resolved);
        match self.player.play(&resolved) {
            Ok(()) => {
                self.playback.started();
            }
            Err(e) => {
                warn!(error = %e, url = %resolved, "audio playback failed");
                self.playback.stop();
            }
        }
    }

    fn on_channel_id(&mut self, id: &str, active: bool) {
        if self.directory.add(ChannelSummary { id: id.to_string(), name: None }) {
            debug!(channel = id, "new channel listed");
        }
        if active {
            self.nav.adopt_assigned(id);
        }
    }

    fn on_done(&mut self, outcome: &StreamOutcome) {
        self.renderer.finalize_streaming(&outcome.text, outcome.audio_url.as_deref());
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// The client runtime: one foreground conversation, its transcript, the
/// channel list and audio in and out.
///
/// A send borrows the client until its stream has drained, so navigation
/// issued through the same client waits for the turn to finish. Streams
/// consumed via [`ChatClient::stream_turn`] with an earlier token are gated
/// on that token instead.
pub struct ChatClient<R: TranscriptRenderer, P: AudioPlayer> {
    api: ChatApi,
    config: ClientConfig,
    state: UiState,
    state_path: Option<PathBuf>,
    nav: ChannelNavigator,
    directory: ChannelDirectory,
    models: Vec<String>,
    renderer: R,
    player: P,
    playback: PlaybackState,
    recorder: RecordingController,
}

impl<R: TranscriptRenderer, P: AudioPlayer> ChatClient<R, P> {
    /// `state_path` is where the UI state is saved on change; `None` keeps
    /// it in memory only.
    pub fn new(
        config: ClientConfig,
        state: UiState,
        state_path: Option<PathBuf>,
        renderer: R,
        player: P,
    ) -> Result<Self> {
        let api = ChatApi::new(&config, &state.session_id)?;
        let recorder = RecordingController::new(config.recording_policy());
        Ok(Self {
            api,
            config,
            state,
            state_path,
            nav: ChannelNavigator::new(),
            directory: ChannelDirectory::new(),
            models: Vec::new(),
            renderer,
            player,
            playback: PlaybackState::Idle,
            recorder,
        })
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    pub fn player(&self) -> &P {
        &self.player
    }

    pub fn navigator(&self) -> &ChannelNavigator {
        &self.nav
    }

    pub fn directory(&self) -> &ChannelDirectory {
        &self.directory
    }

    pub fn playback(&self) -> &PlaybackState {
        &self.playback
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    pub fn selected_model(&self) -> Option<&str> {
        self.state.selected_model.as_deref()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn recorder_mut(&mut self) -> &mut RecordingController {
        &mut self.recorder
    }

    /// Identity of the foreground conversation right now.
    pub fn session_token(&self) -> SessionToken {
        self.nav.token()
    }

    // -----------------------------------------------------------------------
    // Startup
    // -----------------------------------------------------------------------

    /// Load channels and models, then settle on a model.
    pub async fn bootstrap(&mut self) -> Result<()> {
        let data = self.api.fetch_init_data().await?;
        self.directory.populate(data.channels.unwrap_or_default());
        self.models = data
            .models
            .unwrap_or_default()
            .into_iter()
            .map(|m| m.name)
            .collect();
        info!(channels = self.directory.channels().len(), models = self.models.len(), "bootstrap complete");

        if let Some(id) = self.nav.resolve_pending(&self.directory) {
            self.load_history(&id).await;
        }

        match cli::resolve_model(&self.models, self.state.selected_model.as_deref()) {
            Some(model) => {
                self.state.selected_model = Some(model);
                self.persist_state();
            }
            None => {
                warn!("server offers no models");
                self.renderer.append_message(ChatTurn::notice(NO_MODELS_NOTICE));
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Sending
    // -----------------------------------------------------------------------

    /// Send a text message. While audio plays the call only stops it.
    pub async fn send_text(&mut self, text: &str) -> Result<TurnReport> {
        self.refresh_playback();
        if self.playback.is_playing() {
            self.stop_audio();
            return Ok(TurnReport::AudioStopped);
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::EmptySubmission);
        }
        self.renderer.append_message(ChatTurn::user(text));
        self.renderer.set_status(STATUS_SENDING_TEXT);
        Ok(self.dispatch(SubmissionInput::Text(text.to_string())).await)
    }

    /// Send recorded audio. The user turn comes back as resolved text.
    pub async fn send_audio(&mut self, audio: RecordedAudio) -> Result<TurnReport> {
        if audio.bytes.is_empty() {
            return Err(ChatError::EmptySubmission);
        }
        self.renderer.set_status(STATUS_PROCESSING_AUDIO);
        Ok(self.dispatch(SubmissionInput::Audio(audio)).await)
    }

    /// Send an audio file from disk as-is.
    pub async fn send_audio_file(&mut self, path: &Path) -> Result<TurnReport> {
        let bytes = tokio::fs::read(path).await?;
        self.send_audio(RecordedAudio {
            bytes,
            mime_type: cli::mime_for_path(path).to_string(),
            file_name: recording::UPLOAD_FILE_NAME.to_string(),
        })
        .await
    }

    /// Act on a finished recording: submit it or show why it was dropped.
    pub async fn submit_recording(&mut self, outcome: RecordingOutcome) -> Result<TurnReport> {
        if let Some(notice) = outcome.notice() {
            self.renderer.append_message(ChatTurn::notice(notice));
        }
        match outcome {
            RecordingOutcome::Submit(audio) => self.send_audio(audio).await,
            RecordingOutcome::Discarded(reason) => {
                debug!(?reason, "recording discarded");
                self.renderer.set_status("");
                Ok(TurnReport::Discarded(reason))
            }
        }
    }

    /// Replay a WAV file through a fresh recording and submit the result.
    pub async fn record_wav(&mut self, path: &Path) -> Result<TurnReport> {
        self.stop_audio();
        self.renderer.set_status(STATUS_LISTENING);
        let policy = self.config.recording_policy();
        let owned = path.to_path_buf();
        let outcome = tokio::task::spawn_blocking(move || recording::replay_wav(&owned, policy))
            .await
            .map_err(|e| ChatError::Io(std::io::Error::other(e)))?;
        match outcome {
            Ok(outcome) => self.submit_recording(outcome).await,
            Err(e) => {
                self.renderer.set_status("");
                Err(e)
            }
        }
    }

    async fn dispatch(&mut self, input: SubmissionInput) -> TurnReport {
        let token = self.nav.token();
        let submission = Submission {
            input,
            channel_id: self.nav.current_channel().map(str::to_string),
            model: self.state.selected_model.clone(),
        };

        let response = match self.api.submit(&submission).await {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, "submission failed");
                let message = e.transcript_message();
                if self.nav.is_active(&token) {
                    self.renderer.append_message(ChatTurn::error(message.clone()));
                }
                self.renderer.set_status("");
                return TurnReport::Failed(message);
            }
        };

        self.renderer.set_status(STATUS_RECEIVING);
        let outcome = self.stream_turn(response.bytes_stream(), token).await;
        self.renderer.set_status("");

        if let Some(id) = self.nav.resolve_pending(&self.directory) {
            self.load_history(&id).await;
        }
        TurnReport::Streamed(outcome)
    }

    /// Consume a response body on behalf of the session `token` names.
    pub async fn stream_turn<S, B, E>(&mut self, body: S, token: SessionToken) -> StreamOutcome
    where
        S: Stream<Item = std::result::Result<B, E>>,
        B: AsRef<[u8]>,
        E: std::fmt::Display,
    {
        let policy = self.config.smoothing_policy();
        let mut ctx = TurnContext {
            token,
            server_url: &self.config.server_url,
            nav: &mut self.nav,
            directory: &mut self.directory,
            renderer: &mut self.renderer,
            player: &mut self.player,
            playback: &mut self.playback,
        };
        consume(body, policy, &mut ctx).await
    }

    // -----------------------------------------------------------------------
    // Navigation
    // -----------------------------------------------------------------------

    /// Bring `id` to the foreground and render its history.
    pub async fn open_channel(&mut self, id: &str) {
        self.leave_foreground();
        self.nav.select(id);
        self.load_history(id).await;
    }

    /// Follow a location such as `/c/{id}`.
    pub async fn open_location(&mut self, path: &str) -> LocationOutcome {
        let outcome = self.nav.open_location(path, &self.directory);
        match &outcome {
            LocationOutcome::Select(id) => {
                let id = id.clone();
                self.leave_foreground();
                self.load_history(&id).await;
            }
            LocationOutcome::Pending(id) => {
                debug!(channel = %id, "location waits for channel list");
                self.leave_foreground();
                self.renderer.clear();
                self.renderer.set_status("");
            }
            LocationOutcome::Unchanged => {}
        }
        outcome
    }

    pub fn new_chat(&mut self) {
        self.leave_foreground();
        self.nav.new_chat();
        self.renderer.clear();
        self.renderer.set_status("");
    }

    pub async fn delete_channel(&mut self, id: &str) -> Result<()> {
        self.api.delete_channel(id).await?;
        self.directory.remove(id);
        if self.nav.forget(id) {
            self.renderer.clear();
            self.stop_audio();
        }
        Ok(())
    }

    pub async fn delete_all(&mut self) -> Result<()> {
        self.api.delete_all().await?;
        self.directory.clear();
        self.nav.new_chat();
        self.renderer.clear();
        self.stop_audio();
        Ok(())
    }

    pub fn search_channels(&self, query: &str) -> Vec<&ChannelSummary> {
        self.directory.search(query)
    }

    /// Remember `name` as the model for future sends. Returns `false` (and
    /// changes nothing) when the server is known not to offer it.
    pub fn select_model(&mut self, name: &str) -> bool {
        if !self.models.is_empty() && !self.models.iter().any(|m| m == name) {
            return false;
        }
        self.state.selected_model = Some(name.to_string());
        self.persist_state();
        true
    }

    // -----------------------------------------------------------------------
    // Audio
    // -----------------------------------------------------------------------

    pub fn stop_audio(&mut self) {
        self.player.stop();
        if self.playback.stop() {
            debug!("playback stopped");
        }
    }

    /// Notice a player that finished on its own.
    pub fn refresh_playback(&mut self) {
        if self.playback.is_playing() && !self.player.is_playing() {
            self.playback.ended();
        }
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn leave_foreground(&mut self) {
        self.stop_audio();
        if self.recorder.is_recording() {
            let _ = self.recorder.stop(StopReason::Navigation, tokio::time::Instant::now());
        }
    }

    async fn load_history(&mut self, id: &str) {
        self.renderer.clear();
        let history = match self.api.fetch_history(id).await {
            Ok(history) => history,
            Err(e) => {
                warn!(error = %e, channel = id, "could not load history");
                self.renderer.append_message(ChatTurn::error(HISTORY_FAILED_NOTICE));
                return;
            }
        };
        match history.entries() {
            Some(entries) => {
                for entry in entries {
                    let turn = if entry.is_user() {
                        ChatTurn::user(entry.content)
                    } else {
                        ChatTurn::ai(entry.content).with_audio(entry.audio_url)
                    };
                    self.renderer.append_message(turn);
                }
            }
            None => self.renderer.append_message(ChatTurn::ai("")),
        }
    }

    fn persist_state(&self) {
        if let Some(path) = &self.state_path {
            if let Err(e) = self.state.save(path) {
                warn!(error = %e, path = %path.display(), "could not save ui state");
            }
        }
    }
}
