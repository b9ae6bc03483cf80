//! # Channel navigation
//!
//! Tracks which conversation is in the foreground and the addressable
//! location (`/` or `/c/{id}`) that goes with it.
//!
//! ## States
//! - `NoChannel`: a fresh, unsaved conversation.
//! - `Active(id)`: a persisted channel is shown.
//! - `PendingFromUrl(id)`: the location names a channel the directory has
//!   not listed yet; it is selected once, when it appears.
//!
//! ## Session tokens
//! Every user-driven switch of the foreground conversation bumps an epoch,
//! including following a deep link to a channel that is not listed yet.
//! A response stream captures a [`SessionToken`] when it is dispatched and
//! renders only while the epoch is unchanged. A server-assigned channel id
//! for the conversation already in the foreground does not bump the epoch.
//!
//! ## Location pushes
//! A location is pushed only when it differs from the current one, so a
//! repeated assignment never produces a duplicate history entry.

use tracing::{debug, info};

use crate::protocol::ChannelSummary;

pub const ROOT_LOCATION: &str = "/";

pub fn channel_location(id: &str) -> String {
    format!("/c/{id}")
}

/// The channel id named by a location, if any (`/c/abc` → `abc`).
pub fn channel_from_location(path: &str) -> Option<&str> {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    path.rsplit('/').next().filter(|seg| !seg.is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavState {
    NoChannel,
    Active(String),
    PendingFromUrl(String),
}

/// Identity of the foreground conversation at dispatch time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken {
    pub channel: Option<String>,
    epoch: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocationOutcome {
    /// The named channel was listed and is now active; load its history.
    Select(String),
    /// Waiting for the channel list to contain it.
    Pending(String),
    Unchanged,
}

#[derive(Debug)]
pub struct ChannelNavigator {
    state: NavState,
    epoch: u64,
    location: String,
    pushed: Vec<String>,
}

impl Default for ChannelNavigator {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelNavigator {
    pub fn new() -> Self {
        Self {
            state: NavState::NoChannel,
            epoch: 0,
            location: ROOT_LOCATION.to_string(),
            pushed: Vec::new(),
        }
    }

    pub fn state(&self) -> &NavState {
        &self.state
    }

    pub fn current_channel(&self) -> Option<&str> {
        match &self.state {
            NavState::Active(id) => Some(id),
            _ => None,
        }
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// Locations pushed so far, oldest first.
    pub fn pushed(&self) -> &[String] {
        &self.pushed
    }

    pub fn token(&self) -> SessionToken {
        SessionToken {
            channel: self.current_channel().map(str::to_string),
            epoch: self.epoch,
        }
    }

    pub fn is_active(&self, token: &SessionToken) -> bool {
        token.epoch == self.epoch
    }

    /// User picked a channel from the list.
    pub fn select(&mut self, id: &str) {
        if self.current_channel() != Some(id) {
            self.epoch += 1;
        }
        self.state = NavState::Active(id.to_string());
        self.push(channel_location(id));
        debug!(channel = id, epoch = self.epoch, "channel selected");
    }

    /// The server assigned `id` to the foreground conversation.
    ///
    /// Returns `false` when `id` is already active, or when a deep link is
    /// waiting to be resolved and keeps precedence.
    pub fn adopt_assigned(&mut self, id: &str) -> bool {
        match &self.state {
            NavState::Active(cur) if cur == id => return false,
            NavState::PendingFromUrl(pending) => {
                debug!(channel = id, %pending, "deep link pending; assignment ignored");
                return false;
            }
            _ => {}
        }
        self.state = NavState::Active(id.to_string());
        self.push(channel_location(id));
        info!(channel = id, "adopted server-assigned channel");
        true
    }

    pub fn new_chat(&mut self) {
        self.epoch += 1;
        self.state = NavState::NoChannel;
        self.push(ROOT_LOCATION.to_string());
    }

    /// The location changed underneath us (deep link or back/forward).
    pub fn open_location(&mut self, path: &str, directory: &ChannelDirectory) -> LocationOutcome {
        self.location = path.to_string();
        let Some(id) = channel_from_location(path) else {
            return LocationOutcome::Unchanged;
        };
        if self.current_channel() == Some(id) {
            return LocationOutcome::Unchanged;
        }
        let id = id.to_string();
        if directory.contains(&id) {
            self.select(&id);
            LocationOutcome::Select(id)
        } else {
            debug!(channel = %id, "channel not listed yet; waiting");
            if self.state != NavState::PendingFromUrl(id.clone()) {
                self.epoch += 1;
            }
            self.state = NavState::PendingFromUrl(id.clone());
            LocationOutcome::Pending(id)
        }
    }

    /// Select the pending channel if the directory now lists it.
    ///
    /// Returns the selected id at most once per pending location.
    pub fn resolve_pending(&mut self, directory: &ChannelDirectory) -> Option<String> {
        let NavState::PendingFromUrl(id) = &self.state else {
            return None;
        };
        if !directory.contains(id) {
            return None;
        }
        let id = id.clone();
        self.select(&id);
        Some(id)
    }

    /// A channel was deleted. Returns `true` when it was the active one, in
    /// which case the navigator falls back to a fresh conversation at `/`.
    pub fn forget(&mut self, id: &str) -> bool {
        let affected = match &self.state {
            NavState::Active(cur) | NavState::PendingFromUrl(cur) => cur == id,
            NavState::NoChannel => false,
        };
        if affected {
            self.epoch += 1;
            self.state = NavState::NoChannel;
            self.push(ROOT_LOCATION.to_string());
        }
        affected
    }

    fn push(&mut self, location: String) {
        if self.location != location {
            debug!(%location, "push location");
            self.location = location.clone();
            self.pushed.push(location);
        }
    }
}

// ---------------------------------------------------------------------------
// Channel directory
// ---------------------------------------------------------------------------

/// The channel list, newest first.
#[derive(Debug, Default, Clone)]
pub struct ChannelDirectory {
    channels: Vec<ChannelSummary>,
}

impl ChannelDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn populate(&mut self, channels: Vec<ChannelSummary>) {
        self.channels = channels;
    }

    /// Insert a newly created channel at the top. Returns `false` if known.
    pub fn add(&mut self, channel: ChannelSummary) -> bool {
        if self.contains(&channel.id) {
            return false;
        }
        self.channels.insert(0, channel);
        true
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.channels.len();
        self.channels.retain(|c| c.id != id);
        self.channels.len() != before
    }

    pub fn clear(&mut self) {
        self.channels.clear();
    }

    pub fn contains(&self, id: &str) -> bool {
        self.channels.iter().any(|c| c.id == id)
    }

    pub fn get(&self, id: &str) -> Option<&ChannelSummary> {
        self.channels.iter().find(|c| c.id == id)
    }

    pub fn channels(&self) -> &[ChannelSummary] {
        &self.channels
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Case-insensitive name filter; an empty query matches everything.
    pub fn search(&self, query: &str) -> Vec<&ChannelSummary> {
        let needle = query.trim().to_lowercase();
        self.channels
            .iter()
            .filter(|c| needle.is_empty() || c.display_name().to_lowercase().contains(&needle))
            .collect()
    }
}
