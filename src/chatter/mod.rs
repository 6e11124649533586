//! Per-user chat state.
//!
//! A [`Chatter`] carries the preferences that survive between sessions:
//! the active channel, muted channels, ignored users and when the user
//! was last seen.
//! Chatters live in a [`ChatterProvider`] while their user is connected
//! and are loaded from and saved to a [`ChatterStorage`] on background
//! tasks.

mod provider;
mod queue;
mod service;
mod storage;

pub use provider::{ChatterProvider, PersistOptions, SimpleChatterProvider};
pub use queue::{PersistQueue, PersistTicket};
pub use service::{ChatterService, ReadyState};
pub use storage::{ChatterStorage, JsonFileStorage, MemoryStorage};

use std::collections::BTreeSet;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

/// How a chatter came to be in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatterKind {
    /// Backed by a live session.
    Online,
    /// Stand-in for a user loaded without a session start, e.g. users that
    /// were already connected when the chat subsystem came up.
    Offline,
}

/// The persisted fields of a chatter.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatterState {
    /// Name of the channel plain messages go to.
    pub channel: Option<String>,
    /// Lowercase names of channels the user does not want to hear.
    pub muted: BTreeSet<String>,
    /// Users whose messages this user does not want to see.
    pub ignored: BTreeSet<Uuid>,
    /// When the user's session last ended.
    pub last_seen: Option<DateTime<Utc>>,
}

/// On-disk shape of a chatter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatterRecord {
    /// User identifier.
    pub id: Uuid,
    /// Persisted fields.
    #[serde(flatten)]
    pub state: ChatterState,
}

/// A user's chat state.
#[derive(Debug)]
pub struct Chatter {
    id: Uuid,
    kind: ChatterKind,
    state: RwLock<ChatterState>,
}

impl Chatter {
    /// Create a chatter for a user whose session just started.
    pub fn online(id: Uuid) -> Self {
        Self::with_kind(id, ChatterKind::Online)
    }

    /// Create a stand-in chatter.
    pub fn offline(id: Uuid) -> Self {
        Self::with_kind(id, ChatterKind::Offline)
    }

    fn with_kind(id: Uuid, kind: ChatterKind) -> Self {
        Self {
            id,
            kind,
            state: RwLock::new(ChatterState::default()),
        }
    }

    /// User identifier.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Online or offline.
    pub fn kind(&self) -> ChatterKind {
        self.kind
    }

    /// Whether this chatter is backed by a live session.
    pub fn is_online(&self) -> bool {
        self.kind == ChatterKind::Online
    }

    /// Snapshot of the persisted fields.
    pub fn state(&self) -> ChatterState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Mutate the persisted fields.
    pub fn update<R>(&self, f: impl FnOnce(&mut ChatterState) -> R) -> R {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut *state)
    }

    /// The active channel name.
    pub fn active_channel(&self) -> Option<String> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .channel
            .clone()
    }

    /// Change the active channel.
    pub fn set_active_channel(&self, channel: Option<String>) {
        self.update(|s| s.channel = channel);
    }

    /// Mute a channel. Returns false if it was already muted.
    pub fn mute(&self, channel: &str) -> bool {
        self.update(|s| s.muted.insert(channel.to_lowercase()))
    }

    /// Unmute a channel. Returns false if it was not muted.
    pub fn unmute(&self, channel: &str) -> bool {
        self.update(|s| s.muted.remove(&channel.to_lowercase()))
    }

    /// Whether the channel is muted.
    pub fn is_muted(&self, channel: &str) -> bool {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .muted
            .contains(&channel.to_lowercase())
    }

    /// Ignore another user. Returns false if already ignored or if `other`
    /// is this chatter.
    pub fn ignore(&self, other: Uuid) -> bool {
        if other == self.id {
            return false;
        }
        self.update(|s| s.ignored.insert(other))
    }

    /// Stop ignoring a user. Returns false if they were not ignored.
    pub fn unignore(&self, other: Uuid) -> bool {
        self.update(|s| s.ignored.remove(&other))
    }

    /// Whether messages from `other` are hidden from this user.
    pub fn is_ignoring(&self, other: Uuid) -> bool {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .ignored
            .contains(&other)
    }

    /// Record that the user was seen now.
    pub fn touch(&self) {
        self.update(|s| s.last_seen = Some(Utc::now()));
    }

    /// Build the record written to storage.
    pub fn record(&self) -> ChatterRecord {
        ChatterRecord {
            id: self.id,
            state: self.state(),
        }
    }

    /// Replace the persisted fields with a stored record.
    ///
    /// Returns false and leaves the state untouched if the record belongs
    /// to another user.
    pub fn apply(&self, record: ChatterRecord) -> bool {
        if record.id != self.id {
            warn!(chatter = %self.id, record = %record.id, "Ignoring record for another chatter");
            return false;
        }
        self.update(|s| *s = record.state);
        true
    }
}
