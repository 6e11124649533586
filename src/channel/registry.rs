//! Channel registry.
//!
//! Holds every channel known to the process, keyed by lowercase name.
//! Shared by chat dispatch, session handling and the admin command, so
//! all access goes through a read/write lock and callers only ever get
//! fully built `Arc<dyn Channel>` handles.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info, warn};
use uuid::Uuid;

use super::Channel;

/// Registry of uniquely named channels.
#[derive(Default)]
pub struct ChannelRegistry {
    /// Channels indexed by lowercase name.
    channels: RwLock<HashMap<String, Arc<dyn Channel>>>,
}

impl ChannelRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a channel.
    ///
    /// Returns false, leaving the existing channel in place, if a channel
    /// with the same name (ignoring case) is already registered.
    pub fn register(&self, channel: Arc<dyn Channel>) -> bool {
        let key = channel.name().to_lowercase();
        let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);

        if channels.contains_key(&key) {
            debug!(channel = %channel.name(), "Channel already registered, ignoring");
            return false;
        }

        if !channel.marker().is_empty() {
            if let Some(other) = channels.values().find(|c| c.marker() == channel.marker()) {
                warn!(
                    channel = %channel.name(),
                    other = %other.name(),
                    marker = %channel.marker(),
                    "Marker already used by another channel"
                );
            }
        }

        info!(channel = %channel.name(), marker = %channel.marker(), "Registered channel");
        channels.insert(key, channel);
        true
    }

    /// Find a channel by name, ignoring case.
    pub fn find(&self, name: &str) -> Option<Arc<dyn Channel>> {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&name.to_lowercase())
            .cloned()
    }

    /// Find the channel addressed by a leading marker in `text`.
    ///
    /// When several markers match, the longest wins. Returns the channel
    /// and the remaining text with the marker stripped.
    pub fn find_by_marker<'t>(&self, text: &'t str) -> Option<(Arc<dyn Channel>, &'t str)> {
        let channels = self.channels.read().unwrap_or_else(PoisonError::into_inner);
        let channel = channels
            .values()
            .filter(|c| !c.marker().is_empty() && text.starts_with(c.marker()))
            .max_by(|a, b| {
                a.marker()
                    .len()
                    .cmp(&b.marker().len())
                    .then_with(|| b.name().cmp(a.name()))
            })?
            .clone();
        let rest = &text[channel.marker().len()..];
        Some((channel, rest))
    }

    /// Snapshot of all channels, sorted by name.
    pub fn all(&self) -> Vec<Arc<dyn Channel>> {
        let mut result: Vec<Arc<dyn Channel>> = self
            .channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        result.sort_by_key(|c| c.name().to_lowercase());
        result
    }

    /// Get the number of channels.
    pub fn len(&self) -> usize {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no channel is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove a listener from every channel.
    ///
    /// This should be called when a session ends.
    pub fn remove_listener_everywhere(&self, id: Uuid) -> usize {
        self.all()
            .iter()
            .filter(|channel| channel.remove_listener(id))
            .count()
    }
}
