//! Chat channels.
//!
//! A channel is a named broadcast group with a display prefix, a marker
//! used to address it from inside a message, a set of listeners and an
//! ordered list of conditions. Dispatch filters listeners through the
//! conditions on every send, so permission changes apply immediately.

mod registry;

pub use registry::ChannelRegistry;

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::condition::{all_pass, Condition, ConditionContext};
use crate::recipient::{Recipient, RecipientDirectory};
use crate::text::RichText;

/// Display hint for a channel in menus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Icon {
    /// Fallback icon.
    #[default]
    Paper,
    /// Book.
    Book,
    /// Writable book.
    WritableBook,
    /// Bell.
    Bell,
    /// Compass.
    Compass,
    /// Map.
    Map,
    /// Name tag.
    NameTag,
    /// Feather.
    Feather,
    /// Emerald.
    Emerald,
    /// Diamond.
    Diamond,
    /// Gold ingot.
    GoldIngot,
    /// Beacon.
    Beacon,
    /// Sign.
    Sign,
    /// Redstone.
    Redstone,
}

impl Icon {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Icon::Paper => "paper",
            Icon::Book => "book",
            Icon::WritableBook => "writable_book",
            Icon::Bell => "bell",
            Icon::Compass => "compass",
            Icon::Map => "map",
            Icon::NameTag => "name_tag",
            Icon::Feather => "feather",
            Icon::Emerald => "emerald",
            Icon::Diamond => "diamond",
            Icon::GoldIngot => "gold_ingot",
            Icon::Beacon => "beacon",
            Icon::Sign => "sign",
            Icon::Redstone => "redstone",
        }
    }
}

impl fmt::Display for Icon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Icon {
    type Err = String;

    /// Accepts `GOLD_INGOT`, `gold-ingot` or `gold ingot` alike.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(&['-', ' '][..], "_");
        match normalized.as_str() {
            "paper" => Ok(Icon::Paper),
            "book" => Ok(Icon::Book),
            "writable_book" => Ok(Icon::WritableBook),
            "bell" => Ok(Icon::Bell),
            "compass" => Ok(Icon::Compass),
            "map" => Ok(Icon::Map),
            "name_tag" => Ok(Icon::NameTag),
            "feather" => Ok(Icon::Feather),
            "emerald" => Ok(Icon::Emerald),
            "diamond" => Ok(Icon::Diamond),
            "gold_ingot" => Ok(Icon::GoldIngot),
            "beacon" => Ok(Icon::Beacon),
            "sign" => Ok(Icon::Sign),
            "redstone" => Ok(Icon::Redstone),
            _ => Err(format!("unknown icon: {s}")),
        }
    }
}

/// Outcome of a single dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeliveryReport {
    /// Listeners that received the message.
    pub delivered: usize,
    /// Listeners excluded by a failing condition.
    pub filtered: usize,
    /// Listeners that could not be resolved to a live recipient.
    pub offline: usize,
    /// Listeners whose delivery returned an error.
    pub failed: usize,
    /// Listeners hiding messages from the sender.
    pub ignored: usize,
}

impl DeliveryReport {
    /// Number of listeners considered.
    pub fn total(&self) -> usize {
        self.delivered + self.filtered + self.offline + self.failed + self.ignored
    }
}

/// Capability interface for a channel.
///
/// The registry and chat routing only see `dyn Channel`, so other channel
/// behaviors can be plugged in next to [`SimpleChannel`].
pub trait Channel: Send + Sync {
    /// Unique channel name. Compared case-insensitively.
    fn name(&self) -> &str;

    /// Free-form description.
    fn description(&self) -> &str;

    /// Prefix put in front of every message.
    fn prefix(&self) -> RichText;

    /// Replace the prefix.
    fn set_prefix(&self, prefix: RichText);

    /// Symbol that addresses this channel when typed first in a message.
    fn marker(&self) -> &str;

    /// Menu icon.
    fn icon(&self) -> Icon;

    /// Snapshot of the current listener ids.
    fn listeners(&self) -> Vec<Uuid>;

    /// Add a listener. Returns false if already listening.
    fn add_listener(&self, id: Uuid) -> bool;

    /// Remove a listener. Returns false if not listening.
    fn remove_listener(&self, id: Uuid) -> bool;

    /// Snapshot of the conditions in evaluation order.
    fn conditions(&self) -> Vec<Condition>;

    /// Append a condition.
    fn add_condition(&self, condition: Condition);

    /// Dispatch a message to every listener that passes the conditions.
    fn send(&self, text: RichText) -> DeliveryReport;

    /// Dispatch a message written by a user.
    ///
    /// Same pipeline as [`Channel::send`], except that listeners for which
    /// `hides_sender` returns true are skipped.
    fn send_from(
        &self,
        sender: Uuid,
        text: RichText,
        hides_sender: &dyn Fn(Uuid) -> bool,
    ) -> DeliveryReport;

    /// Dispatch legacy-markup text. Same pipeline as [`Channel::send`].
    fn send_text(&self, text: &str) -> DeliveryReport {
        self.send(RichText::from_legacy(text))
    }

    /// Whether the actor passes every condition.
    fn can_use(&self, actor: &dyn Recipient) -> bool {
        all_pass(&self.conditions(), &ConditionContext::new(actor, self.name()))
    }

    /// Whether the id is currently listening.
    fn is_listening(&self, id: Uuid) -> bool {
        self.listeners().contains(&id)
    }

    /// Number of listeners.
    fn listener_count(&self) -> usize {
        self.listeners().len()
    }
}

/// The default channel implementation.
pub struct SimpleChannel {
    name: String,
    description: String,
    prefix: RwLock<RichText>,
    marker: String,
    icon: Icon,
    listeners: RwLock<BTreeSet<Uuid>>,
    conditions: RwLock<Vec<Condition>>,
    directory: Arc<dyn RecipientDirectory>,
}

impl SimpleChannel {
    /// Create a channel with no listeners and no conditions.
    pub fn new(
        name: impl Into<String>,
        prefix: RichText,
        marker: impl Into<String>,
        directory: Arc<dyn RecipientDirectory>,
    ) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            prefix: RwLock::new(prefix),
            marker: marker.into(),
            icon: Icon::default(),
            listeners: RwLock::new(BTreeSet::new()),
            conditions: RwLock::new(Vec::new()),
            directory,
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the icon.
    pub fn with_icon(mut self, icon: Icon) -> Self {
        self.icon = icon;
        self
    }

    /// Set the conditions.
    pub fn with_conditions(mut self, conditions: Vec<Condition>) -> Self {
        self.conditions = RwLock::new(conditions);
        self
    }
}

impl Channel for SimpleChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn prefix(&self) -> RichText {
        self.prefix
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_prefix(&self, prefix: RichText) {
        *self.prefix.write().unwrap_or_else(PoisonError::into_inner) = prefix;
    }

    fn marker(&self) -> &str {
        &self.marker
    }

    fn icon(&self) -> Icon {
        self.icon
    }

    fn listeners(&self) -> Vec<Uuid> {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .copied()
            .collect()
    }

    fn add_listener(&self, id: Uuid) -> bool {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id)
    }

    fn remove_listener(&self, id: Uuid) -> bool {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
    }

    fn conditions(&self) -> Vec<Condition> {
        self.conditions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn add_condition(&self, condition: Condition) {
        self.conditions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(condition);
    }

    fn send(&self, text: RichText) -> DeliveryReport {
        self.dispatch(text, None)
    }

    fn send_from(
        &self,
        sender: Uuid,
        text: RichText,
        hides_sender: &dyn Fn(Uuid) -> bool,
    ) -> DeliveryReport {
        self.dispatch(text, Some((sender, hides_sender)))
    }
}

impl SimpleChannel {
    fn dispatch(
        &self,
        text: RichText,
        sender: Option<(Uuid, &dyn Fn(Uuid) -> bool)>,
    ) -> DeliveryReport {
        let listeners = self.listeners();
        let conditions = self.conditions();
        let message = self.prefix().then(text);
        let mut report = DeliveryReport::default();

        for id in listeners {
            let Some(recipient) = self.directory.resolve(id) else {
                report.offline += 1;
                continue;
            };

            let mut ctx =
                ConditionContext::new(recipient.as_ref(), &self.name).with_message(&message);
            if let Some((sender, hides_sender)) = sender {
                if hides_sender(id) {
                    report.ignored += 1;
                    continue;
                }
                ctx = ctx.with_sender(sender);
            }
            if !all_pass(&conditions, &ctx) {
                report.filtered += 1;
                continue;
            }

            match recipient.deliver(&message) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(channel = %self.name, recipient = %id, "Delivery failed: {e}");
                    report.failed += 1;
                }
            }
        }

        debug!(
            channel = %self.name,
            delivered = report.delivered,
            filtered = report.filtered,
            offline = report.offline,
            failed = report.failed,
            ignored = report.ignored,
            "Dispatched message"
        );
        report
    }
}
