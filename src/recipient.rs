//! Live recipients of channel messages.
//!
//! The chat core never talks to connections directly. It resolves a
//! listener id into a [`Recipient`] through a [`RecipientDirectory`] and
//! asks the recipient about its permissions, world and groups when
//! evaluating channel conditions.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use uuid::Uuid;

use crate::text::RichText;
use crate::Result;

/// Permission node that grants every other node.
pub const WILDCARD_PERMISSION: &str = "*";

/// A connected user that can receive messages.
pub trait Recipient: Send + Sync {
    /// Stable user identifier.
    fn id(&self) -> Uuid;

    /// Name shown in front of messages this user sends.
    fn display_name(&self) -> String;

    /// Whether the user holds the given permission node.
    fn has_permission(&self, node: &str) -> bool;

    /// The world or region the user is currently in, if any.
    fn world(&self) -> Option<String>;

    /// Groups the user belongs to.
    fn groups(&self) -> Vec<String>;

    /// Deliver a composed message to the user.
    fn deliver(&self, message: &RichText) -> Result<()>;
}

/// Resolves listener ids into live recipients.
pub trait RecipientDirectory: Send + Sync {
    /// Returns `None` when the user is not connected.
    fn resolve(&self, id: Uuid) -> Option<Arc<dyn Recipient>>;

    /// Find a connected user by display name, ignoring case.
    fn find_by_name(&self, _name: &str) -> Option<Arc<dyn Recipient>> {
        None
    }
}

/// Check a node against a granted set, honoring `*` and `prefix.*` grants.
pub fn permission_granted(granted: &HashSet<String>, node: &str) -> bool {
    if granted.contains(WILDCARD_PERMISSION) || granted.contains(node) {
        return true;
    }

    let mut rest = node;
    while let Some(pos) = rest.rfind('.') {
        rest = &rest[..pos];
        if granted.contains(&format!("{rest}.*")) {
            return true;
        }
    }
    false
}

/// An in-process recipient.
///
/// Keeps every delivered message in an inbox and can optionally echo it
/// to stdout with ANSI colors. Used by the console binary and by tests.
pub struct LocalRecipient {
    id: Uuid,
    name: String,
    permissions: RwLock<HashSet<String>>,
    world: RwLock<Option<String>>,
    groups: RwLock<HashSet<String>>,
    inbox: Mutex<Vec<RichText>>,
    echo: bool,
}

impl LocalRecipient {
    /// Create a recipient with no permissions, world or groups.
    pub fn new(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            permissions: RwLock::new(HashSet::new()),
            world: RwLock::new(None),
            groups: RwLock::new(HashSet::new()),
            inbox: Mutex::new(Vec::new()),
            echo: false,
        }
    }

    /// Print every delivered message to stdout.
    pub fn with_echo(mut self) -> Self {
        self.echo = true;
        self
    }

    /// Grant a permission node.
    pub fn grant(&self, node: impl Into<String>) {
        self.permissions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(node.into());
    }

    /// Revoke a permission node.
    pub fn revoke(&self, node: &str) {
        self.permissions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(node);
    }

    /// Move the user to another world.
    pub fn set_world(&self, world: Option<String>) {
        *self.world.write().unwrap_or_else(PoisonError::into_inner) = world;
    }

    /// Add the user to a group.
    pub fn join_group(&self, group: impl Into<String>) {
        self.groups
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(group.into());
    }

    /// Messages delivered so far.
    pub fn inbox(&self) -> Vec<RichText> {
        self.inbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Plain-text view of the inbox.
    pub fn inbox_plain(&self) -> Vec<String> {
        self.inbox().iter().map(RichText::to_plain).collect()
    }

    /// Drain the inbox.
    pub fn take_inbox(&self) -> Vec<RichText> {
        std::mem::take(&mut *self.inbox.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl Recipient for LocalRecipient {
    fn id(&self) -> Uuid {
        self.id
    }

    fn display_name(&self) -> String {
        self.name.clone()
    }

    fn has_permission(&self, node: &str) -> bool {
        let granted = self.permissions.read().unwrap_or_else(PoisonError::into_inner);
        permission_granted(&granted, node)
    }

    fn world(&self) -> Option<String> {
        self.world.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn groups(&self) -> Vec<String> {
        self.groups
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    fn deliver(&self, message: &RichText) -> Result<()> {
        if self.echo {
            println!("{}", message.to_ansi());
        }
        self.inbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.clone());
        Ok(())
    }
}

/// A directory backed by an in-memory map.
#[derive(Default)]
pub struct LocalDirectory {
    recipients: RwLock<HashMap<Uuid, Arc<dyn Recipient>>>,
}

impl LocalDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connected recipient, replacing any previous handle.
    pub fn insert(&self, recipient: Arc<dyn Recipient>) {
        self.recipients
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(recipient.id(), recipient);
    }

    /// Forget a recipient. Returns true if it was present.
    pub fn remove(&self, id: Uuid) -> bool {
        self.recipients
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some()
    }

    /// Number of connected recipients.
    pub fn len(&self) -> usize {
        self.recipients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nobody is connected.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RecipientDirectory for LocalDirectory {
    fn resolve(&self, id: Uuid) -> Option<Arc<dyn Recipient>> {
        self.recipients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    fn find_by_name(&self, name: &str) -> Option<Arc<dyn Recipient>> {
        self.recipients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .find(|r| r.display_name().eq_ignore_ascii_case(name))
            .cloned()
    }
}
