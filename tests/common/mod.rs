//! Test helpers for integration tests.
//!
//! Builds a [`ChatApp`] from a TOML snippet with chatter storage in a
//! temporary directory.

#![allow(dead_code)]

use std::sync::Arc;

use tempfile::TempDir;
use uuid::Uuid;

use hubbub::{ChatApp, Config, LocalDirectory, LocalRecipient};

/// Channels used by most tests.
pub const CHANNELS: &str = r##"
default_channel = "global"

[channels.global]
name = "Global"
prefix = "&7[&aG&7] "
description = "Everyone"
marker = "!"
logo = "paper"

[channels.staff]
name = "Staff"
prefix = "&c[S] "
marker = "#"
logo = "beacon"
conditions = "permission:chat.staff"

[channels.trade]
name = "Trade"
prefix = "&e[T] "
marker = "$"
"##;

/// A bootstrapped application with its storage directory.
pub struct TestApp {
    pub app: ChatApp,
    pub directory: Arc<LocalDirectory>,
    pub config: Config,
    /// Kept alive for the duration of the test.
    pub storage: TempDir,
}

impl TestApp {
    /// Bootstrap from a TOML snippet.
    pub fn from_toml(toml: &str) -> Self {
        let storage = TempDir::new().unwrap();
        Self::with_storage(toml, storage)
    }

    /// Bootstrap from a TOML snippet over an existing storage directory.
    pub fn with_storage(toml: &str, storage: TempDir) -> Self {
        let mut config = Config::parse(toml).unwrap();
        config.storage.path = storage.path().to_string_lossy().into_owned();

        let directory = Arc::new(LocalDirectory::new());
        let app = ChatApp::bootstrap(&config, directory.clone());
        Self {
            app,
            directory,
            config,
            storage,
        }
    }

    /// Add a connected user.
    pub fn user(&self, name: &str) -> Arc<LocalRecipient> {
        self.user_with_id(Uuid::new_v4(), name)
    }

    /// Add a connected user with a fixed id.
    pub fn user_with_id(&self, id: Uuid, name: &str) -> Arc<LocalRecipient> {
        let user = Arc::new(LocalRecipient::new(id, name));
        self.directory.insert(user.clone());
        user
    }
}
