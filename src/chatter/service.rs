//! One-shot chatter provider installation.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};

use tracing::{error, info};

use super::ChatterProvider;
use crate::{ChatError, Result};

const UNINITIALIZED: u8 = 0;
const INSTALLING: u8 = 1;
const READY: u8 = 2;

/// Installation state of the chatter subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    /// No provider yet.
    Uninitialized,
    /// A provider won the race and is being stored.
    Installing,
    /// A provider is installed. Terminal.
    Ready,
}

/// Holds the single chatter provider of an application.
///
/// The first successful [`ChatterService::set_provider`] wins; every later
/// attempt is rejected and logged, and the installed provider stays.
#[derive(Default)]
pub struct ChatterService {
    state: AtomicU8,
    provider: OnceLock<Arc<dyn ChatterProvider>>,
}

impl ChatterService {
    /// Create a service with no provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the provider.
    ///
    /// Fails with [`ChatError::ProviderConflict`] once any provider has
    /// claimed the slot.
    pub fn set_provider(&self, provider: Arc<dyn ChatterProvider>) -> Result<()> {
        match self.state.compare_exchange(
            UNINITIALIZED,
            INSTALLING,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                let name = provider.name().to_string();
                let _ = self.provider.set(provider);
                self.state.store(READY, Ordering::Release);
                info!(provider = %name, "Chatter provider installed");
                Ok(())
            }
            Err(_) => {
                let installed = self
                    .provider
                    .get()
                    .map(|p| p.name().to_string())
                    .unwrap_or_else(|| "<installing>".to_string());
                let err = ChatError::ProviderConflict {
                    offending: provider.name().to_string(),
                    installed,
                };
                error!("Another provider tried to replace the chatter provider: {err}");
                Err(err)
            }
        }
    }

    /// The installed provider, once ready.
    pub fn provider(&self) -> Option<Arc<dyn ChatterProvider>> {
        if !self.is_ready() {
            return None;
        }
        self.provider.get().cloned()
    }

    /// Whether a provider is installed.
    pub fn is_ready(&self) -> bool {
        self.state.load(Ordering::Acquire) == READY
    }

    /// Current installation state.
    pub fn state(&self) -> ReadyState {
        match self.state.load(Ordering::Acquire) {
            UNINITIALIZED => ReadyState::Uninitialized,
            INSTALLING => ReadyState::Installing,
            _ => ReadyState::Ready,
        }
    }
}
