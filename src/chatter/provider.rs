//! Chatter providers.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tracing::{debug, error, warn};
use uuid::Uuid;

use super::{Chatter, ChatterRecord, ChatterStorage, PersistQueue, PersistTicket};
use crate::config::PersistenceConfig;
use crate::{ChatError, Result};

/// Owns the chatters of connected users and their persistence.
///
/// `load` and `save` never block the caller: they queue work and hand
/// back a [`PersistTicket`] that may be awaited or dropped.
pub trait ChatterProvider: Send + Sync {
    /// Provider name, reported when another provider conflicts with it.
    fn name(&self) -> &str;

    /// Insert or replace the in-memory chatter for its id.
    fn put_chatter(&self, chatter: Arc<Chatter>);

    /// Get the in-memory chatter for an id.
    fn get_chatter(&self, id: Uuid) -> Option<Arc<Chatter>>;

    /// Evict a chatter from memory. Stored data is kept.
    fn remove_chatter(&self, id: Uuid) -> Option<Arc<Chatter>>;

    /// Snapshot of all in-memory chatters.
    fn chatters(&self) -> Vec<Arc<Chatter>>;

    /// Populate the chatter from storage in place.
    ///
    /// A missing record leaves the chatter at its defaults.
    fn load(&self, chatter: Arc<Chatter>) -> PersistTicket;

    /// Write the chatter's persisted fields, replacing any stored record.
    fn save(&self, chatter: Arc<Chatter>) -> PersistTicket;
}

/// Retry policy for saves.
#[derive(Debug, Clone, Copy)]
pub struct PersistOptions {
    /// Maximum concurrent storage operations.
    pub workers: usize,
    /// Extra attempts after a failed save.
    pub save_retries: u32,
    /// Pause between save attempts.
    pub retry_delay: Duration,
}

impl Default for PersistOptions {
    fn default() -> Self {
        Self::from(&PersistenceConfig::default())
    }
}

impl From<&PersistenceConfig> for PersistOptions {
    fn from(config: &PersistenceConfig) -> Self {
        Self {
            workers: config.workers,
            save_retries: config.save_retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        }
    }
}

/// Default provider: a map in memory plus a [`ChatterStorage`] backend.
pub struct SimpleChatterProvider<S> {
    name: String,
    chatters: RwLock<HashMap<Uuid, Arc<Chatter>>>,
    storage: Arc<S>,
    queue: PersistQueue,
    options: PersistOptions,
}

impl<S: ChatterStorage> SimpleChatterProvider<S> {
    /// Create a provider over the given storage.
    pub fn new(name: impl Into<String>, storage: S, options: PersistOptions) -> Self {
        Self {
            name: name.into(),
            chatters: RwLock::new(HashMap::new()),
            storage: Arc::new(storage),
            queue: PersistQueue::new(options.workers),
            options,
        }
    }

    /// The storage backend.
    pub fn storage(&self) -> &S {
        &self.storage
    }
}

/// Run a storage call on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ChatError::TaskAborted(e.to_string()))?
}

impl<S: ChatterStorage> ChatterProvider for SimpleChatterProvider<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn put_chatter(&self, chatter: Arc<Chatter>) {
        self.chatters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(chatter.id(), chatter);
    }

    fn get_chatter(&self, id: Uuid) -> Option<Arc<Chatter>> {
        self.chatters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    fn remove_chatter(&self, id: Uuid) -> Option<Arc<Chatter>> {
        self.chatters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
    }

    fn chatters(&self) -> Vec<Arc<Chatter>> {
        self.chatters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    fn load(&self, chatter: Arc<Chatter>) -> PersistTicket {
        let (tx, ticket) = PersistTicket::channel();
        let storage = Arc::clone(&self.storage);
        let id = chatter.id();

        self.queue.submit(id, async move {
            let outcome = match blocking(move || storage.read(id)).await {
                Ok(Some(record)) => {
                    chatter.apply(record);
                    debug!(chatter = %id, "Loaded chatter");
                    Ok(())
                }
                Ok(None) => {
                    debug!(chatter = %id, "No stored chatter, keeping defaults");
                    Ok(())
                }
                Err(e) => {
                    warn!(chatter = %id, "Failed to load chatter, keeping defaults: {e}");
                    Err(e)
                }
            };
            let _ = tx.send(outcome);
        });

        ticket
    }

    fn save(&self, chatter: Arc<Chatter>) -> PersistTicket {
        let (tx, ticket) = PersistTicket::channel();
        let storage = Arc::clone(&self.storage);
        let options = self.options;
        let id = chatter.id();

        self.queue.submit(id, async move {
            let mut attempt = 0;
            let outcome = loop {
                // Snapshot when the job runs, after any earlier load
                let record = chatter.record();
                let storage = Arc::clone(&storage);
                match blocking(move || storage.write(&record)).await {
                    Ok(()) => {
                        debug!(chatter = %id, "Saved chatter");
                        break Ok(());
                    }
                    Err(e) if attempt < options.save_retries => {
                        attempt += 1;
                        warn!(chatter = %id, attempt, "Failed to save chatter, retrying: {e}");
                        tokio::time::sleep(options.retry_delay).await;
                    }
                    Err(e) => {
                        error!(chatter = %id, attempts = attempt + 1, "Failed to save chatter: {e}");
                        break Err(e);
                    }
                }
            };
            let _ = tx.send(outcome);
        });

        ticket
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chatter::{ChatterState, JsonFileStorage, MemoryStorage};
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    fn options() -> PersistOptions {
        PersistOptions {
            workers: 2,
            save_retries: 2,
            retry_delay: Duration::from_millis(1),
        }
    }

    /// Fails the first `failures` writes, then delegates to memory.
    struct FlakyStorage {
        failures: AtomicU32,
        inner: MemoryStorage,
    }

    impl ChatterStorage for FlakyStorage {
        fn read(&self, id: Uuid) -> Result<Option<ChatterRecord>> {
            self.inner.read(id)
        }

        fn write(&self, record: &ChatterRecord) -> Result<()> {
            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(ChatError::Io(std::io::Error::other("disk full")));
            }
            self.inner.write(record)
        }
    }

    struct BrokenStorage;

    impl ChatterStorage for BrokenStorage {
        fn read(&self, _id: Uuid) -> Result<Option<ChatterRecord>> {
            Err(ChatError::Io(std::io::Error::other("unreadable")))
        }

        fn write(&self, _record: &ChatterRecord) -> Result<()> {
            Err(ChatError::Io(std::io::Error::other("unwritable")))
        }
    }

    #[test]
    fn test_put_get_remove() {
        let provider = SimpleChatterProvider::new("memory", MemoryStorage::new(), options());
        let chatter = Arc::new(Chatter::online(Uuid::new_v4()));
        let id = chatter.id();

        assert!(provider.get_chatter(id).is_none());
        provider.put_chatter(Arc::clone(&chatter));
        assert!(Arc::ptr_eq(&provider.get_chatter(id).unwrap(), &chatter));
        assert_eq!(provider.chatters().len(), 1);

        // Put overwrites
        let replacement = Arc::new(Chatter::offline(id));
        provider.put_chatter(Arc::clone(&replacement));
        assert!(Arc::ptr_eq(&provider.get_chatter(id).unwrap(), &replacement));

        assert!(provider.remove_chatter(id).is_some());
        assert!(provider.get_chatter(id).is_none());
        assert!(provider.remove_chatter(id).is_none());
    }

    #[test]
    fn test_put_does_not_touch_storage() {
        let provider = SimpleChatterProvider::new("memory", MemoryStorage::new(), options());
        provider.put_chatter(Arc::new(Chatter::online(Uuid::new_v4())));
        assert!(provider.storage().is_empty());
    }

    #[tokio::test]
    async fn test_load_without_record_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let provider =
            SimpleChatterProvider::new("json", JsonFileStorage::new(dir.path()), options());
        let chatter = Arc::new(Chatter::online(Uuid::new_v4()));

        provider.load(Arc::clone(&chatter)).wait().await.unwrap();
        assert_eq!(chatter.state(), ChatterState::default());
    }

    #[tokio::test]
    async fn test_save_then_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let provider =
            SimpleChatterProvider::new("json", JsonFileStorage::new(dir.path()), options());
        let id = Uuid::new_v4();

        let original = Arc::new(Chatter::online(id));
        original.set_active_channel(Some("staff".to_string()));
        original.mute("trade");
        original.touch();
        provider.save(Arc::clone(&original)).wait().await.unwrap();

        let fresh = Arc::new(Chatter::online(id));
        provider.load(Arc::clone(&fresh)).wait().await.unwrap();
        assert_eq!(fresh.state(), original.state());
    }

    #[tokio::test]
    async fn test_load_then_save_keeps_loaded_state() {
        let storage = MemoryStorage::new();
        let id = Uuid::new_v4();
        let mut state = ChatterState::default();
        state.channel = Some("staff".to_string());
        storage
            .write(&ChatterRecord {
                id,
                state: state.clone(),
            })
            .unwrap();

        let provider = SimpleChatterProvider::new("memory", storage, options());
        let chatter = Arc::new(Chatter::online(id));

        // Issued back to back; the save must see the loaded state
        let load = provider.load(Arc::clone(&chatter));
        let save = provider.save(Arc::clone(&chatter));
        load.wait().await.unwrap();
        save.wait().await.unwrap();

        let stored = provider.storage().read(id).unwrap().unwrap();
        assert_eq!(stored.state, state);
    }

    #[tokio::test]
    async fn test_failed_load_keeps_defaults() {
        let provider = SimpleChatterProvider::new("broken", BrokenStorage, options());
        let chatter = Arc::new(Chatter::online(Uuid::new_v4()));

        let result = provider.load(Arc::clone(&chatter)).wait().await;
        assert!(result.is_err());
        assert_eq!(chatter.state(), ChatterState::default());
    }

    #[tokio::test]
    async fn test_save_retries_then_succeeds() {
        let storage = FlakyStorage {
            failures: AtomicU32::new(2),
            inner: MemoryStorage::new(),
        };
        let provider = SimpleChatterProvider::new("flaky", storage, options());
        let chatter = Arc::new(Chatter::online(Uuid::new_v4()));
        chatter.mute("trade");

        provider.save(Arc::clone(&chatter)).wait().await.unwrap();
        assert_eq!(provider.storage().inner.len(), 1);
    }

    #[tokio::test]
    async fn test_save_gives_up_after_retries() {
        let provider = SimpleChatterProvider::new("broken", BrokenStorage, options());
        let chatter = Arc::new(Chatter::online(Uuid::new_v4()));
        assert!(provider.save(chatter).wait().await.is_err());
    }

    #[tokio::test]
    async fn test_save_after_eviction_still_completes() {
        let provider = SimpleChatterProvider::new("memory", MemoryStorage::new(), options());
        let chatter = Arc::new(Chatter::online(Uuid::new_v4()));
        let id = chatter.id();
        provider.put_chatter(Arc::clone(&chatter));

        let ticket = provider.save(Arc::clone(&chatter));
        provider.remove_chatter(id);
        drop(chatter);

        ticket.wait().await.unwrap();
        assert!(provider.storage().read(id).unwrap().is_some());
    }
}
