//! Background persistence queue.
//!
//! Every chatter id gets its own FIFO lane, so a load issued when a
//! session starts always finishes before a save issued later by the same
//! session begins. Lanes for different ids run in parallel, bounded by a
//! semaphore. A lane's task exits as soon as its queue is empty.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{mpsc, oneshot, Semaphore};
use tracing::trace;
use uuid::Uuid;

use crate::{ChatError, Result};

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

type Lanes = Arc<Mutex<HashMap<Uuid, mpsc::UnboundedSender<Job>>>>;

/// Completion handle for a background load or save.
///
/// Dropping the ticket does not cancel the work.
#[derive(Debug)]
pub struct PersistTicket {
    rx: oneshot::Receiver<Result<()>>,
}

impl PersistTicket {
    /// Create a ticket and the sender that completes it.
    pub fn channel() -> (oneshot::Sender<Result<()>>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }

    /// A ticket that is already complete.
    pub fn ready(result: Result<()>) -> Self {
        let (tx, ticket) = Self::channel();
        let _ = tx.send(result);
        ticket
    }

    /// Wait for the operation to finish.
    pub async fn wait(self) -> Result<()> {
        self.rx
            .await
            .map_err(|_| ChatError::TaskAborted("result was never reported".to_string()))?
    }
}

/// Per-id ordered, bounded background executor.
#[derive(Clone)]
pub struct PersistQueue {
    lanes: Lanes,
    permits: Arc<Semaphore>,
}

impl PersistQueue {
    /// Create a queue running at most `workers` jobs at once.
    pub fn new(workers: usize) -> Self {
        Self {
            lanes: Arc::new(Mutex::new(HashMap::new())),
            permits: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    /// Queue a job behind every earlier job for the same id.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit<F>(&self, id: Uuid, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let job: Job = Box::pin(job);
        let mut lanes = self.lanes.lock().unwrap_or_else(PoisonError::into_inner);

        let job = match lanes.get(&id) {
            Some(tx) => match tx.send(job) {
                Ok(()) => return,
                Err(mpsc::error::SendError(job)) => job,
            },
            None => job,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(job);
        lanes.insert(id, tx);
        drop(lanes);

        trace!(chatter = %id, "Opened persistence lane");
        tokio::spawn(drain(
            id,
            rx,
            Arc::clone(&self.lanes),
            Arc::clone(&self.permits),
        ));
    }

    /// Number of ids with queued or running work.
    pub fn active_lanes(&self) -> usize {
        self.lanes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

async fn drain(
    id: Uuid,
    mut rx: mpsc::UnboundedReceiver<Job>,
    lanes: Lanes,
    permits: Arc<Semaphore>,
) {
    loop {
        let job = match rx.try_recv() {
            Ok(job) => job,
            Err(_) => {
                // Re-check under the lock so a concurrent submit either
                // lands in this lane or opens a new one.
                let mut lanes = lanes.lock().unwrap_or_else(PoisonError::into_inner);
                match rx.try_recv() {
                    Ok(job) => job,
                    Err(_) => {
                        lanes.remove(&id);
                        trace!(chatter = %id, "Closed persistence lane");
                        return;
                    }
                }
            }
        };

        let Ok(_permit) = Arc::clone(&permits).acquire_owned().await else {
            return;
        };
        job.await;
    }
}
