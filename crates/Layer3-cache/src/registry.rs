//! In-flight task registry
//!
//! At most one parse per key runs at a time. The first caller for a key
//! becomes the leader and gets a [`LeaderGuard`]; later callers become
//! followers and wait on a `watch` channel for the leader's outcome.
//!
//! The guard removes the entry exactly once on drop, whatever happened to
//! the leader (success, error, cancellation, panic). Followers of a leader
//! that vanished without publishing see [`Waited::Abandoned`] and claim the
//! key again.

use docpool_foundation::{CacheKey, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{timeout_at, Instant};
use tracing::trace;

type Slot<T> = Option<Arc<Result<T>>>;

struct Entry<T> {
    pid: Option<u32>,
    rx: watch::Receiver<Slot<T>>,
}

type Entries<T> = Arc<Mutex<HashMap<CacheKey, Entry<T>>>>;

/// Keys currently being parsed, with the pid of the worker doing it
pub struct InFlightRegistry<T> {
    entries: Entries<T>,
}

/// Result of [`InFlightRegistry::claim`]
pub enum Claim<T> {
    Leader(LeaderGuard<T>),
    Follower(Waiter<T>),
}

/// Outcome of waiting as a follower
#[derive(Debug)]
pub enum Waited<T> {
    Done(Result<T>),
    /// The leader went away without publishing
    Abandoned,
    TimedOut,
}

impl<T: Clone + Send + Sync + 'static> InFlightRegistry<T> {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Become the leader for `key`, or wait for the current one
    pub fn claim(&self, key: CacheKey) -> Claim<T> {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get(&key) {
            trace!(key = %key, "joining in-flight task");
            return Claim::Follower(Waiter {
                rx: entry.rx.clone(),
            });
        }

        let (tx, rx) = watch::channel(None);
        entries.insert(key, Entry { pid: None, rx });
        Claim::Leader(LeaderGuard {
            key,
            entries: Arc::clone(&self.entries),
            tx,
        })
    }

    /// Worker pid recorded for an in-flight key
    pub fn pid_of(&self, key: &CacheKey) -> Option<u32> {
        self.entries.lock().get(key).and_then(|e| e.pid)
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl<T: Clone + Send + Sync + 'static> Default for InFlightRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Leader
// ============================================================================

/// Exclusive right to run the task for one key
pub struct LeaderGuard<T> {
    key: CacheKey,
    entries: Entries<T>,
    tx: watch::Sender<Slot<T>>,
}

impl<T: Clone + Send + Sync + 'static> LeaderGuard<T> {
    pub fn key(&self) -> CacheKey {
        self.key
    }

    /// Callback storing the worker pid once the task has started
    pub fn pid_recorder(&self) -> impl FnOnce(u32) + Send + 'static {
        let key = self.key;
        let entries = Arc::clone(&self.entries);
        move |pid| {
            if let Some(entry) = entries.lock().get_mut(&key) {
                entry.pid = Some(pid);
            }
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.entries.lock().get(&self.key).and_then(|e| e.pid)
    }

    /// Hand the outcome to every follower and return it to the leader
    pub fn publish(self, result: Result<T>) -> Result<T> {
        let shared = Arc::new(result);
        let own = share(&shared);
        self.tx.send_replace(Some(shared));
        own
    }
}

impl<T> Drop for LeaderGuard<T> {
    fn drop(&mut self) {
        self.entries.lock().remove(&self.key);
    }
}

// ============================================================================
// Follower
// ============================================================================

/// Follower side of an in-flight key
pub struct Waiter<T> {
    rx: watch::Receiver<Slot<T>>,
}

impl<T: Clone> Waiter<T> {
    pub async fn wait(mut self, limit: Duration) -> Waited<T> {
        let deadline = Instant::now() + limit;
        loop {
            let current = self.rx.borrow_and_update().clone();
            if let Some(shared) = current {
                return Waited::Done(share(&shared));
            }

            match timeout_at(deadline, self.rx.changed()).await {
                Ok(Ok(())) => continue,
                Ok(Err(_)) => {
                    // sender gone; a value may still have been published
                    let last = self.rx.borrow().clone();
                    return match last {
                        Some(shared) => Waited::Done(share(&shared)),
                        None => Waited::Abandoned,
                    };
                }
                Err(_) => return Waited::TimedOut,
            }
        }
    }
}

fn share<T: Clone>(result: &Result<T>) -> Result<T> {
    match result {
        Ok(value) => Ok(value.clone()),
        Err(e) => Err(e.duplicate()),
    }
}
