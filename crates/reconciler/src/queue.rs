//! Deduplicating work queue with per-key retry backoff.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tracing::trace;

use crate::types::RecordKey;

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<RecordKey>,
    queued: HashSet<RecordKey>,
    processing: HashSet<RecordKey>,
    dirty: HashSet<RecordKey>,
    retrying: HashSet<RecordKey>,
    failures: HashMap<RecordKey, u32>,
    shutdown: bool,
}

/// FIFO of record keys that hands each key to at most one worker at a time.
///
/// A key added while queued is dropped as a duplicate. A key added while
/// in flight is re-queued once its worker calls [`WorkQueue::done`]. A key
/// released through [`WorkQueue::done_with_retry`] ignores adds until its
/// backoff elapses.
#[derive(Debug)]
pub struct WorkQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    retry_base_delay: Duration,
    retry_max_delay: Duration,
}

impl WorkQueue {
    /// Create a queue with the given retry backoff bounds.
    pub fn new(retry_base_delay: Duration, retry_max_delay: Duration) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            retry_base_delay,
            retry_max_delay,
        }
    }

    /// Enqueue `key` unless it is already waiting.
    pub async fn add(&self, key: RecordKey) {
        let mut state = self.state.lock().await;
        if state.shutdown || state.queued.contains(&key) {
            return;
        }
        if state.retrying.contains(&key) {
            trace!(key = %key, "Key backing off, retry already scheduled");
            return;
        }
        if state.processing.contains(&key) {
            trace!(key = %key, "Key in flight, marking dirty");
            state.dirty.insert(key);
            return;
        }
        state.queued.insert(key.clone());
        state.pending.push_back(key);
        drop(state);
        self.notify.notify_one();
    }

    /// Enqueue `key` after `delay`, ending any backoff it is waiting out.
    pub fn add_after(self: &Arc<Self>, key: RecordKey, delay: Duration) {
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.state.lock().await.retrying.remove(&key);
            queue.add(key).await;
        });
    }

    /// Wait for the next key. `None` once the queue is shut down.
    pub async fn next(&self) -> Option<RecordKey> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock().await;
                if state.shutdown {
                    return None;
                }
                if let Some(key) = state.pending.pop_front() {
                    state.queued.remove(&key);
                    state.processing.insert(key.clone());
                    return Some(key);
                }
            }

            notified.await;
        }
    }

    /// Mark `key` as no longer in flight.
    pub async fn done(&self, key: &RecordKey) {
        let mut state = self.state.lock().await;
        state.processing.remove(key);
        if state.dirty.remove(key) && !state.shutdown && state.queued.insert(key.clone()) {
            state.pending.push_back(key.clone());
            drop(state);
            self.notify.notify_one();
        }
    }

    /// Release a failed `key` and re-queue it once `delay` has passed.
    ///
    /// Changes seen while the key was in flight, or while it backs off, are
    /// folded into the retry.
    pub async fn done_with_retry(self: &Arc<Self>, key: &RecordKey, delay: Duration) {
        {
            let mut state = self.state.lock().await;
            state.processing.remove(key);
            state.dirty.remove(key);
            if state.shutdown {
                return;
            }
            state.retrying.insert(key.clone());
        }
        self.add_after(key.clone(), delay);
    }

    /// Count a failed pass for `key` and return the delay before its retry.
    pub async fn record_failure(&self, key: &RecordKey) -> Duration {
        let mut state = self.state.lock().await;
        let failures = state.failures.entry(key.clone()).or_insert(0);
        *failures = failures.saturating_add(1);
        self.backoff(*failures)
    }

    /// Reset the failure count of `key`.
    pub async fn forget(&self, key: &RecordKey) {
        self.state.lock().await.failures.remove(key);
    }

    /// Stop handing out keys and wake every waiting worker.
    pub async fn shutdown(&self) {
        self.state.lock().await.shutdown = true;
        self.notify.notify_waiters();
    }

    /// Number of keys waiting.
    pub async fn len(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    /// Whether no key is waiting.
    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.pending.is_empty()
    }

    /// `retry_base_delay * 2^(failures - 1)`, capped at `retry_max_delay`.
    pub fn backoff(&self, failures: u32) -> Duration {
        let factor = 2u32
            .checked_pow(failures.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.retry_base_delay
            .checked_mul(factor)
            .unwrap_or(self.retry_max_delay)
            .min(self.retry_max_delay)
    }
}
