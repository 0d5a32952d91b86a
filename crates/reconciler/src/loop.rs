//! Continuous reconciliation loop.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::queue::WorkQueue;
use crate::reconciler::Reconciler;
use crate::types::{RecordKey, ReconcileOutcome};

/// Configuration for the controller loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Concurrent workers; distinct keys only.
    pub workers: usize,
    /// Interval between full resyncs of every stored key.
    #[serde(with = "ghissue_github::config::duration_secs")]
    pub resync_interval: Duration,
    /// Deadline of a single reconcile pass.
    #[serde(with = "ghissue_github::config::duration_secs")]
    pub reconcile_timeout: Duration,
    /// Delay before the first retry of a failed key.
    #[serde(with = "ghissue_github::config::duration_secs")]
    pub retry_base_delay: Duration,
    /// Upper bound of the retry delay.
    #[serde(with = "ghissue_github::config::duration_secs")]
    pub retry_max_delay: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            resync_interval: Duration::from_secs(300),
            reconcile_timeout: Duration::from_secs(60),
            retry_base_delay: Duration::from_secs(1),
            retry_max_delay: Duration::from_secs(300),
        }
    }
}

impl ControllerConfig {
    /// Check the configuration for values the loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::invalid_config("workers must be at least 1"));
        }
        if self.reconcile_timeout.is_zero() {
            return Err(Error::invalid_config("reconcile_timeout must be positive"));
        }
        if self.resync_interval.is_zero() {
            return Err(Error::invalid_config("resync_interval must be positive"));
        }
        if self.retry_base_delay > self.retry_max_delay {
            return Err(Error::invalid_config(
                "retry_base_delay must not exceed retry_max_delay",
            ));
        }
        Ok(())
    }
}

/// Drives the reconciler from a work queue.
///
/// Keys arrive through [`ControllerHandle::enqueue`], the optional store
/// change feed, and the periodic resync. Failed passes are re-queued with
/// backoff; nothing is dropped.
pub struct Controller {
    /// The reconciler.
    reconciler: Arc<Reconciler>,
    /// Pending keys.
    queue: Arc<WorkQueue>,
    /// Loop configuration.
    config: ControllerConfig,
    /// Change notifications from the store.
    changes: Option<broadcast::Receiver<RecordKey>>,
    /// Stop signal receiver.
    stop_rx: watch::Receiver<bool>,
    /// Stop signal sender (for external control).
    stop_tx: watch::Sender<bool>,
}

impl Controller {
    /// Create a new controller.
    pub fn new(reconciler: Arc<Reconciler>, config: ControllerConfig) -> Result<Self> {
        config.validate()?;
        let queue = Arc::new(WorkQueue::new(
            config.retry_base_delay,
            config.retry_max_delay,
        ));
        let (stop_tx, stop_rx) = watch::channel(false);
        Ok(Self {
            reconciler,
            queue,
            config,
            changes: None,
            stop_rx,
            stop_tx,
        })
    }

    /// Enqueue every key announced on `changes`.
    #[must_use]
    pub fn with_changes(mut self, changes: broadcast::Receiver<RecordKey>) -> Self {
        self.changes = Some(changes);
        self
    }

    /// Get a handle for enqueueing keys and stopping the loop.
    pub fn handle(&self) -> ControllerHandle {
        ControllerHandle {
            queue: Arc::clone(&self.queue),
            stop_tx: self.stop_tx.clone(),
        }
    }

    /// Get the configuration.
    pub const fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Run until stopped.
    ///
    /// Workers finish their current pass before this returns.
    pub async fn run(mut self) -> Result<()> {
        info!(
            workers = self.config.workers,
            resync_secs = self.config.resync_interval.as_secs(),
            timeout_ms = self.config.reconcile_timeout.as_millis(),
            finalizer = %self.reconciler.config().finalizer,
            "Starting controller"
        );

        let mut workers = JoinSet::new();
        for id in 0..self.config.workers {
            let worker = Worker {
                id,
                reconciler: Arc::clone(&self.reconciler),
                queue: Arc::clone(&self.queue),
                timeout: self.config.reconcile_timeout,
            };
            workers.spawn(worker.run());
        }

        let mut resync = tokio::time::interval(self.config.resync_interval);
        let mut changes = self.changes.take();

        loop {
            tokio::select! {
                _ = resync.tick() => {
                    self.resync().await;
                }
                change = next_change(&mut changes) => {
                    match change {
                        Ok(key) => self.queue.add(key).await,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Change feed lagged, resyncing");
                            self.resync().await;
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            debug!("Change feed closed");
                            changes = None;
                        }
                    }
                }
                changed = self.stop_rx.changed() => {
                    if changed.is_err() || *self.stop_rx.borrow() {
                        break;
                    }
                }
            }
        }

        self.queue.shutdown().await;
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Worker task failed");
            }
        }
        info!("Controller stopped");
        Ok(())
    }

    async fn resync(&self) {
        match self.reconciler.store().keys().await {
            Ok(keys) => {
                debug!(keys = keys.len(), "Resyncing");
                for key in keys {
                    self.queue.add(key).await;
                }
            }
            Err(e) => warn!(error = %e, "Failed to list keys for resync"),
        }
    }
}

async fn next_change(
    changes: &mut Option<broadcast::Receiver<RecordKey>>,
) -> std::result::Result<RecordKey, broadcast::error::RecvError> {
    match changes {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

struct Worker {
    id: usize,
    reconciler: Arc<Reconciler>,
    queue: Arc<WorkQueue>,
    timeout: Duration,
}

impl Worker {
    async fn run(self) {
        debug!(worker = self.id, "Worker started");
        while let Some(key) = self.queue.next().await {
            match self.reconcile(&key).await {
                Ok(outcome) => {
                    self.queue.forget(&key).await;
                    self.queue.done(&key).await;
                    debug!(
                        worker = self.id,
                        key = %key,
                        outcome = ?outcome,
                        quiescent = outcome.is_quiescent(),
                        "Reconciled"
                    );
                }
                Err(e) => {
                    let delay = self.queue.record_failure(&key).await;
                    if e.is_transient() {
                        warn!(
                            worker = self.id,
                            key = %key,
                            error = %e,
                            retry_ms = delay.as_millis(),
                            "Reconcile failed, retrying"
                        );
                    } else {
                        error!(
                            worker = self.id,
                            key = %key,
                            error = %e,
                            retry_ms = delay.as_millis(),
                            "Reconcile defect, retrying"
                        );
                    }
                    self.queue.done_with_retry(&key, delay).await;
                }
            }
        }
        debug!(worker = self.id, "Worker stopped");
    }

    async fn reconcile(&self, key: &RecordKey) -> Result<ReconcileOutcome> {
        let timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
        tokio::time::timeout(self.timeout, self.reconciler.reconcile(key))
            .await
            .map_err(|_| Error::timeout(key.clone(), timeout_ms))?
    }
}

/// Handle to feed and stop a running controller.
#[derive(Clone)]
pub struct ControllerHandle {
    queue: Arc<WorkQueue>,
    stop_tx: watch::Sender<bool>,
}

impl ControllerHandle {
    /// Request a reconcile pass for `key`.
    pub async fn enqueue(&self, key: RecordKey) -> Result<()> {
        if self.is_stopped() {
            return Err(Error::LoopStopped);
        }
        self.queue.add(key).await;
        Ok(())
    }

    /// Stop the loop.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    /// Whether a stop was requested.
    pub fn is_stopped(&self) -> bool {
        *self.stop_tx.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_rejects_zero_workers() {
        let config = ControllerConfig {
            workers: 0,
            ..ControllerConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig { .. })));
    }

    #[test]
    fn test_config_rejects_inverted_backoff() {
        let config = ControllerConfig {
            retry_base_delay: Duration::from_secs(10),
            retry_max_delay: Duration::from_secs(1),
            ..ControllerConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(ControllerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_config_reads_seconds() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let config: ControllerConfig =
            serde_json::from_str(r#"{ "workers": 4, "reconcile_timeout": 5 }"#)?;
        assert_eq!(config.workers, 4);
        assert_eq!(config.reconcile_timeout, Duration::from_secs(5));
        assert_eq!(config.resync_interval, Duration::from_secs(300));
        Ok(())
    }
}
