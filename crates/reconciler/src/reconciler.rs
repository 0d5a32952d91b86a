//! Reconciler implementation.

use std::sync::Arc;

use ghissue_github::{IssueService, RemoteIssue};
use tracing::{Instrument, Span, debug, info, info_span, warn};

use crate::error::{Error, Result};
use crate::status::project;
use crate::store::RecordStore;
use crate::types::{DesiredRecord, RecordKey, ReconcileAction, ReconcileOutcome};

/// Finalizer token guarding records until their remote issue is closed.
pub const DEFAULT_FINALIZER: &str = "training.redhat.com/finalizer";

/// Configuration for the reconciler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerConfig {
    /// Finalizer added to every record this reconciler manages.
    pub finalizer: String,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            finalizer: DEFAULT_FINALIZER.to_string(),
        }
    }
}

/// Decide the remote action for one pass.
///
/// `matched` is the first remote issue whose title equals the record's
/// title. A record whose deletion was requested is never created or
/// updated remotely.
pub fn plan(record: &DesiredRecord, matched: Option<&RemoteIssue>) -> ReconcileAction {
    match (matched, record.is_deletion_requested()) {
        (None, true) => ReconcileAction::Release { number: None },
        (Some(issue), true) if issue.is_closed() => ReconcileAction::Release {
            number: Some(issue.number),
        },
        (Some(issue), true) => ReconcileAction::Close {
            number: issue.number,
        },
        (None, false) => ReconcileAction::Create {
            title: record.spec.title.clone(),
            body: record.spec.description.clone(),
        },
        (Some(issue), false) if issue.body != record.spec.description => {
            ReconcileAction::UpdateBody {
                number: issue.number,
                body: record.spec.description.clone(),
            }
        }
        (Some(issue), false) => ReconcileAction::Observe {
            number: issue.number,
        },
    }
}

/// Finalizer-guarded reconciler of desired records against remote issues.
///
/// Holds no state between passes. Callers must not run two passes for the
/// same key at once; the controller's work queue guarantees this.
pub struct Reconciler {
    /// Desired-state store.
    store: Arc<dyn RecordStore>,
    /// Remote issue tracker.
    issues: Arc<dyn IssueService>,
    /// Configuration.
    config: ReconcilerConfig,
    /// Parent of every pass's span.
    span: Span,
}

impl Reconciler {
    /// Create a new reconciler.
    pub fn new(
        store: Arc<dyn RecordStore>,
        issues: Arc<dyn IssueService>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            store,
            issues,
            config,
            span: Span::none(),
        }
    }

    /// Run one reconcile pass for `key`.
    ///
    /// Every error aborts the pass and is returned as-is. Local state is
    /// only persisted after the remote call it reflects has succeeded.
    pub async fn reconcile(&self, key: &RecordKey) -> Result<ReconcileOutcome> {
        let span = info_span!(parent: &self.span, "reconcile", key = %key);
        self.reconcile_inner(key).instrument(span).await
    }

    async fn reconcile_inner(&self, key: &RecordKey) -> Result<ReconcileOutcome> {
        let Some(mut record) = self.store.get(key).await? else {
            debug!("Record not found, nothing to do");
            return Ok(ReconcileOutcome::RecordMissing);
        };

        if !record.metadata.has_finalizer(&self.config.finalizer) {
            record.metadata.add_finalizer(&self.config.finalizer);
            record = self.store.update_metadata(&record).await?;
            debug!(finalizer = %self.config.finalizer, "Added finalizer");
        }

        let repo = &record.spec.repo;
        let listed = self.issues.list(repo).await?;
        let matched = self.issues.search(&listed, &record.spec.title).cloned();
        let action = plan(&record, matched.as_ref());

        debug!(
            repo = %repo,
            listed = listed.len(),
            matched = ?matched.as_ref().map(|issue| issue.number),
            action = %action,
            "Planned reconcile action"
        );

        let outcome = self.apply(record, matched, action).await?;
        info!(outcome = ?outcome, "Reconcile pass complete");
        Ok(outcome)
    }

    async fn apply(
        &self,
        record: DesiredRecord,
        matched: Option<RemoteIssue>,
        action: ReconcileAction,
    ) -> Result<ReconcileOutcome> {
        let repo = &record.spec.repo;
        let issue = match &action {
            ReconcileAction::Create { title, body } => {
                let created = self.issues.create(repo, title, body).await?;
                info!(repo = %repo, issue = created.number, "Created remote issue");
                created
            }
            ReconcileAction::UpdateBody { number, body } => {
                let updated = self.issues.update(repo, *number, body).await?;
                info!(repo = %repo, issue = number, "Updated remote issue body");
                updated
            }
            ReconcileAction::Observe { .. } => {
                matched.ok_or_else(|| Error::missing_remote_issue(record.key().clone()))?
            }
            ReconcileAction::Close { .. } => {
                self.close_remote(&record, matched.as_ref()).await?;
                self.release(record).await?;
                return Ok(ReconcileOutcome::Released { action });
            }
            ReconcileAction::Release { .. } => {
                self.release(record).await?;
                return Ok(ReconcileOutcome::Released { action });
            }
        };

        let mut observed = record;
        observed.status = project(&issue);
        self.store.update_status(&observed).await?;

        Ok(ReconcileOutcome::Synced {
            action,
            issue: issue.number,
        })
    }

    /// Close the remote issue tracked by `record`.
    ///
    /// An issue that is already closed is returned without a remote call.
    /// Passing `None` is a caller defect and yields
    /// [`Error::MissingRemoteIssue`].
    pub async fn close_remote(
        &self,
        record: &DesiredRecord,
        issue: Option<&RemoteIssue>,
    ) -> Result<RemoteIssue> {
        let Some(issue) = issue else {
            warn!(key = %record.key(), "Closing protocol invoked without a remote issue");
            return Err(Error::missing_remote_issue(record.key().clone()));
        };

        if issue.is_closed() {
            debug!(issue = issue.number, "Remote issue already closed");
            return Ok(issue.clone());
        }

        let closed = self
            .issues
            .close(
                &record.spec.repo,
                issue.number,
                &record.spec.title,
                &record.spec.description,
            )
            .await?;
        info!(repo = %record.spec.repo, issue = closed.number, "Closed remote issue");
        Ok(closed)
    }

    async fn release(&self, mut record: DesiredRecord) -> Result<()> {
        if record.metadata.remove_finalizer(&self.config.finalizer) {
            self.store.update_metadata(&record).await?;
            info!(finalizer = %self.config.finalizer, "Released finalizer");
        }
        Ok(())
    }

    /// Get the store.
    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Get the configuration.
    pub const fn config(&self) -> &ReconcilerConfig {
        &self.config
    }
}

/// Builder for Reconciler.
pub struct ReconcilerBuilder {
    store: Option<Arc<dyn RecordStore>>,
    issues: Option<Arc<dyn IssueService>>,
    config: ReconcilerConfig,
    span: Option<Span>,
}

impl ReconcilerBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            store: None,
            issues: None,
            config: ReconcilerConfig::default(),
            span: None,
        }
    }

    /// Set the desired-state store.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the issue service.
    #[must_use]
    pub fn with_issues(mut self, issues: Arc<dyn IssueService>) -> Self {
        self.issues = Some(issues);
        self
    }

    /// Set the configuration.
    #[must_use]
    pub fn with_config(mut self, config: ReconcilerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the finalizer token.
    #[must_use]
    pub fn finalizer(mut self, finalizer: impl Into<String>) -> Self {
        self.config.finalizer = finalizer.into();
        self
    }

    /// Parent span for every reconcile pass.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Build the reconciler.
    pub fn build(self) -> Result<Reconciler> {
        let store = self
            .store
            .ok_or_else(|| Error::invalid_config("Record store is required"))?;
        let issues = self
            .issues
            .ok_or_else(|| Error::invalid_config("Issue service is required"))?;
        if self.config.finalizer.trim().is_empty() {
            return Err(Error::invalid_config("Finalizer must not be empty"));
        }

        let mut reconciler = Reconciler::new(store, issues, self.config);
        if let Some(span) = self.span {
            reconciler.span = span;
        }
        Ok(reconciler)
    }
}

impl Default for ReconcilerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
