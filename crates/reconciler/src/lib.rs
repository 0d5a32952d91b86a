//! Finalizer-guarded reconciliation of desired issue records.
//!
//! This crate implements a reconciliation pattern inspired by Kubernetes
//! controllers:
//!
//! - **Desired State**: [`DesiredRecord`]s held in a [`RecordStore`]
//! - **Actual State**: remote issues behind an
//!   [`IssueService`](ghissue_github::IssueService)
//! - **Plan**: [`plan`] picks one [`ReconcileAction`] per pass
//! - **Apply**: the [`Reconciler`] performs it and projects the result into
//!   the record's status
//!
//! # Finalizers
//!
//! Every managed record carries the reconciler's finalizer. The store keeps
//! a record whose deletion was requested until that finalizer is released,
//! and the reconciler only releases it once the remote issue is closed or
//! known to be absent.
//!
//! # Example
//!
//! ```ignore
//! use ghissue_github::InMemoryIssueService;
//! use ghissue_reconciler::{
//!     Controller, ControllerConfig, InMemoryRecordStore, ReconcilerBuilder,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> ghissue_reconciler::Result<()> {
//!     let store = Arc::new(InMemoryRecordStore::new());
//!     let reconciler = ReconcilerBuilder::new()
//!         .with_store(store.clone())
//!         .with_issues(Arc::new(InMemoryIssueService::new()))
//!         .build()?;
//!
//!     let controller = Controller::new(Arc::new(reconciler), ControllerConfig::default())?
//!         .with_changes(store.subscribe());
//!     let handle = controller.handle();
//!
//!     // handle.stop() ends the loop
//!     controller.run().await
//! }
//! ```

#![forbid(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod error;
pub mod r#loop;
pub mod queue;
pub mod reconciler;
pub mod status;
pub mod store;
pub mod types;

// Re-export main types
pub use error::{Error, Result};
pub use r#loop::{Controller, ControllerConfig, ControllerHandle};
pub use queue::WorkQueue;
pub use reconciler::{DEFAULT_FINALIZER, Reconciler, ReconcilerBuilder, ReconcilerConfig, plan};
pub use status::project;
pub use store::{InMemoryRecordStore, RecordStore};
pub use types::{
    DEFAULT_NAMESPACE, DesiredRecord, ReconcileAction, ReconcileOutcome, RecordKey, RecordMeta,
    RecordSpec, RecordStatus,
};
