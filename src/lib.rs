#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! # ghissue-operator
//!
//! Keeps GitHub issues in line with declarative issue records.
//!
//! Records come from a YAML [`manifest`], land in an in-memory record store,
//! and are reconciled by [`ghissue_reconciler`] against the tracker exposed
//! by [`ghissue_github`]. This library holds the binary's configuration,
//! logging setup and manifest handling so they can be tested directly.

pub mod cli;
pub mod config;
pub mod error;
pub mod manifest;
pub mod telemetry;

pub use config::{LoggingConfig, ManifestConfig, OperatorConfig};
pub use error::{Error, Result};
pub use manifest::{Manifest, ManifestRecord, ManifestSync, SyncReport};
pub use telemetry::init_tracing;
