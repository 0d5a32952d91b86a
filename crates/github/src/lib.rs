#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! # ghissue-github
//!
//! Remote issue tracker access for the ghissue operator.
//!
//! The reconciler only ever talks to the [`IssueService`] trait, which exposes
//! the five operations it needs: list, create, update, close and search.
//! Two implementations ship with the crate:
//!
//! - [`GithubClient`] - the GitHub REST API over reqwest, authenticated with
//!   a bearer token.
//! - [`InMemoryIssueService`] - a recording double used by tests and dry runs.
//!
//! ## Example
//!
//! ```ignore
//! use ghissue_github::{GithubClient, GithubConfig, IssueService, RepoCoordinate};
//!
//! let client = GithubClient::with_config(GithubConfig::from_env())?;
//! let repo = RepoCoordinate::parse("octo-org/octo-repo")?;
//! let issues = client.list(&repo).await?;
//! if let Some(issue) = client.search(&issues, "Flaky CI") {
//!     println!("#{} is {}", issue.number, issue.state);
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod memory;
pub mod types;

pub use client::{GithubClient, IssueService};
pub use config::GithubConfig;
pub use error::{Error, Result};
pub use memory::{InMemoryIssueService, IssueCall, IssueOperation};
pub use types::{IssueState, RemoteIssue, RepoCoordinate};
