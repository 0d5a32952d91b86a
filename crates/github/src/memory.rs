//! In-memory issue service for tests and dry runs.

use std::collections::{HashMap, HashSet};
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::Mutex;

use crate::client::IssueService;
use crate::error::{Error, Result};
use crate::types::{IssueState, RemoteIssue, RepoCoordinate};

/// 2024-01-01T00:00:00Z, the logical clock's starting point.
const CLOCK_EPOCH_SECS: i64 = 1_704_067_200;

/// Operations of [`IssueService`] that can be failed on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IssueOperation {
    List,
    Create,
    Update,
    Close,
}

impl fmt::Display for IssueOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::List => "list",
            Self::Create => "create",
            Self::Update => "update",
            Self::Close => "close",
        };
        f.write_str(name)
    }
}

/// A recorded call against the in-memory service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueCall {
    List {
        repo: RepoCoordinate,
    },
    Create {
        repo: RepoCoordinate,
        title: String,
        body: String,
    },
    Update {
        repo: RepoCoordinate,
        number: u64,
        body: String,
    },
    Close {
        repo: RepoCoordinate,
        number: u64,
        title: String,
        body: String,
    },
}

impl IssueCall {
    /// Whether the call mutates the tracker.
    pub const fn is_mutation(&self) -> bool {
        !matches!(self, Self::List { .. })
    }
}

#[derive(Debug)]
struct MemoryState {
    repos: HashMap<RepoCoordinate, Vec<RemoteIssue>>,
    next_number: u64,
    clock: DateTime<Utc>,
    calls: Vec<IssueCall>,
    failures: HashSet<IssueOperation>,
}

impl MemoryState {
    /// Advance the logical clock. Reads never move it, so two reads with no
    /// mutation in between see identical timestamps.
    fn tick(&mut self) -> DateTime<Utc> {
        self.clock = self
            .clock
            .checked_add_signed(TimeDelta::seconds(1))
            .unwrap_or(self.clock);
        self.clock
    }

    fn allocate_number(&mut self) -> u64 {
        let number = self.next_number;
        self.next_number = self.next_number.saturating_add(1);
        number
    }

    fn check_failure(&mut self, operation: IssueOperation) -> Result<()> {
        if self.failures.remove(&operation) {
            return Err(Error::injected(operation.to_string()));
        }
        Ok(())
    }

    fn issue_mut(&mut self, repo: &RepoCoordinate, number: u64) -> Result<&mut RemoteIssue> {
        self.repos
            .get_mut(repo)
            .and_then(|issues| issues.iter_mut().find(|issue| issue.number == number))
            .ok_or_else(|| Error::not_found(repo.to_string(), number))
    }
}

/// Issue tracker double that keeps issues in memory and records every call.
#[derive(Debug)]
pub struct InMemoryIssueService {
    state: Mutex<MemoryState>,
}

impl Default for InMemoryIssueService {
    fn default() -> Self {
        Self {
            state: Mutex::new(MemoryState {
                repos: HashMap::new(),
                next_number: 1,
                clock: DateTime::from_timestamp(CLOCK_EPOCH_SECS, 0).unwrap_or_default(),
                calls: Vec::new(),
                failures: HashSet::new(),
            }),
        }
    }
}

impl InMemoryIssueService {
    /// Create an empty service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an issue directly, bypassing call recording.
    pub async fn seed(
        &self,
        repo: &RepoCoordinate,
        title: &str,
        body: &str,
        state: IssueState,
    ) -> RemoteIssue {
        let mut guard = self.state.lock().await;
        let issue = RemoteIssue {
            number: guard.allocate_number(),
            title: title.to_string(),
            body: body.to_string(),
            state,
            updated_at: guard.tick(),
        };
        guard
            .repos
            .entry(repo.clone())
            .or_default()
            .push(issue.clone());
        issue
    }

    /// Current issues of a repository, in creation order.
    pub async fn issues(&self, repo: &RepoCoordinate) -> Vec<RemoteIssue> {
        self.state
            .lock()
            .await
            .repos
            .get(repo)
            .cloned()
            .unwrap_or_default()
    }

    /// Every call made so far, in order.
    pub async fn calls(&self) -> Vec<IssueCall> {
        self.state.lock().await.calls.clone()
    }

    /// Calls that mutate the tracker.
    pub async fn mutations(&self) -> Vec<IssueCall> {
        self.calls()
            .await
            .into_iter()
            .filter(IssueCall::is_mutation)
            .collect()
    }

    /// Forget recorded calls.
    pub async fn clear_calls(&self) {
        self.state.lock().await.calls.clear();
    }

    /// Fail the next call of `operation` with [`Error::Injected`].
    pub async fn fail_next(&self, operation: IssueOperation) {
        self.state.lock().await.failures.insert(operation);
    }
}

#[async_trait]
impl IssueService for InMemoryIssueService {
    async fn list(&self, repo: &RepoCoordinate) -> Result<Vec<RemoteIssue>> {
        let mut guard = self.state.lock().await;
        guard.calls.push(IssueCall::List { repo: repo.clone() });
        guard.check_failure(IssueOperation::List)?;
        Ok(guard.repos.get(repo).cloned().unwrap_or_default())
    }

    async fn create(&self, repo: &RepoCoordinate, title: &str, body: &str) -> Result<RemoteIssue> {
        let mut guard = self.state.lock().await;
        guard.calls.push(IssueCall::Create {
            repo: repo.clone(),
            title: title.to_string(),
            body: body.to_string(),
        });
        guard.check_failure(IssueOperation::Create)?;

        let issue = RemoteIssue {
            number: guard.allocate_number(),
            title: title.to_string(),
            body: body.to_string(),
            state: IssueState::Open,
            updated_at: guard.tick(),
        };
        guard
            .repos
            .entry(repo.clone())
            .or_default()
            .push(issue.clone());
        Ok(issue)
    }

    async fn update(&self, repo: &RepoCoordinate, number: u64, body: &str) -> Result<RemoteIssue> {
        let mut guard = self.state.lock().await;
        guard.calls.push(IssueCall::Update {
            repo: repo.clone(),
            number,
            body: body.to_string(),
        });
        guard.check_failure(IssueOperation::Update)?;

        let now = guard.tick();
        let issue = guard.issue_mut(repo, number)?;
        issue.body = body.to_string();
        issue.updated_at = now;
        Ok(issue.clone())
    }

    async fn close(
        &self,
        repo: &RepoCoordinate,
        number: u64,
        title: &str,
        body: &str,
    ) -> Result<RemoteIssue> {
        let mut guard = self.state.lock().await;
        guard.calls.push(IssueCall::Close {
            repo: repo.clone(),
            number,
            title: title.to_string(),
            body: body.to_string(),
        });
        guard.check_failure(IssueOperation::Close)?;

        let now = guard.tick();
        let issue = guard.issue_mut(repo, number)?;
        issue.title = title.to_string();
        issue.body = body.to_string();
        issue.state = IssueState::Closed;
        issue.updated_at = now;
        Ok(issue.clone())
    }
}
