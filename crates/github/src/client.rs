//! Issue service abstraction and the GitHub REST implementation.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use crate::config::GithubConfig;
use crate::error::{Error, Result};
use crate::types::{IssueState, RemoteIssue, RepoCoordinate};

const API_VERSION: &str = "2022-11-28";

/// The remote issue operations the reconciler depends on.
///
/// Implementations perform no retries and no backoff; every failure is
/// returned as-is.
#[async_trait]
pub trait IssueService: Send + Sync {
    /// List every issue in the repository, open and closed.
    async fn list(&self, repo: &RepoCoordinate) -> Result<Vec<RemoteIssue>>;

    /// Open a new issue.
    async fn create(&self, repo: &RepoCoordinate, title: &str, body: &str) -> Result<RemoteIssue>;

    /// Replace the body of an issue, leaving title and state untouched.
    async fn update(&self, repo: &RepoCoordinate, number: u64, body: &str) -> Result<RemoteIssue>;

    /// Close an issue, resending its full title and body.
    async fn close(
        &self,
        repo: &RepoCoordinate,
        number: u64,
        title: &str,
        body: &str,
    ) -> Result<RemoteIssue>;

    /// First issue whose title equals `title` exactly.
    fn search<'a>(&self, issues: &'a [RemoteIssue], title: &str) -> Option<&'a RemoteIssue> {
        issues.iter().find(|issue| issue.title == title)
    }
}

/// Issue service backed by the GitHub REST API.
#[derive(Debug, Clone)]
pub struct GithubClient {
    config: Arc<GithubConfig>,
    base_url: Url,
    http_client: reqwest::Client,
}

/// Wire shape of a listed issue; pull requests carry a `pull_request` key.
#[derive(Debug, Deserialize)]
struct ListedIssue {
    #[serde(flatten)]
    issue: RemoteIssue,
    #[serde(default)]
    pull_request: Option<serde_json::Value>,
}

impl GithubClient {
    /// Create a client for the public GitHub API, token from the environment.
    pub fn new() -> Result<Self> {
        Self::with_config(GithubConfig::from_env())
    }

    /// Create a client with custom configuration.
    pub fn with_config(config: GithubConfig) -> Result<Self> {
        config.validate()?;
        let base_url = config.base_url()?;

        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert("x-github-api-version", HeaderValue::from_static(API_VERSION));
        if let Some(token) = config.token.as_deref() {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| Error::config_error(format!("invalid token: {e}")))?;
            value.set_sensitive(true);
            headers.insert(header::AUTHORIZATION, value);
        }

        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .build()?;

        Ok(Self {
            config: Arc::new(config),
            base_url,
            http_client,
        })
    }

    /// The client configuration.
    pub fn config(&self) -> &GithubConfig {
        &self.config
    }

    /// `{base}/repos/{owner}/{repo}/issues[/{number}]`
    fn issues_url(&self, repo: &RepoCoordinate, number: Option<u64>) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| Error::config_error("API URL cannot be used as a base"))?;
            segments
                .pop_if_empty()
                .extend(["repos", repo.owner(), repo.name(), "issues"]);
            if let Some(number) = number {
                segments.push(&number.to_string());
            }
        }
        Ok(url)
    }

    /// Send a request and check the status, returning the raw response.
    async fn send(
        &self,
        method: Method,
        url: Url,
        payload: Option<serde_json::Value>,
        expected: StatusCode,
    ) -> Result<reqwest::Response> {
        debug!(method = %method, url = %url, "Issue tracker request");

        let mut request = self.http_client.request(method, url);
        if let Some(payload) = payload {
            request = request.json(&payload);
        }
        let response = request.send().await?;

        let status = response.status();
        if status != expected {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %body, "Issue tracker rejected request");
            return Err(Error::api(status.as_u16(), body));
        }
        Ok(response)
    }

    /// Send a request and decode the JSON body.
    async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        payload: Option<serde_json::Value>,
        expected: StatusCode,
    ) -> Result<T> {
        let response = self.send(method, url, payload, expected).await?;
        decode(response).await.map(|(value, _)| value)
    }
}

#[async_trait]
impl IssueService for GithubClient {
    async fn list(&self, repo: &RepoCoordinate) -> Result<Vec<RemoteIssue>> {
        let mut url = self.issues_url(repo, None)?;
        url.query_pairs_mut()
            .append_pair("state", "all")
            .append_pair("per_page", &self.config.per_page.to_string());

        let mut issues = Vec::new();
        let mut next = Some(url);
        while let Some(page_url) = next.take() {
            let response = self
                .send(Method::GET, page_url, None, StatusCode::OK)
                .await?;
            let (page, link): (Vec<ListedIssue>, Option<String>) = decode(response).await?;
            issues.extend(
                page.into_iter()
                    .filter(|entry| entry.pull_request.is_none())
                    .map(|entry| entry.issue),
            );
            next = link
                .as_deref()
                .and_then(next_page_link)
                .map(|href| Url::parse(&href))
                .transpose()?;
        }

        debug!(repo = %repo, count = issues.len(), "Listed issues");
        Ok(issues)
    }

    async fn create(&self, repo: &RepoCoordinate, title: &str, body: &str) -> Result<RemoteIssue> {
        let url = self.issues_url(repo, None)?;
        let payload = serde_json::json!({ "title": title, "body": body });
        let issue: RemoteIssue = self
            .send_json(Method::POST, url, Some(payload), StatusCode::CREATED)
            .await?;

        if issue.state != IssueState::Open {
            warn!(repo = %repo, issue = issue.number, state = %issue.state, "Created issue is not open");
        }
        Ok(issue)
    }

    async fn update(&self, repo: &RepoCoordinate, number: u64, body: &str) -> Result<RemoteIssue> {
        let url = self.issues_url(repo, Some(number))?;
        let payload = serde_json::json!({ "body": body });
        self.send_json(Method::PATCH, url, Some(payload), StatusCode::OK)
            .await
    }

    async fn close(
        &self,
        repo: &RepoCoordinate,
        number: u64,
        title: &str,
        body: &str,
    ) -> Result<RemoteIssue> {
        let url = self.issues_url(repo, Some(number))?;
        let payload = serde_json::json!({
            "title": title,
            "body": body,
            "state": IssueState::Closed.as_str(),
        });
        self.send_json(Method::PATCH, url, Some(payload), StatusCode::OK)
            .await
    }
}

/// Decode a JSON body, also returning the `Link` header.
async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<(T, Option<String>)> {
    let link = response
        .headers()
        .get(header::LINK)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let text = response.text().await?;
    let value = serde_json::from_str(&text).map_err(|e| Error::invalid_response(e.to_string()))?;
    Ok((value, link))
}

/// Extract the `rel="next"` target from a `Link` header.
fn next_page_link(header: &str) -> Option<String> {
    header.split(',').find_map(|part| {
        let (target, params) = part.split_once(';')?;
        let is_next = params
            .split(';')
            .any(|param| param.trim() == "rel=\"next\"");
        is_next.then(|| {
            target
                .trim()
                .trim_start_matches('<')
                .trim_end_matches('>')
                .to_string()
        })
    })
}
