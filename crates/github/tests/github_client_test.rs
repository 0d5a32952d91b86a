//! GitHub REST client behavior against a mock server.

use ghissue_github::{Error, GithubClient, GithubConfig, IssueService, IssueState, RepoCoordinate};
use proptest::prelude::*;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn issue_json(number: u64, title: &str, body: &str, state: &str) -> serde_json::Value {
    json!({
        "id": number,
        "number": number,
        "title": title,
        "body": body,
        "state": state,
        "updated_at": "2024-05-01T12:00:00Z",
        "labels": []
    })
}

fn client_for(server: &MockServer) -> Result<GithubClient, Error> {
    GithubClient::with_config(GithubConfig::with_api_url(server.uri()).with_token("tkn"))
}

#[tokio::test]
async fn test_list_requests_all_states_with_bearer_token() -> TestResult {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/o/r/issues"))
        .and(query_param("state", "all"))
        .and(query_param("per_page", "100"))
        .and(header("authorization", "Bearer tkn"))
        .and(header("accept", "application/vnd.github+json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            issue_json(1, "T1", "d1", "open"),
            issue_json(2, "T2", "d2", "closed"),
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let issues = client_for(&server)?
        .list(&RepoCoordinate::parse("o/r")?)
        .await?;

    assert_eq!(issues.len(), 2);
    assert!(issues.iter().any(|i| i.title == "T2" && i.state == IssueState::Closed));
    Ok(())
}

#[tokio::test]
async fn test_list_follows_next_links_and_skips_pull_requests() -> TestResult {
    let server = MockServer::start().await;
    let next = format!("{}/repos/o/r/issues?state=all&per_page=100&page=2", server.uri());

    let mut pull_request = issue_json(3, "A PR", "", "open");
    if let Some(object) = pull_request.as_object_mut() {
        object.insert("pull_request".to_string(), json!({ "url": "https://example.invalid" }));
    }

    Mock::given(method("GET"))
        .and(path("/repos/o/r/issues"))
        .and(query_param("page", "2"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([issue_json(4, "T4", "d4", "open")])),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/o/r/issues"))
        .and(query_param("state", "all"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([issue_json(1, "T1", "d1", "open"), pull_request]))
                .insert_header("link", format!("<{next}>; rel=\"next\"").as_str()),
        )
        .expect(1)
        .mount(&server)
        .await;

    let issues = client_for(&server)?
        .list(&RepoCoordinate::parse("o/r")?)
        .await?;

    let numbers: Vec<u64> = issues.iter().map(|i| i.number).collect();
    assert_eq!(numbers, vec![1, 4]);
    Ok(())
}

#[tokio::test]
async fn test_create_posts_title_and_body() -> TestResult {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/repos/o/r/issues"))
        .and(body_json(json!({ "title": "T1", "body": "d1" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(issue_json(9, "T1", "d1", "open")))
        .expect(1)
        .mount(&server)
        .await;

    let issue = client_for(&server)?
        .create(&RepoCoordinate::parse("o/r")?, "T1", "d1")
        .await?;

    assert_eq!(issue.number, 9);
    assert_eq!(issue.state, IssueState::Open);
    Ok(())
}

#[tokio::test]
async fn test_update_sends_only_the_body() -> TestResult {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/repos/o/r/issues/5"))
        .and(body_json(json!({ "body": "new" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(issue_json(5, "T1", "new", "open")))
        .expect(1)
        .mount(&server)
        .await;

    let issue = client_for(&server)?
        .update(&RepoCoordinate::parse("o/r")?, 5, "new")
        .await?;

    assert_eq!(issue.body, "new");
    Ok(())
}

#[tokio::test]
async fn test_close_resends_full_representation() -> TestResult {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/repos/o/r/issues/5"))
        .and(body_json(json!({ "title": "T1", "body": "d1", "state": "closed" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(issue_json(5, "T1", "d1", "closed")))
        .expect(1)
        .mount(&server)
        .await;

    let issue = client_for(&server)?
        .close(&RepoCoordinate::parse("o/r")?, 5, "T1", "d1")
        .await?;

    assert!(issue.is_closed());
    Ok(())
}

#[tokio::test]
async fn test_non_success_status_surfaces_body() -> TestResult {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/repos/o/r/issues"))
        .respond_with(ResponseTemplate::new(410).set_body_string("Issues are disabled for this repo"))
        .mount(&server)
        .await;

    let result = client_for(&server)?
        .create(&RepoCoordinate::parse("o/r")?, "T1", "d1")
        .await;

    match result {
        Err(Error::Api { status, body }) => {
            assert_eq!(status, 410);
            assert!(body.contains("disabled"));
        }
        other => return Err(format!("expected API error, got {other:?}").into()),
    }
    Ok(())
}

#[tokio::test]
async fn test_malformed_payload_is_invalid_response() -> TestResult {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/o/r/issues"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"not\": \"a list\"}"))
        .mount(&server)
        .await;

    let result = client_for(&server)?
        .list(&RepoCoordinate::parse("o/r")?)
        .await;

    assert!(matches!(result, Err(Error::InvalidResponse { .. })));
    Ok(())
}

#[tokio::test]
async fn test_request_timeout_is_transport_error() -> TestResult {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/o/r/issues"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([]))
                .set_delay(std::time::Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let config = GithubConfig::with_api_url(server.uri())
        .timeout(std::time::Duration::from_millis(100));
    let result = GithubClient::with_config(config)?
        .list(&RepoCoordinate::parse("o/r")?)
        .await;

    match result {
        Err(error) => {
            assert!(matches!(error, Error::Http(_)));
            assert!(error.is_retryable());
        }
        Ok(issues) => return Err(format!("expected timeout, got {issues:?}").into()),
    }
    Ok(())
}

proptest! {
    #[test]
    fn search_returns_first_exact_title_match(
        titles in proptest::collection::vec("[a-c]{1,2}", 0..8),
        wanted in "[a-c]{1,2}",
    ) {
        let client = GithubClient::with_config(GithubConfig::default())
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        let issues: Vec<_> = titles
            .iter()
            .zip(1u64..)
            .map(|(title, number)| ghissue_github::RemoteIssue {
                number,
                title: title.clone(),
                body: String::new(),
                state: IssueState::Open,
                updated_at: chrono::DateTime::UNIX_EPOCH,
            })
            .collect();

        let expected = titles.iter().position(|t| *t == wanted);
        let found = client.search(&issues, &wanted);

        prop_assert_eq!(
            found.map(|i| i.number),
            expected.and_then(|p| issues.get(p)).map(|i| i.number)
        );
    }
}
