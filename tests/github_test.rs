//! GitHub status client against a wiremock server.

use std::collections::HashMap;

use ci_status_poster::config::{AppConfig, UserConfig};
use ci_status_poster::error::StatusError;
use ci_status_poster::status::{CommitState, GithubStatusClient, StatusPayload, StatusSink};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const COMMIT_SHA: &str = "41db5ed82c0f19ab460efeb30ec116e2bf3a210b";

fn payload() -> StatusPayload {
    StatusPayload {
        state: CommitState::Success,
        target_url: "https://example.test/builds/some-cool-name:4d8d41b2".to_string(),
        description: "Pylint score: 100%, Change from previous: -10".to_string(),
        context: "pylint".to_string(),
    }
}

#[tokio::test]
async fn test_post_status_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(format!("/repos/declan/py-dev-hammer/statuses/{}", COMMIT_SHA)))
        .and(header("authorization", "token 297045966567"))
        .and(body_json(serde_json::json!({
            "state": "success",
            "target_url": "https://example.test/builds/some-cool-name:4d8d41b2",
            "description": "Pylint score: 100%, Change from previous: -10",
            "context": "pylint"
        })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = GithubStatusClient::new(
        format!(
            "{}/repos/declan/py-dev-hammer/statuses/{}",
            mock_server.uri(),
            COMMIT_SHA
        ),
        "297045966567",
    )
    .unwrap();

    client.post(&payload()).await.unwrap();
}

#[tokio::test]
async fn test_http_error_status_is_not_fatal() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(422).set_body_string("Validation Failed"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = GithubStatusClient::new(format!("{}/statuses/abc", mock_server.uri()), "t").unwrap();
    assert!(client.post(&payload()).await.is_ok());
}

#[tokio::test]
async fn test_malformed_url_is_transport_error() {
    let client = GithubStatusClient::new("api.github.com/repos/x/y/statuses/z", "t").unwrap();
    let err = client.post(&payload()).await.unwrap_err();
    assert!(matches!(err, StatusError::Transport(_)));

    let client = GithubStatusClient::new("ftp://api.github.com/statuses/z", "t").unwrap();
    let err = client.post(&payload()).await.unwrap_err();
    assert!(matches!(err, StatusError::Transport(_)));
}

#[tokio::test]
async fn test_from_secrets_builds_commit_url() {
    let app = AppConfig::load(None).unwrap();
    let user = UserConfig::from_yaml(
        "aws_general:\n  region_name: ap-southeast-2\ncode_build:\n  project_name: some-cool-name\ngithub:\n  repo: py-dev-hammer\n",
    )
    .unwrap();
    let mut secrets = HashMap::new();
    secrets.insert("github_owner".to_string(), "declan".to_string());
    secrets.insert("github_token".to_string(), "297045966567".to_string());

    let client = GithubStatusClient::from_secrets(&app, &user, &secrets, COMMIT_SHA).unwrap();
    assert_eq!(
        client.url(),
        format!(
            "https://api.github.com/repos/declan/py-dev-hammer/statuses/{}",
            COMMIT_SHA
        )
    );

    secrets.remove("github_token");
    let err = GithubStatusClient::from_secrets(&app, &user, &secrets, COMMIT_SHA).err().unwrap();
    assert!(matches!(err, StatusError::Secret(_)));
}
