use async_trait::async_trait;
use std::time::Duration;
use tracing::{info, warn};

use super::{StatusPayload, StatusSink};
use crate::config::{AppConfig, UserConfig, HTTP_TIMEOUT_SECS, SECRET_GITHUB_OWNER, SECRET_GITHUB_TOKEN};
use crate::error::StatusError;
use crate::secrets::SecretStore;

/// Posts commit statuses to the GitHub statuses API for a single commit.
pub struct GithubStatusClient {
    http_client: reqwest::Client,
    url: String,
    token: String,
}

impl GithubStatusClient {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Result<Self, StatusError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .user_agent(concat!("ci-status-poster/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| StatusError::Transport(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http_client,
            url: url.into(),
            token: token.into(),
        })
    }

    /// Resolve owner and token from `secrets` and target `commit_sha`.
    pub fn from_secrets(
        app: &AppConfig,
        user: &UserConfig,
        secrets: &dyn SecretStore,
        commit_sha: &str,
    ) -> Result<Self, StatusError> {
        let owner = secrets.get(SECRET_GITHUB_OWNER)?;
        let token = secrets.get(SECRET_GITHUB_TOKEN)?;
        let url = app.status_api_url(&owner, &user.github.repo, commit_sha);
        Self::new(url, token)
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl StatusSink for GithubStatusClient {
    async fn post(&self, payload: &StatusPayload) -> Result<(), StatusError> {
        info!("Posting status to GitHub: {}", payload.context);

        let url = url::Url::parse(&self.url)
            .map_err(|e| StatusError::Transport(format!("invalid status URL '{}': {}", self.url, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(StatusError::Transport(format!(
                "invalid status URL '{}': unsupported scheme",
                self.url
            )));
        }

        let resp = self
            .http_client
            .post(url.as_str())
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .json(payload)
            .send()
            .await
            .map_err(|e| StatusError::Transport(format!("POST to GitHub failed: {}", e)))?;

        let status = resp.status();
        info!("POST response code for {}: {}", payload.context, status);
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(
                "GitHub rejected status for {}: {} {}",
                payload.context, status, body
            );
        }
        Ok(())
    }
}
