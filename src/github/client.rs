use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Method, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::errors::ForgeError;
use super::types::{PullRequestPayload, PullRequestRef, RemoteRepository, RepositoryPayload};
use crate::credentials::CredentialProvider;
use crate::routing::RoutingDescriptor;

/// Hosted-API operations needed by a submission.
///
/// Each call is a single request that depends only on the credential and the
/// addressing passed in, so orchestrators can be driven by a fake.
#[async_trait]
pub trait Forge: Send + Sync {
    /// Fork `owner/repo` into the acting account. Forking an already-forked
    /// repository is not an error.
    async fn fork(&self, owner: &str, repo: &str) -> Result<RemoteRepository, ForgeError>;

    /// Open a pull request from `routing.head_ref()` into the target branch.
    async fn create_pull_request(
        &self,
        routing: &RoutingDescriptor,
        title: &str,
        description: &str,
    ) -> Result<PullRequestRef, ForgeError>;

    /// Test cleanup only.
    async fn delete_repository(&self, owner: &str, repo: &str) -> Result<(), ForgeError>;
}

/// REST client for the GitHub API (or anything speaking the same dialect).
pub struct GitHubForge {
    http: reqwest::Client,
    api_base: String,
    credentials: Arc<dyn CredentialProvider>,
}

impl std::fmt::Debug for GitHubForge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubForge")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

impl GitHubForge {
    pub fn new(
        api_base: impl Into<String>,
        timeout: Duration,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, ForgeError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("change-submit/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()
            .map_err(ForgeError::Client)?;

        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            credentials,
        })
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Issue one request and return the body if the status matches.
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
        expected: StatusCode,
    ) -> Result<(String, String), ForgeError> {
        let url = format!("{}{}", self.api_base, path);
        let credential = self.credentials.value()?;

        let mut request = self
            .http
            .request(method.clone(), &url)
            .header(AUTHORIZATION, format!("token {}", credential.expose()));
        if let Some(body) = body {
            request = request.json(&body);
        }

        debug!(%method, %url, "forge request");
        let transport = |source: reqwest::Error| ForgeError::Transport {
            method: method.to_string(),
            url: url.clone(),
            source,
        };
        let response = request.send().await.map_err(transport)?;
        let status = response.status();
        let text = response.text().await.map_err(transport)?;

        if status != expected {
            return Err(ForgeError::UnexpectedStatus {
                method: method.to_string(),
                url,
                status: status.as_u16(),
                expected: expected.as_u16(),
                body: text,
            });
        }
        Ok((url, text))
    }
}

fn decode<T: serde::de::DeserializeOwned>(
    method: &str,
    url: String,
    body: String,
) -> Result<T, ForgeError> {
    serde_json::from_str(&body).map_err(|source| ForgeError::Decode {
        method: method.to_string(),
        url,
        body,
        source,
    })
}

#[async_trait]
impl Forge for GitHubForge {
    async fn fork(&self, owner: &str, repo: &str) -> Result<RemoteRepository, ForgeError> {
        let (url, body) = self
            .send(
                Method::POST,
                &format!("/repos/{owner}/{repo}/forks"),
                None,
                StatusCode::ACCEPTED,
            )
            .await?;
        let payload: RepositoryPayload = decode("POST", url, body)?;
        let fork = RemoteRepository::from(payload);
        info!(fork = %format!("{}/{}", fork.owner, fork.name), "fork requested");
        Ok(fork)
    }

    async fn create_pull_request(
        &self,
        routing: &RoutingDescriptor,
        title: &str,
        description: &str,
    ) -> Result<PullRequestRef, ForgeError> {
        let request = serde_json::json!({
            "title": title,
            "body": description,
            "head": routing.head_ref(),
            "base": routing.target.branch,
            "maintainer_can_modify": true,
        });

        let (url, body) = self
            .send(
                Method::POST,
                &format!("/repos/{}/pulls", routing.target.slug()),
                Some(request),
                StatusCode::CREATED,
            )
            .await?;
        let payload: PullRequestPayload = decode("POST", url, body)?;
        info!(number = payload.number, url = %payload.html_url, "pull request created");

        Ok(PullRequestRef {
            number: payload.number,
            title: title.to_string(),
            description: description.to_string(),
            url: payload.html_url,
        })
    }

    async fn delete_repository(&self, owner: &str, repo: &str) -> Result<(), ForgeError> {
        self.send(
            Method::DELETE,
            &format!("/repos/{owner}/{repo}"),
            None,
            StatusCode::NO_CONTENT,
        )
        .await?;
        info!(repository = %format!("{owner}/{repo}"), "repository deleted");
        Ok(())
    }
}
