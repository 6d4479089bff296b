use serde::Deserialize;

/// A hosted repository as reported by the forge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRepository {
    pub owner: String,
    pub name: String,
    pub default_branch: String,
    /// URL the Git transport clones and pushes through.
    pub clone_url: String,
    pub html_url: String,
}

/// A pull request that exists on the forge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestRef {
    pub number: u64,
    pub title: String,
    pub description: String,
    /// Browser URL; this is the change receipt for later attempts.
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OwnerPayload {
    pub login: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RepositoryPayload {
    pub name: String,
    pub owner: OwnerPayload,
    #[serde(default)]
    pub default_branch: Option<String>,
    pub clone_url: String,
    #[serde(default)]
    pub html_url: Option<String>,
}

impl From<RepositoryPayload> for RemoteRepository {
    fn from(payload: RepositoryPayload) -> Self {
        let html_url = payload
            .html_url
            .unwrap_or_else(|| payload.clone_url.trim_end_matches(".git").to_string());
        RemoteRepository {
            owner: payload.owner.login,
            name: payload.name,
            default_branch: payload.default_branch.unwrap_or_else(|| "main".to_string()),
            clone_url: payload.clone_url,
            html_url,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct PullRequestPayload {
    pub number: u64,
    pub html_url: String,
}
