//! Submission orchestrators
//!
//! Both variants end the same way: stage the change paths, commit, push to
//! `origin`, then open a pull request unless the routing descriptor already
//! carries a receipt for one.

pub mod hermetic;
pub mod inplace;
pub mod stage;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

pub use hermetic::HermeticSubmission;
pub use inplace::InplaceSubmission;
pub use stage::{StageTracker, SubmissionStage};

use crate::credentials::CredentialProvider;
use crate::error::Result;
use crate::git::{RepoHandle, RepoSettings};
use crate::github::Forge;
use crate::routing::{ChangeReceipt, RepoAddress, RoutingDescriptor};

/// Browser URL of the pull request carrying the change.
pub type PullRequestUrl = String;

/// Entry point shared by both orchestrator variants.
#[async_trait]
pub trait Submitter: Send + Sync {
    async fn submit_changes(&self) -> Result<PullRequestUrl>;

    /// Furthest stage reached, or `Failed`.
    fn last_stage(&self) -> SubmissionStage;

    /// Stage that was running when the submission failed.
    fn failed_during(&self) -> Option<SubmissionStage>;
}

/// Collaborators a submission needs. Cheap to clone.
#[derive(Clone)]
pub struct SubmissionContext {
    pub forge: Arc<dyn Forge>,
    pub credentials: Arc<dyn CredentialProvider>,
    pub repo_settings: RepoSettings,
    /// Base for Git transport URLs, e.g. `https://github.com`.
    pub git_base_url: String,
}

impl SubmissionContext {
    pub fn new(
        forge: Arc<dyn Forge>,
        credentials: Arc<dyn CredentialProvider>,
        repo_settings: RepoSettings,
        git_base_url: impl Into<String>,
    ) -> Self {
        Self {
            forge,
            credentials,
            repo_settings,
            git_base_url: git_base_url.into(),
        }
    }

    /// `<git base>/<owner>/<repo>.git`
    pub fn clone_url(&self, address: &RepoAddress) -> String {
        format!(
            "{}/{}/{}.git",
            self.git_base_url.trim_end_matches('/'),
            address.owner,
            address.repo
        )
    }
}

impl std::fmt::Debug for SubmissionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmissionContext")
            .field("repo_settings", &self.repo_settings)
            .field("git_base_url", &self.git_base_url)
            .finish_non_exhaustive()
    }
}

/// Stage, commit, push, then create or reuse the pull request.
///
/// The commit is skipped when nothing changed and the push tolerates an
/// up-to-date remote, so running this again after a partial failure is safe.
pub(crate) async fn commit_push_and_open(
    ctx: &SubmissionContext,
    tracker: &StageTracker,
    handle: &RepoHandle,
    routing: &RoutingDescriptor,
) -> Result<PullRequestUrl> {
    tracker.advance(SubmissionStage::Submitting);
    for path in &routing.change_paths {
        handle.add(path)?;
    }
    let commit = handle.commit(
        &routing.committer.name,
        &routing.committer.email,
        &routing.commit_summary,
    )?;
    match commit {
        Some(oid) => info!(commit = %oid, "committed changes"),
        None => info!("nothing new to commit"),
    }

    let local_branch = handle
        .current_branch()?
        .unwrap_or_else(|| routing.target.branch.clone());
    {
        let credential = ctx.credentials.value()?;
        handle.push_origin(&credential, &local_branch, &routing.source.branch)?;
    }

    tracker.advance(SubmissionStage::PrPending);
    let url = match &routing.receipt {
        ChangeReceipt::Receipt(url) => {
            info!(url = %url, "pull request already exists; reusing receipt");
            url.clone()
        }
        ChangeReceipt::NoReceipt => {
            ctx.forge
                .create_pull_request(routing, &routing.title, &routing.description)
                .await?
                .url
        }
    };
    tracker.advance(SubmissionStage::Done);
    Ok(url)
}
