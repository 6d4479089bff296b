use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{info, Instrument};

use super::{
    commit_push_and_open, PullRequestUrl, StageTracker, SubmissionContext, SubmissionStage,
    Submitter,
};
use crate::error::Result;
use crate::git::{RepoError, RepoHandle, ORIGIN};
use crate::routing::RoutingDescriptor;
use crate::telemetry::submission_span;

/// Fork the source repository, clone it into a fresh directory, point
/// `origin` at the fork and submit from there.
///
/// Nothing is rolled back on failure. A fork that was created stays, and a
/// clone that landed on disk stays; [`Submitter::last_stage`] tells the
/// caller how far things got.
#[derive(Debug)]
pub struct HermeticSubmission {
    ctx: SubmissionContext,
    routing: RoutingDescriptor,
    content_dir: Option<PathBuf>,
    tracker: StageTracker,
    span: tracing::Span,
}

impl HermeticSubmission {
    pub fn new(ctx: SubmissionContext, routing: RoutingDescriptor) -> Self {
        let span = submission_span("hermetic", &routing);
        Self {
            ctx,
            routing,
            content_dir: None,
            tracker: StageTracker::new(),
            span,
        }
    }

    /// Copy each change path from `dir` into the fresh clone before
    /// committing. Without this, [`Submitter::submit_changes`] commits
    /// whatever is already in the clone.
    pub fn with_content_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.content_dir = Some(dir.into());
        self
    }

    pub fn routing(&self) -> &RoutingDescriptor {
        &self.routing
    }

    pub fn tracker(&self) -> &StageTracker {
        &self.tracker
    }

    /// Fork, clone, route and branch. Returns the locked working copy so the
    /// caller can write the change into it before calling [`Self::submit`].
    pub async fn prepare(&self) -> Result<RepoHandle> {
        let result = self.prepare_inner().instrument(self.span.clone()).await;
        self.tracker.record(result)
    }

    async fn prepare_inner(&self) -> Result<RepoHandle> {
        let routing = &self.routing;

        if routing.local_path.symlink_metadata().is_ok() {
            return Err(RepoError::DestinationExists {
                path: routing.local_path.clone(),
            }
            .into());
        }

        self.tracker.advance(SubmissionStage::Forking);
        let fork = self
            .ctx
            .forge
            .fork(&routing.source.owner, &routing.source.repo)
            .await?;

        self.tracker.advance(SubmissionStage::Cloning);
        let source_url = self.ctx.clone_url(&routing.source);
        let handle = {
            let credential = self.ctx.credentials.value()?;
            RepoHandle::clone_into(
                self.ctx.repo_settings.clone(),
                &credential,
                &source_url,
                &routing.local_path,
            )?
        };

        self.tracker.advance(SubmissionStage::Routing);
        handle.set_remote(ORIGIN, &fork.clone_url)?;

        self.tracker.advance(SubmissionStage::Branching);
        handle.checkout(&routing.target.branch)?;

        self.tracker.advance(SubmissionStage::Ready);
        info!(path = %handle.path().display(), "working copy ready for changes");
        Ok(handle)
    }

    /// Commit, push and open the pull request, then release the working copy.
    pub async fn submit(&self, handle: RepoHandle) -> Result<PullRequestUrl> {
        let result = commit_push_and_open(&self.ctx, &self.tracker, &handle, &self.routing)
            .instrument(self.span.clone())
            .await;
        handle.close();
        self.tracker.record(result)
    }
}

#[async_trait]
impl Submitter for HermeticSubmission {
    async fn submit_changes(&self) -> Result<PullRequestUrl> {
        let handle = self.prepare().await?;
        if let Some(dir) = &self.content_dir {
            let copied = copy_change_paths(dir, handle.path(), &self.routing.change_paths);
            if let Err(e) = self.tracker.record(copied) {
                handle.close();
                return Err(e);
            }
        }
        self.submit(handle).await
    }

    fn last_stage(&self) -> SubmissionStage {
        self.tracker.last_stage()
    }

    fn failed_during(&self) -> Option<SubmissionStage> {
        self.tracker.failed_during()
    }
}

/// Copy `paths` (files or directories, relative to the working copy `to`)
/// from `from` into `to`.
/// Paths missing from `from` are skipped so deletions can be staged.
fn copy_change_paths(from: &Path, to: &Path, paths: &[PathBuf]) -> Result<()> {
    for relative in paths {
        let relative = relative.strip_prefix(to).unwrap_or(relative);
        if relative.is_absolute() {
            return Err(RepoError::PathOutsideWorkdir {
                path: relative.to_path_buf(),
                workdir: to.to_path_buf(),
            }
            .into());
        }
        let source = from.join(relative);
        if source.symlink_metadata().is_err() {
            continue;
        }
        copy_recursive(&source, &to.join(relative)).map_err(|source| RepoError::Io {
            path: relative.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}

fn copy_recursive(from: &Path, to: &Path) -> std::io::Result<()> {
    if from.is_dir() {
        std::fs::create_dir_all(to)?;
        for entry in std::fs::read_dir(from)? {
            let entry = entry?;
            copy_recursive(&entry.path(), &to.join(entry.file_name()))?;
        }
        return Ok(());
    }
    if let Some(parent) = to.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::copy(from, to)?;
    Ok(())
}
