use async_trait::async_trait;
use tracing::Instrument;

use super::{
    commit_push_and_open, PullRequestUrl, StageTracker, SubmissionContext, SubmissionStage,
    Submitter,
};
use crate::error::Result;
use crate::git::RepoHandle;
use crate::routing::RoutingDescriptor;
use crate::telemetry::submission_span;

/// Submit from a working copy the caller already maintains.
///
/// No fork, clone or remote rewrite happens; `origin` and the checked-out
/// branch are used as they are. Repeated runs for the same change should
/// carry the receipt from the first run so the existing pull request is
/// updated instead of duplicated.
#[derive(Debug)]
pub struct InplaceSubmission {
    ctx: SubmissionContext,
    routing: RoutingDescriptor,
    tracker: StageTracker,
    span: tracing::Span,
}

impl InplaceSubmission {
    pub fn new(ctx: SubmissionContext, routing: RoutingDescriptor) -> Self {
        let span = submission_span("inplace", &routing);
        Self {
            ctx,
            routing,
            tracker: StageTracker::new(),
            span,
        }
    }

    pub fn routing(&self) -> &RoutingDescriptor {
        &self.routing
    }

    pub fn tracker(&self) -> &StageTracker {
        &self.tracker
    }

    async fn run(&self) -> Result<PullRequestUrl> {
        let handle = RepoHandle::open(self.ctx.repo_settings.clone(), &self.routing.local_path)?;
        self.tracker.advance(SubmissionStage::Ready);

        let result = commit_push_and_open(&self.ctx, &self.tracker, &handle, &self.routing).await;
        handle.close();
        result
    }
}

#[async_trait]
impl Submitter for InplaceSubmission {
    async fn submit_changes(&self) -> Result<PullRequestUrl> {
        let result = self.run().instrument(self.span.clone()).await;
        self.tracker.record(result)
    }

    fn last_stage(&self) -> SubmissionStage {
        self.tracker.last_stage()
    }

    fn failed_during(&self) -> Option<SubmissionStage> {
        self.tracker.failed_during()
    }
}
