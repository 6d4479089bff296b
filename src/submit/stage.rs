use std::fmt;
use std::sync::{Mutex, PoisonError};
use tracing::{info, warn};

/// Where a submission got to. Stages only move forward; any failure moves
/// straight to [`SubmissionStage::Failed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubmissionStage {
    Start,
    Forking,
    Cloning,
    Routing,
    Branching,
    Ready,
    Submitting,
    PrPending,
    Done,
    Failed,
}

impl SubmissionStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, SubmissionStage::Done | SubmissionStage::Failed)
    }
}

impl fmt::Display for SubmissionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SubmissionStage::Start => "start",
            SubmissionStage::Forking => "forking",
            SubmissionStage::Cloning => "cloning",
            SubmissionStage::Routing => "routing",
            SubmissionStage::Branching => "branching",
            SubmissionStage::Ready => "ready",
            SubmissionStage::Submitting => "submitting",
            SubmissionStage::PrPending => "pr-pending",
            SubmissionStage::Done => "done",
            SubmissionStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Records every stage a submission passes through.
#[derive(Debug)]
pub struct StageTracker {
    history: Mutex<Vec<SubmissionStage>>,
}

impl StageTracker {
    pub fn new() -> Self {
        Self {
            history: Mutex::new(vec![SubmissionStage::Start]),
        }
    }

    pub fn advance(&self, stage: SubmissionStage) {
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        info!(stage = %stage, from = ?history.last(), "submission stage");
        history.push(stage);
    }

    /// Move to `Failed`, logging which stage was running.
    pub fn fail(&self, error: &dyn std::error::Error) {
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        if history.last() == Some(&SubmissionStage::Failed) {
            return;
        }
        warn!(during = ?history.last(), error = %error, "submission failed");
        history.push(SubmissionStage::Failed);
    }

    /// Pass a result through, moving to `Failed` if it is an error.
    pub fn record<T, E: std::error::Error>(&self, result: Result<T, E>) -> Result<T, E> {
        if let Err(e) = &result {
            self.fail(e);
        }
        result
    }

    pub fn last_stage(&self) -> SubmissionStage {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .copied()
            .unwrap_or(SubmissionStage::Start)
    }

    /// The stage that was running when the submission failed, if it did.
    pub fn failed_during(&self) -> Option<SubmissionStage> {
        let history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        match history.as_slice() {
            [.., during, SubmissionStage::Failed] => Some(*during),
            _ => None,
        }
    }

    pub fn history(&self) -> Vec<SubmissionStage> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for StageTracker {
    fn default() -> Self {
        Self::new()
    }
}
