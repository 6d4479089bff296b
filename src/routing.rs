//! Addressing and description for one submission attempt

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::git::Identity;

#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("routing descriptor is missing {field}")]
    MissingField { field: &'static str },
    #[error("cannot read routing file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse routing file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// A hosted repository plus the branch a submission cares about.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RepoAddress {
    pub owner: String,
    pub repo: String,
    pub branch: String,
}

impl RepoAddress {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            branch: branch.into(),
        }
    }

    /// `owner/repo`
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

/// Proof that a pull request already exists for this change.
///
/// When a descriptor carries a [`ChangeReceipt::Receipt`], submission pushes
/// new commits but never opens a second pull request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "Option<String>")]
pub enum ChangeReceipt {
    #[default]
    NoReceipt,
    Receipt(String),
}

impl From<Option<String>> for ChangeReceipt {
    fn from(value: Option<String>) -> Self {
        match value {
            Some(url) if !url.trim().is_empty() => ChangeReceipt::Receipt(url.trim().to_string()),
            _ => ChangeReceipt::NoReceipt,
        }
    }
}

impl ChangeReceipt {
    pub fn url(&self) -> Option<&str> {
        match self {
            ChangeReceipt::Receipt(url) => Some(url),
            ChangeReceipt::NoReceipt => None,
        }
    }
}

/// Everything a submission needs to know. Immutable for the duration of an
/// attempt; a retry builds a new one with [`RoutingDescriptor::with_receipt`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RoutingDescriptor {
    /// Where commits are pushed and where the pull request head lives.
    pub source: RepoAddress,
    /// Where the pull request is opened and which branch it merges into.
    pub target: RepoAddress,
    /// Root of the local working copy.
    pub local_path: PathBuf,
    /// Paths to stage, relative to `local_path` or absolute inside it.
    pub change_paths: Vec<PathBuf>,
    pub title: String,
    pub description: String,
    /// Commit message.
    pub commit_summary: String,
    pub committer: Identity,
    #[serde(default)]
    pub receipt: ChangeReceipt,
}

impl RoutingDescriptor {
    pub fn from_toml_file(path: &Path) -> Result<Self, RoutingError> {
        let raw = std::fs::read_to_string(path).map_err(|source| RoutingError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let routing: Self = toml::from_str(&raw).map_err(|source| RoutingError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        routing.validate()?;
        Ok(routing)
    }

    pub fn with_receipt(mut self, receipt: ChangeReceipt) -> Self {
        self.receipt = receipt;
        self
    }

    /// Head reference for the pull request, `<source owner>:<source branch>`.
    pub fn head_ref(&self) -> String {
        format!("{}:{}", self.source.owner, self.source.branch)
    }

    pub fn validate(&self) -> Result<(), RoutingError> {
        let required = [
            ("source.owner", self.source.owner.as_str()),
            ("source.repo", self.source.repo.as_str()),
            ("source.branch", self.source.branch.as_str()),
            ("target.owner", self.target.owner.as_str()),
            ("target.repo", self.target.repo.as_str()),
            ("target.branch", self.target.branch.as_str()),
            ("title", self.title.as_str()),
            ("commit_summary", self.commit_summary.as_str()),
            ("committer.name", self.committer.name.as_str()),
            ("committer.email", self.committer.email.as_str()),
        ];
        if let Some(&(field, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(RoutingError::MissingField { field });
        }
        if self.local_path.as_os_str().is_empty() {
            return Err(RoutingError::MissingField { field: "local_path" });
        }
        if self.change_paths.is_empty() {
            return Err(RoutingError::MissingField {
                field: "change_paths",
            });
        }
        Ok(())
    }
}
