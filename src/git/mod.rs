//! Git working-copy operations
//!
//! This module wraps a libgit2 working copy behind [`RepoHandle`], which
//! holds the cross-process path lock for as long as it lives.

pub mod repository;

use serde::{Deserialize, Serialize};

pub use repository::{RepoError, RepoHandle, RepoSettings, GIT_USERNAME, ORIGIN};

/// A (name, email) pair used for commit authorship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    pub email: String,
}

impl Identity {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}
