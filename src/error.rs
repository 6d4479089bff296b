//! Crate-level error
//!
//! Each component owns its error enum; [`Error`] wraps them without
//! flattening so callers can always match on the original cause.

use thiserror::Error;

use crate::credentials::CredentialError;
use crate::git::RepoError;
use crate::github::ForgeError;
use crate::lock::LockError;
use crate::routing::RoutingError;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Credential(#[from] CredentialError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Forge(#[from] ForgeError),
    #[error(transparent)]
    Routing(#[from] RoutingError),
    #[error(transparent)]
    Config(#[from] config::ConfigError),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Another handle, in this or another process, holds the working copy.
    /// Callers should report this and stop rather than retry in a loop.
    pub fn is_lock_conflict(&self) -> bool {
        matches!(self, Error::Repo(e) if e.is_lock_conflict())
    }

    /// The submission could not start or continue because no token was available.
    pub fn is_credential_unavailable(&self) -> bool {
        matches!(
            self,
            Error::Credential(_)
                | Error::Forge(ForgeError::Credential(_))
        )
    }
}

impl From<LockError> for Error {
    fn from(e: LockError) -> Self {
        Error::Repo(RepoError::Lock(e))
    }
}
