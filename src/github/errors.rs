use thiserror::Error;

use crate::credentials::CredentialError;

/// Failures talking to the hosted forge API.
///
/// Every variant that involves a request carries the method and URL, and
/// status failures keep the response body so the caller can see what the
/// forge actually said.
#[derive(Debug, Error)]
pub enum ForgeError {
    #[error(transparent)]
    Credential(#[from] CredentialError),
    #[error("{method} {url} returned HTTP {status} (expected {expected}): {body}")]
    UnexpectedStatus {
        method: String,
        url: String,
        status: u16,
        expected: u16,
        body: String,
    },
    #[error("{method} {url} failed: {source}")]
    Transport {
        method: String,
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{method} {url} returned a body that could not be decoded: {source}; body: {body}")]
    Decode {
        method: String,
        url: String,
        body: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl ForgeError {
    /// HTTP status of an unexpected response, if that is what went wrong.
    pub fn status(&self) -> Option<u16> {
        match self {
            ForgeError::UnexpectedStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}
