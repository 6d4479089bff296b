//! Authentication token sources
//!
//! Tokens are read on demand and handed out as [`Credential`] values that
//! are dropped at the end of the operation that asked for them.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Placeholder written by setup scripts before a real token is pasted in.
const PLACEHOLDER_TOKEN: &str = "YOUR_GITHUB_TOKEN_HERE";

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("credential unavailable: {reason}")]
    Unavailable { reason: String },
}

impl CredentialError {
    fn unavailable(reason: impl Into<String>) -> Self {
        CredentialError::Unavailable {
            reason: reason.into(),
        }
    }
}

/// An opaque secret. `Debug` is redacted and there is no `Display`.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Capability that yields a token on demand.
///
/// Implementations perform no retries; callers decide whether a failure is
/// worth re-invoking the whole submission.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait CredentialProvider: Send + Sync {
    fn value(&self) -> Result<Credential, CredentialError>;
}

fn validate(raw: &str, origin: &str) -> Result<Credential, CredentialError> {
    let token = raw.trim();
    if token.is_empty() {
        return Err(CredentialError::unavailable(format!("{origin} is empty")));
    }
    if token == PLACEHOLDER_TOKEN {
        return Err(CredentialError::unavailable(format!(
            "{origin} still contains the placeholder token"
        )));
    }
    Ok(Credential::new(token))
}

/// Reads the token from an environment variable on every call.
#[derive(Debug, Clone)]
pub struct EnvCredential {
    var: String,
}

impl EnvCredential {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl CredentialProvider for EnvCredential {
    fn value(&self) -> Result<Credential, CredentialError> {
        let raw = std::env::var(&self.var).map_err(|e| {
            CredentialError::unavailable(format!("environment variable {}: {e}", self.var))
        })?;
        validate(&raw, &format!("environment variable {}", self.var))
    }
}

/// Reads the token from a file on every call. The file may not exist yet
/// when the provider is constructed.
#[derive(Debug, Clone)]
pub struct FileCredential {
    path: PathBuf,
}

impl FileCredential {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CredentialProvider for FileCredential {
    fn value(&self) -> Result<Credential, CredentialError> {
        let raw = std::fs::read_to_string(&self.path).map_err(|e| {
            CredentialError::unavailable(format!(
                "cannot read token file {}: {e}",
                self.path.display()
            ))
        })?;
        validate(&raw, &format!("token file {}", self.path.display()))
    }
}

/// Fixed token, for embedding callers that already hold one.
#[derive(Clone)]
pub struct StaticCredential(Credential);

impl StaticCredential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(Credential::new(secret))
    }
}

impl CredentialProvider for StaticCredential {
    fn value(&self) -> Result<Credential, CredentialError> {
        validate(self.0.expose(), "static credential")
    }
}

/// Tries each provider in order and returns the first token found.
pub struct ChainCredential {
    providers: Vec<Box<dyn CredentialProvider>>,
}

impl ChainCredential {
    pub fn new(providers: Vec<Box<dyn CredentialProvider>>) -> Self {
        Self { providers }
    }
}

impl CredentialProvider for ChainCredential {
    fn value(&self) -> Result<Credential, CredentialError> {
        let mut last_error = CredentialError::unavailable("no credential sources configured");
        for provider in &self.providers {
            match provider.value() {
                Ok(credential) => return Ok(credential),
                Err(e) => {
                    tracing::debug!("credential source skipped: {}", e);
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }
}
