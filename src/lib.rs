// change-submit library
// Turns local edits into a pull request against a hosted Git repository.

pub mod config;
pub mod credentials;
pub mod error;
pub mod git;
pub mod github;
pub mod lock;
pub mod routing;
pub mod submit;
pub mod telemetry;

// Re-export key types for easy access
pub use config::SubmitConfig;
pub use credentials::{
    ChainCredential, Credential, CredentialError, CredentialProvider, EnvCredential,
    FileCredential, StaticCredential,
};
pub use error::{Error, Result};
pub use git::{Identity, RepoError, RepoHandle, RepoSettings};
pub use github::{Forge, ForgeError, GitHubForge, PullRequestRef, RemoteRepository};
pub use lock::{LockError, LockHandle, LockManager};
pub use routing::{ChangeReceipt, RepoAddress, RoutingDescriptor, RoutingError};
pub use submit::{
    HermeticSubmission, InplaceSubmission, PullRequestUrl, SubmissionContext, SubmissionStage,
    Submitter,
};
pub use telemetry::{generate_correlation_id, init_telemetry, submission_span};
