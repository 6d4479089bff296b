//! Hosted forge API: fork, pull request creation, repository deletion

pub mod client;
pub mod errors;
pub mod types;

pub use client::{Forge, GitHubForge};
pub use errors::ForgeError;
pub use types::{PullRequestRef, RemoteRepository};
