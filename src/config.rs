use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::credentials::{ChainCredential, CredentialProvider, EnvCredential, FileCredential};
use crate::git::{Identity, RepoSettings};
use crate::github::{ForgeError, GitHubForge};
use crate::lock::LockManager;
use crate::submit::SubmissionContext;

/// Config file looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_NAME: &str = "change-submit";

/// Prefix for environment overrides, e.g. `CHANGE_SUBMIT_FORGE__TIMEOUT_SECONDS=7`.
pub const ENV_PREFIX: &str = "CHANGE_SUBMIT";

const MIN_TIMEOUT_SECONDS: u64 = 5;
const MAX_TIMEOUT_SECONDS: u64 = 7;

/// Settings for change-submit
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SubmitConfig {
    pub forge: ForgeConfig,
    pub locks: LockConfig,
    /// Committer stamped on every commit the tool creates.
    pub committer: CommitterConfig,
    pub credentials: CredentialConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ForgeConfig {
    /// REST API root
    pub api_base_url: String,
    /// Git transport root; clone URLs are `<git_base_url>/<owner>/<repo>.git`
    pub git_base_url: String,
    /// Per-request timeout, clamped to 5..=7 seconds
    pub timeout_seconds: u64,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.github.com".to_string(),
            git_base_url: "https://github.com".to_string(),
            timeout_seconds: 6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct LockConfig {
    /// Defaults to `<user cache dir>/change-submit/locks`
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CommitterConfig {
    pub name: String,
    pub email: String,
}

impl Default for CommitterConfig {
    fn default() -> Self {
        Self {
            name: "change-submit".to_string(),
            email: "change-submit@users.noreply.github.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CredentialConfig {
    /// Environment variable holding the token; tried first
    pub token_env: String,
    /// File holding the token; tried when the variable is unset
    pub token_file: Option<PathBuf>,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            token_env: "GITHUB_TOKEN".to_string(),
            token_file: None,
        }
    }
}

impl SubmitConfig {
    /// Load configuration from multiple sources in order of precedence:
    /// 1. Built-in defaults
    /// 2. `path`, or `change-submit.toml` in the working directory if present
    /// 3. Environment variables prefixed with `CHANGE_SUBMIT_`
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, None)
    }

    /// Like [`SubmitConfig::load`], reading overrides from `env` instead of
    /// the process environment when given.
    pub fn load_with_env(
        path: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        builder = match path {
            Some(path) => builder.add_source(File::from(path)),
            None => builder.add_source(File::with_name(DEFAULT_CONFIG_NAME).required(false)),
        };

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(env),
        );

        builder.build()?.try_deserialize()
    }

    /// Load `.env` into the process environment if one exists, returning
    /// its path. Runs before logging is set up, so reporting is left to the
    /// caller.
    pub fn load_env_file() -> Result<Option<PathBuf>, dotenvy::Error> {
        match dotenvy::dotenv() {
            Ok(path) => Ok(Some(path)),
            Err(e) if e.not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn forge_timeout(&self) -> Duration {
        Duration::from_secs(
            self.forge
                .timeout_seconds
                .clamp(MIN_TIMEOUT_SECONDS, MAX_TIMEOUT_SECONDS),
        )
    }

    /// Environment variable first, then the token file if one is configured.
    pub fn credential_provider(&self) -> Arc<dyn CredentialProvider> {
        let mut providers: Vec<Box<dyn CredentialProvider>> =
            vec![Box::new(EnvCredential::new(&self.credentials.token_env))];
        if let Some(file) = &self.credentials.token_file {
            providers.push(Box::new(FileCredential::new(file)));
        }
        Arc::new(ChainCredential::new(providers))
    }

    pub fn lock_manager(&self) -> LockManager {
        match &self.locks.dir {
            Some(dir) => LockManager::new(dir),
            None => LockManager::default(),
        }
    }

    pub fn repo_settings(&self) -> RepoSettings {
        RepoSettings {
            locks: self.lock_manager(),
            transport_timeout: self.forge_timeout(),
            service_committer: Identity::new(&self.committer.name, &self.committer.email),
        }
    }

    pub fn forge(
        &self,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<GitHubForge, ForgeError> {
        GitHubForge::new(&self.forge.api_base_url, self.forge_timeout(), credentials)
    }

    /// Everything an orchestrator needs, wired from this configuration.
    pub fn submission_context(&self) -> Result<SubmissionContext, ForgeError> {
        let credentials = self.credential_provider();
        let forge = self.forge(credentials.clone())?;
        Ok(SubmissionContext::new(
            Arc::new(forge),
            credentials,
            self.repo_settings(),
            &self.forge.git_base_url,
        ))
    }
}
