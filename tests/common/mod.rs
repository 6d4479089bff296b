//! Shared fixtures: local bare repositories standing in for the hosted Git
//! transport and a recording fake forge.
#![allow(dead_code)]

use async_trait::async_trait;
use change_submit::{
    ChangeReceipt, Forge, ForgeError, Identity, LockManager, PullRequestRef, RemoteRepository,
    RepoAddress, RepoSettings, RoutingDescriptor, StaticCredential, SubmissionContext,
};
use git2::{Oid, Repository, Signature};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub const PR_URL: &str = "https://forge.example/acme/widgets/pull/1";
pub const SERVICE_NAME: &str = "change-submit";
pub const SERVICE_EMAIL: &str = "change-submit@example.com";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForgeCall {
    Fork { owner: String, repo: String },
    CreatePullRequest { repo: String, head: String, base: String, title: String },
    DeleteRepository { owner: String, repo: String },
}

/// Forge double that records every call. Forks resolve to a bare repository
/// under the hosting root; pull requests always come back as [`PR_URL`].
pub struct FakeForge {
    git_base: PathBuf,
    fork_owner: String,
    calls: Mutex<Vec<ForgeCall>>,
}

impl FakeForge {
    pub fn new(hosting: &Hosting, fork_owner: &str) -> Arc<Self> {
        Arc::new(Self {
            git_base: hosting.git_base(),
            fork_owner: fork_owner.to_string(),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<ForgeCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn pull_requests_created(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, ForgeCall::CreatePullRequest { .. }))
            .count()
    }
}

#[async_trait]
impl Forge for FakeForge {
    async fn fork(&self, owner: &str, repo: &str) -> Result<RemoteRepository, ForgeError> {
        self.calls.lock().unwrap().push(ForgeCall::Fork {
            owner: owner.to_string(),
            repo: repo.to_string(),
        });
        let clone_url = bare_path(&self.git_base, &self.fork_owner, repo);
        Ok(RemoteRepository {
            owner: self.fork_owner.clone(),
            name: repo.to_string(),
            default_branch: "main".to_string(),
            clone_url: clone_url.to_string_lossy().into_owned(),
            html_url: format!("https://forge.example/{}/{repo}", self.fork_owner),
        })
    }

    async fn create_pull_request(
        &self,
        routing: &RoutingDescriptor,
        title: &str,
        description: &str,
    ) -> Result<PullRequestRef, ForgeError> {
        self.calls.lock().unwrap().push(ForgeCall::CreatePullRequest {
            repo: routing.target.slug(),
            head: routing.head_ref(),
            base: routing.target.branch.clone(),
            title: title.to_string(),
        });
        Ok(PullRequestRef {
            number: 1,
            title: title.to_string(),
            description: description.to_string(),
            url: PR_URL.to_string(),
        })
    }

    async fn delete_repository(&self, owner: &str, repo: &str) -> Result<(), ForgeError> {
        self.calls.lock().unwrap().push(ForgeCall::DeleteRepository {
            owner: owner.to_string(),
            repo: repo.to_string(),
        });
        Ok(())
    }
}

/// Scratch area holding bare "hosted" repositories, a lock directory and
/// room for working copies.
pub struct Hosting {
    pub root: TempDir,
}

impl Hosting {
    pub fn new() -> Self {
        Self {
            root: TempDir::new().unwrap(),
        }
    }

    pub fn git_base(&self) -> PathBuf {
        self.root.path().join("hosted")
    }

    pub fn locks_dir(&self) -> PathBuf {
        self.root.path().join("locks")
    }

    /// A path inside the scratch area that does not exist yet.
    pub fn workdir(&self, name: &str) -> PathBuf {
        self.root.path().join("work").join(name)
    }

    pub fn repo_path(&self, owner: &str, repo: &str) -> PathBuf {
        bare_path(&self.git_base(), owner, repo)
    }

    /// Bare repository with one commit on `main`.
    pub fn seed(&self, owner: &str, repo: &str) -> PathBuf {
        let bare_path = self.repo_path(owner, repo);
        let bare = Repository::init_bare(&bare_path).unwrap();

        let seed_path = self.root.path().join("seeds").join(owner).join(repo);
        let seed = Repository::init(&seed_path).unwrap();
        std::fs::write(seed_path.join("README.md"), "hello\n").unwrap();
        let mut index = seed.index().unwrap();
        index.add_path(Path::new("README.md")).unwrap();
        index.write().unwrap();
        let tree = seed.find_tree(index.write_tree().unwrap()).unwrap();
        let sig = Signature::now("Seed", "seed@example.com").unwrap();
        seed.commit(Some("HEAD"), &sig, &sig, "Initial commit", &tree, &[])
            .unwrap();

        let head_ref = seed.head().unwrap().name().unwrap().to_string();
        let mut remote = seed.remote("origin", bare_path.to_str().unwrap()).unwrap();
        remote
            .push(&[format!("{head_ref}:refs/heads/main")], None)
            .unwrap();
        bare.set_head("refs/heads/main").unwrap();
        bare_path
    }

    /// Server-side copy of `owner/repo` under `fork_owner`.
    pub fn fork(&self, owner: &str, repo: &str, fork_owner: &str) -> PathBuf {
        let source = self.repo_path(owner, repo);
        let fork = self.repo_path(fork_owner, repo);
        git2::build::RepoBuilder::new()
            .bare(true)
            .clone(source.to_str().unwrap(), &fork)
            .unwrap();
        fork
    }

    /// Plain working copy cloned straight from a hosted repository.
    pub fn working_copy(&self, owner: &str, repo: &str, name: &str) -> PathBuf {
        let path = self.workdir(name);
        Repository::clone(self.repo_path(owner, repo).to_str().unwrap(), &path).unwrap();
        path
    }

    pub fn settings(&self) -> RepoSettings {
        RepoSettings {
            locks: LockManager::new(self.locks_dir()),
            transport_timeout: Duration::from_secs(6),
            service_committer: Identity::new(SERVICE_NAME, SERVICE_EMAIL),
        }
    }

    pub fn context(&self, forge: Arc<FakeForge>) -> SubmissionContext {
        SubmissionContext::new(
            forge,
            Arc::new(StaticCredential::new("test-token")),
            self.settings(),
            self.git_base().to_string_lossy().into_owned(),
        )
    }
}

fn bare_path(git_base: &Path, owner: &str, repo: &str) -> PathBuf {
    git_base.join(owner).join(format!("{repo}.git"))
}

pub fn routing(local_path: &Path) -> RoutingDescriptor {
    RoutingDescriptor {
        source: RepoAddress::new("acme", "widgets", "main"),
        target: RepoAddress::new("acme", "widgets", "main"),
        local_path: local_path.to_path_buf(),
        change_paths: vec![PathBuf::from("README.md")],
        title: "Explain the widgets".to_string(),
        description: "The README now says what a widget is.".to_string(),
        commit_summary: "Update README".to_string(),
        committer: Identity::new("Octo Cat", "octocat@example.com"),
        receipt: ChangeReceipt::NoReceipt,
    }
}

pub fn branch_tip(bare: &Path, branch: &str) -> Oid {
    let repo = Repository::open_bare(bare).unwrap();
    let oid = repo
        .find_reference(&format!("refs/heads/{branch}"))
        .unwrap()
        .target()
        .unwrap();
    oid
}

pub struct CommitInfo {
    pub message: String,
    pub parents: Vec<Oid>,
    pub author: (String, String),
    pub committer: (String, String),
}

pub fn commit_info(bare: &Path, oid: Oid) -> CommitInfo {
    let repo = Repository::open_bare(bare).unwrap();
    let commit = repo.find_commit(oid).unwrap();
    let author = commit.author();
    let committer = commit.committer();
    CommitInfo {
        message: commit.message().unwrap().to_string(),
        parents: commit.parent_ids().collect(),
        author: (
            author.name().unwrap().to_string(),
            author.email().unwrap().to_string(),
        ),
        committer: (
            committer.name().unwrap().to_string(),
            committer.email().unwrap().to_string(),
        ),
    }
}
