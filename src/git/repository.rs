use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{
    BranchType, Commit, Cred, ErrorCode, FetchOptions, IndexAddOption, Oid, PushOptions,
    RemoteCallbacks, Repository, Signature, StatusOptions,
};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};

use super::Identity;
use crate::credentials::Credential;
use crate::lock::{LockError, LockHandle, LockManager};

/// Canonical push target for submissions.
pub const ORIGIN: &str = "origin";

/// Basic-auth username sent with the token. The host only checks the password.
pub const GIT_USERNAME: &str = "change-submit";

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("destination {} already exists; refusing to clone over it", path.display())]
    DestinationExists { path: PathBuf },
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error("working tree at {} has uncommitted changes: {}", path.display(), files.join(", "))]
    UncommittedChanges { path: PathBuf, files: Vec<String> },
    #[error("remote rejected update of {refname}: {message}")]
    PushRejected { refname: String, message: String },
    #[error("{} is outside the working copy at {}", path.display(), workdir.display())]
    PathOutsideWorkdir { path: PathBuf, workdir: PathBuf },
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("repository at {} has no working directory", path.display())]
    NoWorkdir { path: PathBuf },
    #[error("git {operation} failed: {source}")]
    Git {
        operation: &'static str,
        #[source]
        source: git2::Error,
    },
}

impl RepoError {
    pub fn is_lock_conflict(&self) -> bool {
        matches!(self, RepoError::Lock(LockError::Conflict { .. }))
    }
}

fn git(operation: &'static str) -> impl FnOnce(git2::Error) -> RepoError {
    move |source| RepoError::Git { operation, source }
}

/// Settings shared by every handle created during a submission.
#[derive(Debug, Clone)]
pub struct RepoSettings {
    pub locks: LockManager,
    /// Connect and read timeout for network transports. Fetches and clones
    /// also abort after this long without transfer progress.
    pub transport_timeout: Duration,
    /// Committer stamped on every commit this tool creates.
    pub service_committer: Identity,
}

/// An exclusively locked working copy.
///
/// All operations go through an internal mutex, so a shared handle is safe to
/// use from several tasks but calls are serialized.
pub struct RepoHandle {
    path: PathBuf,
    repo: Mutex<Repository>,
    settings: RepoSettings,
    lock: LockHandle,
}

impl std::fmt::Debug for RepoHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepoHandle")
            .field("path", &self.path)
            .field("lock_file", &self.lock.lock_file())
            .finish()
    }
}

impl RepoHandle {
    /// Clone `url` into `path`, which must not exist yet.
    ///
    /// The lock is taken after the clone lands on disk. If it cannot be taken
    /// the clone stays where it is and no further mutation happens.
    pub fn clone_into(
        settings: RepoSettings,
        credential: &Credential,
        url: &str,
        path: &Path,
    ) -> Result<Self, RepoError> {
        if path.symlink_metadata().is_ok() {
            return Err(RepoError::DestinationExists {
                path: path.to_path_buf(),
            });
        }

        apply_transport_timeout(settings.transport_timeout)?;
        info!(url = %url, path = %path.display(), "cloning repository");
        let mut fetch_options = FetchOptions::new();
        fetch_options.remote_callbacks(remote_callbacks(credential, settings.transport_timeout));

        let repo = RepoBuilder::new()
            .fetch_options(fetch_options)
            .clone(url, path)
            .map_err(git("clone"))?;

        let lock = settings.locks.try_acquire(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            repo: Mutex::new(repo),
            settings,
            lock,
        })
    }

    /// Open an existing working copy at `path`.
    pub fn open(settings: RepoSettings, path: &Path) -> Result<Self, RepoError> {
        let lock = settings.locks.try_acquire(path)?;
        let repo = Repository::open(path).map_err(git("open"))?;
        if repo.workdir().is_none() {
            return Err(RepoError::NoWorkdir {
                path: path.to_path_buf(),
            });
        }

        debug!(path = %path.display(), "opened repository");
        Ok(Self {
            path: path.to_path_buf(),
            repo: Mutex::new(repo),
            settings,
            lock,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the path lock now instead of waiting for drop.
    pub fn close(self) {
        debug!(path = %self.path.display(), "closing repository");
        drop(self);
    }

    fn repo(&self) -> MutexGuard<'_, Repository> {
        self.repo.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Point remote `name` at `url`, replacing any existing definition.
    pub fn set_remote(&self, name: &str, url: &str) -> Result<(), RepoError> {
        let repo = self.repo();
        match repo.find_remote(name) {
            Ok(_) => {
                debug!(remote = name, "replacing existing remote");
                repo.remote_delete(name).map_err(git("remote delete"))?;
            }
            Err(e) if e.code() == ErrorCode::NotFound => {}
            Err(e) => return Err(git("remote lookup")(e)),
        }
        repo.remote(name, url).map_err(git("remote create"))?;
        Ok(())
    }

    /// Switch to `branch`, creating it from the default branch tip if needed.
    ///
    /// A freshly created branch is also recorded in the local config as
    /// tracking `origin`, so later pushes see it as a tracked branch.
    pub fn checkout(&self, branch: &str) -> Result<(), RepoError> {
        let repo = self.repo();
        let refname = format!("refs/heads/{branch}");

        match repo.find_branch(branch, BranchType::Local) {
            Ok(existing) => {
                if existing.is_head() {
                    debug!(branch, "branch already checked out");
                    return Ok(());
                }
                let commit = existing.get().peel_to_commit().map_err(git("checkout"))?;
                switch_to(&repo, &refname, &commit)?;
                info!(branch, "switched to existing branch");
                return Ok(());
            }
            Err(e) if e.code() == ErrorCode::NotFound => {}
            Err(e) => return Err(git("branch lookup")(e)),
        }

        let base = default_branch_tip(&repo)?;
        repo.branch(branch, &base, false).map_err(git("branch create"))?;
        switch_to(&repo, &refname, &base)?;

        let mut config = repo.config().map_err(git("config"))?;
        config
            .set_str(&format!("branch.{branch}.remote"), ORIGIN)
            .map_err(git("config"))?;
        config
            .set_str(&format!("branch.{branch}.merge"), &refname)
            .map_err(git("config"))?;

        info!(branch, base = %base.id(), "created and switched to branch");
        Ok(())
    }

    /// Stage a file or directory. Missing or unchanged paths are not errors.
    pub fn add(&self, path: &Path) -> Result<(), RepoError> {
        let relative = self.relative_path(path)?;
        let pathspec = if relative.as_os_str().is_empty() {
            "*".to_string()
        } else {
            relative.to_string_lossy().replace('\\', "/")
        };

        let repo = self.repo();
        let mut index = repo.index().map_err(git("index"))?;
        // The working copy may have been touched by other tools since open.
        index.read(false).map_err(git("index read"))?;
        index
            .add_all([pathspec.as_str()], IndexAddOption::DEFAULT, None)
            .map_err(git("add"))?;
        // Picks up deletions, which add_all skips.
        index
            .update_all([pathspec.as_str()], None)
            .map_err(git("add"))?;
        index.write().map_err(git("index write"))?;

        debug!(pathspec = %pathspec, "staged path");
        Ok(())
    }

    /// Commit the index. Returns `None` without touching history when nothing
    /// is staged, so re-running a submission never adds an empty commit.
    pub fn commit(&self, name: &str, email: &str, message: &str) -> Result<Option<Oid>, RepoError> {
        let repo = self.repo();
        let mut index = repo.index().map_err(git("index"))?;
        index.read(false).map_err(git("index read"))?;
        let tree_id = index.write_tree().map_err(git("write tree"))?;

        let parent = head_commit(&repo)?;
        let unchanged = match &parent {
            Some(parent) => parent.tree_id() == tree_id,
            None => index.is_empty(),
        };
        if unchanged {
            info!("working tree clean, nothing to commit");
            return Ok(None);
        }

        let tree = repo.find_tree(tree_id).map_err(git("find tree"))?;
        let author = Signature::now(name, email).map_err(git("signature"))?;
        let service = &self.settings.service_committer;
        let committer = Signature::now(&service.name, &service.email).map_err(git("signature"))?;
        let parents: Vec<&Commit<'_>> = parent.iter().collect();

        let oid = repo
            .commit(Some("HEAD"), &author, &committer, message, &tree, &parents)
            .map_err(git("commit"))?;
        info!(commit = %oid, "created commit");
        Ok(Some(oid))
    }

    /// Force-update `refs/heads/<remote_branch>` on origin from the local branch.
    ///
    /// Fails with [`RepoError::UncommittedChanges`] if the tree is dirty. A
    /// remote that is already up to date counts as success.
    pub fn push_origin(
        &self,
        credential: &Credential,
        local_branch: &str,
        remote_branch: &str,
    ) -> Result<(), RepoError> {
        let repo = self.repo();

        let dirty = uncommitted_paths(&repo)?;
        if !dirty.is_empty() {
            return Err(RepoError::UncommittedChanges {
                path: self.path.clone(),
                files: dirty,
            });
        }

        let refspec = format!("+refs/heads/{local_branch}:refs/heads/{remote_branch}");
        let mut remote = repo.find_remote(ORIGIN).map_err(git("remote lookup"))?;
        apply_transport_timeout(self.settings.transport_timeout)?;

        let rejection: RefCell<Option<(String, String)>> = RefCell::new(None);
        {
            let mut callbacks = remote_callbacks(credential, self.settings.transport_timeout);
            callbacks.push_update_reference(|refname, status| {
                if let Some(message) = status {
                    *rejection.borrow_mut() = Some((refname.to_string(), message.to_string()));
                }
                Ok(())
            });
            let mut push_options = PushOptions::new();
            push_options.remote_callbacks(callbacks);

            info!(refspec = %refspec, "pushing to origin");
            remote
                .push(&[refspec.as_str()], Some(&mut push_options))
                .map_err(git("push"))?;
        }

        if let Some((refname, message)) = rejection.into_inner() {
            return Err(RepoError::PushRejected { refname, message });
        }
        Ok(())
    }

    /// Whether there are staged or unstaged changes to tracked files.
    pub fn is_clean(&self) -> Result<bool, RepoError> {
        let repo = self.repo();
        Ok(uncommitted_paths(&repo)?.is_empty())
    }

    pub fn current_branch(&self) -> Result<Option<String>, RepoError> {
        let repo = self.repo();
        let head = match repo.head() {
            Ok(head) => head,
            Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => {
                return Ok(None)
            }
            Err(e) => return Err(git("head")(e)),
        };
        Ok(head.is_branch().then(|| head.shorthand().unwrap_or_default().to_string()))
    }

    pub fn head_commit_message(&self) -> Result<Option<String>, RepoError> {
        let repo = self.repo();
        let message = head_commit(&repo)?.map(|c| c.message().unwrap_or_default().to_string());
        Ok(message)
    }

    fn relative_path(&self, path: &Path) -> Result<PathBuf, RepoError> {
        if path.is_relative() {
            return Ok(path.to_path_buf());
        }
        if let Ok(stripped) = path.strip_prefix(&self.path) {
            return Ok(stripped.to_path_buf());
        }
        let workdir = self.path.canonicalize().unwrap_or_else(|_| self.path.clone());
        let candidate = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        candidate
            .strip_prefix(&workdir)
            .map(Path::to_path_buf)
            .map_err(|_| RepoError::PathOutsideWorkdir {
                path: path.to_path_buf(),
                workdir,
            })
    }
}

fn switch_to(repo: &Repository, refname: &str, commit: &Commit<'_>) -> Result<(), RepoError> {
    let mut checkout = CheckoutBuilder::new();
    checkout.safe();
    repo.checkout_tree(commit.as_object(), Some(&mut checkout))
        .map_err(git("checkout"))?;
    repo.set_head(refname).map_err(git("set head"))?;
    Ok(())
}

/// Tip of `origin/HEAD` if the clone still has it, otherwise the commit HEAD
/// points at.
fn default_branch_tip(repo: &Repository) -> Result<Commit<'_>, RepoError> {
    if let Ok(reference) = repo.find_reference("refs/remotes/origin/HEAD") {
        if let Ok(commit) = reference.resolve().and_then(|r| r.peel_to_commit()) {
            return Ok(commit);
        }
    }
    repo.head()
        .and_then(|head| head.peel_to_commit())
        .map_err(git("resolve default branch"))
}

fn head_commit(repo: &Repository) -> Result<Option<Commit<'_>>, RepoError> {
    match repo.head() {
        Ok(head) => head.peel_to_commit().map(Some).map_err(git("head")),
        Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => Ok(None),
        Err(e) => Err(git("head")(e)),
    }
}

/// Staged or unstaged changes to tracked files. Untracked files are ignored.
fn uncommitted_paths(repo: &Repository) -> Result<Vec<String>, RepoError> {
    let mut options = StatusOptions::new();
    options.include_untracked(false).include_ignored(false);
    let statuses = repo.statuses(Some(&mut options)).map_err(git("status"))?;

    Ok(statuses
        .iter()
        .filter(|entry| {
            let status = entry.status();
            !status.is_empty() && !status.contains(git2::Status::IGNORED)
        })
        .filter_map(|entry| entry.path().map(str::to_string))
        .collect())
}

/// Last value handed to libgit2, which keeps these timeouts in globals.
static APPLIED_TIMEOUT_MS: Mutex<Option<i32>> = Mutex::new(None);

/// Set libgit2's connect and read timeouts for HTTP and socket transports.
///
/// The progress callback cannot interrupt a push or a server that accepts
/// the connection and then goes quiet, so the timeout has to live in the
/// transport itself.
fn apply_transport_timeout(timeout: Duration) -> Result<(), RepoError> {
    let millis = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
    let mut applied = APPLIED_TIMEOUT_MS
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    if *applied == Some(millis) {
        return Ok(());
    }

    // SAFETY: libgit2 stores both values in plain integers that transports
    // read when they open a connection. Every write in this crate goes
    // through the mutex above.
    unsafe {
        git2::opts::set_server_connect_timeout_in_milliseconds(millis)
            .map_err(git("set connect timeout"))?;
        git2::opts::set_server_timeout_in_milliseconds(millis)
            .map_err(git("set server timeout"))?;
    }
    *applied = Some(millis);
    debug!(timeout_ms = millis, "transport timeout applied");
    Ok(())
}

fn remote_callbacks<'a>(credential: &'a Credential, stall_timeout: Duration) -> RemoteCallbacks<'a> {
    let mut callbacks = RemoteCallbacks::new();

    let mut attempts = 0u32;
    callbacks.credentials(move |_url, _username_from_url, _allowed_types| {
        attempts += 1;
        if attempts > 1 {
            // libgit2 keeps asking while the server answers 401
            return Err(git2::Error::from_str("remote rejected the credential"));
        }
        Cred::userpass_plaintext(GIT_USERNAME, credential.expose())
    });

    let mut last_received = 0usize;
    let mut last_progress = Instant::now();
    callbacks.transfer_progress(move |stats| {
        if stats.received_bytes() != last_received {
            last_received = stats.received_bytes();
            last_progress = Instant::now();
        }
        last_progress.elapsed() < stall_timeout
    });

    callbacks
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn settings(locks: &Path) -> RepoSettings {
        RepoSettings {
            locks: LockManager::new(locks),
            transport_timeout: Duration::from_secs(6),
            service_committer: Identity::new("change-submit", "bot@example.com"),
        }
    }

    /// Bare remote with one commit on `main`, returned as a clone URL.
    fn seeded_remote(root: &Path) -> String {
        let bare_path = root.join("remote.git");
        let bare = Repository::init_bare(&bare_path).unwrap();

        let seed_path = root.join("seed");
        let seed = Repository::init(&seed_path).unwrap();
        fs::write(seed_path.join("README.md"), "hello\n").unwrap();
        let mut index = seed.index().unwrap();
        index.add_path(Path::new("README.md")).unwrap();
        index.write().unwrap();
        let tree = seed.find_tree(index.write_tree().unwrap()).unwrap();
        let sig = Signature::now("Seed", "seed@example.com").unwrap();
        seed.commit(Some("HEAD"), &sig, &sig, "Initial commit", &tree, &[])
            .unwrap();

        let head_ref = seed.head().unwrap().name().unwrap().to_string();
        let mut remote = seed
            .remote("origin", bare_path.to_str().unwrap())
            .unwrap();
        remote
            .push(&[format!("{head_ref}:refs/heads/main")], None)
            .unwrap();
        bare.set_head("refs/heads/main").unwrap();

        bare_path.to_str().unwrap().to_string()
    }

    fn cloned(root: &TempDir) -> (RepoHandle, String) {
        let url = seeded_remote(root.path());
        let handle = RepoHandle::clone_into(
            settings(&root.path().join("locks")),
            &Credential::new("unused-for-local"),
            &url,
            &root.path().join("work"),
        )
        .unwrap();
        (handle, url)
    }

    fn remote_branch_oid(url: &str, branch: &str) -> Option<Oid> {
        let bare = Repository::open_bare(url).unwrap();
        let oid = bare
            .find_reference(&format!("refs/heads/{branch}"))
            .ok()
            .and_then(|r| r.target());
        oid
    }

    #[test]
    fn test_clone_refuses_existing_destination() {
        let root = TempDir::new().unwrap();
        let url = seeded_remote(root.path());
        let dest = root.path().join("occupied");
        fs::create_dir_all(&dest).unwrap();
        fs::write(dest.join("keep.txt"), "precious").unwrap();

        let result = RepoHandle::clone_into(
            settings(&root.path().join("locks")),
            &Credential::new("x"),
            &url,
            &dest,
        );

        assert!(matches!(result, Err(RepoError::DestinationExists { .. })));
        assert_eq!(fs::read_to_string(dest.join("keep.txt")).unwrap(), "precious");
        assert!(!dest.join(".git").exists());
    }

    #[test]
    fn test_clone_keeps_checkout_when_lock_is_held() {
        let root = TempDir::new().unwrap();
        let url = seeded_remote(root.path());
        let dest = root.path().join("contended");
        let settings = settings(&root.path().join("locks"));

        let holder = settings.locks.try_acquire(&dest).unwrap();
        let err = RepoHandle::clone_into(settings.clone(), &Credential::new("x"), &url, &dest)
            .unwrap_err();

        assert!(err.is_lock_conflict());
        assert!(dest.join(".git").exists());
        assert_eq!(fs::read_to_string(dest.join("README.md")).unwrap(), "hello\n");

        // The failed clone did not leave a lock of its own behind.
        holder.release();
        let reopened = RepoHandle::open(settings, &dest).unwrap();
        reopened.close();
    }

    /// Accepts HTTP connections and never answers. Returns its base URL.
    fn silent_server() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            let mut held = Vec::new();
            for stream in listener.incoming().flatten() {
                held.push(stream);
            }
        });
        format!("http://{addr}")
    }

    fn short_timeout(mut settings: RepoSettings) -> RepoSettings {
        settings.transport_timeout = Duration::from_secs(2);
        settings
    }

    #[test]
    fn test_clone_from_silent_server_times_out() {
        let root = TempDir::new().unwrap();
        let url = format!("{}/acme/widgets.git", silent_server());
        let settings = short_timeout(settings(&root.path().join("locks")));
        let dest = root.path().join("never");

        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let result = RepoHandle::clone_into(settings, &Credential::new("x"), &url, &dest);
            let _ = tx.send(result.map(|handle| handle.close()));
        });

        let result = rx
            .recv_timeout(Duration::from_secs(30))
            .expect("clone hung on a silent server");
        assert!(matches!(result, Err(RepoError::Git { operation: "clone", .. })));
    }

    #[test]
    fn test_push_to_silent_server_times_out() {
        let root = TempDir::new().unwrap();
        let url = seeded_remote(root.path());
        let handle = RepoHandle::clone_into(
            short_timeout(settings(&root.path().join("locks"))),
            &Credential::new("x"),
            &url,
            &root.path().join("work"),
        )
        .unwrap();
        handle
            .set_remote(ORIGIN, &format!("{}/octocat/widgets.git", silent_server()))
            .unwrap();

        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let _ = tx.send(handle.push_origin(&Credential::new("x"), "main", "main"));
        });

        let result = rx
            .recv_timeout(Duration::from_secs(30))
            .expect("push hung on a silent server");
        assert!(matches!(result, Err(RepoError::Git { operation: "push", .. })));
    }

    #[test]
    fn test_open_twice_is_lock_conflict() {
        let root = TempDir::new().unwrap();
        let (first, _url) = cloned(&root);

        let second = RepoHandle::open(settings(&root.path().join("locks")), first.path());
        assert!(second.unwrap_err().is_lock_conflict());

        let path = first.path().to_path_buf();
        first.close();
        assert!(RepoHandle::open(settings(&root.path().join("locks")), &path).is_ok());
    }

    #[test]
    fn test_set_remote_replaces_url() {
        let root = TempDir::new().unwrap();
        let (handle, _url) = cloned(&root);

        handle.set_remote(ORIGIN, "https://example.com/fork.git").unwrap();
        handle.set_remote(ORIGIN, "https://example.com/other.git").unwrap();
        handle.set_remote("upstream", "https://example.com/up.git").unwrap();

        let repo = Repository::open(handle.path()).unwrap();
        let origin = repo.find_remote(ORIGIN).unwrap();
        assert_eq!(origin.url(), Some("https://example.com/other.git"));
        assert_eq!(repo.remotes().unwrap().len(), 2);
    }

    #[test]
    fn test_checkout_creates_tracking_branch() {
        let root = TempDir::new().unwrap();
        let (handle, _url) = cloned(&root);

        handle.checkout("feature/docs").unwrap();
        assert_eq!(handle.current_branch().unwrap().as_deref(), Some("feature/docs"));

        let repo = Repository::open(handle.path()).unwrap();
        let config = repo.config().unwrap();
        assert_eq!(config.get_string("branch.feature/docs.remote").unwrap(), "origin");
        assert_eq!(
            config.get_string("branch.feature/docs.merge").unwrap(),
            "refs/heads/feature/docs"
        );

        // Already current: no-op
        handle.checkout("feature/docs").unwrap();
        // Existing, not current
        handle.checkout("main").unwrap();
        handle.checkout("feature/docs").unwrap();
        assert_eq!(handle.current_branch().unwrap().as_deref(), Some("feature/docs"));
    }

    #[test]
    fn test_add_missing_path_is_ok() {
        let root = TempDir::new().unwrap();
        let (handle, _url) = cloned(&root);

        handle.add(Path::new("does/not/exist.md")).unwrap();
        assert!(handle.is_clean().unwrap());
    }

    #[test]
    fn test_add_rejects_path_outside_workdir() {
        let root = TempDir::new().unwrap();
        let (handle, _url) = cloned(&root);

        let outside = root.path().join("elsewhere.txt");
        fs::write(&outside, "x").unwrap();
        assert!(matches!(
            handle.add(&outside),
            Err(RepoError::PathOutsideWorkdir { .. })
        ));
    }

    #[test]
    fn test_commit_is_idempotent() {
        let root = TempDir::new().unwrap();
        let (handle, _url) = cloned(&root);

        fs::write(handle.path().join("README.md"), "new text\n").unwrap();
        handle.add(Path::new("README.md")).unwrap();

        let first = handle.commit("Ada", "ada@example.com", "Update README").unwrap();
        assert!(first.is_some());
        let second = handle.commit("Ada", "ada@example.com", "Update README").unwrap();
        assert!(second.is_none());

        let repo = Repository::open(handle.path()).unwrap();
        let head = repo.head().unwrap().peel_to_commit().unwrap();
        assert_eq!(Some(head.id()), first);
        assert_eq!(head.author().name(), Some("Ada"));
        assert_eq!(head.committer().name(), Some("change-submit"));
        assert_eq!(head.committer().email(), Some("bot@example.com"));
        assert_eq!(head.parent(0).unwrap().message(), Some("Initial commit"));
    }

    #[test]
    fn test_head_commit_message_follows_commits() {
        let root = TempDir::new().unwrap();
        let (handle, _url) = cloned(&root);
        assert_eq!(
            handle.head_commit_message().unwrap().as_deref(),
            Some("Initial commit")
        );

        fs::write(handle.path().join("README.md"), "changed\n").unwrap();
        handle.add(Path::new("README.md")).unwrap();
        handle.commit("Ada", "ada@example.com", "Update README").unwrap();
        assert_eq!(
            handle.head_commit_message().unwrap().as_deref(),
            Some("Update README")
        );

        let empty_path = root.path().join("empty");
        Repository::init(&empty_path).unwrap();
        let empty = RepoHandle::open(settings(&root.path().join("locks")), &empty_path).unwrap();
        assert_eq!(empty.head_commit_message().unwrap(), None);
    }

    #[test]
    fn test_add_directory_and_deletion() {
        let root = TempDir::new().unwrap();
        let (handle, _url) = cloned(&root);

        fs::create_dir_all(handle.path().join("keps/sig-docs")).unwrap();
        fs::write(handle.path().join("keps/sig-docs/README.md"), "# KEP\n").unwrap();
        fs::write(handle.path().join("keps/sig-docs/kep.yaml"), "title: x\n").unwrap();
        handle.add(Path::new("keps")).unwrap();
        handle.commit("Ada", "ada@example.com", "Add KEP").unwrap().unwrap();

        fs::remove_file(handle.path().join("README.md")).unwrap();
        handle.add(&handle.path().join("README.md")).unwrap();
        handle.commit("Ada", "ada@example.com", "Drop README").unwrap().unwrap();

        let repo = Repository::open(handle.path()).unwrap();
        let tree = repo.head().unwrap().peel_to_tree().unwrap();
        assert!(tree.get_path(Path::new("keps/sig-docs/kep.yaml")).is_ok());
        assert!(tree.get_path(Path::new("README.md")).is_err());
    }

    #[test]
    fn test_push_is_idempotent() {
        let root = TempDir::new().unwrap();
        let (handle, url) = cloned(&root);
        let credential = Credential::new("token");

        handle.checkout("docs-update").unwrap();
        fs::write(handle.path().join("README.md"), "pushed\n").unwrap();
        handle.add(Path::new("README.md")).unwrap();
        let oid = handle.commit("Ada", "ada@example.com", "Push me").unwrap();

        handle.push_origin(&credential, "docs-update", "docs-update").unwrap();
        handle.push_origin(&credential, "docs-update", "docs-update").unwrap();

        assert_eq!(remote_branch_oid(&url, "docs-update"), oid);
    }

    #[test]
    fn test_push_force_updates_renamed_remote_branch() {
        let root = TempDir::new().unwrap();
        let (handle, url) = cloned(&root);
        let credential = Credential::new("token");

        fs::write(handle.path().join("README.md"), "first\n").unwrap();
        handle.add(Path::new("README.md")).unwrap();
        handle.commit("Ada", "ada@example.com", "First").unwrap();
        handle.push_origin(&credential, "main", "review").unwrap();

        // Rewrite history locally; the forced refspec must still win.
        let repo = Repository::open(handle.path()).unwrap();
        let initial = repo.revparse_single("HEAD~1").unwrap();
        repo.reset(&initial, git2::ResetType::Hard, None).unwrap();
        fs::write(handle.path().join("README.md"), "second\n").unwrap();
        handle.add(Path::new("README.md")).unwrap();
        let rewritten = handle.commit("Ada", "ada@example.com", "Second").unwrap();
        handle.push_origin(&credential, "main", "review").unwrap();

        assert_eq!(remote_branch_oid(&url, "review"), rewritten);
    }

    #[test]
    fn test_push_with_staged_changes_fails() {
        let root = TempDir::new().unwrap();
        let (handle, url) = cloned(&root);
        let before = remote_branch_oid(&url, "main");

        fs::write(handle.path().join("notes.md"), "staged only\n").unwrap();
        handle.add(Path::new("notes.md")).unwrap();

        let result = handle.push_origin(&Credential::new("token"), "main", "main");
        match result {
            Err(RepoError::UncommittedChanges { files, .. }) => {
                assert_eq!(files, vec!["notes.md".to_string()]);
            }
            other => panic!("expected UncommittedChanges, got {other:?}"),
        }
        assert_eq!(remote_branch_oid(&url, "main"), before);
    }
}
