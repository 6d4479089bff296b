//! Cross-process exclusive locks keyed by working-copy path
//!
//! Each local repository path maps to a zero-length marker file inside a
//! shared lock directory. Holding an OS advisory lock on that file (via
//! `fd-lock`) marks the repository as in use. Acquisition never blocks: a
//! second caller gets [`LockError::Conflict`] straight away.

use fd_lock::RwLock;
use sha2::{Digest, Sha256};
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Suffix appended to every derived lock key.
pub const LOCK_SUFFIX: &str = ".lock";

#[derive(Debug, Error)]
pub enum LockError {
    #[error("repository {} is locked by another handle ({})", path.display(), lock_file.display())]
    Conflict { path: PathBuf, lock_file: PathBuf },
    #[error("lock infrastructure failure at {}: {source}", lock_file.display())]
    Infrastructure {
        lock_file: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Hands out per-path locks from a single lock directory.
#[derive(Debug, Clone)]
pub struct LockManager {
    dir: PathBuf,
}

impl LockManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `<user cache dir>/change-submit/locks`, or the temp dir when the
    /// platform has no cache dir.
    pub fn default_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("change-submit")
            .join("locks")
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Full path of the marker file guarding `repo_path`.
    pub fn lock_file_for(&self, repo_path: &Path) -> PathBuf {
        self.dir.join(derive_key(repo_path))
    }

    /// Non-blocking exclusive acquisition.
    pub fn try_acquire(&self, repo_path: &Path) -> Result<LockHandle, LockError> {
        let lock_file = self.lock_file_for(repo_path);

        std::fs::create_dir_all(&self.dir).map_err(|source| LockError::Infrastructure {
            lock_file: lock_file.clone(),
            source,
        })?;

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_file)
            .map_err(|source| LockError::Infrastructure {
                lock_file: lock_file.clone(),
                source,
            })?;

        let mut lock = RwLock::new(file);
        match lock.try_write() {
            // The advisory lock lives as long as the descriptor; closing the
            // file in LockHandle's drop releases it.
            Ok(guard) => std::mem::forget(guard),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                tracing::debug!(lock_file = %lock_file.display(), "lock already held");
                return Err(LockError::Conflict {
                    path: repo_path.to_path_buf(),
                    lock_file,
                });
            }
            Err(source) => return Err(LockError::Infrastructure { lock_file, source }),
        }

        tracing::debug!(lock_file = %lock_file.display(), "lock acquired");
        Ok(LockHandle {
            repo_path: repo_path.to_path_buf(),
            lock_file,
            file: Some(lock),
        })
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new(Self::default_dir())
    }
}

/// A held lock. Released when dropped or when [`LockHandle::release`] is called.
#[derive(Debug)]
pub struct LockHandle {
    repo_path: PathBuf,
    lock_file: PathBuf,
    file: Option<RwLock<File>>,
}

impl LockHandle {
    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    pub fn lock_file(&self) -> &Path {
        &self.lock_file
    }

    pub fn is_held(&self) -> bool {
        self.file.is_some()
    }

    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if self.file.take().is_some() {
            tracing::debug!(lock_file = %self.lock_file.display(), "lock released");
        }
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        self.release_inner();
    }
}

/// Derive the lock-file name for a repository path.
///
/// The path is made absolute and normalised, `%` and `_` are escaped so the
/// mapping stays injective, separators become `_`, the leading separator is
/// dropped and [`LOCK_SUFFIX`] is appended. Keys too long for a file name
/// keep a readable prefix followed by a SHA-256 of the full key.
pub fn derive_key(repo_path: &Path) -> String {
    let normalized = normalize_path(repo_path);
    let raw = normalized.to_string_lossy();

    let mut key = String::with_capacity(raw.len() + LOCK_SUFFIX.len());
    for ch in raw.trim_start_matches(is_separator).chars() {
        match ch {
            '%' => key.push_str("%25"),
            '_' => key.push_str("%5F"),
            ':' => key.push_str("%3A"),
            '?' => key.push_str("%3F"),
            c if is_separator(c) => key.push('_'),
            // An ordinary file name character outside Windows
            '\\' => key.push_str("%5C"),
            other => key.push(other),
        }
    }

    if key.len() + LOCK_SUFFIX.len() > MAX_KEY_LEN {
        key = shorten(&key);
    }
    key.push_str(LOCK_SUFFIX);
    key
}

/// Longest lock-file name produced, suffix included. Most filesystems stop
/// at 255 bytes.
const MAX_KEY_LEN: usize = 200;

/// Bytes of the original key kept in front of the digest.
const SHORTENED_PREFIX_LEN: usize = 100;

fn is_separator(c: char) -> bool {
    c == '/' || (cfg!(windows) && c == '\\')
}

fn shorten(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    let mut cut = SHORTENED_PREFIX_LEN.min(key.len());
    while !key.is_char_boundary(cut) {
        cut -= 1;
    }

    let mut short = String::with_capacity(cut + 1 + digest.len() * 2);
    short.push_str(&key[..cut]);
    short.push('-');
    for byte in digest {
        short.push_str(&format!("{byte:02x}"));
    }
    short
}

/// Absolute, `.`/`..`-free form of `path`. The longest existing ancestor is
/// canonicalized, so the key is the same before and after the directory is
/// created.
fn normalize_path(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut lexical = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                lexical.pop();
            }
            other => lexical.push(other.as_os_str()),
        }
    }

    let mut missing = Vec::new();
    let mut existing = lexical.as_path();
    loop {
        if let Ok(canonical) = existing.canonicalize() {
            return missing
                .iter()
                .rev()
                .fold(canonical, |acc: PathBuf, part| acc.join(part));
        }
        match (existing.file_name(), existing.parent()) {
            (Some(name), Some(parent)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => return lexical,
        }
    }
}
