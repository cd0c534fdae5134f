//! Content-addressed image cache (C2): at-most-one concurrent materialization
//! per fingerprint, both within one process (via [`crate::lock_map::LockMap`])
//! and across processes (via an advisory `flock` on a per-fingerprint lock
//! file), with atomic write-to-temp-then-rename commit.

use crate::{
    error::{ErrorKind, SifError},
    lock_map::LockMap,
};
use anyhow::Result;
use getset::Getters;
use nix::fcntl::{flock, FlockArg};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    future::Future,
    os::unix::io::AsRawFd,
    path::{Path, PathBuf},
    time::SystemTime,
};

/// A stable identifier for a cache entry: a digest of the source reference
/// plus a normalization key (architecture, platform, requested layer format).
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Metadata about a materialized artifact.
#[derive(Clone, Debug, Getters, Serialize, Deserialize)]
#[getset(get = "pub")]
pub struct CacheEntry {
    fingerprint: Fingerprint,
    content_digest: String,
    path: PathBuf,
    created_at: SystemTime,
    size: u64,
}

/// The content-addressed local store of pulled artifacts.
pub struct Cache {
    base_dir: PathBuf,
    locks: LockMap<String>,
}

impl Cache {
    /// Open (creating if necessary) a cache rooted at `base_dir`.
    pub fn open(base_dir: impl Into<PathBuf>) -> Result<Self, SifError> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir).map_err(|e| io_err(e, &base_dir))?;
        Ok(Self {
            base_dir,
            locks: LockMap::default(),
        })
    }

    fn final_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.base_dir.join(fingerprint.as_str())
    }

    fn temp_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.base_dir.join(format!("{}.tmp", fingerprint.as_str()))
    }

    fn lock_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.base_dir.join(format!("{}.lock", fingerprint.as_str()))
    }

    /// Reader-side lookup: never blocks on another writer.
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<PathBuf> {
        let path = self.final_path(fingerprint);
        path.exists().then(|| path)
    }

    /// List every materialized artifact currently in the cache, keyed by the
    /// fingerprint its filename encodes. Stale `.tmp`/`.lock` files are
    /// skipped; they are not finished artifacts.
    pub fn list(&self) -> Result<Vec<CacheEntry>, SifError> {
        let mut entries = Vec::new();
        let dir = fs::read_dir(&self.base_dir).map_err(|e| io_err(e, &self.base_dir))?;
        for entry in dir {
            let entry = entry.map_err(|e| io_err(e, &self.base_dir))?;
            let path = entry.path();
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(n) if !n.ends_with(".tmp") && !n.ends_with(".lock") => n.to_string(),
                _ => continue,
            };
            let metadata = entry.metadata().map_err(|e| io_err(e, &path))?;
            entries.push(CacheEntry {
                fingerprint: Fingerprint::new(name),
                content_digest: String::new(),
                path,
                created_at: metadata.created().unwrap_or(SystemTime::UNIX_EPOCH),
                size: metadata.len(),
            });
        }
        Ok(entries)
    }

    /// Remove every materialized artifact, returning how many were deleted.
    /// Used by `cache clean`.
    pub fn clean(&self) -> Result<usize, SifError> {
        let mut removed = 0;
        for entry in self.list()? {
            remove_temp(entry.path())?;
            removed += 1;
        }
        Ok(removed)
    }

    /// Idempotent write path. Guarantees exactly one producer runs per
    /// `(process group, fingerprint)`: other in-process callers wait on a
    /// [`LockMap`] guard, other-process callers wait on an advisory `flock`
    /// of a per-fingerprint lock file. Every waiter re-checks for the final
    /// artifact before running its own producer.
    pub async fn materialize<F, Fut>(
        &self,
        fingerprint: &Fingerprint,
        producer: F,
    ) -> Result<PathBuf, SifError>
    where
        F: FnOnce(PathBuf) -> Fut,
        Fut: Future<Output = Result<(), SifError>>,
    {
        if let Some(path) = self.get(fingerprint) {
            return Ok(path);
        }

        let _in_process_guard = self.locks.lock(fingerprint.as_str().to_string()).await;
        if let Some(path) = self.get(fingerprint) {
            return Ok(path);
        }

        let lock_path = self.lock_path(fingerprint);
        let lock_file = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .open(&lock_path)
            .map_err(|e| io_err(e, &lock_path))?;

        let fd = lock_file.as_raw_fd();
        tokio::task::spawn_blocking(move || flock(fd, FlockArg::LockExclusive))
            .await
            .map_err(|e| SifError::new(ErrorKind::Integrity, anyhow::anyhow!(e)))?
            .map_err(|e| {
                SifError::new(
                    ErrorKind::Integrity,
                    anyhow::anyhow!("flock {}: {}", lock_path.display(), e),
                )
            })?;

        let result = self.materialize_locked(fingerprint, producer).await;

        let _ = flock(fd, FlockArg::Unlock);
        drop(lock_file);

        result
    }

    async fn materialize_locked<F, Fut>(
        &self,
        fingerprint: &Fingerprint,
        producer: F,
    ) -> Result<PathBuf, SifError>
    where
        F: FnOnce(PathBuf) -> Fut,
        Fut: Future<Output = Result<(), SifError>>,
    {
        if let Some(path) = self.get(fingerprint) {
            return Ok(path);
        }

        let final_path = self.final_path(fingerprint);
        let temp_path = self.temp_path(fingerprint);

        if temp_path.exists() {
            remove_temp(&temp_path)?;
        }

        producer(temp_path.clone()).await?;

        fs::rename(&temp_path, &final_path).map_err(|e| io_err(e, &final_path))?;

        Ok(final_path)
    }
}

fn remove_temp(path: &Path) -> Result<(), SifError> {
    if path.is_dir() {
        fs::remove_dir_all(path).map_err(|e| io_err(e, path))
    } else {
        fs::remove_file(path).map_err(|e| io_err(e, path))
    }
}

fn io_err(e: std::io::Error, path: &Path) -> SifError {
    SifError::new(
        ErrorKind::Integrity,
        anyhow::anyhow!("{}: {}", path.display(), e),
    )
}
