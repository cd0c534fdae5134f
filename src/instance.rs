//! Instance registry: persisted metadata for named, detached containers.
//!
//! Built on the [`crate::storage::KeyValueStorage`] trait and its `sled` +
//! `rmp-serde` [`crate::storage::default_key_value_storage::DefaultKeyValueStorage`]
//! impl, keyed by `(user, name)` over arbitrary byte keys. Per-name
//! coordination during `start`/`stop` reuses [`crate::lock_map::LockMap`],
//! same as the cache's in-process guard.

use crate::{
    error::{ErrorKind, SifError},
    lock_map::LockMap,
    storage::{default_key_value_storage::DefaultKeyValueStorage, KeyValueStorage},
};
use anyhow::anyhow;
use getset::Getters;
use nix::{
    sys::signal::{kill, Signal},
    unistd::Pid,
};
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

/// Current on-disk record layout. Readers ignore records of a newer,
/// incompatible version with a warning rather than failing the whole list.
const RECORD_VERSION: u32 = 1;

/// A set of bind-mounted namespace file paths pinned under a detached
/// instance's run directory, so a later `instance-join` can re-enter them
/// after the original process tree is gone, the same role a `pinns`-style
/// wrapper plays for CRI-O.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NamespacePins {
    pub user: Option<PathBuf>,
    pub pid: Option<PathBuf>,
    pub uts: Option<PathBuf>,
    pub ipc: Option<PathBuf>,
    pub net: Option<PathBuf>,
    pub mnt: Option<PathBuf>,
    pub cgroup: Option<PathBuf>,
}

/// Persisted metadata for one named, detached instance.
#[derive(Clone, Debug, Getters, PartialEq, Serialize, Deserialize)]
#[getset(get = "pub")]
pub struct InstanceRecord {
    version: u32,
    user: String,
    name: String,
    /// PID of the supervisor process.
    supervisor_pid: i32,
    /// PID of the container's init process, once known.
    container_pid: Option<i32>,
    image_path: PathBuf,
    created_at: SystemTime,
    user_namespace: bool,
    cgroup_path: Option<PathBuf>,
    log_paths: Vec<PathBuf>,
    boot: bool,
    #[serde(default)]
    namespace_pins: NamespacePins,
    /// Name of the CNI network wired up for this instance, if any, so
    /// `instance stop` can invoke the matching `DEL` before signaling the
    /// container init.
    #[serde(default)]
    cni_network: Option<String>,
}

impl InstanceRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user: impl Into<String>,
        name: impl Into<String>,
        supervisor_pid: i32,
        image_path: PathBuf,
        user_namespace: bool,
        cgroup_path: Option<PathBuf>,
        log_paths: Vec<PathBuf>,
        boot: bool,
    ) -> Self {
        Self {
            version: RECORD_VERSION,
            user: user.into(),
            name: name.into(),
            supervisor_pid,
            container_pid: None,
            image_path,
            created_at: SystemTime::now(),
            user_namespace,
            cgroup_path,
            log_paths,
            boot,
            namespace_pins: NamespacePins::default(),
            cni_network: None,
        }
    }

    /// Record that `net` was pinned to `path` by a CNI `ADD` invoked under
    /// network `name`, so a later `stop` can tear it down symmetrically.
    pub fn with_cni_network(mut self, name: String, net_ns_path: PathBuf) -> Self {
        self.namespace_pins.net = Some(net_ns_path);
        self.cni_network = Some(name);
        self
    }

    /// Whether the supervisor PID this record names is still alive. A PID
    /// that exists but belongs to a different, since-recycled process would
    /// be a false positive; that narrow race is accepted in favor of not
    /// requiring `/proc` start-time comparison for every `list`.
    pub fn is_alive(&self) -> bool {
        kill(Pid::from_raw(self.supervisor_pid), None).is_ok()
    }
}

fn key_for(user: &str, name: &str) -> Vec<u8> {
    format!("{}\0{}", user, name).into_bytes()
}

/// The persisted registry of named instances.
pub struct InstanceRegistry {
    storage: DefaultKeyValueStorage,
    locks: LockMap<String>,
}

impl InstanceRegistry {
    pub fn open(dir: &Path) -> Result<Self, SifError> {
        std::fs::create_dir_all(dir).map_err(|e| io_err(e, dir))?;
        let storage = DefaultKeyValueStorage::open(dir)
            .map_err(|e| SifError::new(ErrorKind::Supervisor, e))?;
        Ok(Self {
            storage,
            locks: LockMap::default(),
        })
    }

    /// Create a record for `name` atomically. Refuses if a live record with
    /// the same name already exists for `user`; replaces a stale one (dead
    /// PID) silently.
    pub async fn start(&mut self, user: &str, name: &str, record: InstanceRecord) -> Result<(), SifError> {
        let _guard = self.locks.lock(format!("{}\0{}", user, name)).await;

        if let Some(existing) = self.get_raw(user, name)? {
            if existing.is_alive() {
                return Err(SifError::new(
                    ErrorKind::InstanceExists,
                    anyhow!("instance {} already exists for {}", name, user),
                ));
            }
        }

        self.storage
            .insert(key_for(user, name), record)
            .map_err(|e| SifError::new(ErrorKind::Supervisor, e))?;
        self.storage
            .persist()
            .map_err(|e| SifError::new(ErrorKind::Supervisor, e))
    }

    /// Look up a record, returning `None` if it does not exist.
    pub fn get(&self, user: &str, name: &str) -> Result<Option<InstanceRecord>, SifError> {
        self.get_raw(user, name)
    }

    fn get_raw(&self, user: &str, name: &str) -> Result<Option<InstanceRecord>, SifError> {
        let raw: Option<InstanceRecord> = self
            .storage
            .get(key_for(user, name))
            .map_err(|e| SifError::new(ErrorKind::Supervisor, e))?;
        Ok(raw.filter(|r| {
            if r.version() == &RECORD_VERSION {
                true
            } else {
                log::warn!(
                    "ignoring instance record {}/{}: unsupported version {}",
                    user,
                    name,
                    r.version()
                );
                false
            }
        }))
    }

    /// Enumerate every record, optionally filtered to one user, skipping and
    /// cleaning up records whose PID no longer exists.
    pub fn list(&mut self, user: Option<&str>) -> Result<Vec<InstanceRecord>, SifError> {
        let mut live = Vec::new();
        let mut stale = Vec::new();

        let keys: Vec<_> = self
            .storage
            .db()
            .iter()
            .keys()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| SifError::new(ErrorKind::Supervisor, e))?;

        for key in keys {
            let raw: Option<InstanceRecord> = self
                .storage
                .get(key.clone())
                .map_err(|e| SifError::new(ErrorKind::Supervisor, e))?;
            let record = match raw {
                Some(r) if r.version() == &RECORD_VERSION => r,
                _ => continue,
            };

            if let Some(user) = user {
                if record.user() != user {
                    continue;
                }
            }

            if record.is_alive() {
                live.push(record);
            } else {
                stale.push(key);
            }
        }

        for key in stale {
            self.storage
                .remove(key)
                .map_err(|e| SifError::new(ErrorKind::Supervisor, e))?;
        }
        self.storage
            .persist()
            .map_err(|e| SifError::new(ErrorKind::Supervisor, e))?;

        Ok(live)
    }

    /// Send `signal` to the container init PID, waiting up to `timeout`
    /// before escalating to `SIGKILL`; removes the record once the PID is
    /// gone. Only the creating UID (or root) may call this; that check is
    /// the CLI's responsibility, since the registry has no notion of the
    /// calling process's identity beyond the `user` key.
    pub async fn stop(
        &mut self,
        user: &str,
        name: &str,
        signal: Signal,
        timeout: Duration,
    ) -> Result<(), SifError> {
        let _guard = self.locks.lock(format!("{}\0{}", user, name)).await;

        let record = self.get_raw(user, name)?.ok_or_else(|| {
            SifError::new(ErrorKind::InstanceMissing, anyhow!("no such instance: {}", name))
        })?;

        let target = Pid::from_raw(record.container_pid().unwrap_or(*record.supervisor_pid()));
        let _ = kill(target, signal);

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if kill(target, None).is_err() {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                let _ = kill(target, Signal::SIGKILL);
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        self.storage
            .remove(key_for(user, name))
            .map_err(|e| SifError::new(ErrorKind::Supervisor, e))?;
        self.storage
            .persist()
            .map_err(|e| SifError::new(ErrorKind::Supervisor, e))
    }
}

fn io_err(e: std::io::Error, path: &Path) -> SifError {
    SifError::new(ErrorKind::Supervisor, anyhow!("{}: {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(pid: i32) -> InstanceRecord {
        InstanceRecord::new(
            "alice",
            "svc",
            pid,
            PathBuf::from("/tmp/image.sif"),
            true,
            None,
            vec![],
            false,
        )
    }

    #[tokio::test]
    async fn start_then_get_round_trips() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let mut reg = InstanceRegistry::open(dir.path())?;
        reg.start("alice", "svc", record(std::process::id() as i32)).await?;

        let got = reg.get("alice", "svc")?.unwrap();
        assert_eq!(got.name(), "svc");
        Ok(())
    }

    #[tokio::test]
    async fn start_refuses_duplicate_live_name() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let mut reg = InstanceRegistry::open(dir.path())?;
        let pid = std::process::id() as i32;
        reg.start("alice", "svc", record(pid)).await?;

        let err = reg.start("alice", "svc", record(pid)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InstanceExists);
        Ok(())
    }

    #[tokio::test]
    async fn start_replaces_stale_record() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let mut reg = InstanceRegistry::open(dir.path())?;
        // A PID this high is virtually guaranteed not to be alive.
        reg.start("alice", "svc", record(i32::MAX - 1)).await?;

        let pid = std::process::id() as i32;
        reg.start("alice", "svc", record(pid)).await?;

        let got = reg.get("alice", "svc")?.unwrap();
        assert_eq!(*got.supervisor_pid(), pid);
        Ok(())
    }

    #[tokio::test]
    async fn list_skips_and_cleans_dead_records() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let mut reg = InstanceRegistry::open(dir.path())?;
        reg.start("alice", "dead", record(i32::MAX - 1)).await?;
        reg.start("alice", "alive", record(std::process::id() as i32))
            .await?;

        let listed = reg.list(Some("alice"))?;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name(), "alive");
        assert!(reg.get("alice", "dead")?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn get_missing_is_none() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let reg = InstanceRegistry::open(dir.path())?;
        assert!(reg.get("alice", "nope")?.is_none());
        Ok(())
    }
}
