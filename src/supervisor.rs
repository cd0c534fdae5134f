//! Supervisor (C8): forks the low-level OCI runtime, forwards signals to the
//! container's init process, reaps it, and maps its exit status so that
//! death by signal `N` is reported as `128 + N`, matching convention for
//! shell and `instance stats`/`instance list` exit-code reporting alike.
//! Forwards the full signal set through a `tokio::select!` loop rather than
//! just `SIGINT`/`SIGTERM`, and drives `oci::container::local::OCIContainer`
//! directly for the detached (`instance start`) path.

use crate::{
    error::{ErrorKind, SifError},
    network::cni::{load_network_config, plugin::PluginBuilder},
    oci::{
        container::{local::OCIContainer, Container},
        spec::runtime::Spec,
    },
};
use anyhow::anyhow;
use nix::{
    sys::signal::{kill, Signal},
    unistd::Pid,
};
use std::path::{Path, PathBuf};
use tokio::{process::Command, signal::unix::SignalKind};

/// A named CNI network to wire up for a detached instance, resolved from
/// policy by the launcher before the container is created.
#[derive(Clone, Debug)]
pub struct CniNetworkSetup {
    pub config_dir: PathBuf,
    pub plugin_dir: PathBuf,
    pub network_name: String,
}

/// What a detached launch needs reported back to the caller: the container
/// init's PID for the instance record, and the network namespace path if a
/// CNI network was wired up, so it can be pinned for a later `instance stop`
/// to tear down symmetrically.
pub struct DetachedStart {
    pub pid: i32,
    pub netns_path: Option<PathBuf>,
}

/// Map a finished process's exit status to the supervisor's own exit code:
/// a normal exit is forwarded verbatim; death by signal `N` maps to `128 + N`.
pub fn exit_code_for(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    match status.code() {
        Some(code) => code,
        None => 128 + status.signal().unwrap_or(0),
    }
}

/// Drives one container through its lifecycle.
pub struct Supervisor {
    runtime_binary: PathBuf,
    bundle_dir: PathBuf,
    id: String,
}

impl Supervisor {
    pub fn new(runtime_binary: PathBuf, bundle_dir: PathBuf, id: impl Into<String>) -> Self {
        Self {
            runtime_binary,
            bundle_dir,
            id: id.into(),
        }
    }

    /// Run the container in the foreground: stdio inherited from this
    /// process, signals forwarded to the runtime's process (which itself
    /// forwards to the container init), exit code mapped per
    /// [`exit_code_for`]. Used for `exec`/`run`/`shell`/`test`.
    pub async fn run_interactive(&self) -> Result<i32, SifError> {
        let mut child = Command::new(&self.runtime_binary)
            .arg("run")
            .arg("--bundle")
            .arg(&self.bundle_dir)
            .arg(&self.id)
            .spawn()
            .map_err(|e| SifError::new(ErrorKind::Runtime, anyhow!("spawn low-level runtime: {}", e)))?;

        let pid = child.id().map(|p| Pid::from_raw(p as i32));

        let mut sig_int = self.signal(SignalKind::interrupt())?;
        let mut sig_term = self.signal(SignalKind::terminate())?;
        let mut sig_hup = self.signal(SignalKind::hangup())?;
        let mut sig_usr1 = self.signal(SignalKind::user_defined1())?;
        let mut sig_usr2 = self.signal(SignalKind::user_defined2())?;
        let mut sig_winch = self.signal(SignalKind::window_change())?;

        let status = loop {
            tokio::select! {
                res = child.wait() => {
                    break res.map_err(|e| {
                        SifError::new(ErrorKind::Supervisor, anyhow!("wait for container: {}", e))
                    })?;
                }
                _ = sig_int.recv() => self.forward(pid, Signal::SIGINT),
                _ = sig_term.recv() => self.forward(pid, Signal::SIGTERM),
                _ = sig_hup.recv() => self.forward(pid, Signal::SIGHUP),
                _ = sig_usr1.recv() => self.forward(pid, Signal::SIGUSR1),
                _ = sig_usr2.recv() => self.forward(pid, Signal::SIGUSR2),
                _ = sig_winch.recv() => self.forward(pid, Signal::SIGWINCH),
            }
        };

        Ok(exit_code_for(status))
    }

    /// Create and start the container detached, returning the container
    /// init's PID once the runtime reports it. Used for `instance start`.
    ///
    /// When `network` is given, the container is created (but not yet
    /// started) first so its network namespace exists, the CNI plugin's
    /// `ADD` is invoked against that namespace, and only then is the
    /// container started — the low-level runtime's `create`/`start` split
    /// is exactly what makes this ordering possible, which is why this path
    /// is only available for detached instances (see `launcher.rs`).
    pub async fn start_detached(&self, spec: Spec, network: Option<CniNetworkSetup>) -> Result<DetachedStart, SifError> {
        let mut container = OCIContainer::create(
            &self.id,
            spec,
            self.bundle_dir.clone(),
            self.runtime_binary.clone(),
        )
        .await
        .map_err(|e| SifError::new(ErrorKind::Runtime, e))?;

        let netns_path = match network {
            Some(setup) => Some(self.wire_network(&container, &setup).await?),
            None => None,
        };

        container
            .start()
            .await
            .map_err(|e| SifError::new(ErrorKind::Runtime, e))?;

        let stats = container
            .stats()
            .await
            .map_err(|e| SifError::new(ErrorKind::Runtime, e))?;

        let pid = stats.pid.ok_or_else(|| {
            SifError::new(
                ErrorKind::Supervisor,
                anyhow!("low-level runtime did not report a pid after start"),
            )
        })?;

        Ok(DetachedStart { pid, netns_path })
    }

    /// Resolve the created container's network namespace and invoke the
    /// named CNI plugin's `ADD` against it.
    async fn wire_network(&self, container: &OCIContainer, setup: &CniNetworkSetup) -> Result<PathBuf, SifError> {
        let stats = container
            .stats()
            .await
            .map_err(|e| SifError::new(ErrorKind::Runtime, e))?;
        let pid = stats.pid.ok_or_else(|| {
            SifError::new(
                ErrorKind::Supervisor,
                anyhow!("low-level runtime did not report a pid after create"),
            )
        })?;
        let netns_path = PathBuf::from(format!("/proc/{}/ns/net", pid));

        let (binary, raw_config) = load_network_config(&setup.config_dir, &setup.plugin_dir, &setup.network_name)
            .map_err(|e| SifError::new(ErrorKind::PolicyDenied, e))?;
        let plugin = PluginBuilder::default()
            .binary(binary)
            .build()
            .map_err(|e| SifError::new(ErrorKind::Supervisor, anyhow!("build CNI plugin: {}", e)))?;

        plugin
            .add(&self.id, &netns_path.display().to_string(), "eth0", &raw_config)
            .await
            .map_err(|e| SifError::new(ErrorKind::Runtime, anyhow!("CNI add: {}", e)))?;

        Ok(netns_path)
    }

    /// Invoke the named CNI plugin's `DEL` against a previously wired
    /// network namespace, for `instance stop`. Best-effort: failures are
    /// returned to the caller to log, not propagated as a reason to skip
    /// signaling the container.
    pub async fn teardown_network(config_dir: &Path, plugin_dir: &Path, network_name: &str, container_id: &str, netns_path: &Path) -> Result<(), SifError> {
        let (binary, raw_config) = load_network_config(config_dir, plugin_dir, network_name)
            .map_err(|e| SifError::new(ErrorKind::PolicyDenied, e))?;
        let plugin = PluginBuilder::default()
            .binary(binary)
            .build()
            .map_err(|e| SifError::new(ErrorKind::Supervisor, anyhow!("build CNI plugin: {}", e)))?;
        plugin
            .del(container_id, &netns_path.display().to_string(), "eth0", &raw_config)
            .await
            .map_err(|e| SifError::new(ErrorKind::Runtime, anyhow!("CNI del: {}", e)))
    }

    fn signal(&self, kind: SignalKind) -> Result<tokio::signal::unix::Signal, SifError> {
        tokio::signal::unix::signal(kind)
            .map_err(|e| SifError::new(ErrorKind::Supervisor, anyhow!("register signal handler: {}", e)))
    }

    fn forward(&self, pid: Option<Pid>, signal: Signal) {
        if let Some(pid) = pid {
            if let Err(e) = kill(pid, signal) {
                log::warn!("forward {:?} to {}: {}", signal, pid, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_exit_is_forwarded_verbatim() {
        let status = std::process::Command::new("sh")
            .arg("-c")
            .arg("exit 0")
            .status()
            .unwrap();
        assert_eq!(exit_code_for(status), 0);
    }

    #[test]
    fn death_by_signal_maps_to_128_plus_n() {
        // SIGABRT is 6; `kill -ABRT $$` terminates the shell with that signal.
        let status = std::process::Command::new("sh")
            .arg("-c")
            .arg("kill -ABRT $$")
            .status()
            .unwrap();
        assert_eq!(exit_code_for(status), 134);
    }

    #[tokio::test]
    async fn start_detached_surfaces_runtime_failure_as_runtime_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let supervisor = Supervisor::new(which::which("false").unwrap(), dir.path().to_path_buf(), "id");
        let err = supervisor.start_detached(Spec::default(), None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Runtime);
    }
}
