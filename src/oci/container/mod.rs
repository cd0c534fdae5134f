//! OCI container implementations.

use crate::oci::spec::runtime::{LinuxResources, Spec};
use anyhow::Result;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{path::PathBuf, process::Output};
use strum::{AsRefStr, Display, EnumString, IntoStaticStr};
use tokio::signal::unix::SignalKind;

pub mod local;

#[async_trait]
/// Container is the trait for implementing possible interactions with an OCI compatible container.
pub trait Container
where
    Self: Sized + Send + Sync + Serialize + DeserializeOwned,
{
    /// Create a new container from `spec` inside `bundle_dir`, which should be
    /// in the `Created` state afterwards. `runtime_binary` is the low-level
    /// OCI runtime (`runc`, `crun`, ...) to drive it with.
    async fn create(id: &str, spec: Spec, bundle_dir: PathBuf, runtime_binary: PathBuf) -> Result<Self>;

    /// Execute the user defined process in a created container.
    async fn start(&mut self) -> Result<()>;

    /// Delete any resources held by the container often used with detached container.
    async fn delete(&mut self) -> Result<()>;

    /// Suspend all processes inside the container.
    async fn pause(&mut self) -> Result<()>;

    /// Resumes all processes that have been previously paused.
    async fn resume(&mut self) -> Result<()>;

    /// Send the specified signal to the container's init process.
    async fn kill(&mut self, signal_kind: SignalKind) -> Result<()>;

    /// Update container resource constraints.
    async fn update(&mut self, resources: &LinuxResources) -> Result<()>;

    /// Execute the provided process inside the container.
    async fn exec(&self, command: &[String]) -> Result<Output>;

    /// Retrieve container resource statistics.
    async fn stats(&self) -> Result<ContainerStats>;

    /// Retrieve the state of a container.
    async fn state(&self) -> Result<ContainerState>;
}

#[derive(Clone, Debug, Default, Deserialize)]
/// Container resource statistics, parsed from the low-level runtime's `state`
/// output. Fuller cgroup accounting (cpu/memory/io usage) would come from
/// reading the container's own cgroup files, which the core launcher does
/// not do; `instance stats` reports what the runtime itself exposes.
pub struct ContainerStats {
    pub pid: Option<i32>,
}

#[derive(AsRefStr, Clone, Copy, Debug, Display, EnumString, Eq, Hash, IntoStaticStr, PartialEq)]
#[strum(serialize_all = "snake_case")]
/// Possible container states.
pub enum ContainerState {
    /// The container has been created (default state).
    Created,

    /// The container is running, usually after calling its `start()` trait method.
    Started,

    /// The container is paused, usually after calling its `pause()` trait method.
    Paused,

    /// The container is stopped, usually after calling its `kill()` trait method.
    Killed,
}
