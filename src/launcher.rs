//! The launcher state machine: turns an already-parsed [`Reference`] and a
//! set of launch options into a running (or detached) container by driving,
//! in order, the transport fetch, the image inspector, the setuid-vs-user-
//! namespace identity decision, the rootfs mount pipeline, the OCI spec
//! builder, and finally either the supervisor (interactive launch) or the
//! instance registry (detached launch).

use crate::{
    capability::{Capabilities, Capability},
    config::GlobalConfig,
    context::Context,
    error::{ErrorKind, SifError},
    image,
    instance::{InstanceRecord, InstanceRegistry},
    oci::container::{local::OCIContainerBuilder, Container},
    oci_spec::{
        builder::{BindMount, IdentityPolicy, NetworkRequest, OciSpecBuilder},
        runtime::{LinuxIDMapping, LinuxIDMappingBuilder, Spec},
    },
    reference::Reference,
    rootfs::{MountOptions, MountPipeline, OverlaySpec, WritablePolicy},
    supervisor::{exit_code_for, CniNetworkSetup, DetachedStart, Supervisor},
    transport::{self, FetchContext, RegistryAuth},
};
use anyhow::anyhow;
use std::path::{Path, PathBuf};

/// The stage a launch has reached, logged at each transition for
/// diagnosability; not otherwise branched on by callers.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LauncherState {
    Parsed,
    Fetched,
    Inspected,
    Mounted,
    Configured,
    Executing,
    Finalized,
}

/// What kind of launch this is. The distinction between `Exec`/`Run`/
/// `Shell`/`Test` is already baked into [`LauncherOptions::command`] by the
/// CLI layer; the launcher itself only needs to know whether the container
/// should be supervised in the foreground or started detached.
#[derive(Clone, Debug)]
pub enum Action {
    Exec,
    Run,
    Shell,
    Test,
    InstanceStart { name: String },
}

impl Action {
    fn instance_name(&self) -> Option<&str> {
        match self {
            Action::InstanceStart { name } => Some(name.as_str()),
            _ => None,
        }
    }
}

/// The network a launch requested, at the CLI grain (before it is resolved
/// into an [`crate::oci_spec::builder::NetworkRequest`]).
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NetworkSelection {
    /// No network namespace: the HPC default.
    Host,
    /// A fresh, isolated namespace with no CNI plugin invoked.
    None,
    /// A named CNI network, resolved from the policy's permitted list and
    /// wired up by invoking the configured CNI plugin. The low-level runtime
    /// is only driven through separate `create`/`start` for detached
    /// instances, which is the only place a CNI `ADD` has a namespace to
    /// target before the container's process starts; interactive launches
    /// reject a named network at validation.
    Named(String),
}

/// The outcome of a launch.
#[derive(Clone, Debug)]
pub enum LaunchOutcome {
    /// An interactive launch finished; the process should exit with this code.
    Exited(i32),
    /// A detached instance was started and registered.
    InstanceStarted { name: String, pid: i32 },
}

/// Every per-invocation knob the CLI collects, ahead of it being turned into
/// an [`crate::oci_spec::builder::LaunchOptions`]. Named differently from
/// that type (`Launcher` vs `LaunchOptions`) since they serve different
/// layers: this one is what the user asked for, that one is what the spec
/// builder needs to build a [`Spec`].
#[derive(Clone, Debug)]
pub struct LauncherOptions {
    pub reference: Reference,
    pub action: Action,
    pub command: Vec<String>,
    pub env: Vec<String>,
    pub cwd: String,
    pub hostname: Option<String>,
    pub writable: bool,
    pub writable_tmpfs: bool,
    pub compat: bool,
    pub no_compat: bool,
    pub fakeroot: bool,
    pub force_user_namespace: bool,
    pub add_capabilities: Vec<Capability>,
    pub drop_capabilities: Vec<Capability>,
    pub bind_mounts: Vec<BindMount>,
    pub overlay: OverlaySpec,
    pub network: NetworkSelection,
    pub memory_limit_bytes: Option<i64>,
    pub cpu_shares: Option<u64>,
    pub no_new_privileges: bool,
    /// Whether a started instance should be torn down and restarted across
    /// host reboots; stored on the instance record for `instance list` to
    /// report, not acted on by the launcher itself.
    pub boot: bool,
}

impl LauncherOptions {
    /// `--writable`/`--writable-tmpfs` and `--compat`/`--no-compat` are each
    /// mutually exclusive; `instance start` requires a non-empty name.
    pub fn validate(&self) -> Result<(), SifError> {
        if self.writable && self.writable_tmpfs {
            return Err(SifError::new(
                ErrorKind::OptionConflict,
                anyhow!("--writable and --writable-tmpfs are mutually exclusive"),
            ));
        }
        if self.compat && self.no_compat {
            return Err(SifError::new(
                ErrorKind::OptionConflict,
                anyhow!("--compat and --no-compat are mutually exclusive"),
            ));
        }
        if let Some(name) = self.action.instance_name() {
            if name.is_empty() {
                return Err(SifError::new(
                    ErrorKind::OptionConflict,
                    anyhow!("instance name must not be empty"),
                ));
            }
        }
        if let NetworkSelection::Named(_) = &self.network {
            if !matches!(self.action, Action::InstanceStart { .. }) {
                return Err(SifError::new(
                    ErrorKind::OptionConflict,
                    anyhow!("a named CNI network requires `instance start`; interactive launches get --net host or --net none"),
                ));
            }
        }
        Ok(())
    }

    fn writable_policy(&self) -> WritablePolicy {
        if self.writable {
            WritablePolicy::Writable
        } else if self.writable_tmpfs {
            WritablePolicy::WritableTmpfs
        } else {
            WritablePolicy::ReadOnly
        }
    }
}

/// Drives one launch end to end.
pub struct Launcher<'a> {
    ctx: &'a Context,
}

impl<'a> Launcher<'a> {
    pub fn new(ctx: &'a Context) -> Self {
        Self { ctx }
    }

    pub async fn run(&self, user: &str, options: LauncherOptions) -> Result<LaunchOutcome, SifError> {
        options.validate()?;
        log::debug!("launcher state: {:?}", LauncherState::Parsed);

        if let Reference::Instance(name) = &options.reference {
            return self.join_instance(user, name, &options.command).await;
        }

        let fetch_ctx = FetchContext {
            auth: RegistryAuth::from_env(),
        };
        let artifact_path = transport::pull(&fetch_ctx, &options.reference, &self.ctx.cache).await?;
        log::debug!("launcher state: {:?}", LauncherState::Fetched);

        let descriptor = image::inspect(&artifact_path)?;
        log::debug!("launcher state: {:?}", LauncherState::Inspected);

        let (uid, gid) = current_identity();
        let identity = resolve_identity(&options, &self.ctx.global, uid, gid)?;
        let is_user_namespace = matches!(identity, IdentityPolicy::UserNamespace { .. });
        let (network_request, cni_network_name) =
            resolve_network(&options, &self.ctx.global, is_user_namespace)?;

        let run_dir = self.run_dir_for(user, &options.action);
        std::fs::create_dir_all(&run_dir).map_err(|e| io_err(e, &run_dir))?;

        let capability_base = if options.compat {
            Capabilities::none()
        } else {
            Capabilities::default()
        };
        let capabilities =
            Capabilities::resolve(&capability_base, &options.add_capabilities, &options.drop_capabilities);

        let mount_options = MountOptions {
            writable: options.writable_policy(),
            // Kernel loop mounts require a privilege level unprivileged user
            // namespaces don't have; FUSE is the only path available there.
            prefer_fuse: is_user_namespace,
        };

        let mut mounted = MountPipeline::default()
            .mount(&descriptor, &options.overlay, &mount_options, &run_dir, &capabilities)
            .await?;
        log::debug!("launcher state: {:?}", LauncherState::Mounted);

        let spec_options = crate::oci_spec::builder::LaunchOptions {
            args: options.command.clone(),
            env: options.env.clone(),
            cwd: options.cwd.clone(),
            hostname: options.hostname.clone(),
            identity,
            capabilities,
            no_new_privileges: options.no_new_privileges,
            readonly_rootfs: !(options.writable || options.writable_tmpfs),
            bind_mounts: options.bind_mounts.clone(),
            network: network_request,
            memory_limit_bytes: options.memory_limit_bytes,
            cpu_shares: options.cpu_shares,
        };

        let spec = OciSpecBuilder::build(&spec_options, &mounted.path)?;
        log::debug!("launcher state: {:?}", LauncherState::Configured);

        let bundle_dir = run_dir.join("bundle");

        match &options.action {
            Action::InstanceStart { name } => {
                log::debug!("launcher state: {:?}", LauncherState::Executing);
                let supervisor = Supervisor::new(self.ctx.runtime_binary.clone(), bundle_dir, name.clone());
                let cni_setup = cni_network_name.clone().map(|network_name| CniNetworkSetup {
                    config_dir: self.ctx.cni_config_dir.clone(),
                    plugin_dir: self.ctx.cni_plugin_dir.clone(),
                    network_name,
                });
                let DetachedStart { pid, netns_path } = supervisor.start_detached(spec, cni_setup).await?;

                // The container keeps running after this call returns, so the
                // composed root must outlive this process; forget the undo
                // stack instead of letting it unmount on drop. The kernel
                // mount itself is unaffected by this process exiting.
                std::mem::forget(mounted);

                let mut registry = InstanceRegistry::open(&self.ctx.instances_dir)?;
                let mut record = InstanceRecord::new(
                    user,
                    name.clone(),
                    pid,
                    artifact_path,
                    is_user_namespace,
                    None,
                    vec![],
                    options.boot,
                );
                if let (Some(network_name), Some(netns_path)) = (cni_network_name, netns_path) {
                    record = record.with_cni_network(network_name, netns_path);
                }
                registry.start(user, name, record).await?;
                log::debug!("launcher state: {:?}", LauncherState::Finalized);

                Ok(LaunchOutcome::InstanceStarted {
                    name: name.clone(),
                    pid,
                })
            }
            _ => {
                std::fs::create_dir_all(&bundle_dir).map_err(|e| io_err(e, &bundle_dir))?;
                spec.save(&bundle_dir.join("config.json"))
                    .map_err(|e| SifError::new(ErrorKind::Runtime, e))?;

                log::debug!("launcher state: {:?}", LauncherState::Executing);
                let supervisor = Supervisor::new(
                    self.ctx.runtime_binary.clone(),
                    bundle_dir,
                    format!("sifrun-{}", std::process::id()),
                );
                let code = supervisor.run_interactive().await?;

                mounted.undo.unwind();
                log::debug!("launcher state: {:?}", LauncherState::Finalized);

                Ok(LaunchOutcome::Exited(code))
            }
        }
    }

    /// Where this launch's bundle and mount tree live: a per-name directory
    /// under the instances dir for detached launches (so a later join can
    /// find it again), a scratch directory under the system temp dir for
    /// everything else.
    fn run_dir_for(&self, user: &str, action: &Action) -> PathBuf {
        match action.instance_name() {
            Some(name) => self.ctx.instances_dir.join(user).join(name),
            None => std::env::temp_dir().join(format!("sifrun-{}-{}", user, std::process::id())),
        }
    }

    /// Re-enter a running instance to execute `command`, rather than
    /// launching a new container. Grounded in [`Container::exec`]: the
    /// instance's bundle directory and id are reconstructed from its
    /// registry record rather than re-running the mount/spec pipeline, since
    /// the instance's own supervisor already owns its rootfs and config.
    async fn join_instance(&self, user: &str, name: &str, command: &[String]) -> Result<LaunchOutcome, SifError> {
        let registry = InstanceRegistry::open(&self.ctx.instances_dir)?;
        let record = registry.get(user, name)?.ok_or_else(|| {
            SifError::new(ErrorKind::InstanceMissing, anyhow!("no such instance: {}", name))
        })?;
        if !record.is_alive() {
            return Err(SifError::new(
                ErrorKind::InstanceMissing,
                anyhow!("instance {} is not running", name),
            ));
        }

        let bundle_dir = self.ctx.instances_dir.join(user).join(name).join("bundle");
        let container = OCIContainerBuilder::default()
            .id(name.to_string())
            .spec(Spec::default())
            .bundle_dir(bundle_dir)
            .runtime_binary(self.ctx.runtime_binary.clone())
            .build()
            .map_err(|e| SifError::new(ErrorKind::Supervisor, anyhow!("build container handle: {}", e)))?;

        let output = container
            .exec(command)
            .await
            .map_err(|e| SifError::new(ErrorKind::Runtime, e))?;

        Ok(LaunchOutcome::Exited(exit_code_for(output.status)))
    }
}

fn current_identity() -> (u32, u32) {
    (
        nix::unistd::Uid::current().as_raw(),
        nix::unistd::Gid::current().as_raw(),
    )
}

/// Decide between the setuid and user-namespace launch paths:
/// - `--fakeroot` maps the invoking user to uid/gid 0 inside a user
///   namespace, backed by the policy's configured subuid/subgid ranges, and
///   requires `allow-fakeroot`.
/// - Already running as root needs neither: launch directly.
/// - Otherwise, the setuid path is used when the CLI didn't force a user
///   namespace and policy allows it; a user namespace mapping the invoking
///   uid/gid 1:1 is the fallback, so an unprivileged user without setuid
///   access can still launch, just without kernel loop mounts.
fn resolve_identity(
    options: &LauncherOptions,
    global: &GlobalConfig,
    uid: u32,
    gid: u32,
) -> Result<IdentityPolicy, SifError> {
    if options.fakeroot {
        if !global.allow_fakeroot() {
            return Err(SifError::new(
                ErrorKind::PolicyDenied,
                anyhow!("fakeroot is not permitted by policy"),
            ));
        }
        let subuid = global.fakeroot_subuid_range().clone().ok_or_else(|| {
            SifError::new(
                ErrorKind::PolicyDenied,
                anyhow!("fakeroot requested but no subuid range is configured"),
            )
        })?;
        let subgid = global.fakeroot_subgid_range().clone().ok_or_else(|| {
            SifError::new(
                ErrorKind::PolicyDenied,
                anyhow!("fakeroot requested but no subgid range is configured"),
            )
        })?;
        let (uid_start, uid_count) = parse_subid_range(&subuid)?;
        let (gid_start, gid_count) = parse_subid_range(&subgid)?;

        return Ok(IdentityPolicy::UserNamespace {
            uid: 0,
            gid: 0,
            uid_mappings: vec![id_mapping(0, uid, 1), id_mapping(1, uid_start, uid_count)],
            gid_mappings: vec![id_mapping(0, gid, 1), id_mapping(1, gid_start, gid_count)],
        });
    }

    if uid == 0 {
        return Ok(IdentityPolicy::Setuid { uid, gid });
    }

    if !options.force_user_namespace && global.allow_setuid() {
        return Ok(IdentityPolicy::Setuid { uid, gid });
    }

    Ok(IdentityPolicy::UserNamespace {
        uid,
        gid,
        uid_mappings: vec![id_mapping(uid, uid, 1)],
        gid_mappings: vec![id_mapping(gid, gid, 1)],
    })
}

/// Resolve a CLI-grain [`NetworkSelection`] into the [`NetworkRequest`] the
/// spec builder needs, plus the CNI network name to wire up after the
/// container is created, if any. A named network is checked against the
/// policy's permitted list only for unprivileged (user-namespace) launches;
/// root running through the setuid path is trusted the same way it already
/// is for every other policy knob in [`resolve_identity`].
fn resolve_network(
    options: &LauncherOptions,
    global: &GlobalConfig,
    is_user_namespace: bool,
) -> Result<(NetworkRequest, Option<String>), SifError> {
    match &options.network {
        NetworkSelection::Host => Ok((NetworkRequest::Host, None)),
        NetworkSelection::None => Ok((NetworkRequest::Isolated, None)),
        NetworkSelection::Named(name) => {
            if is_user_namespace && !global.permitted_networks().iter().any(|n| n == name) {
                return Err(SifError::new(
                    ErrorKind::PolicyDenied,
                    anyhow!("network {} is not permitted for unprivileged launches", name),
                ));
            }
            Ok((NetworkRequest::Isolated, Some(name.clone())))
        }
    }
}

fn id_mapping(container_id: u32, host_id: u32, size: u32) -> LinuxIDMapping {
    LinuxIDMappingBuilder::default()
        .container_id(container_id)
        .host_id(host_id)
        .size(size)
        .build()
        .expect("id mapping builder has no required fields")
}

fn parse_subid_range(range: &str) -> Result<(u32, u32), SifError> {
    let malformed = || {
        SifError::new(
            ErrorKind::PolicyDenied,
            anyhow!("malformed subid range: {}", range),
        )
    };
    let (start, count) = range.split_once(':').ok_or_else(malformed)?;
    Ok((
        start.parse().map_err(|_| malformed())?,
        count.parse().map_err(|_| malformed())?,
    ))
}

fn io_err(e: std::io::Error, path: &Path) -> SifError {
    SifError::new(ErrorKind::Runtime, anyhow!("{}: {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_options() -> LauncherOptions {
        LauncherOptions {
            reference: Reference::Dir("/tmp".to_string()),
            action: Action::Run,
            command: vec!["/bin/sh".to_string()],
            env: vec![],
            cwd: "/".to_string(),
            hostname: None,
            writable: false,
            writable_tmpfs: false,
            compat: false,
            no_compat: false,
            fakeroot: false,
            force_user_namespace: false,
            add_capabilities: vec![],
            drop_capabilities: vec![],
            bind_mounts: vec![],
            overlay: OverlaySpec::default(),
            network: NetworkSelection::Host,
            memory_limit_bytes: None,
            cpu_shares: None,
            no_new_privileges: true,
            boot: false,
        }
    }

    #[test]
    fn writable_and_writable_tmpfs_conflict() {
        let mut options = base_options();
        options.writable = true;
        options.writable_tmpfs = true;
        assert_eq!(options.validate().unwrap_err().kind(), ErrorKind::OptionConflict);
    }

    #[test]
    fn compat_and_no_compat_conflict() {
        let mut options = base_options();
        options.compat = true;
        options.no_compat = true;
        assert_eq!(options.validate().unwrap_err().kind(), ErrorKind::OptionConflict);
    }

    #[test]
    fn instance_start_requires_nonempty_name() {
        let mut options = base_options();
        options.action = Action::InstanceStart { name: String::new() };
        assert_eq!(options.validate().unwrap_err().kind(), ErrorKind::OptionConflict);
    }

    #[test]
    fn valid_options_pass() {
        assert!(base_options().validate().is_ok());
    }

    #[test]
    fn root_uses_setuid_path_even_when_policy_denies_it() {
        let global = GlobalConfig::default();
        let identity = resolve_identity(&base_options(), &global, 0, 0).unwrap();
        assert!(matches!(identity, IdentityPolicy::Setuid { uid: 0, gid: 0 }));
    }

    #[test]
    fn unprivileged_without_setuid_policy_falls_back_to_user_namespace() {
        let global = GlobalConfig::default();
        let identity = resolve_identity(&base_options(), &global, 1000, 1000).unwrap();
        assert!(matches!(identity, IdentityPolicy::UserNamespace { uid: 1000, gid: 1000, .. }));
    }

    #[test]
    fn setuid_allowed_by_policy_is_used_when_not_forced() {
        let global = crate::config::GlobalConfigBuilder::default()
            .allow_setuid(true)
            .build()
            .unwrap();
        let identity = resolve_identity(&base_options(), &global, 1000, 1000).unwrap();
        assert!(matches!(identity, IdentityPolicy::Setuid { uid: 1000, gid: 1000 }));
    }

    #[test]
    fn forced_user_namespace_overrides_setuid_policy() {
        let global = crate::config::GlobalConfigBuilder::default()
            .allow_setuid(true)
            .build()
            .unwrap();
        let mut options = base_options();
        options.force_user_namespace = true;
        let identity = resolve_identity(&options, &global, 1000, 1000).unwrap();
        assert!(matches!(identity, IdentityPolicy::UserNamespace { .. }));
    }

    #[test]
    fn fakeroot_without_policy_is_denied() {
        let global = GlobalConfig::default();
        let mut options = base_options();
        options.fakeroot = true;
        let err = resolve_identity(&options, &global, 1000, 1000).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PolicyDenied);
    }

    #[test]
    fn fakeroot_maps_to_root_inside_user_namespace() {
        let global = crate::config::GlobalConfigBuilder::default()
            .allow_fakeroot(true)
            .fakeroot_subuid_range("100000:65536".to_string())
            .fakeroot_subgid_range("100000:65536".to_string())
            .build()
            .unwrap();
        let mut options = base_options();
        options.fakeroot = true;
        let identity = resolve_identity(&options, &global, 1000, 1000).unwrap();
        assert!(matches!(identity, IdentityPolicy::UserNamespace { uid: 0, gid: 0, .. }));
    }

    #[test]
    fn subid_range_rejects_malformed_input() {
        assert!(parse_subid_range("not-a-range").is_err());
        assert!(parse_subid_range("100000").is_err());
        assert_eq!(parse_subid_range("100000:65536").unwrap(), (100000, 65536));
    }

    #[test]
    fn host_and_none_network_never_need_policy() {
        let global = GlobalConfig::default();
        let mut options = base_options();
        options.network = NetworkSelection::Host;
        assert!(matches!(
            resolve_network(&options, &global, true).unwrap(),
            (NetworkRequest::Host, None)
        ));
        options.network = NetworkSelection::None;
        assert!(matches!(
            resolve_network(&options, &global, true).unwrap(),
            (NetworkRequest::Isolated, None)
        ));
    }

    #[test]
    fn named_network_is_denied_for_unprivileged_launch_when_not_permitted() {
        let global = GlobalConfig::default();
        let mut options = base_options();
        options.network = NetworkSelection::Named("cluster".to_string());
        let err = resolve_network(&options, &global, true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PolicyDenied);
    }

    #[test]
    fn named_network_is_allowed_for_unprivileged_launch_when_permitted() {
        let global = crate::config::GlobalConfigBuilder::default()
            .permitted_networks(vec!["cluster".to_string()])
            .build()
            .unwrap();
        let mut options = base_options();
        options.network = NetworkSelection::Named("cluster".to_string());
        let (request, name) = resolve_network(&options, &global, true).unwrap();
        assert_eq!(request, NetworkRequest::Isolated);
        assert_eq!(name.as_deref(), Some("cluster"));
    }

    #[test]
    fn named_network_skips_policy_check_outside_a_user_namespace() {
        let global = GlobalConfig::default();
        let mut options = base_options();
        options.network = NetworkSelection::Named("cluster".to_string());
        assert!(resolve_network(&options, &global, false).is_ok());
    }
}
