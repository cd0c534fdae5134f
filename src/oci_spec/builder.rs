//! OCI runtime spec builder (C6): turns a resolved launch configuration plus
//! a composed rootfs path into the `config.json` the low-level runtime
//! consumes, applying the namespace/mount/capability/resource policy
//! described for HPC launches (host networking by default, a conservative
//! capability set, optional user-namespace UID/GID mapping).

use crate::{
    capability::Capabilities,
    error::{ErrorKind, SifError},
    oci_spec::runtime::{
        LinuxBuilder, LinuxCapabilitiesBuilder, LinuxIDMapping, LinuxIDMappingBuilder,
        LinuxNamespace, LinuxNamespaceBuilder, LinuxNamespaceType, LinuxResources,
        LinuxResourcesBuilder, MountBuilder, ProcessBuilder, RootBuilder, Spec, SpecBuilder,
        UserBuilder,
    },
};
use anyhow::anyhow;
use std::path::{Path, PathBuf};

/// Paths masked from the container regardless of the image, matching the
/// conventional runc/crun default set.
const DEFAULT_MASKED_PATHS: &[&str] = &[
    "/proc/acpi",
    "/proc/asound",
    "/proc/kcore",
    "/proc/keys",
    "/proc/latency_stats",
    "/proc/timer_list",
    "/proc/timer_stats",
    "/proc/sched_debug",
    "/sys/firmware",
    "/proc/scsi",
];

const DEFAULT_READONLY_PATHS: &[&str] = &["/proc/bus", "/proc/fs", "/proc/irq", "/proc/sys", "/proc/sysrq-trigger"];

/// One additional bind mount requested on top of the standard proc/sys/dev
/// mounts every launch gets.
#[derive(Clone, Debug)]
pub struct BindMount {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub readonly: bool,
}

/// How the container's PID 1 is isolated from the host.
#[derive(Clone, Debug)]
pub enum IdentityPolicy {
    /// setuid launch path: no user namespace, the process runs as the
    /// resolved target uid/gid directly.
    Setuid { uid: u32, gid: u32 },
    /// unprivileged launch path: a user namespace maps the invoking user to
    /// `uid`/`gid` inside the container.
    UserNamespace {
        uid: u32,
        gid: u32,
        uid_mappings: Vec<LinuxIDMapping>,
        gid_mappings: Vec<LinuxIDMapping>,
    },
}

/// What the container's network namespace should look like. The HPC default
/// is `Host`: most scientific workloads talk to a cluster interconnect or
/// shared filesystem the container must see unchanged.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NetworkRequest {
    /// No network namespace: the container shares the host's.
    Host,
    /// A fresh, empty network namespace with no CNI plugin invoked
    /// (loopback only). Corresponds to `--net none`.
    Isolated,
    /// Join a namespace some other process already created and pinned to a
    /// file path, e.g. one a CNI `ADD` has already wired up.
    Join(String),
}

/// Everything the builder needs besides the composed rootfs path.
#[derive(Clone, Debug)]
pub struct LaunchOptions {
    pub args: Vec<String>,
    /// Explicit `--env`/`-e` `KEY=VALUE` overrides; these win over both the
    /// forwarded host variables and `SINGULARITYENV_*` translations in
    /// [`assemble_process_env`].
    pub env: Vec<String>,
    pub cwd: String,
    pub hostname: Option<String>,
    pub identity: IdentityPolicy,
    pub capabilities: Capabilities,
    pub no_new_privileges: bool,
    pub readonly_rootfs: bool,
    pub bind_mounts: Vec<BindMount>,
    pub network: NetworkRequest,
    pub memory_limit_bytes: Option<i64>,
    pub cpu_shares: Option<u64>,
}

/// Builds an OCI [`Spec`] for one launch.
pub struct OciSpecBuilder;

impl OciSpecBuilder {
    pub fn build(options: &LaunchOptions, root_path: &Path) -> Result<Spec, SifError> {
        let (uid, gid) = match &options.identity {
            IdentityPolicy::Setuid { uid, gid } => (*uid, *gid),
            IdentityPolicy::UserNamespace { uid, gid, .. } => (*uid, *gid),
        };

        let user = UserBuilder::default()
            .uid(uid)
            .gid(gid)
            .build()
            .map_err(builder_err)?;

        let process = ProcessBuilder::default()
            .terminal(false)
            .user(user)
            .args(options.args.clone())
            .env(assemble_process_env(std::env::vars(), &options.env))
            .cwd(options.cwd.clone())
            .capabilities(Self::capabilities(&options.capabilities))
            .no_new_privileges(options.no_new_privileges)
            .build()
            .map_err(builder_err)?;

        let root = RootBuilder::default()
            .path(root_path.to_path_buf())
            .readonly(options.readonly_rootfs)
            .build()
            .map_err(builder_err)?;

        let mut mounts = vec![
            standard_mount("/proc", "proc", "proc", &["nosuid", "noexec", "nodev"]),
            standard_mount("/dev", "tmpfs", "tmpfs", &["nosuid", "strictatime", "mode=755", "size=65536k"]),
            standard_mount("/dev/pts", "devpts", "devpts", &["nosuid", "noexec", "newinstance", "ptmxmode=0666", "mode=0620"]),
            standard_mount("/dev/shm", "tmpfs", "shm", &["nosuid", "noexec", "nodev", "mode=1777", "size=65536k"]),
            standard_mount("/sys", "sysfs", "sysfs", &["nosuid", "noexec", "nodev", "ro"]),
        ];
        for bind in &options.bind_mounts {
            let mut opts = vec!["bind".to_string()];
            if bind.readonly {
                opts.push("ro".to_string());
            }
            mounts.push(
                MountBuilder::default()
                    .destination(bind.destination.clone())
                    .typ("bind".to_string())
                    .source(bind.source.clone())
                    .options(opts)
                    .build()
                    .map_err(builder_err)?,
            );
        }

        let mut namespaces = vec![
            ns(LinuxNamespaceType::Pid),
            ns(LinuxNamespaceType::Ipc),
            ns(LinuxNamespaceType::Uts),
            ns(LinuxNamespaceType::Mount),
        ];

        let (uid_mappings, gid_mappings) = match &options.identity {
            IdentityPolicy::Setuid { .. } => (None, None),
            IdentityPolicy::UserNamespace {
                uid_mappings,
                gid_mappings,
                ..
            } => {
                namespaces.push(ns(LinuxNamespaceType::User));
                (Some(uid_mappings.clone()), Some(gid_mappings.clone()))
            }
        };

        match &options.network {
            NetworkRequest::Host => {}
            NetworkRequest::Isolated => namespaces.push(ns(LinuxNamespaceType::Network)),
            NetworkRequest::Join(path) => namespaces.push(
                LinuxNamespaceBuilder::default()
                    .typ(LinuxNamespaceType::Network)
                    .path(PathBuf::from(path))
                    .build()
                    .map_err(builder_err)?,
            ),
        }

        let resources = Self::resources(options);

        let mut linux_builder = LinuxBuilder::default()
            .namespaces(namespaces)
            .masked_paths(DEFAULT_MASKED_PATHS.iter().map(|s| s.to_string()).collect::<Vec<_>>())
            .readonly_paths(DEFAULT_READONLY_PATHS.iter().map(|s| s.to_string()).collect::<Vec<_>>());
        if let Some(m) = uid_mappings {
            linux_builder = linux_builder.uid_mappings(m);
        }
        if let Some(m) = gid_mappings {
            linux_builder = linux_builder.gid_mappings(m);
        }
        if let Some(resources) = resources {
            linux_builder = linux_builder.resources(resources);
        }
        let linux = linux_builder.build().map_err(builder_err)?;

        let mut spec_builder = SpecBuilder::default()
            .version("1.0.2")
            .process(process)
            .root(root)
            .mounts(mounts)
            .linux(linux);
        if let Some(hostname) = options.hostname.clone() {
            spec_builder = spec_builder.hostname(hostname);
        }
        spec_builder.build().map_err(builder_err)
    }

    fn capabilities(caps: &Capabilities) -> crate::oci_spec::runtime::LinuxCapabilities {
        let list: Vec<String> = caps.into();
        LinuxCapabilitiesBuilder::default()
            .bounding(list.clone())
            .effective(list.clone())
            .inheritable(list.clone())
            .permitted(list)
            .build()
            .expect("capabilities builder has no required fields")
    }

    fn resources(options: &LaunchOptions) -> Option<LinuxResources> {
        if options.memory_limit_bytes.is_none() && options.cpu_shares.is_none() {
            return None;
        }
        let mut builder = LinuxResourcesBuilder::default();
        if let Some(limit) = options.memory_limit_bytes {
            builder = builder.memory(
                crate::oci_spec::runtime::LinuxMemoryBuilder::default()
                    .limit(limit)
                    .build()
                    .expect("memory builder has no required fields"),
            );
        }
        if let Some(shares) = options.cpu_shares {
            builder = builder.cpu(
                crate::oci_spec::runtime::LinuxCPUBuilder::default()
                    .shares(shares)
                    .build()
                    .expect("cpu builder has no required fields"),
            );
        }
        Some(builder.build().expect("resources builder has no required fields"))
    }
}

fn ns(typ: LinuxNamespaceType) -> LinuxNamespace {
    LinuxNamespaceBuilder::default()
        .typ(typ)
        .build()
        .expect("namespace builder only requires `typ`")
}

fn standard_mount(destination: &str, typ: &str, source: &str, options: &[&str]) -> crate::oci_spec::runtime::Mount {
    MountBuilder::default()
        .destination(PathBuf::from(destination))
        .typ(typ.to_string())
        .source(PathBuf::from(source))
        .options(options.iter().map(|s| s.to_string()).collect::<Vec<_>>())
        .build()
        .expect("standard mount builder has no required fields")
}

fn builder_err<E: std::fmt::Display>(e: E) -> SifError {
    SifError::new(ErrorKind::OptionConflict, anyhow!("build OCI spec: {}", e))
}

/// Host variables forwarded into the container unchanged, per spec §6.
const FORWARDED_HOST_VARS: &[&str] = &["PATH", "HOME", "USER", "SHELL", "TERM"];

/// Prefix that translates a host variable `SINGULARITYENV_X` into the
/// container variable `X`, per spec §6.
const SINGULARITYENV_PREFIX: &str = "SINGULARITYENV_";

/// Assemble the container process environment: start from `host_env`,
/// keeping only [`FORWARDED_HOST_VARS`]; overlay any `SINGULARITYENV_X=Y`
/// host variable as container variable `X=Y`; overlay `overrides`
/// (`--env`/`-e` `KEY=VALUE` pairs), which win over both. Later entries for
/// the same key replace earlier ones rather than duplicating.
fn assemble_process_env<I>(host_env: I, overrides: &[String]) -> Vec<String>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut env: Vec<(String, String)> = Vec::new();

    let set = |env: &mut Vec<(String, String)>, key: String, value: String| {
        if let Some(existing) = env.iter_mut().find(|(k, _)| *k == key) {
            existing.1 = value;
        } else {
            env.push((key, value));
        }
    };

    let mut singularityenv = Vec::new();
    for (key, value) in host_env {
        if FORWARDED_HOST_VARS.contains(&key.as_str()) {
            set(&mut env, key, value);
        } else if let Some(name) = key.strip_prefix(SINGULARITYENV_PREFIX) {
            if !name.is_empty() {
                singularityenv.push((name.to_string(), value));
            }
        }
    }
    for (key, value) in singularityenv {
        set(&mut env, key, value);
    }

    for over in overrides {
        if let Some((key, value)) = over.split_once('=') {
            set(&mut env, key.to_string(), value.to_string());
        } else {
            set(&mut env, over.clone(), String::new());
        }
    }

    env.into_iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn base_options() -> LaunchOptions {
        LaunchOptions {
            args: vec!["/bin/sh".to_string()],
            env: vec!["PATH=/usr/bin".to_string()],
            cwd: "/".to_string(),
            hostname: Some("sifrun".to_string()),
            identity: IdentityPolicy::Setuid { uid: 1000, gid: 1000 },
            capabilities: Capabilities::default(),
            no_new_privileges: true,
            readonly_rootfs: true,
            bind_mounts: vec![],
            network: NetworkRequest::Host,
            memory_limit_bytes: None,
            cpu_shares: None,
        }
    }

    #[test]
    fn setuid_launch_has_no_user_namespace() {
        let spec = OciSpecBuilder::build(&base_options(), &PathBuf::from("/mnt/root")).unwrap();
        let namespaces = spec.linux().as_ref().unwrap().namespaces().as_ref().unwrap();
        assert!(!namespaces
            .iter()
            .any(|n| n.typ() == LinuxNamespaceType::User));
        assert_eq!(spec.root().as_ref().unwrap().path(), &PathBuf::from("/mnt/root"));
    }

    #[test]
    fn user_namespace_launch_carries_id_mappings() {
        let mut options = base_options();
        options.identity = IdentityPolicy::UserNamespace {
            uid: 0,
            gid: 0,
            uid_mappings: vec![LinuxIDMappingBuilder::default()
                .container_id(0u32)
                .host_id(1000u32)
                .size(1u32)
                .build()
                .unwrap()],
            gid_mappings: vec![LinuxIDMappingBuilder::default()
                .container_id(0u32)
                .host_id(1000u32)
                .size(1u32)
                .build()
                .unwrap()],
        };

        let spec = OciSpecBuilder::build(&options, &PathBuf::from("/mnt/root")).unwrap();
        let linux = spec.linux().as_ref().unwrap();
        let namespaces = linux.namespaces().as_ref().unwrap();
        assert!(namespaces.iter().any(|n| n.typ() == LinuxNamespaceType::User));
        assert_eq!(linux.uid_mappings().as_ref().unwrap().len(), 1);
    }

    #[test]
    fn host_network_by_default_no_network_namespace() {
        let spec = OciSpecBuilder::build(&base_options(), &PathBuf::from("/mnt/root")).unwrap();
        let namespaces = spec.linux().as_ref().unwrap().namespaces().as_ref().unwrap();
        assert!(!namespaces
            .iter()
            .any(|n| n.typ() == LinuxNamespaceType::Network));
    }

    #[test]
    fn isolated_network_gets_a_fresh_namespace_with_no_join_path() {
        let mut options = base_options();
        options.network = NetworkRequest::Isolated;
        let spec = OciSpecBuilder::build(&options, &PathBuf::from("/mnt/root")).unwrap();
        let namespaces = spec.linux().as_ref().unwrap().namespaces().as_ref().unwrap();
        let net_ns = namespaces
            .iter()
            .find(|n| n.typ() == LinuxNamespaceType::Network)
            .unwrap();
        assert!(net_ns.path().is_none());
    }

    #[test]
    fn join_network_sets_the_given_path() {
        let mut options = base_options();
        options.network = NetworkRequest::Join("/var/run/netns/foo".to_string());
        let spec = OciSpecBuilder::build(&options, &PathBuf::from("/mnt/root")).unwrap();
        let namespaces = spec.linux().as_ref().unwrap().namespaces().as_ref().unwrap();
        let net_ns = namespaces
            .iter()
            .find(|n| n.typ() == LinuxNamespaceType::Network)
            .unwrap();
        assert_eq!(net_ns.path(), &Some(PathBuf::from("/var/run/netns/foo")));
    }

    #[test]
    fn assemble_process_env_forwards_only_the_named_host_vars() {
        let host = vec![
            ("PATH".to_string(), "/usr/bin".to_string()),
            ("HOME".to_string(), "/home/alice".to_string()),
            ("SECRET_TOKEN".to_string(), "shh".to_string()),
        ];
        let env = assemble_process_env(host, &[]);
        assert!(env.contains(&"PATH=/usr/bin".to_string()));
        assert!(env.contains(&"HOME=/home/alice".to_string()));
        assert!(!env.iter().any(|e| e.starts_with("SECRET_TOKEN")));
    }

    #[test]
    fn assemble_process_env_translates_singularityenv_prefix() {
        let host = vec![("SINGULARITYENV_FOO".to_string(), "bar".to_string())];
        let env = assemble_process_env(host, &[]);
        assert!(env.contains(&"FOO=bar".to_string()));
        assert!(!env.iter().any(|e| e.starts_with("SINGULARITYENV_")));
    }

    #[test]
    fn assemble_process_env_overrides_win_over_host_and_singularityenv() {
        let host = vec![
            ("PATH".to_string(), "/usr/bin".to_string()),
            ("SINGULARITYENV_PATH".to_string(), "/from/prefix".to_string()),
        ];
        let env = assemble_process_env(host, &["PATH=/from/override".to_string()]);
        assert_eq!(env, vec!["PATH=/from/override".to_string()]);
    }

    #[test]
    fn resource_limits_populate_cgroup_config() {
        let mut options = base_options();
        options.memory_limit_bytes = Some(512 * 1024 * 1024);
        options.cpu_shares = Some(512);

        let spec = OciSpecBuilder::build(&options, &PathBuf::from("/mnt/root")).unwrap();
        let resources = spec.linux().as_ref().unwrap().resources().as_ref().unwrap();
        assert_eq!(resources.memory().as_ref().unwrap().limit(), &Some(512 * 1024 * 1024));
        assert_eq!(resources.cpu().as_ref().unwrap().shares(), &Some(512));
    }
}
