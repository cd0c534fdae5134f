//! An explicit context record used in place of global mutable state: bundles
//! [`Config`]/[`GlobalConfig`] and the cache, threaded by reference into the
//! transport, mount, spec-builder, launcher, and instance-registry layers
//! rather than reached for as a singleton.

use crate::{
    cache::Cache,
    config::{Config, GlobalConfig},
    error::SifError,
};
use std::path::PathBuf;

/// Everything a launch needs besides the per-invocation [`crate::launcher::LauncherOptions`].
/// Built once in `main` and passed by reference from there on, per the
/// "avoid global registries; pass the table into the launcher" design note.
pub struct Context {
    pub config: Config,
    pub global: GlobalConfig,
    pub cache: Cache,
    /// Path to the low-level OCI runtime binary (`runc`, `crun`, ...).
    pub runtime_binary: PathBuf,
    /// Directory instance records and supervisor run-state live under.
    pub instances_dir: PathBuf,
    /// Directory of CNI network configuration files (`*.conf`/`*.conflist`).
    pub cni_config_dir: PathBuf,
    /// Directory of CNI plugin binaries.
    pub cni_plugin_dir: PathBuf,
}

impl Context {
    /// Build a `Context` from a parsed [`Config`], loading [`GlobalConfig`]
    /// from the configured policy file and opening the image cache.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        runtime_binary: PathBuf,
        instances_dir: PathBuf,
        cni_config_dir: PathBuf,
        cni_plugin_dir: PathBuf,
    ) -> Result<Self, SifError> {
        let global = GlobalConfig::load(config.config_path())
            .map_err(|e| SifError::new(crate::error::ErrorKind::PolicyDenied, e))?;
        let cache = Cache::open(config.cache_dir())?;
        Ok(Self {
            config,
            global,
            cache,
            runtime_binary,
            instances_dir,
            cni_config_dir,
            cni_plugin_dir,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_opens_cache_and_loads_global_config() -> anyhow::Result<()> {
        let dir = tempfile::TempDir::new()?;
        let config = crate::config::ConfigBuilder::default()
            .cache_dir(dir.path().join("cache"))
            .config_path(dir.path().join("nonexistent.conf"))
            .build()?;

        let ctx = Context::new(
            config,
            PathBuf::from("runc"),
            dir.path().join("instances"),
            dir.path().join("cni/conf"),
            dir.path().join("cni/bin"),
        )?;
        assert!(!ctx.global.allow_setuid());
        assert!(dir.path().join("cache").is_dir());
        Ok(())
    }
}
