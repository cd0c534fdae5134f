//! Direct CNI plugin invocation: resolve a named network's config and
//! invoke its plugin's `ADD`/`DEL` against a single container namespace.
//! There is no daemon or background config watcher here — a launch resolves
//! its named network synchronously when it wires up an instance's namespace.

use crate::network::cni::config::{ConfigFile, ConfigListFile};
use anyhow::{bail, Context, Result};
use std::{ffi::OsStr, fs, path::{Path, PathBuf}};

mod config;
mod exec;
pub mod plugin;

/// Find the named CNI network under `config_dir` and resolve its first
/// plugin's binary under `plugin_dir`, for a direct `ADD`/`DEL` invocation.
/// Used by the launcher to wire a detached instance's network namespace
/// between the low-level runtime's `create` and `start` (see `supervisor.rs`).
pub fn load_network_config(config_dir: &Path, plugin_dir: &Path, name: &str) -> Result<(PathBuf, Vec<u8>)> {
    let dir = fs::read_dir(config_dir)
        .with_context(|| format!("read CNI config dir {}", config_dir.display()))?;

    for entry in dir {
        let path = entry.with_context(|| format!("read entry in {}", config_dir.display()))?.path();
        let ext = path.extension().and_then(OsStr::to_str);
        let config_file = match ext {
            Some("conflist") => ConfigListFile::from(&path).with_context(|| format!("load {}", path.display()))?,
            Some("conf") | Some("json") => ConfigFile::from(&path)
                .with_context(|| format!("load {}", path.display()))?
                .into(),
            _ => continue,
        };
        if config_file.name().as_deref() != Some(name) {
            continue;
        }

        let typ = config_file
            .plugins()
            .get(0)
            .with_context(|| format!("no plugin in CNI config {}", path.display()))?
            .typ()
            .clone();
        let binary = which::which_in(&typ, Some(plugin_dir.display().to_string()), std::env::current_dir()?)
            .with_context(|| format!("find CNI plugin binary {} under {}", typ, plugin_dir.display()))?;
        let raw = fs::read(&path).with_context(|| format!("read {}", path.display()))?;
        return Ok((binary, raw));
    }

    bail!("no CNI network named {} found under {}", name, config_dir.display())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn errors_when_config_dir_has_no_matching_network() -> Result<()> {
        let dir = TempDir::new()?;
        let plugin_dir = TempDir::new()?;
        let err = load_network_config(dir.path(), plugin_dir.path(), "cluster").unwrap_err();
        assert!(err.to_string().contains("no CNI network named cluster"));
        Ok(())
    }

    #[test]
    fn finds_a_conflist_network_by_name() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new()?;
        let plugin_dir = TempDir::new()?;
        let bridge = plugin_dir.path().join("bridge");
        File::create(&bridge)?;
        fs::set_permissions(&bridge, fs::Permissions::from_mode(0o755))?;

        let mut f = File::create(dir.path().join("10-cluster.conflist"))?;
        write!(
            f,
            r#"{{"name": "cluster", "cniVersion": "0.4.0", "plugins": [{{"type": "bridge"}}]}}"#
        )?;

        let (binary, raw) = load_network_config(dir.path(), plugin_dir.path(), "cluster")?;
        assert_eq!(binary, plugin_dir.path().join("bridge"));
        assert!(!raw.is_empty());
        Ok(())
    }
}
