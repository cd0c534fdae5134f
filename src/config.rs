//! Global configuration: the CLI-facing [`Config`] built by `clap`, and the
//! `key = value` global policy file read from disk at startup.

use anyhow::{Context as _, Result};
use clap::{AppSettings, Parser};
use derive_builder::Builder;
use getset::{CopyGetters, Getters};
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

#[derive(Builder, Parser, CopyGetters, Getters, Deserialize, Serialize)]
#[builder(default, pattern = "owned", setter(into))]
#[serde(rename_all = "kebab-case")]
#[clap(
    after_help("More info at: https://github.com/sifrun/sifrun"),
    global_setting(AppSettings::ColoredHelp)
)]
/// sifrun - a container launcher for scientific and high-performance computing workloads
pub struct Config {
    #[get_copy = "pub"]
    #[clap(
        default_value("info"),
        env("SIFRUN_LOG_LEVEL"),
        long("log-level"),
        possible_values(&["trace", "debug", "info", "warn", "error", "off"]),
        short('l'),
        value_name("LEVEL")
    )]
    /// The logging level of the application
    log_level: LevelFilter,

    #[get = "pub"]
    #[clap(
        default_value("/etc/sifrun/sifrun.conf"),
        env("SIFRUN_CONFIG_PATH"),
        long("config-path")
    )]
    /// The path to the global `key = value` configuration file
    config_path: PathBuf,

    #[get = "pub"]
    #[clap(
        default_value("/var/lib/sifrun/cache"),
        env("SIFRUN_CACHE_DIR"),
        long("cache-dir")
    )]
    /// The root of the content-addressed image cache
    cache_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self::parse()
    }
}

/// Policy knobs read from the global configuration file. Every field has a
/// conservative default so a missing file behaves like an empty one: no
/// setuid path, no unprivileged networks, fakeroot disabled.
#[derive(Debug, Clone, Builder, CopyGetters, Getters, PartialEq)]
#[builder(default, pattern = "owned", setter(into))]
pub struct GlobalConfig {
    #[get_copy = "pub"]
    /// Whether the setuid launch path may be used at all.
    allow_setuid: bool,

    #[get_copy = "pub"]
    /// Whether `fakeroot` may be requested by unprivileged users.
    allow_fakeroot: bool,

    #[get = "pub"]
    /// Network types unprivileged users may request (e.g. `bridge`, `none`).
    permitted_networks: Vec<String>,

    #[get = "pub"]
    /// Subuid range available for fakeroot id-mapping, as `start:count`.
    fakeroot_subuid_range: Option<String>,

    #[get = "pub"]
    /// Subgid range available for fakeroot id-mapping, as `start:count`.
    fakeroot_subgid_range: Option<String>,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            allow_setuid: false,
            allow_fakeroot: false,
            permitted_networks: Vec::new(),
            fakeroot_subuid_range: None,
            fakeroot_subgid_range: None,
        }
    }
}

impl GlobalConfig {
    /// Load a [`GlobalConfig`] from a `key = value` file. A missing file is
    /// not an error: it is treated the same as an empty one.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(e).context(format!("reading global config {}", path.display()))
            }
        };
        Self::parse_str(&contents)
    }

    /// Parse directives out of configuration text. Unknown directives are
    /// logged at `warn` and ignored rather than rejected.
    fn parse_str(contents: &str) -> Result<Self> {
        let directives = parse_directives(contents);
        let mut cfg = Self::default();

        for (key, value) in directives {
            match key.as_str() {
                "allow-setuid" => cfg.allow_setuid = parse_bool(&value)?,
                "allow-fakeroot" => cfg.allow_fakeroot = parse_bool(&value)?,
                "permitted-networks" => {
                    cfg.permitted_networks =
                        value.split(',').map(|s| s.trim().to_string()).collect()
                }
                "fakeroot-subuid-range" => cfg.fakeroot_subuid_range = Some(value),
                "fakeroot-subgid-range" => cfg.fakeroot_subgid_range = Some(value),
                other => log::warn!("ignoring unknown global config directive: {}", other),
            }
        }

        Ok(cfg)
    }
}

/// Split configuration text into `(key, value)` pairs, skipping blank lines
/// and `#` comments.
fn parse_directives(contents: &str) -> Vec<(String, String)> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let (key, value) = line.split_once('=')?;
            Some((key.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

fn parse_bool(value: &str) -> Result<bool> {
    match value {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        other => anyhow::bail!("invalid boolean value: {}", other),
    }
}

/// `config global --set/--unset/--reset` operates on a minimal key/value map
/// rather than round-tripping comments and formatting of the on-disk file.
pub type ConfigMap = HashMap<String, String>;

#[cfg(test)]
pub mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn default_config() {
        let c = Config::default();
        assert_eq!(c.log_level(), LevelFilter::Info);
    }

    #[test]
    fn build_config() -> Result<()> {
        let c = ConfigBuilder::default()
            .log_level(LevelFilter::Warn)
            .config_path("/some/path")
            .build()?;

        assert_eq!(c.log_level(), LevelFilter::Warn);
        assert_eq!(&c.config_path().display().to_string(), "/some/path");

        Ok(())
    }

    #[test]
    fn global_config_defaults_on_missing_file() -> Result<()> {
        let cfg = GlobalConfig::load(Path::new("/nonexistent/sifrun.conf"))?;
        assert_eq!(cfg, GlobalConfig::default());
        Ok(())
    }

    #[test]
    fn global_config_parses_directives() -> Result<()> {
        let text = "\
            # comment\n\
            allow-setuid = true\n\
            allow-fakeroot = yes\n\
            permitted-networks = bridge, none\n\
            fakeroot-subuid-range = 100000:65536\n\
            unknown-directive = whatever\n\
        ";
        let cfg = GlobalConfig::parse_str(text)?;
        assert!(cfg.allow_setuid());
        assert!(cfg.allow_fakeroot());
        assert_eq!(
            cfg.permitted_networks(),
            &["bridge".to_string(), "none".to_string()]
        );
        assert_eq!(
            cfg.fakeroot_subuid_range(),
            &Some("100000:65536".to_string())
        );
        Ok(())
    }

    #[test]
    fn global_config_rejects_bad_bool() {
        let text = "allow-setuid = maybe\n";
        assert!(GlobalConfig::parse_str(text).is_err());
    }
}
