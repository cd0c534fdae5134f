//! Shared harness for the CLI integration tests: spawns the built `sifrun`
//! binary against an isolated set of config/cache/instance directories under
//! a fresh `TempDir`, so each test gets its own cache/instance store instead
//! of touching a shared one.

use std::{
    path::PathBuf,
    process::{Command, Output},
};
use tempfile::TempDir;

pub struct Harness {
    pub dir: TempDir,
}

impl Harness {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            dir: TempDir::new()?,
        })
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.dir.path().join("cache")
    }

    pub fn instances_dir(&self) -> PathBuf {
        self.dir.path().join("instances")
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.path().join("sifrun.conf")
    }

    /// Run `sifrun` with the given subcommand args, pre-seeded with this
    /// harness's isolated `--config-path`/`--cache-dir`/`--instances-dir`.
    pub fn run(&self, args: &[&str]) -> anyhow::Result<Output> {
        let output = Command::new(env!("CARGO_BIN_EXE_sifrun"))
            .arg("--config-path")
            .arg(self.config_path())
            .arg("--cache-dir")
            .arg(self.cache_dir())
            .arg("--instances-dir")
            .arg(self.instances_dir())
            .args(args)
            .output()?;
        Ok(output)
    }
}

pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}
