//! Rootfs mount pipeline (C5): mounts an inspected artifact's rootfs
//! partition (kernel or FUSE) and stacks an [`OverlaySpec`] over it,
//! recording every successful mount on an [`UndoStack`] so failures and
//! normal teardown unwind in reverse, tolerant of partial success.

use crate::{
    capability::Capabilities,
    error::{ErrorKind, SifError},
    image::{Descriptor, FsType},
};
use anyhow::{anyhow, Context as _};
use async_trait::async_trait;
use dyn_clone::{clone_trait_object, DynClone};
use nix::mount::{mount, umount2, MntFlags, MsFlags};
use std::{
    fmt::Debug,
    path::{Path, PathBuf},
    process::Stdio,
};
use tokio::process::Command;
use which::which;

/// Access mode of one source in an [`OverlaySpec`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OverlayMode {
    Ro,
    Rw,
}

/// One source layer in an overlay stack.
#[derive(Clone, Debug)]
pub struct OverlaySource {
    pub path: PathBuf,
    pub mode: OverlayMode,
}

/// An ordered list of overlay sources. At most one `rw` source is allowed,
/// and it must be last in the stack.
#[derive(Clone, Debug, Default)]
pub struct OverlaySpec {
    pub sources: Vec<OverlaySource>,
}

impl OverlaySpec {
    pub fn validate(&self) -> Result<(), SifError> {
        let rw_count = self
            .sources
            .iter()
            .filter(|s| s.mode == OverlayMode::Rw)
            .count();
        if rw_count > 1 {
            return Err(SifError::new(
                ErrorKind::OptionConflict,
                anyhow!("at most one writable overlay source is allowed"),
            ));
        }
        if rw_count == 1 && self.sources.last().map(|s| s.mode) != Some(OverlayMode::Rw) {
            return Err(SifError::new(
                ErrorKind::OptionConflict,
                anyhow!("the writable overlay source must be last in the stack"),
            ));
        }
        Ok(())
    }

    fn ro_sources(&self) -> impl Iterator<Item = &OverlaySource> {
        self.sources.iter().filter(|s| s.mode == OverlayMode::Ro)
    }

    fn rw_source(&self) -> Option<&OverlaySource> {
        self.sources.iter().find(|s| s.mode == OverlayMode::Rw)
    }
}

/// Whether a writable layer should be backed by a tmpfs instead of a real
/// overlay source, and whether the composed root should stay read-only.
#[derive(Clone, Debug)]
pub enum WritablePolicy {
    ReadOnly,
    WritableTmpfs,
    Writable,
}

/// Options controlling how the pipeline composes the final root.
#[derive(Clone, Debug)]
pub struct MountOptions {
    pub writable: WritablePolicy,
    /// Prefer FUSE mounts even when kernel mounts are available (forced in
    /// the unprivileged/user-namespace launch path).
    pub prefer_fuse: bool,
}

impl MountOptions {
    pub fn validate(&self) -> Result<(), SifError> {
        Ok(())
    }
}

/// How a single mount in the [`UndoStack`] was established, so teardown
/// knows whether a companion FUSE process needs to be reaped.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MountKind {
    Kernel,
    Fuse,
}

/// One successful mount, in the order it was established.
#[derive(Clone, Debug)]
pub struct MountAction {
    pub target: PathBuf,
    pub kind: MountKind,
}

/// An ordered record of successful mounts. Errors and normal exit unwind it
/// in reverse; unwinding tolerates a target already having gone away.
#[derive(Default)]
pub struct UndoStack(Vec<MountAction>);

impl UndoStack {
    fn push(&mut self, action: MountAction) {
        self.0.push(action);
    }

    /// Unwind every recorded mount in reverse order. Individual failures are
    /// logged and do not stop the rest of the unwind.
    pub fn unwind(&mut self) {
        while let Some(action) = self.0.pop() {
            if let Err(e) = umount2(&action.target, MntFlags::MNT_DETACH) {
                log::warn!("unmount {} failed: {}", action.target.display(), e);
            }
        }
    }
}

impl Drop for UndoStack {
    fn drop(&mut self) {
        if !self.0.is_empty() {
            self.unwind();
        }
    }
}

/// The composed root filesystem path the OCI runtime will consume as
/// `root.path`, plus the undo stack that tears it down on drop.
pub struct MountedRoot {
    pub path: PathBuf,
    pub undo: UndoStack,
}

/// Abstraction over the mount operations the pipeline performs, so its
/// ordering and fallback logic can be exercised in tests without real
/// namespaces or mounts — the same pattern `OCIRuntime` uses for `runc`.
#[async_trait]
pub trait MountOps: Debug + DynClone + Send + Sync {
    async fn bind_mount(&self, source: &Path, target: &Path) -> anyhow::Result<()> {
        mount(
            Some(source),
            target,
            None::<&str>,
            MsFlags::MS_BIND,
            None::<&str>,
        )
        .context("bind mount")
    }

    async fn mount_loop(&self, image: &Path, target: &Path, fstype: &str) -> anyhow::Result<()> {
        mount(
            Some(image),
            target,
            Some(fstype),
            MsFlags::MS_RDONLY,
            None::<&str>,
        )
        .context("loop mount")
    }

    async fn mount_overlay(
        &self,
        lower: &[PathBuf],
        upper: Option<&Path>,
        work: Option<&Path>,
        target: &Path,
    ) -> anyhow::Result<()> {
        let lower_arg = lower
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(":");
        let mut data = format!("lowerdir={}", lower_arg);
        if let (Some(upper), Some(work)) = (upper, work) {
            data.push_str(&format!(",upperdir={},workdir={}", upper.display(), work.display()));
        }
        mount(
            Some("overlay"),
            target,
            Some("overlay"),
            MsFlags::empty(),
            Some(data.as_str()),
        )
        .context("overlay mount")
    }

    /// Probe whether a FUSE helper binary (`squashfuse`, `fuse2fs`,
    /// `fuse-overlayfs`) is installed.
    fn probe(&self, binary: &str) -> bool {
        which(binary).is_ok()
    }

    async fn spawn_fuse(&self, binary: &str, args: &[String]) -> anyhow::Result<()> {
        let status = Command::new(binary)
            .args(args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .with_context(|| format!("spawn {}", binary))?;
        if !status.success() {
            anyhow::bail!("{} exited with {}", binary, status);
        }
        Ok(())
    }
}

clone_trait_object!(MountOps);

#[derive(Clone, Debug, Default)]
struct DefaultMountOps;
impl MountOps for DefaultMountOps {}

/// Drives the mount pipeline: composes a rootfs and overlay stack into one
/// path the OCI spec builder can hand to the low-level runtime.
pub struct MountPipeline {
    ops: Box<dyn MountOps>,
}

impl Default for MountPipeline {
    fn default() -> Self {
        Self {
            ops: Box::new(DefaultMountOps),
        }
    }
}

impl MountPipeline {
    pub fn with_ops(ops: Box<dyn MountOps>) -> Self {
        Self { ops }
    }

    /// Mount `descriptor`'s rootfs partition then stack `overlay` over it,
    /// in the deterministic order the invariant requires: rootfs first, then
    /// each overlay source in order, then the optional tmpfs upper, then the
    /// composed overlay itself.
    pub async fn mount(
        &self,
        descriptor: &Descriptor,
        overlay: &OverlaySpec,
        options: &MountOptions,
        root_dir: &Path,
        _caps: &Capabilities,
    ) -> Result<MountedRoot, SifError> {
        overlay.validate()?;
        options.validate()?;

        let mut undo = UndoStack::default();

        let rootfs_target = root_dir.join("rootfs");
        std::fs::create_dir_all(&rootfs_target)
            .map_err(|e| io_err(e, &rootfs_target))?;

        let kind = self
            .mount_rootfs(descriptor, &rootfs_target, options, &mut undo)
            .await?;
        undo.push(MountAction {
            target: rootfs_target.clone(),
            kind,
        });

        if overlay.sources.is_empty() {
            return Ok(MountedRoot {
                path: rootfs_target,
                undo,
            });
        }

        for source in overlay.ro_sources() {
            // Read-only overlay sources that are themselves images would be
            // mounted here too; directories are already consumable as-is.
            if !source.path.is_dir() {
                return Err(SifError::new(
                    ErrorKind::OverlayCompose,
                    anyhow!(
                        "overlay source {} is not a mounted directory",
                        source.path.display()
                    ),
                ));
            }
        }

        let compose_target = root_dir.join("merged");
        std::fs::create_dir_all(&compose_target).map_err(|e| io_err(e, &compose_target))?;

        let mut lower: Vec<PathBuf> = overlay.ro_sources().map(|s| s.path.clone()).collect();
        lower.insert(0, rootfs_target.clone());

        let (upper, work) = match options.writable {
            WritablePolicy::WritableTmpfs => {
                let upper = root_dir.join("upper");
                let work = root_dir.join("work");
                std::fs::create_dir_all(&upper).map_err(|e| io_err(e, &upper))?;
                std::fs::create_dir_all(&work).map_err(|e| io_err(e, &work))?;
                self.ops
                    .bind_mount(&upper, &upper)
                    .await
                    .map_err(|e| SifError::new(ErrorKind::OverlayCompose, e))?;
                undo.push(MountAction {
                    target: upper.clone(),
                    kind: MountKind::Kernel,
                });
                (Some(upper), Some(work))
            }
            WritablePolicy::Writable => match overlay.rw_source() {
                Some(rw) => {
                    let work = root_dir.join("work");
                    std::fs::create_dir_all(&work).map_err(|e| io_err(e, &work))?;
                    (Some(rw.path.clone()), Some(work))
                }
                None => {
                    return Err(SifError::new(
                        ErrorKind::OptionConflict,
                        anyhow!("writable requested but no writable overlay source configured"),
                    ))
                }
            },
            WritablePolicy::ReadOnly => (None, None),
        };

        self.ops
            .mount_overlay(&lower, upper.as_deref(), work.as_deref(), &compose_target)
            .await
            .map_err(|e| SifError::new(ErrorKind::OverlayCompose, e))?;
        undo.push(MountAction {
            target: compose_target.clone(),
            kind: MountKind::Kernel,
        });

        Ok(MountedRoot {
            path: compose_target,
            undo,
        })
    }

    async fn mount_rootfs(
        &self,
        descriptor: &Descriptor,
        target: &Path,
        options: &MountOptions,
        undo: &mut UndoStack,
    ) -> Result<MountKind, SifError> {
        use crate::image::ArtifactType;

        match descriptor.artifact_type {
            ArtifactType::Sandbox => {
                self.ops
                    .bind_mount(&descriptor.path, target)
                    .await
                    .map_err(|e| SifError::new(ErrorKind::KernelMount, e))?;
                Ok(MountKind::Kernel)
            }
            ArtifactType::OciInFile => Err(SifError::new(
                ErrorKind::UnsupportedFormat,
                anyhow!("oci-in-file artifacts must be inspected into a manifest before mounting"),
            )),
            ArtifactType::SingleFile => {
                let partition = descriptor.rootfs().ok_or_else(|| {
                    SifError::new(ErrorKind::CorruptImage, anyhow!("artifact has no rootfs partition"))
                })?;

                if partition.fs_type == FsType::EncryptedSquashFs {
                    return Err(SifError::new(
                        ErrorKind::KernelMount,
                        anyhow!("encrypted rootfs requires a key; decryption is not performed by the mount pipeline"),
                    ));
                }

                if !options.prefer_fuse {
                    let fstype = match partition.fs_type {
                        FsType::SquashFs => "squashfs",
                        FsType::Ext3 => "ext3",
                        FsType::EncryptedSquashFs => unreachable!(),
                    };
                    if self
                        .ops
                        .mount_loop(&descriptor.path, target, fstype)
                        .await
                        .is_ok()
                    {
                        return Ok(MountKind::Kernel);
                    }
                }

                self.mount_fuse(partition.fs_type, &descriptor.path, target, undo)
                    .await
            }
        }
    }

    async fn mount_fuse(
        &self,
        fs_type: FsType,
        image: &Path,
        target: &Path,
        _undo: &mut UndoStack,
    ) -> Result<MountKind, SifError> {
        let binary = match fs_type {
            FsType::SquashFs => "squashfuse",
            FsType::Ext3 => "fuse2fs",
            FsType::EncryptedSquashFs => unreachable!(),
        };

        if !self.ops.probe(binary) {
            return Err(SifError::new(
                ErrorKind::FuseMount,
                anyhow!("{} is not installed; FUSE mount unavailable", binary),
            ));
        }

        self.ops
            .spawn_fuse(
                binary,
                &[image.display().to_string(), target.display().to_string()],
            )
            .await
            .map_err(|e| SifError::new(ErrorKind::FuseMount, e))?;

        Ok(MountKind::Fuse)
    }
}

fn io_err(e: std::io::Error, path: &Path) -> SifError {
    SifError::new(ErrorKind::KernelMount, anyhow!("{}: {}", path.display(), e))
}

/// Create a sparse ext3 overlay image of `size_mb` megabytes at `path` and
/// format it, for `overlay create`.
pub async fn create_overlay_image(path: &Path, size_mb: u64) -> Result<(), SifError> {
    let file = std::fs::File::create(path).map_err(|e| io_err(e, path))?;
    file.set_len(size_mb * 1024 * 1024)
        .map_err(|e| io_err(e, path))?;
    drop(file);

    let status = Command::new("mkfs.ext3")
        .arg("-F")
        .arg("-q")
        .arg(path)
        .status()
        .await
        .map_err(|e| SifError::new(ErrorKind::OverlayCompose, anyhow!("spawn mkfs.ext3: {}", e)))?;
    if !status.success() {
        return Err(SifError::new(
            ErrorKind::OverlayCompose,
            anyhow!("mkfs.ext3 {} exited with {}", path.display(), status),
        ));
    }
    Ok(())
}

/// Flush a writable overlay image's contents to durable storage, for
/// `overlay sync`.
pub fn sync_overlay_image(path: &Path) -> Result<(), SifError> {
    std::fs::File::open(path)
        .and_then(|f| f.sync_all())
        .map_err(|e| io_err(e, path))
}

/// Mark an overlay image read-only so it can no longer be used as a writable
/// upper layer, for `overlay seal`.
pub fn seal_overlay_image(path: &Path) -> Result<(), SifError> {
    let metadata = std::fs::metadata(path).map_err(|e| io_err(e, path))?;
    let mut permissions = metadata.permissions();
    permissions.set_readonly(true);
    std::fs::set_permissions(path, permissions).map_err(|e| io_err(e, path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{ArtifactType, Descriptor, FsType, Partition, PartitionRole};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    #[derive(Clone, Debug, Default)]
    struct RecordingOps {
        calls: Arc<Mutex<Vec<String>>>,
        fail_loop_mount: bool,
        fuse_available: bool,
    }

    #[async_trait]
    impl MountOps for RecordingOps {
        async fn bind_mount(&self, source: &Path, target: &Path) -> anyhow::Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("bind {} -> {}", source.display(), target.display()));
            Ok(())
        }

        async fn mount_loop(&self, _image: &Path, target: &Path, fstype: &str) -> anyhow::Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("loop {} {}", fstype, target.display()));
            if self.fail_loop_mount {
                anyhow::bail!("no loop devices available");
            }
            Ok(())
        }

        async fn mount_overlay(
            &self,
            lower: &[PathBuf],
            _upper: Option<&Path>,
            _work: Option<&Path>,
            target: &Path,
        ) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push(format!(
                "overlay [{}] -> {}",
                lower.len(),
                target.display()
            ));
            Ok(())
        }

        fn probe(&self, _binary: &str) -> bool {
            self.fuse_available
        }

        async fn spawn_fuse(&self, binary: &str, _args: &[String]) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push(format!("fuse {}", binary));
            Ok(())
        }
    }

    fn squashfs_descriptor(path: &Path) -> Descriptor {
        Descriptor {
            path: path.to_path_buf(),
            artifact_type: ArtifactType::SingleFile,
            partitions: vec![Partition {
                role: PartitionRole::RootFs,
                offset: 32,
                size: 4096,
                fs_type: FsType::SquashFs,
            }],
        }
    }

    #[tokio::test]
    async fn mount_order_is_rootfs_then_overlay() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let ops = RecordingOps::default();
        let pipeline = MountPipeline::with_ops(Box::new(ops.clone()));

        let descriptor = squashfs_descriptor(&dir.path().join("image.sif"));
        std::fs::write(dir.path().join("image.sif"), b"irrelevant")?;

        let overlay_dir = dir.path().join("overlay-ro");
        std::fs::create_dir_all(&overlay_dir)?;
        let overlay = OverlaySpec {
            sources: vec![OverlaySource {
                path: overlay_dir,
                mode: OverlayMode::Ro,
            }],
        };

        let options = MountOptions {
            writable: WritablePolicy::ReadOnly,
            prefer_fuse: false,
        };

        let root = pipeline
            .mount(
                &descriptor,
                &overlay,
                &options,
                dir.path(),
                &Capabilities::all(),
            )
            .await?;

        let calls = ops.calls.lock().unwrap().clone();
        assert!(calls[0].starts_with("loop squashfs"));
        assert!(calls[1].starts_with("overlay"));
        assert!(root.path.ends_with("merged"));
        Ok(())
    }

    #[tokio::test]
    async fn falls_back_to_fuse_when_loop_mount_fails() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let ops = RecordingOps {
            fail_loop_mount: true,
            fuse_available: true,
            ..Default::default()
        };
        let pipeline = MountPipeline::with_ops(Box::new(ops.clone()));

        let descriptor = squashfs_descriptor(&dir.path().join("image.sif"));
        std::fs::write(dir.path().join("image.sif"), b"irrelevant")?;

        let root = pipeline
            .mount(
                &descriptor,
                &OverlaySpec::default(),
                &MountOptions {
                    writable: WritablePolicy::ReadOnly,
                    prefer_fuse: false,
                },
                dir.path(),
                &Capabilities::all(),
            )
            .await?;

        let calls = ops.calls.lock().unwrap().clone();
        assert!(calls.iter().any(|c| c.starts_with("fuse squashfuse")));
        assert!(root.path.ends_with("rootfs"));
        Ok(())
    }

    #[tokio::test]
    async fn fuse_mount_fails_fast_without_binary() {
        let dir = TempDir::new().unwrap();
        let ops = RecordingOps {
            fail_loop_mount: true,
            fuse_available: false,
            ..Default::default()
        };
        let pipeline = MountPipeline::with_ops(Box::new(ops));

        let descriptor = squashfs_descriptor(&dir.path().join("image.sif"));
        std::fs::write(dir.path().join("image.sif"), b"irrelevant").unwrap();

        let err = pipeline
            .mount(
                &descriptor,
                &OverlaySpec::default(),
                &MountOptions {
                    writable: WritablePolicy::ReadOnly,
                    prefer_fuse: false,
                },
                dir.path(),
                &Capabilities::all(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FuseMount);
    }

    #[test]
    fn overlay_rejects_two_writable_sources() {
        let spec = OverlaySpec {
            sources: vec![
                OverlaySource {
                    path: PathBuf::from("/a"),
                    mode: OverlayMode::Rw,
                },
                OverlaySource {
                    path: PathBuf::from("/b"),
                    mode: OverlayMode::Rw,
                },
            ],
        };
        assert_eq!(spec.validate().unwrap_err().kind(), ErrorKind::OptionConflict);
    }

    #[test]
    fn seal_overlay_image_sets_readonly() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("overlay.img");
        std::fs::write(&path, b"data").unwrap();

        seal_overlay_image(&path).unwrap();

        assert!(std::fs::metadata(&path).unwrap().permissions().readonly());
    }

    #[test]
    fn sync_overlay_image_succeeds_on_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("overlay.img");
        std::fs::write(&path, b"data").unwrap();

        assert!(sync_overlay_image(&path).is_ok());
    }

    #[test]
    fn overlay_requires_writable_source_last() {
        let spec = OverlaySpec {
            sources: vec![
                OverlaySource {
                    path: PathBuf::from("/a"),
                    mode: OverlayMode::Rw,
                },
                OverlaySource {
                    path: PathBuf::from("/b"),
                    mode: OverlayMode::Ro,
                },
            ],
        };
        assert_eq!(spec.validate().unwrap_err().kind(), ErrorKind::OptionConflict);
    }
}
