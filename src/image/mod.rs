//! Image inspector (C4): open an image artifact, enumerate its partitions,
//! and detect its format. The inspector never decrypts; for an encrypted
//! rootfs it only reports that a key will be needed at mount time.

pub mod oci;

use crate::error::{ErrorKind, SifError};
use anyhow::anyhow;
use std::{
    convert::TryInto,
    fs,
    io::Read,
    path::{Path, PathBuf},
};

/// The role a partition plays within an artifact.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PartitionRole {
    RootFs,
    Data,
    Overlay,
}

/// The filesystem a partition's bytes are formatted with.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FsType {
    SquashFs,
    Ext3,
    EncryptedSquashFs,
}

/// One partition inside a single-file artifact: a byte range plus its role
/// and filesystem. Offset and size are relative to the start of the file.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Partition {
    pub role: PartitionRole,
    pub offset: u64,
    pub size: u64,
    pub fs_type: FsType,
}

/// The detected shape of an image artifact.
#[derive(Clone, Debug, PartialEq)]
pub enum ArtifactType {
    /// A single file embedding a descriptor/object table plus one or more
    /// partitions (squashfs/ext3/encrypted-squashfs rootfs, optional data
    /// partitions).
    SingleFile,
    /// A single file serializing an OCI image layout.
    OciInFile,
    /// A plain directory tree whose root looks like a container rootfs.
    Sandbox,
}

/// The typed result of opening an artifact: its shape plus, for
/// [`ArtifactType::SingleFile`], the partitions it contains.
#[derive(Clone, Debug, PartialEq)]
pub struct Descriptor {
    pub path: PathBuf,
    pub artifact_type: ArtifactType,
    pub partitions: Vec<Partition>,
}

impl Descriptor {
    /// The required rootfs partition. Every [`ArtifactType::SingleFile`]
    /// descriptor has exactly one; panics are avoided by returning `None`
    /// for malformed descriptors, which callers should treat as corrupt.
    pub fn rootfs(&self) -> Option<&Partition> {
        self.partitions
            .iter()
            .find(|p| p.role == PartitionRole::RootFs)
    }

    pub fn is_encrypted(&self) -> bool {
        self.rootfs()
            .map(|p| p.fs_type == FsType::EncryptedSquashFs)
            .unwrap_or(false)
    }
}

const MAGIC: &[u8; 8] = b"SIFSPEC1";
const HEADER_LEN: usize = 32;
const RECORD_LEN: usize = 24;

/// Inspect a local path (already resolved through C1/C2) and return its
/// [`Descriptor`]. Directories are always [`ArtifactType::Sandbox`]; files
/// are sniffed via the descriptor/object table header.
pub fn inspect(path: &Path) -> Result<Descriptor, SifError> {
    if path.is_dir() {
        return Ok(Descriptor {
            path: path.to_path_buf(),
            artifact_type: ArtifactType::Sandbox,
            partitions: Vec::new(),
        });
    }

    let mut file = fs::File::open(path).map_err(|e| io_err(e, path))?;
    let mut header = [0u8; HEADER_LEN];
    file.read_exact(&mut header).map_err(|_| {
        SifError::new(
            ErrorKind::UnsupportedFormat,
            anyhow!("{}: unknown-format (too short for a header)", path.display()),
        )
    })?;

    if &header[0..8] != MAGIC {
        return Err(SifError::new(
            ErrorKind::UnsupportedFormat,
            anyhow!("{}: unknown-format", path.display()),
        ));
    }

    let version = u32::from_le_bytes(header[8..12].try_into().unwrap());
    if version != 1 {
        return Err(SifError::new(
            ErrorKind::UnsupportedFormat,
            anyhow!("{}: unsupported-version {}", path.display(), version),
        ));
    }

    let partition_count = u32::from_le_bytes(header[12..16].try_into().unwrap());
    let oci_layout_offset = u64::from_le_bytes(header[16..24].try_into().unwrap());

    if oci_layout_offset != 0 {
        return Ok(Descriptor {
            path: path.to_path_buf(),
            artifact_type: ArtifactType::OciInFile,
            partitions: Vec::new(),
        });
    }

    let mut table = vec![0u8; partition_count as usize * RECORD_LEN];
    file.read_exact(&mut table).map_err(|_| {
        SifError::new(
            ErrorKind::CorruptImage,
            anyhow!("{}: corrupt-header (truncated partition table)", path.display()),
        )
    })?;

    let mut partitions = Vec::with_capacity(partition_count as usize);
    for record in table.chunks_exact(RECORD_LEN) {
        let role = match record[0] {
            0 => PartitionRole::RootFs,
            1 => PartitionRole::Data,
            2 => PartitionRole::Overlay,
            other => {
                return Err(SifError::new(
                    ErrorKind::CorruptImage,
                    anyhow!("{}: corrupt-header (unknown partition role {})", path.display(), other),
                ))
            }
        };
        let fs_type = match record[1] {
            0 => FsType::SquashFs,
            1 => FsType::Ext3,
            2 => FsType::EncryptedSquashFs,
            other => {
                return Err(SifError::new(
                    ErrorKind::CorruptImage,
                    anyhow!("{}: corrupt-header (unknown fs type {})", path.display(), other),
                ))
            }
        };
        let offset = u64::from_le_bytes(record[8..16].try_into().unwrap());
        let size = u64::from_le_bytes(record[16..24].try_into().unwrap());
        partitions.push(Partition {
            role,
            offset,
            size,
            fs_type,
        });
    }

    if partitions
        .iter()
        .filter(|p| p.role == PartitionRole::RootFs)
        .count()
        != 1
    {
        return Err(SifError::new(
            ErrorKind::CorruptImage,
            anyhow!("{}: corrupt-header (expected exactly one rootfs partition)", path.display()),
        ));
    }

    Ok(Descriptor {
        path: path.to_path_buf(),
        artifact_type: ArtifactType::SingleFile,
        partitions,
    })
}

fn io_err(e: std::io::Error, path: &Path) -> SifError {
    SifError::new(
        ErrorKind::UnsupportedFormat,
        anyhow!("{}: {}", path.display(), e),
    )
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    /// Build a minimal well-formed single-file artifact with one rootfs
    /// partition, for use by this module's and other modules' tests.
    pub fn write_single_file_artifact(path: &Path, fs_type: FsType) -> std::io::Result<()> {
        let mut file = fs::File::create(path)?;
        file.write_all(MAGIC)?;
        file.write_all(&1u32.to_le_bytes())?;
        file.write_all(&1u32.to_le_bytes())?;
        file.write_all(&0u64.to_le_bytes())?;

        let mut record = [0u8; RECORD_LEN];
        record[0] = PartitionRole::RootFs as u8;
        record[1] = fs_type as u8;
        record[8..16].copy_from_slice(&(HEADER_LEN as u64).to_le_bytes());
        record[16..24].copy_from_slice(&4096u64.to_le_bytes());
        file.write_all(&record)?;
        Ok(())
    }

    #[test]
    fn directory_is_sandbox() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let d = inspect(dir.path())?;
        assert_eq!(d.artifact_type, ArtifactType::Sandbox);
        Ok(())
    }

    #[test]
    fn single_file_with_squashfs_rootfs() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("image.sif");
        write_single_file_artifact(&path, FsType::SquashFs)?;

        let d = inspect(&path)?;
        assert_eq!(d.artifact_type, ArtifactType::SingleFile);
        assert_eq!(d.rootfs().unwrap().fs_type, FsType::SquashFs);
        assert!(!d.is_encrypted());
        Ok(())
    }

    #[test]
    fn encrypted_rootfs_is_reported_without_decrypting() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("image.sif");
        write_single_file_artifact(&path, FsType::EncryptedSquashFs)?;

        let d = inspect(&path)?;
        assert!(d.is_encrypted());
        Ok(())
    }

    #[test]
    fn unknown_magic_is_unsupported_format() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("not-an-image");
        fs::write(&path, b"not a sif file, but long enough to read")?;

        let err = inspect(&path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
        Ok(())
    }

    #[test]
    fn oci_layout_offset_marks_oci_in_file() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("image.ocisif");
        let mut file = fs::File::create(&path)?;
        file.write_all(MAGIC)?;
        file.write_all(&1u32.to_le_bytes())?;
        file.write_all(&0u32.to_le_bytes())?;
        file.write_all(&(HEADER_LEN as u64).to_le_bytes())?;

        let d = inspect(&path)?;
        assert_eq!(d.artifact_type, ArtifactType::OciInFile);
        Ok(())
    }
}
