//! OCI registry transport: pulls a manifest and its blobs over the
//! Docker/OCI Distribution HTTP API, assembles an OCI image layout, then
//! best-effort converts it to a single-file squashfs artifact — falling
//! back to a plain extracted sandbox directory when the squashfs toolchain
//! is unavailable.

use crate::{
    cache::Cache,
    error::{ErrorKind, SifError},
    image::oci::{ContentDescriptor, ImageIndex, ImageManifest},
    reference::Reference,
    transport::{
        fingerprint_for, get_with_retry,
        http_client::{HttpClient, ReqwestHttpClient},
        FetchContext, Fetcher, RetryPolicy,
    },
};
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use flate2::read::GzDecoder;
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    process::Stdio,
};
use tokio::process::Command;

pub struct OciRegistryFetcher {
    client: Box<dyn HttpClient>,
    retry: RetryPolicy,
}

impl Default for OciRegistryFetcher {
    fn default() -> Self {
        Self {
            client: Box::new(ReqwestHttpClient),
            retry: RetryPolicy::default(),
        }
    }
}

impl OciRegistryFetcher {
    /// Construct a fetcher with an injected client, for tests.
    pub fn with_client(client: Box<dyn HttpClient>) -> Self {
        Self {
            client,
            retry: RetryPolicy::default(),
        }
    }

    async fn get_manifest_bytes(
        &self,
        ctx: &FetchContext,
        registry: &str,
        repository: &str,
        tag_or_digest: &str,
    ) -> Result<Vec<u8>, SifError> {
        let reference = tag_or_digest.trim_start_matches('@');
        let url = format!("https://{}/v2/{}/manifests/{}", registry, repository, reference);
        let accept = vec![(
            "Accept".to_string(),
            "application/vnd.oci.image.manifest.v1+json, application/vnd.oci.image.index.v1+json, application/vnd.docker.distribution.manifest.v2+json, application/vnd.docker.distribution.manifest.list.v2+json".to_string(),
        )];

        let resp = get_with_retry(
            self.client.as_ref(),
            &self.retry,
            &url,
            &accept,
            ctx.auth.as_ref(),
        )
        .await?;
        Ok(resp.body)
    }

    /// Resolve `tag_or_digest` to a platform-specific [`ImageManifest`],
    /// following a single level of image index indirection (a multi-arch
    /// index referencing another index is not valid per the OCI image spec,
    /// so one extra fetch is always enough).
    async fn resolve_manifest(
        &self,
        ctx: &FetchContext,
        registry: &str,
        repository: &str,
        tag_or_digest: &str,
    ) -> Result<ImageManifest, SifError> {
        let body = self
            .get_manifest_bytes(ctx, registry, repository, tag_or_digest)
            .await?;

        if let Ok(manifest) = serde_json::from_slice::<ImageManifest>(&body) {
            return Ok(manifest);
        }

        let index: ImageIndex = serde_json::from_slice(&body).map_err(|e| {
            SifError::new(
                ErrorKind::CorruptImage,
                anyhow!(
                    "unmarshal manifest/index for {}/{}:{}: {}",
                    registry,
                    repository,
                    tag_or_digest,
                    e
                ),
            )
        })?;

        let chosen = index
            .manifests
            .iter()
            .find(|m| {
                m.platform
                    .as_ref()
                    .map(|p| p.architecture == "amd64" && p.os == "linux")
                    .unwrap_or(true)
            })
            .or_else(|| index.manifests.first())
            .ok_or_else(|| {
                SifError::new(
                    ErrorKind::CorruptImage,
                    anyhow!("image index for {}/{} has no manifests", registry, repository),
                )
            })?
            .clone();

        let manifest_body = self
            .get_manifest_bytes(ctx, registry, repository, &chosen.digest)
            .await?;

        serde_json::from_slice(&manifest_body).map_err(|e| {
            SifError::new(
                ErrorKind::CorruptImage,
                anyhow!("unmarshal manifest referenced by image index: {}", e),
            )
        })
    }

    async fn fetch_blob(
        &self,
        ctx: &FetchContext,
        registry: &str,
        repository: &str,
        descriptor: &ContentDescriptor,
    ) -> Result<Vec<u8>, SifError> {
        let url = format!(
            "https://{}/v2/{}/blobs/{}",
            registry, repository, descriptor.digest
        );
        let resp = get_with_retry(self.client.as_ref(), &self.retry, &url, &[], ctx.auth.as_ref())
            .await?;
        Ok(resp.body)
    }
}

#[async_trait]
impl Fetcher for OciRegistryFetcher {
    async fn pull(
        &self,
        ctx: &FetchContext,
        reference: &Reference,
        cache: &Cache,
    ) -> Result<PathBuf, SifError> {
        let (registry, repository, tag_or_digest) = match reference {
            Reference::Oci {
                registry,
                repository,
                tag_or_digest,
            } => (registry.clone(), repository.clone(), tag_or_digest.clone()),
            other => {
                return Err(SifError::new(
                    ErrorKind::UnsupportedTransport,
                    anyhow!("registry fetcher cannot handle {}", other),
                ))
            }
        };

        let fingerprint = fingerprint_for(reference);
        cache
            .materialize(&fingerprint, |tmp| async move {
                let manifest = self
                    .resolve_manifest(ctx, &registry, &repository, &tag_or_digest)
                    .await?;

                let rootfs_dir = tmp.with_extension("extracting");
                fs::create_dir_all(&rootfs_dir).map_err(|e| io_err(e, &rootfs_dir))?;

                for layer in &manifest.layers {
                    let blob = self.fetch_blob(ctx, &registry, &repository, layer).await?;
                    extract_layer(&blob, &rootfs_dir)?;
                }

                finalize_artifact(&rootfs_dir, &tmp).await
            })
            .await
    }
}

/// Extract a gzip-compressed tar layer into `dest`.
fn extract_layer(blob: &[u8], dest: &Path) -> Result<(), SifError> {
    let decoder = GzDecoder::new(blob);
    let mut archive = tar::Archive::new(decoder);
    archive.unpack(dest).map_err(|e| {
        SifError::new(
            ErrorKind::CorruptImage,
            anyhow!("unpack layer into {}: {}", dest.display(), e),
        )
    })
}

/// Best-effort conversion of an extracted rootfs directory into a
/// single-file squashfs artifact; falls back to leaving the sandbox
/// directory in place when `mksquashfs` is unavailable.
async fn finalize_artifact(rootfs_dir: &Path, final_path: &Path) -> Result<(), SifError> {
    match which::which("mksquashfs") {
        Ok(binary) => {
            let squashfs_path = final_path.with_extension("squashfs");
            let status = Command::new(&binary)
                .arg(rootfs_dir)
                .arg(&squashfs_path)
                .arg("-noappend")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await
                .map_err(|e| {
                    SifError::new(ErrorKind::Integrity, anyhow!("run mksquashfs: {}", e))
                })?;

            if !status.success() {
                // Squashing failed at runtime even though the tool exists;
                // fall back to the sandbox directory rather than failing
                // the whole pull.
                fs::rename(rootfs_dir, final_path).map_err(|e| io_err(e, final_path))?;
                return Ok(());
            }

            write_single_file_artifact(&squashfs_path, final_path)
                .context("assemble single-file artifact")
                .map_err(|e| SifError::new(ErrorKind::Integrity, e))?;

            let _ = fs::remove_file(&squashfs_path);
            let _ = fs::remove_dir_all(rootfs_dir);
            Ok(())
        }
        Err(_) => {
            // No squashfs toolchain: fall back to a sandbox directory, as
            // the launcher does when the low-level runtime cannot FUSE-mount
            // a single-file artifact either.
            fs::rename(rootfs_dir, final_path).map_err(|e| io_err(e, final_path))
        }
    }
}

const MAGIC: &[u8; 8] = b"SIFSPEC1";
const HEADER_LEN: u64 = 32;

/// Write this format's descriptor/object-table header followed by the
/// squashfs bytes, matching what [`crate::image::inspect`] parses.
fn write_single_file_artifact(squashfs_path: &Path, final_path: &Path) -> anyhow::Result<()> {
    let squashfs_bytes = fs::read(squashfs_path)?;
    let mut out = fs::File::create(final_path)?;

    out.write_all(MAGIC)?;
    out.write_all(&1u32.to_le_bytes())?;
    out.write_all(&1u32.to_le_bytes())?;
    out.write_all(&0u64.to_le_bytes())?;

    let mut record = [0u8; 24];
    record[0] = 0; // PartitionRole::RootFs
    record[1] = 0; // FsType::SquashFs
    record[8..16].copy_from_slice(&HEADER_LEN.to_le_bytes());
    record[16..24].copy_from_slice(&(squashfs_bytes.len() as u64).to_le_bytes());
    out.write_all(&record)?;
    out.write_all(&squashfs_bytes)?;
    Ok(())
}

fn io_err(e: std::io::Error, path: &Path) -> SifError {
    SifError::new(ErrorKind::Integrity, anyhow!("{}: {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::http_client::HttpResponse;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[derive(Clone, Debug)]
    struct FakeRegistry {
        manifest: Vec<u8>,
        blobs: HashMap<String, Vec<u8>>,
    }

    #[async_trait]
    impl HttpClient for FakeRegistry {
        async fn get(
            &self,
            url: &str,
            _headers: &[(String, String)],
        ) -> anyhow::Result<HttpResponse> {
            if url.contains("/manifests/") {
                return Ok(HttpResponse {
                    status: 200,
                    body: self.manifest.clone(),
                    headers: HashMap::new(),
                });
            }
            for (digest, bytes) in &self.blobs {
                if url.ends_with(digest) {
                    return Ok(HttpResponse {
                        status: 200,
                        body: bytes.clone(),
                        headers: HashMap::new(),
                    });
                }
            }
            Ok(HttpResponse {
                status: 404,
                body: Vec::new(),
                headers: HashMap::new(),
            })
        }
    }

    fn gzip_tar_with_one_file(name: &str, contents: &[u8]) -> Vec<u8> {
        use flate2::write::GzEncoder;
        use flate2::Compression;

        let mut tar_bytes = Vec::new();
        {
            let mut builder = tar::Builder::new(&mut tar_bytes);
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, contents).unwrap();
            builder.finish().unwrap();
        }

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&tar_bytes).unwrap();
        encoder.finish().unwrap()
    }

    #[tokio::test]
    async fn pull_extracts_layers_into_sandbox_without_squashfs_tool() -> anyhow::Result<()> {
        let layer_digest = "sha256:layer1";
        let layer = gzip_tar_with_one_file("hello.txt", b"hi");

        let manifest = ImageManifest {
            annotations: None,
            config: ContentDescriptor {
                annotations: None,
                digest: "sha256:configdigest".to_string(),
                media_type: "application/vnd.oci.image.config.v1+json".to_string(),
                size: 2,
                urls: None,
            },
            layers: vec![ContentDescriptor {
                annotations: None,
                digest: layer_digest.to_string(),
                media_type: "application/vnd.oci.image.layer.v1.tar+gzip".to_string(),
                size: layer.len() as i64,
                urls: None,
            }],
            schema_version: 2,
        };

        let mut blobs = HashMap::new();
        blobs.insert(layer_digest.to_string(), layer);

        let client = FakeRegistry {
            manifest: serde_json::to_vec(&manifest)?,
            blobs,
        };

        let dir = TempDir::new()?;
        let cache = Cache::open(dir.path().join("cache"))?;
        let fetcher = OciRegistryFetcher::with_client(Box::new(client));
        let reference = Reference::Oci {
            registry: "registry.example".to_string(),
            repository: "library/demo".to_string(),
            tag_or_digest: "latest".to_string(),
        };

        let path = fetcher
            .pull(&FetchContext::default(), &reference, &cache)
            .await?;

        // No `mksquashfs` in the test sandbox, so the fallback sandbox
        // directory is what gets committed to the cache.
        assert!(path.is_dir());
        assert_eq!(fs::read(path.join("hello.txt"))?, b"hi");
        Ok(())
    }
}
