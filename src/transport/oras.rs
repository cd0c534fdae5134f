//! OCI-over-ORAS transport: pulls an artifact manifest and its (typically
//! single) blob the same way the registry transport resolves manifests, but
//! writes the blob directly as the final artifact rather than treating it as
//! a set of rootfs layers to extract — ORAS artifacts are already whatever
//! file the publisher uploaded, most commonly a single-file image.

use crate::{
    cache::Cache,
    error::{ErrorKind, SifError},
    image::oci::ImageManifest,
    reference::Reference,
    transport::{
        fingerprint_for, get_with_retry,
        http_client::{HttpClient, ReqwestHttpClient},
        FetchContext, Fetcher, RetryPolicy,
    },
};
use anyhow::anyhow;
use async_trait::async_trait;
use std::{fs, path::PathBuf};

pub struct OrasFetcher {
    client: Box<dyn HttpClient>,
    retry: RetryPolicy,
}

impl Default for OrasFetcher {
    fn default() -> Self {
        Self {
            client: Box::new(ReqwestHttpClient),
            retry: RetryPolicy::default(),
        }
    }
}

impl OrasFetcher {
    pub fn with_client(client: Box<dyn HttpClient>) -> Self {
        Self {
            client,
            retry: RetryPolicy::default(),
        }
    }
}

#[async_trait]
impl Fetcher for OrasFetcher {
    async fn pull(
        &self,
        ctx: &FetchContext,
        reference: &Reference,
        cache: &Cache,
    ) -> Result<PathBuf, SifError> {
        let (registry, repository, tag_or_digest) = match reference {
            Reference::Oras {
                registry,
                repository,
                tag_or_digest,
            } => (registry.clone(), repository.clone(), tag_or_digest.clone()),
            other => {
                return Err(SifError::new(
                    ErrorKind::UnsupportedTransport,
                    anyhow!("ORAS fetcher cannot handle {}", other),
                ))
            }
        };

        let fingerprint = fingerprint_for(reference);
        cache
            .materialize(&fingerprint, |tmp| async move {
                let manifest_url = format!(
                    "https://{}/v2/{}/manifests/{}",
                    registry,
                    repository,
                    tag_or_digest.trim_start_matches('@')
                );
                let accept = vec![(
                    "Accept".to_string(),
                    "application/vnd.oci.image.manifest.v1+json".to_string(),
                )];
                let resp = get_with_retry(
                    self.client.as_ref(),
                    &self.retry,
                    &manifest_url,
                    &accept,
                    ctx.auth.as_ref(),
                )
                .await?;

                let manifest: ImageManifest = serde_json::from_slice(&resp.body).map_err(|e| {
                    SifError::new(
                        ErrorKind::CorruptImage,
                        anyhow!("unmarshal ORAS manifest: {}", e),
                    )
                })?;

                let blob = manifest.layers.first().ok_or_else(|| {
                    SifError::new(
                        ErrorKind::CorruptImage,
                        anyhow!("ORAS manifest has no artifact blob"),
                    )
                })?;

                let blob_url = format!("https://{}/v2/{}/blobs/{}", registry, repository, blob.digest);
                let resp = get_with_retry(
                    self.client.as_ref(),
                    &self.retry,
                    &blob_url,
                    &[],
                    ctx.auth.as_ref(),
                )
                .await?;

                fs::write(&tmp, resp.body).map_err(|e| {
                    SifError::new(ErrorKind::Integrity, anyhow!("{}: {}", tmp.display(), e))
                })
            })
            .await
    }
}
