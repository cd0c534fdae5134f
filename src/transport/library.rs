//! Library-protocol transport (Sylabs-style container library): resolves a
//! `host/path:tag` reference to a direct image download and pulls it as one
//! blob. Follows the same retry policy as the registry and ORAS transports.

use crate::{
    cache::Cache,
    error::{ErrorKind, SifError},
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

const DEFAULT_LIBRARY_HOST: &str = "library.sylabs.io";

pub struct LibraryFetcher {
    client: Box<dyn HttpClient>,
    retry: RetryPolicy,
}

impl Default for LibraryFetcher {
    fn default() -> Self {
        Self {
            client: Box::new(ReqwestHttpClient),
            retry: RetryPolicy::default(),
        }
    }
}

impl LibraryFetcher {
    pub fn with_client(client: Box<dyn HttpClient>) -> Self {
        Self {
            client,
            retry: RetryPolicy::default(),
        }
    }
}

#[async_trait]
impl Fetcher for LibraryFetcher {
    async fn pull(
        &self,
        ctx: &FetchContext,
        reference: &Reference,
        cache: &Cache,
    ) -> Result<PathBuf, SifError> {
        let (host, path, tag) = match reference {
            Reference::Library { host, path, tag } => {
                (host.clone().unwrap_or_else(|| DEFAULT_LIBRARY_HOST.to_string()), path.clone(), tag.clone())
            }
            other => {
                return Err(SifError::new(
                    ErrorKind::UnsupportedTransport,
                    anyhow!("library fetcher cannot handle {}", other),
                ))
            }
        };

        let fingerprint = fingerprint_for(reference);
        cache
            .materialize(&fingerprint, |tmp| async move {
                let url = format!("https://{}/v1/imagefile/{}:{}", host, path, tag);
                let resp = get_with_retry(
                    self.client.as_ref(),
                    &self.retry,
                    &url,
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::http_client::HttpResponse;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[derive(Clone, Debug)]
    struct FakeLibrary {
        body: Vec<u8>,
    }

    #[async_trait]
    impl HttpClient for FakeLibrary {
        async fn get(&self, _url: &str, _headers: &[(String, String)]) -> anyhow::Result<HttpResponse> {
            Ok(HttpResponse {
                status: 200,
                body: self.body.clone(),
                headers: HashMap::new(),
            })
        }
    }

    #[tokio::test]
    async fn pull_writes_blob_verbatim() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let cache = Cache::open(dir.path().join("cache"))?;
        let fetcher = LibraryFetcher::with_client(Box::new(FakeLibrary {
            body: b"sif-bytes".to_vec(),
        }));
        let reference = Reference::Library {
            host: None,
            path: "collection/image".to_string(),
            tag: "latest".to_string(),
        };

        let path = fetcher.pull(&FetchContext::default(), &reference, &cache).await?;
        assert_eq!(fs::read(path)?, b"sif-bytes");
        Ok(())
    }
}
