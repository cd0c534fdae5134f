//! Plain HTTP(S) transport: pulls a URL verbatim. Unlike the registry/ORAS/
//! library transports, it never retries on any 4xx status — only on network
//! errors and 5xx.

use crate::{
    cache::Cache,
    error::{ErrorKind, SifError},
    reference::Reference,
    transport::{
        fingerprint_for,
        http_client::{HttpClient, ReqwestHttpClient},
        FetchContext, Fetcher, RetryPolicy,
    },
};
use anyhow::anyhow;
use async_trait::async_trait;
use std::{fs, path::PathBuf};

pub struct HttpFetcher {
    client: Box<dyn HttpClient>,
    retry: RetryPolicy,
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self {
            client: Box::new(ReqwestHttpClient),
            retry: RetryPolicy::default(),
        }
    }
}

impl HttpFetcher {
    pub fn with_client(client: Box<dyn HttpClient>) -> Self {
        Self {
            client,
            retry: RetryPolicy::default(),
        }
    }

    async fn get_no_4xx_retry(&self, url: &str) -> Result<Vec<u8>, SifError> {
        let mut attempt = 0;
        loop {
            match self.client.get(url, &[]).await {
                Ok(resp) if resp.status == 200 => return Ok(resp.body),
                Ok(resp) if (400..500).contains(&resp.status) => {
                    return Err(SifError::new(
                        ErrorKind::Network,
                        anyhow!("{} returned status {}", url, resp.status),
                    ))
                }
                Ok(resp) if attempt + 1 < self.retry.max_attempts => {
                    tokio::time::sleep(self.retry.backoff(attempt)).await;
                    attempt += 1;
                }
                Ok(resp) => {
                    return Err(SifError::new(
                        ErrorKind::Network,
                        anyhow!("{} returned status {} after {} attempts", url, resp.status, attempt + 1),
                    ))
                }
                Err(e) if attempt + 1 < self.retry.max_attempts => {
                    tokio::time::sleep(self.retry.backoff(attempt)).await;
                    attempt += 1;
                    let _ = e;
                }
                Err(e) => return Err(SifError::new(ErrorKind::Network, anyhow!("{}: {}", url, e))),
            }
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn pull(
        &self,
        _ctx: &FetchContext,
        reference: &Reference,
        cache: &Cache,
    ) -> Result<PathBuf, SifError> {
        let url = match reference {
            Reference::Http(url) => url.clone(),
            other => {
                return Err(SifError::new(
                    ErrorKind::UnsupportedTransport,
                    anyhow!("HTTP fetcher cannot handle {}", other),
                ))
            }
        };

        let fingerprint = fingerprint_for(reference);
        cache
            .materialize(&fingerprint, |tmp| async move {
                let body = self.get_no_4xx_retry(&url).await?;
                fs::write(&tmp, body)
                    .map_err(|e| SifError::new(ErrorKind::Integrity, anyhow!("{}: {}", tmp.display(), e)))
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::http_client::HttpResponse;
    use std::{
        collections::HashMap,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
    };
    use tempfile::TempDir;

    #[derive(Clone, Debug)]
    struct ScriptedClient {
        responses: Arc<Vec<u16>>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl HttpClient for ScriptedClient {
        async fn get(&self, _url: &str, _headers: &[(String, String)]) -> anyhow::Result<HttpResponse> {
            let i = self.calls.fetch_add(1, Ordering::SeqCst);
            let status = self.responses[i.min(self.responses.len() - 1)];
            Ok(HttpResponse {
                status,
                body: b"body".to_vec(),
                headers: HashMap::new(),
            })
        }
    }

    #[tokio::test]
    async fn does_not_retry_on_404() {
        let dir = TempDir::new().unwrap();
        let cache = Cache::open(dir.path().join("cache")).unwrap();
        let client = ScriptedClient {
            responses: Arc::new(vec![404]),
            calls: Arc::new(AtomicUsize::new(0)),
        };
        let fetcher = HttpFetcher::with_client(Box::new(client.clone()));
        let reference = Reference::Http("https://example.com/image.sif".to_string());

        let err = fetcher
            .pull(&FetchContext::default(), &reference, &cache)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Network);
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_on_503_then_succeeds() {
        let dir = TempDir::new().unwrap();
        let cache = Cache::open(dir.path().join("cache")).unwrap();
        let client = ScriptedClient {
            responses: Arc::new(vec![503, 200]),
            calls: Arc::new(AtomicUsize::new(0)),
        };
        let fetcher = HttpFetcher::with_client(Box::new(client.clone()));
        let reference = Reference::Http("https://example.com/image.sif".to_string());

        let path = fetcher
            .pull(&FetchContext::default(), &reference, &cache)
            .await
            .unwrap();
        assert_eq!(fs::read(path).unwrap(), b"body");
    }
}
