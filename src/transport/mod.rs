//! Transport fetchers (C3): pull an image from an OCI registry, ORAS,
//! library protocol, or plain HTTP(S) into the cache.

pub mod http;
pub mod http_client;
pub mod library;
pub mod local;
pub mod oras;
pub mod registry;

use crate::{
    cache::{Cache, Fingerprint},
    error::{ErrorKind, SifError},
    reference::Reference,
    transport::http_client::{HttpClient, HttpResponse},
};
use anyhow::anyhow;
use async_trait::async_trait;
use base64::encode as base64_encode;
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::{path::PathBuf, time::Duration};

/// Credentials handed to a transport that requires authentication.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RegistryAuth {
    pub username: String,
    pub password: String,
}

impl RegistryAuth {
    /// Resolve registry credentials the way `docker login`-adjacent tools do:
    /// `REGISTRY_AUTH_FILE` (a JSON `{"username": ..., "password": ...}` blob)
    /// takes precedence, falling back to the `DOCKER_USERNAME` /
    /// `DOCKER_PASSWORD` pair. Returns `None` when neither is set, so
    /// callers fall back to unauthenticated pulls.
    pub fn from_env() -> Option<Self> {
        if let Ok(path) = std::env::var("REGISTRY_AUTH_FILE") {
            if let Ok(contents) = std::fs::read_to_string(&path) {
                if let Ok(auth) = serde_json::from_str::<Self>(&contents) {
                    return Some(auth);
                }
            }
        }

        let username = std::env::var("DOCKER_USERNAME").ok();
        let password = std::env::var("DOCKER_PASSWORD").ok();
        match (username, password) {
            (Some(username), Some(password)) => Some(Self { username, password }),
            _ => None,
        }
    }
}

/// Per-pull context threaded through every transport.
#[derive(Clone, Debug, Default)]
pub struct FetchContext {
    pub auth: Option<RegistryAuth>,
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Pull `reference` into `cache`, returning the local path of the
    /// materialized artifact.
    async fn pull(
        &self,
        ctx: &FetchContext,
        reference: &Reference,
        cache: &Cache,
    ) -> Result<PathBuf, SifError>;
}

/// Retry policy shared by the registry, ORAS, and library transports:
/// network and 5xx errors retry with bounded exponential backoff; 4xx
/// errors other than 401/429 are fatal; HTTP(S) never retries on 4xx.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// The delay before retry attempt `attempt` (0-indexed: the delay before
    /// the *second* try is `backoff(0)`).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let scale = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .saturating_mul(scale)
            .min(self.max_delay)
    }
}

/// Whether a status code should trigger a retry under [`RetryPolicy`].
pub fn is_retryable_status(status: u16) -> bool {
    status >= 500 || status == 429
}

/// Whether a status code is a fatal client error (no retry, no re-auth).
pub fn is_fatal_client_error(status: u16) -> bool {
    (400..500).contains(&status) && status != 401 && status != 429
}

/// Compute a cache fingerprint for a reference: a digest of its canonical
/// string form. Callers that need to vary the fingerprint by platform or
/// requested layer format append those to the input before hashing.
pub fn fingerprint_for(reference: &Reference) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(reference.to_string().as_bytes());
    Fingerprint::new(format!("{:x}", hasher.finalize()))
}

/// Shared GET-with-retry used by the registry, ORAS, and library transports:
/// 401 triggers a single re-attempt with Basic auth if credentials were
/// supplied; 4xx errors other than 401/429 are fatal; network errors and
/// retryable status codes retry with [`RetryPolicy::backoff`].
pub async fn get_with_retry(
    client: &dyn HttpClient,
    retry: &RetryPolicy,
    url: &str,
    accept_headers: &[(String, String)],
    auth: Option<&RegistryAuth>,
) -> Result<HttpResponse, SifError> {
    let mut attempt = 0;
    let mut tried_auth = false;

    loop {
        let mut headers = accept_headers.to_vec();
        if tried_auth {
            if let Some(auth) = auth {
                headers.push((
                    "Authorization".to_string(),
                    format!(
                        "Basic {}",
                        base64_encode(format!("{}:{}", auth.username, auth.password))
                    ),
                ));
            }
        }

        let result = client.get(url, &headers).await;

        match result {
            Ok(resp) if resp.status == 200 => return Ok(resp),
            Ok(resp) if resp.status == 401 && !tried_auth && auth.is_some() => {
                tried_auth = true;
                continue;
            }
            Ok(resp) if resp.status == 401 => {
                return Err(SifError::new(
                    ErrorKind::Auth,
                    anyhow!("authentication failed for {}", url),
                ))
            }
            Ok(resp) if resp.status == 404 => {
                return Err(SifError::new(
                    ErrorKind::NotFound,
                    anyhow!("not found: {}", url),
                ))
            }
            Ok(resp) if is_fatal_client_error(resp.status) => {
                return Err(SifError::new(
                    ErrorKind::Network,
                    anyhow!("{} returned fatal status {}", url, resp.status),
                ))
            }
            Ok(resp) if is_retryable_status(resp.status) && attempt + 1 < retry.max_attempts => {
                tokio::time::sleep(retry.backoff(attempt)).await;
                attempt += 1;
                continue;
            }
            Ok(resp) => {
                return Err(SifError::new(
                    ErrorKind::Network,
                    anyhow!("{} returned status {} after {} attempts", url, resp.status, attempt + 1),
                ))
            }
            Err(e) if attempt + 1 < retry.max_attempts => {
                tokio::time::sleep(retry.backoff(attempt)).await;
                attempt += 1;
                let _ = e;
                continue;
            }
            Err(e) => {
                return Err(SifError::new(
                    ErrorKind::Network,
                    anyhow!("{}: {}", url, e),
                ))
            }
        }
    }
}

/// Dispatch a pull to the transport matching `reference`'s variant.
pub async fn pull(
    ctx: &FetchContext,
    reference: &Reference,
    cache: &Cache,
) -> Result<PathBuf, SifError> {
    match reference {
        Reference::File(_) | Reference::Dir(_) => {
            local::LocalFetcher.pull(ctx, reference, cache).await
        }
        Reference::Instance(name) => Err(SifError::new(
            ErrorKind::UnsupportedTransport,
            anyhow::anyhow!("instance://{} does not name a fetchable artifact", name),
        )),
        Reference::Oci { .. } => {
            registry::OciRegistryFetcher::default()
                .pull(ctx, reference, cache)
                .await
        }
        Reference::Oras { .. } => oras::OrasFetcher::default().pull(ctx, reference, cache).await,
        Reference::Library { .. } => {
            library::LibraryFetcher::default()
                .pull(ctx, reference, cache)
                .await
        }
        Reference::Http(_) => http::HttpFetcher::default().pull(ctx, reference, cache).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn from_env_falls_back_to_username_password_pair() {
        std::env::remove_var("REGISTRY_AUTH_FILE");
        std::env::set_var("DOCKER_USERNAME", "alice");
        std::env::set_var("DOCKER_PASSWORD", "hunter2");
        let auth = RegistryAuth::from_env().unwrap();
        assert_eq!(auth.username, "alice");
        assert_eq!(auth.password, "hunter2");
        std::env::remove_var("DOCKER_USERNAME");
        std::env::remove_var("DOCKER_PASSWORD");
    }

    #[test]
    fn from_env_is_none_when_nothing_is_set() {
        std::env::remove_var("REGISTRY_AUTH_FILE");
        std::env::remove_var("DOCKER_USERNAME");
        std::env::remove_var("DOCKER_PASSWORD");
        assert!(RegistryAuth::from_env().is_none());
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_millis(500));
        assert_eq!(policy.backoff(1), Duration::from_millis(1000));
        assert_eq!(policy.backoff(2), Duration::from_millis(2000));
        assert_eq!(policy.backoff(10), Duration::from_secs(8));
    }

    #[test]
    fn status_classification() {
        assert!(is_retryable_status(503));
        assert!(is_retryable_status(429));
        assert!(!is_retryable_status(404));
        assert!(is_fatal_client_error(404));
        assert!(!is_fatal_client_error(401));
        assert!(!is_fatal_client_error(429));
    }

    #[test]
    fn fingerprint_is_stable_for_same_reference() {
        let a = Reference::parse("oci://docker.io/library/ubuntu:22.04").unwrap();
        let b = Reference::parse("docker://docker.io/library/ubuntu:22.04").unwrap();
        assert_eq!(fingerprint_for(&a), fingerprint_for(&b));
    }

    use crate::transport::http_client::HttpClient;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    #[derive(Clone, Debug)]
    struct ScriptedClient {
        responses: Arc<Vec<HttpResponse>>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl HttpClient for ScriptedClient {
        async fn get(
            &self,
            _url: &str,
            _headers: &[(String, String)],
        ) -> anyhow::Result<HttpResponse> {
            let i = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.responses[i.min(self.responses.len() - 1)].clone())
        }
    }

    fn resp(status: u16) -> HttpResponse {
        HttpResponse {
            status,
            body: Vec::new(),
            headers: Default::default(),
        }
    }

    #[tokio::test]
    async fn retries_on_503_then_succeeds() -> anyhow::Result<()> {
        let client = ScriptedClient {
            responses: Arc::new(vec![resp(503), resp(503), resp(200)]),
            calls: Arc::new(AtomicUsize::new(0)),
        };
        let mut retry = RetryPolicy::default();
        retry.base_delay = Duration::from_millis(1);
        let out = get_with_retry(&client, &retry, "http://x", &[], None).await?;
        assert_eq!(out.status, 200);
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
        Ok(())
    }

    #[tokio::test]
    async fn does_not_retry_fatal_404() {
        let client = ScriptedClient {
            responses: Arc::new(vec![resp(404)]),
            calls: Arc::new(AtomicUsize::new(0)),
        };
        let err = get_with_retry(&client, &RetryPolicy::default(), "http://x", &[], None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reauths_once_on_401() -> anyhow::Result<()> {
        let client = ScriptedClient {
            responses: Arc::new(vec![resp(401), resp(200)]),
            calls: Arc::new(AtomicUsize::new(0)),
        };
        let auth = RegistryAuth {
            username: "u".to_string(),
            password: "p".to_string(),
        };
        let out = get_with_retry(
            &client,
            &RetryPolicy::default(),
            "http://x",
            &[],
            Some(&auth),
        )
        .await?;
        assert_eq!(out.status, 200);
        Ok(())
    }
}
