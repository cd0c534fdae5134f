//! A mockable HTTP client, following the `ExecCommand` pattern already used
//! to make [`crate::oci::oci_runtime::OCIRuntime`] testable without a real
//! binary: transports depend on `Box<dyn HttpClient>` so retry/auth policy
//! can be exercised in tests without a real network.

use anyhow::{Context, Result};
use async_trait::async_trait;
use dyn_clone::{clone_trait_object, DynClone};
use std::{collections::HashMap, fmt::Debug};

/// A minimal response: enough to drive registry/ORAS/library/HTTP policy.
#[derive(Clone, Debug, Default)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
    pub headers: HashMap<String, String>,
}

#[async_trait]
pub trait HttpClient: Debug + DynClone + Send + Sync {
    async fn get(&self, url: &str, headers: &[(String, String)]) -> Result<HttpResponse>;
}

clone_trait_object!(HttpClient);

#[derive(Clone, Debug, Default)]
pub struct ReqwestHttpClient;

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn get(&self, url: &str, headers: &[(String, String)]) -> Result<HttpResponse> {
        let client = reqwest::Client::new();
        let mut req = client.get(url);
        for (key, value) in headers {
            req = req.header(key.as_str(), value.as_str());
        }

        let resp = req.send().await.context("send HTTP request")?;
        let status = resp.status().as_u16();
        let headers = resp
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or_default().to_string()))
            .collect();
        let body = resp.bytes().await.context("read HTTP response body")?.to_vec();

        Ok(HttpResponse {
            status,
            body,
            headers,
        })
    }
}
