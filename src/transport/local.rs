//! Trivial fetcher for `file:`/`dir:` references: the artifact is already on
//! the local filesystem, so there is nothing to materialize into the cache.

use crate::{
    cache::Cache,
    error::{ErrorKind, SifError},
    reference::Reference,
    transport::{Fetcher, FetchContext},
};
use anyhow::anyhow;
use async_trait::async_trait;
use std::path::PathBuf;

#[derive(Default)]
pub struct LocalFetcher;

#[async_trait]
impl Fetcher for LocalFetcher {
    async fn pull(
        &self,
        _ctx: &FetchContext,
        reference: &Reference,
        _cache: &Cache,
    ) -> Result<PathBuf, SifError> {
        let path = match reference {
            Reference::File(p) | Reference::Dir(p) => PathBuf::from(p),
            other => {
                return Err(SifError::new(
                    ErrorKind::UnsupportedTransport,
                    anyhow!("local fetcher cannot handle {}", other),
                ))
            }
        };

        if !path.exists() {
            return Err(SifError::new(
                ErrorKind::NotFound,
                anyhow!("no such image: {}", path.display()),
            ));
        }

        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn existing_dir_resolves() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let cache = Cache::open(dir.path().join("cache"))?;
        let reference = Reference::Dir(dir.path().display().to_string());
        let path = LocalFetcher
            .pull(&FetchContext::default(), &reference, &cache)
            .await?;
        assert_eq!(path, dir.path());
        Ok(())
    }

    #[tokio::test]
    async fn missing_path_is_not_found() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let cache = Cache::open(dir.path().join("cache"))?;
        let reference = Reference::File("/no/such/file-xyz".to_string());
        let err = LocalFetcher
            .pull(&FetchContext::default(), &reference, &cache)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        Ok(())
    }
}
