use futures_util::future::try_join_all;
use shelter_core::{Error, Request};

use super::OfflineProxy;

/// Result of a successful install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub version: String,
    pub cached: usize,
}

impl OfflineProxy {
    /// Populate the current generation with every manifest URL.
    ///
    /// All manifest fetches run concurrently. The responses are written
    /// in one batch only after every fetch succeeded with a 2xx status,
    /// so a failed install stores nothing.
    ///
    /// # Errors
    ///
    /// Returns `Error::InstallFailed` naming the first URL that could not
    /// be fetched or answered with a non-2xx status, or a store error.
    pub async fn install(&self) -> Result<InstallReport, Error> {
        let version = self.config.version.clone();
        self.storage.open(&version).await?;
        tracing::info!(version = %version, urls = self.config.manifest.len(), "opened cache");

        let fetches = self.config.manifest.iter().map(|url| async move {
            let request = Request::get(url.clone());
            let response = self
                .network
                .fetch(&request)
                .await
                .map_err(|e| Error::InstallFailed { url: url.to_string(), reason: e.to_string() })?;
            if !response.ok() {
                return Err(Error::InstallFailed {
                    url: url.to_string(),
                    reason: format!("status {}", response.status),
                });
            }
            Ok((request, response))
        });

        let entries = match try_join_all(fetches).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(version = %version, error = %e, "install aborted");
                return Err(e);
            }
        };

        let cached = entries.len();
        self.storage.put_all(&version, entries).await?;
        tracing::info!(version = %version, cached, "install complete");

        let report = InstallReport { version, cached };
        *self.last_install.write().await = Some(report.clone());
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use shelter_core::{CacheDb, CacheStorage, MemoryCacheStorage, Response};

    use super::super::testing::*;
    use super::*;

    #[tokio::test]
    async fn test_install_caches_every_manifest_url() {
        let config = config("v1");
        let network = network_for(&config);
        let storage = Arc::new(MemoryCacheStorage::new());
        let proxy = OfflineProxy::new(config.clone(), storage.clone(), network);

        let report = proxy.install().await.unwrap();
        assert_eq!(report, InstallReport { version: "v1".into(), cached: 3 });

        for url in &config.manifest {
            let hit = storage.match_in("v1", &Request::get(url.clone())).await.unwrap();
            assert_eq!(hit.unwrap().text(), url.path());
        }
    }

    #[tokio::test]
    async fn test_install_is_all_or_nothing() {
        let config = config("v1");
        let network = network_for(&config);
        network.fail(&url("/login"));
        let storage = Arc::new(MemoryCacheStorage::new());
        let proxy = OfflineProxy::new(config, storage.clone(), network);

        let err = proxy.install().await.unwrap_err();
        assert!(matches!(&err, Error::InstallFailed { url, .. } if url.ends_with("/login")));
        assert!(storage.entry_urls("v1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_install_rejects_error_status() {
        let config = config("v1");
        let network = network_for(&config);
        network.serve(&url("/static/logo.png"), Response::new(404, "missing"));
        let storage = Arc::new(MemoryCacheStorage::new());
        let proxy = OfflineProxy::new(config, storage.clone(), network);

        let err = proxy.install().await.unwrap_err();
        assert!(matches!(&err, Error::InstallFailed { reason, .. } if reason == "status 404"));
        assert!(storage.match_any(&Request::get(url("/"))).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_install_versions_are_isolated() {
        let storage = Arc::new(CacheDb::open_in_memory().await.unwrap());
        for version in ["v1", "v2"] {
            let config = config(version);
            let network = network_for(&config);
            OfflineProxy::new(config, storage.clone(), network).install().await.unwrap();
        }

        let infos = storage.generations().await.unwrap();
        assert_eq!(infos.len(), 2);
        assert!(infos.iter().all(|g| g.entries == 3));
    }

    #[tokio::test]
    async fn test_reinstall_overwrites_entries() {
        let config = config("v1");
        let network = network_for(&config);
        let storage = Arc::new(MemoryCacheStorage::new());
        let proxy = OfflineProxy::new(config, storage.clone(), network.clone());

        proxy.install().await.unwrap();
        network.serve(&url("/login"), page("new login"));
        proxy.install().await.unwrap();

        let hit = storage.match_in("v1", &Request::get(url("/login"))).await.unwrap().unwrap();
        assert_eq!(hit.text(), "new login");
        assert_eq!(storage.entry_urls("v1").await.unwrap().len(), 3);
    }
}
