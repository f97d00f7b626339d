use futures_util::future::join_all;
use shelter_core::Error;

use super::OfflineProxy;
use crate::worker::WorkerClients;

/// Result of an activation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ActivateReport {
    pub version: String,
    /// Stale generations that were removed.
    pub deleted: Vec<String>,
    /// Stale generations whose deletion failed.
    pub failed: Vec<String>,
    /// Clients that switched to this worker.
    pub claimed: usize,
}

impl OfflineProxy {
    /// Delete every generation except the current one, then claim clients.
    ///
    /// Deletions run concurrently and independently: one failing does not
    /// stop the others and is not retried. Clients are claimed only after
    /// every deletion has settled.
    ///
    /// # Errors
    ///
    /// Returns an error only if the generation names cannot be listed or
    /// the claim fails.
    pub async fn activate(&self, clients: &WorkerClients) -> Result<ActivateReport, Error> {
        let version = &self.config.version;
        let stale: Vec<String> = self.storage.keys().await?.into_iter().filter(|name| name != version).collect();

        let deletions = stale.iter().map(|name| async move { (name, self.storage.delete(name).await) });

        let mut report = ActivateReport { version: version.clone(), ..Default::default() };
        for (name, result) in join_all(deletions).await {
            match result {
                Ok(_) => report.deleted.push(name.clone()),
                Err(e) => {
                    tracing::warn!(generation = %name, error = %e, "failed to delete stale cache");
                    report.failed.push(name.clone());
                }
            }
        }

        report.claimed = clients.claim().await?;
        tracing::info!(
            version = %version,
            deleted = report.deleted.len(),
            failed = report.failed.len(),
            claimed = report.claimed,
            "activation complete"
        );

        *self.last_activate.write().await = Some(report.clone());
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use shelter_core::{CacheStorage, GenerationInfo, MemoryCacheStorage, Request, Response};

    use super::super::testing::*;
    use super::*;
    use crate::worker::{ClientRegistry, Clients};

    fn handle(registry: &Arc<ClientRegistry>, worker: u64) -> WorkerClients {
        WorkerClients::new(worker, registry.clone())
    }

    #[tokio::test]
    async fn test_activate_removes_stale_generations() {
        let storage = Arc::new(MemoryCacheStorage::new());
        for name in ["tibok-cache-v3", "tibok-cache-v4", "v5", "other-app"] {
            storage.open(name).await.unwrap();
        }
        let proxy = OfflineProxy::new(config("v5"), storage.clone(), Arc::new(FakeNetwork::new()));
        let registry = Arc::new(ClientRegistry::new());

        let report = proxy.activate(&handle(&registry, 1)).await.unwrap();

        assert_eq!(storage.keys().await.unwrap(), vec!["v5".to_string()]);
        assert_eq!(report.deleted.len(), 3);
        assert!(report.failed.is_empty());
    }

    #[tokio::test]
    async fn test_activate_twice_is_idempotent() {
        let storage = Arc::new(MemoryCacheStorage::new());
        storage.open("v1").await.unwrap();
        storage.open("v2").await.unwrap();
        let proxy = OfflineProxy::new(config("v2"), storage.clone(), Arc::new(FakeNetwork::new()));
        let registry = Arc::new(ClientRegistry::new());

        proxy.activate(&handle(&registry, 1)).await.unwrap();
        let second = proxy.activate(&handle(&registry, 1)).await.unwrap();

        assert!(second.deleted.is_empty());
        assert_eq!(storage.keys().await.unwrap(), vec!["v2".to_string()]);
    }

    #[tokio::test]
    async fn test_activate_without_current_generation() {
        let storage = Arc::new(MemoryCacheStorage::new());
        storage.open("v1").await.unwrap();
        let proxy = OfflineProxy::new(config("v2"), storage.clone(), Arc::new(FakeNetwork::new()));

        proxy.activate(&handle(&Arc::new(ClientRegistry::new()), 1)).await.unwrap();
        assert!(storage.keys().await.unwrap().is_empty());
    }

    /// Store whose deletes fail for one name and which records whether a
    /// claim happened before deletions finished.
    struct FlakyStore {
        inner: MemoryCacheStorage,
        broken: String,
        pending_deletes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl CacheStorage for FlakyStore {
        async fn open(&self, name: &str) -> Result<(), Error> {
            self.inner.open(name).await
        }
        async fn put_all(&self, name: &str, entries: Vec<(Request, Response)>) -> Result<(), Error> {
            self.inner.put_all(name, entries).await
        }
        async fn match_in(&self, name: &str, request: &Request) -> Result<Option<Response>, Error> {
            self.inner.match_in(name, request).await
        }
        async fn match_any(&self, request: &Request) -> Result<Option<Response>, Error> {
            self.inner.match_any(request).await
        }
        async fn keys(&self) -> Result<Vec<String>, Error> {
            self.inner.keys().await
        }
        async fn delete(&self, name: &str) -> Result<bool, Error> {
            tokio::task::yield_now().await;
            self.pending_deletes.fetch_sub(1, Ordering::SeqCst);
            if name == self.broken {
                return Err(Error::CorruptEntry(name.to_string()));
            }
            self.inner.delete(name).await
        }
        async fn generations(&self) -> Result<Vec<GenerationInfo>, Error> {
            self.inner.generations().await
        }
        async fn entry_urls(&self, name: &str) -> Result<Vec<String>, Error> {
            self.inner.entry_urls(name).await
        }
    }

    struct OrderCheckingClients {
        pending_deletes: Arc<AtomicUsize>,
        claimed_with_pending: AtomicUsize,
    }

    #[async_trait]
    impl Clients for OrderCheckingClients {
        async fn claim(&self, _worker: u64) -> Result<usize, Error> {
            self.claimed_with_pending
                .store(self.pending_deletes.load(Ordering::SeqCst), Ordering::SeqCst);
            Ok(2)
        }
        async fn controlled_elsewhere(&self, _worker: u64) -> usize {
            0
        }
    }

    #[tokio::test]
    async fn test_failed_delete_is_isolated_and_claim_waits() {
        let pending = Arc::new(AtomicUsize::new(3));
        let store = FlakyStore { inner: MemoryCacheStorage::new(), broken: "v2".into(), pending_deletes: pending.clone() };
        for name in ["v1", "v2", "v3", "v4"] {
            store.open(name).await.unwrap();
        }
        let proxy = OfflineProxy::new(config("v4"), Arc::new(store), Arc::new(FakeNetwork::new()));
        let clients =
            Arc::new(OrderCheckingClients { pending_deletes: pending, claimed_with_pending: AtomicUsize::new(99) });

        let report = proxy.activate(&WorkerClients::new(1, clients.clone())).await.unwrap();

        assert_eq!(report.deleted, vec!["v1".to_string(), "v3".to_string()]);
        assert_eq!(report.failed, vec!["v2".to_string()]);
        assert_eq!(report.claimed, 2);
        assert_eq!(clients.claimed_with_pending.load(Ordering::SeqCst), 0);
        assert_eq!(
            proxy.storage().keys().await.unwrap(),
            vec!["v2".to_string(), "v4".to_string()]
        );
    }
}
