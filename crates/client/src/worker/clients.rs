//! Open clients (pages) and which worker controls them.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use shelter_core::Error;
use tokio::sync::RwLock;
use url::Url;

/// Client-control interface.
#[async_trait]
pub trait Clients: Send + Sync {
    /// Make `worker` the controller of every open client. Returns how many
    /// clients changed controller.
    async fn claim(&self, worker: u64) -> Result<usize, Error>;

    /// Number of open clients controlled by a worker other than `worker`.
    async fn controlled_elsewhere(&self, worker: u64) -> usize;
}

/// Handle on the clients of one worker, given to lifecycle handlers.
#[derive(Clone)]
pub struct WorkerClients {
    worker: u64,
    clients: Arc<dyn Clients>,
}

impl WorkerClients {
    pub(crate) fn new(worker: u64, clients: Arc<dyn Clients>) -> Self {
        Self { worker, clients }
    }

    pub fn worker(&self) -> u64 {
        self.worker
    }

    /// Take control of all open clients without a reload.
    pub async fn claim(&self) -> Result<usize, Error> {
        self.clients.claim(self.worker).await
    }
}

#[derive(Debug, Clone)]
struct ClientEntry {
    url: Url,
    controller: Option<u64>,
}

/// In-process registry of open clients.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: RwLock<BTreeMap<u64, ClientEntry>>,
    next_id: AtomicU64,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an open page, uncontrolled. Returns its client id.
    pub async fn open(&self, url: Url) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.clients
            .write()
            .await
            .insert(id, ClientEntry { url, controller: None });
        id
    }

    /// Register a page that is already controlled by `worker`.
    pub async fn open_controlled(&self, url: Url, worker: u64) -> u64 {
        let id = self.open(url).await;
        if let Some(entry) = self.clients.write().await.get_mut(&id) {
            entry.controller = Some(worker);
        }
        id
    }

    pub async fn controller(&self, id: u64) -> Option<u64> {
        self.clients.read().await.get(&id).and_then(|c| c.controller)
    }

    pub async fn count(&self) -> usize {
        self.clients.read().await.len()
    }
}

#[async_trait]
impl Clients for ClientRegistry {
    async fn claim(&self, worker: u64) -> Result<usize, Error> {
        let mut clients = self.clients.write().await;
        let mut claimed = 0;
        for (id, entry) in clients.iter_mut() {
            if entry.controller != Some(worker) {
                tracing::debug!(worker, client = id, url = %entry.url, previous = ?entry.controller, "claiming client");
                entry.controller = Some(worker);
                claimed += 1;
            }
        }
        tracing::debug!(worker, claimed, "claimed clients");
        Ok(claimed)
    }

    async fn controlled_elsewhere(&self, worker: u64) -> usize {
        self.clients
            .read()
            .await
            .values()
            .filter(|c| c.controller.is_some_and(|w| w != worker))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(p: &str) -> Url {
        Url::parse("http://localhost:5000").unwrap().join(p).unwrap()
    }

    #[tokio::test]
    async fn test_claim_takes_over_all_clients() {
        let registry = ClientRegistry::new();
        let a = registry.open(page("/")).await;
        let b = registry.open_controlled(page("/login"), 1).await;

        assert_eq!(registry.claim(2).await.unwrap(), 2);
        assert_eq!(registry.controller(a).await, Some(2));
        assert_eq!(registry.controller(b).await, Some(2));

        assert_eq!(registry.claim(2).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_controlled_elsewhere() {
        let registry = ClientRegistry::new();
        registry.open(page("/")).await;
        registry.open_controlled(page("/mobile"), 1).await;

        assert_eq!(registry.controlled_elsewhere(2).await, 1);
        assert_eq!(registry.controlled_elsewhere(1).await, 0);

        registry.claim(2).await.unwrap();
        assert_eq!(registry.controlled_elsewhere(2).await, 0);
        assert_eq!(registry.count().await, 2);
    }

    #[tokio::test]
    async fn test_worker_clients_handle() {
        let registry = Arc::new(ClientRegistry::new());
        let id = registry.open(page("/")).await;

        let handle = WorkerClients::new(7, registry.clone());
        assert_eq!(handle.worker(), 7);
        assert_eq!(handle.claim().await.unwrap(), 1);
        assert_eq!(registry.controller(id).await, Some(7));
    }
}
