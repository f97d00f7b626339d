//! The running offline agent: one proxy registered on one worker scope.

use std::sync::Arc;

use shelter_client::{
    ClientRegistry, FetchConfig, HttpNetwork, Network, OfflineProxy, ProxyConfig, WorkerScope, WorkerState,
};
use shelter_core::{AppConfig, CacheDb, CacheStorage, Error};

/// Worker scope with the proxy's handlers registered, plus the pieces the
/// tools inspect directly.
pub struct Agent {
    pub scope: WorkerScope,
    pub proxy: Arc<OfflineProxy>,
    pub clients: Arc<ClientRegistry>,
}

impl Agent {
    pub fn new(
        config: ProxyConfig, storage: Arc<dyn CacheStorage>, network: Arc<dyn Network>, clients: Arc<ClientRegistry>,
    ) -> Self {
        let proxy = Arc::new(OfflineProxy::new(config, storage, network.clone()));
        let mut scope = WorkerScope::new(network, clients.clone());
        proxy.register(&mut scope);
        Self { scope, proxy, clients }
    }

    /// Build the agent from loaded configuration, opening the on-disk store
    /// and registering one open page for the origin root.
    pub async fn from_config(config: &AppConfig) -> Result<Self, Error> {
        let proxy_config = ProxyConfig::from_app_config(config)?;
        let storage = Arc::new(CacheDb::open(&config.db_path).await?);
        let network = Arc::new(HttpNetwork::new(FetchConfig::from(config))?);

        let clients = Arc::new(ClientRegistry::new());
        clients.open(proxy_config.root_url()).await;

        Ok(Self::new(proxy_config, storage, network, clients))
    }

    /// Bring the worker up.
    ///
    /// When the store already holds every manifest URL under the current
    /// version, the worker is restored and activated without touching the
    /// network, as a browser keeps an unchanged worker across restarts.
    /// Otherwise install then activate are dispatched. Failures are logged
    /// and left for the `cache_install` tool to retry.
    pub async fn start(&self) {
        let version = self.proxy.version();
        let installed = match self.proxy.is_installed().await {
            Ok(installed) => installed,
            Err(e) => {
                tracing::warn!(%version, error = %e, "could not inspect stored generation");
                false
            }
        };

        let result = if installed { self.resume().await } else { self.scope.start().await };
        match result {
            Ok(state) => {
                let clients = self.clients.count().await;
                tracing::info!(%version, %state, clients, restored = installed, "agent started");
            }
            Err(e) => tracing::error!(%version, error = %e, "agent start failed"),
        }
    }

    async fn resume(&self) -> Result<WorkerState, Error> {
        tracing::info!(version = %self.proxy.version(), "current generation complete, skipping install");
        self.scope.restore().await?;
        self.scope.activate().await?;
        Ok(self.scope.state().await)
    }
}
