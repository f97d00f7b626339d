//! The offline cache proxy.
//!
//! Three hooks, all on [`OfflineProxy`]:
//!
//! - **install**: fetch every manifest URL and store the responses in the
//!   generation named after the current version, all or nothing
//! - **activate**: delete every other generation, then claim open clients
//! - **route**: network-first for paths under the API prefix, cache-first
//!   for everything else
//!
//! The proxy holds no entries itself. It refers to generations by name in
//! an injected [`CacheStorage`] and fetches through an injected
//! [`Network`], so several proxies with different versions can share one
//! store.

mod activate;
mod install;
mod route;

use std::sync::Arc;

use shelter_core::{AppConfig, CacheStorage, Error};
use tokio::sync::RwLock;
use url::Url;

pub use activate::ActivateReport;
pub use install::InstallReport;
pub use route::Route;

use crate::fetch::{Network, resolve};
use crate::worker::WorkerScope;

/// Deploy-time settings of one proxy instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    /// Name of the current cache generation.
    pub version: String,
    /// Origin served; `/` is resolved against it for the navigation fallback.
    pub origin: Url,
    /// URLs cached on install, in order, without duplicates.
    pub manifest: Vec<Url>,
    /// Paths starting with this prefix are routed network-first.
    pub api_prefix: String,
    /// Status of the synthesized offline response.
    pub offline_status: u16,
}

impl ProxyConfig {
    /// Build a config, resolving manifest entries against `origin`.
    ///
    /// Duplicate manifest entries are dropped, keeping the first.
    pub fn new(version: impl Into<String>, origin: Url, manifest: &[&str]) -> Result<Self, Error> {
        let mut urls: Vec<Url> = Vec::with_capacity(manifest.len());
        for entry in manifest {
            let url = resolve(&origin, entry).map_err(|e| Error::InvalidUrl(format!("{entry}: {e}")))?;
            if !urls.contains(&url) {
                urls.push(url);
            }
        }

        Ok(Self { version: version.into(), origin, manifest: urls, api_prefix: "/api/".into(), offline_status: 200 })
    }

    pub fn with_api_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.api_prefix = prefix.into();
        self
    }

    pub fn with_offline_status(mut self, status: u16) -> Self {
        self.offline_status = status;
        self
    }

    /// Build from loaded application configuration.
    pub fn from_app_config(config: &AppConfig) -> Result<Self, Error> {
        let origin = config.origin_url().map_err(|e| Error::InvalidUrl(e.to_string()))?;
        let manifest: Vec<&str> = config.manifest.iter().map(String::as_str).collect();
        Ok(Self::new(config.cache_version.clone(), origin, &manifest)?
            .with_api_prefix(config.api_prefix.clone())
            .with_offline_status(config.offline_status))
    }

    /// The root document, served when a navigation fails offline.
    pub fn root_url(&self) -> Url {
        let mut root = self.origin.clone();
        root.set_path("/");
        root.set_query(None);
        root.set_fragment(None);
        root
    }
}

/// Offline cache proxy bound to one version.
pub struct OfflineProxy {
    config: ProxyConfig,
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn Network>,
    last_install: RwLock<Option<InstallReport>>,
    last_activate: RwLock<Option<ActivateReport>>,
}

impl OfflineProxy {
    pub fn new(config: ProxyConfig, storage: Arc<dyn CacheStorage>, network: Arc<dyn Network>) -> Self {
        Self { config, storage, network, last_install: RwLock::new(None), last_activate: RwLock::new(None) }
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    pub fn version(&self) -> &str {
        &self.config.version
    }

    pub fn storage(&self) -> &Arc<dyn CacheStorage> {
        &self.storage
    }

    /// Report of the most recent successful install.
    pub async fn last_install(&self) -> Option<InstallReport> {
        self.last_install.read().await.clone()
    }

    /// Report of the most recent activation.
    pub async fn last_activate(&self) -> Option<ActivateReport> {
        self.last_activate.read().await.clone()
    }

    /// Whether the current generation already holds every manifest URL,
    /// for example from an earlier run against the same store.
    pub async fn is_installed(&self) -> Result<bool, Error> {
        if !self.storage.has(&self.config.version).await? {
            return Ok(false);
        }
        let stored = self.storage.entry_urls(&self.config.version).await?;
        Ok(self.config.manifest.iter().all(|url| stored.iter().any(|s| s == url.as_str())))
    }

    /// Register install, activate and fetch handlers on `scope`.
    ///
    /// - install: skip waiting, then populate the current generation
    /// - activate: drop stale generations, then claim clients
    /// - fetch: route every request
    pub fn register(self: &Arc<Self>, scope: &mut WorkerScope) {
        let proxy = Arc::clone(self);
        scope.on_install(move |event| {
            event.skip_waiting();
            let proxy = Arc::clone(&proxy);
            event.wait_until(async move { proxy.install().await.map(|_| ()) });
        });

        let proxy = Arc::clone(self);
        scope.on_activate(move |event| {
            let proxy = Arc::clone(&proxy);
            let clients = event.clients();
            event.wait_until(async move { proxy.activate(&clients).await.map(|_| ()) });
        });

        let proxy = Arc::clone(self);
        scope.on_fetch(move |event| {
            let proxy = Arc::clone(&proxy);
            let request = event.request().clone();
            event.respond_with(async move { proxy.route(&request).await });
        });
    }
}
