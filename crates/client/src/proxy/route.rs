use shelter_core::{Error, Request, Response};

use super::OfflineProxy;
use crate::worker::{ResponseSource, Routed};

/// Fetch strategy chosen for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Live network, synthesized offline marker on failure. Never cached.
    NetworkFirst,
    /// Stored entry, then network, then the root shell for navigations.
    CacheFirst,
}

impl OfflineProxy {
    /// Classify a request by its URL path. First match wins.
    pub fn classify(&self, request: &Request) -> Route {
        if request.path().starts_with(&self.config.api_prefix) {
            Route::NetworkFirst
        } else {
            Route::CacheFirst
        }
    }

    /// Produce the response for an intercepted request.
    ///
    /// # Errors
    ///
    /// Returns `Error::NoResponse` when a cache-first request misses the
    /// cache, the network fails, and no navigation fallback applies. Errors
    /// that do not mean the origin is unreachable, such as
    /// `Error::ResponseTooLarge`, are returned as-is on both routes. Store
    /// errors during lookup are treated as misses.
    pub async fn route(&self, request: &Request) -> Result<Routed, Error> {
        let route = self.classify(request);
        tracing::debug!(method = %request.method, url = %request.url, mode = %request.mode, ?route, "routing");

        match route {
            Route::NetworkFirst => self.network_first(request).await,
            Route::CacheFirst => self.cache_first(request).await,
        }
    }

    async fn network_first(&self, request: &Request) -> Result<Routed, Error> {
        match self.network.fetch(request).await {
            Ok(response) => Ok(Routed::new(response, ResponseSource::Network)),
            Err(e) if e.is_network() => {
                tracing::debug!(url = %request.url, error = %e, "api request offline");
                Ok(Routed::new(Response::offline(self.config.offline_status), ResponseSource::Offline))
            }
            Err(e) => Err(e),
        }
    }

    async fn cache_first(&self, request: &Request) -> Result<Routed, Error> {
        if let Some(response) = self.lookup(request).await {
            return Ok(Routed::new(response, ResponseSource::Cache));
        }

        let error = match self.network.fetch(request).await {
            Ok(response) => return Ok(Routed::new(response, ResponseSource::Network)),
            Err(e) if e.is_network() => e,
            Err(e) => return Err(e),
        };

        if request.is_navigation() {
            let shell = Request::get(self.config.root_url());
            if let Some(response) = self.lookup(&shell).await {
                tracing::debug!(url = %request.url, "offline navigation, serving cached shell");
                return Ok(Routed::new(response, ResponseSource::Fallback));
            }
        }

        tracing::debug!(url = %request.url, error = %error, "no cached or live response");
        Err(Error::NoResponse(format!("{} {}: {error}", request.method, request.url)))
    }

    async fn lookup(&self, request: &Request) -> Option<Response> {
        match self.storage.match_any(request).await {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!(url = %request.url, error = %e, "cache lookup failed");
                None
            }
        }
    }
}
