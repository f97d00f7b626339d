//! Event dispatcher for one worker instance.
//!
//! Handlers are registered on a mutable [`WorkerScope`] before it is
//! shared. The scope drives the lifecycle:
//!
//! ```text
//! Parsed -> Installing -> Installed -> Activating -> Activated
//!               |
//!               +-> Redundant (install failed; install may be retried)
//! ```
//!
//! Fetch events are routed through the handlers only once the worker is
//! `Activated`; before that requests go straight to the network, as they
//! would for a page with no controlling worker.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::future::{join_all, try_join_all};
use shelter_core::{Error, Request};
use tokio::sync::{Mutex, RwLock};

use super::clients::{Clients, WorkerClients};
use super::events::{ExtendableEvent, FetchEvent, ResponseSource, Routed};
use crate::fetch::Network;

type LifecycleHandler = Box<dyn Fn(&mut ExtendableEvent) + Send + Sync>;
type FetchHandler = Box<dyn Fn(&mut FetchEvent) + Send + Sync>;

/// Worker lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    Redundant,
}

impl WorkerState {
    /// Fetch events reach the registered handlers only in this state.
    pub fn can_intercept_fetch(&self) -> bool {
        matches!(self, WorkerState::Activated)
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerState::Parsed => write!(f, "parsed"),
            WorkerState::Installing => write!(f, "installing"),
            WorkerState::Installed => write!(f, "installed"),
            WorkerState::Activating => write!(f, "activating"),
            WorkerState::Activated => write!(f, "activated"),
            WorkerState::Redundant => write!(f, "redundant"),
        }
    }
}

/// Registered handlers plus lifecycle state for one worker.
pub struct WorkerScope {
    id: u64,
    state: RwLock<WorkerState>,
    skip_waiting: RwLock<bool>,
    lifecycle: Mutex<()>,
    network: Arc<dyn Network>,
    clients: Arc<dyn Clients>,
    install_handlers: Vec<LifecycleHandler>,
    activate_handlers: Vec<LifecycleHandler>,
    fetch_handlers: Vec<FetchHandler>,
}

impl WorkerScope {
    pub fn new(network: Arc<dyn Network>, clients: Arc<dyn Clients>) -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::SeqCst),
            state: RwLock::new(WorkerState::Parsed),
            skip_waiting: RwLock::new(false),
            lifecycle: Mutex::new(()),
            network,
            clients,
            install_handlers: Vec::new(),
            activate_handlers: Vec::new(),
            fetch_handlers: Vec::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub async fn state(&self) -> WorkerState {
        *self.state.read().await
    }

    pub fn on_install<F>(&mut self, handler: F)
    where
        F: Fn(&mut ExtendableEvent) + Send + Sync + 'static,
    {
        self.install_handlers.push(Box::new(handler));
    }

    pub fn on_activate<F>(&mut self, handler: F)
    where
        F: Fn(&mut ExtendableEvent) + Send + Sync + 'static,
    {
        self.activate_handlers.push(Box::new(handler));
    }

    pub fn on_fetch<F>(&mut self, handler: F)
    where
        F: Fn(&mut FetchEvent) + Send + Sync + 'static,
    {
        self.fetch_handlers.push(Box::new(handler));
    }

    fn worker_clients(&self) -> WorkerClients {
        WorkerClients::new(self.id, self.clients.clone())
    }

    async fn set_state(&self, next: WorkerState) {
        let mut state = self.state.write().await;
        if *state != next {
            tracing::info!(worker = self.id, from = %*state, to = %next, "worker state change");
            *state = next;
        }
    }

    async fn expect_state(&self, allowed: &[WorkerState], expected: &str) -> Result<(), Error> {
        let actual = self.state().await;
        if allowed.contains(&actual) {
            Ok(())
        } else {
            Err(Error::InvalidState { expected: expected.to_string(), actual: actual.to_string() })
        }
    }

    /// Dispatch `install` and wait for every `wait_until` task.
    ///
    /// Allowed from `Parsed`, and from `Redundant` to retry a failed
    /// install. Any failing task fails the install and leaves the worker
    /// `Redundant`.
    pub async fn install(&self) -> Result<(), Error> {
        let _guard = self.lifecycle.lock().await;
        self.expect_state(&[WorkerState::Parsed, WorkerState::Redundant], "parsed or redundant")
            .await?;
        self.set_state(WorkerState::Installing).await;

        let mut event = ExtendableEvent::new(self.worker_clients());
        for handler in &self.install_handlers {
            handler(&mut event);
        }
        let (pending, skip_waiting) = event.into_parts();
        *self.skip_waiting.write().await = skip_waiting;

        match try_join_all(pending).await {
            Ok(_) => {
                self.set_state(WorkerState::Installed).await;
                Ok(())
            }
            Err(e) => {
                tracing::warn!(worker = self.id, error = %e, "install failed");
                self.set_state(WorkerState::Redundant).await;
                Err(e)
            }
        }
    }

    /// Mark the worker `Installed` without dispatching `install`.
    ///
    /// For a worker whose install completed in an earlier run: the caches
    /// it filled are still in the store, so nothing is refetched. The
    /// restored worker does not wait for other controllers. Allowed from
    /// `Parsed` and `Redundant`.
    pub async fn restore(&self) -> Result<(), Error> {
        let _guard = self.lifecycle.lock().await;
        self.expect_state(&[WorkerState::Parsed, WorkerState::Redundant], "parsed or redundant")
            .await?;
        *self.skip_waiting.write().await = true;
        tracing::info!(worker = self.id, "restoring installed worker");
        self.set_state(WorkerState::Installed).await;
        Ok(())
    }

    /// Whether an installed worker must wait for clients of an older
    /// worker to close before it can activate.
    pub async fn is_waiting(&self) -> bool {
        self.state().await == WorkerState::Installed
            && !*self.skip_waiting.read().await
            && self.clients.controlled_elsewhere(self.id).await > 0
    }

    /// Dispatch `activate` and wait for every `wait_until` task.
    ///
    /// Allowed from `Installed` (unless waiting) and from `Activated`,
    /// which re-runs the handlers. Task failures are logged; the worker
    /// still becomes `Activated`.
    pub async fn activate(&self) -> Result<(), Error> {
        let _guard = self.lifecycle.lock().await;
        self.expect_state(&[WorkerState::Installed, WorkerState::Activated], "installed")
            .await?;
        if self.is_waiting().await {
            return Err(Error::InvalidState {
                expected: "no clients controlled by another worker".into(),
                actual: "waiting".into(),
            });
        }
        self.set_state(WorkerState::Activating).await;

        let mut event = ExtendableEvent::new(self.worker_clients());
        for handler in &self.activate_handlers {
            handler(&mut event);
        }
        let (pending, _) = event.into_parts();
        for result in join_all(pending).await {
            if let Err(e) = result {
                tracing::warn!(worker = self.id, error = %e, "activate task failed");
            }
        }

        self.set_state(WorkerState::Activated).await;
        Ok(())
    }

    /// Run `install` followed by `activate` when install asked to skip
    /// waiting, or when nothing else controls the clients.
    pub async fn start(&self) -> Result<WorkerState, Error> {
        self.install().await?;
        if !self.is_waiting().await {
            self.activate().await?;
        }
        Ok(self.state().await)
    }

    /// Dispatch a fetch event.
    ///
    /// The first handler that calls `respond_with` decides the response.
    /// Without one, or before activation, the request goes to the network.
    pub async fn fetch(&self, request: Request) -> Result<Routed, Error> {
        if !self.state().await.can_intercept_fetch() {
            tracing::debug!(url = %request.url, "worker not active, passing through");
            return self.passthrough(&request).await;
        }

        let mut event = FetchEvent::new(request);
        for handler in &self.fetch_handlers {
            handler(&mut event);
            if event.has_response() {
                break;
            }
        }

        let (request, response, pending) = event.into_parts();
        let result = match response {
            Some(response) => response.await,
            None => self.passthrough(&request).await,
        };

        for outcome in join_all(pending).await {
            if let Err(e) = outcome {
                tracing::warn!(url = %request.url, error = %e, "fetch task failed");
            }
        }

        result
    }

    async fn passthrough(&self, request: &Request) -> Result<Routed, Error> {
        let response = self.network.fetch(request).await?;
        Ok(Routed::new(response, ResponseSource::Network))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::clients::ClientRegistry;
    use async_trait::async_trait;
    use shelter_core::Response;
    use std::sync::atomic::AtomicUsize;
    use url::Url;

    struct EchoNetwork {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Network for EchoNetwork {
        async fn fetch(&self, request: &Request) -> Result<Response, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Response::new(200, request.url.path().to_string()))
        }
    }

    fn scope() -> (WorkerScope, Arc<EchoNetwork>, Arc<ClientRegistry>) {
        let network = Arc::new(EchoNetwork { calls: AtomicUsize::new(0) });
        let clients = Arc::new(ClientRegistry::new());
        (WorkerScope::new(network.clone(), clients.clone()), network, clients)
    }

    fn request(p: &str) -> Request {
        Request::get(Url::parse("http://localhost:5000").unwrap().join(p).unwrap())
    }

    #[tokio::test]
    async fn test_install_then_activate() {
        let (mut scope, _, _) = scope();
        scope.on_install(|event| event.wait_until(async { Ok(()) }));
        assert_eq!(scope.state().await, WorkerState::Parsed);

        scope.install().await.unwrap();
        assert_eq!(scope.state().await, WorkerState::Installed);

        scope.activate().await.unwrap();
        assert_eq!(scope.state().await, WorkerState::Activated);
    }

    #[tokio::test]
    async fn test_failed_install_is_redundant_and_retryable() {
        let (mut scope, _, _) = scope();
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        scope.on_install(move |event| {
            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            event.wait_until(async move {
                if attempt == 0 { Err(Error::Network("offline".into())) } else { Ok(()) }
            });
        });

        assert!(scope.install().await.is_err());
        assert_eq!(scope.state().await, WorkerState::Redundant);
        assert!(matches!(scope.activate().await, Err(Error::InvalidState { .. })));

        scope.install().await.unwrap();
        assert_eq!(scope.state().await, WorkerState::Installed);
    }

    #[tokio::test]
    async fn test_restore_skips_install_handlers() {
        let (mut scope, _, clients) = scope();
        clients.open_controlled(request("/").url, scope.id() + 1000).await;
        let installs = Arc::new(AtomicUsize::new(0));
        let counter = installs.clone();
        scope.on_install(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        scope.restore().await.unwrap();
        assert_eq!(scope.state().await, WorkerState::Installed);
        assert!(!scope.is_waiting().await);

        scope.activate().await.unwrap();
        assert_eq!(scope.state().await, WorkerState::Activated);
        assert_eq!(installs.load(Ordering::SeqCst), 0);
        assert!(matches!(scope.restore().await, Err(Error::InvalidState { .. })));
    }

    #[tokio::test]
    async fn test_waits_for_old_clients_without_skip_waiting() {
        let (scope, _, clients) = scope();
        clients.open_controlled(request("/").url, scope.id() + 1000).await;

        let state = scope.start().await.unwrap();
        assert_eq!(state, WorkerState::Installed);
        assert!(scope.is_waiting().await);
        assert!(scope.activate().await.is_err());
    }

    #[tokio::test]
    async fn test_skip_waiting_activates_immediately() {
        let (mut scope, _, clients) = scope();
        clients.open_controlled(request("/").url, scope.id() + 1000).await;
        scope.on_install(|event| event.skip_waiting());

        let state = scope.start().await.unwrap();
        assert_eq!(state, WorkerState::Activated);
    }

    #[tokio::test]
    async fn test_activate_task_failure_does_not_block_activation() {
        let (mut scope, _, _) = scope();
        scope.on_activate(|event| event.wait_until(async { Err(Error::Network("boom".into())) }));

        scope.install().await.unwrap();
        scope.activate().await.unwrap();
        assert_eq!(scope.state().await, WorkerState::Activated);
    }

    #[tokio::test]
    async fn test_fetch_before_activation_passes_through() {
        let (mut scope, network, _) = scope();
        scope.on_fetch(|event| {
            event.respond_with(async { Ok(Routed::new(Response::new(200, "handled"), ResponseSource::Cache)) })
        });

        let routed = scope.fetch(request("/login")).await.unwrap();
        assert_eq!(routed.source, ResponseSource::Network);
        assert_eq!(routed.response.text(), "/login");
        assert_eq!(network.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_first_respond_with_wins() {
        let (mut scope, network, _) = scope();
        scope.on_fetch(|event| {
            event.respond_with(async { Ok(Routed::new(Response::new(200, "first"), ResponseSource::Cache)) })
        });
        scope.on_fetch(|event| {
            event.respond_with(async { Ok(Routed::new(Response::new(200, "second"), ResponseSource::Cache)) })
        });
        scope.start().await.unwrap();

        let routed = scope.fetch(request("/")).await.unwrap();
        assert_eq!(routed.response.text(), "first");
        assert_eq!(network.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fetch_without_response_uses_network() {
        let (mut scope, network, _) = scope();
        scope.on_fetch(|_| {});
        scope.start().await.unwrap();

        let routed = scope.fetch(request("/static/logo.png")).await.unwrap();
        assert_eq!(routed.source, ResponseSource::Network);
        assert_eq!(network.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fetch_waits_for_extended_tasks() {
        let (mut scope, _, _) = scope();
        let done = Arc::new(AtomicUsize::new(0));
        let flag = done.clone();
        scope.on_fetch(move |event| {
            let flag = flag.clone();
            event.wait_until(async move {
                tokio::task::yield_now().await;
                flag.store(1, Ordering::SeqCst);
                Ok(())
            });
        });
        scope.start().await.unwrap();

        scope.fetch(request("/")).await.unwrap();
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }
}
