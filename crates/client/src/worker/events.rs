//! Lifecycle and fetch events handed to registered handlers.
//!
//! Handlers are synchronous closures. Asynchronous work is attached to
//! the event with [`ExtendableEvent::wait_until`]; the dispatcher awaits
//! every attached future before it treats the event as handled.

use std::future::Future;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use shelter_core::{Error, Request, Response};

use super::clients::WorkerClients;

/// Work attached to an event via `wait_until`.
pub(crate) type PendingTask = BoxFuture<'static, Result<(), Error>>;

/// Response supplied via `respond_with`.
pub(crate) type PendingResponse = BoxFuture<'static, Result<Routed, Error>>;

/// Where a delivered response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    /// Live network response.
    Network,
    /// Stored entry matching the request.
    Cache,
    /// Synthesized `{"offline": true}` marker.
    Offline,
    /// Cached root document served for a failed navigation.
    Fallback,
}

impl std::fmt::Display for ResponseSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseSource::Network => write!(f, "network"),
            ResponseSource::Cache => write!(f, "cache"),
            ResponseSource::Offline => write!(f, "offline"),
            ResponseSource::Fallback => write!(f, "fallback"),
        }
    }
}

/// A response together with its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routed {
    pub response: Response,
    pub source: ResponseSource,
}

impl Routed {
    pub fn new(response: Response, source: ResponseSource) -> Self {
        Self { response, source }
    }
}

/// Event dispatched for `install` and `activate`.
pub struct ExtendableEvent {
    clients: WorkerClients,
    pending: Vec<PendingTask>,
    skip_waiting: bool,
}

impl ExtendableEvent {
    pub(crate) fn new(clients: WorkerClients) -> Self {
        Self { clients, pending: Vec::new(), skip_waiting: false }
    }

    /// Keep the event alive until `task` settles. A failing task fails
    /// the event.
    pub fn wait_until<F>(&mut self, task: F)
    where
        F: Future<Output = Result<(), Error>> + Send + 'static,
    {
        self.pending.push(task.boxed());
    }

    /// Ask to activate as soon as install finishes instead of waiting
    /// for clients of the previous worker to close.
    pub fn skip_waiting(&mut self) {
        self.skip_waiting = true;
    }

    /// Handle on the clients of the worker this event belongs to.
    pub fn clients(&self) -> WorkerClients {
        self.clients.clone()
    }

    pub(crate) fn into_parts(self) -> (Vec<PendingTask>, bool) {
        (self.pending, self.skip_waiting)
    }
}

/// Event dispatched for every intercepted request.
pub struct FetchEvent {
    request: Request,
    pending: Vec<PendingTask>,
    response: Option<PendingResponse>,
}

impl FetchEvent {
    pub(crate) fn new(request: Request) -> Self {
        Self { request, pending: Vec::new(), response: None }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Supply the response. Only the first call takes effect.
    pub fn respond_with<F>(&mut self, response: F)
    where
        F: Future<Output = Result<Routed, Error>> + Send + 'static,
    {
        if self.response.is_some() {
            tracing::warn!(url = %self.request.url, "respond_with called twice, ignoring");
            return;
        }
        self.response = Some(response.boxed());
    }

    pub fn wait_until<F>(&mut self, task: F)
    where
        F: Future<Output = Result<(), Error>> + Send + 'static,
    {
        self.pending.push(task.boxed());
    }

    pub(crate) fn has_response(&self) -> bool {
        self.response.is_some()
    }

    pub(crate) fn into_parts(self) -> (Request, Option<PendingResponse>, Vec<PendingTask>) {
        (self.request, self.response, self.pending)
    }
}
