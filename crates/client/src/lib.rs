//! Client side of shelter.
//!
//! This crate provides the network layer, the worker lifecycle runtime and
//! the offline cache proxy that runs inside it.

pub mod fetch;
pub mod proxy;
pub mod worker;

pub use fetch::{FetchConfig, HttpNetwork, Network, UrlError, resolve};
pub use proxy::{ActivateReport, InstallReport, OfflineProxy, ProxyConfig, Route};
pub use worker::{
    ClientRegistry, Clients, ExtendableEvent, FetchEvent, ResponseSource, Routed, WorkerClients, WorkerScope,
    WorkerState,
};
