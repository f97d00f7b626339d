//! Worker lifecycle: typed event dispatch, extendable events and client
//! control.

pub mod clients;
pub mod events;
pub mod scope;

pub use clients::{ClientRegistry, Clients, WorkerClients};
pub use events::{ExtendableEvent, FetchEvent, ResponseSource, Routed};
pub use scope::{WorkerScope, WorkerState};
