//! Versioned response cache.
//!
//! A cache holds named generations of request/response entries. Two
//! backends implement [`CacheStorage`]:
//!
//! - [`CacheDb`]: SQLite via tokio-rusqlite, WAL mode, versioned migrations
//! - [`MemoryCacheStorage`]: process-local, for tests and ephemeral use
//!
//! Entries are keyed by a SHA-256 of method and fragment-less URL.

pub mod connection;
pub mod generations;
pub mod hash;
pub mod memory;
pub mod migrations;
pub mod store;

pub use crate::Error;

pub use connection::CacheDb;
pub use memory::MemoryCacheStorage;
pub use store::{CacheStorage, GenerationInfo, is_cacheable};
