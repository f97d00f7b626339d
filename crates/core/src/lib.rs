//! Core types and shared functionality for shelter.
//!
//! This crate provides:
//! - Request/response message types shared by the store and the agent
//! - The `CacheStorage` trait with SQLite and in-memory backends
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;
pub mod http;

pub use cache::{CacheDb, CacheStorage, GenerationInfo, MemoryCacheStorage};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
pub use http::{Request, RequestMode, Response};
