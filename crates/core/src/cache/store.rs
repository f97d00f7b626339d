//! The cache-store interface the agent is written against.
//!
//! A store holds named generations, each mapping request keys to
//! responses. The agent never keeps entries itself; it only refers to
//! generations by name.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{Error, Request, Response};

/// Summary of one cache generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct GenerationInfo {
    pub name: String,
    pub entries: u64,
    pub created_at: String,
}

/// Named, versioned request/response storage.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Create the generation if it does not exist yet.
    async fn open(&self, name: &str) -> Result<(), Error>;

    /// Store every pair in `name` atomically, creating the generation if
    /// needed. Either all entries are written or none are. A later entry
    /// with the same key replaces an earlier one.
    async fn put_all(&self, name: &str, entries: Vec<(Request, Response)>) -> Result<(), Error>;

    /// Store a single entry.
    async fn put(&self, name: &str, request: &Request, response: &Response) -> Result<(), Error> {
        self.put_all(name, vec![(request.clone(), response.clone())]).await
    }

    /// Look the request up in one generation.
    async fn match_in(&self, name: &str, request: &Request) -> Result<Option<Response>, Error>;

    /// Look the request up across all generations, oldest first.
    async fn match_any(&self, request: &Request) -> Result<Option<Response>, Error>;

    /// Generation names, oldest first.
    async fn keys(&self) -> Result<Vec<String>, Error>;

    async fn has(&self, name: &str) -> Result<bool, Error> {
        Ok(self.keys().await?.iter().any(|k| k == name))
    }

    /// Delete a generation and its entries. Returns whether it existed.
    async fn delete(&self, name: &str) -> Result<bool, Error>;

    /// Generations with entry counts, oldest first.
    async fn generations(&self) -> Result<Vec<GenerationInfo>, Error>;

    /// URLs stored in a generation, sorted.
    async fn entry_urls(&self, name: &str) -> Result<Vec<String>, Error>;
}

/// Whether `request` can be served from or written to the cache.
///
/// Only `GET` requests are matched; anything else always misses.
pub fn is_cacheable(request: &Request) -> bool {
    request.method.eq_ignore_ascii_case("GET")
}
