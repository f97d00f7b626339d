//! In-process `CacheStorage`, used by tests and by embedders that do not
//! need entries to survive a restart.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::hash::{compute_request_key, normalize_url};
use super::store::{CacheStorage, GenerationInfo, is_cacheable};
use crate::{Error, Request, Response};

#[derive(Debug, Clone)]
struct StoredEntry {
    url: String,
    response: Response,
}

#[derive(Debug, Clone)]
struct Generation {
    name: String,
    created_at: String,
    entries: HashMap<String, StoredEntry>,
}

impl Generation {
    fn new(name: &str) -> Self {
        Self { name: name.to_string(), created_at: chrono::Utc::now().to_rfc3339(), entries: HashMap::new() }
    }
}

/// Cache storage held in memory.
///
/// Generations live in a `Vec` so enumeration keeps creation order.
/// Clones share the same underlying store.
#[derive(Debug, Clone, Default)]
pub struct MemoryCacheStorage {
    generations: Arc<RwLock<Vec<Generation>>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn open(&self, name: &str) -> Result<(), Error> {
        let mut generations = self.generations.write().await;
        if !generations.iter().any(|g| g.name == name) {
            generations.push(Generation::new(name));
        }
        Ok(())
    }

    async fn put_all(&self, name: &str, entries: Vec<(Request, Response)>) -> Result<(), Error> {
        if let Some((request, _)) = entries.iter().find(|(request, _)| !is_cacheable(request)) {
            return Err(Error::InvalidInput(format!("cannot cache {} {}", request.method, request.url)));
        }

        let mut generations = self.generations.write().await;
        let index = match generations.iter().position(|g| g.name == name) {
            Some(index) => index,
            None => {
                generations.push(Generation::new(name));
                generations.len() - 1
            }
        };

        let generation = &mut generations[index];
        for (request, response) in entries {
            let key = compute_request_key(&request.method, &request.url);
            generation
                .entries
                .insert(key, StoredEntry { url: normalize_url(&request.url), response });
        }
        Ok(())
    }

    async fn match_in(&self, name: &str, request: &Request) -> Result<Option<Response>, Error> {
        if !is_cacheable(request) {
            return Ok(None);
        }
        let key = compute_request_key(&request.method, &request.url);
        let generations = self.generations.read().await;
        Ok(generations
            .iter()
            .find(|g| g.name == name)
            .and_then(|g| g.entries.get(&key))
            .map(|e| e.response.clone()))
    }

    async fn match_any(&self, request: &Request) -> Result<Option<Response>, Error> {
        if !is_cacheable(request) {
            return Ok(None);
        }
        let key = compute_request_key(&request.method, &request.url);
        let generations = self.generations.read().await;
        Ok(generations
            .iter()
            .find_map(|g| g.entries.get(&key))
            .map(|e| e.response.clone()))
    }

    async fn keys(&self) -> Result<Vec<String>, Error> {
        let generations = self.generations.read().await;
        Ok(generations.iter().map(|g| g.name.clone()).collect())
    }

    async fn delete(&self, name: &str) -> Result<bool, Error> {
        let mut generations = self.generations.write().await;
        let before = generations.len();
        generations.retain(|g| g.name != name);
        Ok(generations.len() < before)
    }

    async fn generations(&self) -> Result<Vec<GenerationInfo>, Error> {
        let generations = self.generations.read().await;
        Ok(generations
            .iter()
            .map(|g| GenerationInfo {
                name: g.name.clone(),
                entries: g.entries.len() as u64,
                created_at: g.created_at.clone(),
            })
            .collect())
    }

    async fn entry_urls(&self, name: &str) -> Result<Vec<String>, Error> {
        let generations = self.generations.read().await;
        let mut urls: Vec<String> = generations
            .iter()
            .find(|g| g.name == name)
            .map(|g| g.entries.values().map(|e| e.url.clone()).collect())
            .unwrap_or_default();
        urls.sort();
        Ok(urls)
    }
}
