//! Semantic cache interface.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use haven_types::envelope::ResponseEnvelope;
use haven_types::error::Result;

/// A cached response similar to the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheHit {
    pub content: String,
    /// Similarity between the query and the cached one, 0.0--1.0.
    pub confidence: f64,
    /// Target that originally produced the content.
    pub source_target: String,
}

/// Similarity cache consulted before routing.
#[async_trait]
pub trait SemanticCache: Send + Sync {
    async fn find_similar(&self, query: &str, user_id: &str) -> Result<Option<CacheHit>>;

    async fn store(
        &self,
        query: &str,
        response: &ResponseEnvelope,
        user_id: &str,
        confidence: f64,
    ) -> Result<()>;
}

/// Cache that never hits.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCache;

#[async_trait]
impl SemanticCache for NoCache {
    async fn find_similar(&self, _query: &str, _user_id: &str) -> Result<Option<CacheHit>> {
        Ok(None)
    }

    async fn store(
        &self,
        _query: &str,
        _response: &ResponseEnvelope,
        _user_id: &str,
        _confidence: f64,
    ) -> Result<()> {
        Ok(())
    }
}

type CacheKey = (String, String);

#[derive(Default)]
struct Entries {
    map: HashMap<CacheKey, CacheHit>,
    order: VecDeque<CacheKey>,
}

/// Bounded exact-match cache keyed by user and normalized query text.
///
/// Matches are exact after lowercasing and collapsing whitespace, so a hit
/// always reports confidence 1.0. The oldest entry is evicted first.
pub struct InMemoryCache {
    entries: Mutex<Entries>,
    capacity: usize,
}

impl InMemoryCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(Entries::default()),
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for InMemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCache")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

fn normalize(query: &str) -> String {
    query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[async_trait]
impl SemanticCache for InMemoryCache {
    async fn find_similar(&self, query: &str, user_id: &str) -> Result<Option<CacheHit>> {
        let key = (user_id.to_string(), normalize(query));
        Ok(self.entries.lock().map.get(&key).map(|hit| CacheHit {
            confidence: 1.0,
            ..hit.clone()
        }))
    }

    async fn store(
        &self,
        query: &str,
        response: &ResponseEnvelope,
        user_id: &str,
        confidence: f64,
    ) -> Result<()> {
        let key = (user_id.to_string(), normalize(query));
        let hit = CacheHit {
            content: response.text.clone(),
            confidence,
            source_target: response.target_id.clone(),
        };
        let mut entries = self.entries.lock();
        if entries.map.insert(key.clone(), hit).is_none() {
            entries.order.push_back(key);
            while entries.order.len() > self.capacity {
                if let Some(oldest) = entries.order.pop_front() {
                    entries.map.remove(&oldest);
                }
            }
        }
        Ok(())
    }
}
