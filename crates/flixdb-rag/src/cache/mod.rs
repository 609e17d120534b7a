//! Semantic response cache.
//!
//! Lookup is a k=1 nearest search over stored prompt embeddings. A hit needs
//! `distance <= distance_threshold` and an unexpired entry; an expired nearest
//! entry is a miss and is evicted on the spot.

pub mod memory;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use flixdb_core::config::CacheSettings;
use flixdb_core::deadline::bounded;
use flixdb_core::math::similarity;
use flixdb_core::traits::{CacheBackend, Embedder};
use flixdb_core::types::CacheEntry;
use flixdb_core::{Error, Result, Stage};

pub use memory::MemoryCacheBackend;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheHit {
    pub entry: CacheEntry,
    pub distance: f32,
    pub similarity: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub name: String,
    pub ttl: u64,
    pub distance_threshold: f32,
    pub num_entries: usize,
    pub status: String,
}

pub struct SemanticCache {
    backend: Arc<dyn CacheBackend>,
    embedder: Arc<dyn Embedder>,
    name: String,
    ttl_secs: u64,
    distance_threshold: f32,
    embed_timeout: Duration,
    timeout: Duration,
}

impl SemanticCache {
    pub fn new(backend: Arc<dyn CacheBackend>, embedder: Arc<dyn Embedder>, settings: &CacheSettings) -> Result<Self> {
        if !(0.0..=2.0).contains(&settings.distance_threshold) {
            return Err(Error::InvalidConfig(format!(
                "cache distance_threshold {} outside [0, 2]",
                settings.distance_threshold
            )));
        }
        Ok(Self {
            backend,
            embedder,
            name: settings.name.clone(),
            ttl_secs: settings.ttl_secs,
            distance_threshold: settings.distance_threshold,
            embed_timeout: Duration::from_secs(10),
            timeout: Duration::from_secs(10),
        })
    }

    pub fn with_timeouts(mut self, embed: Duration, backend: Duration) -> Self {
        self.embed_timeout = embed;
        self.timeout = backend;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn distance_threshold(&self) -> f32 {
        self.distance_threshold
    }

    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    /// Entry id for a prompt; storing the same prompt twice replaces the entry.
    pub fn entry_id(&self, prompt: &str) -> String {
        format!("{}:{}", self.name, blake3::hash(prompt.as_bytes()).to_hex())
    }

    pub async fn lookup(&self, prompt: &str) -> Result<Option<CacheHit>> {
        let embedding = self.embed(prompt).await?;
        self.lookup_embedded(&embedding).await
    }

    pub async fn lookup_embedded(&self, embedding: &[f32]) -> Result<Option<CacheHit>> {
        self.lookup_embedded_at(embedding, Utc::now()).await
    }

    pub async fn lookup_embedded_at(&self, embedding: &[f32], now: DateTime<Utc>) -> Result<Option<CacheHit>> {
        let nearest = bounded(Stage::CacheLookup, self.timeout, self.backend.nearest(embedding))
            .await
            .map_err(as_cache_error)?;
        let Some((entry, distance)) = nearest else {
            return Ok(None);
        };
        if entry.is_expired_at(now) {
            let evicted = bounded(Stage::CacheLookup, self.timeout, self.backend.evict_if_expired(&entry.id, now))
                .await
                .map_err(as_cache_error)?;
            tracing::debug!(id = %entry.id, evicted, "nearest cache entry expired");
            return Ok(None);
        }
        if distance > self.distance_threshold {
            tracing::debug!(distance, threshold = self.distance_threshold, "cache miss");
            return Ok(None);
        }
        tracing::info!(distance, "cache hit");
        Ok(Some(CacheHit { entry, distance, similarity: similarity(distance) }))
    }

    pub async fn store(&self, prompt: &str, response: &str) -> Result<CacheEntry> {
        let embedding = self.embed(prompt).await?;
        self.store_embedded(prompt, embedding, response).await
    }

    pub async fn store_embedded(&self, prompt: &str, embedding: Vec<f32>, response: &str) -> Result<CacheEntry> {
        let entry = CacheEntry {
            id: self.entry_id(prompt),
            prompt: prompt.to_string(),
            prompt_embedding: embedding,
            response: response.to_string(),
            created_at: Utc::now(),
            ttl_secs: self.ttl_secs,
        };
        bounded(Stage::CacheWrite, self.timeout, self.backend.upsert(entry.clone()))
            .await
            .map_err(|e| as_cache_error(e).at_stage(Stage::CacheWrite))?;
        tracing::debug!(id = %entry.id, "cache entry stored");
        Ok(entry)
    }

    pub async fn clear(&self) -> Result<usize> {
        let n = self.backend.clear().await.map_err(|e| as_cache_error(e).at_stage(Stage::CacheWrite))?;
        tracing::info!(cache = %self.name, removed = n, "cache cleared");
        Ok(n)
    }

    pub async fn entries(&self) -> Result<Vec<CacheEntry>> {
        self.backend.entries().await.map_err(as_cache_error)
    }

    /// Never fails; an unreachable backend reports status `unavailable`.
    pub async fn stats(&self) -> CacheStats {
        let (num_entries, status) = match self.backend.count().await {
            Ok(n) => (n, "active"),
            Err(e) => {
                tracing::warn!(error = %e, "cache stats unavailable");
                (0, "unavailable")
            }
        };
        CacheStats {
            name: self.name.clone(),
            ttl: self.ttl_secs,
            distance_threshold: self.distance_threshold,
            num_entries,
            status: status.to_string(),
        }
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        bounded(Stage::Embedding, self.embed_timeout, self.embedder.embed(text)).await
    }
}

// Timeouts keep their stage; everything else from the backend is a cache outage.
fn as_cache_error(e: Error) -> Error {
    match e {
        Error::Timeout { .. } | Error::CacheUnavailable { .. } => e,
        other => Error::cache(other),
    }
}
