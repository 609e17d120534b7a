use async_trait::async_trait;
use std::collections::HashMap;
use std::hash::Hasher;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use twox_hash::XxHash64;

use flixdb_core::traits::Embedder;
use flixdb_core::types::Embedding;

struct Memo {
    entries: HashMap<u64, (Instant, Embedding)>,
}

/// Memoizes embeddings by text for a bounded time and entry count.
pub struct CachedEmbedder {
    inner: Arc<dyn Embedder>,
    ttl: Duration,
    capacity: usize,
    memo: Mutex<Memo>,
}

impl CachedEmbedder {
    pub fn new(inner: Arc<dyn Embedder>, ttl: Duration, capacity: usize) -> Self {
        Self { inner, ttl, capacity: capacity.max(1), memo: Mutex::new(Memo { entries: HashMap::new() }) }
    }

    fn key(text: &str) -> u64 {
        let mut hasher = XxHash64::with_seed(0);
        hasher.write(text.as_bytes());
        hasher.finish()
    }

    fn get(&self, key: u64) -> Option<Embedding> {
        let memo = self.memo.lock().unwrap_or_else(|p| p.into_inner());
        memo.entries.get(&key).filter(|(at, _)| at.elapsed() < self.ttl).map(|(_, v)| v.clone())
    }

    fn put(&self, key: u64, value: Embedding) {
        let mut memo = self.memo.lock().unwrap_or_else(|p| p.into_inner());
        if memo.entries.len() >= self.capacity {
            let ttl = self.ttl;
            memo.entries.retain(|_, (at, _)| at.elapsed() < ttl);
        }
        if memo.entries.len() >= self.capacity {
            if let Some(oldest) = memo.entries.iter().min_by_key(|(_, (at, _))| *at).map(|(k, _)| *k) {
                memo.entries.remove(&oldest);
            }
        }
        memo.entries.insert(key, (Instant::now(), value));
    }

    pub fn len(&self) -> usize {
        self.memo.lock().unwrap_or_else(|p| p.into_inner()).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Embedder for CachedEmbedder {
    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    fn dim(&self) -> usize {
        self.inner.dim()
    }

    async fn embed_batch(&self, texts: &[String]) -> flixdb_core::Result<Vec<Embedding>> {
        let keys: Vec<u64> = texts.iter().map(|t| Self::key(t)).collect();
        let mut out: Vec<Option<Embedding>> = keys.iter().map(|k| self.get(*k)).collect();
        let missing: Vec<usize> = (0..texts.len()).filter(|i| out[*i].is_none()).collect();
        if !missing.is_empty() {
            let batch: Vec<String> = missing.iter().map(|i| texts[*i].clone()).collect();
            let fresh = self.inner.embed_batch(&batch).await?;
            if fresh.len() != batch.len() {
                return Err(flixdb_core::Error::embedding(format!(
                    "embedder returned {} vectors for {} texts",
                    fresh.len(),
                    batch.len()
                )));
            }
            for (i, v) in missing.into_iter().zip(fresh) {
                self.put(keys[i], v.clone());
                out[i] = Some(v);
            }
        }
        Ok(out.into_iter().flatten().collect())
    }
}
