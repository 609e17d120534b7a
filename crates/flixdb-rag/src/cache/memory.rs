use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::RwLock;

use flixdb_core::math::cosine_distance;
use flixdb_core::traits::CacheBackend;
use flixdb_core::types::CacheEntry;
use flixdb_core::{Error, Result};

/// In-process cache table. Entries are keyed by id in an ordered map so that
/// nearest-entry ties resolve to the smallest id.
#[derive(Default)]
pub struct MemoryCacheBackend {
    entries: RwLock<BTreeMap<String, CacheEntry>>,
}

impl MemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, BTreeMap<String, CacheEntry>>> {
        self.entries.read().map_err(|_| Error::cache("cache lock poisoned"))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, BTreeMap<String, CacheEntry>>> {
        self.entries.write().map_err(|_| Error::cache("cache lock poisoned"))
    }
}

#[async_trait]
impl CacheBackend for MemoryCacheBackend {
    async fn nearest(&self, query: &[f32]) -> Result<Option<(CacheEntry, f32)>> {
        let entries = self.read()?;
        let mut best: Option<(&CacheEntry, f32)> = None;
        for e in entries.values() {
            let d = cosine_distance(query, &e.prompt_embedding);
            if best.map_or(true, |(_, bd)| d < bd) {
                best = Some((e, d));
            }
        }
        Ok(best.map(|(e, d)| (e.clone(), d)))
    }

    async fn upsert(&self, entry: CacheEntry) -> Result<()> {
        self.write()?.insert(entry.id.clone(), entry);
        Ok(())
    }

    // The expiry check and removal happen under one write lock.
    async fn evict_if_expired(&self, id: &str, now: DateTime<Utc>) -> Result<bool> {
        let mut entries = self.write()?;
        let expired = entries.get(id).is_some_and(|e| e.is_expired_at(now));
        if expired {
            entries.remove(id);
        }
        Ok(expired)
    }

    async fn clear(&self) -> Result<usize> {
        let mut entries = self.write()?;
        let n = entries.len();
        entries.clear();
        Ok(n)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }

    async fn entries(&self) -> Result<Vec<CacheEntry>> {
        Ok(self.read()?.values().cloned().collect())
    }
}
