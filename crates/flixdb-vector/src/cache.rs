//! Lance-backed semantic-cache table.
//!
//! One row per cached prompt keyed by `id`; nearest-entry lookups are cosine
//! vector searches, expiry is evaluated by the caller against `created_at`.
use arrow_array::{ArrayRef, Int64Array, RecordBatch, RecordBatchIterator, StringArray, TimestampMillisecondArray};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, DistanceType, Table};
use std::sync::Arc;

use flixdb_core::traits::CacheBackend;
use flixdb_core::types::CacheEntry;
use flixdb_core::{Error, Result};

use crate::schema::{build_cache_schema, dim_i32};
use crate::table::{
    ensure_table, f32_col, i64_col, open_db, quote, string_col, timestamp_ms_col, vector_col, vectors_array,
};

pub struct LanceCacheBackend {
    db: Connection,
    name: String,
    dim: usize,
}

impl LanceCacheBackend {
    pub async fn open(uri: &str, name: &str, dim: usize) -> Result<Self> {
        let db = open_db(uri).await.map_err(Error::cache)?;
        ensure_table(&db, name, build_cache_schema(dim)).await.map_err(Error::cache)?;
        Ok(Self { db, name: name.to_string(), dim })
    }

    async fn table(&self) -> Result<Table> {
        self.db.open_table(&self.name).execute().await.map_err(Error::cache)
    }

    fn to_record_batch(&self, entry: &CacheEntry) -> Result<RecordBatch> {
        let columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from(vec![entry.id.clone()])),
            Arc::new(StringArray::from(vec![entry.prompt.clone()])),
            Arc::new(StringArray::from(vec![entry.response.clone()])),
            Arc::new(TimestampMillisecondArray::from(vec![entry.created_at.timestamp_millis()])),
            Arc::new(Int64Array::from(vec![i64::try_from(entry.ttl_secs).unwrap_or(i64::MAX)])),
            Arc::new(vectors_array(vec![Some(entry.prompt_embedding.clone())], dim_i32(self.dim))),
        ];
        RecordBatch::try_new(build_cache_schema(self.dim), columns).map_err(Error::cache)
    }

    fn from_batch(batch: &RecordBatch, row: usize) -> Result<CacheEntry> {
        let created_ms = timestamp_ms_col(batch, "created_at", row)?;
        let created_at: DateTime<Utc> = Utc
            .timestamp_millis_opt(created_ms)
            .single()
            .ok_or_else(|| Error::cache(format!("invalid created_at {created_ms}")))?;
        Ok(CacheEntry {
            id: string_col(batch, "id", row)?.unwrap_or_default(),
            prompt: string_col(batch, "prompt", row)?.unwrap_or_default(),
            response: string_col(batch, "response", row)?.unwrap_or_default(),
            created_at,
            ttl_secs: u64::try_from(i64_col(batch, "ttl_secs", row)?).unwrap_or(0),
            prompt_embedding: vector_col(batch, row)?.unwrap_or_default(),
        })
    }

    async fn scan(&self, predicate: Option<String>) -> Result<Vec<CacheEntry>> {
        let table = self.table().await?;
        let mut query = table.query();
        if let Some(p) = predicate {
            query = query.only_if(p);
        }
        let mut stream = query.execute().await.map_err(Error::cache)?;
        let mut out = Vec::new();
        while let Some(batch) = stream.try_next().await.map_err(Error::cache)? {
            for row in 0..batch.num_rows() {
                out.push(Self::from_batch(&batch, row)?);
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl CacheBackend for LanceCacheBackend {
    async fn nearest(&self, query: &[f32]) -> Result<Option<(CacheEntry, f32)>> {
        let table = self.table().await?;
        let mut stream = table
            .vector_search(query.to_vec())
            .map_err(Error::cache)?
            .distance_type(DistanceType::Cosine)
            .limit(1)
            .execute()
            .await
            .map_err(Error::cache)?;
        while let Some(batch) = stream.try_next().await.map_err(Error::cache)? {
            if batch.num_rows() > 0 {
                let distance = f32_col(&batch, "_distance", 0)?;
                return Ok(Some((Self::from_batch(&batch, 0)?, distance)));
            }
        }
        Ok(None)
    }

    async fn upsert(&self, entry: CacheEntry) -> Result<()> {
        let batch = self.to_record_batch(&entry)?;
        let schema = batch.schema();
        let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
        let table = self.table().await?;
        let mut mi = table.merge_insert(&["id"]);
        mi.when_matched_update_all(None).when_not_matched_insert_all();
        mi.execute(reader).await.map_err(Error::cache)?;
        Ok(())
    }

    async fn evict_if_expired(&self, id: &str, now: DateTime<Utc>) -> Result<bool> {
        let Some(current) = self.scan(Some(format!("id = {}", quote(id)))).await?.into_iter().next() else {
            return Ok(false);
        };
        let Some(predicate) = expired_predicate(&current, now) else {
            return Ok(false);
        };
        // The expiry test is part of the delete itself, so a row refreshed
        // after the scan no longer matches and survives.
        let table = self.table().await?;
        if table.count_rows(Some(predicate.clone())).await.map_err(Error::cache)? == 0 {
            return Ok(false);
        }
        table.delete(&predicate).await.map_err(Error::cache)?;
        Ok(true)
    }

    async fn clear(&self) -> Result<usize> {
        let table = self.table().await?;
        let n = table.count_rows(None).await.map_err(Error::cache)?;
        table.delete("true").await.map_err(Error::cache)?;
        Ok(n)
    }

    async fn count(&self) -> Result<usize> {
        self.table().await?.count_rows(None).await.map_err(Error::cache)
    }

    async fn entries(&self) -> Result<Vec<CacheEntry>> {
        self.scan(None).await
    }
}

/// Rows for `entry.id` with the same ttl whose `created_at + ttl <= now`.
/// `None` when no representable instant can be expired yet.
fn expired_predicate(entry: &CacheEntry, now: DateTime<Utc>) -> Option<String> {
    let ttl_secs = i64::try_from(entry.ttl_secs).ok()?;
    let cutoff = now.checked_sub_signed(chrono::Duration::try_seconds(ttl_secs)?)?;
    Some(format!(
        "id = {} AND ttl_secs = {} AND created_at <= timestamp '{}'",
        quote(&entry.id),
        ttl_secs,
        cutoff.format("%Y-%m-%d %H:%M:%S%.3f")
    ))
}
