#![cfg(feature = "lance")]

use chrono::{Duration, TimeZone, Utc};
use flixdb_core::traits::{CacheBackend, VectorStore};
use flixdb_core::types::{CacheEntry, Document, Filter, IndexSchema};
use flixdb_vector::{LanceCacheBackend, LanceVectorStore};
use tempfile::TempDir;

fn schema() -> IndexSchema {
    IndexSchema::movies(3)
}

#[tokio::test]
async fn lance_store_prefilters_and_replaces() {
    let tmp = TempDir::new().unwrap();
    let uri = tmp.path().to_string_lossy().to_string();
    let store = LanceVectorStore::open(&uri, schema()).await.unwrap();
    let docs = vec![
        Document::new("movie:1", "A", "a")
            .with_embedding(vec![1.0, 0.0, 0.0])
            .with_tag("genre", "romance")
            .with_numeric("rating", 8.0),
        Document::new("movie:2", "B", "b")
            .with_embedding(vec![0.9, 0.1, 0.0])
            .with_tag("genre", "action")
            .with_numeric("rating", 9.0),
        Document::new("movie:3", "C", "c").with_tag("genre", "romance").with_numeric("rating", 9.0),
    ];
    store.upsert(&docs).await.unwrap();
    store.upsert(&docs[..1]).await.unwrap();
    assert_eq!(store.count().await.unwrap(), 3);

    let hits = store.knn(&[1.0, 0.0, 0.0], 5, &Filter::none().tag_eq("genre", "romance")).await.unwrap();
    assert_eq!(hits.len(), 1, "documents without embeddings never rank");
    assert_eq!(hits[0].document.id, "movie:1");
    assert_eq!(hits[0].document.numeric("rating"), Some(8.0));
}

#[tokio::test]
async fn lance_cache_nearest_and_expiry() {
    let tmp = TempDir::new().unwrap();
    let uri = tmp.path().to_string_lossy().to_string();
    let cache = LanceCacheBackend::open(&uri, "llmcache", 3).await.unwrap();
    let entry = CacheEntry {
        id: "k1".into(),
        prompt: "reset password".into(),
        prompt_embedding: vec![1.0, 0.0, 0.0],
        response: "Use the link.".into(),
        created_at: Utc::now() - Duration::seconds(120),
        ttl_secs: 60,
    };
    cache.upsert(entry.clone()).await.unwrap();
    cache.upsert(entry).await.unwrap();
    assert_eq!(cache.count().await.unwrap(), 1);

    let (found, distance) = cache.nearest(&[1.0, 0.0, 0.0]).await.unwrap().unwrap();
    assert_eq!(found.response, "Use the link.");
    assert!(distance.abs() < 1e-4);

    assert!(cache.evict_if_expired("k1", Utc::now()).await.unwrap());
    assert_eq!(cache.count().await.unwrap(), 0);
}

#[tokio::test]
async fn lance_eviction_spares_refreshed_entries() {
    let tmp = TempDir::new().unwrap();
    let uri = tmp.path().to_string_lossy().to_string();
    let cache = LanceCacheBackend::open(&uri, "llmcache", 3).await.unwrap();
    let stale = CacheEntry {
        id: "k1".into(),
        prompt: "reset password".into(),
        prompt_embedding: vec![1.0, 0.0, 0.0],
        response: "Old answer.".into(),
        created_at: Utc::now() - Duration::seconds(120),
        ttl_secs: 60,
    };
    cache.upsert(stale.clone()).await.unwrap();
    let (seen, _) = cache.nearest(&[1.0, 0.0, 0.0]).await.unwrap().unwrap();
    let now = Utc::now();
    assert!(seen.is_expired_at(now));

    // Same prompt stored again between the read and the eviction.
    let fresh = CacheEntry { response: "New answer.".into(), created_at: Utc::now(), ..stale };
    cache.upsert(fresh).await.unwrap();

    assert!(!cache.evict_if_expired("k1", now).await.unwrap());
    let entries = cache.entries().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].response, "New answer.");
}

#[tokio::test]
async fn lance_expiry_instant_is_inclusive() {
    let tmp = TempDir::new().unwrap();
    let uri = tmp.path().to_string_lossy().to_string();
    let cache = LanceCacheBackend::open(&uri, "llmcache", 3).await.unwrap();
    let created_at = Utc.timestamp_millis_opt(1_700_000_000_250).unwrap();
    let entry = CacheEntry {
        id: "k2".into(),
        prompt: "cancel plan".into(),
        prompt_embedding: vec![0.0, 1.0, 0.0],
        response: "Open account settings.".into(),
        created_at,
        ttl_secs: 60,
    };
    cache.upsert(entry).await.unwrap();

    let just_before = created_at + Duration::seconds(60) - Duration::milliseconds(1);
    assert!(!cache.evict_if_expired("k2", just_before).await.unwrap());
    assert_eq!(cache.count().await.unwrap(), 1);

    assert!(cache.evict_if_expired("k2", created_at + Duration::seconds(60)).await.unwrap());
    assert_eq!(cache.count().await.unwrap(), 0);
    assert!(!cache.evict_if_expired("missing", created_at).await.unwrap());
}
