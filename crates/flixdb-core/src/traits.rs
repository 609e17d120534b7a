use crate::error::Result;
use crate::types::{CacheEntry, DocId, Document, Embedding, Filter, Generation, Prompt, SearchHit, VectorHit};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Maps text to a fixed-dimension vector. The same model must embed both
/// documents and queries.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn model_id(&self) -> &str;
    fn dim(&self) -> usize;
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>>;

    async fn embed(&self, text: &str) -> Result<Embedding> {
        let mut out = self.embed_batch(&[text.to_string()]).await?;
        out.pop().ok_or_else(|| crate::Error::embedding("embedder returned no vectors"))
    }
}

/// Full-text side of an index (BM25 over title and body).
pub trait TextIndexer: Send + Sync {
    fn index(&self, docs: &[Document]) -> Result<()>;
    fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>>;
    /// BM25 scores of `query` for the given ids only; ids that do not match
    /// the query are absent from the map.
    fn score_ids(&self, query: &str, ids: &[DocId]) -> Result<HashMap<DocId, f32>>;
    fn clear(&self) -> Result<()>;
    fn count(&self) -> Result<usize>;
}

/// Document storage with exact cosine k-NN. Filters are applied before
/// ranking, never after.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn upsert(&self, docs: &[Document]) -> Result<()>;
    /// Nearest documents carrying an embedding and matching `filter`, sorted
    /// by ascending distance, ties by id.
    async fn knn(&self, query: &[f32], k: usize, filter: &Filter) -> Result<Vec<VectorHit>>;
    /// Distances to the listed documents. Ids without a stored embedding are
    /// absent from the map.
    async fn distances(&self, query: &[f32], ids: &[DocId]) -> Result<HashMap<DocId, f32>>;
    async fn fetch(&self, ids: &[DocId]) -> Result<Vec<Document>>;
    async fn count(&self) -> Result<usize>;
    async fn clear(&self) -> Result<()>;
}

/// Storage for semantic-cache entries.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Single nearest entry by cosine distance, expired or not.
    async fn nearest(&self, query: &[f32]) -> Result<Option<(CacheEntry, f32)>>;
    async fn upsert(&self, entry: CacheEntry) -> Result<()>;
    /// Removes the entry only if it is expired at `now`; returns whether it
    /// was removed.
    async fn evict_if_expired(&self, id: &str, now: DateTime<Utc>) -> Result<bool>;
    async fn clear(&self) -> Result<usize>;
    async fn count(&self) -> Result<usize>;
    async fn entries(&self) -> Result<Vec<CacheEntry>>;
}

/// Chat-completion style text generator.
#[async_trait]
pub trait Generator: Send + Sync {
    fn model_id(&self) -> &str;
    async fn generate(&self, prompt: &Prompt) -> Result<Generation>;
}
