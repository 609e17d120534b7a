#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use flixdb_core::config::{CacheSettings, GenerationSettings, HelpSettings, SearchSettings, TimeoutSettings};
use flixdb_core::data_processor::DataProcessor;
use flixdb_core::traits::{CacheBackend, Embedder, Generator, VectorStore};
use flixdb_core::types::{
    CacheEntry, DocId, Document, Embedding, Filter, Generation, IndexSchema, Prompt, TokenUsage, VectorHit,
};
use flixdb_core::{Error, Result};
use flixdb_embed::HashingEmbedder;
use flixdb_rag::{
    GuardrailPipeline, HelpCenter, MemoryCacheBackend, PiiDetector, RouterTopic, SemanticCache, SemanticRouter,
};
use flixdb_retrieval::{DocumentIndex, RetrievalEngine};
use flixdb_text::TantivyIndexer;
use flixdb_vector::FlatIndex;

pub const DIM: usize = 384;

pub fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).ancestors().nth(2).unwrap().join("test_data").join(name)
}

/// Generator double returning a fixed answer.
pub struct ScriptedGenerator {
    answer: String,
    delay: Duration,
    fail: bool,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn answering(answer: &str) -> Self {
        Self { answer: answer.to_string(), delay: Duration::ZERO, fail: false, calls: AtomicUsize::new(0) }
    }

    pub fn failing() -> Self {
        Self { fail: true, ..Self::answering("") }
    }

    pub fn slow(delay: Duration) -> Self {
        Self { delay, ..Self::answering("late answer") }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    fn model_id(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, _prompt: &Prompt) -> Result<Generation> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(Error::generation("upstream returned 500"));
        }
        Ok(Generation {
            text: self.answer.clone(),
            usage: Some(TokenUsage { prompt_tokens: 120, completion_tokens: 30, total_tokens: 150 }),
        })
    }
}

/// Flat store that counts vector searches.
pub struct CountingVectors {
    inner: FlatIndex,
    searches: AtomicUsize,
}

impl CountingVectors {
    pub fn new() -> Self {
        Self { inner: FlatIndex::new(DIM), searches: AtomicUsize::new(0) }
    }

    pub fn searches(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VectorStore for CountingVectors {
    async fn upsert(&self, docs: &[Document]) -> Result<()> {
        self.inner.upsert(docs).await
    }
    async fn knn(&self, query: &[f32], k: usize, filter: &Filter) -> Result<Vec<VectorHit>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        self.inner.knn(query, k, filter).await
    }
    async fn distances(&self, query: &[f32], ids: &[DocId]) -> Result<HashMap<DocId, f32>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        self.inner.distances(query, ids).await
    }
    async fn fetch(&self, ids: &[DocId]) -> Result<Vec<Document>> {
        self.inner.fetch(ids).await
    }
    async fn count(&self) -> Result<usize> {
        self.inner.count().await
    }
    async fn clear(&self) -> Result<()> {
        self.inner.clear().await
    }
}

/// Cache backend whose every call fails.
pub struct DownCache;

#[async_trait]
impl CacheBackend for DownCache {
    async fn nearest(&self, _query: &[f32]) -> Result<Option<(CacheEntry, f32)>> {
        Err(Error::index("connection refused"))
    }
    async fn upsert(&self, _entry: CacheEntry) -> Result<()> {
        Err(Error::index("connection refused"))
    }
    async fn evict_if_expired(&self, _id: &str, _now: DateTime<Utc>) -> Result<bool> {
        Err(Error::index("connection refused"))
    }
    async fn clear(&self) -> Result<usize> {
        Err(Error::index("connection refused"))
    }
    async fn count(&self) -> Result<usize> {
        Err(Error::index("connection refused"))
    }
    async fn entries(&self) -> Result<Vec<CacheEntry>> {
        Err(Error::index("connection refused"))
    }
}

/// Embedder with a fixed text-to-vector table.
pub struct StaticEmbedder {
    dim: usize,
    table: HashMap<String, Embedding>,
}

impl StaticEmbedder {
    pub fn new(entries: &[(&str, Vec<f32>)]) -> Self {
        let dim = entries.first().map_or(0, |(_, v)| v.len());
        Self { dim, table: entries.iter().map(|(k, v)| (k.to_string(), v.clone())).collect() }
    }
}

#[async_trait]
impl Embedder for StaticEmbedder {
    fn model_id(&self) -> &str {
        "static"
    }
    fn dim(&self) -> usize {
        self.dim
    }
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        texts
            .iter()
            .map(|t| self.table.get(t).cloned().ok_or_else(|| Error::embedding(format!("no vector for {t:?}"))))
            .collect()
    }
}

pub struct Harness {
    pub help: HelpCenter,
    pub generator: Arc<ScriptedGenerator>,
    pub vectors: Arc<CountingVectors>,
    pub cache: Arc<SemanticCache>,
}

impl Harness {
    pub async fn cached_entries(&self) -> Vec<CacheEntry> {
        self.cache.entries().await.unwrap()
    }
}

pub async fn harness(generator: ScriptedGenerator) -> Harness {
    harness_with(generator, Arc::new(MemoryCacheBackend::new()), TimeoutSettings::default(), true).await
}

pub async fn harness_with(
    generator: ScriptedGenerator,
    backend: Arc<dyn CacheBackend>,
    timeouts: TimeoutSettings,
    ingest: bool,
) -> Harness {
    let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(DIM));
    let schema = IndexSchema::help_articles(DIM);
    let vectors = Arc::new(CountingVectors::new());
    let text = Arc::new(TantivyIndexer::in_memory().unwrap());
    let index = DocumentIndex::new(schema.clone(), embedder.clone(), vectors.clone(), text).unwrap();
    if ingest {
        let docs = DataProcessor::new(schema).load_articles(&fixture("help_articles.json")).unwrap();
        index.ingest(&docs).await.unwrap();
    }
    let engine = Arc::new(RetrievalEngine::new(Arc::new(index), SearchSettings::default(), &timeouts));

    let router =
        SemanticRouter::build(vec![RouterTopic::streamflix_support(0.5)], embedder.clone(), Duration::from_secs(5))
            .await
            .unwrap();
    let guardrails = Arc::new(GuardrailPipeline::new(router, PiiDetector::new().unwrap()));
    let cache = Arc::new(SemanticCache::new(backend, embedder, &CacheSettings::default()).unwrap());
    let generator = Arc::new(generator);

    let help = HelpCenter::new(
        engine,
        guardrails,
        cache.clone(),
        generator.clone(),
        HelpSettings::default(),
        GenerationSettings::default(),
        &timeouts,
    );
    Harness { help, generator, vectors, cache }
}
