//! Process setup shared by the binaries: tracing, stores and component wiring.

use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use flixdb_core::config::{expand_path, Settings};
use flixdb_core::data_processor::DataProcessor;
use flixdb_core::traits::{CacheBackend, Embedder, Generator, TextIndexer, VectorStore};
use flixdb_core::types::{Document, IndexSchema};
use flixdb_embed::get_default_embedder;
use flixdb_rag::{
    GuardrailPipeline, HelpCenter, MemoryCacheBackend, OpenAiGenerator, PiiDetector, RouterTopic, SemanticCache,
    SemanticRouter,
};
use flixdb_retrieval::{DocumentIndex, IngestReport, RetrievalEngine};
use flixdb_text::TantivyIndexer;
use flixdb_vector::FlatIndex;

const INGEST_CHUNK: usize = 32;

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(false).try_init();
}

/// Where indexes live. `InMemory` keeps everything in the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    Persistent,
    InMemory,
}

/// Fully wired movie search and help center.
pub struct AppContext {
    pub settings: Settings,
    pub movies: Arc<RetrievalEngine>,
    pub help: Arc<HelpCenter>,
}

impl AppContext {
    /// Configured embedder and generator over persistent stores.
    pub async fn from_settings(settings: Settings) -> anyhow::Result<Self> {
        let embedder = get_default_embedder(&settings.embedding).context("loading embedder")?;
        if settings.generation.api_key.is_none() {
            tracing::warn!(api_base = %settings.generation.api_base, "no generation API key configured");
        }
        let generator: Arc<dyn Generator> = Arc::new(OpenAiGenerator::new(&settings.generation)?);
        Self::assemble(settings, embedder, generator, Storage::Persistent).await
    }

    pub async fn assemble(
        settings: Settings,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        storage: Storage,
    ) -> anyhow::Result<Self> {
        let dim = settings.embedding.dim;
        let timeouts = &settings.timeouts;
        let embed_timeout = Duration::from_millis(timeouts.embedding_ms);

        let movie_schema = IndexSchema::movies(dim);
        let movie_index = DocumentIndex::new(
            movie_schema.clone(),
            embedder.clone(),
            open_vectors(&settings, storage, &movie_schema).await?,
            open_text(&settings, storage, &movie_schema)?,
        )?
        .with_embed_timeout(embed_timeout);
        let movies = Arc::new(RetrievalEngine::new(Arc::new(movie_index), settings.search.clone(), timeouts));

        let help_schema = IndexSchema::help_articles(dim);
        let help_index = DocumentIndex::new(
            help_schema.clone(),
            embedder.clone(),
            open_vectors(&settings, storage, &help_schema).await?,
            open_text(&settings, storage, &help_schema)?,
        )?
        .with_embed_timeout(embed_timeout);
        let help_engine = Arc::new(RetrievalEngine::new(Arc::new(help_index), settings.search.clone(), timeouts));

        let router = SemanticRouter::build(
            vec![RouterTopic::streamflix_support(settings.guardrail.distance_threshold)],
            embedder.clone(),
            embed_timeout,
        )
        .await?;
        let guardrails = Arc::new(GuardrailPipeline::new(router, PiiDetector::new()?));
        let cache = Arc::new(
            SemanticCache::new(open_cache(&settings, storage).await?, embedder, &settings.cache)?
                .with_timeouts(embed_timeout, Duration::from_millis(timeouts.retrieval_ms)),
        );
        let help = Arc::new(HelpCenter::new(
            help_engine,
            guardrails,
            cache,
            generator,
            settings.help.clone(),
            settings.generation.clone(),
            timeouts,
        ));
        tracing::info!(dim, storage = ?storage, "application assembled");
        Ok(Self { settings, movies, help })
    }

    pub fn movies_path(&self) -> PathBuf {
        expand_path(&self.settings.data.movies_path)
    }

    pub fn articles_path(&self) -> PathBuf {
        expand_path(&self.settings.data.articles_path)
    }

    /// Loads movies from the configured path and replaces them in the index.
    pub async fn reindex_movies(&self, pb: &ProgressBar) -> flixdb_core::Result<IngestReport> {
        let index = self.movies.index();
        let docs = DataProcessor::new(index.schema().clone()).load_movies(&self.movies_path())?;
        ingest_with_progress(index, &docs, pb).await
    }

    pub async fn ingest_articles(&self, pb: &ProgressBar) -> flixdb_core::Result<IngestReport> {
        let index = self.help.engine().index();
        let docs = DataProcessor::new(index.schema().clone()).load_articles(&self.articles_path())?;
        ingest_with_progress(index, &docs, pb).await
    }
}

pub fn progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} documents ({percent}%) {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    pb.set_style(style);
    pb
}

pub async fn ingest_with_progress(
    index: &DocumentIndex,
    docs: &[Document],
    pb: &ProgressBar,
) -> flixdb_core::Result<IngestReport> {
    pb.set_length(docs.len() as u64);
    let mut total = IngestReport::default();
    for chunk in docs.chunks(INGEST_CHUNK) {
        let report = index.ingest(chunk).await?;
        total.indexed += report.indexed;
        total.skipped += report.skipped;
        pb.inc(chunk.len() as u64);
    }
    pb.finish_with_message(format!("{} indexed", index.schema().name));
    Ok(total)
}

fn open_text(settings: &Settings, storage: Storage, schema: &IndexSchema) -> anyhow::Result<Arc<dyn TextIndexer>> {
    Ok(match storage {
        Storage::InMemory => Arc::new(TantivyIndexer::in_memory()?),
        Storage::Persistent => {
            let dir = settings.index_dir().join("tantivy").join(&schema.name);
            Arc::new(TantivyIndexer::open_or_create(&dir).with_context(|| format!("opening {}", dir.display()))?)
        }
    })
}

#[cfg(not(feature = "lance"))]
async fn open_vectors(
    settings: &Settings,
    storage: Storage,
    schema: &IndexSchema,
) -> anyhow::Result<Arc<dyn VectorStore>> {
    Ok(match storage {
        Storage::InMemory => Arc::new(FlatIndex::new(schema.dim)),
        Storage::Persistent => {
            let path = settings.index_dir().join(format!("{}.vectors.json", schema.name));
            Arc::new(FlatIndex::open(&path, schema.dim).with_context(|| format!("opening {}", path.display()))?)
        }
    })
}

#[cfg(feature = "lance")]
async fn open_vectors(
    settings: &Settings,
    storage: Storage,
    schema: &IndexSchema,
) -> anyhow::Result<Arc<dyn VectorStore>> {
    Ok(match storage {
        Storage::InMemory => Arc::new(FlatIndex::new(schema.dim)),
        Storage::Persistent => {
            Arc::new(flixdb_vector::LanceVectorStore::open(&lance_uri(settings), schema.clone()).await?)
        }
    })
}

#[cfg(not(feature = "lance"))]
async fn open_cache(_settings: &Settings, _storage: Storage) -> anyhow::Result<Arc<dyn CacheBackend>> {
    Ok(Arc::new(MemoryCacheBackend::new()))
}

#[cfg(feature = "lance")]
async fn open_cache(settings: &Settings, storage: Storage) -> anyhow::Result<Arc<dyn CacheBackend>> {
    Ok(match storage {
        Storage::InMemory => Arc::new(MemoryCacheBackend::new()),
        Storage::Persistent => Arc::new(
            flixdb_vector::LanceCacheBackend::open(&lance_uri(settings), &settings.cache.name, settings.embedding.dim)
                .await?,
        ),
    })
}

#[cfg(feature = "lance")]
fn lance_uri(settings: &Settings) -> String {
    settings.index_dir().join("lancedb").to_string_lossy().into_owned()
}
