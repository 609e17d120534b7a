use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use flixdb_core::deadline::{blocking, bounded};
use flixdb_core::traits::{Embedder, TextIndexer, VectorStore};
use flixdb_core::types::{Document, IndexSchema};
use flixdb_core::{Error, Result, Stage};

const EMBED_BATCH: usize = 64;

/// One document index: schema plus the stores and embedder it is built with.
///
/// Both stores hold every ingested document; only documents that received an
/// embedding can rank in vector-backed modes.
pub struct DocumentIndex {
    schema: IndexSchema,
    embedder: Arc<dyn Embedder>,
    vectors: Arc<dyn VectorStore>,
    text: Arc<dyn TextIndexer>,
    embed_timeout: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    pub indexed: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub name: String,
    pub prefix: String,
    pub num_docs: usize,
    pub exists: bool,
}

impl DocumentIndex {
    pub fn new(
        schema: IndexSchema,
        embedder: Arc<dyn Embedder>,
        vectors: Arc<dyn VectorStore>,
        text: Arc<dyn TextIndexer>,
    ) -> Result<Self> {
        if embedder.dim() != schema.dim {
            return Err(Error::InvalidConfig(format!(
                "index {} expects {}-dim vectors, embedder {} produces {}",
                schema.name,
                schema.dim,
                embedder.model_id(),
                embedder.dim()
            )));
        }
        Ok(Self { schema, embedder, vectors, text, embed_timeout: Duration::from_secs(10) })
    }

    pub fn with_embed_timeout(mut self, timeout: Duration) -> Self {
        self.embed_timeout = timeout;
        self
    }

    pub fn schema(&self) -> &IndexSchema {
        &self.schema
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    pub fn vectors(&self) -> &Arc<dyn VectorStore> {
        &self.vectors
    }

    pub fn text(&self) -> &Arc<dyn TextIndexer> {
        &self.text
    }

    /// Embeds the canonical text of each document and replaces documents by
    /// id in both stores. Documents with blank canonical text are skipped.
    pub async fn ingest(&self, docs: &[Document]) -> Result<IngestReport> {
        let mut report = IngestReport::default();
        let mut ready = Vec::with_capacity(docs.len());
        for d in docs {
            let text = self.schema.canonical_text(d);
            if d.id.trim().is_empty() || text.trim().is_empty() {
                tracing::warn!(id = %d.id, index = %self.schema.name, "skipping document without canonical text");
                report.skipped += 1;
                continue;
            }
            ready.push((d.clone(), text));
        }

        for chunk in ready.chunks(EMBED_BATCH) {
            let texts: Vec<String> = chunk.iter().map(|(_, t)| t.clone()).collect();
            let embeddings =
                bounded(Stage::Embedding, self.embed_timeout, self.embedder.embed_batch(&texts)).await?;
            if embeddings.len() != chunk.len() {
                return Err(Error::embedding(format!(
                    "embedder returned {} vectors for {} documents",
                    embeddings.len(),
                    chunk.len()
                )));
            }
            let batch: Vec<Document> = chunk
                .iter()
                .zip(embeddings)
                .map(|((d, _), e)| Document { embedding: Some(e), ..d.clone() })
                .collect();
            let indexed = batch.len();
            self.vectors.upsert(&batch).await.map_err(|e| e.at_stage(Stage::Ingest))?;
            let text = self.text.clone();
            blocking(move || text.index(&batch)).await.map_err(|e| e.at_stage(Stage::Ingest))?;
            report.indexed += indexed;
        }
        tracing::info!(
            index = %self.schema.name,
            indexed = report.indexed,
            skipped = report.skipped,
            "ingest complete"
        );
        Ok(report)
    }

    pub async fn info(&self) -> Result<IndexInfo> {
        let num_docs = self.vectors.count().await?;
        Ok(IndexInfo {
            name: self.schema.name.clone(),
            prefix: self.schema.prefix.clone(),
            num_docs,
            exists: num_docs > 0,
        })
    }

    pub async fn clear(&self) -> Result<()> {
        self.vectors.clear().await.map_err(|e| e.at_stage(Stage::Ingest))?;
        let text = self.text.clone();
        blocking(move || text.clear()).await.map_err(|e| e.at_stage(Stage::Ingest))?;
        tracing::info!(index = %self.schema.name, "index cleared");
        Ok(())
    }
}
