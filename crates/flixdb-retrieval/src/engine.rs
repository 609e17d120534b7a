use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use flixdb_core::config::{SearchSettings, TimeoutSettings};
use flixdb_core::deadline::{blocking, bounded};
use flixdb_core::math::similarity;
use flixdb_core::types::{DocId, Document, Filter, Predicate, QueryResult, SearchMode, SearchOptions};
use flixdb_core::{Error, Result, Stage};

use crate::fusion::linear_fusion;
use crate::index::DocumentIndex;

/// Runs the five query shapes against one `DocumentIndex`.
///
/// Holds no per-request state; every call carries its own `SearchOptions`.
/// `options.filter` is honored by `filtered` mode only.
pub struct RetrievalEngine {
    index: Arc<DocumentIndex>,
    settings: SearchSettings,
    embed_timeout: Duration,
    retrieval_timeout: Duration,
}

impl RetrievalEngine {
    pub fn new(index: Arc<DocumentIndex>, settings: SearchSettings, timeouts: &TimeoutSettings) -> Self {
        Self {
            index,
            settings,
            embed_timeout: Duration::from_millis(timeouts.embedding_ms),
            retrieval_timeout: Duration::from_millis(timeouts.retrieval_ms),
        }
    }

    pub fn index(&self) -> &Arc<DocumentIndex> {
        &self.index
    }

    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }

    pub async fn search(&self, query: &str, mode: SearchMode, options: &SearchOptions) -> Result<Vec<QueryResult>> {
        let k = self.validate(query, mode, options)?;
        tracing::debug!(mode = %mode, k, query = %truncate(query, 50), "search");
        match mode {
            SearchMode::Keyword => self.keyword(query, k).await,
            SearchMode::Vector | SearchMode::Filtered | SearchMode::Range | SearchMode::Hybrid => {
                let embedding = self.embed_query(query).await?;
                self.search_embedded(query, &embedding, mode, options).await
            }
        }
    }

    /// Vector-backed modes with a precomputed query embedding.
    pub async fn search_embedded(
        &self,
        query: &str,
        embedding: &[f32],
        mode: SearchMode,
        options: &SearchOptions,
    ) -> Result<Vec<QueryResult>> {
        let k = self.validate(query, mode, options)?;
        match mode {
            SearchMode::Vector => self.knn(embedding, k, &Filter::none()).await,
            SearchMode::Filtered => self.knn(embedding, k, &options.filter).await,
            SearchMode::Range => {
                let mut hits = self.knn(embedding, k, &Filter::none()).await?;
                hits.retain(|r| r.vector_distance.is_some_and(|d| d <= options.distance_threshold));
                Ok(hits)
            }
            SearchMode::Hybrid => self.hybrid(query, embedding, k, options.alpha).await,
            SearchMode::Keyword => self.keyword(query, k).await,
        }
    }

    pub async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        bounded(Stage::Embedding, self.embed_timeout, self.index.embedder().embed(query)).await
    }

    fn validate(&self, query: &str, mode: SearchMode, options: &SearchOptions) -> Result<usize> {
        if query.trim().is_empty() {
            return Err(Error::invalid_query("query must not be empty"));
        }
        if options.num_results <= 0 {
            return Err(Error::invalid_query(format!("num_results must be positive, got {}", options.num_results)));
        }
        if options.num_results > self.settings.max_num_results {
            return Err(Error::invalid_query(format!(
                "num_results must be at most {}, got {}",
                self.settings.max_num_results, options.num_results
            )));
        }
        if mode == SearchMode::Hybrid && !(0.0..=1.0).contains(&options.alpha) {
            return Err(Error::invalid_query(format!("alpha must be within [0, 1], got {}", options.alpha)));
        }
        if mode == SearchMode::Range && !(0.0..=2.0).contains(&options.distance_threshold) {
            return Err(Error::invalid_query(format!(
                "distance_threshold must be within [0, 2], got {}",
                options.distance_threshold
            )));
        }
        if mode == SearchMode::Filtered {
            let schema = self.index.schema();
            for p in &options.filter.predicates {
                let known = match p {
                    Predicate::TagEq { field, .. } => schema.has_tag_field(field),
                    Predicate::NumGte { field, value } | Predicate::NumLte { field, value } => {
                        if !value.is_finite() {
                            return Err(Error::invalid_query(format!("filter value for {field} is not finite")));
                        }
                        schema.has_numeric_field(field)
                    }
                };
                if !known {
                    return Err(Error::invalid_query(format!(
                        "index {} has no filterable field {}",
                        schema.name,
                        p.field()
                    )));
                }
            }
        }
        usize::try_from(options.num_results).map_err(|_| Error::invalid_query("num_results out of range"))
    }

    async fn knn(&self, embedding: &[f32], k: usize, filter: &Filter) -> Result<Vec<QueryResult>> {
        let hits =
            bounded(Stage::Retrieval, self.retrieval_timeout, self.index.vectors().knn(embedding, k, filter)).await?;
        Ok(hits.into_iter().map(|h| QueryResult::from_distance(h.document.without_embedding(), h.distance)).collect())
    }

    async fn keyword(&self, query: &str, k: usize) -> Result<Vec<QueryResult>> {
        let text = self.index.text().clone();
        let owned = query.to_string();
        let hits = bounded(Stage::Retrieval, self.retrieval_timeout, blocking(move || text.search(&owned, k))).await?;
        let ids: Vec<DocId> = hits.iter().map(|h| h.id.clone()).collect();
        let docs = self.fetch(&ids).await?;
        Ok(hits
            .into_iter()
            .filter_map(|h| match docs.get(&h.id) {
                Some(doc) => Some(QueryResult::from_text_score(doc.without_embedding(), h.score)),
                None => {
                    tracing::warn!(id = %h.id, "text hit missing from document store");
                    None
                }
            })
            .collect())
    }

    async fn hybrid(&self, query: &str, embedding: &[f32], k: usize, alpha: f32) -> Result<Vec<QueryResult>> {
        let candidates = k.saturating_mul(self.settings.hybrid_candidate_factor.max(1));
        let vectors = self.index.vectors().clone();
        let text = self.index.text().clone();

        let pool = bounded(Stage::Retrieval, self.retrieval_timeout, async {
            let vec_hits = vectors.knn(embedding, candidates, &Filter::none()).await?;
            let (searcher, owned) = (text.clone(), query.to_string());
            let text_hits = blocking(move || searcher.search(&owned, candidates)).await?;
            let ids: BTreeSet<DocId> = vec_hits
                .into_iter()
                .map(|h| h.document.id)
                .chain(text_hits.into_iter().map(|h| h.id))
                .collect();
            let ids: Vec<DocId> = ids.into_iter().collect();
            let distances = vectors.distances(embedding, &ids).await?;
            let (scorer, owned, wanted) = (text.clone(), query.to_string(), ids.clone());
            let text_scores = blocking(move || scorer.score_ids(&owned, &wanted)).await?;
            Ok::<_, Error>((ids, distances, text_scores))
        })
        .await?;
        let (ids, distances, text_scores) = pool;

        // Documents without an embedding cannot take part in fusion.
        let pool: Vec<DocId> = ids.into_iter().filter(|id| distances.contains_key(id)).collect();
        let sims: HashMap<DocId, f32> = distances.iter().map(|(id, d)| (id.clone(), similarity(*d))).collect();
        let mut fused = linear_fusion(&pool, &sims, &text_scores, alpha);
        fused.truncate(k);

        let top_ids: Vec<DocId> = fused.iter().map(|(id, _)| id.clone()).collect();
        let docs = self.fetch(&top_ids).await?;
        Ok(fused
            .into_iter()
            .filter_map(|(id, score)| {
                let doc = docs.get(&id)?;
                let distance = distances.get(&id).copied();
                Some(QueryResult {
                    document: doc.without_embedding(),
                    vector_distance: distance,
                    similarity: distance.map(similarity),
                    text_score: Some(text_scores.get(&id).copied().unwrap_or(0.0)),
                    hybrid_score: Some(score),
                })
            })
            .collect())
    }

    async fn fetch(&self, ids: &[DocId]) -> Result<HashMap<DocId, Document>> {
        let docs = bounded(Stage::Retrieval, self.retrieval_timeout, self.index.vectors().fetch(ids)).await?;
        Ok(docs.into_iter().map(|d| (d.id.clone(), d)).collect())
    }
}

pub fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max_chars).collect();
        out.push_str("...");
        out
    }
}
