//! Help-center chat: guardrails, semantic cache, article retrieval and
//! grounded generation as a chain of short-circuiting stages.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

use flixdb_core::config::{GenerationSettings, HelpSettings, TimeoutSettings};
use flixdb_core::deadline::bounded;
use flixdb_core::traits::Generator;
use flixdb_core::types::{Document, Embedding, Generation, QueryResult, SearchMode, SearchOptions, TokenUsage};
use flixdb_core::{Error, Result, Stage};
use flixdb_retrieval::engine::truncate;
use flixdb_retrieval::{IngestReport, RetrievalEngine};

use crate::cache::SemanticCache;
use crate::generator::build_prompt;
use crate::guardrail::{GuardrailPipeline, GuardrailResult, OFF_TOPIC_MESSAGE};
use crate::pii::{PiiFinding, PiiKind};

pub const NO_ARTICLES_MESSAGE: &str =
    "I couldn't find any articles matching your question. Please try rephrasing or contact our support team for assistance.";

pub const SUGGESTIONS: &[&str] = &[
    "Why can't I watch this movie?",
    "How do I change my plan?",
    "Why is playback blurry?",
    "I forgot my password",
    "How to download for offline viewing?",
    "Video keeps buffering",
    "How to set up parental controls?",
    "Payment was declined",
];

fn default_use_cache() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default = "default_use_cache")]
    pub use_cache: bool,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), use_cache: true }
    }

    pub fn without_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleRef {
    pub id: String,
    pub title: String,
    pub category: String,
    pub similarity: f32,
}

/// PII kinds found in one retrieved article. Reported only; attribution and
/// caching are unaffected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFinding {
    pub article_id: String,
    pub kinds: Vec<PiiKind>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Answered,
    Cached,
    Blocked,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub answer: String,
    pub sources: Vec<ArticleRef>,
    pub from_cache: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_similarity: Option<f32>,
    pub response_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
    pub blocked: bool,
    pub pii_findings: Vec<PiiFinding>,
    pub source_findings: Vec<SourceFinding>,
    pub outcome: Outcome,
}

impl ChatResponse {
    fn new(answer: impl Into<String>, outcome: Outcome, findings: Vec<PiiFinding>) -> Self {
        Self {
            answer: answer.into(),
            sources: vec![],
            from_cache: outcome == Outcome::Cached,
            cache_similarity: None,
            response_time_ms: 0,
            token_usage: None,
            blocked: outcome == Outcome::Blocked,
            pii_findings: findings,
            source_findings: vec![],
            outcome,
        }
    }

    fn finish(mut self, started: Instant) -> Self {
        self.response_time_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelpStats {
    pub index_name: String,
    pub num_articles: usize,
    pub index_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of one pipeline stage.
enum Step<T> {
    Continue(T),
    Respond(ChatResponse),
}

pub struct HelpCenter {
    engine: Arc<RetrievalEngine>,
    guardrails: Arc<GuardrailPipeline>,
    cache: Arc<SemanticCache>,
    generator: Arc<dyn Generator>,
    settings: HelpSettings,
    generation: GenerationSettings,
    generation_timeout: Duration,
}

impl HelpCenter {
    pub fn new(
        engine: Arc<RetrievalEngine>,
        guardrails: Arc<GuardrailPipeline>,
        cache: Arc<SemanticCache>,
        generator: Arc<dyn Generator>,
        settings: HelpSettings,
        generation: GenerationSettings,
        timeouts: &TimeoutSettings,
    ) -> Self {
        Self {
            engine,
            guardrails,
            cache,
            generator,
            settings,
            generation,
            generation_timeout: Duration::from_millis(timeouts.generation_ms),
        }
    }

    pub fn engine(&self) -> &Arc<RetrievalEngine> {
        &self.engine
    }

    pub fn cache(&self) -> &Arc<SemanticCache> {
        &self.cache
    }

    pub fn guardrails(&self) -> &Arc<GuardrailPipeline> {
        &self.guardrails
    }

    pub fn suggestions(&self) -> &'static [&'static str] {
        SUGGESTIONS
    }

    /// Runs one chat turn. Terminal states are answered, cached and blocked;
    /// any `Err` is the error state and carries the failing stage.
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let started = Instant::now();
        let message = request.message.trim();
        if message.is_empty() {
            return Err(Error::invalid_query("message must not be empty"));
        }
        tracing::info!(query = %truncate(message, 50), use_cache = request.use_cache, "processing chat");

        let embedding = self.engine.embed_query(message).await?;

        let guard = match self.check_guardrails(message, &embedding) {
            Step::Continue(g) => g,
            Step::Respond(r) => return Ok(r.finish(started)),
        };

        if request.use_cache {
            if let Step::Respond(r) = self.check_cache(&embedding, &guard).await {
                return Ok(r.finish(started));
            }
        }

        let (articles, sources) = match self.retrieve(message, &embedding, &guard).await? {
            Step::Continue(found) => found,
            Step::Respond(r) => return Ok(r.finish(started)),
        };

        let generation = self.generate(message, &articles).await?;
        let mut response = ChatResponse::new(generation.text, Outcome::Answered, guard.findings.clone());
        response.sources = sources;
        response.source_findings = self.scan_sources(&articles);
        response.token_usage = generation.usage;

        if request.use_cache {
            self.store(message, embedding, &response.answer, &guard).await;
        }
        Ok(response.finish(started))
    }

    fn check_guardrails(&self, message: &str, embedding: &[f32]) -> Step<GuardrailResult> {
        let guard = self.guardrails.evaluate(message, embedding);
        if guard.blocked {
            Step::Respond(ChatResponse::new(OFF_TOPIC_MESSAGE, Outcome::Blocked, guard.findings))
        } else {
            Step::Continue(guard)
        }
    }

    // Cache failures are a forced miss.
    async fn check_cache(&self, embedding: &[f32], guard: &GuardrailResult) -> Step<()> {
        match self.cache.lookup_embedded(embedding).await {
            Ok(Some(hit)) => {
                let mut r = ChatResponse::new(hit.entry.response, Outcome::Cached, guard.findings.clone());
                r.cache_similarity = Some(hit.similarity);
                Step::Respond(r)
            }
            Ok(None) => Step::Continue(()),
            Err(e) => {
                tracing::warn!(error = %e, "cache lookup failed, continuing without cache");
                Step::Continue(())
            }
        }
    }

    async fn retrieve(
        &self,
        message: &str,
        embedding: &[f32],
        guard: &GuardrailResult,
    ) -> Result<Step<(Vec<Document>, Vec<ArticleRef>)>> {
        let k = i64::try_from(self.settings.num_articles).unwrap_or(i64::MAX);
        let options = SearchOptions::default().with_num_results(k);
        let hits = self.engine.search_embedded(message, embedding, SearchMode::Vector, &options).await?;
        if hits.is_empty() {
            tracing::info!("no help articles matched");
            return Ok(Step::Respond(ChatResponse::new(NO_ARTICLES_MESSAGE, Outcome::Answered, guard.findings.clone())));
        }
        let sources = hits.iter().map(article_ref).collect();
        let articles = hits.into_iter().map(|r| r.document).collect();
        Ok(Step::Continue((articles, sources)))
    }

    async fn generate(&self, message: &str, articles: &[Document]) -> Result<Generation> {
        let prompt = build_prompt(message, articles, &self.generation);
        bounded(Stage::Generation, self.generation_timeout, self.generator.generate(&prompt)).await.map_err(|e| {
            tracing::error!(error = %e, model = %self.generator.model_id(), "generation failed");
            match e {
                Error::Timeout { .. } | Error::GenerationFailure(_) => e,
                other => Error::generation(other),
            }
        })
    }

    fn scan_sources(&self, articles: &[Document]) -> Vec<SourceFinding> {
        articles
            .iter()
            .filter_map(|a| {
                let kinds = self.guardrails.pii().kinds(&format!("{}\n{}", a.title, a.body));
                if kinds.is_empty() {
                    return None;
                }
                tracing::warn!(article = %a.id, kinds = ?kinds, "pii found in source article");
                Some(SourceFinding { article_id: a.id.clone(), kinds })
            })
            .collect()
    }

    // Best effort: a failed write never fails the turn.
    async fn store(&self, message: &str, embedding: Embedding, answer: &str, guard: &GuardrailResult) {
        if guard.has_pii() {
            tracing::info!("cache skipped: pii detected in query");
            return;
        }
        let answer_kinds = self.guardrails.pii().kinds(answer);
        if !answer_kinds.is_empty() {
            tracing::info!(kinds = ?answer_kinds, "cache skipped: pii detected in response");
            return;
        }
        if let Err(e) = self.cache.store_embedded(message, embedding, answer).await {
            tracing::warn!(error = %e, "cache store failed");
        }
    }

    pub async fn ingest_articles(&self, articles: &[Document]) -> Result<IngestReport> {
        self.engine.index().ingest(articles).await
    }

    pub async fn stats(&self) -> HelpStats {
        let index_name = self.engine.index().schema().name.clone();
        match self.engine.index().info().await {
            Ok(info) => HelpStats {
                index_name,
                num_articles: info.num_docs,
                index_status: if info.exists { "active" } else { "not_created" }.to_string(),
                error: None,
            },
            Err(e) => HelpStats {
                index_name,
                num_articles: 0,
                index_status: "error".to_string(),
                error: Some(e.to_string()),
            },
        }
    }
}

fn article_ref(r: &QueryResult) -> ArticleRef {
    ArticleRef {
        id: r.document.id.clone(),
        title: r.document.title.clone(),
        category: r.document.tag("category").unwrap_or_default().to_string(),
        similarity: r.similarity.unwrap_or(0.0),
    }
}
