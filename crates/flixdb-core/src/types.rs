//! Domain types shared by the text, vector, retrieval and RAG crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub type DocId = String;
pub type Embedding = Vec<f32>;

/// A retrievable unit: a movie or a help article.
///
/// - `id`: stable identity; re-ingesting the same id replaces the document
/// - `title`/`body`: full-text indexed fields
/// - `embedding`: computed once at ingest from the canonical text; `None`
///   keeps the document out of vector and hybrid queries
/// - `tags`: exact-match fields (genre, category), stored lowercase
/// - `numerics`: range-comparable fields (rating)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocId,
    pub title: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Embedding>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub numerics: BTreeMap<String, f64>,
}

impl Document {
    pub fn new(id: impl Into<String>, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self { id: id.into(), title: title.into(), body: body.into(), ..Self::default() }
    }

    pub fn with_tag(mut self, field: &str, value: &str) -> Self {
        self.tags.insert(field.to_string(), normalize_tag(value));
        self
    }

    pub fn with_numeric(mut self, field: &str, value: f64) -> Self {
        self.numerics.insert(field.to_string(), value);
        self
    }

    pub fn with_embedding(mut self, embedding: Embedding) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn tag(&self, field: &str) -> Option<&str> {
        self.tags.get(field).map(String::as_str)
    }

    pub fn numeric(&self, field: &str) -> Option<f64> {
        self.numerics.get(field).copied()
    }

    /// Copy of the document without its embedding, as returned to callers.
    pub fn without_embedding(&self) -> Self {
        Self { embedding: None, ..self.clone() }
    }
}

/// Tag values compare case-insensitively; both ingest and filters go through here.
pub fn normalize_tag(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Which text of a document is embedded at ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalText {
    Body,
    TitleAndBody,
}

/// Field layout of one document index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSchema {
    pub name: String,
    pub prefix: String,
    pub tag_fields: Vec<String>,
    pub numeric_fields: Vec<String>,
    pub dim: usize,
    pub canonical_text: CanonicalText,
}

impl IndexSchema {
    pub fn movies(dim: usize) -> Self {
        Self {
            name: "movies".into(),
            prefix: "movie:".into(),
            tag_fields: vec!["genre".into()],
            numeric_fields: vec!["rating".into()],
            dim,
            canonical_text: CanonicalText::Body,
        }
    }

    pub fn help_articles(dim: usize) -> Self {
        Self {
            name: "help_articles".into(),
            prefix: "help:".into(),
            tag_fields: vec!["category".into()],
            numeric_fields: vec![],
            dim,
            canonical_text: CanonicalText::TitleAndBody,
        }
    }

    pub fn has_tag_field(&self, field: &str) -> bool {
        self.tag_fields.iter().any(|f| f == field)
    }

    pub fn has_numeric_field(&self, field: &str) -> bool {
        self.numeric_fields.iter().any(|f| f == field)
    }

    pub fn canonical_text(&self, doc: &Document) -> String {
        match self.canonical_text {
            CanonicalText::Body => doc.body.clone(),
            CanonicalText::TitleAndBody => format!("{}\n{}", doc.title, doc.body),
        }
    }
}

/// One constraint of a filtered query. Constraints are AND-combined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Predicate {
    TagEq { field: String, value: String },
    NumGte { field: String, value: f64 },
    NumLte { field: String, value: f64 },
}

impl Predicate {
    pub fn field(&self) -> &str {
        match self {
            Predicate::TagEq { field, .. } | Predicate::NumGte { field, .. } | Predicate::NumLte { field, .. } => field,
        }
    }

    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Predicate::TagEq { field, value } => doc.tag(field) == Some(normalize_tag(value).as_str()),
            Predicate::NumGte { field, value } => doc.numeric(field).is_some_and(|v| v >= *value),
            Predicate::NumLte { field, value } => doc.numeric(field).is_some_and(|v| v <= *value),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub predicates: Vec<Predicate>,
}

impl Filter {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn tag_eq(mut self, field: &str, value: &str) -> Self {
        self.predicates.push(Predicate::TagEq { field: field.into(), value: normalize_tag(value) });
        self
    }

    pub fn num_gte(mut self, field: &str, value: f64) -> Self {
        self.predicates.push(Predicate::NumGte { field: field.into(), value });
        self
    }

    pub fn num_lte(mut self, field: &str, value: f64) -> Self {
        self.predicates.push(Predicate::NumLte { field: field.into(), value });
        self
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.predicates.iter().all(|p| p.matches(doc))
    }

    /// Movie-style filter: `"all"` (any case) or blank genre and non-positive
    /// ratings mean "unconstrained".
    pub fn from_genre_rating(genre: Option<&str>, min_rating: Option<f64>) -> Self {
        let mut filter = Self::none();
        if let Some(g) = genre.map(str::trim).filter(|g| !g.is_empty() && !g.eq_ignore_ascii_case("all")) {
            filter = filter.tag_eq("genre", g);
        }
        if let Some(r) = min_rating.filter(|r| *r > 0.0) {
            filter = filter.num_gte("rating", r);
        }
        filter
    }
}

/// The five query shapes of the retrieval engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    Vector,
    Keyword,
    Filtered,
    Hybrid,
    Range,
}

impl SearchMode {
    pub const ALL: [SearchMode; 5] =
        [SearchMode::Vector, SearchMode::Keyword, SearchMode::Filtered, SearchMode::Hybrid, SearchMode::Range];

    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Vector => "vector",
            SearchMode::Keyword => "keyword",
            SearchMode::Filtered => "filtered",
            SearchMode::Hybrid => "hybrid",
            SearchMode::Range => "range",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const DEFAULT_NUM_RESULTS: i64 = 5;
pub const DEFAULT_HYBRID_ALPHA: f32 = 0.5;
pub const DEFAULT_DISTANCE_THRESHOLD: f32 = 0.5;

/// Per-call search settings. Values are passed with every request rather
/// than stored on the engine.
///
/// `num_results` is signed so that non-positive requests can be rejected as
/// `InvalidQuery` instead of failing to parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOptions {
    pub num_results: i64,
    #[serde(default)]
    pub filter: Filter,
    pub alpha: f32,
    pub distance_threshold: f32,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            num_results: DEFAULT_NUM_RESULTS,
            filter: Filter::none(),
            alpha: DEFAULT_HYBRID_ALPHA,
            distance_threshold: DEFAULT_DISTANCE_THRESHOLD,
        }
    }
}

impl SearchOptions {
    pub fn with_num_results(mut self, n: i64) -> Self {
        self.num_results = n;
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_distance_threshold(mut self, threshold: f32) -> Self {
        self.distance_threshold = threshold;
        self
    }
}

/// One scored match. Which scores are present depends on the mode:
/// vector/filtered/range set `vector_distance` and `similarity`, keyword sets
/// `text_score`, hybrid sets `similarity`, `text_score` and `hybrid_score`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub document: Document,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector_distance: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hybrid_score: Option<f32>,
}

impl QueryResult {
    pub fn from_distance(document: Document, distance: f32) -> Self {
        Self {
            document,
            vector_distance: Some(distance),
            similarity: Some(crate::math::similarity(distance)),
            text_score: None,
            hybrid_score: None,
        }
    }

    pub fn from_text_score(document: Document, score: f32) -> Self {
        Self { document, vector_distance: None, similarity: None, text_score: Some(score), hybrid_score: None }
    }
}

/// Indicates which engine produced a hit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SourceKind {
    Vector,
    Text,
}

/// Raw text-engine hit: BM25 score, higher is better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: DocId,
    pub score: f32,
    pub source: SourceKind,
}

/// Raw vector-engine hit: cosine distance, lower is better.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub document: Document,
    pub distance: f32,
}

/// A stored (prompt, response) pair of the semantic cache.
///
/// Entries are immutable once written; expiry is `created_at + ttl_secs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub id: String,
    pub prompt: String,
    pub prompt_embedding: Embedding,
    pub response: String,
    pub created_at: DateTime<Utc>,
    pub ttl_secs: u64,
}

impl CacheEntry {
    /// `None` when the ttl is too large to represent, which never expires.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let ttl = i64::try_from(self.ttl_secs).ok().and_then(chrono::Duration::try_seconds)?;
        self.created_at.checked_add_signed(ttl)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|at| now >= at)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// Fully rendered input for one generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    pub text: String,
    pub usage: Option<TokenUsage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn movie(genre: &str, rating: f64) -> Document {
        Document::new("m1", "T", "B").with_tag("genre", genre).with_numeric("rating", rating)
    }

    #[test]
    fn filter_from_genre_rating_skips_all_and_zero() {
        assert!(Filter::from_genre_rating(Some("All"), Some(0.0)).is_empty());
        assert!(Filter::from_genre_rating(None, None).is_empty());
        let f = Filter::from_genre_rating(Some("Romance"), Some(7.0));
        assert_eq!(f.predicates.len(), 2);
        assert!(f.matches(&movie("romance", 7.0)));
        assert!(!f.matches(&movie("romance", 6.9)));
        assert!(!f.matches(&movie("comedy", 9.0)));
    }

    #[test]
    fn missing_fields_never_match() {
        let doc = Document::new("x", "t", "b");
        assert!(!Filter::none().tag_eq("genre", "action").matches(&doc));
        assert!(!Filter::none().num_gte("rating", 1.0).matches(&doc));
        assert!(Filter::none().matches(&doc));
    }

    #[test]
    fn cache_entry_expiry_is_inclusive() {
        let created_at = Utc::now();
        let entry = CacheEntry {
            id: "k".into(),
            prompt: "p".into(),
            prompt_embedding: vec![1.0],
            response: "r".into(),
            created_at,
            ttl_secs: 60,
        };
        assert!(!entry.is_expired_at(created_at + chrono::Duration::seconds(59)));
        assert!(entry.is_expired_at(created_at + chrono::Duration::seconds(60)));
    }

    #[test]
    fn search_mode_parse_round_trip() {
        for mode in SearchMode::ALL {
            assert_eq!(SearchMode::parse(mode.as_str()), Some(mode));
        }
        assert_eq!(SearchMode::parse("semantic"), None);
    }
}
