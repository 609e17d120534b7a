//! Wire shapes for search requests and responses.

use serde::{Deserialize, Serialize};

use flixdb_core::config::SearchSettings;
use flixdb_core::types::{Filter, QueryResult, SearchMode, SearchOptions};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub num_results: Option<i64>,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub min_rating: Option<f64>,
    #[serde(default)]
    pub alpha: Option<f32>,
    #[serde(default)]
    pub distance_threshold: Option<f32>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self { query: query.into(), ..Self::default() }
    }

    /// Fills unset fields from configured defaults. Range requests default to
    /// the larger range cap.
    pub fn options(&self, mode: SearchMode, settings: &SearchSettings) -> SearchOptions {
        let default_k = match mode {
            SearchMode::Range => i64::try_from(settings.range_num_results).unwrap_or(i64::MAX),
            _ => settings.default_num_results,
        };
        SearchOptions {
            num_results: self.num_results.unwrap_or(default_k),
            filter: Filter::from_genre_rating(self.genre.as_deref(), self.min_rating),
            alpha: self.alpha.unwrap_or(settings.default_hybrid_alpha),
            distance_threshold: self.distance_threshold.unwrap_or(settings.default_distance_threshold),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<QueryResult>,
    pub count: usize,
    pub search_type: SearchMode,
}

impl SearchResponse {
    pub fn new(results: Vec<QueryResult>, mode: SearchMode) -> Self {
        Self { count: results.len(), results, search_type: mode }
    }
}
