//! Embedding-distance topic router.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use flixdb_core::deadline::bounded;
use flixdb_core::math::cosine_distance;
use flixdb_core::traits::Embedder;
use flixdb_core::types::Embedding;
use flixdb_core::{Error, Result, Stage};

pub const SUPPORT_TOPIC: &str = "streamflix_support";

const SUPPORT_EXEMPLARS: &[&str] = &[
    // account
    "reset password",
    "forgot password",
    "change subscription plan",
    "cancel subscription",
    "update payment method",
    "create profile",
    "manage profiles",
    "two-factor authentication",
    "sign out of devices",
    "account settings",
    "login issues",
    "email change",
    // playback
    "video buffering",
    "playback quality",
    "audio sync",
    "subtitles",
    "video error",
    "streaming issues",
    "blurry video",
    "freezing",
    "captions not working",
    "audio language",
    "HD quality",
    "4K streaming",
    // content
    "movie not available",
    "show not available",
    "content region",
    "download offline",
    "parental controls",
    "continue watching",
    "watchlist",
    "recommendations",
    "new releases",
    "leaving soon",
    // devices
    "supported devices",
    "cast to TV",
    "app crash",
    "chromecast",
    "smart TV app",
    "roku",
    "fire stick",
    "apple tv",
    "mobile app",
    "browser streaming",
    "multiple devices",
    // billing
    "billing",
    "payment failed",
    "unexpected charge",
    "refund",
    "subscription cost",
    "plan pricing",
    "free trial",
    "invoice",
    // technical
    "internet speed",
    "contact support",
    "error code",
    "app update",
    "connection issues",
    "VPN",
    "network requirements",
];

/// A named topic described by reference phrases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterTopic {
    pub name: String,
    pub exemplars: Vec<String>,
    pub distance_threshold: f32,
}

impl RouterTopic {
    pub fn new(name: impl Into<String>, exemplars: &[&str], distance_threshold: f32) -> Self {
        Self {
            name: name.into(),
            exemplars: exemplars.iter().map(|s| s.to_string()).collect(),
            distance_threshold,
        }
    }

    /// The single support topic admitted by the help center.
    pub fn streamflix_support(distance_threshold: f32) -> Self {
        Self::new(SUPPORT_TOPIC, SUPPORT_EXEMPLARS, distance_threshold)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteDecision {
    pub admitted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    /// Distance to the nearest exemplar over all topics.
    pub distance: f32,
}

/// Holds every exemplar embedding; routing is a pure function of the query
/// embedding and this set.
pub struct SemanticRouter {
    topics: Vec<RouterTopic>,
    exemplars: Vec<(usize, Embedding)>,
    embedder: Arc<dyn Embedder>,
    embed_timeout: Duration,
}

impl std::fmt::Debug for SemanticRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemanticRouter")
            .field("topics", &self.topics.iter().map(|t| t.name.as_str()).collect::<Vec<_>>())
            .field("exemplars", &self.exemplars.len())
            .finish()
    }
}

impl SemanticRouter {
    /// Embeds all exemplars once.
    pub async fn build(topics: Vec<RouterTopic>, embedder: Arc<dyn Embedder>, embed_timeout: Duration) -> Result<Self> {
        if topics.is_empty() || topics.iter().all(|t| t.exemplars.is_empty()) {
            return Err(Error::InvalidConfig("router needs at least one topic with exemplars".into()));
        }
        for t in &topics {
            if !(0.0..=2.0).contains(&t.distance_threshold) {
                return Err(Error::InvalidConfig(format!(
                    "router topic {} threshold {} outside [0, 2]",
                    t.name, t.distance_threshold
                )));
            }
        }
        let mut exemplars = Vec::new();
        for (i, topic) in topics.iter().enumerate() {
            let vectors = bounded(Stage::Guardrail, embed_timeout, embedder.embed_batch(&topic.exemplars)).await?;
            if vectors.len() != topic.exemplars.len() {
                return Err(Error::embedding(format!(
                    "router topic {}: embedder returned wrong batch size",
                    topic.name
                )));
            }
            exemplars.extend(vectors.into_iter().map(|v| (i, v)));
        }
        tracing::info!(topics = topics.len(), exemplars = exemplars.len(), "semantic router ready");
        Ok(Self { topics, exemplars, embedder, embed_timeout })
    }

    pub fn topics(&self) -> &[RouterTopic] {
        &self.topics
    }

    pub async fn route(&self, query: &str) -> Result<RouteDecision> {
        let embedding = bounded(Stage::Embedding, self.embed_timeout, self.embedder.embed(query)).await?;
        Ok(self.route_embedding(&embedding))
    }

    /// Nearest exemplar wins; it admits the query only when within its own
    /// topic's threshold (inclusive). Earlier topics win exact ties.
    pub fn route_embedding(&self, embedding: &[f32]) -> RouteDecision {
        let mut best: Option<(usize, f32)> = None;
        for (topic, v) in &self.exemplars {
            let d = cosine_distance(embedding, v);
            if best.map_or(true, |(_, bd)| d < bd) {
                best = Some((*topic, d));
            }
        }
        match best {
            Some((i, distance)) if distance <= self.topics[i].distance_threshold => {
                RouteDecision { admitted: true, topic: Some(self.topics[i].name.clone()), distance }
            }
            Some((_, distance)) => RouteDecision { admitted: false, topic: None, distance },
            None => RouteDecision { admitted: false, topic: None, distance: 2.0 },
        }
    }
}
