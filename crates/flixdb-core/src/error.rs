use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Pipeline stage an error or timeout is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Guardrail,
    Embedding,
    CacheLookup,
    Retrieval,
    Generation,
    CacheWrite,
    Ingest,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Guardrail => "guardrail",
            Stage::Embedding => "embedding",
            Stage::CacheLookup => "cache_lookup",
            Stage::Retrieval => "retrieval",
            Stage::Generation => "generation",
            Stage::CacheWrite => "cache_write",
            Stage::Ingest => "ingest",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Index unavailable: {message}")]
    IndexUnavailable { stage: Stage, message: String },

    #[error("Embedding failed: {0}")]
    EmbeddingFailure(String),

    #[error("Generation failed: {0}")]
    GenerationFailure(String),

    #[error("Timed out during {stage} after {elapsed_ms}ms")]
    Timeout { stage: Stage, elapsed_ms: u64 },

    #[error("Cache unavailable: {message}")]
    CacheUnavailable { stage: Stage, message: String },

    #[error("Not found: {0}")]
    NotFound(String),
}

impl Error {
    pub fn invalid_query(msg: impl Into<String>) -> Self {
        Error::InvalidQuery(msg.into())
    }

    /// Store failure on the query path; use [`Error::at_stage`] elsewhere.
    pub fn index(err: impl fmt::Display) -> Self {
        Error::IndexUnavailable { stage: Stage::Retrieval, message: err.to_string() }
    }

    pub fn embedding(err: impl fmt::Display) -> Self {
        Error::EmbeddingFailure(err.to_string())
    }

    pub fn generation(err: impl fmt::Display) -> Self {
        Error::GenerationFailure(err.to_string())
    }

    pub fn cache(err: impl fmt::Display) -> Self {
        Error::CacheUnavailable { stage: Stage::CacheLookup, message: err.to_string() }
    }

    /// Re-attributes a store outage to `stage`. Other variants already name
    /// their stage and pass through unchanged.
    pub fn at_stage(self, stage: Stage) -> Self {
        match self {
            Error::IndexUnavailable { message, .. } => Error::IndexUnavailable { stage, message },
            Error::CacheUnavailable { message, .. } => Error::CacheUnavailable { stage, message },
            other => other,
        }
    }

    /// Stable machine-readable kind, used in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidConfig(_) => "invalid_config",
            Error::InvalidQuery(_) => "invalid_query",
            Error::IndexUnavailable { .. } => "index_unavailable",
            Error::EmbeddingFailure(_) => "embedding_failure",
            Error::GenerationFailure(_) => "generation_failure",
            Error::Timeout { .. } => "timeout",
            Error::CacheUnavailable { .. } => "cache_unavailable",
            Error::NotFound(_) => "not_found",
        }
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            Error::Timeout { stage, .. }
            | Error::IndexUnavailable { stage, .. }
            | Error::CacheUnavailable { stage, .. } => Some(*stage),
            Error::EmbeddingFailure(_) => Some(Stage::Embedding),
            Error::GenerationFailure(_) => Some(Stage::Generation),
            Error::InvalidConfig(_) | Error::InvalidQuery(_) | Error::NotFound(_) => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }
}

/// Serializable error shape returned by the HTTP API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    pub message: String,
}

impl From<&Error> for ErrorBody {
    fn from(err: &Error) -> Self {
        Self { kind: err.kind().to_string(), stage: err.stage(), message: err.to_string() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
