//! flixdb-retrieval
//!
//! Document indexes and the multi-mode retrieval engine: vector, keyword
//! (BM25), filtered, hybrid (min-max linear fusion) and range search.
pub mod dto;
pub mod engine;
pub mod fusion;
pub mod index;

pub use dto::{SearchRequest, SearchResponse};
pub use engine::RetrievalEngine;
pub use index::{DocumentIndex, IndexInfo, IngestReport};
