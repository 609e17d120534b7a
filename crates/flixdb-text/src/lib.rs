//! flixdb-text
//!
//! Tantivy-backed BM25 over document title and body.
pub mod index;
pub mod tantivy_utils;

pub use index::TantivyIndexer;
