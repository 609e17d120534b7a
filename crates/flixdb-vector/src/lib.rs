//! flixdb-vector
//!
//! Vector stores for document indexes. `FlatIndex` is an exact in-process
//! scan; with the `lance` feature, `LanceVectorStore` and `LanceCacheBackend`
//! keep documents and semantic-cache entries in LanceDB tables.
pub mod flat;

#[cfg(feature = "lance")]
pub mod cache;
#[cfg(feature = "lance")]
pub mod schema;
#[cfg(feature = "lance")]
pub mod store;
#[cfg(feature = "lance")]
pub mod table;

pub use flat::FlatIndex;

#[cfg(feature = "lance")]
pub use cache::LanceCacheBackend;
#[cfg(feature = "lance")]
pub use store::LanceVectorStore;
