//! flixdb-cli
//!
//! Wiring shared by the indexer, search, chat and server binaries.
pub mod bootstrap;
pub mod server;

pub use bootstrap::{init_tracing, AppContext, Storage};
