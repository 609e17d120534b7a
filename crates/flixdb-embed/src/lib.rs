pub mod cached;
pub mod device;
pub mod hashing;
pub mod model;
pub mod pool;
pub mod tokenize;

use std::sync::Arc;
use std::time::Duration;

use flixdb_core::config::{expand_path, EmbeddingSettings};
use flixdb_core::traits::Embedder;
use flixdb_core::{Error, Result};

pub use cached::CachedEmbedder;
pub use hashing::HashingEmbedder;
pub use model::BertEmbedder;
pub use pool::masked_mean_l2;

fn fake_requested(settings: &EmbeddingSettings) -> bool {
    settings.use_fake
        || std::env::var("APP_USE_FAKE_EMBEDDINGS")
            .ok()
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
}

/// Builds the configured embedder wrapped in a query memo.
pub fn get_default_embedder(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>> {
    let base: Arc<dyn Embedder> = if fake_requested(settings) {
        tracing::info!(dim = settings.dim, "using hashing embedder");
        Arc::new(HashingEmbedder::new(settings.dim))
    } else {
        let dir = model::resolve_model_dir(&expand_path(&settings.model_dir)).map_err(Error::embedding)?;
        let model = BertEmbedder::load(&dir, settings.max_len).map_err(Error::embedding)?;
        if model.dim() != settings.dim {
            return Err(Error::InvalidConfig(format!(
                "model {} produces {}-dim vectors but embedding.dim is {}",
                model.model_id(),
                model.dim(),
                settings.dim
            )));
        }
        Arc::new(model)
    };
    Ok(Arc::new(CachedEmbedder::new(
        base,
        Duration::from_secs(settings.cache_ttl_secs),
        settings.cache_capacity,
    )))
}
