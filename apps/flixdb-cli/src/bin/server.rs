use std::sync::Arc;

use indicatif::ProgressBar;

use flixdb_cli::server::serve;
use flixdb_cli::{init_tracing, AppContext};
use flixdb_core::config::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let settings = Settings::load().map_err(|e| { eprintln!("Error loading config: {}", e); e })?;
    let ctx = AppContext::from_settings(settings).await?;

    let help = ctx.help.stats().await;
    if help.num_articles == 0 {
        match ctx.ingest_articles(&ProgressBar::hidden()).await {
            Ok(report) => tracing::info!(indexed = report.indexed, "loaded help articles"),
            Err(e) => tracing::warn!(error = %e, "help articles not loaded"),
        }
    }

    serve(Arc::new(ctx)).await
}
