use std::env;

use flixdb_cli::bootstrap::progress_bar;
use flixdb_cli::{init_tracing, AppContext};
use flixdb_core::config::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let mut settings = Settings::load().map_err(|e| { eprintln!("Error loading config: {}", e); e })?;
    let args: Vec<String> = env::args().skip(1).collect();
    let (mut movies, mut articles, mut clear) = (false, false, false);
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--movies" | "-m" => movies = true,
            "--articles" | "-a" => articles = true,
            "--clear" | "-c" => clear = true,
            "--movies-path" | "--articles-path" => {
                let Some(path) = args.get(i + 1) else {
                    eprintln!("Error: {} requires a path", args[i]);
                    std::process::exit(1);
                };
                if args[i] == "--movies-path" {
                    settings.data.movies_path = path.clone();
                } else {
                    settings.data.articles_path = path.clone();
                }
                i += 1;
            }
            other => {
                eprintln!("Unknown argument: {}", other);
                std::process::exit(1);
            }
        }
        i += 1;
    }
    if !movies && !articles { movies = true; articles = true; }

    println!("FlixDB Indexer\n==============");
    println!("Index directory: {}", settings.index_dir().display());
    let ctx = AppContext::from_settings(settings).await?;

    if movies {
        if clear { ctx.movies.index().clear().await?; println!("🗑️  Cleared movie index"); }
        println!("Loading movies from {}", ctx.movies_path().display());
        let report = ctx.reindex_movies(&progress_bar(0)).await?;
        println!("📊 Indexed {} movies ({} skipped)", report.indexed, report.skipped);
    }
    if articles {
        if clear { ctx.help.engine().index().clear().await?; println!("🗑️  Cleared help article index"); }
        println!("Loading help articles from {}", ctx.articles_path().display());
        let report = ctx.ingest_articles(&progress_bar(0)).await?;
        println!("📊 Indexed {} help articles ({} skipped)", report.indexed, report.skipped);
    }

    println!("\n✅ Indexing completed successfully!");
    println!("💡 To search movies, use: cargo run --bin flixdb-search vector '<query>'");
    println!("💡 To ask the help center, use: cargo run --bin flixdb-chat '<question>'");
    Ok(())
}
