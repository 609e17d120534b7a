use std::env;
use std::str::FromStr;

use flixdb_cli::{init_tracing, AppContext};
use flixdb_core::config::Settings;
use flixdb_core::types::SearchMode;
use flixdb_retrieval::engine::truncate;
use flixdb_retrieval::SearchRequest;

fn usage(prog: &str) -> ! {
    eprintln!(
        "Usage: {} <vector|keyword|filtered|hybrid|range> '<query>' [--k N] [--genre G] [--min-rating R] [--alpha A] [--threshold T]",
        prog
    );
    std::process::exit(1);
}

fn value<T: FromStr>(args: &[String], i: usize, flag: &str) -> T {
    match args.get(i + 1).map(|v| v.parse::<T>()) {
        Some(Ok(v)) => v,
        _ => { eprintln!("Error: {} requires a value", flag); std::process::exit(1); }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let settings = Settings::load().map_err(|e| { eprintln!("Error loading config: {}", e); e })?;
    let mut args: Vec<String> = env::args().collect();
    let prog = args.remove(0);
    if args.len() < 2 { usage(&prog); }
    let Some(mode) = SearchMode::parse(&args.remove(0)) else { usage(&prog) };
    let mut req = SearchRequest::new(args.remove(0));

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--k" | "-k" => { req.num_results = Some(value(&args, i, "--k")); i += 1; }
            "--genre" | "-g" => { req.genre = Some(value(&args, i, "--genre")); i += 1; }
            "--min-rating" | "-r" => { req.min_rating = Some(value(&args, i, "--min-rating")); i += 1; }
            "--alpha" | "-a" => { req.alpha = Some(value(&args, i, "--alpha")); i += 1; }
            "--threshold" | "-t" => { req.distance_threshold = Some(value(&args, i, "--threshold")); i += 1; }
            _ => usage(&prog),
        }
        i += 1;
    }

    let ctx = AppContext::from_settings(settings).await?;
    let options = req.options(mode, ctx.movies.settings());
    let results = ctx.movies.search(&req.query, mode, &options).await?;

    println!("🔍 {} search for '{}'", mode.as_str(), req.query);
    if results.is_empty() {
        println!("❌ No results found");
        return Ok(());
    }
    for (n, r) in results.iter().enumerate() {
        let doc = &r.document;
        println!("\n{}. {} [{}]", n + 1, doc.title, doc.id);
        if let (Some(genre), Some(rating)) = (doc.tag("genre"), doc.numeric("rating")) {
            println!("   Genre: {}  Rating: {}", genre, rating);
        }
        if let Some(d) = r.vector_distance { println!("   Distance: {:.4}", d); }
        if let Some(s) = r.text_score { println!("   Text score: {:.4}", s); }
        if let Some(h) = r.hybrid_score { println!("   Hybrid score: {:.4}", h); }
        println!("   {}", truncate(&doc.body, 160));
    }
    println!("\n✅ {} result(s)", results.len());
    Ok(())
}
