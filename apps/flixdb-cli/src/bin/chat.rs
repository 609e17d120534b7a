use std::env;

use flixdb_cli::{init_tracing, AppContext};
use flixdb_core::config::Settings;
use flixdb_rag::{ChatRequest, Outcome};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let settings = Settings::load().map_err(|e| { eprintln!("Error loading config: {}", e); e })?;
    let mut args: Vec<String> = env::args().collect();
    let prog = args.remove(0);
    let no_cache = args.iter().any(|a| a == "--no-cache");
    let message: Vec<String> = args.into_iter().filter(|a| a != "--no-cache").collect();
    if message.is_empty() {
        eprintln!("Usage: {} '<question>' [--no-cache]", prog);
        std::process::exit(1);
    }

    let ctx = AppContext::from_settings(settings).await?;
    let mut request = ChatRequest::new(message.join(" "));
    if no_cache { request = request.without_cache(); }
    let response = ctx.help.chat(&request).await?;

    match response.outcome {
        Outcome::Blocked => println!("🚫 {}", response.answer),
        Outcome::Cached => println!(
            "⚡ (cached, similarity {:.3})\n{}",
            response.cache_similarity.unwrap_or_default(),
            response.answer
        ),
        Outcome::Answered => println!("💬 {}", response.answer),
    }
    if !response.sources.is_empty() {
        println!("\n📚 Sources:");
        for s in &response.sources {
            println!("   - {} ({}, similarity {:.3})", s.title, s.category, s.similarity);
        }
    }
    if !response.pii_findings.is_empty() {
        let kinds: Vec<&str> = response.pii_findings.iter().map(|f| f.kind.as_str()).collect();
        println!("\n⚠️  Personal information detected: {}", kinds.join(", "));
    }
    if let Some(usage) = &response.token_usage {
        println!("\n🧮 {} tokens", usage.total_tokens);
    }
    println!("⏱️  {} ms", response.response_time_ms);
    Ok(())
}
