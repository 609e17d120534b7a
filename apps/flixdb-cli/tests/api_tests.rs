use async_trait::async_trait;
use indicatif::ProgressBar;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;

use flixdb_cli::server::router;
use flixdb_cli::{AppContext, Storage};
use flixdb_core::config::Settings;
use flixdb_core::traits::{Embedder, Generator};
use flixdb_core::types::{Generation, Prompt, SearchMode, SearchOptions, TokenUsage};
use flixdb_core::{Error, Result};
use flixdb_embed::HashingEmbedder;

const ANSWER: &str = "Open Settings, choose Account and select Cancel membership.";

struct FixedGenerator {
    fail: bool,
}

#[async_trait]
impl Generator for FixedGenerator {
    fn model_id(&self) -> &str {
        "fixed"
    }

    async fn generate(&self, _prompt: &Prompt) -> Result<Generation> {
        if self.fail {
            return Err(Error::generation("upstream returned 500"));
        }
        Ok(Generation {
            text: ANSWER.to_string(),
            usage: Some(TokenUsage { prompt_tokens: 100, completion_tokens: 20, total_tokens: 120 }),
        })
    }
}

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).ancestors().nth(2).unwrap().join("test_data").join(name)
}

fn settings() -> Settings {
    let mut settings = Settings::default();
    settings.data.movies_path = fixture("movies.json").to_string_lossy().into_owned();
    settings.data.articles_path = fixture("help_articles.json").to_string_lossy().into_owned();
    settings
}

async fn context(settings: Settings, storage: Storage, fail: bool) -> AppContext {
    let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(settings.embedding.dim));
    let generator: Arc<dyn Generator> = Arc::new(FixedGenerator { fail });
    AppContext::assemble(settings, embedder, generator, storage).await.unwrap()
}

async fn loaded(fail: bool) -> AppContext {
    let ctx = context(settings(), Storage::InMemory, fail).await;
    ctx.reindex_movies(&ProgressBar::hidden()).await.unwrap();
    ctx.ingest_articles(&ProgressBar::hidden()).await.unwrap();
    ctx
}

async fn spawn(ctx: AppContext) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(Arc::new(ctx))).await.unwrap();
    });
    format!("http://{addr}")
}

async fn post(client: &Client, url: String, body: Value) -> (StatusCode, Value) {
    let res = client.post(url).json(&body).send().await.unwrap();
    let status = res.status();
    (status, res.json().await.unwrap())
}

#[tokio::test]
async fn health_reports_loaded_indexes() {
    let base = spawn(loaded(false).await).await;
    let body: Value = reqwest::get(format!("{base}/api/health")).await.unwrap().json().await.unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["movies"]["num_docs"], 14);
    assert_eq!(body["help"]["num_articles"], 12);
    assert_eq!(body["cache"]["status"], "active");
}

#[tokio::test]
async fn empty_indexes_are_degraded() {
    let base = spawn(context(settings(), Storage::InMemory, false).await).await;
    let body: Value = reqwest::get(format!("{base}/api/health")).await.unwrap().json().await.unwrap();
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["movies"]["exists"], false);
    assert_eq!(body["help"]["index_status"], "not_created");
}

#[tokio::test]
async fn search_modes_over_http() {
    let base = spawn(loaded(false).await).await;
    let client = Client::new();

    let (status, body) =
        post(&client, format!("{base}/api/search/vector"), json!({ "query": "Murder movies with twist" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["search_type"], "vector");
    let count = body["count"].as_u64().unwrap();
    assert!(count > 0 && count <= 5);
    assert_eq!(body["results"].as_array().unwrap().len() as u64, count);
    assert!(body["results"][0]["document"].get("embedding").is_none());

    let (status, body) = post(
        &client,
        format!("{base}/api/search/filtered"),
        json!({ "query": "love story", "genre": "Romance", "min_rating": 7.0, "num_results": 10 }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let mut ids: Vec<String> =
        body["results"].as_array().unwrap().iter().map(|r| r["document"]["id"].as_str().unwrap().to_string()).collect();
    ids.sort();
    assert_eq!(ids, vec!["movie:6", "movie:7", "movie:8"]);
}

#[tokio::test]
async fn bad_search_requests_are_rejected() {
    let base = spawn(loaded(false).await).await;
    let client = Client::new();

    let (status, body) = post(&client, format!("{base}/api/search/fuzzy"), json!({ "query": "space" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid_query");

    let (status, body) =
        post(&client, format!("{base}/api/search/vector"), json!({ "query": "space", "num_results": 0 })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid_query");

    let (status, _) = post(&client, format!("{base}/api/search/keyword"), json!({ "query": "   " })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn chat_answers_then_serves_from_cache() {
    let base = spawn(loaded(false).await).await;
    let client = Client::new();
    let url = format!("{base}/api/help/chat");

    let (status, first) = post(&client, url.clone(), json!({ "message": "How do I reset my password?" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["answer"], ANSWER);
    assert_eq!(first["from_cache"], false);
    assert_eq!(first["token_usage"]["total_tokens"], 120);

    let (_, second) = post(&client, url, json!({ "message": "How do I reset my password?" })).await;
    assert_eq!(second["from_cache"], true);
    assert_eq!(second["answer"], ANSWER);

    let stats: Value = reqwest::get(format!("{base}/api/cache/stats")).await.unwrap().json().await.unwrap();
    assert_eq!(stats["num_entries"], 1);
}

#[tokio::test]
async fn off_topic_chat_is_blocked() {
    let base = spawn(loaded(false).await).await;
    let (status, body) =
        post(&Client::new(), format!("{base}/api/help/chat"), json!({ "message": "What's the weather?" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["blocked"], true);
    assert_eq!(body["sources"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn generation_failure_maps_to_bad_gateway() {
    let base = spawn(loaded(true).await).await;
    let (status, body) =
        post(&Client::new(), format!("{base}/api/help/chat"), json!({ "message": "How do I reset my password?" }))
            .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["kind"], "generation_failure");
    assert_eq!(body["stage"], "generation");
}

#[tokio::test]
async fn cache_store_query_and_clear() {
    let base = spawn(loaded(false).await).await;
    let client = Client::new();

    let (status, body) = post(
        &client,
        format!("{base}/api/cache/store"),
        json!({ "prompt": "How do I cancel my subscription?", "response": ANSWER }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stored"], true);

    let (_, hit) =
        post(&client, format!("{base}/api/cache/query"), json!({ "query": "How do I cancel my subscription?" })).await;
    assert_eq!(hit["hit"], true);
    assert_eq!(hit["response"], ANSWER);

    let (status, refused) = post(
        &client,
        format!("{base}/api/cache/store"),
        json!({ "prompt": "update email to jane@example.com", "response": "done" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(refused["message"].as_str().unwrap().contains("email"));

    let (_, cleared) = post(&client, format!("{base}/api/cache/clear"), json!({})).await;
    assert_eq!(cleared["cleared"], 1);

    let (_, miss) =
        post(&client, format!("{base}/api/cache/query"), json!({ "query": "How do I cancel my subscription?" })).await;
    assert_eq!(miss["hit"], false);
}

#[tokio::test]
async fn suggestions_and_help_stats() {
    let base = spawn(loaded(false).await).await;
    let body: Value = reqwest::get(format!("{base}/api/help/suggestions")).await.unwrap().json().await.unwrap();
    assert_eq!(body["suggestions"].as_array().unwrap().len(), 8);

    let stats: Value = reqwest::get(format!("{base}/api/help/stats")).await.unwrap().json().await.unwrap();
    assert_eq!(stats["index_name"], "help_articles");
    assert_eq!(stats["index_status"], "active");
}

#[tokio::test]
async fn admin_clear_and_recreate_movie_index() {
    let base = spawn(loaded(false).await).await;
    let client = Client::new();

    let (status, _) = post(&client, format!("{base}/api/admin/clear-data"), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    let health: Value = reqwest::get(format!("{base}/api/health")).await.unwrap().json().await.unwrap();
    assert_eq!(health["movies"]["num_docs"], 0);
    assert_eq!(health["status"], "degraded");

    let (status, report) = post(&client, format!("{base}/api/admin/create-index"), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["indexed"], 14);
}

#[tokio::test]
async fn persistent_storage_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = settings();
    settings.data.index_dir = dir.path().to_string_lossy().into_owned();

    let first = context(settings.clone(), Storage::Persistent, false).await;
    let report = first.reindex_movies(&ProgressBar::hidden()).await.unwrap();
    assert_eq!(report.indexed, 14);
    drop(first);

    let second = context(settings, Storage::Persistent, false).await;
    assert_eq!(second.movies.index().info().await.unwrap().num_docs, 14);
    let results = second
        .movies
        .search("Murder movies with twist", SearchMode::Vector, &SearchOptions::default())
        .await
        .unwrap();
    assert!(!results.is_empty());
}
