use std::fs;
use tempfile::TempDir;

use flixdb_core::config::Settings;
use flixdb_core::data_processor::DataProcessor;
use flixdb_core::types::IndexSchema;
use flixdb_core::Error;

#[test]
fn load_movies_prefixes_ids_and_normalizes_genre() {
    let tmp = TempDir::new().unwrap();
    let file = tmp.path().join("movies.json");
    fs::write(
        &file,
        r#"[
            {"id": 7, "title": "Heat", "genre": "Action", "rating": 8.3, "description": "A heist crew."},
            {"title": "Amelie", "genre": "Romance", "rating": 8.3, "description": "A shy waitress."}
        ]"#,
    )
    .unwrap();

    let processor = DataProcessor::new(IndexSchema::movies(384));
    let docs = processor.load_movies(&file).expect("load movies");

    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0].id, "movie:7");
    assert_eq!(docs[0].tag("genre"), Some("action"));
    assert_eq!(docs[0].numeric("rating"), Some(8.3));
    assert_eq!(docs[1].id, "movie:2", "missing ids fall back to position");
}

#[test]
fn load_articles_from_directory_reads_all_json_files() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    fs::create_dir_all(dir.join("billing")).unwrap();
    fs::write(
        dir.join("a.json"),
        r#"[{"id": "reset-password", "title": "Reset your password", "category": "Account", "content": "Use the forgot password link."}]"#,
    )
    .unwrap();
    fs::write(
        dir.join("billing").join("b.json"),
        r#"[{"id": "help:refunds", "title": "Refunds", "category": "Billing", "content": "Refunds take 5 days."}]"#,
    )
    .unwrap();
    fs::write(dir.join("notes.txt"), "ignored").unwrap();

    let processor = DataProcessor::new(IndexSchema::help_articles(384));
    let docs = processor.load_articles(dir).expect("load articles");

    let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["help:reset-password", "help:refunds"]);
    assert_eq!(docs[1].tag("category"), Some("billing"));
}

#[test]
fn empty_directory_is_not_found() {
    let tmp = TempDir::new().unwrap();
    let processor = DataProcessor::new(IndexSchema::movies(384));
    let err = processor.load_movies(tmp.path()).unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[test]
fn settings_defaults_validate() {
    let settings = Settings::default();
    settings.validate().expect("defaults are valid");
    assert_eq!(settings.search.default_num_results, 5);
    assert_eq!(settings.cache.name, "llmcache");
    assert_eq!(settings.cache.ttl_secs, 3600);
    assert_eq!(settings.generation.model, "gpt-4o-mini");
}

#[test]
fn settings_reject_out_of_range_alpha() {
    let mut settings = Settings::default();
    settings.search.default_hybrid_alpha = 1.5;
    assert!(matches!(settings.validate(), Err(Error::InvalidConfig(_))));
}

#[test]
fn settings_env_overrides_nested_keys() {
    figment::Jail::expect_with(|jail| {
        jail.set_env("APP_SEARCH__DEFAULT_NUM_RESULTS", "7");
        jail.set_env("APP_CACHE__TTL_SECS", "120");
        jail.create_file("config.toml", "[server]\nport = 9001\n")?;
        let settings = Settings::from_figment(Settings::figment_for("test")).expect("settings");
        assert_eq!(settings.search.default_num_results, 7);
        assert_eq!(settings.cache.ttl_secs, 120);
        assert_eq!(settings.server.port, 9001);
        Ok(())
    });
}
