//! Layered configuration and path helpers.
//!
//! Figment merges built-in defaults, `config.toml`, `config.<env>.toml` and
//! `APP_*` env vars (nested keys split on `__`, e.g. `APP_SEARCH__DEFAULT_NUM_RESULTS`).
//! `RUST_ENV` picks the env file. Paths expand `~` and `${VAR}`.

use crate::error::{Error, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    pub index_dir: String,
    pub movies_path: String,
    pub articles_path: String,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            index_dir: "./data/indexes".into(),
            movies_path: "./test_data/movies.json".into(),
            articles_path: "./test_data/help_articles.json".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub model_dir: String,
    pub dim: usize,
    pub max_len: usize,
    pub use_fake: bool,
    pub cache_ttl_secs: u64,
    pub cache_capacity: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            model_dir: "./models/all-MiniLM-L6-v2".into(),
            dim: 384,
            max_len: 256,
            use_fake: false,
            cache_ttl_secs: 600,
            cache_capacity: 4096,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub default_num_results: i64,
    pub max_num_results: i64,
    pub default_distance_threshold: f32,
    pub range_num_results: usize,
    pub default_hybrid_alpha: f32,
    pub hybrid_candidate_factor: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            default_num_results: 5,
            max_num_results: 50,
            default_distance_threshold: 0.5,
            range_num_results: 20,
            default_hybrid_alpha: 0.5,
            hybrid_candidate_factor: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub name: String,
    pub ttl_secs: u64,
    pub distance_threshold: f32,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self { name: "llmcache".into(), ttl_secs: 3600, distance_threshold: 0.1 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardrailSettings {
    pub distance_threshold: f32,
}

impl Default for GuardrailSettings {
    fn default() -> Self {
        Self { distance_threshold: 0.5 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HelpSettings {
    pub num_articles: usize,
}

impl Default for HelpSettings {
    fn default() -> Self {
        Self { num_articles: 3 }
    }
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub api_base: String,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com".into(),
            model: "gpt-4o-mini".into(),
            api_key: None,
            temperature: 0.7,
            max_tokens: 500,
        }
    }
}

impl std::fmt::Debug for GenerationSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationSettings")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    pub embedding_ms: u64,
    pub retrieval_ms: u64,
    pub generation_ms: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self { embedding_ms: 10_000, retrieval_ms: 10_000, generation_ms: 30_000 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { host: "127.0.0.1".into(), port: 8000 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub data: DataSettings,
    pub embedding: EmbeddingSettings,
    pub search: SearchSettings,
    pub cache: CacheSettings,
    pub guardrail: GuardrailSettings,
    pub help: HelpSettings,
    pub generation: GenerationSettings,
    pub timeouts: TimeoutSettings,
    pub server: ServerSettings,
}

impl Settings {
    pub fn load() -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        Self::from_figment(Self::figment_for(&env_name))
    }

    /// Defaults plus `APP_*` env only; ignores config files.
    pub fn from_env() -> Result<Self> {
        Self::from_figment(Figment::from(Serialized::defaults(Settings::default())).merge(app_env()))
    }

    pub fn figment_for(env_name: &str) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Settings::default())).merge(Toml::file("config.toml"));
        match env_name {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment.merge(app_env())
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let mut settings: Settings =
            figment.extract().map_err(|e| Error::InvalidConfig(format!("failed to load settings: {e}")))?;
        if settings.generation.api_key.as_deref().map_or(true, str::is_empty) {
            settings.generation.api_key = env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty());
        }
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        let s = &self.search;
        if s.max_num_results < 1 {
            return Err(Error::InvalidConfig("search.max_num_results must be >= 1".into()));
        }
        if s.default_num_results < 1 || s.default_num_results > s.max_num_results {
            return Err(Error::InvalidConfig(format!(
                "search.default_num_results must be within 1..={}",
                s.max_num_results
            )));
        }
        if !(0.0..=1.0).contains(&s.default_hybrid_alpha) {
            return Err(Error::InvalidConfig("search.default_hybrid_alpha must be within [0, 1]".into()));
        }
        for (key, value) in [
            ("search.default_distance_threshold", s.default_distance_threshold),
            ("cache.distance_threshold", self.cache.distance_threshold),
            ("guardrail.distance_threshold", self.guardrail.distance_threshold),
        ] {
            if !(0.0..=2.0).contains(&value) {
                return Err(Error::InvalidConfig(format!("{key} must be within [0, 2]")));
            }
        }
        if s.range_num_results == 0 || s.hybrid_candidate_factor == 0 {
            return Err(Error::InvalidConfig("search candidate counts must be positive".into()));
        }
        if self.embedding.dim == 0 {
            return Err(Error::InvalidConfig("embedding.dim must be positive".into()));
        }
        if self.help.num_articles == 0 {
            return Err(Error::InvalidConfig("help.num_articles must be positive".into()));
        }
        Ok(())
    }

    pub fn index_dir(&self) -> PathBuf {
        expand_path(&self.data.index_dir)
    }
}

fn app_env() -> Env {
    Env::prefixed("APP_").split("__")
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}
