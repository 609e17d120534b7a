use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use flixdb_core::config::GenerationSettings;
use flixdb_core::traits::Generator;
use flixdb_core::types::{Generation, Prompt, TokenUsage};
use flixdb_core::{Error, Result};

/// Client for any OpenAI-compatible `/v1/chat/completions` endpoint. Without
/// an API key no `Authorization` header is sent, which suits local servers.
#[derive(Clone)]
pub struct OpenAiGenerator {
    base_url: String,
    model: String,
    api_key: Option<String>,
    client: Client,
}

impl OpenAiGenerator {
    pub fn new(settings: &GenerationSettings) -> Result<Self> {
        if settings.model.trim().is_empty() {
            return Err(Error::InvalidConfig("generation.model must not be empty".into()));
        }
        Ok(Self {
            base_url: settings.api_base.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            api_key: settings.api_key.clone().filter(|k| !k.trim().is_empty()),
            client: Client::new(),
        })
    }
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
    usage: Option<TokenUsage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[async_trait]
impl Generator for OpenAiGenerator {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &Prompt) -> Result<Generation> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = json!({
            "model": self.model,
            "messages": prompt.messages,
            "temperature": prompt.temperature,
            "max_tokens": prompt.max_tokens,
            "stream": false,
        });

        let mut req = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let res = req.send().await.map_err(Error::generation)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(Error::GenerationFailure(format!("chat completion returned {status}: {text}")));
        }

        let payload: CompletionResponse = res.json().await.map_err(Error::generation)?;
        let text = payload
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| Error::generation("chat completion returned no content"))?;

        if let Some(u) = &payload.usage {
            tracing::info!(model = %self.model, total_tokens = u.total_tokens, "generated answer");
        }
        Ok(Generation { text, usage: payload.usage })
    }
}
