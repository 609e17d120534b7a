use async_trait::async_trait;
use std::hash::Hasher;
use twox_hash::XxHash64;

use flixdb_core::math::l2_normalize;
use flixdb_core::traits::Embedder;
use flixdb_core::types::Embedding;

const BUCKETS_PER_TOKEN: u64 = 8;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "can", "do", "does", "for", "from", "how", "i", "if",
    "in", "into", "is", "it", "its", "me", "my", "no", "not", "of", "on", "or", "our", "so", "such", "that", "the",
    "their", "then", "there", "these", "they", "this", "to", "was", "we", "what", "whats", "when", "where", "which",
    "why", "will", "with", "you", "your",
];

/// Deterministic embedder built on signed feature hashing of content words.
///
/// Texts sharing content words land close together and texts with disjoint
/// vocabularies are orthogonal, which is enough for offline runs and tests.
/// Not a semantic model.
pub struct HashingEmbedder {
    dim: usize,
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    pub fn embed_text(&self, text: &str) -> Embedding {
        let mut v = vec![0f32; self.dim];
        for token in content_tokens(text) {
            for seed in 0..BUCKETS_PER_TOKEN {
                let mut hasher = XxHash64::with_seed(seed);
                hasher.write(token.as_bytes());
                let h = hasher.finish();
                let idx = (h % self.dim as u64) as usize;
                let sign = if (h >> 63) == 0 { 1.0 } else { -1.0 };
                v[idx] += sign;
            }
        }
        l2_normalize(&mut v);
        v
    }
}

pub(crate) fn content_tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|t| t.chars().count() >= 2 && !STOPWORDS.contains(&t.as_str()))
        .collect()
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn model_id(&self) -> &str {
        "hashing-xxh64"
    }

    fn dim(&self) -> usize {
        self.dim
    }

    async fn embed_batch(&self, texts: &[String]) -> flixdb_core::Result<Vec<Embedding>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_drop_stopwords_and_punctuation() {
        assert_eq!(content_tokens("How do I reset my password?"), vec!["reset", "password"]);
        assert_eq!(content_tokens("What's the weather?"), vec!["weather"]);
    }
}
