//! Loads movie and help-article records from JSON into `Document`s.
//!
//! A source path may be a single `.json` file holding an array of records or a
//! directory, in which case every `.json` file below it is read in path order.

use crate::error::{Error, Result};
use crate::types::{Document, IndexSchema};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovieRecord {
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    pub title: String,
    #[serde(default)]
    pub genre: String,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub category: String,
    pub content: String,
}

pub struct DataProcessor {
    schema: IndexSchema,
}

impl DataProcessor {
    pub fn new(schema: IndexSchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &IndexSchema {
        &self.schema
    }

    pub fn load_movies(&self, path: &Path) -> Result<Vec<Document>> {
        let records: Vec<MovieRecord> = self.read_records(path)?;
        let docs = records
            .into_iter()
            .enumerate()
            .map(|(i, r)| {
                let raw_id = match r.id {
                    Some(serde_json::Value::String(s)) => s,
                    Some(v) if !v.is_null() => v.to_string(),
                    _ => (i + 1).to_string(),
                };
                let mut doc = Document::new(self.key(&raw_id), r.title, r.description).with_tag("genre", &r.genre);
                if let Some(rating) = r.rating {
                    doc = doc.with_numeric("rating", rating);
                }
                doc
            })
            .collect();
        Ok(docs)
    }

    pub fn load_articles(&self, path: &Path) -> Result<Vec<Document>> {
        let records: Vec<ArticleRecord> = self.read_records(path)?;
        Ok(records
            .into_iter()
            .map(|r| Document::new(self.key(&r.id), r.title, r.content).with_tag("category", &r.category))
            .collect())
    }

    /// Prefixes a raw record id with the index key prefix, once.
    pub fn key(&self, raw: &str) -> String {
        if raw.starts_with(&self.schema.prefix) {
            raw.to_string()
        } else {
            format!("{}{}", self.schema.prefix, raw)
        }
    }

    fn read_records<T: DeserializeOwned>(&self, path: &Path) -> Result<Vec<T>> {
        let files = list_json_files(path);
        if files.is_empty() {
            return Err(Error::NotFound(format!("no .json files under {}", path.display())));
        }
        let mut out = Vec::new();
        for file in &files {
            let raw = fs::read_to_string(file)
                .map_err(|e| Error::NotFound(format!("failed to read {}: {e}", file.display())))?;
            let mut records: Vec<T> = serde_json::from_str(&raw)
                .map_err(|e| Error::InvalidConfig(format!("malformed records in {}: {e}", file.display())))?;
            tracing::debug!(file = %file.display(), records = records.len(), "loaded records");
            out.append(&mut records);
        }
        Ok(out)
    }
}

fn list_json_files(root: &Path) -> Vec<PathBuf> {
    if root.is_file() {
        return vec![root.to_path_buf()];
    }
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("json"))
        .collect();
    files.sort();
    files
}
