//! Dataset registry: reference articles and per-source summaries.
//!
//! A dataset directory holds two JSON documents:
//! - `articles.json`: key -> reference article text
//! - `responses.json`: source model -> key -> summary text
//!
//! Item keys are iterated in sorted order so a run can be resumed by offset.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Source models whose summaries are compared by default.
///
/// Drivers always take the source list as an explicit parameter; this is the
/// documented default for callers without a custom selection.
pub const DEFAULT_SOURCES: &[&str] = &["human", "gpt35", "gpt4"];

pub fn default_sources() -> Vec<String> {
    DEFAULT_SOURCES.iter().map(|s| s.to_string()).collect()
}

/// Map a fine-tuned model id to its summary-retrieval bucket.
///
/// Fine-tuning variants of gpt-3.5 (e.g. "cnn_10_ft_gpt35") share the base
/// model's summaries; the exact id is still used for the API calls.
pub fn normalize_source_name(model: &str) -> &str {
    if model.ends_with("gpt35") {
        "gpt35"
    } else {
        model
    }
}

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("dataset has no summaries for source '{source_name}'")]
    UnknownSource { source_name: String },
    #[error("source '{source_name}' has no summary for key '{key}'")]
    MissingSummary { source_name: String, key: String },
    #[error("no article for key '{key}'")]
    MissingArticle { key: String },
}

#[derive(Debug, Deserialize)]
struct ArticlesFile(HashMap<String, String>);

#[derive(Debug, Deserialize)]
struct ResponsesFile(HashMap<String, HashMap<String, String>>);

/// An in-memory dataset: articles, per-source summaries, and the stable key
/// order drivers iterate over.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub name: String,
    articles: HashMap<String, String>,
    responses: HashMap<String, HashMap<String, String>>,
    keys: Vec<String>,
}

impl Dataset {
    /// Load `{data_dir}/{name}/articles.json` and `{data_dir}/{name}/responses.json`.
    pub fn load(data_dir: impl AsRef<Path>, name: &str) -> Result<Self, DatasetError> {
        let dir = data_dir.as_ref().join(name);
        let articles: ArticlesFile = read_json(&dir.join("articles.json"))?;
        let responses: ResponsesFile = read_json(&dir.join("responses.json"))?;
        Ok(Self::from_parts(name, articles.0, responses.0))
    }

    /// Build from already-loaded maps. Keys are sorted for a stable order.
    pub fn from_parts(
        name: &str,
        articles: HashMap<String, String>,
        responses: HashMap<String, HashMap<String, String>>,
    ) -> Self {
        let mut keys: Vec<String> = articles.keys().cloned().collect();
        keys.sort();
        Self {
            name: name.to_string(),
            articles,
            responses,
            keys,
        }
    }

    /// Item keys in stable (sorted) order.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn article(&self, key: &str) -> Result<&str, DatasetError> {
        self.articles
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| DatasetError::MissingArticle {
                key: key.to_string(),
            })
    }

    /// Summary produced by `source` for `key`. The source name is normalized
    /// through the gpt35 fine-tune bucket rule.
    pub fn summary(&self, source: &str, key: &str) -> Result<&str, DatasetError> {
        let source = normalize_source_name(source);
        let per_key = self
            .responses
            .get(source)
            .ok_or_else(|| DatasetError::UnknownSource {
                source_name: source.to_string(),
            })?;
        per_key
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| DatasetError::MissingSummary {
                source_name: source.to_string(),
                key: key.to_string(),
            })
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, DatasetError> {
    let bytes = std::fs::read(path).map_err(|source| DatasetError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| DatasetError::Json {
        path: path.to_path_buf(),
        source,
    })
}
