//! JSON configuration read once at startup.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("config file {path} does not exist")]
  Missing { path: String },
  #[error("failed to read {path}: {source}")]
  Io {
    path: String,
    #[source]
    source: std::io::Error,
  },
  #[error("failed to parse {path}: {source}")]
  Parse {
    path: String,
    #[source]
    source: serde_json::Error,
  },
}

/// OCR endpoint; absent means OCR is disabled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrConfig {
  pub api_url: String,
}

fn default_dimensions() -> usize {
  1024
}

/// Remote embedding service; absent or keyless means embeddings are disabled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
  pub api_key: String,
  pub model_id: String,
  pub provider: String,
  /// Width of the vectors the model produces
  #[serde(default = "default_dimensions")]
  pub dimensions: usize,
}

impl Default for EmbeddingConfig {
  fn default() -> Self {
    Self {
      api_key: String::new(),
      model_id: "multimodal-embedding-v1".to_string(),
      provider: "dashscope".to_string(),
      dimensions: default_dimensions(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  pub bot_token: String,
  /// Chat used for admin notifications
  pub chat_id: i64,
  pub api_id: i64,
  pub api_hash: String,
  pub device_model: String,
  pub ocr_config: Option<OcrConfig>,
  pub embedding_config: Option<EmbeddingConfig>,
  /// Only "faiss" enables the vector index; anything else disables it.
  pub vector_database: Option<String>,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      bot_token: String::new(),
      chat_id: 0,
      api_id: 94575,
      api_hash: "a3406de8d171bb422bb6ddf3bbd800e2".to_string(),
      device_model: "Desktop".to_string(),
      ocr_config: None,
      embedding_config: None,
      vector_database: None,
    }
  }
}

impl Config {
  /// Load from a JSON file, read once at startup. A missing or unparsable
  /// file is an error; callers treat it as fatal.
  pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    if !path.exists() {
      warn!(path = %path.display(), "no config file found");
      return Err(ConfigError::Missing {
        path: path.display().to_string(),
      });
    }

    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
      path: path.display().to_string(),
      source,
    })?;
    serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
      path: path.display().to_string(),
      source,
    })
  }

  /// True when a supported embedding provider is configured with a key.
  pub fn embedding_enabled(&self) -> bool {
    self
      .embedding_config
      .as_ref()
      .is_some_and(|c| c.provider == "dashscope" && !c.api_key.is_empty())
  }

  /// True when the configured vector database backend is implemented.
  pub fn vector_index_enabled(&self) -> bool {
    self.vector_database.as_deref() == Some("faiss")
  }
}
