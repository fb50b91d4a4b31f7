//! DashScope multimodal embedding client.
//!
//! Requests go out in chunks of at most [`MAX_BATCH`] contents, one second
//! apart, each with a fresh HTTP client so retries never inherit connection
//! state. Transport errors and non-200 responses are retried up to three
//! times before surfacing.

use crate::service::{Content, Embedding, EmbeddingError, EmbeddingService};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chatdex_core::EmbeddingKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};

/// Most contents allowed in one HTTP request.
pub const MAX_BATCH: usize = 20;

const BATCH_PAUSE: Duration = Duration::from_secs(1);
const MAX_RETRIES: u32 = 3;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(50);
const ENDPOINT: &str = "https://dashscope.aliyuncs.com/api/v1/services/embeddings/multimodal-embedding/multimodal-embedding";

#[derive(Debug, Clone)]
pub struct DashScopeService {
  api_key: String,
  model_id: String,
  endpoint: String,
}

impl DashScopeService {
  pub fn new(api_key: impl Into<String>, model_id: impl Into<String>) -> Self {
    Self {
      api_key: api_key.into(),
      model_id: model_id.into(),
      endpoint: ENDPOINT.to_string(),
    }
  }

  pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
    self.endpoint = endpoint.into();
    self
  }

  async fn embed_chunk(&self, contents: &[RequestContent]) -> Result<Vec<Embedding>, EmbeddingError> {
    let request = EmbeddingRequest {
      model: &self.model_id,
      input: RequestInput { contents },
      parameters: EmptyParameters {},
    };

    let mut attempt: u32 = 0;
    let response = loop {
      // Fresh client per attempt; retries never reuse connection state.
      let client = reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(REQUEST_TIMEOUT)
        .build()?;

      let result = client
        .post(&self.endpoint)
        .header("Authorization", format!("Bearer {}", self.api_key))
        .json(&request)
        .send()
        .await;

      match result {
        Ok(response) if response.status().is_success() => break response,
        Ok(response) => {
          let status = response.status().as_u16();
          let body = response.text().await.unwrap_or_default();
          error!(status, body, "embedding service returned an error");
          if attempt < MAX_RETRIES {
            attempt += 1;
            info!(attempt, "retrying embedding request");
            continue;
          }
          return Err(EmbeddingError::Status { status, body });
        }
        Err(error) => {
          error!(%error, "embedding request failed");
          if attempt < MAX_RETRIES {
            attempt += 1;
            info!(attempt, "retrying embedding request");
            continue;
          }
          return Err(error.into());
        }
      }
    };

    let parsed: EmbeddingResponse = response
      .json()
      .await
      .map_err(|e| EmbeddingError::Response(e.to_string()))?;

    let mut embeddings = vec![Embedding::new(); contents.len()];
    for entry in parsed.output.embeddings {
      let kind = match entry.kind.as_str() {
        "text" => EmbeddingKind::Text,
        "image" => EmbeddingKind::Image,
        other => {
          return Err(EmbeddingError::Response(format!("unsupported embedding type: {other}")));
        }
      };
      let slot = embeddings
        .get_mut(entry.index)
        .ok_or_else(|| EmbeddingError::Response(format!("embedding index {} out of range", entry.index)))?;
      slot.insert(kind, entry.embedding);
    }
    Ok(embeddings)
  }
}

#[async_trait]
impl EmbeddingService for DashScopeService {
  fn id(&self) -> String {
    format!("dashscope-{}", self.model_id)
  }

  fn supports_aligned_image(&self) -> bool {
    true
  }

  async fn embed(&self, contents: &[Content]) -> Result<Vec<Embedding>, EmbeddingError> {
    if contents.is_empty() {
      error!("no contents provided for embedding");
      return Err(EmbeddingError::EmptyBatch);
    }
    debug!(contents = contents.len(), "batch embedding");

    let normalized = contents
      .iter()
      .enumerate()
      .map(|(position, content)| normalize(content, position))
      .collect::<Result<Vec<_>, _>>()?;

    let mut results = Vec::with_capacity(contents.len());
    let mut first = true;
    for chunk in normalized.chunks(MAX_BATCH) {
      if !first {
        tokio::time::sleep(BATCH_PAUSE).await;
      }
      first = false;
      results.extend(self.embed_chunk(chunk).await?);
    }
    Ok(results)
  }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
  model: &'a str,
  input: RequestInput<'a>,
  parameters: EmptyParameters,
}

#[derive(Debug, Serialize)]
struct RequestInput<'a> {
  contents: &'a [RequestContent],
}

#[derive(Debug, Serialize)]
struct EmptyParameters {}

#[derive(Debug, Clone, Serialize, PartialEq)]
struct RequestContent {
  #[serde(skip_serializing_if = "Option::is_none")]
  text: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  image: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  video: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
  output: ResponseOutput,
}

#[derive(Debug, Deserialize)]
struct ResponseOutput {
  embeddings: Vec<ResponseEmbedding>,
}

#[derive(Debug, Deserialize)]
struct ResponseEmbedding {
  index: usize,
  embedding: Vec<f32>,
  #[serde(rename = "type")]
  kind: String,
}

/// Rewrite one content into the wire shape: local images become base64 data
/// URIs, remote URLs pass through, local videos are rejected.
fn normalize(content: &Content, position: usize) -> Result<RequestContent, EmbeddingError> {
  if content.is_empty() {
    error!(position, "empty content in embedding batch");
    return Err(EmbeddingError::EmptyContent(position));
  }

  let mut out = RequestContent {
    text: content.text.clone().filter(|t| !t.is_empty()),
    image: None,
    video: None,
  };

  if let Some(path) = content.image_path.as_deref().filter(|p| !p.is_empty()) {
    if path.starts_with("http") {
      out.image = Some(path.to_string());
    } else {
      out.image = Some(image_data_uri(path)?);
    }
  }

  if let Some(path) = content.video_path.as_deref().filter(|p| !p.is_empty()) {
    if path.starts_with("http") {
      out.video = Some(path.to_string());
    } else {
      error!(path, "local video files cannot be embedded");
      return Err(EmbeddingError::LocalVideo(path.to_string()));
    }
  }

  Ok(out)
}

fn image_data_uri(path: &str) -> Result<String, EmbeddingError> {
  let extension = path.rsplit('.').next().unwrap_or_default().to_ascii_lowercase();
  let mime = match extension.as_str() {
    "jpg" | "jpeg" => "jpeg",
    "png" => "png",
    "webp" => "webp",
    _ => {
      error!(path, "unsupported image format");
      return Err(EmbeddingError::UnsupportedImageFormat(extension));
    }
  };

  let bytes = std::fs::read(path).map_err(|source| EmbeddingError::ImageRead {
    path: path.to_string(),
    source,
  })?;
  Ok(format!("data:image/{mime};base64,{}", BASE64.encode(bytes)))
}
