use async_trait::async_trait;
use chatdex_core::EmbeddingKind;
use std::collections::BTreeMap;

/// One embeddable item: free text, an image, a remote video, or a
/// combination. Local image paths are rewritten to base64 data URIs before
/// dispatch; `http(s)` URLs pass through verbatim.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Content {
  pub text: Option<String>,
  pub image_path: Option<String>,
  pub video_path: Option<String>,
}

impl Content {
  pub fn text(text: impl Into<String>) -> Self {
    Self {
      text: Some(text.into()),
      ..Self::default()
    }
  }

  pub fn image(path: impl Into<String>) -> Self {
    Self {
      image_path: Some(path.into()),
      ..Self::default()
    }
  }

  pub fn is_empty(&self) -> bool {
    self.text.as_deref().is_none_or(str::is_empty)
      && self.image_path.as_deref().is_none_or(str::is_empty)
      && self.video_path.as_deref().is_none_or(str::is_empty)
  }
}

/// Per-content result: one dense vector per modality the service produced.
/// An empty map is the sentinel for "embedding failed / unavailable".
pub type Embedding = BTreeMap<EmbeddingKind, Vec<f32>>;

#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
  #[error("no contents provided for embedding")]
  EmptyBatch,
  #[error("content at position {0} has no text, image, or video")]
  EmptyContent(usize),
  #[error("unsupported image format: {0}")]
  UnsupportedImageFormat(String),
  #[error("local video files are not supported: {0}")]
  LocalVideo(String),
  #[error("failed to read image file {path}: {source}")]
  ImageRead {
    path: String,
    #[source]
    source: std::io::Error,
  },
  #[error("request failed: {0}")]
  Request(#[from] reqwest::Error),
  #[error("service returned status {status}: {body}")]
  Status { status: u16, body: String },
  #[error("unexpected response: {0}")]
  Response(String),
}

/// A remote multimodal embedding service.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
  fn id(&self) -> String;

  /// Whether text and image vectors share one space, making cross-modal
  /// nearest-neighbour queries meaningful.
  fn supports_aligned_image(&self) -> bool;

  /// Embed every content, preserving order: `result[i]` belongs to
  /// `contents[i]`.
  async fn embed(&self, contents: &[Content]) -> Result<Vec<Embedding>, EmbeddingError>;
}
