//! Debounced front door to the embedding service.
//!
//! Individual embedding requests from concurrent indexing tasks are
//! coalesced for 1500 ms and dispatched as one service call. Failures never
//! propagate: every waiter in a failed batch receives the empty-map
//! sentinel, which downstream code reads as "no embedding".

use crate::debounce::BatchDebouncePool;
use crate::service::{Content, Embedding, EmbeddingService};
use chatdex_core::EmbeddingKind;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// How long a request waits to be batched with its peers.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(1500);

pub struct EmbeddingDispatcher {
  service: Arc<dyn EmbeddingService>,
  pool: BatchDebouncePool<Content, Embedding>,
}

impl EmbeddingDispatcher {
  pub fn new(service: Arc<dyn EmbeddingService>) -> Self {
    Self::with_window(service, DEBOUNCE_WINDOW)
  }

  pub fn with_window(service: Arc<dyn EmbeddingService>, window: Duration) -> Self {
    let handler_service = Arc::clone(&service);
    let pool = BatchDebouncePool::new(window, move |contents: Vec<Content>| {
      let service = Arc::clone(&handler_service);
      async move {
        let expected = contents.len();
        match service.embed(&contents).await {
          Ok(embeddings) if embeddings.len() == expected => embeddings,
          Ok(embeddings) => {
            warn!(expected, got = embeddings.len(), "embedding service returned short batch");
            vec![Embedding::new(); expected]
          }
          Err(error) => {
            warn!(%error, "embedding batch failed, delivering empty embeddings");
            vec![Embedding::new(); expected]
          }
        }
      }
    });
    Self { service, pool }
  }

  pub fn service_id(&self) -> String {
    self.service.id()
  }

  pub fn supports_aligned_image(&self) -> bool {
    self.service.supports_aligned_image()
  }

  /// Embed one content. An empty map means the embedding failed.
  pub async fn embed_content(&self, content: Content) -> Embedding {
    self.pool.add_task(content).await
  }

  pub async fn embed_text(&self, text: &str) -> Embedding {
    self.embed_content(Content::text(text)).await
  }

  /// Embed text and a local image as two independent contents, so each
  /// sub-embedding reflects only its own modality, then merge the kinds
  /// back into one result.
  pub async fn embed_multimodal(&self, text: Option<&str>, image_path: Option<&str>) -> Embedding {
    let text = text.filter(|t| !t.is_empty());
    let image_path = image_path.filter(|p| !p.is_empty());

    match (text, image_path) {
      (Some(text), Some(image_path)) => {
        let (mut text_result, image_result) =
          tokio::join!(self.embed_content(Content::text(text)), self.embed_content(Content::image(image_path)));
        if let Some(vector) = image_result.get(&EmbeddingKind::Image) {
          text_result.insert(EmbeddingKind::Image, vector.clone());
        }
        text_result
      }
      (Some(text), None) => self.embed_content(Content::text(text)).await,
      (None, Some(image_path)) => self.embed_content(Content::image(image_path)).await,
      (None, None) => Embedding::new(),
    }
  }
}
