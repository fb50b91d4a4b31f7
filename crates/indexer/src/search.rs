//! Query surface: vector search over the index plus the substring scan the
//! inline driver uses.

use crate::engine::Indexer;
use crate::error::IndexerError;
use chatdex_core::{EmbeddingKind, MessageRecord, record_id_of_vector_key, record_key};
use embedding::{Content, EmbeddingDispatcher};
use index::{SearchResult, VectorIndex};
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
  pub record: MessageRecord,
  /// Metric score straight from the vector index (L2: lower is closer)
  pub score: f32,
}

impl Indexer {
  /// Embed a text query and return the nearest records, best first.
  pub async fn search(&self, text: &str, top_k: usize) -> Result<Vec<SearchHit>, IndexerError> {
    let (dispatcher, vector_index) = self.vector_stack()?;
    let embedding = dispatcher.embed_text(text).await;
    let Some(query) = embedding.get(&EmbeddingKind::Text) else {
      debug!("text query produced no embedding");
      return Ok(Vec::new());
    };
    Ok(self.resolve_hits(vector_index.search(query, top_k)))
  }

  /// Search with an image file as the query. Requires a service whose text
  /// and image vectors share one space.
  pub async fn search_image(&self, image_path: &str, top_k: usize) -> Result<Vec<SearchHit>, IndexerError> {
    let (dispatcher, vector_index) = self.vector_stack()?;
    if !dispatcher.supports_aligned_image() {
      return Err(IndexerError::AlignedImageUnsupported);
    }
    let embedding = dispatcher.embed_content(Content::image(image_path)).await;
    let Some(query) = embedding.get(&EmbeddingKind::Image) else {
      debug!("image query produced no embedding");
      return Ok(Vec::new());
    };
    Ok(self.resolve_hits(vector_index.search(query, top_k)))
  }

  /// Combined text + image query. Both modalities are embedded, but the
  /// index is queried with the text vector; text is the primary channel.
  pub async fn search_multimodal(
    &self,
    text: &str,
    image_path: &str,
    top_k: usize,
  ) -> Result<Vec<SearchHit>, IndexerError> {
    let (dispatcher, vector_index) = self.vector_stack()?;
    let embedding = dispatcher.embed_multimodal(Some(text), Some(image_path)).await;
    let Some(query) = embedding.get(&EmbeddingKind::Text) else {
      debug!("multimodal query produced no text embedding");
      return Ok(Vec::new());
    };
    Ok(self.resolve_hits(vector_index.search(query, top_k)))
  }

  /// Case-sensitive containment scan over every textifyed value, in key
  /// order. This backs the inline-query style lookup.
  pub fn scan_substring(&self, query: &str, limit: usize) -> Vec<MessageRecord> {
    self
      .context()
      .store
      .records()
      .into_iter()
      .filter(|(_, record)| record.textifyed_contents.values().any(|value| value.contains(query)))
      .map(|(_, record)| record)
      .take(limit)
      .collect()
  }

  fn vector_stack(&self) -> Result<(&EmbeddingDispatcher, &VectorIndex), IndexerError> {
    let ctx = self.context();
    match (&ctx.dispatcher, &ctx.vector_index) {
      (Some(dispatcher), Some(vector_index)) => Ok((dispatcher, vector_index)),
      _ => Err(IndexerError::VectorSearchUnavailable),
    }
  }

  /// Map hit keys back to records, preserving index order and dropping
  /// hits whose record has vanished.
  fn resolve_hits(&self, results: Vec<SearchResult>) -> Vec<SearchHit> {
    results
      .into_iter()
      .filter_map(|hit| {
        let id = record_id_of_vector_key(&hit.key)?;
        let record = self.context().store.get(&record_key(id))?;
        Some(SearchHit {
          record,
          score: hit.score,
        })
      })
      .collect()
  }
}
