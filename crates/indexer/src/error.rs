use crate::client::ClientError;
use db::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum IndexerError {
  #[error("message is null and no usable ids were provided")]
  MissingMessage,
  #[error("failed to resolve sender of message {message_id}: {source}")]
  Sender {
    message_id: i64,
    #[source]
    source: ClientError,
  },
  #[error("unknown sender kind for message {message_id}")]
  UnknownSender { message_id: i64 },
  #[error("unknown content type '{type_name}' for message {message_id}")]
  UnknownContent { message_id: i64, type_name: String },
  #[error("store error: {0}")]
  Store(#[from] StoreError),
  #[error("client error: {0}")]
  Client(#[from] ClientError),
  #[error("vector search is not configured")]
  VectorSearchUnavailable,
  #[error("embedding service does not support aligned image search")]
  AlignedImageUnsupported,
}
