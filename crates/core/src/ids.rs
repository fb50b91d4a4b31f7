//! Id encodings shared across the store, the vector index, and the engine.
//!
//! The messaging platform packs version bits into the low 20 bits of a
//! message id, so the nth message of a chat has external id `n << 20`. The
//! encoding is treated as opaque here: derive with [`external_id`], invert
//! with [`sequence_of`].

/// Bits reserved by the platform below the sequence number.
pub const EXTERNAL_ID_SHIFT: u32 = 20;

/// External message id of the nth message in a chat.
pub fn external_id(sequence: i64) -> i64 {
  sequence << EXTERNAL_ID_SHIFT
}

/// Sequence number a given external id corresponds to.
pub fn sequence_of(id: i64) -> i64 {
  id >> EXTERNAL_ID_SHIFT
}

/// Record-store key for a message id.
pub fn record_key(id: i64) -> String {
  id.to_string()
}

/// Modality of a dense vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EmbeddingKind {
  Text = 0,
  Image = 1,
}

impl EmbeddingKind {
  pub fn as_u8(self) -> u8 {
    self as u8
  }
}

impl TryFrom<u8> for EmbeddingKind {
  type Error = u8;

  fn try_from(value: u8) -> Result<Self, Self::Error> {
    match value {
      0 => Ok(EmbeddingKind::Text),
      1 => Ok(EmbeddingKind::Image),
      other => Err(other),
    }
  }
}

/// Vector-index key for one modality of one message: `"{id}:type-{kind}"`.
pub fn vector_key(message_id: i64, kind: EmbeddingKind) -> String {
  format!("{}:type-{}", message_id, kind.as_u8())
}

/// Message id a vector-index key refers to, stripping the `:type-*` suffix.
/// Keys without the suffix parse as plain ids.
pub fn record_id_of_vector_key(key: &str) -> Option<i64> {
  let id_part = key.split(":type-").next().unwrap_or(key);
  id_part.parse().ok()
}
