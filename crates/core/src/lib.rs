pub mod config;
pub mod ids;
pub mod record;

pub use config::{Config, ConfigError, EmbeddingConfig, OcrConfig};
pub use ids::{EmbeddingKind, external_id, record_id_of_vector_key, record_key, sequence_of, vector_key};
pub use record::{MessageRecord, Sender};
