pub mod client;
pub mod context;
pub mod engine;
pub mod error;
pub mod search;

pub use client::{ChatClient, ChatInfo, ClientError, UserInfo};
pub use context::AppContext;
pub use engine::Indexer;
pub use error::IndexerError;
pub use search::SearchHit;
