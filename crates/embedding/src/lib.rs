pub mod dashscope;
pub mod debounce;
pub mod dispatcher;
pub mod service;

pub use dashscope::DashScopeService;
pub use debounce::BatchDebouncePool;
pub use dispatcher::EmbeddingDispatcher;
pub use service::{Content, Embedding, EmbeddingError, EmbeddingService};
