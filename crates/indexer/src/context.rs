//! Shared application context: the stores, the external services, and the
//! background snapshot task.

use crate::client::ChatClient;
use chatdex_core::Config;
use db::{RecordStore, StoreError};
use embedding::{DashScopeService, EmbeddingDispatcher};
use extract::{OcrClient, OcrService};
use index::{Metric, VectorIndex};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

const SNAPSHOT_INTERVAL: Duration = Duration::from_secs(30);

/// Plain owned handles to every subsystem. Optional members are disabled by
/// configuration or by non-fatal startup failures.
pub struct AppContext {
  pub config: Config,
  pub store: RecordStore,
  pub client: Arc<dyn ChatClient>,
  pub vector_index: Option<VectorIndex>,
  pub dispatcher: Option<EmbeddingDispatcher>,
  pub ocr: Option<Arc<dyn OcrService>>,
  vector_path: Option<PathBuf>,
  snapshot_task: Mutex<Option<JoinHandle<()>>>,
}

impl AppContext {
  /// Wire everything from configuration. The record store is mandatory;
  /// the vector index, the embedder, and OCR come up only when configured,
  /// and a vector-index load failure logs and disables vector search
  /// rather than aborting startup.
  pub fn initialize(config: Config, data_dir: &Path, client: Arc<dyn ChatClient>) -> Result<Self, StoreError> {
    let store = RecordStore::open(data_dir.join("messages.redb"))?;

    let mut ctx = Self::new(config.clone(), store, client);

    if let Some(ocr_config) = &config.ocr_config {
      ctx.ocr = Some(Arc::new(OcrClient::new(&ocr_config.api_url)));
    }

    if config.embedding_enabled()
      && let Some(embedding_config) = &config.embedding_config
    {
      let service = DashScopeService::new(&embedding_config.api_key, &embedding_config.model_id);
      ctx.dispatcher = Some(EmbeddingDispatcher::new(Arc::new(service)));

      if config.vector_index_enabled() {
        let vector_path = data_dir.join("vectors");
        let vector_index = VectorIndex::new(embedding_config.dimensions, Metric::L2);
        match vector_index.create_or_load(&vector_path) {
          Ok(()) => {
            info!(entries = vector_index.len(), "vector index ready");
            ctx.vector_index = Some(vector_index);
            ctx.vector_path = Some(vector_path);
          }
          Err(error) => {
            warn!(%error, "vector index unavailable, continuing without vector search");
          }
        }
      }
    }

    Ok(ctx)
  }

  pub fn new(config: Config, store: RecordStore, client: Arc<dyn ChatClient>) -> Self {
    Self {
      config,
      store,
      client,
      vector_index: None,
      dispatcher: None,
      ocr: None,
      vector_path: None,
      snapshot_task: Mutex::new(None),
    }
  }

  pub fn with_vector_index(mut self, index: VectorIndex, snapshot_path: impl Into<PathBuf>) -> Self {
    self.vector_index = Some(index);
    self.vector_path = Some(snapshot_path.into());
    self
  }

  pub fn with_dispatcher(mut self, dispatcher: EmbeddingDispatcher) -> Self {
    self.dispatcher = Some(dispatcher);
    self
  }

  pub fn with_ocr(mut self, ocr: Arc<dyn OcrService>) -> Self {
    self.ocr = Some(ocr);
    self
  }

  /// Persist the vector index now, if there is one.
  pub fn snapshot_vector_index(&self) {
    if let (Some(index), Some(path)) = (&self.vector_index, &self.vector_path)
      && let Err(error) = index.save(path)
    {
      error!(%error, "failed to snapshot vector index");
    }
  }

  /// Start the periodic snapshot task. The task holds only a weak handle,
  /// so dropping the context stops it; dropping also aborts it outright.
  pub fn start_snapshot_timer(self: &Arc<Self>) {
    if self.vector_index.is_none() {
      return;
    }
    let weak = Arc::downgrade(self);
    let handle = tokio::spawn(async move {
      let mut interval = tokio::time::interval(SNAPSHOT_INTERVAL);
      interval.tick().await; // immediate first tick
      loop {
        interval.tick().await;
        let Some(ctx) = weak.upgrade() else {
          break;
        };
        ctx.snapshot_vector_index();
      }
    });
    *self.snapshot_task.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
  }
}

impl Drop for AppContext {
  fn drop(&mut self) {
    if let Some(handle) = self.snapshot_task.lock().unwrap_or_else(|e| e.into_inner()).take() {
      handle.abort();
    }
  }
}
