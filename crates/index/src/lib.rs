//! Thread-safe flat dense-vector index with string keys.
//!
//! Vectors live in one row-major buffer scanned exhaustively on search. The
//! buffer has no native delete, so `remove` rebuilds it from the surviving
//! keys; internal ids are reassigned in the process and must be treated as
//! opaque and non-stable by callers.

mod snapshot;

pub use snapshot::IndexError;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use tracing::{error, warn};

/// Distance function of an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
  /// Squared euclidean distance, lower is better
  L2 = 0,
  /// Dot product, higher is better
  InnerProduct = 1,
}

impl Metric {
  pub(crate) fn from_code(code: i32) -> Option<Self> {
    match code {
      0 => Some(Metric::L2),
      1 => Some(Metric::InnerProduct),
      _ => None,
    }
  }
}

/// One search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
  pub key: String,
  pub score: f32,
}

pub(crate) struct Inner {
  pub dimension: usize,
  pub metric: Metric,
  /// Row-major vector data; row i belongs to internal id i
  pub data: Vec<f32>,
  pub key_to_id: HashMap<String, i64>,
  /// Reverse map; removed rows leave an empty-string tombstone until rebuild
  pub id_to_key: Vec<String>,
  pub next_id: i64,
}

impl Inner {
  fn new(dimension: usize, metric: Metric) -> Self {
    Self {
      dimension,
      metric,
      data: Vec::new(),
      key_to_id: HashMap::new(),
      id_to_key: Vec::new(),
      next_id: 0,
    }
  }

  fn ntotal(&self) -> usize {
    self.data.len() / self.dimension
  }

  fn row(&self, id: usize) -> &[f32] {
    &self.data[id * self.dimension..(id + 1) * self.dimension]
  }

  fn push_row(&mut self, key: &str, vector: &[f32]) {
    let id = self.next_id;
    self.next_id += 1;
    self.data.extend_from_slice(vector);
    self.key_to_id.insert(key.to_string(), id);
    let slot = id as usize;
    if slot >= self.id_to_key.len() {
      self.id_to_key.resize(slot + 1, String::new());
    }
    self.id_to_key[slot] = key.to_string();
  }

  /// Re-insert every live key into a fresh buffer. Ids are reassigned.
  fn rebuild(&mut self) {
    let mut data = Vec::with_capacity(self.data.len());
    let mut key_to_id = HashMap::with_capacity(self.key_to_id.len());
    let mut id_to_key = Vec::with_capacity(self.key_to_id.len());
    let mut next_id: i64 = 0;

    for old_id in 0..self.ntotal() {
      let Some(key) = self.id_to_key.get(old_id) else {
        break;
      };
      if key.is_empty() || !self.key_to_id.contains_key(key) {
        continue;
      }
      data.extend_from_slice(self.row(old_id));
      key_to_id.insert(key.clone(), next_id);
      id_to_key.push(key.clone());
      next_id += 1;
    }

    self.data = data;
    self.key_to_id = key_to_id;
    self.id_to_key = id_to_key;
    self.next_id = next_id;
  }
}

/// Flat vector index. Every operation takes the single internal lock.
pub struct VectorIndex {
  pub(crate) inner: Mutex<Inner>,
}

impl VectorIndex {
  pub fn new(dimension: usize, metric: Metric) -> Self {
    Self {
      inner: Mutex::new(Inner::new(dimension, metric)),
    }
  }

  pub fn dimension(&self) -> usize {
    self.lock().dimension
  }

  pub fn metric(&self) -> Metric {
    self.lock().metric
  }

  /// Number of live vectors.
  pub fn len(&self) -> usize {
    self.lock().key_to_id.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Add a vector under a new key. Returns false (and changes nothing) if
  /// the key is already present or the dimension does not match.
  pub fn add(&self, key: &str, vector: &[f32]) -> bool {
    let mut inner = self.lock();
    if inner.key_to_id.contains_key(key) {
      return false;
    }
    if vector.len() != inner.dimension {
      error!(
        key,
        expected = inner.dimension,
        got = vector.len(),
        "vector dimension mismatch on add"
      );
      return false;
    }
    inner.push_row(key, vector);
    true
  }

  /// Nearest neighbours of `query`, best first. A query of the wrong
  /// dimension, an empty index, or `top_k == 0` all yield an empty result.
  pub fn search(&self, query: &[f32], top_k: usize) -> Vec<SearchResult> {
    let inner = self.lock();
    if query.len() != inner.dimension {
      error!(
        expected = inner.dimension,
        got = query.len(),
        "query vector dimension mismatch"
      );
      return Vec::new();
    }
    if top_k == 0 || inner.ntotal() == 0 {
      return Vec::new();
    }

    let mut scored: Vec<(usize, f32)> = Vec::with_capacity(inner.ntotal());
    for id in 0..inner.ntotal() {
      match inner.id_to_key.get(id) {
        Some(key) if !key.is_empty() && inner.key_to_id.contains_key(key) => {}
        _ => continue,
      }
      let row = inner.row(id);
      let score = match inner.metric {
        Metric::L2 => row.iter().zip(query).map(|(a, b)| (a - b) * (a - b)).sum(),
        Metric::InnerProduct => row.iter().zip(query).map(|(a, b)| a * b).sum(),
      };
      scored.push((id, score));
    }

    match inner.metric {
      Metric::L2 => scored.sort_by(|a, b| a.1.total_cmp(&b.1)),
      Metric::InnerProduct => scored.sort_by(|a, b| b.1.total_cmp(&a.1)),
    }
    scored.truncate(top_k);

    scored
      .into_iter()
      .map(|(id, score)| SearchResult {
        key: inner.id_to_key[id].clone(),
        score,
      })
      .collect()
  }

  /// Remove a key and rebuild the underlying buffer. Returns false if the
  /// key was not present.
  pub fn remove(&self, key: &str) -> bool {
    let mut inner = self.lock();
    if inner.key_to_id.remove(key).is_none() {
      return false;
    }
    inner.rebuild();
    true
  }

  /// Replace the vector stored under an existing key. Returns false if the
  /// key is absent or the dimension does not match.
  pub fn update(&self, key: &str, vector: &[f32]) -> bool {
    let mut inner = self.lock();
    if !inner.key_to_id.contains_key(key) {
      return false;
    }
    if vector.len() != inner.dimension {
      error!(key, "vector dimension mismatch on update");
      return false;
    }
    inner.key_to_id.remove(key);
    inner.rebuild();
    inner.push_row(key, vector);
    true
  }

  /// Persist to `<path>.faissidx` / `.key2id` / `.id2key` / `.meta`. The
  /// four files are written independently; a crash can leave a partial set,
  /// which `load` refuses.
  pub fn save(&self, path: impl AsRef<Path>) -> Result<(), IndexError> {
    let inner = self.lock();
    snapshot::save(&inner, path.as_ref())
  }

  /// Restore from a snapshot. A missing or truncated file leaves the index
  /// unchanged; a dimension mismatch empties it back to the configured
  /// dimension. Both are reported as errors.
  pub fn load(&self, path: impl AsRef<Path>) -> Result<(), IndexError> {
    let mut inner = self.lock();
    let dimension = inner.dimension;
    let metric = inner.metric;
    match snapshot::load(path.as_ref(), dimension) {
      Ok(loaded) => {
        *inner = loaded;
        Ok(())
      }
      Err(err @ IndexError::DimensionMismatch { .. }) => {
        *inner = Inner::new(dimension, metric);
        Err(err)
      }
      Err(err) => Err(err),
    }
  }

  /// Load an existing snapshot, or write a fresh empty one when there is
  /// nothing to load.
  pub fn create_or_load(&self, path: impl AsRef<Path>) -> Result<(), IndexError> {
    let path = path.as_ref();
    match self.load(path) {
      Ok(()) => Ok(()),
      Err(err) => {
        warn!(path = %path.display(), error = %err, "no loadable vector index, starting empty");
        self.save(path)
      }
    }
  }

  fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
    self.inner.lock().unwrap_or_else(|e| e.into_inner())
  }
}
