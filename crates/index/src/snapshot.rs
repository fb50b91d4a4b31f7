//! Four-file on-disk snapshot of the flat index.
//!
//! `<path>.faissidx` holds the raw vector buffer, `.key2id` and `.id2key`
//! the two directional mappings, `.meta` the counters. All integers are
//! host-native endian; snapshots are not portable across architectures.

use crate::{Inner, Metric};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// `<path>.<suffix>`, appended rather than replacing an existing extension.
fn snapshot_file(path: &Path, suffix: &str) -> PathBuf {
  let mut name = path.as_os_str().to_os_string();
  name.push(".");
  name.push(suffix);
  PathBuf::from(name)
}

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
  #[error("io error on {path}: {source}")]
  Io {
    path: String,
    #[source]
    source: std::io::Error,
  },
  #[error("snapshot file {path} is truncated or corrupt")]
  Corrupt { path: String },
  #[error("snapshot dimension {found} does not match configured dimension {expected}")]
  DimensionMismatch { expected: usize, found: usize },
}

fn io_err(path: &Path, source: std::io::Error) -> IndexError {
  IndexError::Io {
    path: path.display().to_string(),
    source,
  }
}

struct Reader<'a> {
  inner: BufReader<File>,
  path: &'a Path,
}

impl<'a> Reader<'a> {
  fn open(path: &'a Path) -> Result<Self, IndexError> {
    let file = File::open(path).map_err(|e| io_err(path, e))?;
    Ok(Self {
      inner: BufReader::new(file),
      path,
    })
  }

  fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), IndexError> {
    self.inner.read_exact(buf).map_err(|_| IndexError::Corrupt {
      path: self.path.display().to_string(),
    })
  }

  fn u64(&mut self) -> Result<u64, IndexError> {
    let mut buf = [0u8; 8];
    self.read_exact(&mut buf)?;
    Ok(u64::from_ne_bytes(buf))
  }

  fn i64(&mut self) -> Result<i64, IndexError> {
    let mut buf = [0u8; 8];
    self.read_exact(&mut buf)?;
    Ok(i64::from_ne_bytes(buf))
  }

  fn i32(&mut self) -> Result<i32, IndexError> {
    let mut buf = [0u8; 4];
    self.read_exact(&mut buf)?;
    Ok(i32::from_ne_bytes(buf))
  }

  fn string(&mut self) -> Result<String, IndexError> {
    let len = self.u64()? as usize;
    let mut buf = vec![0u8; len];
    self.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|_| IndexError::Corrupt {
      path: self.path.display().to_string(),
    })
  }
}

struct Writer<'a> {
  inner: BufWriter<File>,
  path: &'a Path,
}

impl<'a> Writer<'a> {
  fn create(path: &'a Path) -> Result<Self, IndexError> {
    let file = File::create(path).map_err(|e| io_err(path, e))?;
    Ok(Self {
      inner: BufWriter::new(file),
      path,
    })
  }

  fn bytes(&mut self, bytes: &[u8]) -> Result<(), IndexError> {
    self.inner.write_all(bytes).map_err(|e| io_err(self.path, e))
  }

  fn u64(&mut self, value: u64) -> Result<(), IndexError> {
    self.bytes(&value.to_ne_bytes())
  }

  fn i64(&mut self, value: i64) -> Result<(), IndexError> {
    self.bytes(&value.to_ne_bytes())
  }

  fn i32(&mut self, value: i32) -> Result<(), IndexError> {
    self.bytes(&value.to_ne_bytes())
  }

  fn string(&mut self, value: &str) -> Result<(), IndexError> {
    self.u64(value.len() as u64)?;
    self.bytes(value.as_bytes())
  }

  fn finish(mut self) -> Result<(), IndexError> {
    self.inner.flush().map_err(|e| io_err(self.path, e))
  }
}

pub(crate) fn save(inner: &Inner, path: &Path) -> Result<(), IndexError> {
  let raw = snapshot_file(path, "faissidx");
  let mut w = Writer::create(&raw)?;
  let ntotal = (inner.data.len() / inner.dimension) as u64;
  w.u64(ntotal)?;
  for value in &inner.data {
    w.bytes(&value.to_ne_bytes())?;
  }
  w.finish()?;

  let key2id = snapshot_file(path, "key2id");
  let mut w = Writer::create(&key2id)?;
  w.u64(inner.key_to_id.len() as u64)?;
  for (key, id) in &inner.key_to_id {
    w.string(key)?;
    w.i64(*id)?;
  }
  w.finish()?;

  let id2key = snapshot_file(path, "id2key");
  let mut w = Writer::create(&id2key)?;
  w.u64(inner.id_to_key.len() as u64)?;
  for key in &inner.id_to_key {
    w.string(key)?;
  }
  w.finish()?;

  let meta = snapshot_file(path, "meta");
  let mut w = Writer::create(&meta)?;
  w.i64(inner.next_id)?;
  w.i32(inner.dimension as i32)?;
  w.i32(inner.metric as i32)?;
  w.finish()
}

pub(crate) fn load(path: &Path, expected_dimension: usize) -> Result<Inner, IndexError> {
  let meta_path = snapshot_file(path, "meta");
  let mut meta = Reader::open(&meta_path)?;
  let next_id = meta.i64()?;
  let dimension = meta.i32()?;
  let metric_code = meta.i32()?;

  if dimension <= 0 {
    return Err(IndexError::Corrupt {
      path: meta_path.display().to_string(),
    });
  }
  let dimension = dimension as usize;
  if dimension != expected_dimension {
    return Err(IndexError::DimensionMismatch {
      expected: expected_dimension,
      found: dimension,
    });
  }
  let metric = Metric::from_code(metric_code).unwrap_or_else(|| {
    warn!(code = metric_code, "unknown metric in snapshot, defaulting to L2");
    Metric::L2
  });

  let raw_path = snapshot_file(path, "faissidx");
  let mut raw = Reader::open(&raw_path)?;
  let ntotal = raw.u64()? as usize;
  let mut data = Vec::with_capacity(ntotal * dimension);
  let mut buf = [0u8; 4];
  for _ in 0..ntotal * dimension {
    raw.read_exact(&mut buf)?;
    data.push(f32::from_ne_bytes(buf));
  }

  let key2id_path = snapshot_file(path, "key2id");
  let mut r = Reader::open(&key2id_path)?;
  let entries = r.u64()? as usize;
  let mut key_to_id = HashMap::with_capacity(entries);
  for _ in 0..entries {
    let key = r.string()?;
    let id = r.i64()?;
    key_to_id.insert(key, id);
  }

  let id2key_path = snapshot_file(path, "id2key");
  let mut r = Reader::open(&id2key_path)?;
  let entries = r.u64()? as usize;
  let mut id_to_key = Vec::with_capacity(entries);
  for _ in 0..entries {
    id_to_key.push(r.string()?);
  }

  Ok(Inner {
    dimension,
    metric,
    data,
    key_to_id,
    id_to_key,
    next_id,
  })
}
