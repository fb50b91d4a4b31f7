//! Shared fixtures: in-process doubles for the messaging client, the
//! embedding service, and OCR, plus message builders.
#![allow(dead_code)]

use async_trait::async_trait;
use chatdex_core::Config;
use chatdex_core::EmbeddingKind;
use db::RecordStore;
use embedding::{Content, Embedding, EmbeddingDispatcher, EmbeddingError, EmbeddingService};
use extract::message::{
  FileRef, IncomingMessage, LocalFile, MessageContent, MessageReply, MessageSender, PhotoSize, RemoteFile,
};
use extract::{OcrError, OcrService};
use index::{Metric, VectorIndex};
use indexer::{AppContext, ChatClient, ChatInfo, ClientError, Indexer, UserInfo};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub const DIM: usize = 4;
pub const CHAT_ID: i64 = -100_555;
pub const USER_ID: i64 = 7_001;

/// Deterministic text vector so identical queries score 0.0 against their
/// own record.
pub fn text_vector(text: &str) -> Vec<f32> {
  let hash = text.bytes().fold(1u32, |acc, b| acc.wrapping_mul(31).wrapping_add(u32::from(b)));
  vec![
    (hash % 97) as f32,
    ((hash / 97) % 97) as f32,
    ((hash / 9409) % 97) as f32,
    text.len() as f32,
  ]
}

pub fn image_vector(path: &str) -> Vec<f32> {
  let mut v = text_vector(path);
  v.reverse();
  v
}

#[derive(Default)]
pub struct MockChatClient {
  pub users: Mutex<HashMap<i64, UserInfo>>,
  pub messages: Mutex<HashMap<i64, IncomingMessage>>,
  /// Errors handed out by `get_messages` before it starts succeeding
  pub get_messages_errors: Mutex<Vec<ClientError>>,
  pub get_messages_calls: AtomicUsize,
  pub downloads: Mutex<HashMap<i32, LocalFile>>,
}

impl MockChatClient {
  pub fn new() -> Self {
    let client = Self::default();
    client.users.lock().unwrap().insert(
      USER_ID,
      UserInfo {
        user_id: USER_ID,
        first_name: "Alice".into(),
        last_name: "Smith".into(),
        active_usernames: vec!["alice".into()],
      },
    );
    client
  }

  pub fn insert_message(&self, message: IncomingMessage) {
    self.messages.lock().unwrap().insert(message.id, message);
  }

  pub fn push_get_messages_error(&self, error: ClientError) {
    self.get_messages_errors.lock().unwrap().push(error);
  }
}

#[async_trait]
impl ChatClient for MockChatClient {
  async fn get_user(&self, user_id: i64) -> Result<UserInfo, ClientError> {
    self
      .users
      .lock()
      .unwrap()
      .get(&user_id)
      .cloned()
      .ok_or_else(|| ClientError::Upstream(format!("user {user_id} not found")))
  }

  async fn get_chat(&self, chat_id: i64) -> Result<ChatInfo, ClientError> {
    Ok(ChatInfo {
      id: chat_id,
      title: "test chat".into(),
    })
  }

  async fn get_message(&self, _chat_id: i64, message_id: i64) -> Result<Option<IncomingMessage>, ClientError> {
    Ok(self.messages.lock().unwrap().get(&message_id).cloned())
  }

  async fn get_messages(&self, _chat_id: i64, message_ids: &[i64]) -> Result<Vec<Option<IncomingMessage>>, ClientError> {
    self.get_messages_calls.fetch_add(1, Ordering::SeqCst);
    {
      let mut errors = self.get_messages_errors.lock().unwrap();
      if !errors.is_empty() {
        return Err(errors.remove(0));
      }
    }
    let messages = self.messages.lock().unwrap();
    Ok(message_ids.iter().map(|id| messages.get(id).cloned()).collect())
  }

  async fn download_file(
    &self,
    file_id: i32,
    _priority: i32,
    _offset: i64,
    _limit: i64,
    _synchronous: bool,
  ) -> Result<LocalFile, ClientError> {
    self
      .downloads
      .lock()
      .unwrap()
      .get(&file_id)
      .cloned()
      .ok_or_else(|| ClientError::Upstream(format!("file {file_id} not downloadable")))
  }
}

pub struct MockEmbedder {
  pub aligned: bool,
  pub fail: bool,
}

#[async_trait]
impl EmbeddingService for MockEmbedder {
  fn id(&self) -> String {
    "mock-embedder".into()
  }

  fn supports_aligned_image(&self) -> bool {
    self.aligned
  }

  async fn embed(&self, contents: &[Content]) -> Result<Vec<Embedding>, EmbeddingError> {
    if self.fail {
      return Err(EmbeddingError::Response("mock failure".into()));
    }
    Ok(
      contents
        .iter()
        .map(|content| {
          let mut embedding = Embedding::new();
          if let Some(text) = content.text.as_deref().filter(|t| !t.is_empty()) {
            embedding.insert(EmbeddingKind::Text, text_vector(text));
          }
          if let Some(path) = content.image_path.as_deref().filter(|p| !p.is_empty()) {
            embedding.insert(EmbeddingKind::Image, image_vector(path));
          }
          embedding
        })
        .collect(),
    )
  }
}

pub struct FixedOcr {
  pub text: String,
  pub calls: AtomicUsize,
}

impl FixedOcr {
  pub fn new(text: impl Into<String>) -> Self {
    Self {
      text: text.into(),
      calls: AtomicUsize::new(0),
    }
  }
}

#[async_trait]
impl OcrService for FixedOcr {
  async fn ocr(&self, _file_path: &str) -> Result<String, OcrError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    Ok(self.text.clone())
  }
}

pub struct Harness {
  pub _dir: TempDir,
  pub ctx: Arc<AppContext>,
  pub indexer: Indexer,
  pub client: Arc<MockChatClient>,
  pub ocr: Arc<FixedOcr>,
}

pub fn harness() -> Harness {
  harness_with(true, false)
}

pub fn harness_with(aligned: bool, failing_embedder: bool) -> Harness {
  let dir = TempDir::new().unwrap();
  let store = RecordStore::open(dir.path().join("messages.redb")).unwrap();
  let client = Arc::new(MockChatClient::new());
  let ocr = Arc::new(FixedOcr::new("WORLD"));

  let embedder = Arc::new(MockEmbedder {
    aligned,
    fail: failing_embedder,
  });
  let dispatcher = EmbeddingDispatcher::with_window(embedder, Duration::from_millis(10));

  let ctx = Arc::new(
    AppContext::new(Config::default(), store, client.clone())
      .with_vector_index(VectorIndex::new(DIM, Metric::L2), dir.path().join("vectors"))
      .with_dispatcher(dispatcher)
      .with_ocr(ocr.clone()),
  );

  Harness {
    indexer: Indexer::new(ctx.clone()),
    ctx,
    client,
    ocr,
    _dir: dir,
  }
}

/// A store-only harness: no embedder, no vector index, no OCR.
pub fn bare_harness() -> Harness {
  let dir = TempDir::new().unwrap();
  let store = RecordStore::open(dir.path().join("messages.redb")).unwrap();
  let client = Arc::new(MockChatClient::new());
  let ctx = Arc::new(AppContext::new(Config::default(), store, client.clone()));

  Harness {
    indexer: Indexer::new(ctx.clone()),
    ctx,
    client,
    ocr: Arc::new(FixedOcr::new("")),
    _dir: dir,
  }
}

pub fn completed_file(file_id: i32, path: &str) -> FileRef {
  FileRef {
    id: file_id,
    local: Some(LocalFile {
      path: path.into(),
      is_downloading_completed: true,
    }),
    remote: Some(RemoteFile { id: format!("r{file_id}") }),
  }
}

pub fn remote_only_file(file_id: i32) -> FileRef {
  FileRef {
    id: file_id,
    local: None,
    remote: Some(RemoteFile { id: format!("r{file_id}") }),
  }
}

pub fn message(id: i64, content: MessageContent) -> IncomingMessage {
  IncomingMessage {
    id,
    chat_id: CHAT_ID,
    date: 1_700_000_000,
    sender: MessageSender::User { user_id: USER_ID },
    reply_to: None,
    content,
  }
}

pub fn text_message(id: i64, text: &str) -> IncomingMessage {
  message(id, MessageContent::Text { text: text.into() })
}

pub fn photo_message(id: i64, caption: Option<&str>, file_id: i32, path: &str) -> IncomingMessage {
  message(
    id,
    MessageContent::Photo {
      caption: caption.map(Into::into),
      sizes: vec![
        PhotoSize {
          file: completed_file(file_id + 100, "thumb.png"),
          width: 90,
          height: 90,
        },
        PhotoSize {
          file: completed_file(file_id, path),
          width: 1280,
          height: 960,
        },
      ],
    },
  )
}

pub fn reply_message(id: i64, text: &str, reply_to: i64) -> IncomingMessage {
  let mut m = text_message(id, text);
  m.reply_to = Some(MessageReply::Message {
    chat_id: CHAT_ID,
    message_id: reply_to,
  });
  m
}
