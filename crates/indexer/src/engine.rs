//! The indexing engine: per-message extraction and chat-range re-indexing.

use crate::context::AppContext;
use crate::error::IndexerError;
use chatdex_core::{MessageRecord, Sender, external_id, record_key, vector_key};
use extract::message::{FileRef, IncomingMessage, MessageContent, MessageSender};
use extract::textify::{self, category};
use futures::StreamExt;
use regex::Regex;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{error, info, warn};

const REINDEX_BATCH_SIZE: usize = 100;
const REINDEX_BATCH_PAUSE: Duration = Duration::from_secs(10);
/// Concurrent `index_message` tasks per re-index batch.
const REINDEX_WINDOW: usize = 10;
/// Safety margin added to upstream "retry after N" waits.
const RATE_LIMIT_MARGIN: u64 = 5;

pub struct Indexer {
  ctx: Arc<AppContext>,
}

impl Indexer {
  pub fn new(ctx: Arc<AppContext>) -> Self {
    Self { ctx }
  }

  pub fn context(&self) -> &Arc<AppContext> {
    &self.ctx
  }

  /// Ingest one message. With `id == -1` the id comes from the message
  /// itself; a `None` message with usable ids writes an empty placeholder
  /// record (the message was deleted upstream).
  pub async fn index_message(
    &self,
    message: Option<IncomingMessage>,
    id: i64,
    chat_id: i64,
  ) -> Result<(), IndexerError> {
    let id = if id == -1 {
      match &message {
        Some(message) => message.id,
        None => {
          error!("failed to index message: message is null");
          return Err(IndexerError::MissingMessage);
        }
      }
    } else {
      id
    };

    let Some(message) = message else {
      info!(id, "indexing message as empty placeholder");
      self.ctx.store.put(record_key(id), MessageRecord::placeholder(id, chat_id))?;
      return Ok(());
    };
    info!(id, "indexing message");

    let sender = self.resolve_sender(&message, id).await?;

    let mut record = MessageRecord {
      message_id: id,
      chat_id: message.chat_id,
      send_time: message.date,
      sender,
      reply_to_message_id: message.reply_to_message_id(),
      ..MessageRecord::default()
    };

    self.extract_content(&mut record, &message, id).await?;

    info!(%record, "msg indexed");
    self.ctx.store.put(record_key(id), record.clone())?;

    self.embed_record(&record, id).await;
    Ok(())
  }

  async fn resolve_sender(&self, message: &IncomingMessage, id: i64) -> Result<Sender, IndexerError> {
    match &message.sender {
      MessageSender::User { user_id } => {
        let user = self
          .ctx
          .client
          .get_user(*user_id)
          .await
          .map_err(|source| {
            error!(id, %source, "failed to index message: failed to retrieve userinfo");
            IndexerError::Sender {
              message_id: id,
              source,
            }
          })?;
        Ok(Sender {
          nickname: user.nickname(),
          user_id: user.user_id,
          username: user.active_usernames.first().cloned(),
        })
      }
      MessageSender::Chat { .. } => {
        error!(id, "failed to index message: unknown sender kind");
        Err(IndexerError::UnknownSender { message_id: id })
      }
    }
  }

  async fn extract_content(
    &self,
    record: &mut MessageRecord,
    message: &IncomingMessage,
    id: i64,
  ) -> Result<(), IndexerError> {
    let content = &message.content;
    match content {
      MessageContent::Text { text } => {
        record.textifyed_contents.insert(category::TEXT.into(), text.clone());
      }
      MessageContent::Photo { .. } => {
        if let Some(caption) = content.caption() {
          record.textifyed_contents.insert(category::TEXT.into(), caption.into());
        }
        if let Some(size) = content.largest_photo() {
          match self.resolve_file(&size.file, id).await {
            Ok(path) => self.process_image(record, &path).await,
            Err(reason) => error!(id, %reason, "failed to download photo, indexing without image"),
          }
        }
      }
      MessageContent::Video { .. } => {
        // No extraction for plain videos.
      }
      MessageContent::Sticker { file } => match self.resolve_file(file, id).await {
        Ok(path) => self.process_image(record, &path).await,
        Err(reason) => error!(id, %reason, "failed to download sticker, indexing without image"),
      },
      MessageContent::Document { file, .. } => {
        if let Some(caption) = content.caption() {
          record.textifyed_contents.insert(category::TEXT.into(), caption.into());
        }
        match self.resolve_file(file, id).await {
          Ok(path) => {
            record.textifyed_contents.insert(category::DOCUMENT.into(), path);
          }
          Err(reason) => error!(id, %reason, "failed to download document"),
        }
      }
      MessageContent::Audio { file, .. } => {
        if let Some(caption) = content.caption() {
          record.textifyed_contents.insert(category::TEXT.into(), caption.into());
        }
        match self.resolve_file(file, id).await {
          Ok(path) => {
            record.textifyed_contents.insert(category::AUDIO.into(), path);
          }
          Err(reason) => error!(id, %reason, "failed to download audio"),
        }
      }
      MessageContent::Voice {
        mime_type, duration, ..
      } => {
        if let Some(caption) = content.caption() {
          record.textifyed_contents.insert(category::TEXT.into(), caption.into());
        }
        record
          .textifyed_contents
          .insert(category::VOICE.into(), textify::voice_text(mime_type, *duration));
      }
      MessageContent::VideoNote { file } => match self.resolve_file(file, id).await {
        Ok(path) => self.process_image(record, &path).await,
        Err(reason) => error!(id, %reason, "failed to download video note"),
      },
      MessageContent::Location { latitude, longitude } => {
        record
          .textifyed_contents
          .insert(category::LOCATION.into(), textify::location_text(*latitude, *longitude));
      }
      MessageContent::Contact {
        first_name,
        phone_number,
      } => {
        record
          .textifyed_contents
          .insert(category::CONTACT.into(), textify::contact_text(first_name, phone_number));
      }
      MessageContent::Venue { title, address } => {
        record
          .textifyed_contents
          .insert(category::VENUE.into(), textify::venue_text(title, address));
      }
      MessageContent::Functional(event) => {
        record
          .textifyed_contents
          .insert(category::FUNCTIONAL_MESSAGE.into(), textify::functional_text(event));
      }
      MessageContent::Unsupported { type_name } => {
        error!(id, %type_name, "failed to index message: unknown content type");
        return Err(IndexerError::UnknownContent {
          message_id: id,
          type_name: type_name.clone(),
        });
      }
    }
    Ok(())
  }

  /// Resolve a file reference to a completed local path, downloading when
  /// only the remote copy exists.
  async fn resolve_file(&self, file: &FileRef, message_id: i64) -> Result<String, String> {
    if let Some(local) = &file.local
      && local.is_downloading_completed
    {
      info!(path = %local.path, "file path");
      return Ok(local.path.clone());
    }

    if file.remote.is_some() {
      info!(file_id = file.id, "downloading file for indexing");
      return match self.ctx.client.download_file(file.id, 1, 0, 0, true).await {
        Ok(local) => {
          info!(file_id = file.id, path = %local.path, "file downloaded");
          Ok(local.path)
        }
        Err(error) => {
          error!(file_id = file.id, message_id, %error, "failed to download file");
          Err("failed to download file".to_string())
        }
      };
    }

    error!(message_id, "unknown file");
    Err("unknown file".to_string())
  }

  /// OCR an image file into the record and remember the file path. `.webm`
  /// animations get an empty image entry and no OCR; without a configured
  /// OCR endpoint the text is skipped but the path is still recorded.
  async fn process_image(&self, record: &mut MessageRecord, path: &str) {
    if path.is_empty() || path.ends_with(".webm") {
      record.textifyed_contents.insert(category::IMAGE.into(), String::new());
      return;
    }

    record.image_file = Some(path.to_string());

    let Some(ocr) = &self.ctx.ocr else {
      return;
    };
    info!(path, "performing OCR");
    match ocr.ocr(path).await {
      Ok(text) => {
        info!(result = %text, "OCR result");
        record.textifyed_contents.insert(category::IMAGE.into(), text);
      }
      Err(error) => {
        error!(path, %error, "failed to perform OCR");
      }
    }
  }

  /// Hand the committed record to the embedder and file the vectors under
  /// the record's keys. Failures log; the record commit stands regardless.
  async fn embed_record(&self, record: &MessageRecord, id: i64) {
    let (Some(dispatcher), Some(vector_index)) = (&self.ctx.dispatcher, &self.ctx.vector_index) else {
      return;
    };

    let text = record.joined_text();
    let image = if dispatcher.supports_aligned_image() {
      record.image_file.as_deref()
    } else {
      None
    };
    if text.is_empty() && image.is_none() {
      return;
    }

    let embedding = dispatcher
      .embed_multimodal((!text.is_empty()).then_some(text.as_str()), image)
      .await;
    if embedding.is_empty() {
      warn!(id, "no embedding produced for message");
      return;
    }

    for (kind, vector) in embedding {
      let key = vector_key(id, kind);
      if !vector_index.add(&key, &vector) {
        warn!(%key, "vector not added (duplicate key or wrong dimension)");
      }
    }
  }

  /// Fill the holes in a chat's history up to the `until_sequence`-th
  /// message. Probes the store for each `sequence << 20` key and fetches
  /// only the missing ones, 100 ids per upstream call, pausing 10 s between
  /// calls. Rate-limit errors sleep the advertised time plus margin and
  /// retry the same batch; any other fetch error abandons the chat.
  pub async fn index_messages_in_chat<F>(
    &self,
    chat_id: i64,
    until_sequence: i64,
    mut progress: F,
  ) -> Result<(), IndexerError>
  where
    F: FnMut(i64, i64) + Send,
  {
    let mut current: i64 = 1;
    while current <= until_sequence {
      let mut batch = Vec::new();
      while current <= until_sequence && batch.len() < REINDEX_BATCH_SIZE {
        let id = external_id(current);
        if !self.ctx.store.has(&record_key(id)) {
          batch.push(id);
        }
        current += 1;
      }

      if batch.is_empty() {
        progress(chat_id, current);
        break;
      }
      info!(chat_id, first = batch[0], count = batch.len(), "indexing messages");

      let messages = loop {
        match self.ctx.client.get_messages(chat_id, &batch).await {
          Ok(messages) => break messages,
          Err(error) => {
            if let Some(wait) = parse_retry_after(&error.to_string()) {
              let wait = wait + RATE_LIMIT_MARGIN;
              warn!(chat_id, wait, "rate limit hit, waiting");
              tokio::time::sleep(Duration::from_secs(wait)).await;
              continue;
            }
            error!(chat_id, %error, "failed to get messages");
            return Err(error.into());
          }
        }
      };

      let mut results = futures::stream::iter(
        messages
          .into_iter()
          .zip(batch.iter().copied())
          .map(|(message, id)| self.index_message(message, id, chat_id)),
      )
      .buffer_unordered(REINDEX_WINDOW);
      while let Some(result) = results.next().await {
        if let Err(error) = result {
          warn!(chat_id, %error, "message skipped during reindex");
        }
      }

      progress(chat_id, current);

      if current < until_sequence {
        info!(seconds = REINDEX_BATCH_PAUSE.as_secs(), "waiting before next batch");
        tokio::time::sleep(REINDEX_BATCH_PAUSE).await;
      }
    }
    Ok(())
  }

  /// Backfill `image_file` on records indexed before it existed: refetch
  /// each such message and take the completed local path of its largest
  /// photo or its sticker. Returns how many records were re-committed.
  pub async fn upgrade_database(&self) -> Result<usize, IndexerError> {
    let mut upgraded = 0;
    for (key, record) in self.ctx.store.records() {
      if record.image_file.is_some() || record.is_empty() {
        continue;
      }

      let message = match self.ctx.client.get_message(record.chat_id, record.message_id).await {
        Ok(Some(message)) => message,
        Ok(None) => continue,
        Err(error) => {
          warn!(%key, %error, "failed to refetch message during upgrade");
          continue;
        }
      };

      let file = match &message.content {
        MessageContent::Photo { .. } => message.content.largest_photo().map(|size| &size.file),
        MessageContent::Sticker { file } => Some(file),
        _ => None,
      };
      let Some(file) = file else {
        continue;
      };
      let Some(local) = file.local.as_ref().filter(|l| l.is_downloading_completed && !l.path.is_empty()) else {
        continue;
      };

      let mut updated = record.clone();
      updated.image_file = Some(local.path.clone());
      self.ctx.store.put(key.clone(), updated)?;
      info!(%key, path = %local.path, "record upgraded with image file");
      upgraded += 1;
    }
    Ok(upgraded)
  }
}

/// Extract the wait from an upstream "retry after N" error message.
fn parse_retry_after(text: &str) -> Option<u64> {
  static PATTERN: OnceLock<Regex> = OnceLock::new();
  let pattern = PATTERN.get_or_init(|| Regex::new(r"retry after (\d+)").unwrap());
  pattern.captures(text)?.get(1)?.as_str().parse().ok()
}
