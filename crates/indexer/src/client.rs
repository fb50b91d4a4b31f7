//! Seam to the messaging transport.
//!
//! The engine only ever talks to the platform through this trait; the real
//! client lives with the bot driver, tests substitute their own.

use async_trait::async_trait;
use extract::{IncomingMessage, LocalFile};

#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
  /// Error text as reported by the platform, verbatim. Rate-limit errors
  /// arrive here as "... retry after N ...".
  #[error("{0}")]
  Upstream(String),
  #[error("messaging client is not available")]
  Unavailable,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserInfo {
  pub user_id: i64,
  pub first_name: String,
  pub last_name: String,
  /// Active usernames, most relevant first; may be empty
  pub active_usernames: Vec<String>,
}

impl UserInfo {
  pub fn nickname(&self) -> String {
    format!("{} {}", self.first_name, self.last_name)
  }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatInfo {
  pub id: i64,
  pub title: String,
}

#[async_trait]
pub trait ChatClient: Send + Sync {
  async fn get_user(&self, user_id: i64) -> Result<UserInfo, ClientError>;

  async fn get_chat(&self, chat_id: i64) -> Result<ChatInfo, ClientError>;

  async fn get_message(&self, chat_id: i64, message_id: i64) -> Result<Option<IncomingMessage>, ClientError>;

  /// Fetch a batch of messages. The result is aligned with `message_ids`;
  /// a `None` slot means the message no longer exists.
  async fn get_messages(&self, chat_id: i64, message_ids: &[i64]) -> Result<Vec<Option<IncomingMessage>>, ClientError>;

  /// Download a file and return its completed local copy.
  async fn download_file(
    &self,
    file_id: i32,
    priority: i32,
    offset: i64,
    limit: i64,
    synchronous: bool,
  ) -> Result<LocalFile, ClientError>;
}

/// Placeholder used when no transport is wired (query-only drivers).
pub struct UnavailableClient;

#[async_trait]
impl ChatClient for UnavailableClient {
  async fn get_user(&self, _user_id: i64) -> Result<UserInfo, ClientError> {
    Err(ClientError::Unavailable)
  }

  async fn get_chat(&self, _chat_id: i64) -> Result<ChatInfo, ClientError> {
    Err(ClientError::Unavailable)
  }

  async fn get_message(&self, _chat_id: i64, _message_id: i64) -> Result<Option<IncomingMessage>, ClientError> {
    Err(ClientError::Unavailable)
  }

  async fn get_messages(
    &self,
    _chat_id: i64,
    _message_ids: &[i64],
  ) -> Result<Vec<Option<IncomingMessage>>, ClientError> {
    Err(ClientError::Unavailable)
  }

  async fn download_file(
    &self,
    _file_id: i32,
    _priority: i32,
    _offset: i64,
    _limit: i64,
    _synchronous: bool,
  ) -> Result<LocalFile, ClientError> {
    Err(ClientError::Unavailable)
  }
}
