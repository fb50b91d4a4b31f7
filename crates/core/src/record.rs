//! Durable record types for indexed chat messages.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The resolved author of a message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Sender {
  /// "{first_name} {last_name}" as reported by the messaging client
  pub nickname: String,
  pub user_id: i64,
  /// First active username, when the account has one
  #[serde(skip_serializing_if = "Option::is_none")]
  pub username: Option<String>,
}

impl fmt::Display for Sender {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "sender{{nickname: {}, user_id: {}, username: {}}}",
      self.nickname,
      self.user_id,
      self.username.as_deref().unwrap_or("None")
    )
  }
}

fn no_reply() -> i64 {
  -1
}

/// A text-searchable summary of one chat message.
///
/// `textifyed_contents` maps a content category (`text`, `image`,
/// `document`, ...) to the textual projection of that part of the message.
/// Records written by older versions may lack newer fields; every field
/// carries a serde default so decoding stays forward compatible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageRecord {
  pub message_id: i64,
  pub chat_id: i64,
  /// Seconds since epoch
  pub send_time: i64,
  pub sender: Sender,
  /// -1 when the message is not a reply
  #[serde(default = "no_reply")]
  pub reply_to_message_id: i64,
  /// Local path of the extractable image payload, when the message had one
  #[serde(skip_serializing_if = "Option::is_none")]
  pub image_file: Option<String>,
  pub textifyed_contents: BTreeMap<String, String>,
}

impl Default for MessageRecord {
  fn default() -> Self {
    Self {
      message_id: 0,
      chat_id: 0,
      send_time: 0,
      sender: Sender::default(),
      reply_to_message_id: -1,
      image_file: None,
      textifyed_contents: BTreeMap::new(),
    }
  }
}

impl MessageRecord {
  /// Record written when a history hole is filled but the message no longer
  /// exists upstream: ids only, no contents.
  pub fn placeholder(message_id: i64, chat_id: i64) -> Self {
    Self {
      message_id,
      chat_id,
      ..Self::default()
    }
  }

  /// True for placeholder records (nothing was extracted).
  pub fn is_empty(&self) -> bool {
    self.textifyed_contents.is_empty()
  }

  /// All non-empty textifyed values joined with single spaces, in category
  /// order. This is the text handed to the embedder.
  pub fn joined_text(&self) -> String {
    let mut out = String::new();
    for value in self.textifyed_contents.values() {
      if value.is_empty() {
        continue;
      }
      if !out.is_empty() {
        out.push(' ');
      }
      out.push_str(value);
    }
    out
  }
}

impl fmt::Display for MessageRecord {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "message{{message_id: {}, chat_id: {}, textifyed_contents: {:?}, {}, reply_to_message_id: {}}}",
      self.message_id, self.chat_id, self.textifyed_contents, self.sender, self.reply_to_message_id
    )
  }
}
