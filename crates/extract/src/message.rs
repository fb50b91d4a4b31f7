//! Incoming-message model as consumed from the messaging client.
//!
//! Content is a closed tagged enum with accessors instead of the client
//! library's downcast tree; anything the indexer does not understand lands
//! in `Unsupported` and is skipped with a log line.

use serde::{Deserialize, Serialize};
use std::fmt;

/// File handle as reported by the messaging client. Either the local copy
/// is already complete, or the remote id can be passed to a download RPC.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileRef {
  pub id: i32,
  pub local: Option<LocalFile>,
  pub remote: Option<RemoteFile>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalFile {
  pub path: String,
  pub is_downloading_completed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteFile {
  pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoSize {
  pub file: FileRef,
  pub width: i32,
  pub height: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MessageSender {
  User { user_id: i64 },
  Chat { chat_id: i64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MessageReply {
  Message { chat_id: i64, message_id: i64 },
  Story,
}

/// Chat lifecycle events that arrive as messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FunctionalEvent {
  BasicGroupChatCreate { title: String },
  ChatChangeTitle { title: String },
  ChatChangePhoto,
  ChatDeletePhoto,
  ChatAddMembers { member_user_ids: Vec<i64> },
  ChatJoinByLink,
  ChatDeleteMember { user_id: i64 },
  ChatUpgradeTo { supergroup_id: i64 },
  ChatUpgradeFrom { title: String },
  PinMessage { message_id: i64 },
  ScreenshotTaken,
}

impl fmt::Display for FunctionalEvent {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      FunctionalEvent::BasicGroupChatCreate { title } => write!(f, "basicGroupChatCreate title: {title}"),
      FunctionalEvent::ChatChangeTitle { title } => write!(f, "chatChangeTitle title: {title}"),
      FunctionalEvent::ChatChangePhoto => write!(f, "chatChangePhoto"),
      FunctionalEvent::ChatDeletePhoto => write!(f, "chatDeletePhoto"),
      FunctionalEvent::ChatAddMembers { member_user_ids } => {
        write!(f, "chatAddMembers members: {member_user_ids:?}")
      }
      FunctionalEvent::ChatJoinByLink => write!(f, "chatJoinByLink"),
      FunctionalEvent::ChatDeleteMember { user_id } => write!(f, "chatDeleteMember user: {user_id}"),
      FunctionalEvent::ChatUpgradeTo { supergroup_id } => write!(f, "chatUpgradeTo supergroup: {supergroup_id}"),
      FunctionalEvent::ChatUpgradeFrom { title } => write!(f, "chatUpgradeFrom title: {title}"),
      FunctionalEvent::PinMessage { message_id } => write!(f, "pinMessage message: {message_id}"),
      FunctionalEvent::ScreenshotTaken => write!(f, "screenshotTaken"),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MessageContent {
  Text {
    text: String,
  },
  Photo {
    caption: Option<String>,
    sizes: Vec<PhotoSize>,
  },
  Video {
    caption: Option<String>,
    file: FileRef,
  },
  Sticker {
    file: FileRef,
  },
  Document {
    caption: Option<String>,
    file: FileRef,
  },
  Audio {
    caption: Option<String>,
    file: FileRef,
  },
  Voice {
    caption: Option<String>,
    mime_type: String,
    duration: i32,
  },
  VideoNote {
    file: FileRef,
  },
  Location {
    latitude: f64,
    longitude: f64,
  },
  Contact {
    first_name: String,
    phone_number: String,
  },
  Venue {
    title: String,
    address: String,
  },
  Functional(FunctionalEvent),
  Unsupported {
    type_name: String,
  },
}

impl MessageContent {
  pub fn type_name(&self) -> &str {
    match self {
      MessageContent::Text { .. } => "text",
      MessageContent::Photo { .. } => "photo",
      MessageContent::Video { .. } => "video",
      MessageContent::Sticker { .. } => "sticker",
      MessageContent::Document { .. } => "document",
      MessageContent::Audio { .. } => "audio",
      MessageContent::Voice { .. } => "voice",
      MessageContent::VideoNote { .. } => "videoNote",
      MessageContent::Location { .. } => "location",
      MessageContent::Contact { .. } => "contact",
      MessageContent::Venue { .. } => "venue",
      MessageContent::Functional(_) => "functional",
      MessageContent::Unsupported { type_name } => type_name,
    }
  }

  pub fn as_text(&self) -> Option<&str> {
    match self {
      MessageContent::Text { text } => Some(text),
      _ => None,
    }
  }

  /// Caption of captionable variants, when present and non-empty.
  pub fn caption(&self) -> Option<&str> {
    let caption = match self {
      MessageContent::Photo { caption, .. }
      | MessageContent::Video { caption, .. }
      | MessageContent::Document { caption, .. }
      | MessageContent::Audio { caption, .. }
      | MessageContent::Voice { caption, .. } => caption.as_deref(),
      _ => None,
    };
    caption.filter(|c| !c.is_empty())
  }

  /// The photo size with the largest pixel area.
  pub fn largest_photo(&self) -> Option<&PhotoSize> {
    match self {
      MessageContent::Photo { sizes, .. } => {
        sizes.iter().max_by_key(|s| i64::from(s.width) * i64::from(s.height))
      }
      _ => None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingMessage {
  pub id: i64,
  pub chat_id: i64,
  /// Send time, seconds since epoch
  pub date: i64,
  pub sender: MessageSender,
  pub reply_to: Option<MessageReply>,
  pub content: MessageContent,
}

impl IncomingMessage {
  /// `reply_to_message_id` for the record: −1 unless this replies to a
  /// message.
  pub fn reply_to_message_id(&self) -> i64 {
    match &self.reply_to {
      Some(MessageReply::Message { message_id, .. }) => *message_id,
      _ => -1,
    }
  }
}
