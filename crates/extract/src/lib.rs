pub mod message;
pub mod ocr;
pub mod textify;

pub use message::{
  FileRef, FunctionalEvent, IncomingMessage, LocalFile, MessageContent, MessageReply, MessageSender, PhotoSize,
  RemoteFile,
};
pub use ocr::{OcrClient, OcrError, OcrService};
