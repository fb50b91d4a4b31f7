mod common;

use chatdex_core::record_key;
use common::*;
use extract::message::{FileRef, FunctionalEvent, MessageContent, MessageSender};
use indexer::IndexerError;
use std::sync::atomic::Ordering;

#[tokio::test]
async fn photo_with_caption_gets_text_ocr_and_image_file() {
  let h = harness();
  let message = photo_message(42, Some("hello"), 10, "pic.png");

  h.indexer.index_message(Some(message), -1, -1).await.unwrap();

  let record = h.ctx.store.get("42").unwrap();
  assert_eq!(record.textifyed_contents["text"], "hello");
  assert_eq!(record.textifyed_contents["image"], "WORLD");
  assert_eq!(record.image_file.as_deref(), Some("pic.png"));
  assert_eq!(record.sender.nickname, "Alice Smith");
  assert_eq!(record.sender.username.as_deref(), Some("alice"));
  assert_eq!(record.reply_to_message_id, -1);
}

#[tokio::test]
async fn photo_uses_largest_size() {
  let h = harness();
  // photo_message puts a 90x90 thumb first and the real size second.
  let message = photo_message(43, None, 20, "large.png");

  h.indexer.index_message(Some(message), -1, -1).await.unwrap();
  assert_eq!(h.ctx.store.get("43").unwrap().image_file.as_deref(), Some("large.png"));
}

#[tokio::test]
async fn null_message_with_ids_writes_placeholder() {
  let h = harness();
  h.indexer.index_message(None, 5 << 20, CHAT_ID).await.unwrap();

  let record = h.ctx.store.get(&record_key(5 << 20)).unwrap();
  assert!(record.is_empty());
  assert_eq!(record.message_id, 5 << 20);
  assert_eq!(record.chat_id, CHAT_ID);
}

#[tokio::test]
async fn null_message_without_ids_is_an_error() {
  let h = harness();
  let result = h.indexer.index_message(None, -1, -1).await;
  assert!(matches!(result, Err(IndexerError::MissingMessage)));
  assert_eq!(h.ctx.store.len(), 0);
}

#[tokio::test]
async fn unknown_content_writes_nothing() {
  let h = harness();
  let message = message(
    9,
    MessageContent::Unsupported {
      type_name: "messageDice".into(),
    },
  );

  let result = h.indexer.index_message(Some(message), -1, -1).await;
  assert!(matches!(result, Err(IndexerError::UnknownContent { .. })));
  assert!(!h.ctx.store.has("9"));
}

#[tokio::test]
async fn unresolvable_sender_writes_nothing() {
  let h = harness();
  let mut message = text_message(11, "hi");
  message.sender = MessageSender::User { user_id: 999_999 };

  let result = h.indexer.index_message(Some(message), -1, -1).await;
  assert!(matches!(result, Err(IndexerError::Sender { .. })));
  assert!(!h.ctx.store.has("11"));
}

#[tokio::test]
async fn chat_sender_is_skipped() {
  let h = harness();
  let mut message = text_message(12, "hi");
  message.sender = MessageSender::Chat { chat_id: CHAT_ID };

  let result = h.indexer.index_message(Some(message), -1, -1).await;
  assert!(matches!(result, Err(IndexerError::UnknownSender { .. })));
  assert!(!h.ctx.store.has("12"));
}

#[tokio::test]
async fn webm_sticker_gets_empty_image_and_no_ocr() {
  let h = harness();
  let message = message(
    13,
    MessageContent::Sticker {
      file: completed_file(30, "anim.webm"),
    },
  );

  h.indexer.index_message(Some(message), -1, -1).await.unwrap();

  let record = h.ctx.store.get("13").unwrap();
  assert_eq!(record.textifyed_contents["image"], "");
  assert_eq!(record.image_file, None);
  assert_eq!(h.ocr.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn sticker_is_treated_as_image() {
  let h = harness();
  let message = message(
    14,
    MessageContent::Sticker {
      file: completed_file(31, "sticker.webp"),
    },
  );

  h.indexer.index_message(Some(message), -1, -1).await.unwrap();

  let record = h.ctx.store.get("14").unwrap();
  assert_eq!(record.textifyed_contents["image"], "WORLD");
  assert_eq!(record.image_file.as_deref(), Some("sticker.webp"));
}

#[tokio::test]
async fn remote_file_is_downloaded() {
  let h = harness();
  h.client.downloads.lock().unwrap().insert(
    40,
    extract::message::LocalFile {
      path: "downloaded.png".into(),
      is_downloading_completed: true,
    },
  );
  let message = message(15, MessageContent::Sticker { file: remote_only_file(40) });

  h.indexer.index_message(Some(message), -1, -1).await.unwrap();
  assert_eq!(h.ctx.store.get("15").unwrap().image_file.as_deref(), Some("downloaded.png"));
}

#[tokio::test]
async fn failed_download_still_commits_the_record() {
  let h = harness();
  // No download registered for this file id.
  let message = photo_message(16, Some("cap"), 50, "never.png");
  let mut message = message;
  if let MessageContent::Photo { sizes, .. } = &mut message.content {
    for size in sizes {
      size.file.local = None;
    }
  }

  h.indexer.index_message(Some(message), -1, -1).await.unwrap();
  let record = h.ctx.store.get("16").unwrap();
  assert_eq!(record.textifyed_contents["text"], "cap");
  assert!(!record.textifyed_contents.contains_key("image"));
  assert_eq!(record.image_file, None);
}

#[tokio::test]
async fn file_with_neither_local_nor_remote_is_unknown() {
  let h = harness();
  let message = message(
    17,
    MessageContent::Sticker {
      file: FileRef {
        id: 60,
        local: None,
        remote: None,
      },
    },
  );

  // Unknown file: the record still lands, without an image.
  h.indexer.index_message(Some(message), -1, -1).await.unwrap();
  assert_eq!(h.ctx.store.get("17").unwrap().image_file, None);
}

#[tokio::test]
async fn video_message_skips_extraction() {
  let h = harness();
  let message = message(
    18,
    MessageContent::Video {
      caption: Some("ignored".into()),
      file: completed_file(70, "movie.mp4"),
    },
  );

  h.indexer.index_message(Some(message), -1, -1).await.unwrap();
  let record = h.ctx.store.get("18").unwrap();
  assert!(record.textifyed_contents.is_empty());
}

#[tokio::test]
async fn document_and_audio_store_paths() {
  let h = harness();
  let document = message(
    19,
    MessageContent::Document {
      caption: Some("the report".into()),
      file: completed_file(80, "/files/report.pdf"),
    },
  );
  let audio = message(
    20,
    MessageContent::Audio {
      caption: None,
      file: completed_file(81, "/files/song.mp3"),
    },
  );

  h.indexer.index_message(Some(document), -1, -1).await.unwrap();
  h.indexer.index_message(Some(audio), -1, -1).await.unwrap();

  let doc_record = h.ctx.store.get("19").unwrap();
  assert_eq!(doc_record.textifyed_contents["text"], "the report");
  assert_eq!(doc_record.textifyed_contents["document"], "/files/report.pdf");

  let audio_record = h.ctx.store.get("20").unwrap();
  assert_eq!(audio_record.textifyed_contents["audio"], "/files/song.mp3");
}

#[tokio::test]
async fn voice_location_contact_venue_and_functional_textify() {
  let h = harness();
  let cases = vec![
    (
      21,
      MessageContent::Voice {
        caption: Some("note to self".into()),
        mime_type: "audio/ogg".into(),
        duration: 12,
      },
      ("voice", "MIME type: audio/ogg, duration: 12s"),
    ),
    (
      22,
      MessageContent::Location {
        latitude: 1.5,
        longitude: -2.25,
      },
      ("location", "Latitude: 1.5, Longitude: -2.25"),
    ),
    (
      23,
      MessageContent::Contact {
        first_name: "Ada".into(),
        phone_number: "+441234".into(),
      },
      ("contact", "Name: Ada, Phone: +441234"),
    ),
    (
      24,
      MessageContent::Venue {
        title: "Cafe".into(),
        address: "1 Main St".into(),
      },
      ("venue", "Title: Cafe, Address: 1 Main St"),
    ),
    (
      25,
      MessageContent::Functional(FunctionalEvent::PinMessage { message_id: 3 }),
      ("functional_message", "pinMessage"),
    ),
  ];

  for (id, content, (category, expected)) in cases {
    h.indexer.index_message(Some(message(id, content)), -1, -1).await.unwrap();
    let record = h.ctx.store.get(&id.to_string()).unwrap();
    assert_eq!(record.textifyed_contents[category], expected, "message {id}");
  }

  // The voice caption also landed under "text".
  assert_eq!(h.ctx.store.get("21").unwrap().textifyed_contents["text"], "note to self");
}

#[tokio::test]
async fn reply_id_is_recorded() {
  let h = harness();
  h.indexer
    .index_message(Some(reply_message(26, "replying", 1 << 20)), -1, -1)
    .await
    .unwrap();
  assert_eq!(h.ctx.store.get("26").unwrap().reply_to_message_id, 1 << 20);
}

#[tokio::test]
async fn text_message_is_vector_indexed_under_text_key() {
  let h = harness();
  h.indexer.index_message(Some(text_message(27, "findable")), -1, -1).await.unwrap();

  let index = h.ctx.vector_index.as_ref().unwrap();
  assert_eq!(index.len(), 1);
  let hits = index.search(&text_vector("findable"), 1);
  assert_eq!(hits[0].key, "27:type-0");
  assert_eq!(hits[0].score, 0.0);
}

#[tokio::test]
async fn photo_indexes_both_modalities_when_aligned() {
  let h = harness();
  h.indexer
    .index_message(Some(photo_message(28, Some("cap"), 90, "p.png")), -1, -1)
    .await
    .unwrap();

  let index = h.ctx.vector_index.as_ref().unwrap();
  assert_eq!(index.len(), 2);
  assert_eq!(index.search(&image_vector("p.png"), 1)[0].key, "28:type-1");
}

#[tokio::test]
async fn embedding_failure_does_not_revert_the_record() {
  let h = harness_with(true, true);
  h.indexer.index_message(Some(text_message(29, "hello")), -1, -1).await.unwrap();

  assert!(h.ctx.store.has("29"));
  assert_eq!(h.ctx.vector_index.as_ref().unwrap().len(), 0);
}

#[tokio::test]
async fn upgrade_database_backfills_image_file() {
  let h = harness();
  // An old record, indexed before image_file existed.
  let mut record = chatdex_core::MessageRecord::placeholder(31 << 20, CHAT_ID);
  record.textifyed_contents.insert("text".into(), "old photo".into());
  h.ctx.store.put(record_key(31 << 20), record).unwrap();

  h.client.insert_message(photo_message(31 << 20, Some("old photo"), 95, "restored.png"));

  let upgraded = h.indexer.upgrade_database().await.unwrap();
  assert_eq!(upgraded, 1);
  assert_eq!(
    h.ctx.store.get(&record_key(31 << 20)).unwrap().image_file.as_deref(),
    Some("restored.png")
  );

  // A second pass finds nothing left to do.
  assert_eq!(h.indexer.upgrade_database().await.unwrap(), 0);
}
