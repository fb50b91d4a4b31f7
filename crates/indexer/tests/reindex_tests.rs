mod common;

use chatdex_core::{external_id, record_key};
use common::*;
use indexer::ClientError;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

#[tokio::test]
async fn fills_holes_and_writes_placeholders_for_deleted_messages() {
  let h = harness();
  // Upstream has messages 1, 2 and 4; message 5 was deleted.
  for sequence in [1, 2, 4] {
    h.client.insert_message(text_message(external_id(sequence), &format!("msg {sequence}")));
  }
  // Sequence 3 is already indexed locally.
  h.indexer
    .index_message(Some(text_message(external_id(3), "already here")), -1, -1)
    .await
    .unwrap();

  let progress = Arc::new(Mutex::new(Vec::new()));
  let progress_in_cb = Arc::clone(&progress);
  h.indexer
    .index_messages_in_chat(CHAT_ID, 5, move |chat_id, current| {
      progress_in_cb.lock().unwrap().push((chat_id, current));
    })
    .await
    .unwrap();

  assert_eq!(h.ctx.store.len(), 5);
  for sequence in [1, 2, 4] {
    let record = h.ctx.store.get(&record_key(external_id(sequence))).unwrap();
    assert_eq!(record.textifyed_contents["text"], format!("msg {sequence}"));
  }
  let deleted = h.ctx.store.get(&record_key(external_id(5))).unwrap();
  assert!(deleted.is_empty());
  assert_eq!(deleted.chat_id, CHAT_ID);

  // One upstream fetch (4 missing ids fit one batch), one progress call.
  assert_eq!(h.client.get_messages_calls.load(Ordering::SeqCst), 1);
  assert_eq!(progress.lock().unwrap().as_slice(), &[(CHAT_ID, 6)]);
}

#[tokio::test]
async fn second_run_is_idempotent_and_skips_the_fetch() {
  let h = harness();
  for sequence in 1..=4 {
    h.client.insert_message(text_message(external_id(sequence), &format!("msg {sequence}")));
  }

  h.indexer.index_messages_in_chat(CHAT_ID, 4, |_, _| {}).await.unwrap();
  let after_first = h.ctx.store.records();
  let calls_after_first = h.client.get_messages_calls.load(Ordering::SeqCst);

  h.indexer.index_messages_in_chat(CHAT_ID, 4, |_, _| {}).await.unwrap();
  assert_eq!(h.ctx.store.records(), after_first);
  assert_eq!(h.client.get_messages_calls.load(Ordering::SeqCst), calls_after_first);
}

#[tokio::test(start_paused = true)]
async fn rate_limit_sleeps_and_retries_the_same_batch() {
  let h = harness();
  for sequence in 1..=3 {
    h.client.insert_message(text_message(external_id(sequence), &format!("msg {sequence}")));
  }
  h.client
    .push_get_messages_error(ClientError::Upstream("Too Many Requests: retry after 2".into()));

  let started = tokio::time::Instant::now();
  h.indexer.index_messages_in_chat(CHAT_ID, 3, |_, _| {}).await.unwrap();

  // Advertised 2 s plus the 5 s margin.
  assert!(started.elapsed() >= std::time::Duration::from_secs(7));
  assert_eq!(h.client.get_messages_calls.load(Ordering::SeqCst), 2);
  assert_eq!(h.ctx.store.len(), 3);
}

#[tokio::test]
async fn non_rate_limit_error_aborts_the_chat() {
  let h = harness();
  h.client.insert_message(text_message(external_id(1), "msg"));
  h.client.push_get_messages_error(ClientError::Upstream("internal server error".into()));

  let result = h.indexer.index_messages_in_chat(CHAT_ID, 1, |_, _| {}).await;
  assert!(result.is_err());
  assert_eq!(h.ctx.store.len(), 0);
}

#[tokio::test]
async fn individual_message_failures_do_not_abort_the_batch() {
  let h = harness();
  h.client.insert_message(text_message(external_id(1), "good"));
  // Message 2 has a sender the client cannot resolve.
  let mut bad = text_message(external_id(2), "bad sender");
  bad.sender = extract::message::MessageSender::User { user_id: 424242 };
  h.client.insert_message(bad);

  h.indexer.index_messages_in_chat(CHAT_ID, 2, |_, _| {}).await.unwrap();

  assert!(h.ctx.store.has(&record_key(external_id(1))));
  // The failed message left a hole, visible to a later reindex.
  assert!(!h.ctx.store.has(&record_key(external_id(2))));
}
