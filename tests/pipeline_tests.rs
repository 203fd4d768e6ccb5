//! End-to-end pipeline tests: log → query → decode → constraints → sweep.

use std::sync::Arc;

use uuid::Uuid;

use chatsweep::bridge::{ActionKind, LogBridge};
use chatsweep::decode::{chat_text, classify, extract_attachments};
use chatsweep::model::{ContentType, RawMessage};
use chatsweep::query::{ConversationQuery, Cursor, Direction};
use chatsweep::store::{MemoryLog, MessageLog};
use chatsweep::task::{BulkTask, Constraint, TaskState};

// ── Wire fixtures ───────────────────────────────────────────────

fn varint(value: u64, out: &mut Vec<u8>) {
    let mut v = value;
    loop {
        let byte = (v & 0x7f) as u8;
        v >>= 7;
        if v == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

fn field(field_number: u32, wire: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    varint((u64::from(field_number) << 3) | u64::from(wire), &mut out);
    if wire == 2 {
        varint(payload.len() as u64, &mut out);
    }
    out.extend_from_slice(payload);
    out
}

/// A chat container: text under field 2 → field 1.
fn chat_payload(text: &str) -> Vec<u8> {
    field(2, 2, &field(1, 2, text.as_bytes()))
}

/// A snap container with one media reference.
fn snap_payload(media_key: &[u8], media_type: u64) -> Vec<u8> {
    let locator = field(2, 2, media_key);
    let mut entry = field(1, 2, &locator);
    entry.extend(field(2, 0, &{
        let mut v = Vec::new();
        varint(media_type, &mut v);
        v
    }));
    let envelope = field(3, 2, &entry);
    field(11, 2, &envelope)
}

fn message(
    conversation: &str,
    client_id: i64,
    sender: Option<Uuid>,
    content: Vec<u8>,
) -> RawMessage {
    RawMessage {
        conversation_id: conversation.to_string(),
        sender_id: sender,
        client_message_id: client_id,
        server_message_id: 1000 + client_id,
        timestamp: client_id * 1000,
        content,
        content_type: ContentType::Chat,
    }
}

async fn mixed_conversation(me: Uuid, other: Uuid) -> Arc<MemoryLog> {
    let log = Arc::new(MemoryLog::new());
    log.insert(message("conv", 1, Some(other), chat_payload("hey there")))
        .await;
    log.insert(message("conv", 2, Some(me), chat_payload("my reply")))
        .await;
    log.insert({
        let mut m = message("conv", 3, Some(other), snap_payload(b"media-key-3", 2));
        m.content_type = ContentType::Snap;
        m
    })
    .await;
    log.insert(message("conv", 4, Some(other), chat_payload("the budget doc")))
        .await;
    log
}

// ── Scenarios ───────────────────────────────────────────────────

#[tokio::test]
async fn delete_sweep_soft_deletes_only_other_senders() {
    let me = Uuid::from_u128(1);
    let other = Uuid::from_u128(2);
    let log = mixed_conversation(me, other).await;
    let bridge = Arc::new(LogBridge::new(log.clone()));

    let outcome = BulkTask::new(bridge, "conv", ActionKind::Delete)
        .with_constraints(vec![
            Constraint::not_from_sender(me),
            Constraint::not_terminal(),
        ])
        .run()
        .await;

    assert_eq!(outcome.state, TaskState::Completed);
    assert_eq!(outcome.processed, 3);

    // Every record still exists; only the other sender's were marked.
    for id in 1..=4 {
        let record = log
            .get_message("conv", id)
            .await
            .unwrap()
            .expect("record survives the sweep");
        if id == 2 {
            assert_eq!(record.content_type, ContentType::Chat);
        } else {
            assert_eq!(record.content_type, ContentType::Status);
        }
    }
}

#[tokio::test]
async fn second_delete_sweep_finds_nothing_left() {
    let me = Uuid::from_u128(1);
    let other = Uuid::from_u128(2);
    let log = mixed_conversation(me, other).await;
    let bridge = Arc::new(LogBridge::new(log.clone()));

    let first = BulkTask::new(bridge.clone(), "conv", ActionKind::Delete)
        .with_constraints(vec![Constraint::not_terminal()])
        .run()
        .await;
    assert_eq!(first.processed, 4);

    // Terminal records are excluded from the second pass.
    let second = BulkTask::new(bridge, "conv", ActionKind::Delete)
        .with_constraints(vec![Constraint::not_terminal()])
        .run()
        .await;
    assert_eq!(second.state, TaskState::Completed);
    assert_eq!(second.processed, 0);
}

#[tokio::test]
async fn content_type_refinement_narrows_a_full_scan() {
    let me = Uuid::from_u128(1);
    let other = Uuid::from_u128(2);
    let log = mixed_conversation(me, other).await;
    let bridge = Arc::new(LogBridge::new(log.clone()));

    let outcome = BulkTask::new(bridge, "conv", ActionKind::Save)
        .with_constraints(vec![Constraint::content_types(&[ContentType::Snap])])
        .run()
        .await;

    assert_eq!(outcome.state, TaskState::Completed);
    assert_eq!(outcome.processed, 1);
}

#[tokio::test]
async fn explicit_selection_bypasses_constraints() {
    let me = Uuid::from_u128(1);
    let other = Uuid::from_u128(2);
    let log = mixed_conversation(me, other).await;
    let bridge = Arc::new(LogBridge::new(log.clone()));

    let outcome = BulkTask::new(bridge, "conv", ActionKind::Read)
        .with_explicit_ids(vec![2, 3])
        .run()
        .await;

    assert_eq!(outcome.state, TaskState::Completed);
    assert_eq!(outcome.processed, 2);
}

#[tokio::test]
async fn query_decode_and_extraction_compose() {
    let me = Uuid::from_u128(1);
    let other = Uuid::from_u128(2);
    let log = mixed_conversation(me, other).await;

    // Chat-text filter sees only the matching chat message
    let mut query = ConversationQuery::over_log(log.clone(), "conv", Direction::OldestFirst)
        .filter(|m| {
            Ok(chat_text(&m.reader())
                .map(|t| t.contains("budget"))
                .unwrap_or(false))
        });
    let page = query.next_page().await.unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].client_message_id, 4);
    assert!(query.next_page().await.unwrap().is_empty());

    // The snap decodes to exactly one video attachment
    let snap = log.get_message("conv", 3).await.unwrap().unwrap();
    assert_eq!(classify(&snap.reader()), ContentType::Snap);
    let attachments = extract_attachments(&snap.reader());
    assert_eq!(attachments.len(), 1);
    assert!(!attachments[0].media_id().is_empty());
}

#[tokio::test]
async fn pagination_partition_over_the_log() {
    let log = Arc::new(MemoryLog::new());
    for id in 1..=23 {
        log.insert(message("conv", id, None, chat_payload("m"))).await;
    }

    for direction in [Direction::OldestFirst, Direction::NewestFirst] {
        let mut query = ConversationQuery::over_log(log.clone(), "conv", direction)
            .with_page_size(5)
            .starting_at(Cursor::Start);
        let mut ids = Vec::new();
        loop {
            let page = query.next_page().await.unwrap();
            if page.is_empty() {
                break;
            }
            ids.extend(page.iter().map(|m| m.client_message_id));
        }
        let mut expected: Vec<i64> = (1..=23).collect();
        if direction == Direction::NewestFirst {
            expected.reverse();
        }
        assert_eq!(ids, expected, "direction {direction:?}");
    }
}

#[tokio::test]
async fn sweep_over_an_unknown_conversation_completes_empty() {
    let log = Arc::new(MemoryLog::new());
    let bridge = Arc::new(LogBridge::new(log));

    let outcome = BulkTask::new(bridge, "ghost", ActionKind::Save).run().await;
    assert_eq!(outcome.state, TaskState::Completed);
    assert_eq!(outcome.processed, 0);
}
