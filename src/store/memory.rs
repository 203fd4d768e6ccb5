//! In-memory message log.
//!
//! Backs tests and adapters; also the model for what the file log keeps
//! resident after open.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{Result, SweepError};
use crate::model::{ContentType, RawMessage};
use crate::query::Cursor;

use super::log::{page_over, MessageLog, MessagePredicate};

/// A message log held entirely in memory.
#[derive(Default)]
pub struct MemoryLog {
    conversations: RwLock<BTreeMap<String, Vec<RawMessage>>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record, keeping the conversation ordered by server id.
    pub async fn insert(&self, message: RawMessage) {
        let mut conversations = self.conversations.write().await;
        let records = conversations
            .entry(message.conversation_id.clone())
            .or_default();
        let at = records
            .partition_point(|m| m.server_message_id <= message.server_message_id);
        records.insert(at, message);
    }

    /// Number of records logged for `conversation_id`.
    pub async fn len(&self, conversation_id: &str) -> usize {
        self.conversations
            .read()
            .await
            .get(conversation_id)
            .map_or(0, Vec::len)
    }
}

#[async_trait]
impl MessageLog for MemoryLog {
    async fn conversation_ids(&self) -> Result<Vec<String>> {
        Ok(self.conversations.read().await.keys().cloned().collect())
    }

    async fn get_message(
        &self,
        conversation_id: &str,
        client_message_id: i64,
    ) -> Result<Option<RawMessage>> {
        let conversations = self.conversations.read().await;
        Ok(conversations.get(conversation_id).and_then(|records| {
            records
                .iter()
                .find(|m| m.client_message_id == client_message_id)
                .cloned()
        }))
    }

    async fn fetch_messages(
        &self,
        conversation_id: &str,
        cursor: Cursor,
        page_size: usize,
        newest_first: bool,
        predicate: Option<&MessagePredicate>,
    ) -> Result<Vec<RawMessage>> {
        let conversations = self.conversations.read().await;
        let records = conversations
            .get(conversation_id)
            .map(Vec::as_slice)
            .unwrap_or_default();
        Ok(page_over(records, cursor, page_size, newest_first, predicate))
    }

    async fn update_content_type(
        &self,
        conversation_id: &str,
        client_message_id: i64,
        tag: ContentType,
    ) -> Result<()> {
        let mut conversations = self.conversations.write().await;
        let records = conversations
            .get_mut(conversation_id)
            .ok_or_else(|| SweepError::InvalidConversation(conversation_id.to_string()))?;
        let record = records
            .iter_mut()
            .find(|m| m.client_message_id == client_message_id)
            .ok_or_else(|| {
                SweepError::Store(format!(
                    "no record {client_message_id} in conversation {conversation_id}"
                ))
            })?;
        record.content_type = tag;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testfix::logged_chat;

    #[tokio::test]
    async fn test_insert_keeps_server_id_order() {
        let log = MemoryLog::new();
        log.insert(logged_chat("c", 3, 300, "m")).await;
        log.insert(logged_chat("c", 1, 100, "m")).await;
        log.insert(logged_chat("c", 2, 200, "m")).await;

        let page = log
            .fetch_messages("c", Cursor::Start, 10, false, None)
            .await
            .unwrap();
        let server_ids: Vec<i64> = page.iter().map(|m| m.server_message_id).collect();
        assert_eq!(server_ids, vec![100, 200, 300]);
    }

    #[tokio::test]
    async fn test_conversation_ids_sorted_and_distinct() {
        let log = MemoryLog::new();
        log.insert(logged_chat("beta", 1, 1, "m")).await;
        log.insert(logged_chat("alpha", 1, 1, "m")).await;
        log.insert(logged_chat("beta", 2, 2, "m")).await;

        assert_eq!(
            log.conversation_ids().await.unwrap(),
            vec!["alpha".to_string(), "beta".to_string()]
        );
    }

    #[tokio::test]
    async fn test_update_content_type_unknown_conversation() {
        let log = MemoryLog::new();
        let err = log
            .update_content_type("ghost", 1, ContentType::Status)
            .await
            .unwrap_err();
        assert!(matches!(err, SweepError::InvalidConversation(_)));
    }

    #[tokio::test]
    async fn test_fetch_unknown_conversation_is_empty() {
        let log = MemoryLog::new();
        let page = log
            .fetch_messages("ghost", Cursor::Start, 10, true, None)
            .await
            .unwrap();
        assert!(page.is_empty());
    }
}
