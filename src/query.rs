//! Paginated, filterable retrieval of conversation messages.

use std::sync::Arc;

use tracing::warn;

use crate::bridge::ConversationBridge;
use crate::error::Result;
use crate::model::RawMessage;
use crate::store::{MessageLog, MessagePredicate};

/// Resumption point for a paginated fetch.
///
/// Log queries resume on the record timestamp; bridge pagination resumes
/// on the client-assigned message id. `Start` resolves to the beginning
/// of the chosen direction inside each source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cursor {
    Start,
    Timestamp(i64),
    ClientId(i64),
}

/// Scan direction of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    OldestFirst,
    NewestFirst,
}

impl Direction {
    fn newest_first(self) -> bool {
        matches!(self, Direction::NewestFirst)
    }
}

enum Source {
    Log(Arc<dyn MessageLog>),
    Bridge(Arc<dyn ConversationBridge>),
}

/// A lazy sequence of messages from one conversation.
///
/// Each [`next_page`](ConversationQuery::next_page) call fetches the next
/// slice in the chosen direction and advances the internal cursor;
/// end-of-data is a final empty page (distinct from "no results yet" —
/// pages before the end are never empty). [`rewind`](ConversationQuery::rewind)
/// restarts the sequence from the configured starting cursor.
///
/// Log-backed queries scan either direction; bridge-backed queries follow
/// the host contract and page newest-first only.
pub struct ConversationQuery {
    source: Source,
    conversation_id: String,
    direction: Direction,
    page_size: usize,
    start: Cursor,
    cursor: Cursor,
    predicate: Option<Box<MessagePredicate>>,
}

impl ConversationQuery {
    /// Query a local message log.
    pub fn over_log(
        log: Arc<dyn MessageLog>,
        conversation_id: impl Into<String>,
        direction: Direction,
    ) -> Self {
        Self {
            source: Source::Log(log),
            conversation_id: conversation_id.into(),
            direction,
            page_size: 30,
            start: Cursor::Start,
            cursor: Cursor::Start,
            predicate: None,
        }
    }

    /// Query a remote conversation through the action bridge.
    pub fn over_bridge(
        bridge: Arc<dyn ConversationBridge>,
        conversation_id: impl Into<String>,
    ) -> Self {
        Self {
            source: Source::Bridge(bridge),
            conversation_id: conversation_id.into(),
            direction: Direction::NewestFirst,
            page_size: 20,
            start: Cursor::Start,
            cursor: Cursor::Start,
            predicate: None,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Resume from an explicit cursor instead of the start.
    pub fn starting_at(mut self, cursor: Cursor) -> Self {
        self.start = cursor;
        self.cursor = cursor;
        self
    }

    /// Filter records with a fallible predicate, evaluated after decode.
    /// A failing predicate excludes that record only.
    pub fn filter(
        mut self,
        predicate: impl Fn(&RawMessage) -> Result<bool> + Send + Sync + 'static,
    ) -> Self {
        self.predicate = Some(Box::new(predicate));
        self
    }

    /// Restart the sequence from its starting cursor.
    pub fn rewind(&mut self) {
        self.cursor = self.start;
    }

    /// Fetch the next page. Empty means the conversation is exhausted.
    pub async fn next_page(&mut self) -> Result<Vec<RawMessage>> {
        let page = match &self.source {
            Source::Log(log) => {
                let page = log
                    .fetch_messages(
                        &self.conversation_id,
                        self.cursor,
                        self.page_size,
                        self.direction.newest_first(),
                        self.predicate.as_deref(),
                    )
                    .await?;
                if let Some(last) = page.last() {
                    self.cursor = Cursor::Timestamp(last.timestamp);
                }
                page
            }
            Source::Bridge(bridge) => self.next_bridge_page().await?,
        };
        Ok(page)
    }

    /// Bridge paging applies the predicate on this side of the contract,
    /// so a fully filtered-out slice must not masquerade as end-of-data:
    /// keep pulling until something matches or the bridge runs dry.
    async fn next_bridge_page(&mut self) -> Result<Vec<RawMessage>> {
        let Source::Bridge(bridge) = &self.source else {
            unreachable!("caller checked the source");
        };

        let mut page = Vec::new();
        loop {
            let slice = bridge
                .fetch_page(&self.conversation_id, self.page_size, self.cursor)
                .await?;
            if slice.is_empty() {
                return Ok(page);
            }

            for message in slice {
                // Advance per consumed record so a page that fills
                // mid-slice resumes exactly where it stopped.
                self.cursor = Cursor::ClientId(message.client_message_id);
                match self.predicate.as_deref().map(|p| p(&message)).unwrap_or(Ok(true)) {
                    Ok(true) => page.push(message),
                    Ok(false) => {}
                    Err(e) => {
                        warn!(
                            client_message_id = message.client_message_id,
                            error = %e,
                            "Predicate failed; excluding record"
                        );
                    }
                }
                if page.len() >= self.page_size {
                    return Ok(page);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::LogBridge;
    use crate::decode::{chat_text, classify};
    use crate::model::ContentType;
    use crate::store::testfix::logged_chat;
    use crate::store::MemoryLog;

    async fn seeded_log(count: i64) -> Arc<MemoryLog> {
        let log = Arc::new(MemoryLog::new());
        for id in 1..=count {
            log.insert(logged_chat("conv", id, 100 + id, &format!("msg {id}")))
                .await;
        }
        log
    }

    /// Drain a query to exhaustion, checking no page before the last is empty.
    async fn drain(query: &mut ConversationQuery) -> Vec<i64> {
        let mut ids = Vec::new();
        loop {
            let page = query.next_page().await.unwrap();
            if page.is_empty() {
                return ids;
            }
            ids.extend(page.iter().map(|m| m.client_message_id));
        }
    }

    #[tokio::test]
    async fn test_pagination_partition_oldest_first() {
        let log = seeded_log(10).await;
        let mut query =
            ConversationQuery::over_log(log, "conv", Direction::OldestFirst).with_page_size(3);
        let ids = drain(&mut query).await;
        assert_eq!(ids, (1..=10).collect::<Vec<i64>>());
    }

    #[tokio::test]
    async fn test_pagination_partition_newest_first() {
        let log = seeded_log(10).await;
        let mut query =
            ConversationQuery::over_log(log, "conv", Direction::NewestFirst).with_page_size(4);
        let ids = drain(&mut query).await;
        assert_eq!(ids, (1..=10).rev().collect::<Vec<i64>>());
    }

    #[tokio::test]
    async fn test_rewind_restarts_the_sequence() {
        let log = seeded_log(5).await;
        let mut query =
            ConversationQuery::over_log(log, "conv", Direction::OldestFirst).with_page_size(2);
        let first = drain(&mut query).await;
        query.rewind();
        let second = drain(&mut query).await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_predicate_inspects_decoded_content() {
        let log = seeded_log(6).await;
        let mut query = ConversationQuery::over_log(log, "conv", Direction::OldestFirst)
            .with_page_size(2)
            .filter(|m| {
                Ok(chat_text(&m.reader())
                    .map(|t| t.ends_with('2') || t.ends_with('5'))
                    .unwrap_or(false))
            });
        let ids = drain(&mut query).await;
        assert_eq!(ids, vec![2, 5]);
    }

    #[tokio::test]
    async fn test_bridge_query_skips_filtered_slices() {
        let log = seeded_log(9).await;
        let bridge = Arc::new(LogBridge::new(log));
        let mut query = ConversationQuery::over_bridge(bridge, "conv")
            .with_page_size(2)
            // Only the two oldest match; several newest-first slices are
            // fully filtered out before anything matches.
            .filter(|m| Ok(m.client_message_id <= 2));
        let ids = drain(&mut query).await;
        assert_eq!(ids, vec![2, 1]);
    }

    #[tokio::test]
    async fn test_starting_cursor_resumes_mid_conversation() {
        let log = seeded_log(8).await;
        let mut query = ConversationQuery::over_log(log, "conv", Direction::OldestFirst)
            .with_page_size(3)
            .starting_at(Cursor::Timestamp(5000));
        let ids = drain(&mut query).await;
        assert_eq!(ids, vec![6, 7, 8]);
    }

    #[tokio::test]
    async fn test_classification_is_visible_through_pages() {
        let log = seeded_log(2).await;
        let mut query = ConversationQuery::over_log(log, "conv", Direction::OldestFirst);
        let page = query.next_page().await.unwrap();
        assert!(page
            .iter()
            .all(|m| classify(&m.reader()) == ContentType::Chat));
    }
}
