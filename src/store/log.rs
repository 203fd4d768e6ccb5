//! The message log query contract.

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{ContentType, RawMessage};
use crate::query::Cursor;

/// Per-record filter applied during a fetch.
///
/// The predicate receives the raw record and may decode its payload to
/// decide inclusion. It is fallible: an `Err` excludes that record (the
/// store logs it and moves on), it never aborts the page.
pub type MessagePredicate = dyn Fn(&RawMessage) -> Result<bool> + Send + Sync;

/// Query contract of a local conversation log.
///
/// Implementations keep records ordered by server-assigned message id
/// (strictly increasing within a conversation); fetch order follows that
/// ordering in the requested direction.
#[async_trait]
pub trait MessageLog: Send + Sync {
    /// All conversation ids present in the log.
    async fn conversation_ids(&self) -> Result<Vec<String>>;

    /// Point lookup by client-assigned message id.
    async fn get_message(
        &self,
        conversation_id: &str,
        client_message_id: i64,
    ) -> Result<Option<RawMessage>>;

    /// Fetch up to `page_size` records matching `predicate`, resuming
    /// after `cursor`, newest first when `newest_first` is set.
    ///
    /// The store scans past non-matching records until the page fills or
    /// the conversation is exhausted, so an empty page always means
    /// end-of-data, never "nothing matched in this slice".
    async fn fetch_messages(
        &self,
        conversation_id: &str,
        cursor: Cursor,
        page_size: usize,
        newest_first: bool,
        predicate: Option<&MessagePredicate>,
    ) -> Result<Vec<RawMessage>>;

    /// Rewrite the content-type tag of one record in place. Used by the
    /// soft-delete side effect; the record is never erased.
    async fn update_content_type(
        &self,
        conversation_id: &str,
        client_message_id: i64,
        tag: ContentType,
    ) -> Result<()>;
}

/// Shared fetch logic over an ordered slice of records.
///
/// `messages` must be sorted by server id ascending. Returns the next
/// page in the requested direction, applying cursor and predicate with
/// the contract documented on [`MessageLog::fetch_messages`].
pub(crate) fn page_over(
    messages: &[RawMessage],
    cursor: Cursor,
    page_size: usize,
    newest_first: bool,
    predicate: Option<&MessagePredicate>,
) -> Vec<RawMessage> {
    let mut page = Vec::new();
    if page_size == 0 {
        return page;
    }

    let in_range = |m: &RawMessage| match cursor {
        Cursor::Start => true,
        Cursor::Timestamp(t) => {
            if newest_first {
                m.timestamp < t
            } else {
                m.timestamp > t
            }
        }
        Cursor::ClientId(id) => {
            if newest_first {
                m.client_message_id < id
            } else {
                m.client_message_id > id
            }
        }
    };

    let mut push_matching = |m: &RawMessage| -> bool {
        if !in_range(m) {
            return true;
        }
        match predicate.map(|p| p(m)).unwrap_or(Ok(true)) {
            Ok(true) => page.push(m.clone()),
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(
                    client_message_id = m.client_message_id,
                    error = %e,
                    "Predicate failed; excluding record"
                );
            }
        }
        page.len() < page_size
    };

    if newest_first {
        for m in messages.iter().rev() {
            if !push_matching(m) {
                break;
            }
        }
    } else {
        for m in messages {
            if !push_matching(m) {
                break;
            }
        }
    }
    page
}
