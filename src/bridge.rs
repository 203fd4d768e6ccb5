//! The remote action bridge: the seam to whatever host actually applies
//! actions to a conversation.
//!
//! The bulk engine depends only on this contract, never on a transport.
//! [`LogBridge`] adapts a local [`MessageLog`] to the same contract so the
//! full pipeline can run offline against logged conversations.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{Result, SweepError};
use crate::model::{ContentType, RawMessage};
use crate::query::Cursor;
use crate::store::MessageLog;

/// The action a bulk run applies to each matching message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Save,
    Unsave,
    Read,
    Delete,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Save => "save",
            ActionKind::Unsave => "unsave",
            ActionKind::Read => "read",
            ActionKind::Delete => "delete",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "save" => Ok(ActionKind::Save),
            "unsave" => Ok(ActionKind::Unsave),
            "read" => Ok(ActionKind::Read),
            "delete" => Ok(ActionKind::Delete),
            other => Err(format!("unknown action '{other}'")),
        }
    }
}

/// Request/response contract with the host that owns the conversation.
///
/// `perform_action` distinguishes two failure shapes through
/// [`SweepError::is_fatal`]: `ActionRejected` fails one message and the
/// bulk loop continues; anything else aborts the run.
#[async_trait]
pub trait ConversationBridge: Send + Sync {
    /// Apply `kind` to one message.
    async fn perform_action(
        &self,
        conversation_id: &str,
        client_message_id: i64,
        kind: ActionKind,
    ) -> Result<()>;

    /// Fetch up to `page_size` messages older than `cursor`, newest first.
    /// An empty page means the conversation is exhausted.
    async fn fetch_page(
        &self,
        conversation_id: &str,
        page_size: usize,
        cursor: Cursor,
    ) -> Result<Vec<RawMessage>>;
}

/// Bridge over a local message log.
///
/// DELETE is applied with the host's soft-delete semantics: the record's
/// content-type tag is rewritten to `status`, the record itself stays.
/// SAVE/UNSAVE/READ are acknowledged after validating the target exists —
/// the log keeps no saved/read flags of its own.
pub struct LogBridge {
    log: Arc<dyn MessageLog>,
}

impl LogBridge {
    pub fn new(log: Arc<dyn MessageLog>) -> Self {
        Self { log }
    }
}

#[async_trait]
impl ConversationBridge for LogBridge {
    async fn perform_action(
        &self,
        conversation_id: &str,
        client_message_id: i64,
        kind: ActionKind,
    ) -> Result<()> {
        let message = self
            .log
            .get_message(conversation_id, client_message_id)
            .await?
            .ok_or_else(|| {
                SweepError::ActionRejected(format!(
                    "message {client_message_id} not found in conversation"
                ))
            })?;

        match kind {
            ActionKind::Delete => {
                self.log
                    .update_content_type(conversation_id, client_message_id, ContentType::Status)
                    .await?;
                debug!(
                    conversation_id,
                    client_message_id, "Marked record deleted (status)"
                );
            }
            ActionKind::Save | ActionKind::Unsave | ActionKind::Read => {
                debug!(
                    conversation_id,
                    client_message_id,
                    action = %kind,
                    server_message_id = message.server_message_id,
                    "Acknowledged action on logged record"
                );
            }
        }
        Ok(())
    }

    async fn fetch_page(
        &self,
        conversation_id: &str,
        page_size: usize,
        cursor: Cursor,
    ) -> Result<Vec<RawMessage>> {
        self.log
            .fetch_messages(conversation_id, cursor, page_size, true, None)
            .await
    }
}
