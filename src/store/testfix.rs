//! Record fixtures for store, bridge, query and task tests.

use uuid::Uuid;

use crate::model::{ContentType, RawMessage};
use crate::proto::testenc::{message_field, str_field};

/// A logged chat message. Timestamps are `1000 * client id` and server
/// ids follow client ids so cursor math stays easy to eyeball in tests.
pub fn logged_chat(conversation: &str, client_id: i64, server_id: i64, text: &str) -> RawMessage {
    RawMessage {
        conversation_id: conversation.to_string(),
        sender_id: Some(Uuid::from_u128(1)),
        client_message_id: client_id,
        server_message_id: server_id,
        timestamp: client_id * 1000,
        content: message_field(2, &str_field(1, text)),
        content_type: ContentType::Chat,
    }
}

/// Same as [`logged_chat`] with an explicit sender.
pub fn logged_chat_from(
    conversation: &str,
    client_id: i64,
    server_id: i64,
    sender: Uuid,
    text: &str,
) -> RawMessage {
    RawMessage {
        sender_id: Some(sender),
        ..logged_chat(conversation, client_id, server_id, text)
    }
}
