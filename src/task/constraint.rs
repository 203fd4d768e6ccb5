//! Constraints: named predicates deciding which messages a sweep touches.

use std::collections::HashSet;
use std::fmt;

use uuid::Uuid;

use crate::decode::{chat_text, classify};
use crate::model::{ContentType, RawMessage};

/// Evaluation context shared by every constraint in one run.
#[derive(Debug, Clone, Default)]
pub struct TaskContext {
    /// The operator's own account id, when known.
    pub my_user_id: Option<Uuid>,
    /// Well-known system account ids (from configuration, never inline).
    pub system_sender_ids: HashSet<Uuid>,
}

/// A named predicate over `(message, context)`.
///
/// Constraints combine with logical AND and evaluate in declaration
/// order, so callers list cheap metadata checks before anything that
/// decodes payload content. Order never changes the inclusion decision,
/// only how much work a rejection costs.
pub struct Constraint {
    name: &'static str,
    predicate: Box<dyn Fn(&RawMessage, &TaskContext) -> bool + Send + Sync>,
}

impl fmt::Debug for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Constraint").field("name", &self.name).finish()
    }
}

impl Constraint {
    pub fn new(
        name: &'static str,
        predicate: impl Fn(&RawMessage, &TaskContext) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            predicate: Box::new(predicate),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn evaluate(&self, message: &RawMessage, ctx: &TaskContext) -> bool {
        (self.predicate)(message, ctx)
    }

    /// True iff every constraint passes. An empty list includes everything.
    pub fn all(constraints: &[Constraint], message: &RawMessage, ctx: &TaskContext) -> bool {
        for constraint in constraints {
            if !constraint.evaluate(message, ctx) {
                tracing::trace!(
                    client_message_id = message.client_message_id,
                    constraint = constraint.name,
                    "Excluded by constraint"
                );
                return false;
            }
        }
        true
    }

    // ── Built-ins ───────────────────────────────────────────────

    /// Sender equals `id`. Records without a sender never match.
    pub fn from_sender(id: Uuid) -> Self {
        Self::new("from_sender", move |m, _| m.sender_id == Some(id))
    }

    /// Sender differs from `id`. Records without a sender match.
    pub fn not_from_sender(id: Uuid) -> Self {
        Self::new("not_from_sender", move |m, _| m.sender_id != Some(id))
    }

    /// The operator's own messages only.
    pub fn own_messages() -> Self {
        Self::new("own_messages", |m, ctx| {
            ctx.my_user_id.is_some() && m.sender_id == ctx.my_user_id
        })
    }

    /// Everyone's messages but the operator's.
    pub fn not_own_messages() -> Self {
        Self::new("not_own_messages", |m, ctx| {
            ctx.my_user_id.is_none() || m.sender_id != ctx.my_user_id
        })
    }

    /// Classified payload category is in `types`.
    ///
    /// Classifies the payload (a cheap discriminator probe), not the
    /// record's mutable tag — the tag is what actions rewrite.
    pub fn content_types(types: &[ContentType]) -> Self {
        let wanted: HashSet<ContentType> = types.iter().copied().collect();
        Self::new("content_types", move |m, _| {
            wanted.contains(&classify(&m.reader()))
        })
    }

    /// The record is not already in a terminal state (its mutable tag is
    /// not `status`), so destructive sweeps skip already-deleted records.
    pub fn not_terminal() -> Self {
        Self::new("not_terminal", |m, _| !m.content_type.is_terminal())
    }

    /// Sender is not one of the configured system accounts. Records
    /// without a sender pass.
    pub fn not_system_sender() -> Self {
        Self::new("not_system_sender", |m, ctx| {
            m.sender_id
                .map(|id| !ctx.system_sender_ids.contains(&id))
                .unwrap_or(true)
        })
    }

    /// Chat text contains `needle` (case-insensitive). Requires a full
    /// decode — list this one last. Non-chat payloads never match.
    pub fn chat_contains(needle: impl Into<String>) -> Self {
        let needle = needle.into().to_lowercase();
        Self::new("chat_contains", move |m, _| {
            chat_text(&m.reader())
                .map(|text| text.to_lowercase().contains(&needle))
                .unwrap_or(false)
        })
    }
}
