//! The bulk task engine: one run of one action over a filtered set of
//! messages in one conversation.
//!
//! A task moves `Created → Running → {Completed, Cancelled, Failed}`;
//! terminal states are final. The driving loop pulls candidate pages from
//! the bridge, decodes and filters synchronously between awaits, applies
//! the action per matching message, and reports progress over a channel
//! so any presentation layer can subscribe without owning task internals.
//!
//! Concurrency contract: at most one task may be RUNNING per conversation
//! at a time — [`BulkTask::run`] consumes the task, and serializing runs
//! against one conversation is the caller's responsibility (a UI disables
//! its trigger while a run is active).

pub mod constraint;

use std::collections::HashSet;
use std::sync::Arc;

use rand::Rng;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bridge::{ActionKind, ConversationBridge};
use crate::error::Result;
use crate::model::RawMessage;
use crate::query::Cursor;

pub use constraint::{Constraint, TaskContext};

/// Lifecycle of a bulk task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Created,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Cancelled | TaskState::Failed
        )
    }
}

/// Progress and terminal events emitted during a run.
#[derive(Debug, Clone)]
pub enum TaskEvent {
    /// The run entered `Running`. `goal` is the candidate count when the
    /// scope is an explicit id list (determinate progress) and `None` for
    /// a full scan (running count only).
    Started { goal: Option<usize> },
    /// One action succeeded; `processed` is the new running count.
    Processed {
        client_message_id: i64,
        processed: usize,
    },
    /// One action was rejected; the run continues.
    MessageFailed {
        client_message_id: i64,
        reason: String,
    },
    /// The run reached a terminal state.
    Finished { state: TaskState, processed: usize },
}

/// What a finished run reports back to its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskOutcome {
    /// Terminal state: `Completed`, `Cancelled` or `Failed`.
    pub state: TaskState,
    /// Actions applied before the run ended. Never rolled back.
    pub processed: usize,
}

type SuccessCallback = Box<dyn Fn(&RawMessage) + Send + Sync>;
type FailureCallback = Box<dyn Fn(&RawMessage, &str) + Send + Sync>;

/// One configured bulk run.
pub struct BulkTask {
    bridge: Arc<dyn ConversationBridge>,
    kind: ActionKind,
    conversation_id: String,
    constraints: Vec<Constraint>,
    context: TaskContext,
    /// Explicit client-id allowlist. Bounds the goal; `None` scans the
    /// whole conversation.
    explicit_ids: Option<Vec<i64>>,
    page_size: usize,
    /// Optional `[min, max]` ms slept between consecutive actions.
    action_delay_ms: Option<[u64; 2]>,
    cancel: CancellationToken,
    events: Option<UnboundedSender<TaskEvent>>,
    on_success: Option<SuccessCallback>,
    on_failure: Option<FailureCallback>,
    state: TaskState,
    processed: usize,
}

impl BulkTask {
    pub fn new(
        bridge: Arc<dyn ConversationBridge>,
        conversation_id: impl Into<String>,
        kind: ActionKind,
    ) -> Self {
        Self {
            bridge,
            kind,
            conversation_id: conversation_id.into(),
            constraints: Vec::new(),
            context: TaskContext::default(),
            explicit_ids: None,
            page_size: 20,
            action_delay_ms: None,
            cancel: CancellationToken::new(),
            events: None,
            on_success: None,
            on_failure: None,
            state: TaskState::Created,
            processed: 0,
        }
    }

    pub fn with_constraints(mut self, constraints: Vec<Constraint>) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn with_context(mut self, context: TaskContext) -> Self {
        self.context = context;
        self
    }

    /// Restrict the run to these client message ids. The goal becomes
    /// bounded and progress determinate.
    pub fn with_explicit_ids(mut self, ids: Vec<i64>) -> Self {
        self.explicit_ids = Some(ids);
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Sleep a random interval in `[min, max]` ms between actions.
    pub fn with_action_delay(mut self, bounds: [u64; 2]) -> Self {
        self.action_delay_ms = Some(bounds);
        self
    }

    /// Subscribe a progress channel.
    pub fn with_events(mut self, events: UnboundedSender<TaskEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Called after each successful action. May mutate caller-side state
    /// (the classic use: flip a cached record's tag to mark it processed).
    pub fn on_success(mut self, f: impl Fn(&RawMessage) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Box::new(f));
        self
    }

    /// Called after each rejected action with the rejection reason.
    pub fn on_failure(mut self, f: impl Fn(&RawMessage, &str) + Send + Sync + 'static) -> Self {
        self.on_failure = Some(Box::new(f));
        self
    }

    /// Use a caller-owned cancellation token instead of the task's own.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token the caller keeps to cancel the run. Cancellation is observed
    /// between candidates, never mid-decode or mid-call.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Whether this run has a bounded goal (explicit id list).
    pub fn has_bounded_goal(&self) -> bool {
        self.explicit_ids.is_some()
    }

    fn emit(&self, event: TaskEvent) {
        if let Some(events) = &self.events {
            // A dropped subscriber must not stop the run.
            let _ = events.send(event);
        }
    }

    fn transition(&mut self, next: TaskState) {
        debug_assert!(
            !self.state.is_terminal(),
            "no transition leaves a terminal state"
        );
        self.state = next;
    }

    /// Drive the run to a terminal state. Consumes the task: one instance,
    /// one invocation.
    pub async fn run(mut self) -> TaskOutcome {
        self.transition(TaskState::Running);
        let goal = self.explicit_ids.as_ref().map(Vec::len);
        self.emit(TaskEvent::Started { goal });
        info!(
            conversation_id = %self.conversation_id,
            action = %self.kind,
            ?goal,
            "Bulk task started"
        );

        let terminal = match self.drive().await {
            Ok(state) => state,
            Err(e) => {
                error!(
                    conversation_id = %self.conversation_id,
                    action = %self.kind,
                    error = %e,
                    "Bulk task failed"
                );
                TaskState::Failed
            }
        };
        self.transition(terminal);
        self.emit(TaskEvent::Finished {
            state: terminal,
            processed: self.processed,
        });
        info!(
            conversation_id = %self.conversation_id,
            state = ?terminal,
            processed = self.processed,
            "Bulk task finished"
        );

        TaskOutcome {
            state: terminal,
            processed: self.processed,
        }
    }

    /// The candidate loop. Returns the terminal state, or an error for
    /// infrastructure faults (mapped to `Failed` by the caller).
    async fn drive(&mut self) -> Result<TaskState> {
        let mut remaining: Option<HashSet<i64>> =
            self.explicit_ids.as_ref().map(|ids| ids.iter().copied().collect());
        if let Some(rem) = &remaining {
            if rem.is_empty() {
                return Ok(TaskState::Completed);
            }
        }

        let mut cursor = Cursor::Start;
        loop {
            if self.cancel.is_cancelled() {
                return Ok(TaskState::Cancelled);
            }

            let page = self
                .bridge
                .fetch_page(&self.conversation_id, self.page_size, cursor)
                .await?;
            let Some(last) = page.last() else {
                // Scan exhausted. With an allowlist, unseen ids simply
                // never existed in the conversation.
                return Ok(TaskState::Completed);
            };
            cursor = Cursor::ClientId(last.client_message_id);

            for message in &page {
                if self.cancel.is_cancelled() {
                    return Ok(TaskState::Cancelled);
                }
                if let Some(rem) = &mut remaining {
                    // Seen is decided: listed ids that fail constraints
                    // or get rejected are not retried on later pages.
                    if !rem.remove(&message.client_message_id) {
                        continue;
                    }
                }

                if Constraint::all(&self.constraints, message, &self.context) {
                    self.apply_action(message).await?;
                    self.pause_between_actions().await;
                }

                if let Some(rem) = &remaining {
                    if rem.is_empty() {
                        return Ok(TaskState::Completed);
                    }
                }
            }
        }
    }

    /// Apply the action to one message; rejections are reported and
    /// swallowed, infrastructure errors propagate.
    async fn apply_action(&mut self, message: &RawMessage) -> Result<()> {
        match self
            .bridge
            .perform_action(&self.conversation_id, message.client_message_id, self.kind)
            .await
        {
            Ok(()) => {
                self.processed += 1;
                debug!(
                    client_message_id = message.client_message_id,
                    processed = self.processed,
                    "Action applied"
                );
                self.emit(TaskEvent::Processed {
                    client_message_id: message.client_message_id,
                    processed: self.processed,
                });
                if let Some(on_success) = &self.on_success {
                    on_success(message);
                }
                Ok(())
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                let reason = e.to_string();
                warn!(
                    client_message_id = message.client_message_id,
                    reason, "Action rejected; continuing"
                );
                self.emit(TaskEvent::MessageFailed {
                    client_message_id: message.client_message_id,
                    reason: reason.clone(),
                });
                if let Some(on_failure) = &self.on_failure {
                    on_failure(message, &reason);
                }
                Ok(())
            }
        }
    }

    async fn pause_between_actions(&self) {
        if let Some([min, max]) = self.action_delay_ms {
            let ms = if max > min {
                rand::thread_rng().gen_range(min..=max)
            } else {
                min
            };
            if ms > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::LogBridge;
    use crate::error::SweepError;
    use crate::model::ContentType;
    use crate::store::testfix::{logged_chat, logged_chat_from};
    use crate::store::{MemoryLog, MessageLog};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use uuid::Uuid;

    /// Bridge that counts calls and can reject or die on chosen ids.
    struct ScriptedBridge {
        log: Arc<MemoryLog>,
        calls: AtomicUsize,
        reject: Vec<i64>,
        die_on: Option<i64>,
        cancel_after: Option<(usize, CancellationToken)>,
    }

    impl ScriptedBridge {
        fn over(log: Arc<MemoryLog>) -> Self {
            Self {
                log,
                calls: AtomicUsize::new(0),
                reject: Vec::new(),
                die_on: None,
                cancel_after: None,
            }
        }

        fn action_calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ConversationBridge for ScriptedBridge {
        async fn perform_action(
            &self,
            _conversation_id: &str,
            client_message_id: i64,
            _kind: ActionKind,
        ) -> crate::error::Result<()> {
            let calls = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some((after, token)) = &self.cancel_after {
                if calls >= *after {
                    token.cancel();
                }
            }
            if self.die_on == Some(client_message_id) {
                return Err(SweepError::BridgeUnavailable("connection lost".into()));
            }
            if self.reject.contains(&client_message_id) {
                return Err(SweepError::ActionRejected("not allowed".into()));
            }
            Ok(())
        }

        async fn fetch_page(
            &self,
            conversation_id: &str,
            page_size: usize,
            cursor: Cursor,
        ) -> crate::error::Result<Vec<RawMessage>> {
            self.log
                .fetch_messages(conversation_id, cursor, page_size, true, None)
                .await
        }
    }

    async fn seeded(count: i64) -> Arc<MemoryLog> {
        let log = Arc::new(MemoryLog::new());
        for id in 1..=count {
            log.insert(logged_chat("conv", id, 100 + id, "m")).await;
        }
        log
    }

    #[tokio::test]
    async fn test_explicit_ids_all_succeed_reaches_goal() {
        let log = seeded(10).await;
        let bridge = Arc::new(ScriptedBridge::over(log));
        let outcome = BulkTask::new(bridge.clone(), "conv", ActionKind::Save)
            .with_explicit_ids(vec![2, 5, 9])
            .with_page_size(3)
            .run()
            .await;

        assert_eq!(outcome.state, TaskState::Completed);
        assert_eq!(outcome.processed, 3);
        assert_eq!(bridge.action_calls(), 3);
    }

    #[tokio::test]
    async fn test_processed_at_most_goal_when_some_reject() {
        let log = seeded(6).await;
        let mut bridge = ScriptedBridge::over(log);
        bridge.reject = vec![3];
        let bridge = Arc::new(bridge);

        let failures = Arc::new(Mutex::new(Vec::new()));
        let seen = failures.clone();
        let outcome = BulkTask::new(bridge.clone(), "conv", ActionKind::Unsave)
            .with_explicit_ids(vec![1, 3, 6])
            .on_failure(move |m, reason| {
                seen.lock().unwrap().push((m.client_message_id, reason.to_string()));
            })
            .run()
            .await;

        assert_eq!(outcome.state, TaskState::Completed);
        assert_eq!(outcome.processed, 2);
        let failures = failures.lock().unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, 3);
    }

    #[tokio::test]
    async fn test_cancellation_preserves_count_and_stops_calls() {
        let log = seeded(20).await;
        let token = CancellationToken::new();
        let mut bridge = ScriptedBridge::over(log);
        bridge.cancel_after = Some((3, token.clone()));
        let bridge = Arc::new(bridge);

        let outcome = BulkTask::new(bridge.clone(), "conv", ActionKind::Read)
            .with_page_size(4)
            .with_cancellation(token)
            .run()
            .await;

        assert_eq!(outcome.state, TaskState::Cancelled);
        assert_eq!(outcome.processed, 3);
        // The loop observed cancellation before starting a fourth call
        assert_eq!(bridge.action_calls(), 3);
    }

    #[tokio::test]
    async fn test_infrastructure_fault_is_terminal_failed() {
        let log = seeded(8).await;
        let mut bridge = ScriptedBridge::over(log);
        bridge.die_on = Some(5);
        let bridge = Arc::new(bridge);

        let outcome = BulkTask::new(bridge, "conv", ActionKind::Delete)
            .with_page_size(3)
            .run()
            .await;

        assert_eq!(outcome.state, TaskState::Failed);
        // Newest-first scan processes 8, 7, 6 before dying on 5
        assert_eq!(outcome.processed, 3);
    }

    #[tokio::test]
    async fn test_delete_skips_other_senders_scenario() {
        // Conversation with ids 1,2,3; id 2 was sent by the operator.
        let me = Uuid::from_u128(0x5e1f);
        let log = Arc::new(MemoryLog::new());
        log.insert(logged_chat_from("conv", 1, 101, Uuid::from_u128(7), "a"))
            .await;
        log.insert(logged_chat_from("conv", 2, 102, me, "b")).await;
        log.insert(logged_chat_from("conv", 3, 103, Uuid::from_u128(8), "c"))
            .await;

        let bridge = Arc::new(LogBridge::new(log.clone()));
        let outcome = BulkTask::new(bridge, "conv", ActionKind::Delete)
            .with_constraints(vec![
                Constraint::not_from_sender(me),
                Constraint::not_terminal(),
            ])
            .run()
            .await;

        assert_eq!(outcome.state, TaskState::Completed);
        assert_eq!(outcome.processed, 2);

        // Soft delete: all three records still exist; 1 and 3 are marked,
        // 2 is untouched.
        for (id, expected) in [
            (1, ContentType::Status),
            (2, ContentType::Chat),
            (3, ContentType::Status),
        ] {
            let record = log.get_message("conv", id).await.unwrap().expect("record exists");
            assert_eq!(record.content_type, expected, "record {id}");
        }
    }

    #[tokio::test]
    async fn test_progress_events_report_duality_and_counts() {
        let log = seeded(4).await;
        let bridge = Arc::new(ScriptedBridge::over(log));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let outcome = BulkTask::new(bridge, "conv", ActionKind::Save)
            .with_explicit_ids(vec![1, 2])
            .with_events(tx)
            .run()
            .await;
        assert_eq!(outcome.state, TaskState::Completed);

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert!(matches!(events.first(), Some(TaskEvent::Started { goal: Some(2) })));
        let processed: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                TaskEvent::Processed { processed, .. } => Some(*processed),
                _ => None,
            })
            .collect();
        assert_eq!(processed, vec![1, 2]);
        assert!(matches!(
            events.last(),
            Some(TaskEvent::Finished {
                state: TaskState::Completed,
                processed: 2
            })
        ));
    }

    #[tokio::test]
    async fn test_success_callback_may_mutate_caller_state() {
        let log = seeded(3).await;
        let bridge = Arc::new(ScriptedBridge::over(log));
        let marked = Arc::new(Mutex::new(Vec::new()));
        let sink = marked.clone();

        let outcome = BulkTask::new(bridge, "conv", ActionKind::Read)
            .on_success(move |m| sink.lock().unwrap().push(m.client_message_id))
            .run()
            .await;

        assert_eq!(outcome.state, TaskState::Completed);
        assert_eq!(*marked.lock().unwrap(), vec![3, 2, 1]);
    }

    #[tokio::test]
    async fn test_empty_allowlist_completes_without_calls() {
        let log = seeded(5).await;
        let bridge = Arc::new(ScriptedBridge::over(log));
        let outcome = BulkTask::new(bridge.clone(), "conv", ActionKind::Save)
            .with_explicit_ids(Vec::new())
            .run()
            .await;
        assert_eq!(outcome.state, TaskState::Completed);
        assert_eq!(outcome.processed, 0);
        assert_eq!(bridge.action_calls(), 0);
    }
}
