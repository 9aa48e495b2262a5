use serde::Serialize;

use crate::types::ConversationId;

/// Per-conversation pipeline state.
///
/// `Idle -> Sending -> AwaitingCompletion -> (Reconciled | Errored) -> Idle`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationPhase {
    #[default]
    Idle,
    Sending,
    AwaitingCompletion,
    Reconciled,
    Errored,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EventKind {
    Phase(ConversationPhase),
    /// The in-memory message list changed; re-read it with `messages()`.
    MessagesChanged,
    OutboxChanged(usize),
    /// Informational, not a failure.
    Notice(String),
    Error(String),
    Connectivity(bool),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatEvent {
    /// `None` for events that are not tied to one conversation.
    pub conversation_id: Option<ConversationId>,
    pub kind: EventKind,
}
