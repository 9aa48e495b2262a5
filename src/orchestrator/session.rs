use uuid::Uuid;

use super::events::ConversationPhase;
use super::outbox::{Outbox, RetryState};
use crate::types::{
    Bot, ChatEntry, Conversation, LocalKind, LocalMessage, Message, MessageId, ThreadId,
};

/// Everything the orchestrator holds for one open conversation.
///
/// Only the orchestrator mutates a session, and only while holding its lock,
/// so at most one pipeline runs per conversation.
#[derive(Debug)]
pub struct Session {
    pub conversation: Conversation,
    pub bot: Bot,
    pub entries: Vec<ChatEntry>,
    pub outbox: Outbox,
    pub retry: RetryState,
    pub phase: ConversationPhase,
}

impl Session {
    pub fn new(conversation: Conversation, bot: Bot, messages: Vec<Message>) -> Self {
        Self {
            conversation,
            bot,
            entries: messages.into_iter().map(ChatEntry::Persisted).collect(),
            outbox: Outbox::default(),
            retry: RetryState::default(),
            phase: ConversationPhase::Idle,
        }
    }

    pub fn push_local(&mut self, message: LocalMessage) -> Uuid {
        let id = message.local_id;
        self.entries.push(ChatEntry::Local(message));
        id
    }

    /// Swap a local entry for its persisted form.
    ///
    /// Persisted entries stay in `created_at` order and every remaining local
    /// entry trails them, since locals are stored later if at all.
    pub fn replace_local(&mut self, local_id: Uuid, message: Message) {
        self.remove_local(local_id);
        let idx = self
            .entries
            .iter()
            .position(|e| match e {
                ChatEntry::Local(_) => true,
                ChatEntry::Persisted(m) => m.created_at > message.created_at,
            })
            .unwrap_or(self.entries.len());
        self.entries.insert(idx, ChatEntry::Persisted(message));
    }

    pub fn remove_local(&mut self, local_id: Uuid) {
        self.entries.retain(|e| e.local_id() != Some(local_id));
    }

    pub fn mark_local(&mut self, local_id: Uuid, kind: LocalKind) {
        for entry in &mut self.entries {
            if let ChatEntry::Local(local) = entry {
                if local.local_id == local_id {
                    local.kind = kind;
                }
            }
        }
    }

    pub fn drop_apologies(&mut self) {
        self.entries
            .retain(|e| e.local_kind() != Some(LocalKind::Apology));
    }

    pub fn remove_persisted(&mut self, id: MessageId) {
        self.entries
            .retain(|e| e.persisted().is_none_or(|m| m.id != id));
    }

    pub fn update_persisted(&mut self, message: Message) {
        for entry in &mut self.entries {
            if let ChatEntry::Persisted(existing) = entry {
                if existing.id == message.id {
                    *existing = message;
                    return;
                }
            }
        }
    }

    /// Replace every persisted entry with a fresh read, keeping local
    /// entries in timestamp order among them.
    pub fn reload(&mut self, messages: Vec<Message>) {
        let locals: Vec<ChatEntry> = self
            .entries
            .drain(..)
            .filter(|e| e.local_id().is_some())
            .collect();
        self.entries = messages.into_iter().map(ChatEntry::Persisted).collect();
        self.entries.extend(locals);
        self.entries.sort_by_key(|e| e.created_at());
    }

    pub fn persisted(&self) -> Vec<Message> {
        self.entries
            .iter()
            .filter_map(|e| e.persisted().cloned())
            .collect()
    }

    pub fn find_persisted(&self, id: MessageId) -> Option<&Message> {
        self.entries
            .iter()
            .filter_map(ChatEntry::persisted)
            .find(|m| m.id == id)
    }

    /// A reply joins its parent's thread, or starts one rooted at the parent.
    pub fn thread_for(&self, reply_to: Option<MessageId>) -> Option<ThreadId> {
        let parent = self.find_persisted(reply_to?)?;
        Some(parent.thread_id.unwrap_or(parent.id))
    }

    /// The last `k` persisted messages, oldest first.
    pub fn tail(&self, k: usize) -> Vec<Message> {
        let persisted = self.persisted();
        let skip = persisted.len().saturating_sub(k);
        persisted.into_iter().skip(skip).collect()
    }
}
