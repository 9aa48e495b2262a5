use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::types::{Attachment, Message, MessageId};

/// A user message waiting for connectivity or for a reply retry.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboxEntry {
    /// Id of the local entry shown in the message list.
    pub local_id: Uuid,
    pub text: String,
    pub attachments: Vec<Attachment>,
    pub reply_to: Option<MessageId>,
    /// Set once the user message itself is stored, so a replay only
    /// regenerates the reply.
    pub persisted: Option<Message>,
    pub queued_at: DateTime<Utc>,
}

impl OutboxEntry {
    pub fn new(
        local_id: Uuid,
        text: impl Into<String>,
        attachments: Vec<Attachment>,
        reply_to: Option<MessageId>,
    ) -> Self {
        Self {
            local_id,
            text: text.into(),
            attachments,
            reply_to,
            persisted: None,
            queued_at: Utc::now(),
        }
    }

    pub fn retry_of(message: Message) -> Self {
        Self {
            local_id: Uuid::new_v4(),
            text: message.content.clone(),
            attachments: message.attachments.clone(),
            reply_to: message.reply_to,
            persisted: Some(message),
            queued_at: Utc::now(),
        }
    }
}

/// FIFO queue of pending sends for one conversation.
#[derive(Debug, Default)]
pub struct Outbox {
    entries: VecDeque<OutboxEntry>,
}

impl Outbox {
    pub fn push(&mut self, entry: OutboxEntry) {
        self.entries.push_back(entry);
    }

    pub fn extend(&mut self, entries: impl IntoIterator<Item = OutboxEntry>) {
        self.entries.extend(entries);
    }

    /// Empty the queue, returning entries in the order they were queued.
    pub fn take_all(&mut self) -> VecDeque<OutboxEntry> {
        std::mem::take(&mut self.entries)
    }

    /// Drop reply retries for already stored messages. Returns how many went.
    pub fn drop_retries(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.persisted.is_none());
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OutboxEntry> {
        self.entries.iter()
    }
}

/// Reply failures counted against the current message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryState {
    failures: u32,
}

impl RetryState {
    /// Count a failure; true if another attempt is allowed under `max_attempts`.
    pub fn record_failure(&mut self, max_attempts: u32) -> bool {
        self.failures += 1;
        let retry = self.failures < max_attempts;
        if !retry {
            self.failures = 0;
        }
        retry
    }

    pub fn reset(&mut self) {
        self.failures = 0;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}
