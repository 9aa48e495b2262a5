//! Persistence contract consumed by the orchestrator.
//!
//! Every call carries the authenticated user. Rows owned by someone else are
//! invisible: the store answers `NotFound`, exactly as row-level security on
//! a hosted backend would.

pub mod cache;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreResult;
use crate::types::{
    Bot, BotId, BotMemory, Conversation, ConversationId, ConversationPatch, FeedbackScore,
    Message, MessageId, MessageReaction, NewBot, NewMessage, ThreadId, UserId,
};

pub use cache::{FileCache, LocalCache, MemoryCache};
pub use memory::InMemoryStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Order {
    #[default]
    Oldest,
    Newest,
}

/// Filter, ordering and limit for message reads. Ordering is by `created_at`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageQuery {
    pub order: Order,
    pub limit: Option<usize>,
    pub thread_id: Option<ThreadId>,
    /// Only messages created at or before this instant.
    pub until: Option<DateTime<Utc>>,
}

impl MessageQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn newest_first() -> Self {
        Self {
            order: Order::Newest,
            ..Self::default()
        }
    }

    /// The `n` most recent messages, newest first.
    pub fn latest(n: usize) -> Self {
        Self {
            order: Order::Newest,
            limit: Some(n),
            ..Self::default()
        }
    }

    pub fn until(mut self, at: DateTime<Utc>) -> Self {
        self.until = Some(at);
        self
    }

    /// Messages in the thread rooted at `thread_id`, root included.
    pub fn in_thread(mut self, thread_id: ThreadId) -> Self {
        self.thread_id = Some(thread_id);
        self
    }
}

#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn list_bots(&self, user: UserId) -> StoreResult<Vec<Bot>>;
    async fn get_bot(&self, user: UserId, bot: BotId) -> StoreResult<Bot>;
    async fn insert_bot(&self, user: UserId, bot: NewBot) -> StoreResult<Bot>;
    async fn update_bot(&self, user: UserId, bot: Bot) -> StoreResult<Bot>;
    /// Removes the bot and everything hanging off it.
    async fn delete_bot(&self, user: UserId, bot: BotId) -> StoreResult<()>;

    async fn find_conversation(&self, user: UserId, bot: BotId)
    -> StoreResult<Option<Conversation>>;
    async fn get_conversation(&self, user: UserId, id: ConversationId)
    -> StoreResult<Conversation>;
    /// Fails with `Invalid` if (user, bot) already has a conversation.
    async fn insert_conversation(
        &self,
        user: UserId,
        bot: BotId,
        title: String,
    ) -> StoreResult<Conversation>;
    /// Most recently updated first.
    async fn list_conversations(&self, user: UserId) -> StoreResult<Vec<Conversation>>;
    async fn update_conversation(
        &self,
        user: UserId,
        id: ConversationId,
        patch: ConversationPatch,
    ) -> StoreResult<Conversation>;

    /// Persists the message with its attachments in one write.
    async fn insert_message(&self, user: UserId, message: NewMessage) -> StoreResult<Message>;
    async fn get_message(&self, user: UserId, id: MessageId) -> StoreResult<Message>;
    async fn list_messages(
        &self,
        user: UserId,
        conversation: ConversationId,
        query: MessageQuery,
    ) -> StoreResult<Vec<Message>>;
    async fn delete_message(&self, user: UserId, id: MessageId) -> StoreResult<()>;
    /// Returns how many messages were removed.
    async fn clear_messages(&self, user: UserId, conversation: ConversationId)
    -> StoreResult<usize>;
    async fn set_feedback(
        &self,
        user: UserId,
        id: MessageId,
        score: FeedbackScore,
    ) -> StoreResult<Message>;
    /// Case-insensitive substring match on content, oldest first.
    async fn search_messages(
        &self,
        user: UserId,
        conversation: ConversationId,
        query: &str,
    ) -> StoreResult<Vec<Message>>;

    async fn find_reaction(
        &self,
        user: UserId,
        message: MessageId,
        emoji: &str,
    ) -> StoreResult<Option<MessageReaction>>;
    /// Fails with `Invalid` on a duplicate (message, user, emoji).
    async fn insert_reaction(
        &self,
        user: UserId,
        message: MessageId,
        emoji: &str,
    ) -> StoreResult<MessageReaction>;
    async fn delete_reaction(&self, user: UserId, reaction: Uuid) -> StoreResult<()>;

    async fn get_memory(&self, user: UserId, bot: BotId) -> StoreResult<Option<BotMemory>>;
    /// Inserts or replaces the (bot, user) row.
    async fn upsert_memory(&self, user: UserId, memory: BotMemory) -> StoreResult<BotMemory>;
}
