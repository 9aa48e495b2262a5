use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{ChatStore, MessageQuery, Order};
use crate::error::{StoreError, StoreResult};
use crate::types::{
    Bot, BotId, BotMemory, Conversation, ConversationId, ConversationPatch, FeedbackScore,
    Message, MessageId, MessageReaction, NewBot, NewMessage, ReactionCount, UserId,
};

/// In-process persistence backend.
///
/// Enforces the same ownership and uniqueness rules as the hosted service
/// and can be switched unreachable to exercise offline paths. Successful
/// writes are counted.
pub struct InMemoryStore {
    state: RwLock<State>,
    reachable: AtomicBool,
    writes: AtomicUsize,
}

#[derive(Default)]
struct State {
    bots: HashMap<BotId, Bot>,
    conversations: HashMap<ConversationId, Conversation>,
    /// Insertion order; `created_at` is strictly increasing.
    messages: Vec<Message>,
    reactions: Vec<MessageReaction>,
    memories: HashMap<(BotId, UserId), BotMemory>,
    last_timestamp: Option<DateTime<Utc>>,
}

impl State {
    /// `Utc::now()`, nudged forward so no two rows share a timestamp.
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let ts = match self.last_timestamp {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_timestamp = Some(ts);
        ts
    }

    fn owned_conversation(&self, user: UserId, id: ConversationId) -> StoreResult<&Conversation> {
        self.conversations
            .get(&id)
            .filter(|c| c.user_id == user)
            .ok_or_else(|| StoreError::NotFound(format!("conversation {id}")))
    }

    fn owned_message_index(&self, user: UserId, id: MessageId) -> StoreResult<usize> {
        let idx = self
            .messages
            .iter()
            .position(|m| m.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("message {id}")))?;
        self.owned_conversation(user, self.messages[idx].conversation_id)
            .map_err(|_| StoreError::NotFound(format!("message {id}")))?;
        Ok(idx)
    }

    fn with_reactions(&self, user: UserId, message: &Message) -> Message {
        let mut counts: Vec<ReactionCount> = Vec::new();
        for reaction in self.reactions.iter().filter(|r| r.message_id == message.id) {
            match counts.iter_mut().find(|c| c.emoji == reaction.emoji) {
                Some(count) => {
                    count.count += 1;
                    count.reacted_by_me |= reaction.user_id == user;
                }
                None => counts.push(ReactionCount {
                    emoji: reaction.emoji.clone(),
                    count: 1,
                    reacted_by_me: reaction.user_id == user,
                }),
            }
        }
        counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.emoji.cmp(&b.emoji)));

        let mut message = message.clone();
        message.reactions = counts;
        message
    }

    fn remove_messages_where(&mut self, keep: impl Fn(&Message) -> bool) -> usize {
        let before = self.messages.len();
        self.messages.retain(|m| keep(m));
        let live: std::collections::HashSet<MessageId> =
            self.messages.iter().map(|m| m.id).collect();
        self.reactions.retain(|r| live.contains(&r.message_id));
        before - self.messages.len()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
            reachable: AtomicBool::new(true),
            writes: AtomicUsize::new(0),
        }
    }

    /// Simulate losing or regaining the network.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, AtomicOrdering::SeqCst);
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(AtomicOrdering::SeqCst)
    }

    /// Total persisted messages across all users.
    pub async fn message_count(&self) -> usize {
        self.state.read().await.messages.len()
    }

    fn check(&self) -> StoreResult<()> {
        if self.reachable.load(AtomicOrdering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unreachable("in-memory store is offline".into()))
        }
    }

    fn wrote(&self) {
        self.writes.fetch_add(1, AtomicOrdering::SeqCst);
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatStore for InMemoryStore {
    async fn list_bots(&self, user: UserId) -> StoreResult<Vec<Bot>> {
        self.check()?;
        let state = self.state.read().await;
        let mut bots: Vec<Bot> = state
            .bots
            .values()
            .filter(|b| b.user_id == user)
            .cloned()
            .collect();
        bots.sort_by_key(|b| b.created_at);
        Ok(bots)
    }

    async fn get_bot(&self, user: UserId, bot: BotId) -> StoreResult<Bot> {
        self.check()?;
        let state = self.state.read().await;
        state
            .bots
            .get(&bot)
            .filter(|b| b.user_id == user)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("bot {bot}")))
    }

    async fn insert_bot(&self, user: UserId, new: NewBot) -> StoreResult<Bot> {
        self.check()?;
        if new.name.trim().is_empty() {
            return Err(StoreError::Invalid("bot name cannot be empty".into()));
        }
        let mut state = self.state.write().await;
        let now = state.next_timestamp();
        let bot = Bot {
            id: Uuid::new_v4(),
            user_id: user,
            name: new.name,
            role: new.role,
            tone: new.tone,
            emoji: new.emoji,
            color: new.color,
            description: new.description,
            system_prompt: new.system_prompt,
            background_story: new.background_story,
            personality: new.personality,
            voice: new.voice,
            avatar_style: new.avatar_style,
            created_at: now,
            updated_at: now,
        };
        state.bots.insert(bot.id, bot.clone());
        self.wrote();
        Ok(bot)
    }

    async fn update_bot(&self, user: UserId, mut bot: Bot) -> StoreResult<Bot> {
        self.check()?;
        let mut state = self.state.write().await;
        let now = state.next_timestamp();
        let existing = state
            .bots
            .get_mut(&bot.id)
            .filter(|b| b.user_id == user)
            .ok_or_else(|| StoreError::NotFound(format!("bot {}", bot.id)))?;
        bot.user_id = existing.user_id;
        bot.created_at = existing.created_at;
        bot.updated_at = now;
        *existing = bot.clone();
        self.wrote();
        Ok(bot)
    }

    async fn delete_bot(&self, user: UserId, bot: BotId) -> StoreResult<()> {
        self.check()?;
        let mut state = self.state.write().await;
        if !state.bots.get(&bot).is_some_and(|b| b.user_id == user) {
            return Err(StoreError::NotFound(format!("bot {bot}")));
        }
        state.bots.remove(&bot);
        let doomed: Vec<ConversationId> = state
            .conversations
            .values()
            .filter(|c| c.bot_id == bot)
            .map(|c| c.id)
            .collect();
        state.conversations.retain(|_, c| c.bot_id != bot);
        state.remove_messages_where(|m| !doomed.contains(&m.conversation_id));
        state.memories.retain(|(b, _), _| *b != bot);
        self.wrote();
        Ok(())
    }

    async fn find_conversation(
        &self,
        user: UserId,
        bot: BotId,
    ) -> StoreResult<Option<Conversation>> {
        self.check()?;
        let state = self.state.read().await;
        Ok(state
            .conversations
            .values()
            .find(|c| c.user_id == user && c.bot_id == bot)
            .cloned())
    }

    async fn get_conversation(
        &self,
        user: UserId,
        id: ConversationId,
    ) -> StoreResult<Conversation> {
        self.check()?;
        let state = self.state.read().await;
        state.owned_conversation(user, id).cloned()
    }

    async fn insert_conversation(
        &self,
        user: UserId,
        bot: BotId,
        title: String,
    ) -> StoreResult<Conversation> {
        self.check()?;
        let mut state = self.state.write().await;
        if !state.bots.get(&bot).is_some_and(|b| b.user_id == user) {
            return Err(StoreError::NotFound(format!("bot {bot}")));
        }
        if state
            .conversations
            .values()
            .any(|c| c.user_id == user && c.bot_id == bot)
        {
            return Err(StoreError::Invalid(format!(
                "conversation for bot {bot} already exists"
            )));
        }
        let now = state.next_timestamp();
        let conversation = Conversation {
            id: Uuid::new_v4(),
            user_id: user,
            bot_id: bot,
            title,
            summary: None,
            last_mood: None,
            created_at: now,
            updated_at: now,
        };
        state
            .conversations
            .insert(conversation.id, conversation.clone());
        self.wrote();
        Ok(conversation)
    }

    async fn list_conversations(&self, user: UserId) -> StoreResult<Vec<Conversation>> {
        self.check()?;
        let state = self.state.read().await;
        let mut conversations: Vec<Conversation> = state
            .conversations
            .values()
            .filter(|c| c.user_id == user)
            .cloned()
            .collect();
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(conversations)
    }

    async fn update_conversation(
        &self,
        user: UserId,
        id: ConversationId,
        patch: ConversationPatch,
    ) -> StoreResult<Conversation> {
        self.check()?;
        let mut state = self.state.write().await;
        state.owned_conversation(user, id)?;
        let now = state.next_timestamp();
        let conversation = state
            .conversations
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("conversation {id}")))?;
        if let Some(mood) = patch.last_mood {
            conversation.last_mood = Some(mood);
        }
        if let Some(summary) = patch.summary {
            conversation.summary = Some(summary);
        }
        conversation.updated_at = now;
        let updated = conversation.clone();
        self.wrote();
        Ok(updated)
    }

    async fn insert_message(&self, user: UserId, new: NewMessage) -> StoreResult<Message> {
        self.check()?;
        let mut state = self.state.write().await;
        state.owned_conversation(user, new.conversation_id)?;
        if let Some(parent) = new.reply_to {
            let same_conversation = state
                .messages
                .iter()
                .any(|m| m.id == parent && m.conversation_id == new.conversation_id);
            if !same_conversation {
                return Err(StoreError::Invalid(format!(
                    "reply target {parent} is not in conversation {}",
                    new.conversation_id
                )));
            }
        }
        let created_at = state.next_timestamp();
        let message = Message {
            id: Uuid::new_v4(),
            conversation_id: new.conversation_id,
            sender: new.sender,
            content: new.content,
            formatted_content: new.formatted_content,
            reply_to: new.reply_to,
            thread_id: new.thread_id,
            feedback_score: None,
            attachments: new.attachments,
            reactions: Vec::new(),
            created_at,
        };
        state.messages.push(message.clone());
        self.wrote();
        Ok(message)
    }

    async fn get_message(&self, user: UserId, id: MessageId) -> StoreResult<Message> {
        self.check()?;
        let state = self.state.read().await;
        let idx = state.owned_message_index(user, id)?;
        Ok(state.with_reactions(user, &state.messages[idx]))
    }

    async fn list_messages(
        &self,
        user: UserId,
        conversation: ConversationId,
        query: MessageQuery,
    ) -> StoreResult<Vec<Message>> {
        self.check()?;
        let state = self.state.read().await;
        state.owned_conversation(user, conversation)?;

        let mut messages: Vec<&Message> = state
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation)
            .filter(|m| {
                query
                    .thread_id
                    .is_none_or(|t| m.thread_id == Some(t) || m.id == t)
            })
            .filter(|m| query.until.is_none_or(|until| m.created_at <= until))
            .collect();
        messages.sort_by_key(|m| m.created_at);
        if query.order == Order::Newest {
            messages.reverse();
        }
        if let Some(limit) = query.limit {
            messages.truncate(limit);
        }
        Ok(messages
            .into_iter()
            .map(|m| state.with_reactions(user, m))
            .collect())
    }

    async fn delete_message(&self, user: UserId, id: MessageId) -> StoreResult<()> {
        self.check()?;
        let mut state = self.state.write().await;
        state.owned_message_index(user, id)?;
        state.remove_messages_where(|m| m.id != id);
        self.wrote();
        Ok(())
    }

    async fn clear_messages(
        &self,
        user: UserId,
        conversation: ConversationId,
    ) -> StoreResult<usize> {
        self.check()?;
        let mut state = self.state.write().await;
        state.owned_conversation(user, conversation)?;
        let removed = state.remove_messages_where(|m| m.conversation_id != conversation);
        self.wrote();
        Ok(removed)
    }

    async fn set_feedback(
        &self,
        user: UserId,
        id: MessageId,
        score: FeedbackScore,
    ) -> StoreResult<Message> {
        self.check()?;
        let mut state = self.state.write().await;
        let idx = state.owned_message_index(user, id)?;
        state.messages[idx].feedback_score = Some(score);
        self.wrote();
        Ok(state.with_reactions(user, &state.messages[idx]))
    }

    async fn search_messages(
        &self,
        user: UserId,
        conversation: ConversationId,
        query: &str,
    ) -> StoreResult<Vec<Message>> {
        self.check()?;
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        let state = self.state.read().await;
        state.owned_conversation(user, conversation)?;
        Ok(state
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation)
            .filter(|m| m.content.to_lowercase().contains(&needle))
            .map(|m| state.with_reactions(user, m))
            .collect())
    }

    async fn find_reaction(
        &self,
        user: UserId,
        message: MessageId,
        emoji: &str,
    ) -> StoreResult<Option<MessageReaction>> {
        self.check()?;
        let state = self.state.read().await;
        state.owned_message_index(user, message)?;
        Ok(state
            .reactions
            .iter()
            .find(|r| r.message_id == message && r.user_id == user && r.emoji == emoji)
            .cloned())
    }

    async fn insert_reaction(
        &self,
        user: UserId,
        message: MessageId,
        emoji: &str,
    ) -> StoreResult<MessageReaction> {
        self.check()?;
        let mut state = self.state.write().await;
        state.owned_message_index(user, message)?;
        if state
            .reactions
            .iter()
            .any(|r| r.message_id == message && r.user_id == user && r.emoji == emoji)
        {
            return Err(StoreError::Invalid(format!(
                "reaction {emoji} already exists on message {message}"
            )));
        }
        let created_at = state.next_timestamp();
        let reaction = MessageReaction {
            id: Uuid::new_v4(),
            message_id: message,
            user_id: user,
            emoji: emoji.to_string(),
            created_at,
        };
        state.reactions.push(reaction.clone());
        self.wrote();
        Ok(reaction)
    }

    async fn delete_reaction(&self, user: UserId, reaction: Uuid) -> StoreResult<()> {
        self.check()?;
        let mut state = self.state.write().await;
        let before = state.reactions.len();
        state
            .reactions
            .retain(|r| !(r.id == reaction && r.user_id == user));
        if state.reactions.len() == before {
            return Err(StoreError::NotFound(format!("reaction {reaction}")));
        }
        self.wrote();
        Ok(())
    }

    async fn get_memory(&self, user: UserId, bot: BotId) -> StoreResult<Option<BotMemory>> {
        self.check()?;
        let state = self.state.read().await;
        Ok(state.memories.get(&(bot, user)).cloned())
    }

    async fn upsert_memory(&self, user: UserId, mut memory: BotMemory) -> StoreResult<BotMemory> {
        self.check()?;
        if memory.user_id != user {
            return Err(StoreError::Unauthorized(format!(
                "memory for user {} cannot be written by {user}",
                memory.user_id
            )));
        }
        let mut state = self.state.write().await;
        if !state.bots.get(&memory.bot_id).is_some_and(|b| b.user_id == user) {
            return Err(StoreError::NotFound(format!("bot {}", memory.bot_id)));
        }
        memory.updated_at = state.next_timestamp();
        state
            .memories
            .insert((memory.bot_id, user), memory.clone());
        self.wrote();
        Ok(memory)
    }
}
