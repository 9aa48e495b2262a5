//! The conversation orchestrator.
//!
//! Owns per-conversation sessions and runs the send, regenerate, feedback,
//! reaction, search and summary pipelines against the persistence and
//! completion services. Changes are published on a broadcast channel so a UI
//! can observe state instead of sharing it.

pub mod events;
pub mod outbox;
pub mod session;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::agent::CompletionClient;
use crate::config::OrchestratorConfig;
use crate::context;
use crate::error::{ChatError, ChatResult, StoreError, StoreResult};
use crate::memory::MemoryStore;
use crate::mood::{self, MoodProfile};
use crate::personality;
use crate::store::cache::{self, LocalCache, keys};
use crate::store::{ChatStore, MessageQuery};
use crate::types::{
    Attachment, Bot, BotId, BotMemory, ChatEntry, Conversation, ConversationId,
    ConversationPatch, FeedbackScore, LocalKind, LocalMessage, Message, MessageId, NewBot,
    NewMessage, Sender, ThreadId, UserId,
};

use events::{ChatEvent, ConversationPhase, EventKind};
use outbox::OutboxEntry;
use session::Session;

pub const APOLOGY: &str =
    "Sorry, I'm having trouble responding right now. Please try again in a moment.";

const EVENT_CAPACITY: usize = 256;

/// Result of `send_message`.
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// Both the user message and the bot reply are stored.
    Delivered { user: Message, reply: Message },
    /// Held in the outbox until connectivity returns.
    Queued { local_id: Uuid },
    /// The user message is stored but no reply could be produced.
    ReplyFailed {
        user: Message,
        retry_scheduled: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum RegenerateOutcome {
    Regenerated {
        replaced: Option<MessageId>,
        reply: Message,
    },
    /// The conversation has no messages yet.
    NothingToRegenerate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionChange {
    Added,
    Removed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackOutcome {
    pub message: Message,
    /// The note appended to the bot's learned responses, if any.
    pub learned: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub delivered: usize,
    pub requeued: usize,
    pub failed: usize,
}

pub struct Orchestrator {
    user: UserId,
    store: Arc<dyn ChatStore>,
    cache: Arc<dyn LocalCache>,
    completion: CompletionClient,
    memory: MemoryStore,
    config: OrchestratorConfig,
    online: AtomicBool,
    sessions: Mutex<HashMap<ConversationId, Arc<Mutex<Session>>>>,
    events: broadcast::Sender<ChatEvent>,
}

impl Orchestrator {
    pub fn new(
        user: UserId,
        store: Arc<dyn ChatStore>,
        cache: Arc<dyn LocalCache>,
        completion: CompletionClient,
        config: OrchestratorConfig,
    ) -> Self {
        let memory = MemoryStore::new(
            Arc::clone(&store),
            Arc::clone(&cache),
            config.max_learned_responses,
        );
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            user,
            store,
            cache,
            completion,
            memory,
            config,
            online: AtomicBool::new(true),
            sessions: Mutex::new(HashMap::new()),
            events,
        }
    }

    pub fn user(&self) -> UserId {
        self.user
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.events.subscribe()
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    // ===== events & cache plumbing =====

    fn emit(&self, conversation: Option<ConversationId>, kind: EventKind) {
        // No subscribers is fine.
        let _ = self.events.send(ChatEvent {
            conversation_id: conversation,
            kind,
        });
    }

    fn set_phase(&self, session: &mut Session, phase: ConversationPhase) {
        session.phase = phase;
        self.emit(Some(session.conversation.id), EventKind::Phase(phase));
    }

    fn changed(&self, session: &Session) {
        self.emit(Some(session.conversation.id), EventKind::MessagesChanged);
    }

    fn outbox_changed(&self, session: &Session) {
        self.emit(
            Some(session.conversation.id),
            EventKind::OutboxChanged(session.outbox.len()),
        );
    }

    fn mirror_messages(&self, session: &Session) {
        cache::save(
            self.cache.as_ref(),
            &keys::messages(session.conversation.id),
            &session.persisted(),
        );
    }

    /// Upsert one record into a cached list.
    fn remember<T>(&self, key: &str, item: &T, same: impl Fn(&T, &T) -> bool)
    where
        T: Serialize + DeserializeOwned + Clone,
    {
        let mut items: Vec<T> = cache::load(self.cache.as_ref(), key).unwrap_or_default();
        match items.iter_mut().find(|existing| same(existing, item)) {
            Some(slot) => *slot = item.clone(),
            None => items.push(item.clone()),
        }
        cache::save(self.cache.as_ref(), key, &items);
    }

    fn remember_conversation(&self, conversation: &Conversation) {
        self.remember(&keys::conversations(self.user), conversation, |a, b| {
            a.id == b.id
        });
    }

    fn ensure_online(&self) -> ChatResult<()> {
        if self.is_online() {
            Ok(())
        } else {
            Err(StoreError::Unreachable("device is offline".into()).into())
        }
    }

    /// Remote read with the local mirror as fallback.
    ///
    /// Offline, the mirror is used without trying the network and a missing
    /// mirror reads as empty. Online, an unreachable service falls back to the
    /// mirror and only errors if there is none.
    async fn read_through<T, F>(&self, key: &str, fetch: F) -> ChatResult<T>
    where
        T: Serialize + DeserializeOwned + Default,
        F: Future<Output = StoreResult<T>>,
    {
        if !self.is_online() {
            return Ok(cache::load(self.cache.as_ref(), key).unwrap_or_default());
        }
        match fetch.await {
            Ok(value) => {
                cache::save(self.cache.as_ref(), key, &value);
                Ok(value)
            }
            Err(e) if e.is_transient() => {
                warn!(key, "read failed, serving cached copy (non-fatal): {e}");
                cache::load(self.cache.as_ref(), key).ok_or_else(|| e.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Remote lookup of a single record with a cached list as fallback.
    async fn lookup<T, F>(
        &self,
        key: &str,
        fetch: F,
        matches: impl Fn(&T) -> bool,
        missing: ChatError,
    ) -> ChatResult<T>
    where
        T: DeserializeOwned,
        F: Future<Output = StoreResult<T>>,
    {
        let cached = || {
            cache::load::<Vec<T>>(self.cache.as_ref(), key)
                .and_then(|items| items.into_iter().find(|item| matches(item)))
        };
        if !self.is_online() {
            return cached().ok_or(missing);
        }
        match fetch.await {
            Ok(value) => Ok(value),
            Err(e) if e.is_transient() => cached().ok_or_else(|| e.into()),
            Err(e) => Err(e.into()),
        }
    }

    // ===== sessions =====

    async fn session(&self, id: ConversationId) -> ChatResult<Arc<Mutex<Session>>> {
        if let Some(existing) = self.sessions.lock().await.get(&id) {
            return Ok(Arc::clone(existing));
        }

        let user = self.user;
        let conversation = self
            .lookup(
                &keys::conversations(user),
                self.store.get_conversation(user, id),
                |c: &Conversation| c.id == id,
                ChatError::UnknownConversation(id),
            )
            .await?;
        let bot_id = conversation.bot_id;
        let bot = self
            .lookup(
                &keys::bots(user),
                self.store.get_bot(user, bot_id),
                |b: &Bot| b.id == bot_id,
                ChatError::UnknownConversation(id),
            )
            .await?;
        let messages: Vec<Message> = match self
            .read_through(
                &keys::messages(id),
                self.store.list_messages(user, id, MessageQuery::all()),
            )
            .await
        {
            Ok(messages) => messages,
            // Never mirrored yet: start empty rather than refuse to open.
            Err(e) if e.is_transient() => Vec::new(),
            Err(e) => return Err(e),
        };

        debug!(conversation_id = %id, messages = messages.len(), "session loaded");
        let mut sessions = self.sessions.lock().await;
        let entry = sessions
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(Session::new(conversation, bot, messages))));
        Ok(Arc::clone(entry))
    }

    async fn loaded_sessions(&self) -> Vec<(ConversationId, Arc<Mutex<Session>>)> {
        self.sessions
            .lock()
            .await
            .iter()
            .map(|(id, s)| (*id, Arc::clone(s)))
            .collect()
    }

    /// Snapshot of a conversation's message list, loading it if needed.
    pub async fn messages(&self, conversation: ConversationId) -> ChatResult<Vec<ChatEntry>> {
        let session = self.session(conversation).await?;
        let s = session.lock().await;
        Ok(s.entries.clone())
    }

    pub async fn phase(&self, conversation: ConversationId) -> ChatResult<ConversationPhase> {
        let session = self.session(conversation).await?;
        let s = session.lock().await;
        Ok(s.phase)
    }

    pub async fn outbox_len(&self, conversation: ConversationId) -> ChatResult<usize> {
        let session = self.session(conversation).await?;
        let s = session.lock().await;
        Ok(s.outbox.len())
    }

    /// Load (or reload) a conversation's full history into its session.
    pub async fn open_conversation(
        &self,
        conversation: ConversationId,
    ) -> ChatResult<Vec<ChatEntry>> {
        let session = self.session(conversation).await?;
        let mut s = session.lock().await;
        let messages: Vec<Message> = self
            .read_through(
                &keys::messages(conversation),
                self.store
                    .list_messages(self.user, conversation, MessageQuery::all()),
            )
            .await?;
        s.reload(messages);
        self.changed(&s);
        Ok(s.entries.clone())
    }

    // ===== bots & conversations =====

    pub async fn list_bots(&self) -> ChatResult<Vec<Bot>> {
        self.read_through(&keys::bots(self.user), self.store.list_bots(self.user))
            .await
    }

    pub async fn create_bot(&self, bot: NewBot) -> ChatResult<Bot> {
        self.ensure_online()?;
        if bot.name.trim().is_empty() {
            return Err(ChatError::Invalid("a bot needs a name".into()));
        }
        let created = self.store.insert_bot(self.user, bot).await?;
        self.remember(&keys::bots(self.user), &created, |a, b| a.id == b.id);
        info!(bot = %created.id, name = %created.name, "bot created");
        Ok(created)
    }

    pub async fn update_bot(&self, bot: Bot) -> ChatResult<Bot> {
        self.ensure_online()?;
        let updated = self.store.update_bot(self.user, bot).await?;
        self.remember(&keys::bots(self.user), &updated, |a, b| a.id == b.id);
        for (_, session) in self.loaded_sessions().await {
            let mut s = session.lock().await;
            if s.bot.id == updated.id {
                s.bot = updated.clone();
            }
        }
        Ok(updated)
    }

    pub async fn delete_bot(&self, bot: BotId) -> ChatResult<()> {
        self.ensure_online()?;
        self.store.delete_bot(self.user, bot).await?;

        let mut doomed = Vec::new();
        for (id, session) in self.loaded_sessions().await {
            if session.lock().await.bot.id == bot {
                doomed.push(id);
            }
        }
        {
            let mut sessions = self.sessions.lock().await;
            for id in &doomed {
                sessions.remove(id);
                cache::forget(self.cache.as_ref(), &keys::messages(*id));
            }
        }

        let bots_key = keys::bots(self.user);
        let bots: Vec<Bot> = cache::load(self.cache.as_ref(), &bots_key).unwrap_or_default();
        let bots: Vec<Bot> = bots.into_iter().filter(|b| b.id != bot).collect();
        cache::save(self.cache.as_ref(), &bots_key, &bots);

        let conversations_key = keys::conversations(self.user);
        let conversations: Vec<Conversation> =
            cache::load(self.cache.as_ref(), &conversations_key).unwrap_or_default();
        let conversations: Vec<Conversation> =
            conversations.into_iter().filter(|c| c.bot_id != bot).collect();
        cache::save(self.cache.as_ref(), &conversations_key, &conversations);
        cache::forget(self.cache.as_ref(), &keys::memory(bot, self.user));

        info!(%bot, "bot deleted");
        Ok(())
    }

    /// Conversations, most recently active first.
    pub async fn list_conversations(&self) -> ChatResult<Vec<Conversation>> {
        let mut conversations: Vec<Conversation> = self
            .read_through(
                &keys::conversations(self.user),
                self.store.list_conversations(self.user),
            )
            .await?;
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(conversations)
    }

    /// The conversation with `bot`, created on first request.
    pub async fn create_conversation(&self, bot: BotId) -> ChatResult<ConversationId> {
        self.ensure_online()?;
        if let Some(existing) = self.store.find_conversation(self.user, bot).await? {
            return Ok(existing.id);
        }

        let profile = self.store.get_bot(self.user, bot).await?;
        match self
            .store
            .insert_conversation(self.user, bot, profile.name.clone())
            .await
        {
            Ok(conversation) => {
                info!(conversation_id = %conversation.id, %bot, "conversation created");
                self.remember_conversation(&conversation);
                Ok(conversation.id)
            }
            // Lost a race with another device; the row exists now.
            Err(StoreError::Invalid(_)) => self
                .store
                .find_conversation(self.user, bot)
                .await?
                .map(|c| c.id)
                .ok_or_else(|| StoreError::NotFound(format!("conversation for bot {bot}")).into()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn bot_memory(&self, bot: BotId) -> Option<BotMemory> {
        self.memory.load(self.user, bot).await
    }

    // ===== send pipeline =====

    /// Send a user message and produce the bot's reply.
    pub async fn send_message(
        &self,
        conversation: ConversationId,
        text: &str,
        attachments: Vec<Attachment>,
        reply_to: Option<MessageId>,
    ) -> ChatResult<SendOutcome> {
        let text = text.trim();
        if text.is_empty() && attachments.is_empty() {
            return Err(ChatError::Invalid("message is empty".into()));
        }

        let session = self.session(conversation).await?;
        let mut s = session.lock().await;

        if let Some(parent) = reply_to {
            if s.find_persisted(parent).is_none() {
                return Err(ChatError::Invalid(format!(
                    "message {parent} is not part of this conversation"
                )));
            }
        }

        let mut local = LocalMessage::new(conversation, Sender::User, text, LocalKind::Sending);
        local.reply_to = reply_to;
        local.attachments = attachments.clone();
        let local_id = s.push_local(local);
        self.changed(&s);

        let entry = OutboxEntry::new(local_id, text, attachments, reply_to);
        if !self.is_online() {
            s.mark_local(local_id, LocalKind::Queued);
            s.outbox.push(entry);
            self.outbox_changed(&s);
            info!(conversation_id = %conversation, queued = s.outbox.len(), "offline, message queued");
            return Ok(SendOutcome::Queued { local_id });
        }

        self.deliver(&mut s, entry).await
    }

    /// Persist the user message (unless already stored) and generate a reply.
    async fn deliver(&self, s: &mut Session, entry: OutboxEntry) -> ChatResult<SendOutcome> {
        let conversation = s.conversation.id;
        self.set_phase(s, ConversationPhase::Sending);

        let user_message = match entry.persisted.clone() {
            Some(message) => message,
            None => {
                let new = NewMessage {
                    conversation_id: conversation,
                    sender: Sender::User,
                    content: entry.text.clone(),
                    formatted_content: None,
                    reply_to: entry.reply_to,
                    thread_id: s.thread_for(entry.reply_to),
                    attachments: entry.attachments.clone(),
                };
                match self.store.insert_message(self.user, new).await {
                    Ok(message) => {
                        s.replace_local(entry.local_id, message.clone());
                        self.changed(s);
                        message
                    }
                    Err(e) if e.is_transient() => {
                        warn!(conversation_id = %conversation, "persisting message failed, queued for retry: {e}");
                        let local_id = entry.local_id;
                        s.mark_local(local_id, LocalKind::Queued);
                        s.outbox.push(entry);
                        self.outbox_changed(s);
                        self.changed(s);
                        self.emit(
                            Some(conversation),
                            EventKind::Notice(
                                "Connection lost. Your message will be sent when it returns."
                                    .into(),
                            ),
                        );
                        self.set_phase(s, ConversationPhase::Idle);
                        return Ok(SendOutcome::Queued { local_id });
                    }
                    Err(e) => {
                        s.remove_local(entry.local_id);
                        self.changed(s);
                        self.set_phase(s, ConversationPhase::Errored);
                        self.emit(Some(conversation), EventKind::Error(e.to_string()));
                        self.set_phase(s, ConversationPhase::Idle);
                        return Err(e.into());
                    }
                }
            }
        };

        match self.generate_reply(s, Some(&user_message.content)).await {
            Ok(reply) => {
                s.retry.reset();
                // Older retries are superseded by this exchange.
                let dropped = s.outbox.drop_retries();
                if dropped > 0 {
                    debug!(conversation_id = %conversation, dropped, "stale reply retries dropped");
                    self.outbox_changed(s);
                }
                Ok(SendOutcome::Delivered {
                    user: user_message,
                    reply,
                })
            }
            Err(e) => {
                let retry_scheduled = s
                    .retry
                    .record_failure(self.config.max_completion_attempts);
                if retry_scheduled {
                    s.outbox.push(OutboxEntry::retry_of(user_message.clone()));
                    self.outbox_changed(s);
                }
                warn!(
                    conversation_id = %conversation,
                    retry_scheduled,
                    "reply failed: {e}"
                );
                Ok(SendOutcome::ReplyFailed {
                    user: user_message,
                    retry_scheduled,
                })
            }
        }
    }

    /// The last K messages, oldest first. Falls back to the session's copy.
    async fn context_window(&self, s: &Session) -> Vec<Message> {
        let k = self.config.context_window;
        match self
            .store
            .list_messages(self.user, s.conversation.id, MessageQuery::latest(k))
            .await
        {
            Ok(mut window) => {
                window.reverse();
                window
            }
            Err(e) => {
                warn!(conversation_id = %s.conversation.id, "context fetch failed, using local history (non-fatal): {e}");
                s.tail(k)
            }
        }
    }

    async fn detect_mood(&self, text: &str) -> MoodProfile {
        if self.config.remote_mood {
            match self.completion.classify_mood(text).await {
                Ok(Some(profile)) => return profile,
                Ok(None) => debug!("remote mood unusable, using local detector"),
                Err(e) => warn!("remote mood classification failed (non-fatal): {e}"),
            }
        }
        mood::detect(text)
    }

    /// Context, mood and memory, then completion, modulation and
    /// persistence of the reply. On failure the typing placeholder becomes
    /// an apology.
    async fn generate_reply(&self, s: &mut Session, mood_text: Option<&str>) -> ChatResult<Message> {
        let conversation = s.conversation.id;
        let bot = s.bot.clone();

        let window = self.context_window(s).await;
        let mood_text = mood_text.map(str::to_string).or_else(|| {
            window
                .iter()
                .rev()
                .find(|m| m.sender == Sender::User)
                .map(|m| m.content.clone())
        });
        let mood = match &mood_text {
            Some(text) => Some(self.detect_mood(text).await),
            None => None,
        };
        let memory = self.memory.load(self.user, bot.id).await;
        let stats = context::analyze(&window);

        s.drop_apologies();
        let placeholder = s.push_local(LocalMessage::new(
            conversation,
            Sender::Bot,
            "",
            LocalKind::Typing,
        ));
        self.changed(s);
        self.set_phase(s, ConversationPhase::AwaitingCompletion);

        let produced = async {
            let raw = self
                .completion
                .reply(&bot, &window, mood.as_ref(), memory.as_ref(), Some(&stats))
                .await?;
            let content = match &bot.personality {
                Some(traits) => personality::modulate(&raw, traits, mood.map(|m| m.mood)),
                None => raw,
            };
            let reply = self
                .store
                .insert_message(
                    self.user,
                    NewMessage::text(conversation, Sender::Bot, content),
                )
                .await?;
            Ok::<_, ChatError>(reply)
        }
        .await;

        let reply = match produced {
            Ok(reply) => reply,
            Err(e) => {
                s.remove_local(placeholder);
                s.push_local(LocalMessage::new(
                    conversation,
                    Sender::Bot,
                    APOLOGY,
                    LocalKind::Apology,
                ));
                self.changed(s);
                self.set_phase(s, ConversationPhase::Errored);
                self.emit(Some(conversation), EventKind::Error(e.to_string()));
                self.set_phase(s, ConversationPhase::Idle);
                return Err(e);
            }
        };

        s.replace_local(placeholder, reply.clone());
        self.changed(s);

        let patch = ConversationPatch {
            last_mood: mood.map(|m| m.mood),
            summary: None,
        };
        match self
            .store
            .update_conversation(self.user, conversation, patch)
            .await
        {
            Ok(updated) => {
                self.remember_conversation(&updated);
                s.conversation = updated;
            }
            Err(e) => warn!(conversation_id = %conversation, "conversation touch failed (non-fatal): {e}"),
        }
        self.mirror_messages(s);
        self.set_phase(s, ConversationPhase::Reconciled);
        self.set_phase(s, ConversationPhase::Idle);
        info!(conversation_id = %conversation, reply = %reply.id, "reply stored");

        if window.len() >= self.config.memory_refresh_threshold {
            let mut recent = window;
            recent.push(reply.clone());
            self.memory
                .refresh(&self.completion, &bot, self.user, &recent)
                .await;
        }

        Ok(reply)
    }

    /// Replace the latest bot reply with a fresh one.
    pub async fn regenerate_response(
        &self,
        conversation: ConversationId,
    ) -> ChatResult<RegenerateOutcome> {
        self.ensure_online()?;
        let session = self.session(conversation).await?;
        let mut s = session.lock().await;

        let newest_first = self
            .store
            .list_messages(self.user, conversation, MessageQuery::newest_first())
            .await?;
        let Some(newest) = newest_first.first() else {
            self.emit(
                Some(conversation),
                EventKind::Notice("There is nothing to regenerate yet.".into()),
            );
            return Ok(RegenerateOutcome::NothingToRegenerate);
        };

        let replaced = if newest.is_bot() {
            self.store.delete_message(self.user, newest.id).await?;
            s.remove_persisted(newest.id);
            self.changed(&s);
            Some(newest.id)
        } else {
            None
        };

        let reply = self.generate_reply(&mut s, None).await?;
        Ok(RegenerateOutcome::Regenerated { replaced, reply })
    }

    /// Delete every message in the conversation.
    pub async fn clear_chat(&self, conversation: ConversationId) -> ChatResult<usize> {
        self.ensure_online()?;
        let session = self.session(conversation).await?;
        let mut s = session.lock().await;

        let removed = self.store.clear_messages(self.user, conversation).await?;
        s.entries.clear();
        s.outbox.clear();
        s.retry.reset();
        self.mirror_messages(&s);
        self.changed(&s);
        self.outbox_changed(&s);
        info!(conversation_id = %conversation, removed, "chat cleared");
        Ok(removed)
    }

    // ===== reactions & feedback =====

    async fn refetch(&self, s: &mut Session) -> ChatResult<()> {
        let messages = self
            .store
            .list_messages(self.user, s.conversation.id, MessageQuery::all())
            .await?;
        s.reload(messages);
        self.mirror_messages(s);
        self.changed(s);
        Ok(())
    }

    async fn target(&self, message: MessageId) -> ChatResult<Message> {
        match self.store.get_message(self.user, message).await {
            Ok(found) => Ok(found),
            Err(StoreError::NotFound(_)) => Err(ChatError::UnknownMessage(message)),
            Err(e) => Err(e.into()),
        }
    }

    /// Toggle `emoji` on a message for the current user.
    pub async fn add_message_reaction(
        &self,
        message: MessageId,
        emoji: &str,
    ) -> ChatResult<ReactionChange> {
        self.ensure_online()?;
        let emoji = emoji.trim();
        if emoji.is_empty() {
            return Err(ChatError::Invalid("reaction emoji is empty".into()));
        }
        let target = self.target(message).await?;
        let session = self.session(target.conversation_id).await?;
        let mut s = session.lock().await;

        let change = match self.store.find_reaction(self.user, message, emoji).await? {
            Some(existing) => {
                self.store.delete_reaction(self.user, existing.id).await?;
                ReactionChange::Removed
            }
            None => {
                self.store.insert_reaction(self.user, message, emoji).await?;
                ReactionChange::Added
            }
        };
        self.refetch(&mut s).await?;
        debug!(%message, emoji, ?change, "reaction toggled");
        Ok(change)
    }

    /// Remove the user's `emoji` from a message. Returns whether one existed.
    pub async fn remove_message_reaction(
        &self,
        message: MessageId,
        emoji: &str,
    ) -> ChatResult<bool> {
        self.ensure_online()?;
        let target = self.target(message).await?;
        let session = self.session(target.conversation_id).await?;
        let mut s = session.lock().await;

        let removed = match self
            .store
            .find_reaction(self.user, message, emoji.trim())
            .await?
        {
            Some(existing) => {
                self.store.delete_reaction(self.user, existing.id).await?;
                true
            }
            None => false,
        };
        self.refetch(&mut s).await?;
        Ok(removed)
    }

    /// Store a rating and turn it into a learned-response note.
    pub async fn submit_feedback(
        &self,
        message: MessageId,
        score: FeedbackScore,
    ) -> ChatResult<FeedbackOutcome> {
        self.ensure_online()?;
        let target = self.target(message).await?;
        let conversation = target.conversation_id;
        let session = self.session(conversation).await?;
        let mut s = session.lock().await;

        let updated = self.store.set_feedback(self.user, message, score).await?;
        s.update_persisted(updated.clone());
        self.mirror_messages(&s);
        self.changed(&s);

        let mut window = self
            .store
            .list_messages(
                self.user,
                conversation,
                MessageQuery::latest(self.config.context_window).until(target.created_at),
            )
            .await?;
        window.reverse();

        let bot = s.bot.clone();
        let note = match self.completion.feedback_note(&bot, &window, score).await {
            Ok(note) => note,
            Err(e) => {
                warn!(%message, "feedback note generation failed (non-fatal): {e}");
                return Ok(FeedbackOutcome {
                    message: updated,
                    learned: None,
                });
            }
        };

        let learned = match self
            .memory
            .append_learned(self.user, bot.id, note.clone())
            .await
        {
            Ok(_) => Some(note),
            Err(e) => {
                warn!(%message, "saving learned response failed: {e}");
                self.emit(Some(conversation), EventKind::Error(e.to_string()));
                None
            }
        };
        info!(%message, score = score.value(), learned = learned.is_some(), "feedback recorded");
        Ok(FeedbackOutcome {
            message: updated,
            learned,
        })
    }

    // ===== derived reads =====

    /// Suggested next messages for the user.
    pub async fn generate_suggestions(&self, conversation: ConversationId) -> ChatResult<Vec<String>> {
        let session = self.session(conversation).await?;
        let s = session.lock().await;
        let window = self.context_window(&s).await;
        let suggestions = self
            .completion
            .suggest(&s.bot, &window, self.config.suggestion_count)
            .await?;
        Ok(suggestions)
    }

    /// Summarize the conversation and cache the result on its row.
    pub async fn generate_conversation_summary(
        &self,
        conversation: ConversationId,
    ) -> ChatResult<Option<String>> {
        let session = self.session(conversation).await?;
        let mut s = session.lock().await;

        let mut messages = match self
            .store
            .list_messages(
                self.user,
                conversation,
                MessageQuery::latest(self.config.summary_window),
            )
            .await
        {
            Ok(mut messages) => {
                messages.reverse();
                messages
            }
            Err(e) if e.is_transient() => s.tail(self.config.summary_window),
            Err(e) => return Err(e.into()),
        };
        messages.retain(|m| !m.content.trim().is_empty());
        if messages.is_empty() {
            self.emit(
                Some(conversation),
                EventKind::Notice("There is nothing to summarize yet.".into()),
            );
            return Ok(None);
        }

        let summary = self.completion.summarize(&s.bot, &messages).await?;
        let patch = ConversationPatch {
            last_mood: None,
            summary: Some(summary.clone()),
        };
        match self
            .store
            .update_conversation(self.user, conversation, patch)
            .await
        {
            Ok(updated) => {
                self.remember_conversation(&updated);
                s.conversation = updated;
            }
            Err(e) => warn!(conversation_id = %conversation, "caching summary failed (non-fatal): {e}"),
        }
        Ok(Some(summary))
    }

    /// Case-insensitive content search, oldest first.
    pub async fn search_messages(
        &self,
        conversation: ConversationId,
        query: &str,
    ) -> ChatResult<Vec<Message>> {
        let session = self.session(conversation).await?;
        let needle = query.trim().to_lowercase();
        let local = |s: &Session| -> Vec<Message> {
            if needle.is_empty() {
                return Vec::new();
            }
            s.persisted()
                .into_iter()
                .filter(|m| m.content.to_lowercase().contains(&needle))
                .collect()
        };
        if !self.is_online() {
            return Ok(local(&*session.lock().await));
        }
        match self
            .store
            .search_messages(self.user, conversation, query)
            .await
        {
            Ok(found) => Ok(found),
            Err(e) if e.is_transient() => Ok(local(&*session.lock().await)),
            Err(e) => Err(e.into()),
        }
    }

    /// The thread rooted at `thread`, root first.
    pub async fn thread_messages(
        &self,
        conversation: ConversationId,
        thread: ThreadId,
    ) -> ChatResult<Vec<Message>> {
        let session = self.session(conversation).await?;
        let local = |s: &Session| -> Vec<Message> {
            s.persisted()
                .into_iter()
                .filter(|m| m.thread_id == Some(thread) || m.id == thread)
                .collect()
        };
        if !self.is_online() {
            return Ok(local(&*session.lock().await));
        }
        match self
            .store
            .list_messages(
                self.user,
                conversation,
                MessageQuery::all().in_thread(thread),
            )
            .await
        {
            Ok(found) => Ok(found),
            Err(e) if e.is_transient() => Ok(local(&*session.lock().await)),
            Err(e) => Err(e.into()),
        }
    }

    // ===== connectivity =====

    /// Record a connectivity change. Coming back online drains every outbox.
    pub async fn set_online(&self, online: bool) -> Vec<(ConversationId, SyncReport)> {
        let was_online = self.online.swap(online, Ordering::SeqCst);
        if was_online == online {
            return Vec::new();
        }
        info!(online, "connectivity changed");
        self.emit(None, EventKind::Connectivity(online));
        if !online {
            return Vec::new();
        }

        let mut pending = Vec::new();
        for (id, session) in self.loaded_sessions().await {
            let s = session.lock().await;
            if !s.outbox.is_empty() {
                pending.push((s.outbox.iter().map(|e| e.queued_at).min(), id));
            }
        }
        // Oldest queued message first across conversations.
        pending.sort();

        let mut reports = Vec::new();
        for (_, id) in pending {
            match self.sync_pending_messages(id).await {
                Ok(report) => reports.push((id, report)),
                Err(e) => warn!(conversation_id = %id, "outbox sync failed: {e}"),
            }
        }
        reports
    }

    /// Replay a conversation's outbox in order.
    pub async fn sync_pending_messages(&self, conversation: ConversationId) -> ChatResult<SyncReport> {
        self.ensure_online()?;
        let session = self.session(conversation).await?;
        let mut s = session.lock().await;

        let mut pending = s.outbox.take_all();
        self.outbox_changed(&s);
        let mut report = SyncReport::default();
        info!(conversation_id = %conversation, pending = pending.len(), "draining outbox");

        while let Some(entry) = pending.pop_front() {
            if !self.is_online() {
                s.outbox.push(entry);
                s.outbox.extend(pending.drain(..));
                break;
            }
            s.mark_local(entry.local_id, LocalKind::Sending);
            match self.deliver(&mut s, entry).await {
                Ok(SendOutcome::Delivered { .. }) => report.delivered += 1,
                Ok(SendOutcome::Queued { .. }) => {
                    // Still unreachable: keep the rest behind it.
                    report.requeued += 1 + pending.len();
                    s.outbox.extend(pending.drain(..));
                    break;
                }
                Ok(SendOutcome::ReplyFailed {
                    retry_scheduled, ..
                }) => {
                    if retry_scheduled {
                        report.requeued += 1;
                    } else {
                        report.failed += 1;
                    }
                }
                Err(e) => {
                    warn!(conversation_id = %conversation, "dropping undeliverable message: {e}");
                    report.failed += 1;
                }
            }
        }

        self.outbox_changed(&s);
        Ok(report)
    }
}
