pub mod extract;

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::agent::CompletionClient;
use crate::agent::parse::MemoryExtraction;
use crate::error::StoreResult;
use crate::store::cache::{self, LocalCache, keys};
use crate::store::ChatStore;
use crate::types::{Bot, BotId, BotMemory, Message, UserId};

/// Per-(bot, user) memory on top of the persistence service.
///
/// Memory is a soft cache: reads never fail (they fall back to the local
/// mirror, then to nothing), while writes report persistence errors so the
/// caller can decide whether they matter.
pub struct MemoryStore {
    store: Arc<dyn ChatStore>,
    cache: Arc<dyn LocalCache>,
    max_learned: usize,
}

impl MemoryStore {
    pub fn new(store: Arc<dyn ChatStore>, cache: Arc<dyn LocalCache>, max_learned: usize) -> Self {
        Self {
            store,
            cache,
            max_learned,
        }
    }

    pub async fn load(&self, user: UserId, bot: BotId) -> Option<BotMemory> {
        let key = keys::memory(bot, user);
        match self.store.get_memory(user, bot).await {
            Ok(Some(memory)) => {
                cache::save(self.cache.as_ref(), &key, &memory);
                Some(memory)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(%bot, "memory load failed, using cached copy (non-fatal): {e}");
                cache::load(self.cache.as_ref(), &key)
            }
        }
    }

    async fn current(&self, user: UserId, bot: BotId) -> StoreResult<BotMemory> {
        Ok(self
            .store
            .get_memory(user, bot)
            .await?
            .unwrap_or_else(|| BotMemory::empty(bot, user)))
    }

    async fn save(&self, memory: BotMemory) -> StoreResult<BotMemory> {
        let saved = self.store.upsert_memory(memory.user_id, memory).await?;
        cache::save(
            self.cache.as_ref(),
            &keys::memory(saved.bot_id, saved.user_id),
            &saved,
        );
        Ok(saved)
    }

    /// Fold an extraction into the stored record: the summary is replaced,
    /// preferences are overwritten key by key, dates are unioned.
    pub async fn merge(
        &self,
        user: UserId,
        bot: BotId,
        extraction: MemoryExtraction,
    ) -> StoreResult<BotMemory> {
        let mut memory = self.current(user, bot).await?;
        if let Some(summary) = extraction.summary.filter(|s| !s.trim().is_empty()) {
            memory.summary = summary;
        }
        memory.preferences.extend(extraction.preferences);
        for date in extraction.important_dates {
            if !memory.important_dates.contains(&date) {
                memory.important_dates.push(date);
            }
        }
        memory.updated_at = Utc::now();
        self.save(memory).await
    }

    /// Append one feedback-derived note, dropping the oldest past the cap.
    pub async fn append_learned(
        &self,
        user: UserId,
        bot: BotId,
        note: String,
    ) -> StoreResult<BotMemory> {
        let mut memory = self.current(user, bot).await?;
        memory.learned_responses.push(note);
        let overflow = memory
            .learned_responses
            .len()
            .saturating_sub(self.max_learned.max(1));
        memory.learned_responses.drain(..overflow);
        memory.updated_at = Utc::now();
        self.save(memory).await
    }

    /// Re-derive memory from a context window.
    ///
    /// Falls back to local pattern extraction when the completion service
    /// fails or returns nothing usable. Returns `None` when there was nothing
    /// to store or the write failed; failures are logged, not propagated.
    pub async fn refresh(
        &self,
        client: &CompletionClient,
        bot: &Bot,
        user: UserId,
        window: &[Message],
    ) -> Option<BotMemory> {
        let existing = self.load(user, bot.id).await;
        let extraction = match client.extract_memory(bot, window, existing.as_ref()).await {
            Ok(extraction) if !extraction.is_empty() => extraction,
            Ok(_) => {
                debug!(bot = %bot.id, "memory extraction empty, using pattern fallback");
                extract::extract_from_messages(window)
            }
            Err(e) => {
                warn!(bot = %bot.id, "memory extraction failed, using pattern fallback (non-fatal): {e}");
                extract::extract_from_messages(window)
            }
        };

        if extraction.is_empty() {
            return None;
        }

        match self.merge(user, bot.id, extraction).await {
            Ok(memory) => {
                info!(
                    bot = %bot.id,
                    preferences = memory.preferences.len(),
                    dates = memory.important_dates.len(),
                    "memory refreshed"
                );
                Some(memory)
            }
            Err(e) => {
                warn!(bot = %bot.id, "memory refresh failed (non-fatal): {e}");
                None
            }
        }
    }
}
