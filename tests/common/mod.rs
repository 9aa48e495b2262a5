#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use botchat::agent::CompletionClient;
use botchat::agent::providers::{CompletionRequest, LlmProvider, Purpose};
use botchat::config::OrchestratorConfig;
use botchat::error::CompletionError;
use botchat::orchestrator::Orchestrator;
use botchat::store::{ChatStore, InMemoryStore, LocalCache, MemoryCache};
use botchat::types::{Bot, ConversationId, NewBot};
use uuid::Uuid;

pub const DEFAULT_REPLY: &str = "Sure thing.";
pub const SUMMARY: &str = "You talked about pasta.";
pub const NOTE: &str = "Keep answers shorter.";

/// Completion provider that answers by purpose and records every request.
#[derive(Default)]
pub struct ScriptedProvider {
    requests: Mutex<Vec<CompletionRequest>>,
    replies: Mutex<VecDeque<String>>,
    memory_answer: Mutex<Option<String>>,
    fail_replies: AtomicBool,
    fail_everything: AtomicBool,
}

impl ScriptedProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn queue_reply(&self, text: &str) {
        self.replies.lock().expect("lock").push_back(text.to_string());
    }

    pub fn set_memory_answer(&self, raw: &str) {
        *self.memory_answer.lock().expect("lock") = Some(raw.to_string());
    }

    pub fn fail_replies(&self, fail: bool) {
        self.fail_replies.store(fail, Ordering::SeqCst);
    }

    pub fn fail_everything(&self, fail: bool) {
        self.fail_everything.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self, purpose: Purpose) -> usize {
        self.requests
            .lock()
            .expect("lock")
            .iter()
            .filter(|r| r.purpose == purpose)
            .count()
    }

    pub fn last(&self, purpose: Purpose) -> Option<CompletionRequest> {
        self.requests
            .lock()
            .expect("lock")
            .iter()
            .rev()
            .find(|r| r.purpose == purpose)
            .cloned()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        self.requests.lock().expect("lock").push(request.clone());

        let unavailable = || CompletionError::Status {
            status: 503,
            body: "overloaded".into(),
        };
        if self.fail_everything.load(Ordering::SeqCst) {
            return Err(unavailable());
        }

        match request.purpose {
            Purpose::Reply => {
                if self.fail_replies.load(Ordering::SeqCst) {
                    return Err(unavailable());
                }
                Ok(self
                    .replies
                    .lock()
                    .expect("lock")
                    .pop_front()
                    .unwrap_or_else(|| DEFAULT_REPLY.to_string()))
            }
            Purpose::Summary => Ok(SUMMARY.into()),
            Purpose::Suggestions => {
                Ok(r#"Here you go: ["Tell me more", "Why is that?", "Thanks!", "Bye"]"#.into())
            }
            Purpose::FeedbackNote => Ok(NOTE.into()),
            Purpose::MemoryExtraction => Ok(self
                .memory_answer
                .lock()
                .expect("lock")
                .clone()
                .unwrap_or_else(|| {
                    r#"{"summary": "User likes pasta.", "preferences": {"food": "pasta"}, "important_dates": []}"#
                        .into()
                })),
            Purpose::MoodClassification => {
                Ok(r#"{"mood": "calm", "confidence": 0.9, "sentiment": 0.2}"#.into())
            }
        }
    }
}

pub struct Harness {
    pub orchestrator: Orchestrator,
    pub store: Arc<InMemoryStore>,
    pub cache: Arc<MemoryCache>,
    pub provider: Arc<ScriptedProvider>,
    pub user: Uuid,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(OrchestratorConfig::default()).await
    }

    pub async fn with_config(config: OrchestratorConfig) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let cache = Arc::new(MemoryCache::new());
        let provider = ScriptedProvider::new();
        let user = Uuid::new_v4();
        let completion = CompletionClient::new(provider.clone() as Arc<dyn LlmProvider>, 512);
        let orchestrator = Orchestrator::new(
            user,
            store.clone() as Arc<dyn ChatStore>,
            cache.clone() as Arc<dyn LocalCache>,
            completion,
            config,
        );
        Self {
            orchestrator,
            store,
            cache,
            provider,
            user,
        }
    }

    /// A fresh bot and its conversation.
    pub async fn conversation(&self, name: &str) -> (Bot, ConversationId) {
        let bot = self
            .orchestrator
            .create_bot(NewBot::new(name))
            .await
            .expect("create bot");
        let conversation = self
            .orchestrator
            .create_conversation(bot.id)
            .await
            .expect("create conversation");
        (bot, conversation)
    }
}
