pub mod parse;
pub mod providers;

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::context::ContextStats;
use crate::error::CompletionError;
use crate::mood::MoodProfile;
use crate::prompt;
use crate::types::{Bot, BotMemory, FeedbackScore, Message, Sender};

use parse::MemoryExtraction;
use providers::{CompletionRequest, LlmProvider, Purpose, Turn};

/// Purpose-specific front end over a completion provider.
///
/// Every call is a single stateless request. JSON-shaped answers
/// (suggestions, memory extraction, mood) go through [`parse`] and never
/// fail on malformed output.
#[derive(Clone)]
pub struct CompletionClient {
    provider: Arc<dyn LlmProvider>,
    max_tokens: u32,
}

impl CompletionClient {
    pub fn new(provider: Arc<dyn LlmProvider>, max_tokens: u32) -> Self {
        Self {
            provider,
            max_tokens,
        }
    }

    async fn call(
        &self,
        purpose: Purpose,
        system: String,
        turns: Vec<Turn>,
        max_tokens: u32,
        temperature: Option<f32>,
    ) -> Result<String, CompletionError> {
        let request = CompletionRequest {
            purpose,
            system: Some(system),
            turns,
            max_tokens: max_tokens.min(self.max_tokens),
            temperature,
        };
        let started = Instant::now();
        let text = self.provider.complete(&request).await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(CompletionError::EmptyResponse);
        }
        debug!(
            purpose = ?purpose,
            elapsed_ms = started.elapsed().as_millis() as u64,
            chars = text.len(),
            "completion finished"
        );
        Ok(text.to_string())
    }

    /// Generate the bot's next reply from the context window.
    pub async fn reply(
        &self,
        bot: &Bot,
        window: &[Message],
        mood: Option<&MoodProfile>,
        memory: Option<&BotMemory>,
        stats: Option<&ContextStats>,
    ) -> Result<String, CompletionError> {
        let system = prompt::compose(bot, mood, memory, stats);
        let turns = window
            .iter()
            .filter(|m| !m.content.trim().is_empty())
            .map(|m| match m.sender {
                Sender::User => Turn::user(m.content.clone()),
                Sender::Bot => Turn::assistant(m.content.clone()),
            })
            .collect();
        info!(bot = %bot.name, window = window.len(), "requesting reply");
        self.call(Purpose::Reply, system, turns, self.max_tokens, Some(0.8))
            .await
    }

    pub async fn summarize(&self, bot: &Bot, messages: &[Message]) -> Result<String, CompletionError> {
        let system = format!(
            "You summarize chats between a user and {}, an AI companion. \
             Write two or three sentences covering the main topics, anything personal the user shared, \
             and how the conversation felt. Reply with the summary only.",
            bot.name
        );
        let turns = vec![Turn::user(transcript(bot, messages))];
        self.call(Purpose::Summary, system, turns, 300, Some(0.3))
            .await
    }

    /// Short replies the user could send next.
    pub async fn suggest(
        &self,
        bot: &Bot,
        window: &[Message],
        count: usize,
    ) -> Result<Vec<String>, CompletionError> {
        let system = format!(
            "You suggest what a user might say next to {}. \
             Reply with a JSON array of exactly {count} short strings (under 10 words each) and nothing else.",
            bot.name
        );
        let turns = vec![Turn::user(transcript(bot, window))];
        let raw = self
            .call(Purpose::Suggestions, system, turns, 200, Some(0.9))
            .await?;
        Ok(parse::parse_suggestions(&raw, count))
    }

    /// One-sentence lesson drawn from the user's rating of a bot reply.
    pub async fn feedback_note(
        &self,
        bot: &Bot,
        window: &[Message],
        score: FeedbackScore,
    ) -> Result<String, CompletionError> {
        let verdict = match score {
            FeedbackScore::Positive => "liked",
            FeedbackScore::Neutral => "felt neutral about",
            FeedbackScore::Negative => "disliked",
        };
        let system = format!(
            "You coach {}, an AI companion. The user {verdict} the bot's last reply in the chat below. \
             In one short sentence, state what the bot should keep doing or change in future replies. \
             Reply with the sentence only.",
            bot.name
        );
        let turns = vec![Turn::user(transcript(bot, window))];
        self.call(Purpose::FeedbackNote, system, turns, 120, Some(0.3))
            .await
    }

    /// Summary, preferences and dates worth remembering from the window.
    pub async fn extract_memory(
        &self,
        bot: &Bot,
        window: &[Message],
        existing: Option<&BotMemory>,
    ) -> Result<MemoryExtraction, CompletionError> {
        let previous = existing
            .map(|m| m.summary.trim())
            .filter(|s| !s.is_empty())
            .unwrap_or("none");
        let system = format!(
            "You maintain {}'s long-term memory of a user. Previous summary: {previous}\n\
             From the chat below, reply with a JSON object and nothing else:\n\
             {{\"summary\": string, \"preferences\": {{string: any}}, \"important_dates\": [string]}}\n\
             The summary replaces the previous one, so carry forward what still matters.",
            bot.name
        );
        let turns = vec![Turn::user(transcript(bot, window))];
        let raw = self
            .call(Purpose::MemoryExtraction, system, turns, 400, Some(0.2))
            .await?;
        Ok(parse::parse_memory_extraction(&raw))
    }

    /// Remote mood classification. `Ok(None)` means the answer was unusable.
    pub async fn classify_mood(&self, text: &str) -> Result<Option<MoodProfile>, CompletionError> {
        let system = "Classify the mood of the user's message. Reply with a JSON object and nothing else: \
             {\"mood\": one of happy|sad|angry|anxious|tired|confused|excited|calm|neutral, \
             \"confidence\": 0..1, \"sentiment\": -1..1, \
             \"emotions\": {\"joy\": 0..1, \"sadness\": 0..1, \"anger\": 0..1, \"fear\": 0..1, \"surprise\": 0..1, \"disgust\": 0..1}}"
            .to_string();
        let raw = self
            .call(
                Purpose::MoodClassification,
                system,
                vec![Turn::user(text)],
                200,
                Some(0.0),
            )
            .await?;
        Ok(parse::parse_mood(&raw))
    }
}

/// Plain-text rendering of a window for the auxiliary purposes.
fn transcript(bot: &Bot, messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| match m.sender {
            Sender::User => format!("User: {}", m.content),
            Sender::Bot => format!("{}: {}", bot.name, m.content),
        })
        .collect::<Vec<_>>()
        .join("\n")
}
