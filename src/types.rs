use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::mood::Mood;

pub type UserId = Uuid;
pub type BotId = Uuid;
pub type ConversationId = Uuid;
pub type MessageId = Uuid;
pub type ThreadId = Uuid;

/// A personality trait on the 0-100 scale. Out-of-range values are
/// rejected when deserialized rather than clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct TraitLevel(u8);

impl TraitLevel {
    pub const NEUTRAL: TraitLevel = TraitLevel(50);

    pub fn new(value: i64) -> Result<Self, ValidationError> {
        match u8::try_from(value) {
            Ok(v) if v <= 100 => Ok(Self(v)),
            _ => Err(ValidationError::TraitOutOfRange(value)),
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Normalized strength in [-1, 1]; 50 maps to 0.
    pub fn factor(self) -> f32 {
        (f32::from(self.0) - 50.0) / 50.0
    }
}

impl TryFrom<i64> for TraitLevel {
    type Error = ValidationError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TraitLevel> for i64 {
    fn from(level: TraitLevel) -> Self {
        i64::from(level.0)
    }
}

impl Default for TraitLevel {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Personality {
    pub humor: TraitLevel,
    pub empathy: TraitLevel,
    pub creativity: TraitLevel,
    pub formality: TraitLevel,
}

impl Personality {
    pub fn new(
        humor: i64,
        empathy: i64,
        creativity: i64,
        formality: i64,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            humor: TraitLevel::new(humor)?,
            empathy: TraitLevel::new(empathy)?,
            creativity: TraitLevel::new(creativity)?,
            formality: TraitLevel::new(formality)?,
        })
    }
}

/// A user-configured AI persona.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bot {
    pub id: BotId,
    pub user_id: UserId,
    pub name: String,
    pub role: String,
    pub tone: String,
    pub emoji: String,
    pub color: String,
    #[serde(default)]
    pub description: Option<String>,
    /// When set, replaces the composed system prompt verbatim.
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub background_story: Option<String>,
    #[serde(default)]
    pub personality: Option<Personality>,
    #[serde(default)]
    pub voice: Option<String>,
    #[serde(default)]
    pub avatar_style: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied when creating a bot; ids and timestamps are assigned by the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewBot {
    pub name: String,
    pub role: String,
    pub tone: String,
    pub emoji: String,
    pub color: String,
    pub description: Option<String>,
    pub system_prompt: Option<String>,
    pub background_story: Option<String>,
    pub personality: Option<Personality>,
    pub voice: Option<String>,
    pub avatar_style: Option<String>,
}

impl NewBot {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: "friendly companion".into(),
            tone: "warm".into(),
            emoji: "🤖".into(),
            color: "#6366f1".into(),
            ..Default::default()
        }
    }
}

/// The unique chat session between one user and one bot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub user_id: UserId,
    pub bot_id: BotId,
    pub title: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub last_mood: Option<Mood>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial update applied to a conversation row. `updated_at` is always bumped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationPatch {
    pub last_mood: Option<Mood>,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

/// Thumbs-down, neutral or thumbs-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum FeedbackScore {
    Negative,
    Neutral,
    Positive,
}

impl FeedbackScore {
    pub fn value(self) -> i8 {
        match self {
            FeedbackScore::Negative => -1,
            FeedbackScore::Neutral => 0,
            FeedbackScore::Positive => 1,
        }
    }
}

impl TryFrom<i64> for FeedbackScore {
    type Error = ValidationError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(FeedbackScore::Negative),
            0 => Ok(FeedbackScore::Neutral),
            1 => Ok(FeedbackScore::Positive),
            other => Err(ValidationError::FeedbackOutOfRange(other)),
        }
    }
}

impl From<FeedbackScore> for i64 {
    fn from(score: FeedbackScore) -> Self {
        i64::from(score.value())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    Document,
    Location,
    Voice,
}

/// Written with its message and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub kind: AttachmentKind,
    pub url: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl Attachment {
    pub fn new(kind: AttachmentKind, url: impl Into<String>) -> Self {
        Self {
            kind,
            url: url.into(),
            metadata: serde_json::Value::Null,
        }
    }
}

/// A persisted chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender: Sender,
    pub content: String,
    #[serde(default)]
    pub formatted_content: Option<String>,
    #[serde(default)]
    pub reply_to: Option<MessageId>,
    #[serde(default)]
    pub thread_id: Option<ThreadId>,
    #[serde(default)]
    pub feedback_score: Option<FeedbackScore>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// Aggregated by emoji on read; never written back.
    #[serde(default)]
    pub reactions: Vec<ReactionCount>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn is_bot(&self) -> bool {
        self.sender == Sender::Bot
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMessage {
    pub conversation_id: ConversationId,
    pub sender: Sender,
    pub content: String,
    pub formatted_content: Option<String>,
    pub reply_to: Option<MessageId>,
    pub thread_id: Option<ThreadId>,
    pub attachments: Vec<Attachment>,
}

impl NewMessage {
    pub fn text(conversation_id: ConversationId, sender: Sender, content: impl Into<String>) -> Self {
        Self {
            conversation_id,
            sender,
            content: content.into(),
            formatted_content: None,
            reply_to: None,
            thread_id: None,
            attachments: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageReaction {
    pub id: Uuid,
    pub message_id: MessageId,
    pub user_id: UserId,
    pub emoji: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionCount {
    pub emoji: String,
    pub count: u32,
    pub reacted_by_me: bool,
}

/// Long-lived knowledge about one user, held per bot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotMemory {
    pub bot_id: BotId,
    pub user_id: UserId,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub preferences: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub important_dates: Vec<String>,
    #[serde(default)]
    pub learned_responses: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

impl BotMemory {
    pub fn empty(bot_id: BotId, user_id: UserId) -> Self {
        Self {
            bot_id,
            user_id,
            summary: String::new(),
            preferences: BTreeMap::new(),
            important_dates: Vec::new(),
            learned_responses: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.summary.trim().is_empty()
            && self.preferences.is_empty()
            && self.important_dates.is_empty()
            && self.learned_responses.is_empty()
    }
}

/// Why a message exists only locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalKind {
    /// Written optimistically, persistence in flight.
    Sending,
    /// Composed offline and waiting in the outbox.
    Queued,
    /// Empty bot placeholder shown while a reply is generated.
    Typing,
    /// Shown after a reply could not be produced.
    Apology,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalMessage {
    pub local_id: Uuid,
    pub conversation_id: ConversationId,
    pub sender: Sender,
    pub content: String,
    pub kind: LocalKind,
    pub reply_to: Option<MessageId>,
    pub attachments: Vec<Attachment>,
    pub created_at: DateTime<Utc>,
}

impl LocalMessage {
    pub fn new(
        conversation_id: ConversationId,
        sender: Sender,
        content: impl Into<String>,
        kind: LocalKind,
    ) -> Self {
        Self {
            local_id: Uuid::new_v4(),
            conversation_id,
            sender,
            content: content.into(),
            kind,
            reply_to: None,
            attachments: Vec::new(),
            created_at: Utc::now(),
        }
    }
}

/// An entry in a conversation's in-memory message list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ChatEntry {
    Local(LocalMessage),
    Persisted(Message),
}

impl ChatEntry {
    pub fn sender(&self) -> Sender {
        match self {
            ChatEntry::Local(m) => m.sender,
            ChatEntry::Persisted(m) => m.sender,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            ChatEntry::Local(m) => &m.content,
            ChatEntry::Persisted(m) => &m.content,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            ChatEntry::Local(m) => m.created_at,
            ChatEntry::Persisted(m) => m.created_at,
        }
    }

    pub fn local_id(&self) -> Option<Uuid> {
        match self {
            ChatEntry::Local(m) => Some(m.local_id),
            ChatEntry::Persisted(_) => None,
        }
    }

    pub fn local_kind(&self) -> Option<LocalKind> {
        match self {
            ChatEntry::Local(m) => Some(m.kind),
            ChatEntry::Persisted(_) => None,
        }
    }

    pub fn persisted(&self) -> Option<&Message> {
        match self {
            ChatEntry::Persisted(m) => Some(m),
            ChatEntry::Local(_) => None,
        }
    }
}
