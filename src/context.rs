use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::{ChatEntry, Message, Sender};

/// Words scanned for in user messages, in tie-break order.
pub const COMMON_WORDS: &[&str] = &[
    "what",
    "how",
    "why",
    "when",
    "where",
    "who",
    "help",
    "need",
    "want",
    "think",
    "feel",
    "know",
    "understand",
];

pub const DEFAULT_TOPIC: &str = "general conversation";

/// Lightweight statistics over a message window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextStats {
    pub topic: String,
    pub duration_minutes: i64,
    pub message_count: usize,
    pub user_message_count: usize,
    /// Matched common words, most frequent first.
    pub topic_keywords: Vec<String>,
}

/// Anything the analyzer can read a sender, text and timestamp from.
pub trait ContextItem {
    fn sender(&self) -> Sender;
    fn text(&self) -> &str;
    fn timestamp(&self) -> DateTime<Utc>;
}

impl ContextItem for Message {
    fn sender(&self) -> Sender {
        self.sender
    }
    fn text(&self) -> &str {
        &self.content
    }
    fn timestamp(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl ContextItem for ChatEntry {
    fn sender(&self) -> Sender {
        ChatEntry::sender(self)
    }
    fn text(&self) -> &str {
        self.content()
    }
    fn timestamp(&self) -> DateTime<Utc> {
        self.created_at()
    }
}

/// Analyze a window in any order; items are sorted by timestamp first.
pub fn analyze<T: ContextItem>(messages: &[T]) -> ContextStats {
    let mut ordered: Vec<&T> = messages.iter().collect();
    ordered.sort_by_key(|m| m.timestamp());

    let duration_minutes = match (ordered.first(), ordered.last()) {
        (Some(first), Some(last)) => (last.timestamp() - first.timestamp()).num_minutes(),
        _ => 0,
    };

    let user_texts: Vec<&str> = ordered
        .iter()
        .filter(|m| m.sender() == Sender::User)
        .map(|m| m.text())
        .collect();

    let mut counts = vec![0usize; COMMON_WORDS.len()];
    for text in &user_texts {
        let lowered = text.to_lowercase();
        for word in lowered.split(|c: char| !c.is_alphanumeric()) {
            if let Some(idx) = COMMON_WORDS.iter().position(|w| *w == word) {
                counts[idx] += 1;
            }
        }
    }

    let mut ranked: Vec<(usize, usize)> = counts
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, count)| *count > 0)
        .collect();
    // Stable sort keeps declaration order among equal counts.
    ranked.sort_by(|a, b| b.1.cmp(&a.1));

    let topic_keywords: Vec<String> = ranked
        .iter()
        .map(|(idx, _)| COMMON_WORDS[*idx].to_string())
        .collect();

    ContextStats {
        topic: topic_keywords
            .first()
            .cloned()
            .unwrap_or_else(|| DEFAULT_TOPIC.to_string()),
        duration_minutes,
        message_count: ordered.len(),
        user_message_count: user_texts.len(),
        topic_keywords,
    }
}
