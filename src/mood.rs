//! Local mood detection.
//!
//! Keyword heuristics over the user's text. Each mood keyword hit adds that
//! mood's weight; scores are normalized across all matched moods and the
//! strongest mood wins, ties going to the earlier entry in [`MOOD_TABLE`].
//! Sentiment is scored separately from its own word lists, and the emotion
//! vector is a fixed preset per mood.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    Happy,
    Sad,
    Angry,
    Anxious,
    Tired,
    Confused,
    Excited,
    Calm,
    Neutral,
}

impl Mood {
    pub fn label(self) -> &'static str {
        match self {
            Mood::Happy => "happy",
            Mood::Sad => "sad",
            Mood::Angry => "angry",
            Mood::Anxious => "anxious",
            Mood::Tired => "tired",
            Mood::Confused => "confused",
            Mood::Excited => "excited",
            Mood::Calm => "calm",
            Mood::Neutral => "neutral",
        }
    }

    pub fn from_label(label: &str) -> Option<Mood> {
        MOOD_TABLE
            .iter()
            .map(|(mood, _, _)| *mood)
            .chain(std::iter::once(Mood::Neutral))
            .find(|mood| mood.label().eq_ignore_ascii_case(label.trim()))
    }

    pub fn is_positive(self) -> bool {
        matches!(self, Mood::Happy | Mood::Excited | Mood::Calm)
    }
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Six basic emotions, each 0..1.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Emotions {
    pub joy: f32,
    pub sadness: f32,
    pub anger: f32,
    pub fear: f32,
    pub surprise: f32,
    pub disgust: f32,
}

impl Emotions {
    const fn new(joy: f32, sadness: f32, anger: f32, fear: f32, surprise: f32, disgust: f32) -> Self {
        Self {
            joy,
            sadness,
            anger,
            fear,
            surprise,
            disgust,
        }
    }

    pub fn named(&self) -> [(&'static str, f32); 6] {
        [
            ("joy", self.joy),
            ("sadness", self.sadness),
            ("anger", self.anger),
            ("fear", self.fear),
            ("surprise", self.surprise),
            ("disgust", self.disgust),
        ]
    }

    /// Coarse preset for a dominant mood.
    pub fn for_mood(mood: Mood) -> Self {
        match mood {
            Mood::Happy => Self::new(0.8, 0.0, 0.0, 0.0, 0.2, 0.0),
            Mood::Excited => Self::new(0.9, 0.0, 0.0, 0.0, 0.6, 0.0),
            Mood::Calm => Self::new(0.5, 0.0, 0.0, 0.0, 0.0, 0.0),
            Mood::Sad => Self::new(0.0, 0.8, 0.1, 0.1, 0.0, 0.0),
            Mood::Angry => Self::new(0.0, 0.1, 0.8, 0.0, 0.1, 0.4),
            Mood::Anxious => Self::new(0.0, 0.2, 0.0, 0.8, 0.1, 0.0),
            Mood::Tired => Self::new(0.0, 0.4, 0.0, 0.0, 0.0, 0.0),
            Mood::Confused => Self::new(0.0, 0.0, 0.0, 0.2, 0.6, 0.0),
            Mood::Neutral => Self::new(0.1, 0.1, 0.1, 0.1, 0.1, 0.1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MoodProfile {
    pub mood: Mood,
    pub confidence: f32,
    pub emotions: Emotions,
    /// -1 (negative) to 1 (positive).
    pub sentiment: f32,
}

impl MoodProfile {
    pub fn neutral() -> Self {
        Self {
            mood: Mood::Neutral,
            confidence: 0.5,
            emotions: Emotions::for_mood(Mood::Neutral),
            sentiment: 0.0,
        }
    }

    pub fn sentiment_label(&self) -> &'static str {
        if self.sentiment > 0.3 {
            "positive"
        } else if self.sentiment < -0.3 {
            "negative"
        } else {
            "neutral"
        }
    }
}

impl Default for MoodProfile {
    fn default() -> Self {
        Self::neutral()
    }
}

/// (mood, weight per hit, keywords), in tie-break priority order.
const MOOD_TABLE: &[(Mood, f32, &[&str])] = &[
    (
        Mood::Happy,
        1.0,
        &["happy", "glad", "joyful", "cheerful", "delighted", "pleased", "smiling"],
    ),
    (
        Mood::Sad,
        1.0,
        &[
            "sad",
            "unhappy",
            "depressed",
            "feeling down",
            "lonely",
            "heartbroken",
            "miserable",
            "crying",
        ],
    ),
    (
        Mood::Angry,
        1.2,
        &["angry", "mad", "furious", "annoyed", "irritated", "frustrated", "pissed"],
    ),
    (
        Mood::Anxious,
        1.1,
        &["anxious", "worried", "nervous", "scared", "afraid", "stressed", "panicking", "overwhelmed"],
    ),
    (
        Mood::Tired,
        0.9,
        &["tired", "exhausted", "sleepy", "drained", "worn out", "fatigued", "burned out"],
    ),
    (
        Mood::Confused,
        0.9,
        &["confused", "unsure", "puzzled", "lost", "don't understand", "don't get it"],
    ),
    (
        Mood::Excited,
        1.1,
        &["excited", "thrilled", "can't wait", "pumped", "stoked", "hyped"],
    ),
    (
        Mood::Calm,
        0.8,
        &["calm", "relaxed", "peaceful", "chill", "content", "serene"],
    ),
];

const POSITIVE_WORDS: &[&str] = &[
    "good", "great", "love", "awesome", "amazing", "wonderful", "nice", "thanks", "happy", "glad",
    "excellent", "fantastic",
];

const NEGATIVE_WORDS: &[&str] = &[
    "bad", "hate", "terrible", "awful", "horrible", "worst", "sad", "angry", "upset", "annoyed",
    "sucks", "disappointed",
];

/// Lowercased words padded with spaces so phrases match on word boundaries.
fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase().replace('\u{2019}', "'");
    let words: Vec<&str> = lowered
        .split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(|w| w.trim_matches('\''))
        .filter(|w| !w.is_empty())
        .collect();
    format!(" {} ", words.join(" "))
}

fn hits(normalized: &str, keyword: &str) -> usize {
    normalized.matches(&format!(" {keyword} ")).count()
}

fn sentiment(normalized: &str) -> f32 {
    let pos: usize = POSITIVE_WORDS.iter().map(|w| hits(normalized, w)).sum();
    let neg: usize = NEGATIVE_WORDS.iter().map(|w| hits(normalized, w)).sum();
    if pos + neg == 0 {
        0.0
    } else {
        (pos as f32 - neg as f32) / (pos + neg) as f32
    }
}

/// Classify free text into a mood profile.
pub fn detect(text: &str) -> MoodProfile {
    let normalized = normalize(text);

    let scores: Vec<(Mood, f32)> = MOOD_TABLE
        .iter()
        .map(|(mood, weight, keywords)| {
            let count: usize = keywords.iter().map(|k| hits(&normalized, k)).sum();
            (*mood, count as f32 * weight)
        })
        .collect();

    let total: f32 = scores.iter().map(|(_, s)| s).sum();
    let sentiment = sentiment(&normalized);

    if total <= 0.0 {
        return MoodProfile {
            sentiment,
            ..MoodProfile::neutral()
        };
    }

    let mut best = scores[0];
    for candidate in &scores[1..] {
        if candidate.1 > best.1 {
            best = *candidate;
        }
    }

    MoodProfile {
        mood: best.0,
        confidence: best.1 / total,
        emotions: Emotions::for_mood(best.0),
        sentiment,
    }
}
