//! Defensive parsing of JSON-shaped completion responses.
//!
//! Models wrap JSON in prose or code fences, truncate it, or ignore the
//! format entirely. Every parser here degrades to a regex pass and then to an
//! empty value; none of them returns an error.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::mood::{Emotions, Mood, MoodProfile};

/// Structure pulled out of a conversation window for the memory store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryExtraction {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub preferences: BTreeMap<String, serde_json::Value>,
    #[serde(default, alias = "dates")]
    pub important_dates: Vec<String>,
}

impl MemoryExtraction {
    pub fn is_empty(&self) -> bool {
        self.summary.as_deref().is_none_or(|s| s.trim().is_empty())
            && self.preferences.is_empty()
            && self.important_dates.is_empty()
    }
}

static QUOTED: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r#""([^"\n]{2,})""#).ok());
static LIST_ITEM: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*(?:[-*\u{2022}]|\d+[.)])\s+(.+?)\s*$").ok());
static SUMMARY_FIELD: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#""summary"\s*:\s*"((?:[^"\\]|\\.)*)""#).ok());
static MOOD_FIELD: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#""mood"\s*:\s*"([a-zA-Z]+)""#).ok());

fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    trimmed.strip_suffix("```").unwrap_or(trimmed).trim()
}

fn slice_between(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

/// Direct parse, then the outermost object, then the outermost array.
pub fn extract_json(raw: &str) -> Option<serde_json::Value> {
    let text = strip_fences(raw);
    if let Ok(value) = serde_json::from_str(text) {
        return Some(value);
    }
    [('{', '}'), ('[', ']')]
        .into_iter()
        .filter_map(|(open, close)| slice_between(text, open, close))
        .find_map(|slice| serde_json::from_str(slice).ok())
}

fn clean_suggestion(s: &str) -> Option<String> {
    let s = s.trim().trim_matches('"').trim();
    (!s.is_empty()).then(|| s.to_string())
}

/// Suggested replies from a JSON array, a `{"suggestions": [...]}` object,
/// quoted strings, or a bulleted/numbered list.
pub fn parse_suggestions(raw: &str, limit: usize) -> Vec<String> {
    let from_json = extract_json(raw).and_then(|value| {
        let items = match value {
            serde_json::Value::Array(items) => items,
            serde_json::Value::Object(mut map) => match map.remove("suggestions") {
                Some(serde_json::Value::Array(items)) => items,
                _ => return None,
            },
            _ => return None,
        };
        Some(
            items
                .iter()
                .filter_map(|v| v.as_str())
                .filter_map(clean_suggestion)
                .collect::<Vec<_>>(),
        )
    });

    let mut suggestions = match from_json {
        Some(items) if !items.is_empty() => items,
        _ => {
            warn!("suggestion response was not a JSON array, falling back to text extraction (non-fatal)");
            fallback_suggestions(raw)
        }
    };

    let mut seen = std::collections::HashSet::new();
    suggestions.retain(|s| seen.insert(s.to_lowercase()));
    suggestions.truncate(limit);
    suggestions
}

fn fallback_suggestions(raw: &str) -> Vec<String> {
    let quoted: Vec<String> = QUOTED
        .as_ref()
        .map(|re| {
            re.captures_iter(raw)
                .filter_map(|c| clean_suggestion(&c[1]))
                .collect()
        })
        .unwrap_or_default();
    if !quoted.is_empty() {
        return quoted;
    }
    LIST_ITEM
        .as_ref()
        .map(|re| {
            re.captures_iter(raw)
                .filter_map(|c| clean_suggestion(&c[1]))
                .collect()
        })
        .unwrap_or_default()
}

fn string_list(value: Option<&serde_json::Value>) -> Vec<String> {
    value
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|v| match v {
                    serde_json::Value::String(s) => Some(s.trim().to_string()),
                    serde_json::Value::Null => None,
                    other => Some(other.to_string()),
                })
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// Memory fields from a JSON object; a lone `"summary"` is salvaged by regex.
pub fn parse_memory_extraction(raw: &str) -> MemoryExtraction {
    if let Some(serde_json::Value::Object(map)) = extract_json(raw) {
        let summary = map
            .get("summary")
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let preferences = map
            .get("preferences")
            .and_then(|v| v.as_object())
            .map(|prefs| {
                prefs
                    .iter()
                    .filter(|(_, v)| !v.is_null())
                    .map(|(k, v)| (k.trim().to_string(), v.clone()))
                    .collect()
            })
            .unwrap_or_default();
        let important_dates = string_list(map.get("important_dates").or_else(|| map.get("dates")));
        return MemoryExtraction {
            summary,
            preferences,
            important_dates,
        };
    }

    warn!("memory extraction response was not a JSON object, salvaging what we can (non-fatal)");
    let summary = SUMMARY_FIELD
        .as_ref()
        .and_then(|re| re.captures(raw))
        .map(|c| c[1].replace("\\\"", "\"").trim().to_string())
        .filter(|s| !s.is_empty());
    MemoryExtraction {
        summary,
        ..Default::default()
    }
}

fn unit(value: Option<&serde_json::Value>) -> Option<f32> {
    value.and_then(|v| v.as_f64()).map(|v| v.clamp(0.0, 1.0) as f32)
}

/// A remote mood classification, or `None` when no mood label is recoverable.
pub fn parse_mood(raw: &str) -> Option<MoodProfile> {
    let value = extract_json(raw);
    let label = value
        .as_ref()
        .and_then(|v| v.get("mood"))
        .and_then(|m| m.as_str())
        .map(str::to_string)
        .or_else(|| {
            MOOD_FIELD
                .as_ref()
                .and_then(|re| re.captures(raw))
                .map(|c| c[1].to_string())
        })?;
    let mood = Mood::from_label(&label)?;

    let value = value.unwrap_or_default();
    let preset = Emotions::for_mood(mood);
    let emotions = value.get("emotions");
    let emotion = |name: &str, fallback: f32| {
        unit(emotions.and_then(|e| e.get(name))).unwrap_or(fallback)
    };

    Some(MoodProfile {
        mood,
        confidence: unit(value.get("confidence")).unwrap_or(0.5),
        emotions: Emotions {
            joy: emotion("joy", preset.joy),
            sadness: emotion("sadness", preset.sadness),
            anger: emotion("anger", preset.anger),
            fear: emotion("fear", preset.fear),
            surprise: emotion("surprise", preset.surprise),
            disgust: emotion("disgust", preset.disgust),
        },
        sentiment: value
            .get("sentiment")
            .and_then(|v| v.as_f64())
            .map(|v| v.clamp(-1.0, 1.0) as f32)
            .unwrap_or(0.0),
    })
}
