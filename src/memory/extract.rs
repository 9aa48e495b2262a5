use serde_json::Value;

use crate::agent::parse::MemoryExtraction;
use crate::types::{Message, Sender};

/// Pattern-based extraction over the user's own messages.
///
/// Used when the completion service cannot produce a structured memory
/// update. Picks up self-descriptions like "my name is", "I live in",
/// "I like", "my birthday is" and "my X is Y".
pub fn extract_from_messages(messages: &[Message]) -> MemoryExtraction {
    let mut extraction = MemoryExtraction::default();
    for message in messages.iter().filter(|m| m.sender == Sender::User) {
        extract_into(&message.content, &mut extraction);
    }
    extraction
}

fn extract_into(text: &str, out: &mut MemoryExtraction) {
    for sentence in text.split(['.', '!', '?', '\n']) {
        let sentence = sentence.trim();
        if sentence.is_empty() {
            continue;
        }
        let lower = sentence.to_lowercase();

        if let Some(name) = after_pattern(&lower, sentence, "my name is ") {
            set(out, "name", name);
        }
        if let Some(place) = after_pattern(&lower, sentence, "i live in ") {
            set(out, "location", place);
        }
        if let Some(place) = after_pattern(&lower, sentence, "i'm from ")
            .or_else(|| after_pattern(&lower, sentence, "i am from "))
        {
            set(out, "hometown", place);
        }
        if let Some(work) = after_pattern(&lower, sentence, "i work at ")
            .or_else(|| after_pattern(&lower, sentence, "i work for "))
        {
            set(out, "workplace", work);
        }
        for pattern in ["i like ", "i love ", "i enjoy "] {
            if let Some(thing) = after_pattern(&lower, sentence, pattern) {
                push_unique(out, "likes", thing);
            }
        }
        if let Some(thing) = after_pattern(&lower, sentence, "i hate ")
            .or_else(|| after_pattern(&lower, sentence, "i don't like "))
        {
            push_unique(out, "dislikes", thing);
        }

        for (key, value) in my_x_is_y(&lower, sentence) {
            match key.as_str() {
                "name" => {}
                "birthday" | "anniversary" => {
                    let date = format!("{key}: {value}");
                    if !out.important_dates.contains(&date) {
                        out.important_dates.push(date);
                    }
                }
                _ => set(out, &key, value),
            }
        }
    }
}

fn set(out: &mut MemoryExtraction, key: &str, value: String) {
    out.preferences.insert(key.to_string(), Value::String(value));
}

fn push_unique(out: &mut MemoryExtraction, key: &str, value: String) {
    let entry = out
        .preferences
        .entry(key.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    if let Value::Array(items) = entry {
        let value = Value::String(value);
        if !items.contains(&value) {
            items.push(value);
        }
    }
}

/// Text following `pattern`, up to the end of the clause.
fn after_pattern(lower: &str, original: &str, pattern: &str) -> Option<String> {
    let pos = lower.find(pattern)?;
    // Lowercasing can shift byte offsets outside ASCII.
    let rest = original.get(pos + pattern.len()..)?;
    let value = rest
        .split([',', ';', '(', ')'])
        .next()
        .unwrap_or(rest)
        .split(" and ")
        .next()
        .unwrap_or(rest)
        .trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Every "my X is Y" / "my favorite X is Y" in a sentence.
fn my_x_is_y(lower: &str, original: &str) -> Vec<(String, String)> {
    let mut found = Vec::new();
    let mut search_from = 0;

    while let Some(rel) = lower.get(search_from..).and_then(|s| s.find("my ")) {
        let start = search_from + rel;
        search_from = start + 3;
        // "my" must start a word
        if start > 0 && lower[..start].chars().last().is_some_and(char::is_alphanumeric) {
            continue;
        }
        let Some(after_my) = lower.get(start + 3..) else {
            break;
        };
        let Some(is_pos) = after_my.find(" is ") else {
            break;
        };
        let key = after_my[..is_pos].trim();
        let words: Vec<&str> = key.split_whitespace().collect();
        let key = match words.as_slice() {
            [one] => one.to_string(),
            ["favorite" | "favourite", thing] => format!("favorite_{thing}"),
            _ => continue,
        };
        if let Some(value) = after_pattern(lower, original, &format!("{} is ", &after_my[..is_pos])) {
            found.push((key, value));
        }
    }
    found
}
