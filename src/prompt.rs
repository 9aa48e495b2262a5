use crate::context::ContextStats;
use crate::mood::MoodProfile;
use crate::types::{Bot, BotMemory, TraitLevel};

const CLOSING: &str = "Guidelines:
- Keep replies concise and conversational.
- Use emoji sparingly.
- Be sensitive to the user's mood and adjust your tone to it.
- Ask a follow-up question when it moves the conversation forward.
- If you are unsure about something, say so honestly.";

/// Build the system prompt for a reply.
///
/// An explicit `system_prompt` on the bot is returned verbatim. Otherwise the
/// blocks are emitted in a fixed order, and optional blocks whose input is
/// absent are left out entirely.
pub fn compose(
    bot: &Bot,
    mood: Option<&MoodProfile>,
    memory: Option<&BotMemory>,
    context: Option<&ContextStats>,
) -> String {
    if let Some(custom) = &bot.system_prompt {
        return custom.clone();
    }

    let mut blocks = vec![identity_block(bot)];
    if let Some(personality) = &bot.personality {
        blocks.push(format!(
            "Personality:\n- Humor: {}\n- Empathy: {}\n- Creativity: {}\n- Formality: {}",
            describe_trait(personality.humor, "humorous", "serious"),
            describe_trait(personality.empathy, "empathetic", "matter-of-fact"),
            describe_trait(personality.creativity, "creative", "practical"),
            describe_trait(personality.formality, "formal", "casual"),
        ));
    }
    if let Some(story) = &bot.background_story {
        blocks.push(format!("Background story:\n{story}"));
    }
    if let Some(mood) = mood {
        blocks.push(mood_block(mood));
    }
    if let Some(memory) = memory {
        blocks.push(memory_block(memory));
    }
    if let Some(stats) = context {
        blocks.push(format!(
            "Conversation context: the current topic seems to be \"{}\". The conversation has lasted {} minutes across {} messages.",
            stats.topic, stats.duration_minutes, stats.message_count
        ));
    }
    blocks.push(CLOSING.to_string());

    blocks.join("\n\n")
}

fn identity_block(bot: &Bot) -> String {
    let mut block = format!(
        "You are {}, a {}. Speak in a {} tone. Your signature emoji is {}.",
        bot.name, bot.role, bot.tone, bot.emoji
    );
    if let Some(description) = &bot.description {
        block.push_str("\nAbout you: ");
        block.push_str(description);
    }
    block
}

/// Three bands: above 70, above 30, and the trait's low end.
pub fn describe_trait(level: TraitLevel, label: &str, low: &str) -> String {
    match level.value() {
        v if v > 70 => format!("very {label}"),
        v if v > 30 => format!("moderately {label}"),
        _ => low.to_string(),
    }
}

fn percent(value: f32) -> i64 {
    (value * 100.0).round() as i64
}

fn mood_block(mood: &MoodProfile) -> String {
    let emotions = mood
        .emotions
        .named()
        .iter()
        .map(|(name, value)| format!("{name} {}%", percent(*value)))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "User mood: {} ({}% confidence). Overall sentiment: {}.\nEmotional signals: {emotions}.",
        mood.mood,
        percent(mood.confidence),
        mood.sentiment_label()
    )
}

fn memory_block(memory: &BotMemory) -> String {
    let mut lines = vec!["What you remember about this user:".to_string()];

    if memory.is_empty() {
        lines.push("- Nothing yet. This is a fresh start, so get to know them.".into());
        return lines.join("\n");
    }

    if !memory.summary.trim().is_empty() {
        lines.push(format!("- Summary: {}", memory.summary.trim()));
    }
    if !memory.preferences.is_empty() {
        let prefs = memory
            .preferences
            .iter()
            .map(|(key, value)| match value {
                serde_json::Value::String(s) => format!("{key}: {s}"),
                other => format!("{key}: {other}"),
            })
            .collect::<Vec<_>>()
            .join(", ");
        lines.push(format!("- Preferences: {prefs}"));
    }
    if !memory.important_dates.is_empty() {
        lines.push(format!(
            "- Important dates: {}",
            memory.important_dates.join(", ")
        ));
    }
    if !memory.learned_responses.is_empty() {
        lines.push(format!(
            "- Lessons from past feedback: {}",
            memory.learned_responses.join(". ")
        ));
    }
    lines.join("\n")
}
