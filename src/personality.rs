//! Personality-driven rewriting of generated replies.
//!
//! Every trait becomes a factor in [-1, 1]. Factors inside the neutral band
//! (|f| <= 0.3) leave their dimension untouched. The four passes run in a
//! fixed order (humor, empathy, creativity, formality), each over the output
//! of the previous one.

use regex::{Captures, Regex};
use std::sync::LazyLock;

use crate::mood::Mood;
use crate::types::Personality;

const ACTIVE: f32 = 0.3;

/// Rewrite `reply` according to the bot's traits and the user's mood.
pub fn modulate(reply: &str, personality: &Personality, mood: Option<Mood>) -> String {
    let text = apply_humor(reply, personality.humor.factor(), mood);
    let text = apply_empathy(&text, personality.empathy.factor(), mood);
    let text = apply_creativity(&text, personality.creativity.factor());
    apply_formality(&text, personality.formality.factor())
}

// ===== phrase tables =====

/// Bands for positive factors: >0.3, >=0.5, >=0.7, >=0.9.
fn band(factor: f32) -> usize {
    if factor >= 0.9 {
        3
    } else if factor >= 0.7 {
        2
    } else if factor >= 0.5 {
        1
    } else {
        0
    }
}

/// Deterministic pick so identical input always yields identical output.
fn pick<'a>(phrases: &[&'a str], seed: &str) -> &'a str {
    phrases[seed.chars().count() % phrases.len()]
}

const HUMOR_LEAD_INS: [&[&str]; 4] = [
    &["Fun thought:", "On a lighter note,"],
    &["Here's a fun twist:", "Not to be silly, but"],
    &["Plot twist:", "Brace yourself for a pun:"],
    &["Hold onto your hat:", "Drumroll, please:"],
];

const GENTLE_HUMOR_LEAD_INS: &[&str] = &[
    "If it helps to smile a little,",
    "Gently, on a brighter note,",
];

const HUMOR_MARKERS: &[&str] = &[
    "just kidding",
    "lmao",
    "haha",
    "hehe",
    "lol",
    "jk",
    "joke",
    "\u{1F602}",
    "\u{1F923}",
];

const GENERIC_EMPATHY: [&[&str]; 4] = [
    &["I hear you."],
    &["I understand how you feel."],
    &["I really appreciate you sharing this with me."],
    &["I truly understand, and I'm here for you."],
];

/// (strong, light) phrasing per mood; strong applies from 0.6.
fn mood_empathy(mood: Mood) -> Option<(&'static str, &'static str)> {
    match mood {
        Mood::Sad => Some((
            "I'm really sorry you're going through this, and I'm here for you.",
            "I'm sorry you're feeling down.",
        )),
        Mood::Angry => Some((
            "That sounds genuinely infuriating, and your frustration makes sense.",
            "I can see why that's frustrating.",
        )),
        Mood::Anxious => Some((
            "That sounds really stressful. Let's take it one step at a time together.",
            "It's okay to feel uneasy about this.",
        )),
        Mood::Tired => Some((
            "You sound worn out, so please be gentle with yourself.",
            "Sounds like you could use some rest.",
        )),
        Mood::Confused => Some((
            "No worries at all, this can be genuinely confusing.",
            "Let me try to make this clearer.",
        )),
        Mood::Happy | Mood::Excited | Mood::Calm => Some((
            "I love hearing that you're in such a good place!",
            "Glad to hear things are going well.",
        )),
        Mood::Neutral => None,
    }
}

const HEDGES: &[&str] = &[
    "i think that",
    "i feel like",
    "it seems like",
    "i believe",
    "i guess",
    "i think",
    "perhaps",
    "maybe",
    "possibly",
];

const CREATIVE_LEAD_INS: [&[&str]; 4] = [
    &["Here's a thought:", "Consider this:"],
    &["Try looking at it this way:", "Here's a fresh angle:"],
    &["Let's get a little inventive:", "Here's a playful idea:"],
    &["Let's paint outside the lines:", "Wild idea incoming:"],
];

const CREATIVE_MARKERS: &[&str] = &[
    "think outside the box",
    "imagine if",
    "picture this",
    "what if",
    "unconventional",
    "creatively",
    "wild idea",
];

// ===== formality rules =====

const FORMAL_TIERS: [&[(&str, &str)]; 3] = [
    &[
        ("don't", "do not"),
        ("doesn't", "does not"),
        ("didn't", "did not"),
        ("can't", "cannot"),
        ("won't", "will not"),
        ("isn't", "is not"),
        ("aren't", "are not"),
        ("wasn't", "was not"),
        ("i'm", "I am"),
        ("you're", "you are"),
        ("we're", "we are"),
        ("they're", "they are"),
        ("it's", "it is"),
        ("that's", "that is"),
        ("there's", "there is"),
        ("let's", "let us"),
        ("i've", "I have"),
        ("i'll", "I will"),
        ("i'd", "I would"),
        ("you'll", "you will"),
        ("gonna", "going to"),
        ("wanna", "want to"),
    ],
    &[
        ("good", "beneficial"),
        ("get", "obtain"),
        ("big", "substantial"),
        ("show", "demonstrate"),
        ("ask", "inquire"),
        ("need", "require"),
        ("lots of", "numerous"),
        ("kids", "children"),
        ("okay", "acceptable"),
        ("really", "truly"),
    ],
    &[
        ("help me", "assist me"),
        ("help you", "assist you"),
        ("to help", "to assist"),
        ("help", "assistance"),
        ("buy", "purchase"),
        ("start", "commence"),
        ("try", "attempt"),
        ("enough", "sufficient"),
        ("hi", "hello"),
        ("hey", "hello"),
        ("thanks", "thank you"),
        ("yeah", "yes"),
        ("yep", "yes"),
    ],
];

const CASUAL_TIERS: [&[(&str, &str)]; 3] = [
    &[
        ("do not", "don't"),
        ("does not", "doesn't"),
        ("did not", "didn't"),
        ("cannot", "can't"),
        ("will not", "won't"),
        ("is not", "isn't"),
        ("are not", "aren't"),
        ("I am", "I'm"),
        ("you are", "you're"),
        ("it is", "it's"),
        ("that is", "that's"),
        ("let us", "let's"),
        ("I have", "I've"),
        ("I will", "I'll"),
    ],
    &[
        ("beneficial", "good"),
        ("obtain", "get"),
        ("substantial", "big"),
        ("demonstrate", "show"),
        ("inquire", "ask"),
        ("require", "need"),
        ("numerous", "lots of"),
        ("children", "kids"),
        ("acceptable", "okay"),
        ("therefore", "so"),
        ("however", "but"),
    ],
    &[
        ("assistance", "help"),
        ("assist", "help"),
        ("purchase", "buy"),
        ("commence", "start"),
        ("attempt", "try"),
        ("utilize", "use"),
        ("sufficient", "enough"),
        ("greetings", "hey"),
        ("hello", "hey"),
        ("thank you", "thanks"),
    ],
];

struct Rule {
    pattern: Regex,
    replacement: &'static str,
}

/// Whole-word, case-insensitive pattern; straight and curly apostrophes both match.
fn word_pattern(phrase: &str) -> Option<Regex> {
    let escaped = regex::escape(phrase).replace('\'', "['\u{2019}]");
    Regex::new(&format!(r"(?i)\b{escaped}\b")).ok()
}

fn compile(tiers: &[&[(&str, &'static str)]; 3]) -> Vec<Vec<Rule>> {
    tiers
        .iter()
        .map(|tier| {
            tier.iter()
                .filter_map(|(from, to)| {
                    word_pattern(from).map(|pattern| Rule {
                        pattern,
                        replacement: *to,
                    })
                })
                .collect()
        })
        .collect()
}

static FORMAL_RULES: LazyLock<Vec<Vec<Rule>>> = LazyLock::new(|| compile(&FORMAL_TIERS));
static CASUAL_RULES: LazyLock<Vec<Vec<Rule>>> = LazyLock::new(|| compile(&CASUAL_TIERS));

static MULTI_SPACE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"[ \t]{2,}").ok());
static SPACE_BEFORE_PUNCT: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"[ \t]+([,.!?;:])").ok());
static DANGLING_COMMA: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(^|[.!?]\s+)[,;:]\s*").ok());

// ===== text helpers =====

/// Split into sentences at `.`, `!` or `?` followed by whitespace.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        let boundary = matches!(c, '.' | '!' | '?')
            && chars.peek().is_none_or(|next| next.is_whitespace());
        if boundary {
            let sentence = current.trim();
            if !sentence.is_empty() {
                sentences.push(sentence.to_string());
            }
            current.clear();
        }
    }

    let rest = current.trim();
    if !rest.is_empty() {
        sentences.push(rest.to_string());
    }
    sentences
}

fn capitalize_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn match_case(matched: &str, replacement: &str) -> String {
    if matched.chars().next().is_some_and(char::is_uppercase) {
        capitalize_first(replacement)
    } else {
        replacement.to_string()
    }
}

fn apply_rules(text: &str, rules: &[Rule]) -> String {
    rules.iter().fold(text.to_string(), |acc, rule| {
        rule.pattern
            .replace_all(&acc, |caps: &Captures| match_case(&caps[0], rule.replacement))
            .into_owned()
    })
}

/// Drop every case-insensitive occurrence of the given literals.
fn strip_literals(text: &str, literals: &[&str], whole_words: bool) -> String {
    literals.iter().fold(text.to_string(), |acc, literal| {
        let escaped = regex::escape(literal);
        let pattern = if whole_words {
            format!(r"(?i)\b{escaped}\b,?")
        } else {
            format!("(?i){escaped}")
        };
        match Regex::new(&pattern) {
            Ok(re) => re.replace_all(&acc, "").into_owned(),
            Err(_) => acc,
        }
    })
}

/// Clean up whitespace and punctuation left behind by removals.
fn tidy(text: &str) -> String {
    let mut out = text.to_string();
    if let Some(re) = &*MULTI_SPACE {
        out = re.replace_all(&out, " ").into_owned();
    }
    if let Some(re) = &*SPACE_BEFORE_PUNCT {
        out = re.replace_all(&out, "$1").into_owned();
    }
    if let Some(re) = &*DANGLING_COMMA {
        out = re.replace_all(&out, "$1").into_owned();
    }
    capitalize_first(out.trim())
}

/// Byte offsets where each sentence of `split_sentences` begins.
fn sentence_starts(text: &str) -> Vec<usize> {
    let mut starts = Vec::new();
    let mut at_start = true;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if at_start && !c.is_whitespace() {
            starts.push(i);
            at_start = false;
        }
        if matches!(c, '.' | '!' | '?') && chars.peek().is_none_or(|(_, next)| next.is_whitespace()) {
            at_start = true;
        }
    }
    starts
}

/// Insert `phrase` before one sentence, leaving the rest of the text as written.
fn prefix_sentence(text: &str, index_of: impl Fn(usize) -> usize, phrase: &str) -> String {
    let starts = sentence_starts(text);
    let Some(last) = starts.len().checked_sub(1) else {
        return text.to_string();
    };
    let at = starts[index_of(starts.len()).min(last)];
    format!("{}{phrase} {}", &text[..at], &text[at..])
}

// ===== passes =====

fn apply_humor(text: &str, factor: f32, mood: Option<Mood>) -> String {
    if factor > ACTIVE {
        let phrase = match mood {
            Some(Mood::Sad | Mood::Angry) => pick(GENTLE_HUMOR_LEAD_INS, text),
            _ => pick(HUMOR_LEAD_INS[band(factor)], text),
        };
        prefix_sentence(text, |len| len / 2, phrase)
    } else if factor < -ACTIVE {
        tidy(&strip_literals(text, HUMOR_MARKERS, false))
    } else {
        text.to_string()
    }
}

fn apply_empathy(text: &str, factor: f32, mood: Option<Mood>) -> String {
    if factor > ACTIVE {
        let phrase = match mood.and_then(mood_empathy) {
            Some((strong, light)) => {
                if factor >= 0.6 {
                    strong
                } else {
                    light
                }
            }
            None => pick(GENERIC_EMPATHY[band(factor)], text),
        };
        format!("{phrase} {text}")
    } else if factor < -ACTIVE {
        tidy(&strip_literals(text, HEDGES, true))
    } else {
        text.to_string()
    }
}

fn apply_creativity(text: &str, factor: f32) -> String {
    if factor > ACTIVE {
        let phrase = pick(CREATIVE_LEAD_INS[band(factor)], text);
        prefix_sentence(text, |len| len.saturating_sub(1), phrase)
    } else if factor < -ACTIVE {
        tidy(&strip_literals(text, CREATIVE_MARKERS, true))
    } else {
        text.to_string()
    }
}

fn apply_formality(text: &str, factor: f32) -> String {
    let magnitude = factor.abs();
    if magnitude <= ACTIVE {
        return text.to_string();
    }
    let tiers: &[Vec<Rule>] = if factor > 0.0 {
        &FORMAL_RULES[..]
    } else {
        &CASUAL_RULES[..]
    };
    let gates = [ACTIVE, 0.6, 0.8];

    tiers
        .iter()
        .zip(gates)
        .filter(|(_, gate)| magnitude >= *gate)
        .fold(text.to_string(), |acc, (rules, _)| apply_rules(&acc, rules))
}
