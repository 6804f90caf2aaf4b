use async_trait::async_trait;

use super::NluAdapter;
use crate::models::profile::parse_clock;
use crate::models::{Entity, EntityKind, Intent, IntentName, NluResult, Span};

const MATCH_CONFIDENCE: f32 = 0.7;

/// Checked top to bottom; the first table with a hit decides the intent.
/// Urgency and complaints come first so that "book me in, it's an emergency" escalates.
const INTENT_KEYWORDS: &[(IntentName, &[&str])] = &[
    (
        IntentName::UrgentRequest,
        &["urgent", "emergency", "immediately", "asap", "right now"],
    ),
    (
        IntentName::Complaint,
        &["complaint", "issue", "problem", "unhappy", "dissatisfied"],
    ),
    (
        IntentName::AppointmentScheduling,
        &["appointment", "schedule", "book", "reserve", "reservation", "slot"],
    ),
    (
        IntentName::BusinessHours,
        &["hour", "open", "close", "when"],
    ),
    (
        IntentName::Pricing,
        &["price", "cost", "fee", "charge", "how much"],
    ),
    (
        IntentName::ServiceInquiry,
        &["service", "offer", "provide", "available"],
    ),
    (
        IntentName::ContactRequest,
        &["contact", "reach", "talk", "speak", "call back"],
    ),
    (
        IntentName::Goodbye,
        &["bye", "goodbye", "thank", "that's all", "hang up"],
    ),
    (
        IntentName::Greeting,
        &["hello", "hi", "hey", "good morning", "good afternoon", "good evening"],
    ),
    (
        IntentName::GeneralQuestion,
        &["question", "wonder", "curious", "know"],
    ),
];

const DAY_WORDS: [&str; 9] = [
    "today",
    "tomorrow",
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
];

const MONTHS: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

const PARTS_OF_DAY: [&str; 4] = ["morning", "afternoon", "evening", "noon"];

/// Rule-based classifier that needs no model server.
#[derive(Default)]
pub struct KeywordNlu;

impl KeywordNlu {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(&self, text: &str) -> NluResult {
        NluResult {
            text: text.to_string(),
            intent: Intent {
                name: classify_intent(text),
                confidence: MATCH_CONFIDENCE,
            },
            entities: extract_entities(text),
        }
    }
}

#[async_trait]
impl NluAdapter for KeywordNlu {
    async fn classify(&self, text: &str) -> anyhow::Result<NluResult> {
        Ok(self.analyze(text))
    }
}

pub fn classify_intent(text: &str) -> IntentName {
    let tokens: Vec<String> = text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();
    let joined = format!(" {} ", tokens.join(" "));

    let matches = |keyword: &str| {
        if keyword.contains(' ') || keyword.contains('\'') {
            joined.contains(&format!(" {keyword} "))
        } else {
            tokens
                .iter()
                .any(|t| t == keyword || (keyword.len() >= 4 && t.starts_with(keyword)))
        }
    };

    INTENT_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| matches(k)))
        .map(|(name, _)| *name)
        .unwrap_or(IntentName::GeneralQuestion)
}

// ── Entities ──

struct Word<'a> {
    text: &'a str,
    start: usize,
    end: usize,
}

fn is_edge_punct(c: char) -> bool {
    matches!(
        c,
        '.' | ',' | '!' | '?' | ';' | ':' | '"' | '\'' | '(' | ')' | '[' | ']'
    )
}

fn split_words(text: &str) -> Vec<Word<'_>> {
    let mut words = Vec::new();
    let mut push = |start: usize, end: usize| {
        let raw = &text[start..end];
        let trimmed = raw.trim_matches(is_edge_punct);
        if trimmed.is_empty() {
            return;
        }
        let lead = raw.len() - raw.trim_start_matches(is_edge_punct).len();
        words.push(Word {
            text: trimmed,
            start: start + lead,
            end: start + lead + trimmed.len(),
        });
    };

    let mut start = None;
    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            if let Some(s) = start.take() {
                push(s, i);
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        push(s, text.len());
    }
    words
}

fn starts_with_digit(s: &str) -> bool {
    s.starts_with(|c: char| c.is_ascii_digit())
}

fn is_number(s: &str) -> bool {
    starts_with_digit(s) && s.chars().all(|c| c.is_ascii_digit() || c == ',' || c == '.')
}

fn is_meridiem(s: &str) -> bool {
    matches!(s, "am" | "pm")
}

fn is_numeric_date(s: &str) -> bool {
    if chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok() {
        return true;
    }
    let parts: Vec<&str> = s.split('/').collect();
    (2..=3).contains(&parts.len())
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.len() <= 4 && p.chars().all(|c| c.is_ascii_digit()))
}

fn is_phone(s: &str) -> bool {
    let digits = s.chars().filter(|c| c.is_ascii_digit()).count();
    digits >= 10
        && s
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '-' | '.' | '(' | ')' | '+'))
}

fn is_email(s: &str) -> bool {
    match s.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.ends_with('.'),
        None => false,
    }
}

fn is_money_token(s: &str) -> bool {
    s.strip_prefix('$')
        .map(|rest| rest.chars().any(|c| c.is_ascii_digit()))
        .unwrap_or(false)
}

/// Returns the entity kind starting at `words[i]` and how many words it spans.
fn match_entity(words: &[Word<'_>], i: usize) -> Option<(EntityKind, usize)> {
    let lower = words[i].text.to_lowercase();
    let next = words
        .get(i + 1)
        .map(|w| w.text.to_lowercase().replace('.', ""));
    let next = next.as_deref();
    let clock = lower.replace('.', "");

    if lower == "next" && next == Some("week") {
        return Some((EntityKind::Date, 2));
    }
    if DAY_WORDS.contains(&lower.as_str()) || is_numeric_date(&lower) {
        return Some((EntityKind::Date, 1));
    }
    if MONTHS.contains(&lower.as_str()) && next.is_some_and(starts_with_digit) {
        return Some((EntityKind::Date, 2));
    }

    if starts_with_digit(&clock) {
        if let Some(meridiem) = next.filter(|n| is_meridiem(n)) {
            if parse_clock(&format!("{clock} {meridiem}")).is_some() {
                return Some((EntityKind::Time, 2));
            }
        }
        let has_meridiem = clock.ends_with("am") || clock.ends_with("pm");
        if (clock.contains(':') || has_meridiem) && parse_clock(&clock).is_some() {
            return Some((EntityKind::Time, 1));
        }
    }
    if PARTS_OF_DAY.contains(&lower.as_str()) {
        return Some((EntityKind::Time, 1));
    }

    if is_money_token(&lower) {
        return Some((EntityKind::Money, 1));
    }
    if is_number(&lower) && next == Some("dollars") {
        return Some((EntityKind::Money, 2));
    }
    if is_phone(&lower) {
        return Some((EntityKind::PhoneNumber, 1));
    }
    if is_email(&lower) {
        return Some((EntityKind::Email, 1));
    }
    None
}

/// "my name is Dana Scully" → the one or two words after "is".
fn match_person(words: &[Word<'_>], i: usize) -> Option<usize> {
    let is = |idx: usize, s: &str| words.get(idx).is_some_and(|w| w.text.eq_ignore_ascii_case(s));
    if !(is(i, "my") && is(i + 1, "name") && is(i + 2, "is")) {
        return None;
    }

    let first = words.get(i + 3)?;
    if !first.text.chars().all(|c| c.is_alphabetic() || c == '-') {
        return None;
    }
    let second_capitalized = words
        .get(i + 4)
        .is_some_and(|w| w.text.starts_with(|c: char| c.is_uppercase()));
    Some(if second_capitalized { 2 } else { 1 })
}

pub fn extract_entities(text: &str) -> Vec<Entity> {
    let words = split_words(text);
    let mut entities = Vec::new();
    let mut push = |kind: EntityKind, first: &Word<'_>, last: &Word<'_>| {
        entities.push(Entity {
            kind,
            text: text[first.start..last.end].to_string(),
            span: Span {
                start: first.start,
                end: last.end,
            },
        });
    };

    let mut i = 0;
    while i < words.len() {
        if let Some(len) = match_person(&words, i) {
            push(EntityKind::Person, &words[i + 3], &words[i + 2 + len]);
            i += 3 + len;
            continue;
        }
        if let Some((kind, len)) = match_entity(&words, i) {
            push(kind, &words[i], &words[i + len - 1]);
            i += len;
            continue;
        }
        i += 1;
    }
    entities
}
