use chrono::{Duration, Timelike};

use crate::models::{BusinessProfile, CallAction, Faq, Slot};
use crate::services::scheduling::find_clock;

pub const REPEAT_PROMPT: &str = "I'm sorry, I couldn't understand that. Could you please repeat?";

pub const FALLBACK_REPLY: &str = "I'm not sure I understood that correctly. Could you please rephrase or let me know how else I can assist you today?";

pub const HANDLER_FAILURE_REPLY: &str = "I'm sorry, I'm having trouble with that right now. Is there anything else I can help you with?";

/// Minimum share of an FAQ question's words the caller must use.
const FAQ_MATCH_THRESHOLD: f64 = 0.3;

/// Text to speak plus an optional instruction for the telephony layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub text: String,
    pub action: Option<CallAction>,
}

impl Reply {
    pub fn say(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            action: None,
        }
    }

    pub fn with_action(text: impl Into<String>, action: CallAction) -> Self {
        Self {
            text: text.into(),
            action: Some(action),
        }
    }
}

// ── Intent replies ──

pub fn greeting() -> Reply {
    Reply::say("Hello! How can I assist you today?")
}

pub fn business_hours(profile: &BusinessProfile) -> Reply {
    if profile.business_hours.is_empty() {
        return Reply::say("I'm sorry, I don't have information about our business hours. Would you like me to take a message for someone to get back to you?");
    }
    Reply::say(format!(
        "Our business hours are: {}.",
        profile.business_hours.to_human_readable()
    ))
}

pub fn service_inquiry(profile: &BusinessProfile) -> Reply {
    if profile.services.is_empty() {
        return Reply::say("I'm sorry, I don't have detailed information about our services. Would you like me to take a message for someone to get back to you?");
    }
    Reply::say(format!(
        "We offer the following services: {}. Would you like more information about any specific service?",
        profile.services.join(", ")
    ))
}

pub fn pricing() -> Reply {
    Reply::say("Our pricing varies depending on the specific service you're interested in. Would you like me to take your contact information so someone can provide you with a detailed quote?")
}

pub fn complaint() -> Reply {
    Reply::say("I'm sorry to hear you're experiencing an issue. I'd like to make sure this gets addressed properly. Could you provide me with some details about your concern, and I'll make sure the right person gets back to you as soon as possible.")
}

pub fn urgent_request() -> Reply {
    Reply::say("I understand this is urgent. Let me collect some information so we can address this right away. Could you briefly describe the situation and provide your contact details?")
}

pub fn general_question(profile: &BusinessProfile, question: &str) -> Reply {
    match match_faq(&profile.faqs, question) {
        Some(faq) => Reply::say(faq.answer.clone()),
        None => Reply::say("I don't have a specific answer to that question. Would you like me to take a message for someone to get back to you with more information?"),
    }
}

pub fn contact_request() -> Reply {
    Reply::say("I'd be happy to have someone contact you. Could you please provide your name, phone number, and a brief message about what you'd like to discuss?")
}

pub fn goodbye() -> Reply {
    Reply::with_action(
        "Thank you for calling. Have a great day!",
        CallAction::EndCall,
    )
}

pub fn fallback() -> Reply {
    Reply::say(FALLBACK_REPLY)
}

pub fn transfer(profile: &BusinessProfile, number: &str) -> Reply {
    Reply::with_action(
        format!(
            "I'll transfer you to a representative at {} who can help you with this. Please hold while I connect you.",
            profile.name
        ),
        CallAction::Transfer {
            number: number.to_string(),
        },
    )
}

// ── Booking replies ──

pub fn booking_unavailable() -> Reply {
    Reply::say("I'm sorry, I can't book appointments over the phone for this business. Would you like me to take a message for someone to get back to you?")
}

pub fn ask_for_day() -> Reply {
    Reply::say("I'd be happy to help you schedule an appointment. What day and time works best for you?")
}

pub fn offer_slots(slots: &[Slot]) -> Reply {
    Reply::say(format!(
        "I have the following times available: {}. Which one works best for you?",
        spoken_list(&slots.iter().map(Slot::describe).collect::<Vec<_>>())
    ))
}

pub fn no_slots(when: Option<&str>) -> Reply {
    let when = when.unwrap_or("the coming week");
    Reply::say(format!(
        "I'm sorry, I don't see any open times for {when}. Is there another day that works for you?"
    ))
}

pub fn repeat_offer(slots: &[Slot]) -> Reply {
    Reply::say(format!(
        "Which of those times would you like? The options are {}.",
        spoken_list(&slots.iter().map(Slot::describe).collect::<Vec<_>>())
    ))
}

pub fn ask_for_name(slot: &Slot) -> Reply {
    Reply::say(format!(
        "Great, {} it is. May I have your name for the appointment?",
        slot.describe()
    ))
}

pub fn ask_for_name_again() -> Reply {
    Reply::say("Sorry, I didn't get your name. Could you tell me your first and last name for the appointment?")
}

pub fn slot_taken(alternatives: &[Slot]) -> Reply {
    if alternatives.is_empty() {
        return Reply::say("I'm sorry, that time was just taken and I don't see anything else open then. Is there another day that works for you?");
    }
    Reply::say(format!(
        "I'm sorry, that time was just taken. I can still offer {}. Which one works best for you?",
        spoken_list(&alternatives.iter().map(Slot::describe).collect::<Vec<_>>())
    ))
}

pub fn booked(name: &str, slot: &Slot) -> Reply {
    Reply::say(format!(
        "You're all set, {name}. Your appointment is booked for {}. Is there anything else I can help you with?",
        slot.describe()
    ))
}

pub fn booking_abandoned() -> Reply {
    Reply::say("No problem, I won't book anything. Is there anything else I can help you with?")
}

/// "a", "a or b", "a, b, or c"
fn spoken_list(items: &[String]) -> String {
    match items {
        [] => String::new(),
        [one] => one.clone(),
        [a, b] => format!("{a} or {b}"),
        [rest @ .., last] => format!("{}, or {last}", rest.join(", ")),
    }
}

// ── Matching helpers ──

fn word_set(text: &str) -> std::collections::HashSet<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// FAQ whose question shares the largest share of its words with `question`.
/// Ties go to the earlier FAQ.
pub fn match_faq<'a>(faqs: &'a [Faq], question: &str) -> Option<&'a Faq> {
    let asked = word_set(question);
    let mut best: Option<(&Faq, f64)> = None;

    for faq in faqs {
        let words = word_set(&faq.question);
        if words.is_empty() {
            continue;
        }
        let score = words.intersection(&asked).count() as f64 / words.len() as f64;
        if score > FAQ_MATCH_THRESHOLD && best.map_or(true, |(_, s)| score > s) {
            best = Some((faq, score));
        }
    }
    best.map(|(faq, _)| faq)
}

const ORDINALS: [(&str, usize); 10] = [
    ("first", 0),
    ("1st", 0),
    ("second", 1),
    ("2nd", 1),
    ("third", 2),
    ("3rd", 2),
    ("fourth", 3),
    ("4th", 3),
    ("fifth", 4),
    ("5th", 4),
];

const AFFIRMATIVES: [&str; 7] = ["yes", "yeah", "sure", "ok", "okay", "works", "perfect"];

/// Words a caller says around a name but never as one.
const NOT_A_NAME: &[&str] = &[
    "yes", "yeah", "yep", "yup", "no", "nope", "sure", "ok", "okay", "alright", "fine", "good",
    "great", "perfect", "works", "sounds", "right", "correct", "cool", "please", "thanks",
    "thank", "you", "sorry", "hello", "hi", "hey", "bye", "goodbye", "um", "uh", "that", "this",
    "it", "the", "a", "an", "and", "i", "me", "my", "is", "what", "appointment", "book", "time",
];

const NAME_PREFIXES: [&str; 7] = ["my name is", "this is", "it's", "it is", "i'm", "i am", "name's"];

fn words_of(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// Which offered slot the caller picked: by position, by clock time, or a plain
/// "yes" when only one was offered.
pub fn pick_offered_slot(text: &str, offered: &[Slot]) -> Option<Slot> {
    let words = words_of(text);

    for (word, index) in ORDINALS {
        if words.iter().any(|w| w == word) {
            return offered.get(index).cloned();
        }
    }
    if words.iter().any(|w| w == "last") {
        return offered.last().cloned();
    }

    if let Some(t) = find_clock(text) {
        let afternoon = (t.hour() < 12).then(|| t + Duration::hours(12));
        return offered
            .iter()
            .find(|s| s.start.time() == t)
            .or_else(|| afternoon.and_then(|pm| offered.iter().find(|s| s.start.time() == pm)))
            .cloned();
    }

    if offered.len() == 1 && words.iter().any(|w| AFFIRMATIVES.contains(&w.as_str())) {
        return offered.first().cloned();
    }
    None
}

pub fn is_abandon(text: &str) -> bool {
    let lower = text.to_lowercase();
    ["never mind", "nevermind", "cancel", "forget it", "don't book"]
        .iter()
        .any(|p| lower.contains(p))
}

/// Name from a bare answer like "Dana Scully" or "it's dana". Collection stops at the
/// first filler word, so "Dana, thanks" is "Dana" and "yes please" is no name at all.
pub fn name_from_reply(text: &str) -> Option<String> {
    let text = text.trim();
    let lower = text.to_lowercase();
    let mut rest = text;
    for prefix in NAME_PREFIXES {
        let whole_words = lower
            .strip_prefix(prefix)
            .is_some_and(|after| after.is_empty() || after.starts_with(|c: char| !c.is_alphanumeric()));
        if whole_words {
            rest = text.get(prefix.len()..).unwrap_or_default().trim();
            break;
        }
    }

    let words: Vec<String> = rest
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphabetic() && c != '-' && c != '\''))
        .take_while(|w| {
            !w.is_empty()
                && w.chars().all(|c| c.is_alphabetic() || c == '-' || c == '\'')
                && !NOT_A_NAME.contains(&w.to_lowercase().as_str())
        })
        .take(3)
        .map(capitalize)
        .collect();

    (!words.is_empty()).then(|| words.join(" "))
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
