use chrono::NaiveDateTime;

use crate::models::{
    ActionCategory, ActionItem, CallSession, CallSummary, ConversationTurn, Priority, Role,
};

/// Characters of transcript kept on each side of a trigger phrase.
const SNIPPET_RADIUS: usize = 40;

/// Transcripts shorter than this are summarized as a brief call.
const BRIEF_CALL_WORDS: usize = 50;

struct ActionRule {
    category: ActionCategory,
    action: &'static str,
    priority: Priority,
    /// Any of these phrases triggers the rule.
    any_of: &'static [&'static str],
    /// All of these must also appear somewhere in the transcript.
    all_of: &'static [&'static str],
}

const ACTION_RULES: [ActionRule; 4] = [
    ActionRule {
        category: ActionCategory::Callback,
        action: "Call customer back",
        priority: Priority::High,
        any_of: &["call me back", "get back to me"],
        all_of: &[],
    },
    ActionRule {
        category: ActionCategory::HumanRequest,
        action: "Have a staff member call customer",
        priority: Priority::Medium,
        any_of: &["speak to a person", "speak to someone", "talk to a human"],
        all_of: &[],
    },
    ActionRule {
        category: ActionCategory::Dissatisfaction,
        action: "Address customer complaint",
        priority: Priority::High,
        any_of: &["complaint", "not satisfied", "unhappy"],
        all_of: &[],
    },
    ActionRule {
        category: ActionCategory::PriceQuote,
        action: "Provide price quote",
        priority: Priority::Medium,
        any_of: &["quote"],
        all_of: &["price"],
    },
];

pub fn format_transcript(turns: &[ConversationTurn]) -> String {
    turns
        .iter()
        .map(|t| {
            let who = match t.role {
                Role::Assistant => "AI",
                Role::Caller => "Caller",
            };
            format!("{who}: {}", t.text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn summarize(session: &CallSession, transcript: &str) -> String {
    let lower = transcript.to_lowercase();
    let words = transcript.split_whitespace().count();

    let mut summary = if let Some(booking) = &session.booking {
        format!(
            "Customer called to schedule an appointment. Booked for {}.",
            booking.start.format("%A, %B %-d at %-I:%M %p")
        )
    } else if words < BRIEF_CALL_WORDS {
        "Brief call with customer asking initial questions. No specific requests were made."
            .to_string()
    } else if lower.contains("appointment") {
        "Customer called about an appointment. No booking was completed during the call."
            .to_string()
    } else if lower.contains("price") || lower.contains("cost") {
        "Customer inquired about pricing information.".to_string()
    } else {
        "Customer called seeking information about services.".to_string()
    };

    if session.transferred {
        summary.push_str(" The call was transferred to a staff member.");
    }
    summary
}

/// One item per matching rule, in rule order, with the text around the first trigger.
pub fn action_items(transcript: &str) -> Vec<ActionItem> {
    // ASCII lowercasing keeps byte offsets aligned with `transcript`.
    let lower = transcript.to_ascii_lowercase();

    ACTION_RULES
        .iter()
        .filter(|rule| rule.all_of.iter().all(|p| lower.contains(p)))
        .filter_map(|rule| {
            let (pos, phrase) = rule
                .any_of
                .iter()
                .filter_map(|p| lower.find(p).map(|pos| (pos, *p)))
                .min_by_key(|(pos, _)| *pos)?;
            Some(ActionItem {
                category: rule.category,
                action: rule.action.to_string(),
                priority: rule.priority,
                context: snippet(transcript, pos, phrase.len()),
            })
        })
        .collect()
}

fn snippet(text: &str, pos: usize, len: usize) -> String {
    let mut start = pos.saturating_sub(SNIPPET_RADIUS);
    while !text.is_char_boundary(start) {
        start -= 1;
    }
    let mut end = (pos + len + SNIPPET_RADIUS).min(text.len());
    while !text.is_char_boundary(end) {
        end += 1;
    }
    text[start..end].replace('\n', " ").trim().to_string()
}

pub fn build_summary(
    session: &CallSession,
    duration_seconds: u64,
    recording_ref: Option<String>,
    ended_at: NaiveDateTime,
) -> CallSummary {
    let transcript = format_transcript(&session.transcript);
    let action_items = action_items(&transcript);

    CallSummary {
        call_id: session.call_id.clone(),
        business_id: session.business_id.clone(),
        caller_number: session.caller_number.clone(),
        duration_seconds,
        recording_ref,
        summary: summarize(session, &transcript),
        action_required: !action_items.is_empty(),
        action_items,
        transcript,
        transferred: session.transferred,
        booking: session.booking.clone(),
        notification: session.profile.notification.clone(),
        ended_at,
    }
}
