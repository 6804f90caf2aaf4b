use crate::models::{
    BusinessProfile, ConversationTurn, EntityKind, EscalationVerdict, IntentName, NluResult,
    ReasonCode, Role,
};

/// Assistant phrases that count as asking the caller to clarify.
pub const CLARIFICATION_PHRASES: [&str; 5] = [
    "could you clarify",
    "i'm not sure i understood",
    "could you please explain",
    "i didn't quite catch",
    "could you be more specific",
];

#[derive(Debug, Clone, PartialEq)]
pub struct EscalationThresholds {
    pub urgent_confidence: f32,
    pub complaint_confidence: f32,
    pub high_value_amount: f64,
    pub question_limit: usize,
    pub clarification_limit: usize,
}

impl Default for EscalationThresholds {
    fn default() -> Self {
        Self {
            urgent_confidence: 0.6,
            complaint_confidence: 0.7,
            high_value_amount: 1000.0,
            question_limit: 3,
            clarification_limit: 2,
        }
    }
}

/// Decides whether the current turn should be routed to a human.
///
/// Checks run in a fixed order and the first hit wins: configured keyword in the
/// utterance, urgent intent, complaint intent, a large money amount, too many caller
/// questions, too many assistant clarification requests.
pub fn evaluate(
    transcript: &[ConversationTurn],
    profile: &BusinessProfile,
    nlu: &NluResult,
    thresholds: &EscalationThresholds,
) -> EscalationVerdict {
    let utterance = nlu.text.to_lowercase();
    if let Some(keyword) = profile
        .transfer
        .keywords
        .iter()
        .find(|k| utterance.contains(&k.to_lowercase()))
    {
        return EscalationVerdict::transfer(
            ReasonCode::KeywordMatch,
            format!("utterance contains transfer keyword '{keyword}'"),
        );
    }

    let intent = nlu.intent;
    if intent.name == IntentName::UrgentRequest && intent.confidence > thresholds.urgent_confidence
    {
        return EscalationVerdict::transfer(
            ReasonCode::UrgentIntent,
            format!("urgent request with confidence {:.2}", intent.confidence),
        );
    }

    if intent.name == IntentName::Complaint && intent.confidence > thresholds.complaint_confidence {
        return EscalationVerdict::transfer(
            ReasonCode::ComplaintIntent,
            format!("complaint with confidence {:.2}", intent.confidence),
        );
    }

    let large_amount = nlu
        .entities
        .iter()
        .filter(|e| e.kind == EntityKind::Money)
        .filter_map(|e| parse_amount(&e.text))
        .find(|amount| *amount > thresholds.high_value_amount);
    if let Some(amount) = large_amount {
        return EscalationVerdict::transfer(
            ReasonCode::HighValueAmount,
            format!("caller mentioned an amount of {amount:.2}"),
        );
    }

    let questions = transcript
        .iter()
        .filter(|t| t.role == Role::Caller && t.text.contains('?'))
        .count();
    if questions >= thresholds.question_limit {
        return EscalationVerdict::transfer(
            ReasonCode::RepeatedQuestions,
            format!("caller asked {questions} questions"),
        );
    }

    let clarifications = transcript
        .iter()
        .filter(|t| t.role == Role::Assistant && is_clarification(&t.text))
        .count();
    if clarifications >= thresholds.clarification_limit {
        return EscalationVerdict::transfer(
            ReasonCode::RepeatedClarifications,
            format!("assistant asked for clarification {clarifications} times"),
        );
    }

    EscalationVerdict::stay()
}

fn is_clarification(text: &str) -> bool {
    let lower = text.to_lowercase();
    CLARIFICATION_PHRASES.iter().any(|p| lower.contains(p))
}

/// Parses "$1,500", "1500 dollars", "€2,000.50". `None` when nothing numeric remains.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let lower = raw.trim().to_lowercase();
    let numeric = lower
        .split("dollars")
        .next()
        .unwrap_or_default()
        .chars()
        .filter(|c| !matches!(c, '$' | '€' | '£' | '¥' | ','))
        .collect::<String>();

    numeric
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}
