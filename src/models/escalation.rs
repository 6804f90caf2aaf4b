use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    KeywordMatch,
    UrgentIntent,
    ComplaintIntent,
    HighValueAmount,
    RepeatedQuestions,
    RepeatedClarifications,
    None,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::KeywordMatch => "keyword_match",
            ReasonCode::UrgentIntent => "urgent_intent",
            ReasonCode::ComplaintIntent => "complaint_intent",
            ReasonCode::HighValueAmount => "high_value_amount",
            ReasonCode::RepeatedQuestions => "repeated_questions",
            ReasonCode::RepeatedClarifications => "repeated_clarifications",
            ReasonCode::None => "none",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EscalationVerdict {
    pub should_transfer: bool,
    pub reason: ReasonCode,
    /// Human-readable evidence for the decision, for logs and audits.
    pub detail: String,
}

impl EscalationVerdict {
    pub fn transfer(reason: ReasonCode, detail: String) -> Self {
        Self {
            should_transfer: true,
            reason,
            detail,
        }
    }

    pub fn stay() -> Self {
        Self {
            should_transfer: false,
            reason: ReasonCode::None,
            detail: String::new(),
        }
    }
}
