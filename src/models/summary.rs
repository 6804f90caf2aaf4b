use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::calendar::BookingResult;
use super::profile::NotificationSettings;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActionCategory {
    Callback,
    HumanRequest,
    Dissatisfaction,
    PriceQuote,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionItem {
    pub category: ActionCategory,
    pub action: String,
    pub priority: Priority,
    /// Transcript excerpt around the phrase that triggered the item.
    pub context: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallSummary {
    pub call_id: String,
    pub business_id: String,
    pub caller_number: Option<String>,
    pub duration_seconds: u64,
    pub recording_ref: Option<String>,
    pub summary: String,
    pub transcript: String,
    pub action_required: bool,
    pub action_items: Vec<ActionItem>,
    pub transferred: bool,
    pub booking: Option<BookingResult>,
    pub notification: NotificationSettings,
    pub ended_at: NaiveDateTime,
}
