use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::calendar::{BookingResult, Slot};
use super::profile::BusinessProfile;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Caller,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
    pub timestamp: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Greeting,
    Listening,
    Responding,
    Transferring,
    Ending,
    Ended,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Greeting => "greeting",
            SessionState::Listening => "listening",
            SessionState::Responding => "responding",
            SessionState::Transferring => "transferring",
            SessionState::Ending => "ending",
            SessionState::Ended => "ended",
        }
    }
}

/// How far an in-progress booking has got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftStage {
    NeedDate,
    ChoosingSlot,
    NeedName,
    Ready,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppointmentDraft {
    pub date: Option<String>,
    pub time: Option<String>,
    pub duration_minutes: u32,
    pub service_hint: Option<String>,
    pub offered: Vec<Slot>,
    pub chosen: Option<Slot>,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub confirmed: bool,
}

impl AppointmentDraft {
    pub fn new(duration_minutes: u32) -> Self {
        Self {
            date: None,
            time: None,
            duration_minutes,
            service_hint: None,
            offered: Vec::new(),
            chosen: None,
            customer_name: None,
            customer_email: None,
            customer_phone: None,
            confirmed: false,
        }
    }

    pub fn stage(&self) -> DraftStage {
        match (&self.chosen, &self.customer_name) {
            (Some(_), Some(_)) => DraftStage::Ready,
            (Some(_), None) => DraftStage::NeedName,
            (None, _) if !self.offered.is_empty() => DraftStage::ChoosingSlot,
            (None, _) => DraftStage::NeedDate,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CallSession {
    pub call_id: String,
    pub business_id: String,
    pub caller_number: Option<String>,
    pub profile: Arc<BusinessProfile>,
    pub transcript: Vec<ConversationTurn>,
    pub state: SessionState,
    pub pending_appointment: Option<AppointmentDraft>,
    pub booking: Option<BookingResult>,
    pub transferred: bool,
    pub started_at: NaiveDateTime,
}

impl CallSession {
    pub fn new(
        call_id: &str,
        caller_number: Option<String>,
        profile: Arc<BusinessProfile>,
        started_at: NaiveDateTime,
    ) -> Self {
        Self {
            call_id: call_id.to_string(),
            business_id: profile.business_id.clone(),
            caller_number,
            profile,
            transcript: Vec::new(),
            state: SessionState::Greeting,
            pending_appointment: None,
            booking: None,
            transferred: false,
            started_at,
        }
    }

    pub fn push_turn(&mut self, role: Role, text: &str, timestamp: NaiveDateTime) {
        self.transcript.push(ConversationTurn {
            role,
            text: text.to_string(),
            timestamp,
        });
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CallAction {
    Transfer { number: String },
    EndCall,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpokenReply {
    pub text: String,
    pub audio: Option<Vec<u8>>,
    pub action: Option<CallAction>,
}
