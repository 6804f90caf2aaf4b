use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IntentName {
    Greeting,
    AppointmentScheduling,
    BusinessHours,
    ServiceInquiry,
    Pricing,
    Complaint,
    UrgentRequest,
    GeneralQuestion,
    ContactRequest,
    Goodbye,
    #[serde(other)]
    Fallback,
}

impl IntentName {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentName::Greeting => "greeting",
            IntentName::AppointmentScheduling => "appointment_scheduling",
            IntentName::BusinessHours => "business_hours",
            IntentName::ServiceInquiry => "service_inquiry",
            IntentName::Pricing => "pricing",
            IntentName::Complaint => "complaint",
            IntentName::UrgentRequest => "urgent_request",
            IntentName::GeneralQuestion => "general_question",
            IntentName::ContactRequest => "contact_request",
            IntentName::Goodbye => "goodbye",
            IntentName::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Intent {
    pub name: IntentName,
    pub confidence: f32,
}

impl Intent {
    pub fn fallback() -> Self {
        Self {
            name: IntentName::Fallback,
            confidence: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityKind {
    Person,
    Date,
    Time,
    PhoneNumber,
    Email,
    Service,
    Location,
    Organization,
    Money,
    #[serde(other)]
    Other,
}

/// Byte offsets into the utterance text.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entity {
    #[serde(rename = "type")]
    pub kind: EntityKind,
    pub text: String,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NluResult {
    pub text: String,
    pub intent: Intent,
    #[serde(default)]
    pub entities: Vec<Entity>,
}

impl NluResult {
    pub fn fallback(text: &str) -> Self {
        Self {
            text: text.to_string(),
            intent: Intent::fallback(),
            entities: Vec::new(),
        }
    }

    pub fn first(&self, kind: EntityKind) -> Option<&Entity> {
        self.entities.iter().find(|e| e.kind == kind)
    }
}
