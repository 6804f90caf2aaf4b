use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::services::escalation::EscalationThresholds;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NluBackend {
    Keyword,
    Llm,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CalendarBackend {
    Local,
    Http,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub nlu_provider: NluBackend,
    pub llm_provider: String,
    pub ollama_url: String,
    pub ollama_model: String,
    pub groq_api_key: String,
    pub groq_model: String,
    /// Empty means text-only calls (the telephony layer does STT/TTS).
    pub speech_url: String,
    pub calendar_backend: CalendarBackend,
    pub calendar_service_url: String,
    pub twilio_account_sid: String,
    pub twilio_auth_token: String,
    pub twilio_phone_number: String,
    pub default_business_id: String,
    pub collaborator_timeout: Duration,
    pub escalation: EscalationThresholds,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: parsed("PORT").unwrap_or(3000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "frontdesk.db".to_string()),
            nlu_provider: match env::var("NLU_PROVIDER").as_deref() {
                Ok("llm") => NluBackend::Llm,
                _ => NluBackend::Keyword,
            },
            llm_provider: env::var("LLM_PROVIDER").unwrap_or_else(|_| "ollama".to_string()),
            ollama_url: env::var("OLLAMA_URL")
                .unwrap_or_else(|_| "http://localhost:11434".to_string()),
            ollama_model: env::var("OLLAMA_MODEL").unwrap_or_else(|_| "llama3.2".to_string()),
            groq_api_key: env::var("GROQ_API_KEY").unwrap_or_default(),
            groq_model: env::var("GROQ_MODEL")
                .unwrap_or_else(|_| "llama-3.3-70b-versatile".to_string()),
            speech_url: env::var("SPEECH_URL").unwrap_or_default(),
            calendar_backend: match env::var("CALENDAR_BACKEND").as_deref() {
                Ok("http") => CalendarBackend::Http,
                _ => CalendarBackend::Local,
            },
            calendar_service_url: env::var("CALENDAR_SERVICE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            twilio_account_sid: env::var("TWILIO_ACCOUNT_SID").unwrap_or_default(),
            twilio_auth_token: env::var("TWILIO_AUTH_TOKEN").unwrap_or_default(),
            twilio_phone_number: env::var("TWILIO_PHONE_NUMBER").unwrap_or_default(),
            default_business_id: env::var("DEFAULT_BUSINESS_ID")
                .unwrap_or_else(|_| "default".to_string()),
            collaborator_timeout: Duration::from_millis(
                parsed("COLLABORATOR_TIMEOUT_MS").unwrap_or(5000),
            ),
            escalation: thresholds_from_env(),
        }
    }

    pub fn sms_enabled(&self) -> bool {
        !self.twilio_account_sid.is_empty()
            && !self.twilio_auth_token.is_empty()
            && !self.twilio_phone_number.is_empty()
    }
}

fn parsed<T: FromStr>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable setting");
            None
        }
    }
}

fn thresholds_from_env() -> EscalationThresholds {
    let defaults = EscalationThresholds::default();
    EscalationThresholds {
        urgent_confidence: parsed("ESCALATION_URGENT_CONFIDENCE")
            .unwrap_or(defaults.urgent_confidence),
        complaint_confidence: parsed("ESCALATION_COMPLAINT_CONFIDENCE")
            .unwrap_or(defaults.complaint_confidence),
        high_value_amount: parsed("ESCALATION_HIGH_VALUE_AMOUNT")
            .unwrap_or(defaults.high_value_amount),
        question_limit: parsed("ESCALATION_QUESTION_LIMIT").unwrap_or(defaults.question_limit),
        clarification_limit: parsed("ESCALATION_CLARIFICATION_LIMIT")
            .unwrap_or(defaults.clarification_limit),
    }
}
