use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Form;
use serde::Deserialize;

use crate::errors::AppError;
use crate::models::{CallAction, SpokenReply};
use crate::services::conversation::Utterance;
use crate::services::profiles::resolve_profile;
use crate::state::AppState;

const GATHER_PATH: &str = "/webhook/voice/gather";
const APOLOGY: &str = "I'm sorry, something went wrong on our end. Please call again later.";

/// Call statuses after which Twilio will not send anything else for the call.
const FINAL_STATUSES: [&str; 5] = ["completed", "busy", "failed", "no-answer", "canceled"];

#[derive(Deserialize)]
pub struct BusinessQuery {
    pub business_id: Option<String>,
}

#[derive(Deserialize)]
pub struct IncomingCallForm {
    #[serde(rename = "CallSid")]
    pub call_sid: String,
    #[serde(rename = "From")]
    pub from: Option<String>,
}

#[derive(Deserialize)]
pub struct GatherForm {
    #[serde(rename = "CallSid")]
    pub call_sid: String,
    #[serde(rename = "SpeechResult")]
    pub speech_result: Option<String>,
}

#[derive(Deserialize)]
pub struct StatusForm {
    #[serde(rename = "CallSid")]
    pub call_sid: String,
    #[serde(rename = "CallStatus")]
    pub call_status: String,
    #[serde(rename = "CallDuration")]
    pub call_duration: Option<String>,
    #[serde(rename = "RecordingUrl")]
    pub recording_url: Option<String>,
}

// ── TwiML ──

pub fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Speaks the reply and then listens, transfers or hangs up depending on its action.
pub fn reply_twiml(reply: &SpokenReply) -> String {
    let say = format!("<Say>{}</Say>", xml_escape(&reply.text));
    let body = match &reply.action {
        None => format!(
            "<Gather input=\"speech\" action=\"{GATHER_PATH}\" method=\"POST\" speechTimeout=\"auto\">{say}</Gather>\
             <Redirect method=\"POST\">{GATHER_PATH}</Redirect>"
        ),
        Some(CallAction::Transfer { number }) => {
            format!("{say}<Dial>{}</Dial>", xml_escape(number))
        }
        Some(CallAction::EndCall) => format!("{say}<Hangup/>"),
    };
    format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response>{body}</Response>")
}

fn hangup_twiml(text: Option<&str>) -> String {
    let say = text
        .map(|t| format!("<Say>{}</Say>", xml_escape(t)))
        .unwrap_or_default();
    format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response>{say}<Hangup/></Response>")
}

fn twiml(body: String) -> Response {
    ([(header::CONTENT_TYPE, "application/xml")], body).into_response()
}

fn error_twiml(call_sid: &str, err: AppError) -> Response {
    match err {
        AppError::SessionNotFound(_) | AppError::CallEnded(_) => {
            tracing::info!(call_id = call_sid, error = %err, "voice webhook for a finished call");
            twiml(hangup_twiml(None))
        }
        other => {
            tracing::error!(call_id = call_sid, error = %other, "voice webhook failed");
            twiml(hangup_twiml(Some(APOLOGY)))
        }
    }
}

// POST /webhook/voice
pub async fn incoming_call(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BusinessQuery>,
    Form(form): Form<IncomingCallForm>,
) -> Response {
    let business_id = query
        .business_id
        .unwrap_or_else(|| state.config.default_business_id.clone());
    tracing::info!(call_id = %form.call_sid, business_id = %business_id, "incoming voice call");

    let profile = resolve_profile(state.profiles.as_ref(), &business_id);
    match state
        .engine
        .start(&form.call_sid, form.from, Arc::new(profile))
        .await
    {
        Ok(reply) => twiml(reply_twiml(&reply)),
        Err(e) => error_twiml(&form.call_sid, e),
    }
}

// POST /webhook/voice/gather
pub async fn gather(State(state): State<Arc<AppState>>, Form(form): Form<GatherForm>) -> Response {
    let utterance = Utterance {
        text: form.speech_result,
        audio: None,
    };
    match state.engine.handle_utterance(&form.call_sid, utterance).await {
        Ok(reply) => twiml(reply_twiml(&reply)),
        Err(e) => error_twiml(&form.call_sid, e),
    }
}

// POST /webhook/voice/status
pub async fn status(State(state): State<Arc<AppState>>, Form(form): Form<StatusForm>) -> Response {
    if !FINAL_STATUSES.contains(&form.call_status.as_str()) {
        tracing::debug!(call_id = %form.call_sid, status = %form.call_status, "call status update");
        return twiml("<Response></Response>".to_string());
    }

    let duration = form
        .call_duration
        .as_deref()
        .and_then(|d| d.trim().parse().ok())
        .unwrap_or(0);

    match state
        .engine
        .end(&form.call_sid, duration, form.recording_url)
        .await
    {
        Ok(summary) => {
            tracing::info!(
                call_id = %summary.call_id,
                status = %form.call_status,
                action_required = summary.action_required,
                "call closed by telephony status"
            );
        }
        Err(AppError::SessionNotFound(_)) => {
            tracing::debug!(call_id = %form.call_sid, "status for unknown or already closed call");
        }
        Err(e) => {
            tracing::error!(call_id = %form.call_sid, error = %e, "failed to close call");
        }
    }

    twiml("<Response></Response>".to_string())
}
