use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{CallAction, CallSummary, SpokenReply};
use crate::services::conversation::Utterance;
use crate::services::profiles::resolve_profile;
use crate::state::AppState;

#[derive(Serialize)]
pub struct ReplyResponse {
    pub call_id: String,
    pub text: String,
    /// Base64-encoded synthesized speech, when a speech service is configured.
    pub audio: Option<String>,
    pub action: Option<CallAction>,
}

impl ReplyResponse {
    fn new(call_id: String, reply: SpokenReply) -> Self {
        Self {
            call_id,
            text: reply.text,
            audio: reply
                .audio
                .map(|a| base64::engine::general_purpose::STANDARD.encode(a)),
            action: reply.action,
        }
    }
}

// POST /calls
#[derive(Deserialize)]
pub struct StartCallRequest {
    pub call_id: Option<String>,
    pub business_id: Option<String>,
    pub caller_number: Option<String>,
}

pub async fn start_call(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StartCallRequest>,
) -> Result<(StatusCode, Json<ReplyResponse>), AppError> {
    let call_id = req
        .call_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let business_id = req
        .business_id
        .unwrap_or_else(|| state.config.default_business_id.clone());

    let profile = resolve_profile(state.profiles.as_ref(), &business_id);
    let reply = state
        .engine
        .start(&call_id, req.caller_number, Arc::new(profile))
        .await?;

    Ok((StatusCode::CREATED, Json(ReplyResponse::new(call_id, reply))))
}

// POST /calls/:call_id/utterance
#[derive(Deserialize)]
pub struct UtteranceRequest {
    pub text: Option<String>,
    /// Base64-encoded caller audio.
    pub audio: Option<String>,
}

pub async fn utterance(
    State(state): State<Arc<AppState>>,
    Path(call_id): Path<String>,
    Json(req): Json<UtteranceRequest>,
) -> Result<Json<ReplyResponse>, AppError> {
    let audio = req
        .audio
        .map(|a| base64::engine::general_purpose::STANDARD.decode(a.trim()))
        .transpose()
        .map_err(|e| AppError::InvalidRequest(format!("audio is not valid base64: {e}")))?;

    let reply = state
        .engine
        .handle_utterance(
            &call_id,
            Utterance {
                text: req.text,
                audio,
            },
        )
        .await?;

    Ok(Json(ReplyResponse::new(call_id, reply)))
}

// POST /calls/:call_id/end
#[derive(Deserialize, Default)]
pub struct EndCallRequest {
    #[serde(default)]
    pub duration_seconds: u64,
    pub recording_ref: Option<String>,
}

pub async fn end_call(
    State(state): State<Arc<AppState>>,
    Path(call_id): Path<String>,
    Json(req): Json<EndCallRequest>,
) -> Result<Json<CallSummary>, AppError> {
    let summary = state
        .engine
        .end(&call_id, req.duration_seconds, req.recording_ref)
        .await?;
    Ok(Json(summary))
}

// GET /calls/:call_id/summary
pub async fn get_summary(
    State(state): State<Arc<AppState>>,
    Path(call_id): Path<String>,
) -> Result<Json<CallSummary>, AppError> {
    let summary = {
        let db = state.db.lock().unwrap();
        queries::get_call_summary(&db, &call_id)?
    };
    summary
        .map(Json)
        .ok_or(AppError::SessionNotFound(call_id))
}

// GET /businesses/:business_id/follow-ups
#[derive(Serialize)]
pub struct FollowUpsResponse {
    pub business_id: String,
    pub action_required: i64,
}

pub async fn follow_ups(
    State(state): State<Arc<AppState>>,
    Path(business_id): Path<String>,
) -> Result<Json<FollowUpsResponse>, AppError> {
    let action_required = {
        let db = state.db.lock().unwrap();
        queries::count_action_required(&db, &business_id)?
    };
    Ok(Json(FollowUpsResponse {
        business_id,
        action_required,
    }))
}
