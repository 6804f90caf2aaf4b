pub mod calls;
pub mod health;
pub mod profiles;
pub mod scheduling;
pub mod voice;

use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/calls", post(calls::start_call))
        .route("/calls/:call_id/utterance", post(calls::utterance))
        .route("/calls/:call_id/end", post(calls::end_call))
        .route("/calls/:call_id/summary", get(calls::get_summary))
        .route("/availability", post(scheduling::availability))
        .route("/appointments", post(scheduling::book))
        .route("/businesses/:business_id/profile", put(profiles::put_profile))
        .route("/businesses/:business_id/follow-ups", get(calls::follow_ups))
        .route("/webhook/voice", post(voice::incoming_call))
        .route("/webhook/voice/gather", post(voice::gather))
        .route("/webhook/voice/status", post(voice::status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
