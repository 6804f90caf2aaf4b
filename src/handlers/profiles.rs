use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use crate::errors::AppError;
use crate::models::{ProfileDocument, ProfileError};
use crate::state::AppState;

#[derive(Serialize)]
pub struct ProfileResponse {
    business_id: String,
    name: String,
    services: Vec<String>,
    faq_count: usize,
    appointments_enabled: bool,
    transfer_enabled: bool,
}

// PUT /businesses/:business_id/profile
pub async fn put_profile(
    State(state): State<Arc<AppState>>,
    Path(business_id): Path<String>,
    Json(doc): Json<ProfileDocument>,
) -> Result<Json<ProfileResponse>, AppError> {
    let profile = state
        .profiles
        .save(&business_id, doc)
        .map_err(|e| match e.downcast::<ProfileError>() {
            Ok(invalid) => AppError::Profile(invalid),
            Err(other) => AppError::Internal(other),
        })?;

    tracing::info!(business_id = %profile.business_id, "business profile saved");

    Ok(Json(ProfileResponse {
        business_id: profile.business_id,
        name: profile.name,
        services: profile.services,
        faq_count: profile.faqs.len(),
        appointments_enabled: profile.appointment.enabled,
        transfer_enabled: profile.transfer.transfer_number.is_some(),
    }))
}
