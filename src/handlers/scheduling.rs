use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::{BookingResult, CallerDetails, Slot};
use crate::services::profiles::resolve_profile;
use crate::services::scheduling::SlotWindow;
use crate::state::AppState;

// POST /availability
#[derive(Deserialize)]
pub struct AvailabilityRequest {
    pub business_id: String,
    /// Explicit date range. Without it, `date`/`time` phrases pick the window.
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub duration_minutes: Option<u32>,
}

#[derive(Serialize)]
pub struct AvailabilityResponse {
    pub business_id: String,
    pub slots: Vec<Slot>,
}

pub async fn availability(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AvailabilityRequest>,
) -> Result<Json<AvailabilityResponse>, AppError> {
    let profile = resolve_profile(state.profiles.as_ref(), &req.business_id);
    if !profile.appointment.enabled {
        return Err(AppError::SchedulingDisabled(profile.business_id));
    }

    let slots = match req.start_date {
        Some(start_date) => {
            // Order and span are checked by the scheduler before any calendar lookup.
            let window = SlotWindow {
                start_date,
                end_date: req.end_date.unwrap_or(start_date),
                daily_range: None,
            };
            state
                .scheduler
                .generate_slots(
                    &profile.appointment.calendar_ref,
                    &window,
                    req.duration_minutes
                        .unwrap_or(profile.appointment.duration_minutes),
                    &profile.business_hours,
                )
                .await?
        }
        None => {
            state
                .scheduler
                .suggest_slots(&profile, req.date.as_deref(), req.time.as_deref())
                .await?
        }
    };

    Ok(Json(AvailabilityResponse {
        business_id: profile.business_id,
        slots,
    }))
}

// POST /appointments
#[derive(Deserialize)]
pub struct BookRequest {
    pub business_id: String,
    pub start: NaiveDateTime,
    pub duration_minutes: Option<u32>,
    #[serde(flatten)]
    pub caller: CallerDetails,
}

pub async fn book(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BookRequest>,
) -> Result<(StatusCode, Json<BookingResult>), AppError> {
    let profile = resolve_profile(state.profiles.as_ref(), &req.business_id);
    let duration = req
        .duration_minutes
        .unwrap_or(profile.appointment.duration_minutes);
    if duration == 0 {
        return Err(AppError::InvalidRequest(
            "duration_minutes must be positive".to_string(),
        ));
    }

    let slot = Slot::new(req.start, duration);
    let booking = state
        .scheduler
        .schedule_appointment(&profile, &slot, &req.caller)
        .await?;

    Ok((StatusCode::CREATED, Json(booking)))
}
