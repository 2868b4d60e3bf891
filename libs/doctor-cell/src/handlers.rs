use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::SupabaseError;
use shared_models::auth::{User, ROLE_CLINIC, ROLE_DOCTOR};
use shared_models::error::AppError;
use shared_utils::extractor::require_role;

use crate::models::{
    AvailabilityQuery, AvailableSlotsResponse, WeeklySchedule, WorkingHoursError,
    WorkingHoursPayload,
};
use crate::services::{AvailabilityService, WorkingHoursService};

impl From<WorkingHoursError> for AppError {
    fn from(err: WorkingHoursError) -> Self {
        match err {
            WorkingHoursError::DoctorNotFound(_) => AppError::NotFound("Doctor not found".to_string()),
            WorkingHoursError::InvalidScheduleFormat(_) | WorkingHoursError::InvalidWindow { .. } => {
                AppError::ValidationError(err.to_string())
            }
        }
    }
}

/// Maps service failures onto HTTP errors, recovering typed causes first.
pub fn service_error(err: anyhow::Error) -> AppError {
    if let Some(e) = err.downcast_ref::<WorkingHoursError>() {
        return e.clone().into();
    }
    match err.downcast_ref::<SupabaseError>() {
        Some(SupabaseError::Auth(msg)) => AppError::Forbidden(msg.clone()),
        Some(SupabaseError::NotFound(msg)) => AppError::NotFound(msg.clone()),
        Some(e) => AppError::Database(e.to_string()),
        None => AppError::Internal(err.to_string()),
    }
}

pub fn parse_doctor_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::BadRequest("Invalid doctor id".to_string()))
}

// ==============================================================================
// PUBLIC HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_working_hours_public(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<String>,
) -> Result<Json<WeeklySchedule>, AppError> {
    let doctor_id = parse_doctor_id(&doctor_id)?;
    let service = WorkingHoursService::new(&state);

    let schedule = service.get_working_hours(&doctor_id.to_string(), None).await
        .map_err(service_error)?;

    Ok(Json(schedule))
}

#[axum::debug_handler]
pub async fn get_available_slots_public(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<String>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<AvailableSlotsResponse>, AppError> {
    let doctor_id = parse_doctor_id(&doctor_id)?.to_string();
    let service = AvailabilityService::new(&state);

    let slots = service.get_available_slots(&doctor_id, query.date, None).await
        .map_err(service_error)?;

    Ok(Json(AvailableSlotsResponse {
        doctor_id,
        date: query.date,
        total_slots: slots.len(),
        available_slots: slots,
    }))
}

// ==============================================================================
// PROTECTED HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_my_working_hours(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<WorkingHoursPayload>, AppError> {
    require_role(&user, ROLE_DOCTOR)?;
    let service = WorkingHoursService::new(&state);

    let schedule = service.get_working_hours(&user.id, Some(auth.token())).await
        .map_err(service_error)?;

    Ok(Json(WorkingHoursPayload { working_hours: schedule }))
}

#[axum::debug_handler]
pub async fn set_my_working_hours(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(payload): Json<WorkingHoursPayload>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, ROLE_DOCTOR)?;
    let service = WorkingHoursService::new(&state);

    let schedule = service.set_working_hours(&user.id, payload.working_hours, auth.token()).await
        .map_err(service_error)?;

    Ok(Json(json!({
        "message": "Working hours saved",
        "working_hours": schedule
    })))
}

/// Clinic staff setting hours on a doctor's behalf.
#[axum::debug_handler]
pub async fn set_doctor_working_hours(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<String>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(payload): Json<WorkingHoursPayload>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, ROLE_CLINIC)?;
    let doctor_id = parse_doctor_id(&doctor_id)?.to_string();
    let service = WorkingHoursService::new(&state);

    let schedule = service.set_working_hours(&doctor_id, payload.working_hours, auth.token()).await
        .map_err(service_error)?;

    Ok(Json(json!({
        "message": "Doctor working hours saved",
        "doctor_id": doctor_id,
        "working_hours": schedule
    })))
}
