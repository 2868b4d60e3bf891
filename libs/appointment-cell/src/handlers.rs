use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use serde_json::{json, Value};
use uuid::Uuid;

use doctor_cell::models::TimeOfDay;
use shared_config::AppConfig;
use shared_models::auth::{User, ROLE_PATIENT};
use shared_models::error::AppError;
use shared_utils::extractor::require_role;

use crate::models::{AppointmentError, BookAppointmentRequest, TakenTimesQuery};
use crate::services::booking::AppointmentBookingService;

impl From<AppointmentError> for AppError {
    fn from(err: AppointmentError) -> Self {
        match err {
            AppointmentError::NotFound => AppError::NotFound("Appointment not found".to_string()),
            AppointmentError::DoctorNotFound => AppError::NotFound("Doctor not found".to_string()),
            AppointmentError::SlotNotAvailable => {
                AppError::BadRequest("Selected time is not available for this doctor and date".to_string())
            }
            AppointmentError::InvalidTime(_) => AppError::BadRequest(err.to_string()),
            AppointmentError::InvalidStatusTransition(_) | AppointmentError::ConflictDetected => {
                AppError::Conflict(err.to_string())
            }
            AppointmentError::Unauthorized => AppError::Forbidden(err.to_string()),
            AppointmentError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}

/// Already-booked times for a doctor's day, as the booking form expects them.
#[axum::debug_handler]
pub async fn get_taken_times(
    State(state): State<Arc<AppConfig>>,
    Query(query): Query<TakenTimesQuery>,
) -> Result<Json<Vec<TimeOfDay>>, AppError> {
    let booking_service = AppointmentBookingService::new(&state);

    let taken = booking_service.get_taken_times(query.doctor_id, query.date, None).await?;

    Ok(Json(taken))
}

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, ROLE_PATIENT)?;
    let patient_id = Uuid::parse_str(&user.id)
        .map_err(|_| AppError::Auth("Invalid user id in token".to_string()))?;

    let booking_service = AppointmentBookingService::new(&state);
    let appointment = booking_service.book_appointment(patient_id, request, auth.token()).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment booked"
    })))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let booking_service = AppointmentBookingService::new(&state);

    let appointment = booking_service.cancel_appointment(appointment_id, &user, auth.token()).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment cancelled"
    })))
}
