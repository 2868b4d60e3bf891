use chrono::{NaiveDate, Utc};
use reqwest::Method;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use doctor_cell::models::{TimeOfDay, WorkingHoursError};
use doctor_cell::services::AvailabilityService;
use shared_config::AppConfig;
use shared_database::supabase::{SupabaseClient, SupabaseError};
use shared_models::auth::{User, ROLE_CLINIC, ROLE_DOCTOR};

use crate::models::{Appointment, AppointmentError, AppointmentStatus, BookAppointmentRequest};

impl From<anyhow::Error> for AppointmentError {
    fn from(err: anyhow::Error) -> Self {
        if let Some(WorkingHoursError::DoctorNotFound(_)) = err.downcast_ref::<WorkingHoursError>() {
            return AppointmentError::DoctorNotFound;
        }
        match err.downcast_ref::<SupabaseError>() {
            Some(SupabaseError::Conflict(_)) => AppointmentError::ConflictDetected,
            Some(SupabaseError::Auth(_)) => AppointmentError::Unauthorized,
            _ => AppointmentError::DatabaseError(err.to_string()),
        }
    }
}

pub struct AppointmentBookingService {
    supabase: SupabaseClient,
    availability: AvailabilityService,
    config: AppConfig,
}

impl AppointmentBookingService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            availability: AvailabilityService::new(config),
            config: config.clone(),
        }
    }

    /// Times already held on `date`, earliest first.
    pub async fn get_taken_times(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        auth_token: Option<&str>,
    ) -> Result<Vec<TimeOfDay>, AppointmentError> {
        let booked = self.availability
            .get_booked_times(&doctor_id.to_string(), date, auth_token)
            .await?;

        let mut taken: Vec<TimeOfDay> = booked.into_iter().collect();
        taken.sort();
        Ok(taken)
    }

    /// Books `request.time` for the patient, provided the date is not behind
    /// the clinic's today and the time is still one of the doctor's available
    /// slots.
    pub async fn book_appointment(
        &self,
        patient_id: Uuid,
        request: BookAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        info!("Booking appointment for patient {} with doctor {} on {} at {}",
              patient_id, request.doctor_id, request.date, request.time);

        let time: TimeOfDay = request.time.parse()
            .map_err(|e: WorkingHoursError| AppointmentError::InvalidTime(e.to_string()))?;

        let today = self.config.clinic_now().date();
        if request.date < today {
            warn!("Rejected booking on past date {} (clinic today is {})", request.date, today);
            return Err(AppointmentError::InvalidTime(
                format!("{} is before the clinic's current date {}", request.date, today)
            ));
        }

        let available = self.availability
            .get_available_slots(&request.doctor_id.to_string(), request.date, Some(auth_token))
            .await?;

        if !available.contains(&time) {
            warn!("Rejected booking at {} on {}: not among {} available slots",
                  time, request.date, available.len());
            return Err(AppointmentError::SlotNotAvailable);
        }

        let appointment_data = json!({
            "patient_id": patient_id,
            "doctor_id": request.doctor_id,
            "service_id": request.service_id,
            "date": request.date,
            "time": time,
            "status": AppointmentStatus::Scheduled,
            "notes": request.notes,
            "created_at": Utc::now().to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339()
        });

        let result: Vec<Appointment> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/appointments",
            Some(auth_token),
            Some(appointment_data),
            Some(SupabaseClient::return_representation()),
        ).await?;

        let appointment = result.into_iter().next()
            .ok_or_else(|| AppointmentError::DatabaseError("Failed to create appointment".to_string()))?;

        info!("Appointment {} booked", appointment.id);
        Ok(appointment)
    }

    /// Cancels a scheduled appointment, releasing its slot.
    pub async fn cancel_appointment(
        &self,
        appointment_id: Uuid,
        user: &User,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Cancelling appointment {} for user {}", appointment_id, user.id);

        let appointment = self.get_appointment(appointment_id, auth_token).await?;

        let user_id = user.id.as_str();
        let is_patient = appointment.patient_id.to_string() == user_id;
        let is_doctor = user.has_role(ROLE_DOCTOR) && appointment.doctor_id.to_string() == user_id;
        let is_clinic = user.has_role(ROLE_CLINIC);

        if !is_patient && !is_doctor && !is_clinic {
            return Err(AppointmentError::Unauthorized);
        }

        if !appointment.status.can_cancel() {
            return Err(AppointmentError::InvalidStatusTransition(appointment.status));
        }

        let update_data = json!({
            "status": AppointmentStatus::Cancelled,
            "updated_at": Utc::now().to_rfc3339()
        });

        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let result: Vec<Appointment> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            Some(auth_token),
            Some(update_data),
            Some(SupabaseClient::return_representation()),
        ).await?;

        let cancelled = result.into_iter().next().ok_or(AppointmentError::NotFound)?;

        info!("Appointment {} cancelled; {} on {} is free again",
              cancelled.id, cancelled.time, cancelled.date);
        Ok(cancelled)
    }

    async fn get_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let result: Vec<Appointment> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await?;

        result.into_iter().next().ok_or(AppointmentError::NotFound)
    }
}
