use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use doctor_cell::models::TimeOfDay;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    #[serde(default)]
    pub service_id: Option<Uuid>,
    pub date: NaiveDate,
    pub time: TimeOfDay,
    pub status: AppointmentStatus,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    /// Only upcoming visits can still be called off.
    pub fn can_cancel(self) -> bool {
        self == AppointmentStatus::Scheduled
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Scheduled => write!(f, "scheduled"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct BookAppointmentRequest {
    pub doctor_id: Uuid,
    #[serde(default)]
    pub service_id: Option<Uuid>,
    pub date: NaiveDate,
    /// `HH:MM`, one of the doctor's available slots for `date`.
    pub time: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TakenTimesQuery {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Error, Debug)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Appointment slot not available")]
    SlotNotAvailable,

    #[error("Doctor not found")]
    DoctorNotFound,

    #[error("Invalid appointment time: {0}")]
    InvalidTime(String),

    #[error("Appointment cannot be modified in current status: {0}")]
    InvalidStatusTransition(AppointmentStatus),

    #[error("Appointment conflicts with existing booking")]
    ConflictDetected,

    #[error("Unauthorized access to appointment")]
    Unauthorized,

    #[error("Database error: {0}")]
    DatabaseError(String),
}
