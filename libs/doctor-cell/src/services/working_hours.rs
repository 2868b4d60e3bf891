use anyhow::Result;
use chrono::Utc;
use reqwest::Method;
use serde_json::json;
use tracing::{debug, info};

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{DoctorScheduleRow, WeeklySchedule, WorkingHoursError};

pub struct WorkingHoursService {
    supabase: SupabaseClient,
}

impl WorkingHoursService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Doctor's stored week; a doctor with nothing configured works no days.
    pub async fn get_working_hours(
        &self,
        doctor_id: &str,
        auth_token: Option<&str>,
    ) -> Result<WeeklySchedule> {
        debug!("Fetching working hours for doctor: {}", doctor_id);

        let path = format!("/rest/v1/doctors?id=eq.{}&select=id,working_hours", doctor_id);
        let rows: Vec<DoctorScheduleRow> = self.supabase.request(
            Method::GET,
            &path,
            auth_token,
            None,
        ).await?;

        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| WorkingHoursError::DoctorNotFound(doctor_id.to_string()))?;

        Ok(row.working_hours.unwrap_or_default())
    }

    /// Replaces the doctor's whole week after validating every configured day.
    pub async fn set_working_hours(
        &self,
        doctor_id: &str,
        schedule: WeeklySchedule,
        auth_token: &str,
    ) -> Result<WeeklySchedule> {
        schedule.validate()?;

        let update_data = json!({
            "working_hours": schedule,
            "updated_at": Utc::now().to_rfc3339()
        });

        let path = format!("/rest/v1/doctors?id=eq.{}&select=id,working_hours", doctor_id);
        let rows: Vec<DoctorScheduleRow> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            Some(auth_token),
            Some(update_data),
            Some(SupabaseClient::return_representation()),
        ).await?;

        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| WorkingHoursError::DoctorNotFound(doctor_id.to_string()))?;

        info!("Working hours updated for doctor {}", row.id);
        Ok(row.working_hours.unwrap_or_default())
    }
}
