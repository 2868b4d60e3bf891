use anyhow::Result;
use chrono::{NaiveDate, NaiveDateTime};
use reqwest::Method;
use tracing::{debug, warn};

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{BookedSet, BookedTimeRow, TimeOfDay, WeeklySchedule};
use crate::services::working_hours::WorkingHoursService;

/// Fixed booking granularity.
pub const SLOT_MINUTES: u16 = 30;

/// Turns a weekly schedule plus the day's bookings into bookable start times.
#[derive(Debug, Clone, Copy)]
pub struct AvailabilityCalculator {
    slot_minutes: u16,
}

impl Default for AvailabilityCalculator {
    fn default() -> Self {
        Self { slot_minutes: SLOT_MINUTES }
    }
}

impl AvailabilityCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_slot_minutes(slot_minutes: u16) -> Self {
        Self { slot_minutes: slot_minutes.max(1) }
    }

    /// Ascending slots `start, start + step, ... < end` for `date`'s weekday,
    /// minus `booked`, and minus anything at or before `reference` when
    /// `date` is the reference's own day. Days off and unusable windows give
    /// an empty list.
    pub fn compute_available_slots(
        &self,
        schedule: &WeeklySchedule,
        date: NaiveDate,
        booked: &BookedSet,
        reference: NaiveDateTime,
    ) -> Vec<TimeOfDay> {
        let Some(window) = schedule.window_for(date) else {
            return Vec::new();
        };

        let (start, end) = match window.bounds() {
            Ok(Some(bounds)) => bounds,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!("Ignoring unusable working window for {}: {}", date, e);
                return Vec::new();
            }
        };

        let cutoff = (reference.date() == date).then(|| TimeOfDay::from(reference.time()));

        (start.minutes()..end.minutes())
            .step_by(self.slot_minutes as usize)
            .filter_map(TimeOfDay::from_minutes)
            .filter(|slot| !booked.contains(slot))
            .filter(|slot| cutoff.map_or(true, |now| *slot > now))
            .collect()
    }
}

pub struct AvailabilityService {
    supabase: SupabaseClient,
    working_hours: WorkingHoursService,
    calculator: AvailabilityCalculator,
    config: AppConfig,
}

impl AvailabilityService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            working_hours: WorkingHoursService::new(config),
            calculator: AvailabilityCalculator::new(),
            config: config.clone(),
        }
    }

    /// Bookable slots for `date`, judged against the clinic's current time.
    pub async fn get_available_slots(
        &self,
        doctor_id: &str,
        date: NaiveDate,
        auth_token: Option<&str>,
    ) -> Result<Vec<TimeOfDay>> {
        self.get_available_slots_at(doctor_id, date, self.config.clinic_now(), auth_token).await
    }

    pub async fn get_available_slots_at(
        &self,
        doctor_id: &str,
        date: NaiveDate,
        reference: NaiveDateTime,
        auth_token: Option<&str>,
    ) -> Result<Vec<TimeOfDay>> {
        debug!("Calculating available slots for doctor {} on {}", doctor_id, date);

        let (schedule, booked) = futures::try_join!(
            self.working_hours.get_working_hours(doctor_id, auth_token),
            self.get_booked_times(doctor_id, date, auth_token),
        )?;

        let slots = self.calculator.compute_available_slots(&schedule, date, &booked, reference);

        debug!("Found {} available slots ({} booked)", slots.len(), booked.len());
        Ok(slots)
    }

    /// Times held by non-cancelled appointments for this doctor and date.
    pub async fn get_booked_times(
        &self,
        doctor_id: &str,
        date: NaiveDate,
        auth_token: Option<&str>,
    ) -> Result<BookedSet> {
        let path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&date=eq.{}&status=neq.cancelled&select=time",
            doctor_id, date
        );

        let rows: Vec<BookedTimeRow> = self.supabase.request(
            Method::GET,
            &path,
            auth_token,
            None,
        ).await?;

        let booked = rows
            .into_iter()
            .filter_map(|row| match row.time.parse::<TimeOfDay>() {
                Ok(time) => Some(time),
                Err(e) => {
                    warn!("Skipping booked appointment with unreadable time: {}", e);
                    None
                }
            })
            .collect();

        Ok(booked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DayWindow;
    use chrono::{NaiveTime, Weekday};

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2030, 1, 7).unwrap()
    }

    fn early_reference() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2030, 1, 1).unwrap().and_hms_opt(8, 0, 0).unwrap()
    }

    #[test]
    fn custom_step_walks_the_window() {
        let schedule = WeeklySchedule::default().with_day(Weekday::Mon, DayWindow::new("09:00", "10:00"));
        let slots = AvailabilityCalculator::with_slot_minutes(20)
            .compute_available_slots(&schedule, monday(), &BookedSet::new(), early_reference());

        let rendered: Vec<String> = slots.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, ["09:00", "09:20", "09:40"]);
    }

    #[test]
    fn window_not_aligned_to_step_stops_before_end() {
        let schedule = WeeklySchedule::default().with_day(Weekday::Mon, DayWindow::new("09:15", "10:00"));
        let slots = AvailabilityCalculator::new()
            .compute_available_slots(&schedule, monday(), &BookedSet::new(), early_reference());

        let rendered: Vec<String> = slots.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, ["09:15", "09:45"]);
    }

    #[test]
    fn reference_seconds_are_truncated() {
        let schedule = WeeklySchedule::default().with_day(Weekday::Mon, DayWindow::new("09:00", "11:00"));
        let reference = monday().and_time(NaiveTime::from_hms_opt(9, 59, 59).unwrap());
        let slots = AvailabilityCalculator::new()
            .compute_available_slots(&schedule, monday(), &BookedSet::new(), reference);

        let rendered: Vec<String> = slots.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, ["10:00", "10:30"]);
    }
}
