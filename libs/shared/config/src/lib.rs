use std::env;

use chrono::{FixedOffset, NaiveDateTime, Offset, Utc};
use tracing::warn;

const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    /// Offset of the clinic's civil clock from UTC, used to decide what "today" is.
    pub clinic_utc_offset_minutes: i32,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            clinic_utc_offset_minutes: parse_offset(env::var("CLINIC_UTC_OFFSET_MINUTES").ok()),
            port: env::var("PORT")
                .ok()
                .and_then(|raw| raw.parse().ok())
                .unwrap_or(3000),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    pub fn clinic_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.clinic_utc_offset_minutes * 60)
            .unwrap_or_else(|| Utc.fix())
    }

    /// Current wall-clock time on the clinic's civil calendar.
    pub fn clinic_now(&self) -> NaiveDateTime {
        Utc::now().with_timezone(&self.clinic_offset()).naive_local()
    }
}

fn parse_offset(raw: Option<String>) -> i32 {
    let Some(raw) = raw else {
        return 0;
    };

    match raw.trim().parse::<i32>() {
        Ok(minutes) if minutes.abs() <= MAX_UTC_OFFSET_MINUTES => minutes,
        Ok(minutes) => {
            warn!("CLINIC_UTC_OFFSET_MINUTES {} out of range, using UTC", minutes);
            0
        }
        Err(_) => {
            warn!("CLINIC_UTC_OFFSET_MINUTES is not an integer, using UTC");
            0
        }
    }
}
