pub mod availability;
pub mod working_hours;

pub use availability::{AvailabilityCalculator, AvailabilityService, SLOT_MINUTES};
pub use working_hours::WorkingHoursService;
