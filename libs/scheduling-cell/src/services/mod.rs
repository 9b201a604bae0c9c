pub mod availability;
pub mod calendar;
pub mod normalizer;
pub mod slots;

pub use availability::{bookable_slots_for_day, evaluate_slot, ranges_overlap};
pub use calendar::CalendarAvailabilityService;
pub use normalizer::merge_calendar_config;
pub use slots::{generate_slots, upcoming_slots};
