use chrono::{DateTime, NaiveDate, Utc};

use crate::models::{
    AvailableSlot, BusyRange, DoctorSchedule, OverbookingPolicy, SlotAvailability,
};
use crate::services::slots::generate_slots;

/// Half-open interval intersection on UTC instants. Touching endpoints do
/// not overlap.
pub fn ranges_overlap(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start < b_end && b_start < a_end
}

/// Evaluate one candidate slot against a day's busy ranges.
///
/// Every overlapping busy range counts as one occupied unit — ranges are
/// deliberately not merged first, because each represents one real
/// appointment and capacity is counted in appointments, not in covered
/// time. A slot at exactly its capacity is not available.
pub fn evaluate_slot(
    slot: &AvailableSlot,
    busy_ranges: &[BusyRange],
    policy: &OverbookingPolicy,
) -> SlotAvailability {
    let capacity = policy.capacity();
    let occupied_count = busy_ranges
        .iter()
        .filter(|b| ranges_overlap(slot.start_utc, slot.end_utc, b.start, b.end))
        .count();

    SlotAvailability {
        available: occupied_count < capacity as usize,
        occupied_count,
        capacity,
    }
}

/// Generate the date's candidate slots and keep only those still bookable
/// under the schedule's overbooking policy.
pub fn bookable_slots_for_day(
    date: NaiveDate,
    schedule: &DoctorSchedule,
    busy_ranges: &[BusyRange],
    interval_minutes: u32,
) -> Vec<AvailableSlot> {
    let policy = schedule.policy();
    generate_slots(date, schedule, interval_minutes)
        .into_iter()
        .filter(|slot| evaluate_slot(slot, busy_ranges, &policy).available)
        .collect()
}
