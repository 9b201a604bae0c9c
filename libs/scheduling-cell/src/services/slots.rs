use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::warn;

use crate::models::{
    AvailableSlot, DoctorSchedule, TimeBlock, DEFAULT_SLOT_INTERVAL_MINUTES,
};

const MINUTES_PER_DAY: u32 = 24 * 60;

/// Generate the ordered candidate slots for one calendar date.
///
/// Block resolution: the first date override that covers the date and
/// defines an entry for it supplies the blocks — including an empty entry,
/// which means the doctor does not attend that date regardless of the weekly
/// schedule. Otherwise the weekly blocks for the date's weekday apply. No
/// blocks either way means no slots.
///
/// Pure function of its inputs; busy ranges are not consulted here.
pub fn generate_slots(
    date: NaiveDate,
    schedule: &DoctorSchedule,
    interval_minutes: u32,
) -> Vec<AvailableSlot> {
    // A zero interval would never advance the walk.
    let interval = if interval_minutes == 0 {
        DEFAULT_SLOT_INTERVAL_MINUTES
    } else {
        interval_minutes
    };

    let Some(blocks) = resolve_day_blocks(date, schedule) else {
        return Vec::new();
    };

    let tz: Tz = schedule.timezone.parse().unwrap_or_else(|_| {
        warn!(
            "Unknown timezone '{}' on schedule, using America/Lima",
            schedule.timezone
        );
        chrono_tz::America::Lima
    });

    let mut slots = Vec::new();
    for block in blocks {
        let (Some(start_minutes), Some(end_minutes)) =
            (block.start_minutes(), block.end_minutes())
        else {
            warn!("Skipping malformed time block {:?}", block);
            continue;
        };

        // The block end bounds the last slot START, not its end: a block
        // whose length is not a multiple of the interval emits a final slot
        // that extends past the nominal block end.
        let mut minutes = start_minutes;
        while minutes < end_minutes {
            let start_utc = local_minutes_to_utc(date, minutes, tz);
            let end_utc = local_minutes_to_utc(date, minutes + interval, tz);

            slots.push(AvailableSlot {
                start_utc,
                end_utc,
                start_local: start_utc.with_timezone(&tz).format("%H:%M").to_string(),
                end_local: end_utc.with_timezone(&tz).format("%H:%M").to_string(),
            });

            minutes += interval;
        }
    }

    slots
}

/// Drop slots that have already started. The generator is day-granular, so
/// callers serving the current date apply this before showing slots.
pub fn upcoming_slots(slots: Vec<AvailableSlot>, now: DateTime<Utc>) -> Vec<AvailableSlot> {
    slots.into_iter().filter(|s| s.start_utc >= now).collect()
}

fn resolve_day_blocks<'a>(
    date: NaiveDate,
    schedule: &'a DoctorSchedule,
) -> Option<&'a [TimeBlock]> {
    if let Some(overrides) = &schedule.overrides {
        for ov in overrides {
            if ov.covers(date) {
                if let Some(blocks) = ov.day_schedules.get(&date) {
                    return Some(blocks.as_slice());
                }
            }
        }
    }

    let weekly = schedule.weekly.as_ref()?;
    let blocks = weekly.blocks_for(date.weekday());
    if blocks.is_empty() {
        None
    } else {
        Some(blocks)
    }
}

/// Interpret minutes-past-local-midnight on `date` in `tz` and convert to
/// UTC. Offsets of 24:00 and beyond roll into the following day. Ambiguous
/// wall times (fall-back) resolve to the earliest mapping; nonexistent wall
/// times (spring-forward gap) are probed forward until they exist.
fn local_minutes_to_utc(date: NaiveDate, minutes: u32, tz: Tz) -> DateTime<Utc> {
    let day = date + Duration::days((minutes / MINUTES_PER_DAY) as i64);
    let rem = minutes % MINUTES_PER_DAY;
    let time = NaiveTime::from_hms_opt(rem / 60, rem % 60, 0).unwrap();
    let naive = day.and_time(time);

    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        LocalResult::None => {
            let mut probe = naive;
            for _ in 0..8 {
                probe += Duration::minutes(15);
                if let Some(dt) = tz.from_local_datetime(&probe).earliest() {
                    return dt.with_timezone(&Utc);
                }
            }
            // No zone in the tz database has a gap this wide.
            Utc.from_utc_datetime(&naive)
        }
    }
}
