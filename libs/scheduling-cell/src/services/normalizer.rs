use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;
use chrono_tz::Tz;
use serde_json::Value;
use tracing::{debug, warn};

use crate::models::{
    DateOverride, DoctorSchedule, MergeStats, NormalizedSchedule, TimeBlock, WeeklySchedule,
    weekday_from_name, DEFAULT_MAX_CONCURRENT_APPOINTMENTS,
};

/// Merge a doctor's raw `calendarInfo` object into one canonical schedule.
///
/// The upstream structure nests weekly and override schedules per
/// appointment category and type:
///
/// ```text
/// { "horarios": { category: { type: { "horariesFijo": {...},
///                                      "horariesDinamico": [...] } } },
///   "timezone": ..., "overschedule": ..., "maxConcurrentAppointments": ... }
/// ```
///
/// Upstream data is heterogeneous and frequently partial, so malformed
/// entries are skipped and counted rather than raised.
pub fn merge_calendar_config(calendar_info: &Value, default_timezone: &str) -> NormalizedSchedule {
    let mut stats = MergeStats::default();
    let mut weekly = WeeklySchedule::default();
    let mut overrides: Vec<DateOverride> = Vec::new();
    let mut seen_override_keys: HashSet<(i64, NaiveDate, NaiveDate)> = HashSet::new();

    let empty = serde_json::Map::new();
    let categories = calendar_info
        .get("horarios")
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    for by_type in categories.values() {
        let Some(by_type) = by_type.as_object() else {
            stats.skipped_entries += 1;
            continue;
        };

        for config in by_type.values() {
            let Some(config) = config.as_object() else {
                stats.skipped_entries += 1;
                continue;
            };

            merge_weekly(config.get("horariesFijo"), &mut weekly, &mut stats);
            merge_overrides(
                config.get("horariesDinamico"),
                &mut overrides,
                &mut seen_override_keys,
                &mut stats,
            );
        }
    }

    let timezone = resolve_timezone(calendar_info.get("timezone"), default_timezone, &mut stats);
    let allow_overbooking = calendar_info
        .get("overschedule")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let max_concurrent_appointments = calendar_info
        .get("maxConcurrentAppointments")
        .and_then(Value::as_u64)
        .map(|n| n as u32)
        .unwrap_or(DEFAULT_MAX_CONCURRENT_APPOINTMENTS);

    if !stats.is_clean() {
        warn!(
            "Calendar config merged with discards: {} entries, {} blocks, {} duplicate overrides",
            stats.skipped_entries, stats.skipped_blocks, stats.dropped_duplicate_overrides
        );
    }
    debug!(
        "Merged calendar config: {} override windows, overbooking={}",
        overrides.len(),
        allow_overbooking
    );

    let schedule = DoctorSchedule {
        weekly: if weekly.is_empty() { None } else { Some(weekly) },
        overrides: if overrides.is_empty() {
            None
        } else {
            Some(overrides)
        },
        allow_overbooking,
        max_concurrent_appointments,
        timezone,
    };

    NormalizedSchedule { schedule, stats }
}

fn merge_weekly(fixed: Option<&Value>, weekly: &mut WeeklySchedule, stats: &mut MergeStats) {
    let Some(fixed) = fixed.and_then(Value::as_object) else {
        return;
    };

    for (day_name, blocks) in fixed {
        let Some(weekday) = weekday_from_name(day_name) else {
            stats.skipped_entries += 1;
            continue;
        };
        let Some(blocks) = blocks.as_array() else {
            stats.skipped_blocks += 1;
            continue;
        };
        if blocks.is_empty() {
            continue;
        }

        let merged = weekly.blocks_for_mut(weekday);
        let mut seen: HashSet<(String, String)> = merged
            .iter()
            .map(|b| (b.start.clone(), b.end.clone()))
            .collect();

        for block in blocks {
            let Some(block) = parse_block(block) else {
                stats.skipped_blocks += 1;
                continue;
            };
            let key = (block.start.clone(), block.end.clone());
            if seen.insert(key) {
                merged.push(block);
            }
        }
        merged.sort_by(|a, b| a.start.cmp(&b.start));
    }
}

fn merge_overrides(
    dynamic: Option<&Value>,
    overrides: &mut Vec<DateOverride>,
    seen_keys: &mut HashSet<(i64, NaiveDate, NaiveDate)>,
    stats: &mut MergeStats,
) {
    let Some(dynamic) = dynamic.and_then(Value::as_array) else {
        return;
    };

    for entry in dynamic {
        let Some(entry) = entry.as_object() else {
            stats.skipped_entries += 1;
            continue;
        };
        let (Some(id), Some(start_date), Some(end_date)) = (
            entry.get("id").and_then(Value::as_i64),
            parse_iso_date(entry.get("startDate")),
            parse_iso_date(entry.get("endDate")),
        ) else {
            stats.skipped_entries += 1;
            continue;
        };

        // Overrides are keyed by (id, startDate, endDate); first wins.
        if !seen_keys.insert((id, start_date, end_date)) {
            stats.dropped_duplicate_overrides += 1;
            continue;
        }

        let mut day_schedules: BTreeMap<NaiveDate, Vec<TimeBlock>> = BTreeMap::new();
        if let Some(days) = entry.get("daySchedules").and_then(Value::as_object) {
            for (date_key, day_blocks) in days {
                let Ok(date) = NaiveDate::parse_from_str(date_key, "%Y-%m-%d") else {
                    stats.skipped_entries += 1;
                    continue;
                };
                let Some(day_blocks) = day_blocks.as_array() else {
                    stats.skipped_blocks += 1;
                    continue;
                };

                let mut unique: Vec<TimeBlock> = Vec::new();
                let mut seen: HashSet<(String, String)> = HashSet::new();
                for block in day_blocks {
                    let Some(block) = parse_block(block) else {
                        stats.skipped_blocks += 1;
                        continue;
                    };
                    if seen.insert((block.start.clone(), block.end.clone())) {
                        unique.push(block);
                    }
                }
                unique.sort_by(|a, b| a.start.cmp(&b.start));
                // An empty entry is kept: it means the doctor does not
                // attend that date, overriding any weekly blocks.
                day_schedules.insert(date, unique);
            }
        }

        overrides.push(DateOverride {
            id,
            start_date,
            end_date,
            day_schedules,
        });
    }
}

fn parse_block(value: &Value) -> Option<TimeBlock> {
    let obj = value.as_object()?;
    let start = obj.get("start")?.as_str()?;
    let end = obj.get("end")?.as_str()?;
    Some(TimeBlock::new(start, end))
}

fn parse_iso_date(value: Option<&Value>) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value?.as_str()?, "%Y-%m-%d").ok()
}

fn resolve_timezone(value: Option<&Value>, default_timezone: &str, stats: &mut MergeStats) -> String {
    let candidate = value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or(default_timezone);

    if candidate.parse::<Tz>().is_ok() {
        candidate.to_string()
    } else {
        warn!(
            "Unknown timezone '{}' in calendar config, using {}",
            candidate, default_timezone
        );
        stats.substituted_timezone = true;
        default_timezone.to_string()
    }
}
