//! Event pairing and grouping engine.
//!
//! Buckets raw usage events by (local calendar date, item nickname) and
//! projects a fixed 24-slot hourly total for charting. Both operations are
//! pure: same input, same output, no I/O.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;
use time::{Date, UtcOffset};
use wattwatch_model::domain::UsageEvent;

use crate::timeutil;

/// Nickname used when an event's item id has no match in the caller's item
/// set (stale join data must not fail the whole report).
pub const UNKNOWN_NICKNAME: &str = "Unknown";

/// One (date, nickname) bucket of events. Derived view, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventGroup {
    pub usage_date: Date,
    pub nickname: String,
    pub events: Vec<UsageEvent>,
}

/// Elapsed duration of a single event.
///
/// Ongoing events (no end timestamp) are reported as such, never as a
/// number: the partial elapsed time up to "now" is deliberately not
/// computed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EventDuration {
    Minutes(f64),
    Ongoing,
}

pub fn event_duration(event: &UsageEvent) -> EventDuration {
    match event.end_ts {
        Some(end) => EventDuration::Minutes(timeutil::elapsed_minutes(event.start_ts, end)),
        None => EventDuration::Ongoing,
    }
}

/// Per-hour rounded minute totals keyed by item nickname.
///
/// Every nickname observed in the input appears in every hour, zero when
/// nothing started there.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlyTotal {
    pub hour: String,
    pub minutes: BTreeMap<String, i64>,
}

/// Partition events into (local date of `start_ts`, nickname) buckets.
///
/// Every event lands in exactly one bucket; relative input order is kept
/// both across buckets (first-seen order) and inside each bucket. Unknown
/// item ids resolve to [`UNKNOWN_NICKNAME`].
pub fn group_by_date_and_nickname(
    events: &[UsageEvent],
    nicknames: &HashMap<i64, String>,
    offset: UtcOffset,
) -> Vec<EventGroup> {
    let mut groups: Vec<EventGroup> = Vec::new();
    let mut index: HashMap<(Date, String), usize> = HashMap::new();

    for event in events {
        let usage_date = timeutil::local_calendar_date(event.start_ts, offset);
        let nickname = nicknames
            .get(&event.item_id)
            .cloned()
            .unwrap_or_else(|| UNKNOWN_NICKNAME.to_string());

        let key = (usage_date, nickname.clone());
        let slot = *index.entry(key).or_insert_with(|| {
            groups.push(EventGroup {
                usage_date,
                nickname,
                events: Vec::new(),
            });
            groups.len() - 1
        });
        groups[slot].events.push(event.clone());
    }

    groups
}

/// Project grouped events onto the fixed 24 hour buckets of a chart day.
///
/// The bucket key is the start hour only; an event spanning an hour
/// boundary is not split, its full duration lands in the start hour.
/// Ongoing events contribute zero. Totals are rounded to whole minutes.
pub fn hourly_totals(groups: &[EventGroup], offset: UtcOffset) -> Vec<HourlyTotal> {
    let nicknames: BTreeSet<&str> = groups.iter().map(|g| g.nickname.as_str()).collect();

    let mut totals: Vec<HourlyTotal> = (0..24)
        .map(|h| HourlyTotal {
            hour: format!("{h:02}:00"),
            minutes: nicknames
                .iter()
                .map(|n| (n.to_string(), 0i64))
                .collect(),
        })
        .collect();

    for group in groups {
        for event in &group.events {
            let EventDuration::Minutes(minutes) = event_duration(event) else {
                continue;
            };
            let hour = event.start_ts.to_offset(offset).hour() as usize;
            if let Some(total) = totals[hour].minutes.get_mut(&group.nickname) {
                *total += minutes.round() as i64;
            }
        }
    }

    totals
}
