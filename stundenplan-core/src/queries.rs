//! Time-relative views over a sorted event set. Every function takes
//! the reference instant in the civic timezone, scans the pre-sorted
//! slice, and never mutates it.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, NaiveDate};
use chrono_tz::Tz;

use crate::LessonEvent;

/// First event starting after `now`. Linear scan is enough because
/// the set is sorted ascending by start.
pub fn next_lesson(events: &[LessonEvent], now: DateTime<Tz>) -> Option<&LessonEvent> {
    events.iter().find(|event| event.start > now)
}

/// The event whose interval contains `now`, if any. Overlaps are not
/// modeled; if the source data overlaps, the first match in sort
/// order wins.
pub fn current_lesson(events: &[LessonEvent], now: DateTime<Tz>) -> Option<&LessonEvent> {
    events
        .iter()
        .find(|event| event.start <= now && now <= event.end)
}

/// Events starting on the civic day of `now` that have not finished
/// yet.
pub fn lessons_today(events: &[LessonEvent], now: DateTime<Tz>) -> Vec<&LessonEvent> {
    let tz = now.timezone();
    let today = now.date_naive();
    events
        .iter()
        .filter(|event| civic_date(event, &tz) == today && event.end > now)
        .collect()
}

/// The next `count` future exams, ascending by start.
pub fn upcoming_exams(events: &[LessonEvent], now: DateTime<Tz>, count: usize) -> Vec<&LessonEvent> {
    events
        .iter()
        .filter(|event| event.is_exam && event.start > now)
        .take(count)
        .collect()
}

/// Events of the current civic week (Monday through Sunday), grouped
/// by day in ascending order. An event belongs to the week containing
/// its start instant, never to two weeks.
pub fn week_lessons(
    events: &[LessonEvent],
    now: DateTime<Tz>,
) -> BTreeMap<NaiveDate, Vec<&LessonEvent>> {
    let tz = now.timezone();
    let monday = now.date_naive()
        - Duration::days(i64::from(now.date_naive().weekday().num_days_from_monday()));
    let next_monday = monday + Duration::days(7);

    let mut grouped: BTreeMap<NaiveDate, Vec<&LessonEvent>> = BTreeMap::new();
    for event in events {
        let day = civic_date(event, &tz);
        if day >= monday && day < next_monday {
            grouped.entry(day).or_default().push(event);
        }
    }
    grouped
}

fn civic_date(event: &LessonEvent, tz: &Tz) -> NaiveDate {
    event.start.with_timezone(tz).date_naive()
}
