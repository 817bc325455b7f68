//! Pure schedule selection: which airing is on now, which is up next, and
//! the display formatting derived from the answer.
//!
//! Everything here is deterministic given `(airings, now)` so the engine's
//! reconciliation passes can be replayed in tests without a clock.

use chrono::{DateTime, Duration, Local, NaiveTime, TimeZone, Utc};

use crate::catalog::{Airing, AiringFlag};

/// Preview prefix for a live airing.
pub const ON_NOW_PREFIX: &str = "ON NOW - ";

/// Index of the airing whose `[start, end)` interval contains `now`.
///
/// Overlapping airings are a malformed but tolerated input: the most
/// recently started one wins.  Input need not be sorted or pre-filtered.
pub fn find_on_now(airings: &[Airing], now: DateTime<Utc>) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, a) in airings.iter().enumerate() {
        if a.start_time <= now && now < a.end_time {
            match best {
                Some(b) if airings[b].start_time >= a.start_time => {}
                _ => best = Some(i),
            }
        }
    }
    best
}

/// Index of the airing with the smallest start time strictly after `now`,
/// or `None` when every airing has already started.
pub fn find_next(airings: &[Airing], now: DateTime<Utc>) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, a) in airings.iter().enumerate() {
        if a.start_time > now {
            match best {
                Some(b) if airings[b].start_time <= a.start_time => {}
                _ => best = Some(i),
            }
        }
    }
    best
}

pub fn clear_flags(airings: &mut [Airing]) {
    for a in airings.iter_mut() {
        a.flag = AiringFlag::None;
    }
}

/// Clear every flag in the catalog, then mark `idx` as on-now.
pub fn mark_on_now(airings: &mut [Airing], idx: usize) {
    clear_flags(airings);
    if let Some(a) = airings.get_mut(idx) {
        a.flag = AiringFlag::OnNow;
    }
}

/// Clear every flag in the catalog, then mark `idx` as up-next.
pub fn mark_up_next(airings: &mut [Airing], idx: usize) {
    clear_flags(airings);
    if let Some(a) = airings.get_mut(idx) {
        a.flag = AiringFlag::UpNext;
    }
}

/// Next local midnight strictly after `now` — the daily full-refetch boundary.
pub fn next_local_midnight(now: DateTime<Local>) -> DateTime<Local> {
    let tomorrow = (now.date_naive() + Duration::days(1)).and_time(NaiveTime::MIN);
    Local
        .from_local_datetime(&tomorrow)
        .earliest()
        .unwrap_or(now + Duration::days(1))
}

/// Full current date for the primary channel header,
/// e.g. "Saturday, August 23, 2025".
pub fn header_date(now: DateTime<Local>) -> String {
    now.format("%A, %B %-d, %Y").to_string()
}

/// Local start time for up-next previews, e.g. "7:30 PM".
pub fn preview_time(start: DateTime<Utc>) -> String {
    start.with_timezone(&Local).format("%-I:%M %p").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn airing(id: &str, start: (u32, u32), end: (u32, u32)) -> Airing {
        Airing {
            content_id: id.to_string(),
            title: id.to_string(),
            start_time: Utc.with_ymd_and_hms(2025, 3, 1, start.0, start.1, 0).unwrap(),
            end_time: Utc.with_ymd_and_hms(2025, 3, 1, end.0, end.1, 0).unwrap(),
            image_url_template: String::new(),
            playback_url: None,
            flag: AiringFlag::None,
        }
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, h, m, 0).unwrap()
    }

    #[test]
    fn test_on_now_contains_instant() {
        let airings = vec![airing("a", (10, 0), (11, 0)), airing("b", (11, 0), (12, 0))];
        assert_eq!(find_on_now(&airings, at(10, 30)), Some(0));
        // interval is half-open: 11:00 belongs to "b", not "a"
        assert_eq!(find_on_now(&airings, at(11, 0)), Some(1));
        assert_eq!(find_on_now(&airings, at(12, 0)), None);
    }

    #[test]
    fn test_on_now_in_gap_is_none() {
        let airings = vec![airing("a", (10, 0), (11, 0)), airing("b", (13, 0), (14, 0))];
        assert_eq!(find_on_now(&airings, at(12, 0)), None);
        assert_eq!(find_next(&airings, at(12, 0)), Some(1));
    }

    #[test]
    fn test_on_now_overlap_latest_start_wins() {
        // malformed feed: "b" starts inside "a"
        let airings = vec![airing("a", (10, 0), (12, 0)), airing("b", (10, 30), (11, 30))];
        assert_eq!(find_on_now(&airings, at(11, 0)), Some(1));
    }

    #[test]
    fn test_find_next_unsorted_input() {
        let airings = vec![airing("late", (18, 0), (19, 0)), airing("soon", (13, 0), (14, 0))];
        assert_eq!(find_next(&airings, at(12, 0)), Some(1));
    }

    #[test]
    fn test_find_next_strictly_after() {
        let airings = vec![airing("a", (10, 0), (11, 0))];
        // an airing starting exactly at `now` is not "next"
        assert_eq!(find_next(&airings, at(10, 0)), None);
        assert_eq!(find_next(&airings, at(9, 59)), Some(0));
    }

    #[test]
    fn test_mark_flags_are_exclusive() {
        let mut airings = vec![
            airing("a", (10, 0), (11, 0)),
            airing("b", (11, 0), (12, 0)),
            airing("c", (12, 0), (13, 0)),
        ];
        mark_on_now(&mut airings, 0);
        mark_on_now(&mut airings, 1);
        let on_now = airings.iter().filter(|a| a.flag == AiringFlag::OnNow).count();
        let up_next = airings.iter().filter(|a| a.flag == AiringFlag::UpNext).count();
        assert_eq!((on_now, up_next), (1, 0));

        mark_up_next(&mut airings, 2);
        let on_now = airings.iter().filter(|a| a.flag == AiringFlag::OnNow).count();
        let up_next = airings.iter().filter(|a| a.flag == AiringFlag::UpNext).count();
        assert_eq!((on_now, up_next), (0, 1));
        assert_eq!(airings[2].flag, AiringFlag::UpNext);
    }

    #[test]
    fn test_next_local_midnight() {
        let now = Local::now();
        let midnight = next_local_midnight(now);
        assert!(midnight > now);
        assert_eq!(midnight.time().hour(), 0);
        assert_eq!(midnight.time().minute(), 0);
        assert_eq!(midnight.date_naive(), now.date_naive() + Duration::days(1));
    }
}
