//! Civil time in the vendor's fixed timezone offset.
//!
//! The reservation service lives in one timezone and publishes its window
//! times as local wall-clock instants, so all date and weekday arithmetic
//! goes through a fixed offset rather than the machine's local zone.

use chrono::{DateTime, Datelike, Duration as ChronoDuration, FixedOffset, NaiveTime, Timelike, Utc};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("invalid time of day `{0}`; expected HH:MM or HH:MM:SS")]
pub struct TimeParseError(String);

#[derive(Debug, Clone, Copy)]
pub struct CivilClock {
    offset: FixedOffset,
}

impl CivilClock {
    /// Offsets outside chrono's valid range fall back to UTC.
    pub fn new(utc_offset_hours: i32) -> Self {
        let offset = FixedOffset::east_opt(utc_offset_hours * 3600)
            .unwrap_or_else(|| FixedOffset::east_opt(0).expect("zero offset is valid"));
        Self { offset }
    }

    pub fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.offset)
    }

    /// Calendar date submitted with a reservation, today or tomorrow.
    pub fn target_date(&self, next_day: bool) -> String {
        format_target_date(self.now(), next_day)
    }

    /// Full English weekday name, as used in task day filters.
    pub fn weekday_name(&self) -> &'static str {
        weekday_full_name(self.now().weekday())
    }

    /// Time remaining until `time_of_day`; `None` when it already passed.
    pub fn duration_until(&self, time_of_day: &str) -> Result<Option<Duration>, TimeParseError> {
        let target = parse_time_of_day(time_of_day)?;
        let now_secs = self.now().num_seconds_from_midnight();
        let target_secs = target.num_seconds_from_midnight();
        if target_secs <= now_secs {
            return Ok(None);
        }
        Ok(Some(Duration::from_secs(u64::from(target_secs - now_secs))))
    }

    /// Sleep until `time_of_day`; returns immediately if it already passed.
    pub async fn wait_until(&self, time_of_day: &str) -> Result<(), TimeParseError> {
        if let Some(remaining) = self.duration_until(time_of_day)? {
            tokio::time::sleep(remaining).await;
        }
        Ok(())
    }
}

pub fn parse_time_of_day(input: &str) -> Result<NaiveTime, TimeParseError> {
    NaiveTime::parse_from_str(input, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(input, "%H:%M"))
        .map_err(|_| TimeParseError(input.to_string()))
}

fn format_target_date(now: DateTime<FixedOffset>, next_day: bool) -> String {
    let date = if next_day {
        now + ChronoDuration::days(1)
    } else {
        now
    };
    date.format("%Y-%m-%d").to_string()
}

fn weekday_full_name(weekday: chrono::Weekday) -> &'static str {
    match weekday {
        chrono::Weekday::Mon => "Monday",
        chrono::Weekday::Tue => "Tuesday",
        chrono::Weekday::Wed => "Wednesday",
        chrono::Weekday::Thu => "Thursday",
        chrono::Weekday::Fri => "Friday",
        chrono::Weekday::Sat => "Saturday",
        chrono::Weekday::Sun => "Sunday",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn beijing(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(8 * 3600)
            .unwrap()
            .with_ymd_and_hms(y, mo, d, h, mi, s)
            .unwrap()
    }

    #[test]
    fn parses_both_time_formats() {
        assert_eq!(
            parse_time_of_day("08:05").unwrap(),
            NaiveTime::from_hms_opt(8, 5, 0).unwrap()
        );
        assert_eq!(
            parse_time_of_day("21:50:30").unwrap(),
            NaiveTime::from_hms_opt(21, 50, 30).unwrap()
        );
    }

    #[test]
    fn rejects_garbage_times() {
        assert!(parse_time_of_day("25:99").is_err());
        assert!(parse_time_of_day("soon").is_err());
        assert!(parse_time_of_day("").is_err());
    }

    #[test]
    fn target_date_today_and_tomorrow() {
        let now = beijing(2025, 9, 1, 21, 50, 0);
        assert_eq!(format_target_date(now, false), "2025-09-01");
        assert_eq!(format_target_date(now, true), "2025-09-02");
    }

    #[test]
    fn target_date_rolls_over_month_end() {
        let now = beijing(2025, 8, 31, 23, 59, 0);
        assert_eq!(format_target_date(now, true), "2025-09-01");
    }

    #[test]
    fn weekday_names_are_full_english() {
        // 2025-09-01 is a Monday.
        assert_eq!(weekday_full_name(beijing(2025, 9, 1, 0, 0, 0).weekday()), "Monday");
        assert_eq!(weekday_full_name(beijing(2025, 9, 7, 0, 0, 0).weekday()), "Sunday");
    }

    #[test]
    fn out_of_range_offset_falls_back_to_utc() {
        let clock = CivilClock::new(9999);
        // Just needs to not panic and produce a plausible date.
        assert_eq!(clock.target_date(false).len(), 10);
    }

    #[test]
    fn duration_until_rejects_bad_input() {
        let clock = CivilClock::new(8);
        assert!(clock.duration_until("nonsense").is_err());
    }
}
