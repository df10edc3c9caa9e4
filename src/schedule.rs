use crate::models::Schedule;
use chrono::{DateTime, Datelike, TimeZone, Timelike};

/// Minutes since midnight for an `HH:MM` string.
pub fn parse_hhmm(value: &str) -> Option<u32> {
    let (hours, minutes) = value.trim().split_once(':')?;
    let hours: u32 = hours.parse().ok()?;
    let minutes: u32 = minutes.parse().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }
    Some(hours * 60 + minutes)
}

/// Inclusive on both ends, at minute resolution. A window whose end precedes
/// its start is never active.
pub fn is_within_schedule<Tz: TimeZone>(schedule: &Schedule, now: &DateTime<Tz>) -> bool {
    if !schedule.enabled {
        return false;
    }

    let weekday = now.weekday().num_days_from_sunday() as u8;
    if !schedule.days.contains(&weekday) {
        return false;
    }

    let (Some(start), Some(end)) = (
        parse_hhmm(&schedule.start_time),
        parse_hhmm(&schedule.end_time),
    ) else {
        log::warn!(
            "Schedule '{}' has unreadable times {}-{}, treating as inactive",
            schedule.id,
            schedule.start_time,
            schedule.end_time
        );
        return false;
    };

    let current = now.hour() * 60 + now.minute();
    start <= current && current <= end
}

pub fn is_any_schedule_active<Tz: TimeZone>(schedules: &[Schedule], now: &DateTime<Tz>) -> bool {
    schedules.iter().any(|s| is_within_schedule(s, now))
}

/// Whether blocking may apply at `now`. With no enabled schedule there is no
/// gating at all; otherwise one enabled schedule has to be active.
pub fn blocking_eligible<Tz: TimeZone>(schedules: &[Schedule], now: &DateTime<Tz>) -> bool {
    if !schedules.iter().any(|s| s.enabled) {
        return true;
    }
    is_any_schedule_active(schedules, now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, Utc};

    fn schedule(days: &[u8], start: &str, end: &str) -> Schedule {
        Schedule {
            id: "s".to_string(),
            name: "Work hours".to_string(),
            days: days.iter().copied().collect(),
            start_time: start.to_string(),
            end_time: end.to_string(),
            enabled: true,
        }
    }

    #[test]
    fn test_parse_hhmm() {
        assert_eq!(parse_hhmm("09:00"), Some(540));
        assert_eq!(parse_hhmm("9:05"), Some(545));
        assert_eq!(parse_hhmm("23:59"), Some(1439));
        assert_eq!(parse_hhmm("24:00"), None);
        assert_eq!(parse_hhmm("nine"), None);
        assert_eq!(parse_hhmm("0900"), None);
    }

    #[test]
    fn test_schedule_inclusive_end() {
        // 2024-01-03 is a Wednesday.
        let s = schedule(&[3], "09:00", "17:00");
        let at_end = Utc.with_ymd_and_hms(2024, 1, 3, 17, 0, 0).unwrap();
        let after_end = Utc.with_ymd_and_hms(2024, 1, 3, 17, 1, 0).unwrap();
        let at_start = Utc.with_ymd_and_hms(2024, 1, 3, 9, 0, 0).unwrap();
        let thursday = Utc.with_ymd_and_hms(2024, 1, 4, 10, 0, 0).unwrap();

        assert!(is_within_schedule(&s, &at_end));
        assert!(!is_within_schedule(&s, &after_end));
        assert!(is_within_schedule(&s, &at_start));
        assert!(!is_within_schedule(&s, &thursday));
    }

    #[test]
    fn test_schedule_uses_local_wall_clock() {
        let s = schedule(&[0, 1, 2, 3, 4, 5, 6], "09:00", "17:00");
        let noon = Local.with_ymd_and_hms(2024, 1, 3, 12, 0, 0).unwrap();
        assert!(is_within_schedule(&s, &noon));
    }

    #[test]
    fn test_no_midnight_wraparound() {
        let s = schedule(&[3], "22:00", "06:00");
        let late = Utc.with_ymd_and_hms(2024, 1, 3, 23, 0, 0).unwrap();
        let early = Utc.with_ymd_and_hms(2024, 1, 3, 5, 0, 0).unwrap();
        assert!(!is_within_schedule(&s, &late));
        assert!(!is_within_schedule(&s, &early));
    }

    #[test]
    fn test_disabled_schedule_inactive() {
        let mut s = schedule(&[3], "00:00", "23:59");
        s.enabled = false;
        let now = Utc.with_ymd_and_hms(2024, 1, 3, 12, 0, 0).unwrap();
        assert!(!is_within_schedule(&s, &now));
    }

    #[test]
    fn test_gating() {
        let now = Utc.with_ymd_and_hms(2024, 1, 3, 12, 0, 0).unwrap();
        assert!(blocking_eligible(&[], &now));

        let mut off = schedule(&[3], "13:00", "14:00");
        off.enabled = false;
        assert!(blocking_eligible(&[off.clone()], &now));

        let morning = schedule(&[3], "08:00", "11:00");
        assert!(!blocking_eligible(&[morning.clone(), off.clone()], &now));

        let midday = schedule(&[3], "11:30", "12:30");
        assert!(blocking_eligible(&[morning, midday, off], &now));
    }
}
