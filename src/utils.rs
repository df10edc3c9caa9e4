pub fn format_duration(seconds: i64) -> String {
    let days = seconds / 86400;
    let hours = (seconds % 86400) / 3600;
    let mins = (seconds % 3600) / 60;
    let secs = seconds % 60;

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(format!("{}d", days));
    }
    if hours > 0 {
        parts.push(format!("{}h", hours));
    }
    if mins > 0 {
        parts.push(format!("{}m", mins));
    }
    if secs > 0 || (days == 0 && hours == 0 && mins == 0) {
        parts.push(format!("{}s", secs));
    }

    parts.join(" ")
}

/// `MM:SS` countdown form, minutes are not wrapped into hours.
pub fn format_clock(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// Epoch milliseconds to local `HH:MM:SS`, empty when out of range.
pub fn format_expiry(expires_at: i64) -> String {
    chrono::DateTime::from_timestamp_millis(expires_at)
        .map(|t| t.with_timezone(&chrono::Local).format("%H:%M:%S").to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "0s");
        assert_eq!(format_duration(59), "59s");
        assert_eq!(format_duration(60), "1m");
        assert_eq!(format_duration(61), "1m 1s");
        assert_eq!(format_duration(1800), "30m");
        assert_eq!(format_duration(3661), "1h 1m 1s");
        assert_eq!(format_duration(86400 + 3600 + 60 + 1), "1d 1h 1m 1s");
    }

    #[test]
    fn test_format_clock() {
        assert_eq!(format_clock(0), "00:00");
        assert_eq!(format_clock(59), "00:59");
        assert_eq!(format_clock(25 * 60), "25:00");
        assert_eq!(format_clock(299), "04:59");
        assert_eq!(format_clock(100 * 60 + 5), "100:05");
    }

    #[test]
    fn test_format_expiry_out_of_range() {
        assert_eq!(format_expiry(i64::MAX), "");
        assert_eq!(format_expiry(0).len(), 8);
    }
}
