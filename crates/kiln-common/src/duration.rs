use chrono::{DateTime, Utc};

/// Display value for a build whose duration cannot be derived yet.
pub const IN_PROGRESS: &str = "in progress…";

/// Derive the display duration of a build.
///
/// Returns [`IN_PROGRESS`] unless both timestamps are present and the end is
/// strictly after the start. Non-positive spans are clamped to
/// [`IN_PROGRESS`] rather than rendered as zero or negative.
pub fn format_duration(started_at: Option<DateTime<Utc>>, finished_at: Option<DateTime<Utc>>) -> String {
    match (started_at, finished_at) {
        (Some(start), Some(end)) if end > start => {
            let secs = (end - start).num_seconds();
            format_span(secs.max(0) as u64)
        }
        _ => IN_PROGRESS.to_string(),
    }
}

/// Render a span of whole seconds as `"1h 2m 3s"`, `"2m 5s"` or `"45s"`.
pub fn format_span(total_secs: u64) -> String {
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_two_minutes_five_seconds() {
        let start = t0();
        let end = start + Duration::seconds(125);
        assert_eq!(format_duration(Some(start), Some(end)), "2m 5s");
    }

    #[test]
    fn test_missing_finish_is_in_progress() {
        assert_eq!(format_duration(Some(t0()), None), IN_PROGRESS);
    }

    #[test]
    fn test_missing_start_is_in_progress() {
        assert_eq!(format_duration(None, Some(t0())), IN_PROGRESS);
    }

    #[test]
    fn test_equal_timestamps_clamp_to_in_progress() {
        assert_eq!(format_duration(Some(t0()), Some(t0())), IN_PROGRESS);
    }

    #[test]
    fn test_finish_before_start_clamps_to_in_progress() {
        let start = t0();
        let end = start - Duration::seconds(30);
        assert_eq!(format_duration(Some(start), Some(end)), IN_PROGRESS);
    }

    #[test]
    fn test_sub_minute_span() {
        assert_eq!(format_span(45), "45s");
    }

    #[test]
    fn test_hour_span_keeps_zero_minutes() {
        assert_eq!(format_span(3600 + 7), "1h 0m 7s");
    }

    #[test]
    fn test_sub_second_span_rounds_down() {
        let start = t0();
        let end = start + Duration::milliseconds(400);
        assert_eq!(format_duration(Some(start), Some(end)), "0s");
    }
}
