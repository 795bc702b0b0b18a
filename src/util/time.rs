//! Time formatting utilities.

use chrono::{DateTime, Utc};

/// Format a countdown from `now` to a future time.
#[must_use]
pub fn format_countdown(target: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let duration = target.signed_duration_since(now);

    if duration.num_seconds() <= 0 {
        return "now".to_string();
    }

    let hours = duration.num_hours();
    let minutes = duration.num_minutes() % 60;

    if hours > 24 {
        let days = hours / 24;
        format!("in {days} day{}", if days == 1 { "" } else { "s" })
    } else if hours > 0 {
        format!("in {hours}h {minutes}m")
    } else if minutes > 0 {
        format!("in {minutes}m")
    } else {
        let seconds = duration.num_seconds();
        format!("in {seconds}s")
    }
}

/// Clock time plus countdown, e.g. `14:05:00 UTC (in 3m)`.
#[must_use]
pub fn format_reset(target: DateTime<Utc>, now: DateTime<Utc>) -> String {
    format!(
        "{} ({})",
        target.format("%H:%M:%S UTC"),
        format_countdown(target, now)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn countdown_ranges() {
        let now = noon();
        assert_eq!(format_countdown(now - Duration::seconds(5), now), "now");
        assert_eq!(format_countdown(now + Duration::seconds(42), now), "in 42s");
        assert_eq!(format_countdown(now + Duration::minutes(7), now), "in 7m");
        assert_eq!(
            format_countdown(now + Duration::hours(3) + Duration::minutes(30), now),
            "in 3h 30m"
        );
        assert_eq!(format_countdown(now + Duration::days(3), now), "in 3 days");
    }

    #[test]
    fn reset_includes_clock_time() {
        let now = noon();
        assert_eq!(
            format_reset(now + Duration::minutes(3), now),
            "12:03:00 UTC (in 3m)"
        );
    }
}
