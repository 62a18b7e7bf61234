//! Daily run scheduling
//!
//! A plain sleep loop: compute the delay until the next occurrence of the
//! configured local time of day, sleep, trigger a run, repeat. Overlap
//! protection lives in the orchestrator's run guard, so a slow run simply
//! causes the next trigger to be skipped and logged. Shutdown is cooperative
//! through the shared cancellation token.

use chrono::{DateTime, Duration as ChronoDuration, Local, NaiveTime};
use std::time::Duration;

/// Delay from `now` until the next occurrence of `at` (local time).
///
/// When today's occurrence has already passed, the run is scheduled for
/// tomorrow.
pub fn next_run_delay(now: DateTime<Local>, at: NaiveTime) -> Duration {
    let today_run = now.date_naive().and_time(at);
    let next = if now.naive_local() < today_run {
        today_run
    } else {
        today_run + ChronoDuration::days(1)
    };
    (next - now.naive_local())
        .to_std()
        .unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn local(h: u32, m: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 8, 7, h, m, 0).unwrap()
    }

    #[test]
    fn test_delay_before_todays_run() {
        let delay = next_run_delay(local(1, 0), NaiveTime::from_hms_opt(2, 0, 0).unwrap());
        assert_eq!(delay, Duration::from_secs(3600));
    }

    #[test]
    fn test_delay_after_todays_run_rolls_to_tomorrow() {
        let delay = next_run_delay(local(3, 0), NaiveTime::from_hms_opt(2, 0, 0).unwrap());
        assert_eq!(delay, Duration::from_secs(23 * 3600));
    }

    #[test]
    fn test_delay_at_exact_run_time_rolls_to_tomorrow() {
        let delay = next_run_delay(local(2, 0), NaiveTime::from_hms_opt(2, 0, 0).unwrap());
        assert_eq!(delay, Duration::from_secs(24 * 3600));
    }
}
