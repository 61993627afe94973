//! Per-user activity summary derived from raw provider counts.

use chrono::Datelike;
use chrono::Timelike;
use chrono::Weekday;
use pulse_github::RawActivity;
use serde::Serialize;

/// Working-hours window, UTC. Commits authored outside it count as
/// after-hours.
const WORKDAY_START_HOUR: u32 = 8;
const WORKDAY_END_HOUR: u32 = 18;

/// Activity summary for one resolved user over the lookback window.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ActivitySummary {
    pub username: String,
    pub commits: u64,
    pub pull_requests: u64,
    pub reviews: u64,
    /// Share of sampled commits authored outside working hours, 0-100.
    pub after_hours_pct: f64,
    /// Share of sampled commits authored on Saturday or Sunday, 0-100.
    pub weekend_pct: f64,
}

impl ActivitySummary {
    pub fn from_activity(username: &str, activity: &RawActivity) -> Self {
        let sampled = activity.commit_timestamps.len();
        let (after_hours, weekend) = if sampled == 0 {
            (0.0, 0.0)
        } else {
            let after_hours = activity
                .commit_timestamps
                .iter()
                .filter(|ts| {
                    let hour = ts.hour();
                    hour < WORKDAY_START_HOUR || hour >= WORKDAY_END_HOUR
                })
                .count();
            let weekend = activity
                .commit_timestamps
                .iter()
                .filter(|ts| {
                    matches!(ts.weekday(), Weekday::Sat | Weekday::Sun)
                })
                .count();
            (
                after_hours as f64 * 100.0 / sampled as f64,
                weekend as f64 * 100.0 / sampled as f64,
            )
        };
        Self {
            username: username.to_string(),
            commits: activity.commit_count,
            pull_requests: activity.pr_count,
            reviews: activity.review_count,
            after_hours_pct: after_hours,
            weekend_pct: weekend,
        }
    }

    pub fn total_data_points(&self) -> u64 {
        self.commits + self.pull_requests + self.reviews
    }
}
