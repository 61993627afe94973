//! Live activity counting for a resolved username.
//!
//! Activity is never cached: the counts feed trend analysis and must be
//! fresh every run. Only the username mapping in front of these calls is
//! durable.

use chrono::DateTime;
use chrono::Duration as ChronoDuration;
use chrono::Utc;
use pulse_resilience::ResilienceError;
use pulse_resilience::ResilienceManager;

use crate::GitHubError;
use crate::client::GitHubClient;

const MAX_RETRIES: u32 = 3;

/// Raw provider activity for one user over the lookback window.
#[derive(Debug, Clone, Default)]
pub struct RawActivity {
    pub commit_count: u64,
    pub pr_count: u64,
    pub review_count: u64,
    /// Author timestamps from the first commit-search page, used to estimate
    /// after-hours and weekend shares.
    pub commit_timestamps: Vec<DateTime<Utc>>,
}

impl RawActivity {
    /// Commits + PRs + reviews; the `data_points_count` recorded on the
    /// mapping.
    pub fn data_points(&self) -> u64 {
        self.commit_count + self.pr_count + self.review_count
    }
}

/// Fetch commit, PR and review counts for `login` over the last
/// `lookback_days` days. Every request goes through the shared resilience
/// manager.
pub async fn fetch_activity(
    client: &GitHubClient,
    resilience: &ResilienceManager,
    login: &str,
    lookback_days: u32,
) -> Result<RawActivity, ResilienceError<GitHubError>> {
    let since = (Utc::now() - ChronoDuration::days(i64::from(lookback_days)))
        .format("%Y-%m-%d")
        .to_string();

    let commit_query = format!("author:{login} author-date:>{since}");
    let commits = resilience
        .execute("search_commits", MAX_RETRIES, || {
            let q = commit_query.clone();
            async move { client.search_commits(&q).await }
        })
        .await?;

    let pr_query = format!("type:pr author:{login} created:>{since}");
    let pr_count = resilience
        .execute("search_prs", MAX_RETRIES, || {
            let q = pr_query.clone();
            async move { client.search_issue_count(&q).await }
        })
        .await?;

    let review_query = format!("type:pr reviewed-by:{login} updated:>{since}");
    let review_count = resilience
        .execute("search_reviews", MAX_RETRIES, || {
            let q = review_query.clone();
            async move { client.search_issue_count(&q).await }
        })
        .await?;

    let activity = RawActivity {
        commit_count: commits.total_count,
        pr_count,
        review_count,
        commit_timestamps: commits.items.iter().map(|c| c.authored_at).collect(),
    };
    tracing::debug!(
        login,
        commits = activity.commit_count,
        prs = activity.pr_count,
        reviews = activity.review_count,
        "fetched activity"
    );
    Ok(activity)
}
