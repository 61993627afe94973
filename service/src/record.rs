//! The durable unit of correlation state, and its freshness classification.

use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;
use pulse_matcher::MatchMethod;
use serde::Deserialize;
use serde::Serialize;

/// Sentinel target for failed mappings.
pub const UNKNOWN_TARGET: &str = "unknown";

/// How a mapping was produced. Persisted verbatim for observability of
/// match quality and drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingMethod {
    OrgMemberSearch,
    ExactUsernameMatch,
    FullNameFuzzy,
    EmailSearch,
    /// A fresh-cache activity fetch that reused the stored username.
    CachedRefresh,
}

impl MappingMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrgMemberSearch => "org_member_search",
            Self::ExactUsernameMatch => "exact_username_match",
            Self::FullNameFuzzy => "full_name_fuzzy",
            Self::EmailSearch => "email_search",
            Self::CachedRefresh => "cached_refresh",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "org_member_search" => Some(Self::OrgMemberSearch),
            "exact_username_match" => Some(Self::ExactUsernameMatch),
            "full_name_fuzzy" => Some(Self::FullNameFuzzy),
            "email_search" => Some(Self::EmailSearch),
            "cached_refresh" => Some(Self::CachedRefresh),
            _ => None,
        }
    }
}

impl From<MatchMethod> for MappingMethod {
    fn from(method: MatchMethod) -> Self {
        match method {
            MatchMethod::OrgMemberSearch => Self::OrgMemberSearch,
            MatchMethod::ExactUsernameMatch => Self::ExactUsernameMatch,
            MatchMethod::FullNameFuzzy => Self::FullNameFuzzy,
            MatchMethod::EmailSearch => Self::EmailSearch,
        }
    }
}

impl std::fmt::Display for MappingMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted mapping attempt. Immutable once created: refreshing a
/// mapping appends a new record, never edits an old one, so the store is an
/// audit log of matching drift over time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingRecord {
    pub id: i64,
    /// Tenant on whose behalf the mapping was attempted.
    pub owner_id: String,
    pub source_platform: String,
    pub source_identifier: String,
    pub target_platform: String,
    /// Resolved username, or [`UNKNOWN_TARGET`] on failure.
    pub target_identifier: String,
    pub mapping_successful: bool,
    /// Absent on failed attempts.
    pub mapping_method: Option<MappingMethod>,
    /// Commits + PRs + reviews observed when this mapping was last used.
    /// A successful mapping with zero data points resolves but carries no
    /// signal.
    pub data_points_count: i64,
    pub error_reason: Option<String>,
    /// Sole basis for freshness decisions.
    pub created_at: DateTime<Utc>,
}

/// Insert payload for a new mapping attempt.
#[derive(Debug, Clone)]
pub struct NewMapping {
    pub owner_id: String,
    pub source_platform: String,
    pub source_identifier: String,
    pub target_platform: String,
    pub target_identifier: String,
    pub mapping_successful: bool,
    pub mapping_method: Option<MappingMethod>,
    pub data_points_count: i64,
    pub error_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Outcome of classifying an identifier against its most recent record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Successful and young: reuse the username, fetch activity only.
    Fresh,
    /// Successful but old: the account may have been renamed; re-resolve.
    Stale,
    /// Failed long enough ago to try again.
    Retryable,
    /// Failed too recently: no re-attempt this run.
    Skip,
    /// Never attempted.
    Uncached,
}

/// Classify the latest record for an identifier. Pure function of the
/// record and `now`; thresholds come from the service config.
pub fn classify(
    record: Option<&MappingRecord>,
    now: DateTime<Utc>,
    cache_days: i64,
    failed_retry_hours: i64,
) -> CacheStatus {
    let Some(record) = record else {
        return CacheStatus::Uncached;
    };
    let age = now.signed_duration_since(record.created_at);
    if record.mapping_successful {
        if age < Duration::days(cache_days) {
            CacheStatus::Fresh
        } else {
            CacheStatus::Stale
        }
    } else if age >= Duration::hours(failed_retry_hours) {
        CacheStatus::Retryable
    } else {
        CacheStatus::Skip
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(successful: bool, age: Duration, now: DateTime<Utc>) -> MappingRecord {
        MappingRecord {
            id: 1,
            owner_id: "owner-1".to_string(),
            source_platform: "rootly".to_string(),
            source_identifier: "jane@acme.com".to_string(),
            target_platform: "github".to_string(),
            target_identifier: if successful {
                "janedoe".to_string()
            } else {
                UNKNOWN_TARGET.to_string()
            },
            mapping_successful: successful,
            mapping_method: successful.then_some(MappingMethod::OrgMemberSearch),
            data_points_count: 0,
            error_reason: (!successful).then(|| "identity not found".to_string()),
            created_at: now - age,
        }
    }

    #[test]
    fn missing_record_is_uncached() {
        assert_eq!(classify(None, Utc::now(), 7, 24), CacheStatus::Uncached);
    }

    #[test]
    fn successful_record_is_fresh_until_seven_days() {
        let now = Utc::now();
        let young = record(true, Duration::days(7) - Duration::seconds(1), now);
        assert_eq!(classify(Some(&young), now, 7, 24), CacheStatus::Fresh);

        let boundary = record(true, Duration::days(7), now);
        assert_eq!(classify(Some(&boundary), now, 7, 24), CacheStatus::Stale);

        let old = record(true, Duration::days(30), now);
        assert_eq!(classify(Some(&old), now, 7, 24), CacheStatus::Stale);
    }

    #[test]
    fn failed_record_skips_inside_cooldown() {
        let now = Utc::now();
        let recent = record(false, Duration::hours(1), now);
        assert_eq!(classify(Some(&recent), now, 7, 24), CacheStatus::Skip);

        let boundary = record(false, Duration::hours(24), now);
        assert_eq!(classify(Some(&boundary), now, 7, 24), CacheStatus::Retryable);
    }

    #[test]
    fn mapping_method_round_trips_through_text() {
        for method in [
            MappingMethod::OrgMemberSearch,
            MappingMethod::ExactUsernameMatch,
            MappingMethod::FullNameFuzzy,
            MappingMethod::EmailSearch,
            MappingMethod::CachedRefresh,
        ] {
            assert_eq!(MappingMethod::parse(method.as_str()), Some(method));
        }
        assert_eq!(MappingMethod::parse("unheard_of"), None);
    }
}
