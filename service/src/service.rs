//! Batch orchestration: cache-aware identity resolution plus live activity
//! collection.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::Stream;
use futures::StreamExt;
use futures::stream;
use pulse_github::GitHubClient;
use pulse_github::GitHubError;
use pulse_github::fetch_activity;
use pulse_matcher::IdentityMatcher;
use pulse_matcher::MatchError;
use pulse_resilience::HealthSnapshot;
use pulse_resilience::ResilienceError;
use pulse_resilience::ResilienceManager;

use crate::record::CacheStatus;
use crate::record::MappingMethod;
use crate::record::MappingRecord;
use crate::record::NewMapping;
use crate::record::UNKNOWN_TARGET;
use crate::record::classify;
use crate::store::CacheStatistics;
use crate::store::MappingStore;
use crate::store::StoreError;
use crate::summary::ActivitySummary;

/// Service tunables. Concurrency bounds keep provider fan-out polite even
/// for large teams.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Successful mappings younger than this are served from cache.
    pub mapping_cache_days: i64,
    /// Failed mappings younger than this are skipped outright.
    pub failed_retry_hours: i64,
    /// Parallelism for cache-hit activity refreshes.
    pub fresh_concurrency: usize,
    /// Parallelism for full resolution of cache misses.
    pub resolve_concurrency: usize,
    /// Optional wall-clock budget for a whole batch. On expiry the batch
    /// returns whatever it finished.
    pub batch_deadline: Option<Duration>,
    pub source_platform: String,
    pub target_platform: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            mapping_cache_days: 7,
            failed_retry_hours: 24,
            fresh_concurrency: 8,
            resolve_concurrency: 5,
            batch_deadline: None,
            source_platform: "rootly".to_string(),
            target_platform: "github".to_string(),
        }
    }
}

/// The failures a batch caller must handle. Everything recoverable is
/// absorbed inside the batch.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The provider rejected our credentials; the batch stops immediately
    /// rather than burning retries on every remaining identifier.
    #[error("provider authentication rejected; check the configured token")]
    Authentication(#[source] GitHubError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of one batch run.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// identifier -> activity summary, for every identifier that resolved
    /// and produced at least one data point.
    pub summaries: HashMap<String, ActivitySummary>,
    /// Identifiers skipped because a recent resolution attempt failed.
    pub skipped: Vec<String>,
    /// Identifiers left unprocessed when the batch deadline expired.
    pub unprocessed: Vec<String>,
}

/// Resilient, cache-aware mapping and activity service.
pub struct MappingService {
    client: Arc<GitHubClient>,
    resilience: Arc<ResilienceManager>,
    matcher: Arc<IdentityMatcher>,
    store: Arc<MappingStore>,
    config: ServiceConfig,
    owner_id: String,
}

enum Planned {
    /// Serve from cache; refresh activity for the cached username.
    Fresh { username: String },
    /// Run the full resolution chain.
    Resolve,
    /// Recent failure; do not touch the network.
    Skip,
}

impl MappingService {
    pub fn new(
        client: Arc<GitHubClient>,
        resilience: Arc<ResilienceManager>,
        matcher: Arc<IdentityMatcher>,
        store: Arc<MappingStore>,
        config: ServiceConfig,
        owner_id: String,
    ) -> Self {
        Self {
            client,
            resilience,
            matcher,
            store,
            config,
            owner_id,
        }
    }

    /// Resolve every identifier and collect activity for each resolved
    /// username over the last `lookback_days` days.
    ///
    /// Mappings are cached; activity never is. Fresh cache hits are
    /// refreshed first at higher parallelism, then misses go through the
    /// full resolution chain at bounded fan-out.
    pub async fn resolve_and_fetch(
        &self,
        identifiers: &[String],
        lookback_days: u32,
        organizations: &[String],
    ) -> Result<BatchOutcome, ServiceError> {
        let deadline = self
            .config
            .batch_deadline
            .map(|budget| tokio::time::Instant::now() + budget);
        let mut outcome = BatchOutcome::default();

        let mut fresh = Vec::new();
        let mut to_resolve = Vec::new();
        for identifier in identifiers {
            match self.plan(identifier).await {
                Planned::Fresh { username } => fresh.push((identifier.clone(), username)),
                Planned::Resolve => to_resolve.push(identifier.clone()),
                Planned::Skip => outcome.skipped.push(identifier.clone()),
            }
        }
        tracing::info!(
            total = identifiers.len(),
            cache_hits = fresh.len(),
            misses = to_resolve.len(),
            skipped = outcome.skipped.len(),
            "batch planned"
        );

        // Cache hits first: cheap, and they surface auth problems before
        // the expensive resolution work starts.
        let mut processed = HashSet::new();
        let refresh_done = {
            let refreshes = stream::iter(fresh.clone())
                .map(|(identifier, username)| async move {
                    let summary = self
                        .refresh_cached(&identifier, &username, lookback_days)
                        .await?;
                    Ok::<_, ServiceError>((identifier, summary))
                })
                .buffer_unordered(self.config.fresh_concurrency);
            self.drain(refreshes, deadline, &mut outcome, &mut processed)
                .await?
        };
        if !refresh_done {
            tracing::warn!("batch deadline expired during cache refresh");
            outcome.unprocessed = fresh
                .into_iter()
                .map(|(identifier, _)| identifier)
                .filter(|identifier| !processed.contains(identifier))
                .chain(to_resolve)
                .collect();
            return Ok(outcome);
        }

        let resolve_done = {
            let resolutions = stream::iter(to_resolve.clone())
                .map(|identifier| async move {
                    let summary = self
                        .resolve_one(&identifier, lookback_days, organizations)
                        .await?;
                    Ok::<_, ServiceError>((identifier, summary))
                })
                .buffer_unordered(self.config.resolve_concurrency);
            self.drain(resolutions, deadline, &mut outcome, &mut processed)
                .await?
        };
        if !resolve_done {
            tracing::warn!("batch deadline expired during resolution");
            outcome.unprocessed = to_resolve
                .into_iter()
                .filter(|identifier| !processed.contains(identifier))
                .collect();
        }

        Ok(outcome)
    }

    /// Drain a phase stream into the outcome, honoring the deadline.
    /// Returns `Ok(false)` when the deadline expired mid-phase.
    async fn drain<S>(
        &self,
        phase: S,
        deadline: Option<tokio::time::Instant>,
        outcome: &mut BatchOutcome,
        processed: &mut HashSet<String>,
    ) -> Result<bool, ServiceError>
    where
        S: Stream<Item = Result<(String, Option<ActivitySummary>), ServiceError>>,
    {
        futures::pin_mut!(phase);
        loop {
            let next = match deadline {
                Some(at) => match tokio::time::timeout_at(at, phase.next()).await {
                    Ok(next) => next,
                    Err(_) => return Ok(false),
                },
                None => phase.next().await,
            };
            match next {
                Some(Ok((identifier, summary))) => {
                    processed.insert(identifier.clone());
                    if let Some(summary) = summary {
                        outcome.summaries.insert(identifier, summary);
                    }
                }
                Some(Err(err)) => return Err(err),
                None => return Ok(true),
            }
        }
    }

    /// Decide what to do with one identifier based on its latest mapping
    /// record. A failed cache read degrades to a full resolution rather
    /// than failing the batch.
    async fn plan(&self, identifier: &str) -> Planned {
        let latest = match self
            .store
            .find_latest(&self.owner_id, identifier, &self.config.target_platform)
            .await
        {
            Ok(latest) => latest,
            Err(err) => {
                tracing::warn!(identifier, error = %err, "mapping lookup failed; treating as uncached");
                None
            }
        };
        let status = classify(
            latest.as_ref(),
            Utc::now(),
            self.config.mapping_cache_days,
            self.config.failed_retry_hours,
        );
        tracing::debug!(identifier, status = ?status, "cache classified");
        match status {
            CacheStatus::Fresh => match latest {
                Some(MappingRecord {
                    target_identifier, ..
                }) => Planned::Fresh {
                    username: target_identifier,
                },
                // classify never reports Fresh without a record.
                None => Planned::Resolve,
            },
            CacheStatus::Stale | CacheStatus::Retryable | CacheStatus::Uncached => Planned::Resolve,
            CacheStatus::Skip => Planned::Skip,
        }
    }

    /// Refresh activity for a fresh cache hit and append a refresh record
    /// so the mapping's age window restarts.
    async fn refresh_cached(
        &self,
        identifier: &str,
        username: &str,
        lookback_days: u32,
    ) -> Result<Option<ActivitySummary>, ServiceError> {
        let activity =
            match fetch_activity(&self.client, &self.resilience, username, lookback_days).await {
                Ok(activity) => activity,
                Err(ResilienceError::Auth(err)) => return Err(ServiceError::Authentication(err)),
                Err(err) => {
                    tracing::warn!(identifier, username, error = %err, "cached refresh degraded");
                    return Ok(None);
                }
            };
        let summary = ActivitySummary::from_activity(username, &activity);
        self.append_record(NewMapping {
            owner_id: self.owner_id.clone(),
            source_platform: self.config.source_platform.clone(),
            source_identifier: identifier.to_string(),
            target_platform: self.config.target_platform.clone(),
            target_identifier: username.to_string(),
            mapping_successful: true,
            mapping_method: Some(MappingMethod::CachedRefresh),
            data_points_count: activity.data_points() as i64,
            error_reason: None,
            created_at: Utc::now(),
        })
        .await;
        if summary.total_data_points() == 0 {
            return Ok(None);
        }
        Ok(Some(summary))
    }

    /// Full resolution for a cache miss: matcher chain, then activity, then
    /// an appended record either way.
    async fn resolve_one(
        &self,
        identifier: &str,
        lookback_days: u32,
        organizations: &[String],
    ) -> Result<Option<ActivitySummary>, ServiceError> {
        let (email, full_name) = split_identifier(identifier);
        let resolved = self
            .matcher
            .resolve(email, full_name, organizations)
            .await
            .map_err(|MatchError::Auth(err)| ServiceError::Authentication(err))?;

        let Some(resolved) = resolved else {
            self.append_record(NewMapping {
                owner_id: self.owner_id.clone(),
                source_platform: self.config.source_platform.clone(),
                source_identifier: identifier.to_string(),
                target_platform: self.config.target_platform.clone(),
                target_identifier: UNKNOWN_TARGET.to_string(),
                mapping_successful: false,
                mapping_method: None,
                data_points_count: 0,
                error_reason: Some("identity not found in configured organizations".to_string()),
                created_at: Utc::now(),
            })
            .await;
            return Ok(None);
        };

        let activity = match fetch_activity(
            &self.client,
            &self.resilience,
            &resolved.username,
            lookback_days,
        )
        .await
        {
            Ok(activity) => activity,
            Err(ResilienceError::Auth(err)) => return Err(ServiceError::Authentication(err)),
            Err(err) => {
                tracing::warn!(
                    identifier,
                    username = %resolved.username,
                    error = %err,
                    "activity fetch degraded after resolution"
                );
                Default::default()
            }
        };

        let summary = ActivitySummary::from_activity(&resolved.username, &activity);
        self.append_record(NewMapping {
            owner_id: self.owner_id.clone(),
            source_platform: self.config.source_platform.clone(),
            source_identifier: identifier.to_string(),
            target_platform: self.config.target_platform.clone(),
            target_identifier: resolved.username.clone(),
            mapping_successful: true,
            mapping_method: Some(resolved.method.into()),
            data_points_count: activity.data_points() as i64,
            error_reason: None,
            created_at: Utc::now(),
        })
        .await;

        if summary.total_data_points() == 0 {
            return Ok(None);
        }
        Ok(Some(summary))
    }

    /// Persistence is best-effort: a failed write costs a future cache hit,
    /// not this batch.
    async fn append_record(&self, mapping: NewMapping) {
        let identifier = mapping.source_identifier.clone();
        if let Err(err) = self.store.insert(mapping).await {
            tracing::warn!(identifier, error = %err, "mapping record write failed");
        }
    }

    /// Cache statistics for this owner.
    pub async fn cache_statistics(&self) -> Result<CacheStatistics, ServiceError> {
        Ok(self
            .store
            .statistics(&self.owner_id, self.config.mapping_cache_days)
            .await?)
    }

    /// Current circuit and rate-limiter health.
    pub async fn health(&self) -> HealthSnapshot {
        self.resilience.health().await
    }
}

/// An identifier containing `@` is an email; anything else is treated as a
/// display name.
fn split_identifier(identifier: &str) -> (Option<&str>, Option<&str>) {
    if identifier.contains('@') {
        (Some(identifier), None)
    } else {
        (None, Some(identifier))
    }
}
