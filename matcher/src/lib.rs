//! Identity resolution against the provider's user directory.
//!
//! Given a person known only by an email address or display name, plus the
//! organizations they are expected to belong to, the matcher runs an ordered
//! chain of strategies until one produces a username:
//!
//! 1. organization member enumeration with substring/pattern scoring,
//! 2. canonical username pattern probing (`first+last`, `first.last`, ...),
//! 3. fuzzy display-name matching over full member profiles (name entry
//!    point only),
//! 4. a single provider email search (email entry point only) as the
//!    last-resort fallback.
//!
//! The final candidate must always be a verified member of at least one
//! caller-supplied organization; identically-named accounts outside that
//! trust boundary never match. Unresolved identities are `Ok(None)`, never
//! an error — only rejected credentials escalate, because the whole batch
//! must stop using that token.

mod cache;
mod patterns;
mod scoring;

pub use cache::OrgMemberCache;
pub use patterns::username_candidates;
pub use scoring::NameParts;
pub use scoring::blended_name_score;
pub use scoring::similarity;
pub use scoring::substring_score;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use pulse_github::GitHubClient;
use pulse_github::GitHubError;
use pulse_github::OrgMember;
use pulse_resilience::ResilienceError;
use pulse_resilience::ResilienceManager;
use serde::Deserialize;
use serde::Serialize;
use tokio::sync::Mutex;

/// Which strategy resolved a mapping. Persisted on the mapping record for
/// observability of match quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    OrgMemberSearch,
    ExactUsernameMatch,
    FullNameFuzzy,
    /// Provider email search, the last-resort fallback.
    EmailSearch,
}

impl std::fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OrgMemberSearch => write!(f, "org_member_search"),
            Self::ExactUsernameMatch => write!(f, "exact_username_match"),
            Self::FullNameFuzzy => write!(f, "full_name_fuzzy"),
            Self::EmailSearch => write!(f, "email_search"),
        }
    }
}

/// A successful resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub username: String,
    pub method: MatchMethod,
}

/// The only failure a caller must handle: rejected credentials. Everything
/// else degrades to "no signal" inside the chain.
#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    #[error("provider authentication rejected")]
    Auth(#[source] GitHubError),
}

/// Matcher tunables. The similarity cutoffs are empirically chosen and
/// directly trade false positives against false negatives, so they are
/// configurable per tenant rather than hard-coded.
#[derive(Debug, Clone)]
pub struct MatcherConfig {
    /// Minimum substring-containment score for strategy 1 (exclusive).
    pub substring_score_threshold: f64,
    /// Minimum blended fuzzy score for strategy 3 (inclusive).
    pub fuzzy_similarity_threshold: f64,
    /// Pause between per-member profile fetches in strategy 3, to smooth
    /// request bursts against the shared rate limiter.
    pub profile_fetch_delay: Duration,
    /// Pause between strategies.
    pub strategy_pause: Duration,
    /// Retries per provider call.
    pub max_retries: u32,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            substring_score_threshold: 0.5,
            fuzzy_similarity_threshold: 0.65,
            profile_fetch_delay: Duration::from_millis(150),
            strategy_pause: Duration::from_millis(250),
            max_retries: 3,
        }
    }
}

/// Resolves fuzzy person identifiers to provider usernames.
///
/// Holds session-scoped caches only; durable mapping state lives upstream
/// in the mapping cache service.
pub struct IdentityMatcher {
    client: Arc<GitHubClient>,
    resilience: Arc<ResilienceManager>,
    config: MatcherConfig,
    org_cache: OrgMemberCache,
    /// email -> resolution outcome, per session.
    email_memo: Mutex<HashMap<String, Option<Resolved>>>,
    /// username -> existence, per session.
    existence_memo: Mutex<HashMap<String, bool>>,
}

impl IdentityMatcher {
    pub fn new(
        client: Arc<GitHubClient>,
        resilience: Arc<ResilienceManager>,
        config: MatcherConfig,
    ) -> Self {
        Self {
            client,
            resilience,
            config,
            org_cache: OrgMemberCache::new(),
            email_memo: Mutex::new(HashMap::new()),
            existence_memo: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve an email and/or display name to a provider username.
    ///
    /// Strategies run strictly sequentially; each one's cost is only paid
    /// if the previous one failed. Returns `Ok(None)` when no confident
    /// match exists.
    pub async fn resolve(
        &self,
        email: Option<&str>,
        full_name: Option<&str>,
        organizations: &[String],
    ) -> Result<Option<Resolved>, MatchError> {
        let memo_key = email.map(str::to_lowercase);
        if let Some(key) = &memo_key {
            if let Some(hit) = self.email_memo.lock().await.get(key) {
                tracing::debug!(email = %key, "memoized resolution reused");
                return Ok(hit.clone());
            }
        }

        let parts = email
            .and_then(NameParts::from_email)
            .or_else(|| full_name.and_then(NameParts::from_full_name));
        let Some(parts) = parts else {
            return Ok(None);
        };
        // Membership verification is mandatory; without a trust boundary
        // there is nothing to verify against.
        if organizations.is_empty() {
            return Ok(None);
        }

        let resolved = self
            .run_chain(&parts, email, full_name, organizations)
            .await?;
        match &resolved {
            Some(hit) => tracing::info!(
                username = %hit.username,
                method = %hit.method,
                "identity resolved"
            ),
            None => tracing::debug!(?parts, "identity unresolved"),
        }
        if let Some(key) = memo_key {
            self.email_memo.lock().await.insert(key, resolved.clone());
        }
        Ok(resolved)
    }

    async fn run_chain(
        &self,
        parts: &NameParts,
        email: Option<&str>,
        full_name: Option<&str>,
        organizations: &[String],
    ) -> Result<Option<Resolved>, MatchError> {
        if let Some(hit) = self.match_org_members(parts, organizations).await? {
            return Ok(Some(hit));
        }
        tokio::time::sleep(self.config.strategy_pause).await;

        if let Some(hit) = self.match_username_patterns(parts, organizations).await? {
            return Ok(Some(hit));
        }

        if let Some(full_name) = full_name {
            tokio::time::sleep(self.config.strategy_pause).await;
            if let Some(hit) = self
                .match_full_name_fuzzy(full_name, parts, organizations)
                .await?
            {
                return Ok(Some(hit));
            }
        }

        if let Some(email) = email {
            tokio::time::sleep(self.config.strategy_pause).await;
            if let Some(hit) = self.match_email_search(email, organizations).await? {
                return Ok(Some(hit));
            }
        }
        Ok(None)
    }

    /// Strategy 1: score every org member's login against the name
    /// fragments. Candidates are members by construction. When the winning
    /// login is also one of the canonical patterns, the stronger evidence
    /// is reported (pattern matches carry less false-positive risk than
    /// substring overlap).
    async fn match_org_members(
        &self,
        parts: &NameParts,
        organizations: &[String],
    ) -> Result<Option<Resolved>, MatchError> {
        let patterns = username_candidates(parts);
        let mut best: Option<(f64, bool, String)> = None;
        for org in organizations {
            let members = self.members(org).await?;
            for member in members.iter() {
                let score = substring_score(&member.login, parts);
                if score <= self.config.substring_score_threshold {
                    continue;
                }
                let is_pattern = patterns.contains(&member.login.to_lowercase());
                let replace = match &best {
                    None => true,
                    // Ties: pattern evidence beats substring overlap, then
                    // the shorter login wins (less likely to be a
                    // coincidental superstring match).
                    Some((best_score, best_is_pattern, best_login)) => {
                        score > *best_score
                            || (score == *best_score
                                && (is_pattern > *best_is_pattern
                                    || (is_pattern == *best_is_pattern
                                        && member.login.len() < best_login.len())))
                    }
                };
                if replace {
                    best = Some((score, is_pattern, member.login.clone()));
                }
            }
        }

        let Some((score, is_pattern, login)) = best else {
            return Ok(None);
        };
        let method = if is_pattern {
            MatchMethod::ExactUsernameMatch
        } else {
            MatchMethod::OrgMemberSearch
        };
        tracing::debug!(login = %login, score, %method, "org member scoring matched");
        Ok(Some(Resolved {
            username: login,
            method,
        }))
    }

    /// Strategy 2: probe canonical username patterns for existence and
    /// verify org membership for the first hit.
    async fn match_username_patterns(
        &self,
        parts: &NameParts,
        organizations: &[String],
    ) -> Result<Option<Resolved>, MatchError> {
        let mut member_sets = Vec::with_capacity(organizations.len());
        for org in organizations {
            member_sets.push(self.members(org).await?);
        }

        for candidate in username_candidates(parts) {
            if !self.user_exists(&candidate).await? {
                continue;
            }
            let verified = member_sets
                .iter()
                .any(|members| members.iter().any(|m| m.login.eq_ignore_ascii_case(&candidate)));
            if verified {
                tracing::debug!(login = %candidate, "username pattern matched and verified");
                return Ok(Some(Resolved {
                    username: candidate,
                    method: MatchMethod::ExactUsernameMatch,
                }));
            }
            tracing::debug!(login = %candidate, "pattern exists but is outside the trust boundary");
        }
        Ok(None)
    }

    /// Strategy 3: fetch full profiles for every org member and pick the
    /// best fuzzy display-name match. Profile fetches are paced to avoid
    /// bursting the shared rate limiter.
    async fn match_full_name_fuzzy(
        &self,
        full_name: &str,
        parts: &NameParts,
        organizations: &[String],
    ) -> Result<Option<Resolved>, MatchError> {
        let mut best: Option<(f64, String)> = None;
        for org in organizations {
            let members = self.members(org).await?;
            for member in members.iter() {
                let profile = match self
                    .resilience
                    .execute("get_user_profile", self.config.max_retries, || async {
                        self.client.get_user(&member.login).await
                    })
                    .await
                {
                    Ok(profile) => profile,
                    Err(ResilienceError::Auth(err)) => return Err(MatchError::Auth(err)),
                    Err(err) => {
                        tracing::warn!(login = %member.login, error = %err, "profile fetch degraded");
                        None
                    }
                };
                tokio::time::sleep(self.config.profile_fetch_delay).await;

                let Some(display_name) = profile.and_then(|p| p.name) else {
                    continue;
                };
                let score = blended_name_score(&display_name, full_name, parts);
                if score < self.config.fuzzy_similarity_threshold {
                    continue;
                }
                let replace = match &best {
                    None => true,
                    Some((best_score, best_login)) => {
                        score > *best_score
                            || (score == *best_score && member.login.len() < best_login.len())
                    }
                };
                if replace {
                    best = Some((score, member.login.clone()));
                }
            }
        }

        Ok(best.map(|(score, login)| {
            tracing::debug!(login = %login, score, "fuzzy display-name matched");
            Resolved {
                username: login,
                method: MatchMethod::FullNameFuzzy,
            }
        }))
    }

    /// Strategy 4: direct provider email search. Expensive and rarely
    /// fruitful (profiles seldom expose emails), so it runs last and issues
    /// a single query. Hits still verify against the trust boundary.
    async fn match_email_search(
        &self,
        email: &str,
        organizations: &[String],
    ) -> Result<Option<Resolved>, MatchError> {
        let mut member_sets = Vec::with_capacity(organizations.len());
        for org in organizations {
            member_sets.push(self.members(org).await?);
        }

        let query = format!("{email} in:email");
        let page = match self
            .resilience
            .execute("search_users", self.config.max_retries, || async {
                self.client.search_users(&query).await
            })
            .await
        {
            Ok(page) => page,
            Err(ResilienceError::Auth(err)) => return Err(MatchError::Auth(err)),
            Err(err) => {
                tracing::warn!(error = %err, "email search degraded");
                return Ok(None);
            }
        };

        for profile in &page.items {
            let verified = member_sets.iter().any(|members| {
                members
                    .iter()
                    .any(|m| m.login.eq_ignore_ascii_case(&profile.login))
            });
            if verified {
                tracing::debug!(login = %profile.login, "email search matched and verified");
                return Ok(Some(Resolved {
                    username: profile.login.clone(),
                    method: MatchMethod::EmailSearch,
                }));
            }
            tracing::debug!(login = %profile.login, "email search hit is outside the trust boundary");
        }
        Ok(None)
    }

    /// Cached, single-flight org member enumeration. Transient failures
    /// cache an empty list for the session; rejected credentials escalate.
    async fn members(&self, org: &str) -> Result<Arc<Vec<OrgMember>>, MatchError> {
        self.org_cache
            .get_or_fetch(org, || async {
                let result = self
                    .resilience
                    .execute("org_members", self.config.max_retries, || async {
                        self.client.org_members(org).await
                    })
                    .await;
                match result {
                    Ok(members) => Ok(Arc::new(members)),
                    Err(ResilienceError::Auth(err)) => Err(MatchError::Auth(err)),
                    Err(err) => {
                        tracing::warn!(org, error = %err, "member enumeration degraded to empty");
                        Ok(Arc::new(Vec::new()))
                    }
                }
            })
            .await
    }

    /// Memoized existence probe. Only definitive answers are memoized;
    /// degraded calls report `false` without poisoning the session cache.
    async fn user_exists(&self, login: &str) -> Result<bool, MatchError> {
        if let Some(known) = self.existence_memo.lock().await.get(login) {
            return Ok(*known);
        }
        let result = self
            .resilience
            .execute("get_user", self.config.max_retries, || async {
                self.client.get_user(login).await
            })
            .await;
        let exists = match result {
            Ok(profile) => profile.is_some(),
            Err(ResilienceError::Auth(err)) => return Err(MatchError::Auth(err)),
            Err(err) => {
                tracing::warn!(login, error = %err, "existence probe degraded");
                return Ok(false);
            }
        };
        self.existence_memo
            .lock()
            .await
            .insert(login.to_string(), exists);
        Ok(exists)
    }
}
