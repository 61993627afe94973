//! HTTP client for the GitHub REST API.

use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use reqwest::header::HeaderValue;
use std::time::Duration;

use crate::GitHubResult;
use crate::error::GitHubError;
use crate::types::CommitSearchDto;
use crate::types::CommitSearchPage;
use crate::types::IssueSearchDto;
use crate::types::OrgMember;
use crate::types::SearchUsersDto;
use crate::types::SearchUsersPage;
use crate::types::UserDto;
use crate::types::UserProfile;

const DEFAULT_BASE_URL: &str = "https://api.github.com";
const USER_AGENT: &str = "pulse-activity-collector/0.1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MEMBERS_PAGE_SIZE: usize = 100;

/// Media type for the standard REST surface.
const ACCEPT_JSON: &str = "application/vnd.github+json";
/// Commit search still requires the cloak preview media type.
const ACCEPT_COMMIT_SEARCH: &str = "application/vnd.github.cloak-preview+json";

/// Thin typed client. Owns the `reqwest::Client` and the token; performs no
/// retries itself — wrap calls in a `ResilienceManager`.
pub struct GitHubClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl GitHubClient {
    pub fn new(token: Option<String>) -> GitHubResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
            token,
        })
    }

    /// Reads the token from `GITHUB_TOKEN`; unauthenticated when unset.
    pub fn from_env() -> GitHubResult<Self> {
        Self::new(std::env::var("GITHUB_TOKEN").ok())
    }

    /// Point the client at a different API root. Used by tests to target a
    /// mock server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// `GET /users/{login}`: existence and profile check. Absence is a
    /// normal outcome, not an error.
    pub async fn get_user(&self, login: &str) -> GitHubResult<Option<UserProfile>> {
        let path = format!("/users/{}", urlencoding::encode(login));
        match self.get_json::<UserDto>(&path, ACCEPT_JSON).await {
            Ok(dto) => Ok(Some(dto.into())),
            Err(GitHubError::NotFound) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// `GET /orgs/{org}/members`: full paginated member enumeration. An
    /// unknown (or inaccessible) organization yields an empty list.
    pub async fn org_members(&self, org: &str) -> GitHubResult<Vec<OrgMember>> {
        let mut members = Vec::new();
        let mut page = 1usize;
        loop {
            let path = format!(
                "/orgs/{}/members?per_page={MEMBERS_PAGE_SIZE}&page={page}",
                urlencoding::encode(org)
            );
            let batch = match self.get_json::<Vec<UserDto>>(&path, ACCEPT_JSON).await {
                Ok(batch) => batch,
                Err(GitHubError::NotFound) => {
                    tracing::debug!(org, "organization not found or not visible");
                    return Ok(Vec::new());
                }
                Err(err) => return Err(err),
            };
            let batch_len = batch.len();
            members.extend(batch.into_iter().map(OrgMember::from));
            if batch_len < MEMBERS_PAGE_SIZE {
                break;
            }
            page += 1;
        }
        tracing::debug!(org, count = members.len(), "enumerated org members");
        Ok(members)
    }

    /// `GET /search/users?q=...`. Expensive and rate-limit-heavy; callers
    /// use it sparingly.
    pub async fn search_users(&self, query: &str) -> GitHubResult<SearchUsersPage> {
        let path = format!("/search/users?q={}", urlencoding::encode(query));
        let dto = self.get_json::<SearchUsersDto>(&path, ACCEPT_JSON).await?;
        Ok(dto.into())
    }

    /// `GET /search/commits?q=...`, first page with author timestamps.
    pub async fn search_commits(&self, query: &str) -> GitHubResult<CommitSearchPage> {
        let path = format!(
            "/search/commits?q={}&per_page=100",
            urlencoding::encode(query)
        );
        let dto = self
            .get_json::<CommitSearchDto>(&path, ACCEPT_COMMIT_SEARCH)
            .await?;
        Ok(dto.into())
    }

    /// `GET /search/issues?q=...` reduced to its total count.
    pub async fn search_issue_count(&self, query: &str) -> GitHubResult<u64> {
        let path = format!(
            "/search/issues?q={}&per_page=1",
            urlencoding::encode(query)
        );
        let dto = self.get_json::<IssueSearchDto>(&path, ACCEPT_JSON).await?;
        Ok(dto.total_count)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path_and_query: &str,
        accept: &'static str,
    ) -> GitHubResult<T> {
        let url = format!("{}{}", self.base_url, path_and_query);
        let mut request = self
            .http
            .get(&url)
            .header(reqwest::header::ACCEPT, HeaderValue::from_static(accept));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;

        let status = response.status();
        if status.is_success() {
            let body = response.bytes().await?;
            return serde_json::from_slice(&body)
                .map_err(|e| GitHubError::Parse(format!("{path_and_query}: {e}")));
        }

        let headers = response.headers().clone();
        let message = extract_error_message(response).await;
        Err(classify_status(status, &headers, message))
    }
}

/// Map a non-success response to the error taxonomy. 403 is ambiguous on
/// this API: it covers both exhausted rate limits and forbidden tokens, so
/// the rate-limit headers decide.
fn classify_status(status: StatusCode, headers: &HeaderMap, message: String) -> GitHubError {
    match status {
        StatusCode::NOT_FOUND => GitHubError::NotFound,
        StatusCode::UNAUTHORIZED => GitHubError::Auth { status: 401 },
        StatusCode::TOO_MANY_REQUESTS => GitHubError::RateLimited {
            retry_after: retry_after_secs(headers),
        },
        StatusCode::FORBIDDEN => {
            let remaining = headers
                .get("x-ratelimit-remaining")
                .and_then(|v| v.to_str().ok());
            if remaining == Some("0") {
                GitHubError::RateLimited {
                    retry_after: retry_after_secs(headers),
                }
            } else {
                GitHubError::Auth { status: 403 }
            }
        }
        _ => GitHubError::Api {
            status: status.as_u16(),
            message,
        },
    }
}

fn retry_after_secs(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

async fn extract_error_message(response: reqwest::Response) -> String {
    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<serde_json::Value>(&body) {
        Ok(json) => json
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or(body),
        Err(_) => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forbidden_with_exhausted_quota_is_rate_limited() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("0"));
        headers.insert(reqwest::header::RETRY_AFTER, HeaderValue::from_static("42"));
        let err = classify_status(StatusCode::FORBIDDEN, &headers, String::new());
        assert!(matches!(
            err,
            GitHubError::RateLimited {
                retry_after: Some(42)
            }
        ));
    }

    #[test]
    fn forbidden_without_quota_marker_is_auth() {
        let headers = HeaderMap::new();
        let err = classify_status(StatusCode::FORBIDDEN, &headers, String::new());
        assert!(matches!(err, GitHubError::Auth { status: 403 }));
    }

    #[test]
    fn server_error_carries_status_and_message() {
        let headers = HeaderMap::new();
        let err = classify_status(
            StatusCode::BAD_GATEWAY,
            &headers,
            "upstream choked".to_string(),
        );
        match err {
            GitHubError::Api { status, message } => {
                assert_eq!(status, 502);
                assert_eq!(message, "upstream choked");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }
}
