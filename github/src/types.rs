//! Normalized provider payloads.
//!
//! Wire DTOs (private, serde) live next to the public structs they collapse
//! into. The public shapes carry exactly the fields the matcher and the
//! activity counter read.

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;

/// A provider user profile, as returned by `GET /users/{login}` or embedded
/// in search results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub login: String,
    /// Public display name. Rarely set; never assumed present downstream.
    pub name: Option<String>,
    /// Public email. Almost always hidden by the provider.
    pub email: Option<String>,
}

/// A member of an organization, from `GET /orgs/{org}/members`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrgMember {
    pub login: String,
}

/// One page of `GET /search/users` results.
#[derive(Debug, Clone)]
pub struct SearchUsersPage {
    pub total_count: u64,
    pub items: Vec<UserProfile>,
}

/// A commit hit from `GET /search/commits`, reduced to its author date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitItem {
    pub authored_at: DateTime<Utc>,
}

/// One page of `GET /search/commits` results.
#[derive(Debug, Clone)]
pub struct CommitSearchPage {
    pub total_count: u64,
    pub items: Vec<CommitItem>,
}

// --- wire shapes -----------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(crate) struct UserDto {
    pub login: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl From<UserDto> for UserProfile {
    fn from(dto: UserDto) -> Self {
        Self {
            login: dto.login,
            name: dto.name.filter(|n| !n.trim().is_empty()),
            email: dto.email.filter(|e| !e.trim().is_empty()),
        }
    }
}

impl From<UserDto> for OrgMember {
    fn from(dto: UserDto) -> Self {
        Self { login: dto.login }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchUsersDto {
    pub total_count: u64,
    #[serde(default)]
    pub items: Vec<UserDto>,
}

impl From<SearchUsersDto> for SearchUsersPage {
    fn from(dto: SearchUsersDto) -> Self {
        Self {
            total_count: dto.total_count,
            items: dto.items.into_iter().map(UserProfile::from).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CommitSearchDto {
    pub total_count: u64,
    #[serde(default)]
    pub items: Vec<CommitHitDto>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CommitHitDto {
    pub commit: CommitDto,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CommitDto {
    pub author: CommitAuthorDto,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CommitAuthorDto {
    pub date: DateTime<Utc>,
}

impl From<CommitSearchDto> for CommitSearchPage {
    fn from(dto: CommitSearchDto) -> Self {
        Self {
            total_count: dto.total_count,
            items: dto
                .items
                .into_iter()
                .map(|hit| CommitItem {
                    authored_at: hit.commit.author.date,
                })
                .collect(),
        }
    }
}

/// `GET /search/issues` reduced to its count.
#[derive(Debug, Deserialize)]
pub(crate) struct IssueSearchDto {
    pub total_count: u64,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn user_dto_normalizes_blank_fields_to_none() {
        let dto: UserDto = serde_json::from_str(
            r#"{"login": "janedoe", "name": "  ", "email": null}"#,
        )
        .expect("valid user json");
        let profile = UserProfile::from(dto);
        assert_eq!(profile.login, "janedoe");
        assert_eq!(profile.name, None);
        assert_eq!(profile.email, None);
    }

    #[test]
    fn user_dto_tolerates_missing_optional_fields() {
        let dto: UserDto = serde_json::from_str(r#"{"login": "octocat"}"#).expect("valid json");
        let profile = UserProfile::from(dto);
        assert_eq!(profile.login, "octocat");
        assert_eq!(profile.name, None);
    }

    #[test]
    fn commit_search_collapses_to_author_dates() {
        let dto: CommitSearchDto = serde_json::from_str(
            r#"{
                "total_count": 2,
                "items": [
                    {"commit": {"author": {"date": "2026-08-01T22:15:00Z"}}},
                    {"commit": {"author": {"date": "2026-08-02T09:30:00Z"}}}
                ]
            }"#,
        )
        .expect("valid commit search json");
        let page = CommitSearchPage::from(dto);
        assert_eq!(page.total_count, 2);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].authored_at.to_rfc3339(), "2026-08-01T22:15:00+00:00");
    }
}
