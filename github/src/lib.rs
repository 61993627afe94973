//! Typed GitHub REST client for identity resolution and activity counting.
//!
//! Every response body is validated and normalized into a fixed internal
//! struct immediately after the HTTP call; nothing downstream re-checks
//! nullability or walks raw JSON. All methods return the provider error
//! unwrapped — callers route them through a
//! [`ResilienceManager`](pulse_resilience::ResilienceManager) for retry,
//! rate-limit and circuit handling.

mod activity;
mod client;
mod error;
mod types;

pub use activity::RawActivity;
pub use activity::fetch_activity;
pub use client::GitHubClient;
pub use error::GitHubError;
pub use types::CommitItem;
pub use types::CommitSearchPage;
pub use types::OrgMember;
pub use types::SearchUsersPage;
pub use types::UserProfile;

/// Result type for client operations.
pub type GitHubResult<T> = Result<T, GitHubError>;
