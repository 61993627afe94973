#![allow(clippy::unwrap_used, clippy::expect_used)]

use pretty_assertions::assert_eq;
use pulse_github::GitHubClient;
use pulse_github::GitHubError;
use pulse_github::fetch_activity;
use pulse_resilience::ResilienceConfig;
use pulse_resilience::ResilienceManager;
use serde_json::json;
use wiremock::Mock;
use wiremock::MockServer;
use wiremock::ResponseTemplate;
use wiremock::matchers::method;
use wiremock::matchers::path;
use wiremock::matchers::query_param;
use wiremock::matchers::query_param_contains;

async fn client_for(server: &MockServer) -> GitHubClient {
    GitHubClient::new(Some("test-token".to_string()))
        .expect("client builds")
        .with_base_url(server.uri())
}

#[tokio::test]
async fn get_user_normalizes_profile() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/janedoe"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "login": "janedoe",
            "name": "Jane Doe",
            "email": null,
            "company": "@acme",
            "followers": 12
        })))
        .expect(1)
        .mount(&server)
        .await;

    let user = client_for(&server)
        .await
        .get_user("janedoe")
        .await
        .expect("request succeeds")
        .expect("user exists");
    assert_eq!(user.login, "janedoe");
    assert_eq!(user.name.as_deref(), Some("Jane Doe"));
    assert_eq!(user.email, None);
}

#[tokio::test]
async fn get_user_maps_404_to_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/no-such-user"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "message": "Not Found"
        })))
        .mount(&server)
        .await;

    let user = client_for(&server)
        .await
        .get_user("no-such-user")
        .await
        .expect("absence is not an error");
    assert_eq!(user, None);
}

#[tokio::test]
async fn org_members_follows_pagination() {
    let server = MockServer::start().await;
    let full_page: Vec<_> = (0..100)
        .map(|i| json!({"login": format!("member{i}")}))
        .collect();
    Mock::given(method("GET"))
        .and(path("/orgs/acme-eng/members"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(full_page)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/orgs/acme-eng/members"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"login": "tail1"},
            {"login": "tail2"}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let members = client_for(&server)
        .await
        .org_members("acme-eng")
        .await
        .expect("enumeration succeeds");
    assert_eq!(members.len(), 102);
    assert_eq!(members[0].login, "member0");
    assert_eq!(members[101].login, "tail2");
}

#[tokio::test]
async fn org_members_treats_unknown_org_as_empty() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/orgs/ghost-org/members"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "message": "Not Found"
        })))
        .mount(&server)
        .await;

    let members = client_for(&server)
        .await
        .org_members("ghost-org")
        .await
        .expect("unknown org is not an error");
    assert!(members.is_empty());
}

#[tokio::test]
async fn unauthorized_surfaces_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/janedoe"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "message": "Bad credentials"
        })))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .await
        .get_user("janedoe")
        .await
        .expect_err("401 must error");
    assert!(matches!(err, GitHubError::Auth { status: 401 }));
}

#[tokio::test]
async fn exhausted_quota_surfaces_rate_limit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/users"))
        .respond_with(
            ResponseTemplate::new(403)
                .insert_header("x-ratelimit-remaining", "0")
                .insert_header("retry-after", "30")
                .set_body_json(json!({"message": "API rate limit exceeded"})),
        )
        .mount(&server)
        .await;

    let err = client_for(&server)
        .await
        .search_users("jane in:name")
        .await
        .expect_err("quota exhaustion must error");
    assert!(matches!(
        err,
        GitHubError::RateLimited {
            retry_after: Some(30)
        }
    ));
}

#[tokio::test]
async fn fetch_activity_assembles_counts_and_timestamps() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/commits"))
        .and(query_param_contains("q", "author:janedoe"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total_count": 2,
            "items": [
                {"commit": {"author": {"date": "2026-08-22T23:10:00Z"}}},
                {"commit": {"author": {"date": "2026-08-24T10:00:00Z"}}}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search/issues"))
        .and(query_param_contains("q", "author:janedoe"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total_count": 3,
            "items": []
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search/issues"))
        .and(query_param_contains("q", "reviewed-by:janedoe"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total_count": 5,
            "items": []
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let resilience = ResilienceManager::new(ResilienceConfig::default());
    let activity = fetch_activity(&client, &resilience, "janedoe", 30)
        .await
        .expect("activity fetch succeeds");
    assert_eq!(activity.commit_count, 2);
    assert_eq!(activity.pr_count, 3);
    assert_eq!(activity.review_count, 5);
    assert_eq!(activity.data_points(), 10);
    assert_eq!(activity.commit_timestamps.len(), 2);
}
