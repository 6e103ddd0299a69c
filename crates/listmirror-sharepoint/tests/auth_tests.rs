//! Token lifecycle tests against a mock access-control service.

#![cfg(feature = "integration")]

use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use listmirror_core::config::SharePointSettings;
use listmirror_core::error::SyncError;
use listmirror_sharepoint::TokenCache;

fn settings(server: &MockServer) -> SharePointSettings {
    SharePointSettings {
        tenant_id: "tenant-1".to_string(),
        client_id: "client-1".to_string(),
        client_secret: "s3cr3t".to_string().into(),
        site_url: "https://contoso.sharepoint.com/sites/Ops".to_string(),
        list_name: "Tasks".to_string(),
        authority: server.uri(),
        page_size: None,
        page_delay_ms: 0,
        connection_timeout_secs: 5,
        max_retries: 3,
    }
}

#[tokio::test]
async fn test_token_cached_within_validity_window() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/tenant-1/tokens/OAuth/2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "token-abc",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;

    let cache = TokenCache::new(settings(&server)).unwrap();

    let first = cache.get_token().await.unwrap();
    let second = cache.get_token().await.unwrap();

    assert_eq!(first, "token-abc");
    assert_eq!(first, second);
    // expect(1) verifies the endpoint was hit exactly once on drop.
}

#[tokio::test]
async fn test_invalidate_forces_refresh() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/tenant-1/tokens/OAuth/2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "token-abc",
            "expires_in": 3600
        })))
        .expect(2)
        .mount(&server)
        .await;

    let cache = TokenCache::new(settings(&server)).unwrap();

    cache.get_token().await.unwrap();
    cache.invalidate().await;
    cache.get_token().await.unwrap();
}

#[tokio::test]
async fn test_token_expiring_within_grace_is_refreshed() {
    let server = MockServer::start().await;

    // expires_in below the 300 s grace period: the first token is already
    // considered expired on the next request.
    Mock::given(method("POST"))
        .and(path("/tenant-1/tokens/OAuth/2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "short-lived",
            "expires_in": 60
        })))
        .expect(2)
        .mount(&server)
        .await;

    let cache = TokenCache::new(settings(&server)).unwrap();
    cache.get_token().await.unwrap();
    cache.get_token().await.unwrap();
}

#[tokio::test]
async fn test_transient_failures_then_success() {
    let server = MockServer::start().await;

    // Two 500s, then a good token. With max_retries = 3 the third attempt
    // succeeds.
    Mock::given(method("POST"))
        .and(path("/tenant-1/tokens/OAuth/2"))
        .respond_with(ResponseTemplate::new(500).set_body_string("transient"))
        .up_to_n_times(2)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/tenant-1/tokens/OAuth/2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "token-third-try",
            "expires_in": 3600
        })))
        .mount(&server)
        .await;

    let cache = TokenCache::new(settings(&server)).unwrap();
    let token = cache.get_token().await.unwrap();
    assert_eq!(token, "token-third-try");
}

#[tokio::test]
async fn test_rejected_credentials_fail_without_retry() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/tenant-1/tokens/OAuth/2"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid_client"))
        .expect(1)
        .mount(&server)
        .await;

    let cache = TokenCache::new(settings(&server)).unwrap();
    let err = cache.get_token().await.unwrap_err();

    assert!(matches!(err, SyncError::Authentication { .. }));
    assert!(err.to_string().contains("401"));
}

#[tokio::test]
async fn test_request_carries_acs_payload() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/tenant-1/tokens/OAuth/2"))
        .and(body_string_contains("grant_type=client_credentials"))
        .and(body_string_contains("client-1%40tenant-1"))
        .and(body_string_contains("00000003-0000-0ff1-ce00-000000000000"))
        .and(body_string_contains("contoso.sharepoint.com%40tenant-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "token-abc",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;

    let cache = TokenCache::new(settings(&server)).unwrap();
    cache.get_token().await.unwrap();
}
