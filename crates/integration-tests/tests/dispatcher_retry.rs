//! Dispatcher behaviour on 401: one refresh, one retry, shared across callers.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use chrono::{DateTime, Utc};
use evcharge_client::{ApiError, EvChargeClient, RequestOptions, SessionStatus};
use evcharge_core::Email;
use evcharge_integration_tests::{DRIVER_EMAIL, MockApi, PASSWORD};
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use secrecy::SecretString;

async fn logged_in(api: &MockApi) -> EvChargeClient {
    let client = api.client();
    client.start().await;
    client
        .session()
        .login(
            &Email::parse(DRIVER_EMAIL).unwrap(),
            &SecretString::from(PASSWORD),
        )
        .await
        .unwrap();
    client
}

fn bearer(api: &MockApi, path: &str) -> Vec<Option<String>> {
    api.requests_to(path)
        .into_iter()
        .map(|r| r.authorization)
        .collect()
}

#[tokio::test]
async fn test_expired_token_refreshes_and_retries_once() {
    let api = MockApi::start().await;
    let client = logged_in(&api).await;
    api.expire_access_tokens();

    let reservations = client.reservations().list().await.unwrap();

    assert!(reservations.is_empty());
    assert_eq!(api.refresh_calls(), 1);
    assert_eq!(
        bearer(&api, "/reservations/getall"),
        vec![Some("Bearer at-1".to_string()), Some("Bearer at-2".to_string())]
    );
}

#[tokio::test]
async fn test_second_401_is_returned_after_exactly_two_attempts() {
    let api = MockApi::start().await;
    let client = logged_in(&api).await;
    api.set_reject_all_access(true);

    let err = client.reservations().list().await.unwrap_err();

    assert!(err.is_unauthorized());
    assert!(err.to_string().contains("/reservations/getall"));
    assert_eq!(api.requests_to("/reservations/getall").len(), 2);
    assert_eq!(api.refresh_calls(), 1);
    // The refresh itself succeeded, so the session survives
    assert_eq!(client.session().status(), SessionStatus::Authenticated);
}

#[tokio::test]
async fn test_failed_refresh_logs_out_and_retries_without_token() {
    let api = MockApi::start().await;
    let client = logged_in(&api).await;
    api.expire_access_tokens();
    api.revoke_refresh_tokens();

    let err = client.reservations().list().await.unwrap_err();

    assert!(err.is_unauthorized());
    assert_eq!(
        bearer(&api, "/reservations/getall"),
        vec![Some("Bearer at-1".to_string()), None]
    );
    assert_eq!(api.refresh_calls(), 1);
    assert_eq!(client.session().status(), SessionStatus::Unauthenticated);
}

#[tokio::test]
async fn test_open_endpoint_succeeds_anonymously_after_session_ends() {
    let api = MockApi::start().await;
    let client = logged_in(&api).await;
    api.expire_access_tokens();
    api.revoke_refresh_tokens();

    let stations = client
        .stations()
        .available_at(DateTime::<Utc>::from_timestamp(0, 0).unwrap())
        .await
        .unwrap();

    assert_eq!(stations.len(), 2);
    assert_eq!(
        bearer(&api, "/stations/free"),
        vec![Some("Bearer at-1".to_string()), None]
    );
    assert!(!client.session().is_authenticated());
}

#[tokio::test]
async fn test_concurrent_401s_share_one_refresh() {
    let api = MockApi::start().await;
    let client = logged_in(&api).await;
    api.expire_access_tokens();
    api.set_refresh_delay(Duration::from_millis(100));

    let reservations = client.reservations();
    let (a, b, c, d) = tokio::join!(
        reservations.list(),
        reservations.list(),
        reservations.list(),
        reservations.list()
    );

    for result in [a, b, c, d] {
        assert!(result.is_ok());
    }
    assert_eq!(api.refresh_calls(), 1);
    assert_eq!(api.requests_to("/reservations/getall").len(), 8);
}

#[tokio::test]
async fn test_unauthenticated_request_is_sent_without_authorization() {
    let api = MockApi::start().await;
    let client = api.client();
    client.start().await;

    let stations = client
        .stations()
        .available_at(DateTime::<Utc>::from_timestamp(0, 0).unwrap())
        .await
        .unwrap();

    assert_eq!(stations.len(), 2);
    let request = &api.requests_to("/stations/free")[0];
    assert!(request.authorization.is_none());
    assert_eq!(request.content_type.as_deref(), Some("application/json"));
    assert_eq!(api.refresh_calls(), 0);
}

#[tokio::test]
async fn test_caller_headers_override_defaults() {
    let api = MockApi::start().await;
    let client = logged_in(&api).await;

    let options = RequestOptions::get().with_header(
        CONTENT_TYPE,
        HeaderValue::from_static("application/json; charset=utf-8"),
    );
    let body = client
        .dispatcher()
        .dispatch("/stations/free?timestamp=0", &options)
        .await
        .unwrap();

    assert!(body.is_array());
    let request = &api.requests_to("/stations/free")[0];
    assert_eq!(
        request.content_type.as_deref(),
        Some("application/json; charset=utf-8")
    );
    assert_eq!(request.authorization.as_deref(), Some("Bearer at-1"));
}

#[tokio::test]
async fn test_empty_success_body_is_null() {
    let api = MockApi::start().await;
    let client = logged_in(&api).await;

    let ack = client
        .profile()
        .change_password(&SecretString::from("new-secret"))
        .await
        .unwrap();
    assert!(ack.is_null());
}

#[tokio::test]
async fn test_non_api_endpoint_is_rejected_before_sending() {
    let api = MockApi::start().await;
    let client = logged_in(&api).await;
    let sent = api.requests().len();

    let err = client
        .dispatcher()
        .dispatch("https://evil.example.com/steal", &RequestOptions::get())
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::InvalidEndpoint(_)));
    assert_eq!(api.requests().len(), sent);
}
