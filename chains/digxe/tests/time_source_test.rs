use chrono::Utc;
use core_logic::{HttpConfig, HttpRetryClient};
use digxe_project::time_source::TimeSource;
use httpmock::prelude::*;
use httpmock::Method::HEAD;

fn http() -> HttpRetryClient {
    HttpRetryClient::new(&HttpConfig {
        timeout_secs: 5,
        max_attempts: 3,
        backoff_base_ms: 5,
    })
    .expect("client should build")
}

#[tokio::test]
async fn test_refresh_anchors_on_date_header() {
    let server = MockServer::start_async().await;
    let head = server
        .mock_async(|when, then| {
            when.method(HEAD).path("/");
            then.status(200)
                .header("Date", "Sun, 06 Nov 1994 08:49:37 GMT");
        })
        .await;

    let time = TimeSource::new(&http(), &server.url("/"));
    let anchor = time.refresh().await;

    assert!(!anchor.is_degraded());
    assert_eq!(anchor.server_epoch_ms(), 784_111_777_000);
    assert!(anchor.now() < Utc::now());
    head.assert_hits_async(1).await;
}

#[tokio::test]
async fn test_garbled_date_header_falls_back_to_local_clock() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(HEAD).path("/");
            then.status(200).header("Date", "yesterday-ish");
        })
        .await;

    let time = TimeSource::new(&http(), &server.url("/"));
    let anchor = time.refresh().await;

    assert!(anchor.is_degraded());
    let drift = (anchor.now() - Utc::now()).num_milliseconds().abs();
    assert!(drift < 1_000);
}

#[tokio::test]
async fn test_unavailable_clock_is_asked_once() {
    let server = MockServer::start_async().await;
    let head = server
        .mock_async(|when, then| {
            when.method(HEAD).path("/");
            then.status(503);
        })
        .await;

    let time = TimeSource::new(&http(), &server.url("/"));
    let anchor = time.refresh().await;

    assert!(anchor.is_degraded());
    head.assert_hits_async(1).await;
}
