//! Integration tests for `ReqwestFetcher` against a local HTTP mock server.

use std::time::Duration;
use webcrawl_core::fetch::{Fetcher, ReqwestFetcher};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn head_reports_status_and_content_type() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/page"))
        .respond_with(ResponseTemplate::new(200).insert_header("Content-Type", "text/html; charset=utf-8"))
        .mount(&server)
        .await;

    let fetcher = ReqwestFetcher::new();
    let url = url::Url::parse(&format!("{}/page", server.uri())).unwrap();
    let info = fetcher.head(&url, TIMEOUT).await.unwrap();

    assert_eq!(info.status, 200);
    assert_eq!(info.content_type.as_deref(), Some("text/html; charset=utf-8"));
}

#[tokio::test]
async fn get_text_returns_body_and_final_url_after_redirect() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(
            ResponseTemplate::new(301).insert_header("Location", &format!("{}/new", server.uri())),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/new"))
        .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
        .mount(&server)
        .await;

    let fetcher = ReqwestFetcher::new();
    let url = url::Url::parse(&format!("{}/old", server.uri())).unwrap();
    let fetched = fetcher.get_text(&url, TIMEOUT).await.unwrap();

    assert_eq!(fetched.status, 200);
    assert_eq!(fetched.body, "hello");
    assert!(fetched.final_url.path().ends_with("/new"));
}

#[tokio::test]
async fn get_text_on_404_still_returns_body_not_a_status_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
        .mount(&server)
        .await;

    let fetcher = ReqwestFetcher::new();
    let url = url::Url::parse(&format!("{}/missing", server.uri())).unwrap();
    let fetched = fetcher.get_text(&url, TIMEOUT).await.unwrap();

    assert_eq!(fetched.status, 404);
    assert_eq!(fetched.body, "not found");
}

#[tokio::test]
async fn stream_get_errors_on_server_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let fetcher = ReqwestFetcher::new();
    let url = url::Url::parse(&format!("{}/broken", server.uri())).unwrap();
    let result = fetcher.stream_get(&url, TIMEOUT).await;

    assert!(matches!(result, Err(webcrawl_core::fetch::FetchError::Status { status: 500, .. })));
}
