use std::time::Duration;

use rangefetch_client::{ApiFetcher, ClientConfig};
use rangefetch_core::models::FetchOutcome;
use rangefetch_core::traits::RecordFetcher;
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const API_PATH: &str = "/enlib-api/api/cinema/getcinema_baseinfo_byid.do";

fn fetcher_for(server: &MockServer) -> ApiFetcher {
    let config = ClientConfig::new(format!("{}{API_PATH}", server.uri()))
        .with_timeouts(Duration::from_millis(500), Duration::from_secs(2));
    ApiFetcher::new(config).unwrap()
}

#[tokio::test]
async fn success_returns_first_row() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(API_PATH))
        .and(body_string_contains("cinemaid=42"))
        .and(body_string_contains("r=0."))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(header("origin", "https://ys.endata.cn"))
        .and(header("referer", "https://ys.endata.cn/Details/Cinema"))
        .and(header_exists("user-agent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": 1,
            "data": {"table0": [{"CinemaID": 42, "CinemaName": "Galaxy", "ZZID": "31010101"}]}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = fetcher_for(&server).fetch(42).await;
    match outcome {
        FetchOutcome::Success(record) => {
            assert_eq!(record.id, 42);
            assert_eq!(record.data["CinemaName"], "Galaxy");
        }
        other => panic!("expected success, got {}", other.label()),
    }
}

#[tokio::test]
async fn no_data_is_empty() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(API_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": 0, "data": {}})))
        .mount(&server)
        .await;

    assert!(matches!(fetcher_for(&server).fetch(1).await, FetchOutcome::Empty));
}

#[tokio::test]
async fn server_error_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(API_PATH))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let outcome = fetcher_for(&server).fetch(5).await;
    assert!(outcome.is_transient());
    assert!(outcome.error_message().unwrap().contains("503"));
}

#[tokio::test]
async fn html_body_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(API_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw("<html>maintenance</html>", "text/html"),
        )
        .mount(&server)
        .await;

    assert!(matches!(fetcher_for(&server).fetch(5).await, FetchOutcome::Fatal(_)));
}

#[tokio::test]
async fn slow_response_times_out_as_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(API_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"status": 1, "data": {"table0": [{}]}}))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let config = ClientConfig::new(format!("{}{API_PATH}", server.uri()))
        .with_timeouts(Duration::from_millis(200), Duration::from_millis(300));
    let outcome = ApiFetcher::new(config).unwrap().fetch(9).await;
    match outcome {
        FetchOutcome::Transient(e) => assert!(e.to_string().contains("timed out")),
        other => panic!("expected timeout, got {}", other.label()),
    }
}

#[tokio::test]
async fn connection_refused_is_transient() {
    let config = ClientConfig::new("http://127.0.0.1:9/api")
        .with_timeouts(Duration::from_millis(200), Duration::from_millis(500));
    let outcome = ApiFetcher::new(config).unwrap().fetch(1).await;
    assert!(outcome.is_transient());
}

#[tokio::test]
async fn custom_field_names_are_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/lookup"))
        .and(body_string_contains("entity=77"))
        .and(body_string_contains("nonce="))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": 1,
            "data": {"rows": [{"name": "x"}]}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = ClientConfig::new(format!("{}/lookup", server.uri()))
        .with_origin(None)
        .with_referer(None)
        .with_fields("entity", "nonce", "rows");
    let outcome = ApiFetcher::new(config).unwrap().fetch(77).await;
    assert!(matches!(outcome, FetchOutcome::Success(_)));
}
