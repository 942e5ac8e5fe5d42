use std::time::Duration;

use costboard::application::info::InfoResourceClient;
use costboard::application::metrics::{MetricsQuery, MetricsResourceClient, SortSpec};
use costboard::cache::{QueryCache, QueryConfig, QueryParams};
use costboard::config::ApiSettings;
use costboard::infra::http::{ApiClient, ApiError};
use costboard_api_types::{InfoKind, MetricResource, MetricsSeries};
use httpmock::MockServer;
use serde_json::Value;
use url::Url;

const COST_BODY: &str = r#"{
    "resource": "pods",
    "series": "cost",
    "range": {"start": "2026-10-01", "end": "2026-10-08"},
    "data": [
        {"timestamp": "2026-10-01T00:00:00Z", "totalCost": 12.5, "currency": "USD"}
    ],
    "pagination": {"limit": 25, "offset": 0, "total": 1}
}"#;

fn api(server: &MockServer) -> ApiClient {
    ApiClient::new(&ApiSettings {
        base_url: Url::parse(&server.base_url()).expect("mock url"),
        timeout: Duration::from_secs(5),
    })
    .expect("api client")
}

fn week() -> MetricsQuery {
    MetricsQuery {
        start: Some("2026-10-01".to_string()),
        end: Some("2026-10-08".to_string()),
        limit: Some(25),
        sort: Some(SortSpec::desc("cpuUsage")),
        ..MetricsQuery::default()
    }
}

#[tokio::test]
async fn cost_series_is_fetched_once_within_the_stale_window() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method("GET")
            .path("/api/v1/metrics/pods/cost")
            .query_param("start", "2026-10-01")
            .query_param("end", "2026-10-08")
            .query_param("limit", "25")
            .query_param("sort", "cpuUsage:desc");
        then.status(200)
            .header("content-type", "application/json")
            .body(COST_BODY);
    });

    let client = MetricsResourceClient::new(api(&server), QueryCache::new(), MetricResource::Pods);
    let query = week();

    let (first, second) = tokio::join!(client.cost(&query), client.cost(&query));
    let first = first.expect("first cost fetch");
    let second = second.expect("second cost fetch");
    let third = client.cost(&query).await.expect("fresh cost fetch");

    assert_eq!(first.data.len(), 1);
    assert_eq!(first.data[0].currency, "USD");
    assert_eq!(first.series, MetricsSeries::Cost);
    assert!(std::sync::Arc::ptr_eq(&first, &second));
    assert!(std::sync::Arc::ptr_eq(&first, &third));
    mock.assert_calls(1);
}

#[tokio::test]
async fn zero_stale_window_refetches_every_time() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method("GET").path("/api/v1/metrics/pods/cost");
        then.status(200)
            .header("content-type", "application/json")
            .body(COST_BODY);
    });

    let cache = QueryCache::with_config(QueryConfig {
        default_stale_time_ms: 0,
    });
    let client = MetricsResourceClient::new(api(&server), cache, MetricResource::Pods);
    let query = week();

    client.cost(&query).await.expect("first fetch");
    client.cost(&query).await.expect("second fetch");
    mock.assert_calls(2);
}

#[tokio::test]
async fn error_body_message_and_status_are_kept() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method("GET").path("/api/v1/metrics/nodes/summary");
        then.status(503)
            .header("content-type", "application/json")
            .body(r#"{"message":"metrics backend unavailable","code":"UPSTREAM"}"#);
    });

    let cache = QueryCache::new();
    let client = MetricsResourceClient::new(api(&server), cache.clone(), MetricResource::Nodes);
    let query = week();

    let err = client.summary(&query).await.expect_err("summary should fail");
    assert_eq!(err.to_string(), "metrics backend unavailable");

    let api_error = err
        .downcast_ref::<ApiError>()
        .expect("fetch error should carry an ApiError");
    assert_eq!(api_error.status, Some(503));
    assert_eq!(
        api_error
            .details
            .as_ref()
            .and_then(|body| body.get("code"))
            .and_then(Value::as_str),
        Some("UPSTREAM")
    );

    let key = client.key::<costboard_api_types::SummaryMetric>(MetricsSeries::Summary, &query);
    let stored = cache.peek_error(&key).expect("error recorded on the entry");
    assert_eq!(stored.to_string(), "metrics backend unavailable");
    assert!(cache.peek_data(&key).is_none());
}

#[tokio::test]
async fn error_without_message_falls_back_to_status() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method("GET").path("/api/v1/metrics/pods/trends");
        then.status(500).body("oops");
    });

    let client = MetricsResourceClient::new(api(&server), QueryCache::new(), MetricResource::Pods);
    let err = client.trends(&week()).await.expect_err("trends should fail");

    assert_eq!(err.to_string(), "request failed with status code 500");
}

#[tokio::test]
async fn info_metadata_is_fetched_and_cached() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method("GET").path("/api/v1/info/nodes/metadata");
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"resource":"nodes","data":[{"id":"n1","name":"node-1"}],"fetchedAt":"2026-10-16T00:00:00Z"}"#);
    });

    let client = InfoResourceClient::new(api(&server), QueryCache::new(), "nodes");
    let params = QueryParams::new();

    let first = client
        .metadata::<Value>(&params)
        .await
        .expect("metadata fetch");
    let second = client
        .fetch_kind::<Value>(InfoKind::Metadata, &params)
        .await
        .expect("cached metadata");

    assert_eq!(first.resource, "nodes");
    assert_eq!(first.data[0]["name"], "node-1");
    assert!(std::sync::Arc::ptr_eq(&first, &second));
    mock.assert_calls(1);
}
