//! HTTP contract tests for the rate-limited fetch client, against a mock
//! upstream.

use reddit_client::RedditClient;
use serde_json::{json, Value};
use subwatch_core::{ApiError, CoreError, RateLimitSnapshot};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn listing_body(children: Vec<Value>) -> Value {
    json!({
        "kind": "Listing",
        "data": { "after": null, "dist": children.len(), "children": children }
    })
}

fn post(id: &str, title: &str, created_utc: f64) -> Value {
    json!({
        "kind": "t3",
        "data": {
            "id": id,
            "title": title,
            "author": "someone",
            "subreddit": "rust",
            "permalink": format!("/r/rust/comments/{id}"),
            "created_utc": created_utc,
            "score": 1,
            "num_comments": 0,
            "is_self": true,
            "over_18": false
        }
    })
}

fn client_for(server: &MockServer) -> RedditClient {
    RedditClient::new()
        .expect("client")
        .with_base_url(server.uri())
}

#[tokio::test]
async fn batches_topics_into_one_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/r/rust+jobs/new.json"))
        .and(query_param("limit", "100"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(listing_body(vec![post("a", "title", 1000.0)])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let hits = client_for(&server)
        .fetch_batch(&["rust".to_string(), "jobs".to_string()])
        .await
        .expect("batch");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "a");
}

#[tokio::test]
async fn quota_counters_follow_response_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/r/rust/new.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(listing_body(vec![]))
                .insert_header("x-ratelimit-remaining", "42.5")
                .insert_header("x-ratelimit-reset", "120")
                .insert_header("x-ratelimit-used", "57"),
        )
        .mount(&server)
        .await;

    let client = client_for(&server);
    client
        .fetch_batch(&["rust".to_string()])
        .await
        .expect("batch");

    let limits = client.rate_limits();
    assert_eq!(limits.remaining, 42.5);
    assert_eq!(limits.reset, 120.0);
    assert_eq!(limits.used, 57.0);
}

#[tokio::test]
async fn absent_headers_leave_counters_untouched() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing_body(vec![])))
        .mount(&server)
        .await;

    let client = client_for(&server).with_initial_limits(RateLimitSnapshot {
        remaining: 80.0,
        reset: 10.0,
        used: 20.0,
    });
    client
        .fetch_batch(&["rust".to_string()])
        .await
        .expect("batch");

    assert_eq!(client.rate_limits().remaining, 80.0);
}

#[tokio::test]
async fn exhausted_quota_fails_before_any_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing_body(vec![])))
        .expect(0)
        .mount(&server)
        .await;

    let client = client_for(&server).with_initial_limits(RateLimitSnapshot {
        remaining: 2.0,
        reset: 30.0,
        used: 98.0,
    });

    let err = client
        .fetch_batch(&["rust".to_string()])
        .await
        .expect_err("pre-flight failure");
    assert!(matches!(
        err,
        CoreError::Api(ApiError::RateLimitExceeded { reset_after: 30 })
    ));
}

#[tokio::test]
async fn persistent_429_surfaces_as_rate_limit_with_header_reset() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/r/rust/new.json"))
        .respond_with(ResponseTemplate::new(429).insert_header("x-ratelimit-reset", "45"))
        .expect(3)
        .mount(&server)
        .await;

    let err = client_for(&server)
        .fetch_batch(&["rust".to_string()])
        .await
        .expect_err("rate limited");
    assert!(matches!(
        err,
        CoreError::Api(ApiError::RateLimitExceeded { reset_after: 45 })
    ));
}

#[tokio::test]
async fn server_errors_are_retried_until_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/r/rust/new.json"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/r/rust/new.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(listing_body(vec![post("a", "title", 1000.0)])),
        )
        .mount(&server)
        .await;

    let hits = client_for(&server)
        .fetch_batch(&["rust".to_string()])
        .await
        .expect("eventual success");
    assert_eq!(hits.len(), 1);
}

#[tokio::test]
async fn persistent_server_error_surfaces_after_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let err = client_for(&server)
        .fetch_batch(&["rust".to_string()])
        .await
        .expect_err("server error");
    assert!(matches!(
        err,
        CoreError::Api(ApiError::ServerError { status_code: 500 })
    ));
}

#[tokio::test]
async fn malformed_items_are_dropped_not_fatal() {
    let server = MockServer::start().await;
    let body = listing_body(vec![
        post("good", "title", 1000.0),
        json!({ "kind": "t3", "data": { "title": "no id at all" } }),
    ]);
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;

    let hits = client_for(&server)
        .fetch_batch(&["rust".to_string()])
        .await
        .expect("batch");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "good");
}
