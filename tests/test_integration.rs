//! End-to-end tests for the edge proxy against a mock origin
//!
//! Each test drives `EdgeProxy::handle` directly and uses wiremock
//! expectations to assert how often origin was contacted.

use async_trait::async_trait;
use bytes::Bytes;
use edge_image_cache::{
    CacheKey, CacheStore, EdgeConfig, EdgeError, EdgeProxy, EdgeResponse, MaintenanceConfig,
    MemoryCacheStore,
};
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{any, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 1, 2, 3, 4];

fn config_for(origin: &MockServer) -> EdgeConfig {
    EdgeConfig {
        origin_base_url: origin.uri(),
        origin_credential: Some("anon-secret".to_string()),
        ..Default::default()
    }
}

fn proxy_for(origin: &MockServer) -> EdgeProxy {
    EdgeProxy::new(Arc::new(config_for(origin))).unwrap()
}

fn png_response() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(PNG.to_vec(), "image/png")
}

async fn get(proxy: &EdgeProxy, target: &str) -> EdgeResponse {
    let (path, query) = match target.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (target, None),
    };
    let response = proxy.handle(&Method::GET, path, query).await;
    proxy.background_writes().wait_idle().await;
    response
}

/// Store that fails every operation
struct BrokenStore;

#[async_trait]
impl CacheStore for BrokenStore {
    async fn lookup(&self, _key: &CacheKey) -> edge_image_cache::Result<Option<EdgeResponse>> {
        Err(EdgeError::CacheError("store offline".to_string()))
    }

    async fn put(&self, _key: &CacheKey, _response: EdgeResponse) -> edge_image_cache::Result<()> {
        Err(EdgeError::CacheError("store offline".to_string()))
    }
}

#[tokio::test]
async fn test_unsupported_methods_never_reach_origin() {
    let origin = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&origin)
        .await;

    let proxy = proxy_for(&origin);
    for m in [Method::POST, Method::PUT, Method::DELETE, Method::PATCH] {
        let response = proxy.handle(&m, "/storage/v1/object/public/a.png", None).await;
        assert_eq!(response.status, StatusCode::METHOD_NOT_ALLOWED, "method {}", m);
        assert_eq!(&response.body[..], b"Method Not Allowed");
        assert_eq!(response.header("access-control-allow-origin"), Some("*"));
    }
    assert_eq!(proxy.metrics().get_stats().rejected_requests, 4);
}

#[tokio::test]
async fn test_out_of_scope_paths_get_maintenance_page() {
    let origin = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&origin)
        .await;

    let proxy = proxy_for(&origin);
    for target in ["/", "/admin", "/storage", "/storage/../admin", "/favicon.ico"] {
        let response = get(&proxy, target).await;
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE, "path {}", target);
        assert_eq!(response.header("content-type"), Some("text/html; charset=utf-8"));
        assert_eq!(response.header("retry-after"), Some("86400"));
        assert_eq!(response.header("cache-control"), Some("no-store"));
        assert!(!response.body.is_empty());
    }
}

#[tokio::test]
async fn test_encoded_traversal_never_reaches_origin() {
    let origin = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200).set_body_string("SECRET ROWS"))
        .expect(0)
        .mount(&origin)
        .await;

    let proxy = proxy_for(&origin);
    for target in [
        "/storage/%2e%2e/rest/v1/users",
        "/storage/.%2E/admin",
        "/storage/%2E%2e/x",
        "/storage/v1/%2e%2e/%2e%2e/rest/v1/users?select=*",
        "/storage/..\\rest/v1/users",
    ] {
        let response = get(&proxy, target).await;
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE, "path {}", target);
        assert_ne!(&response.body[..], b"SECRET ROWS");
    }

    let stats = proxy.metrics().get_stats();
    assert_eq!(stats.origin_fetches, 0);
    assert_eq!(stats.cache_writes, 0);
    assert_eq!(stats.maintenance_responses, 5);
}

#[tokio::test]
async fn test_out_of_scope_paths_get_404_when_maintenance_disabled() {
    let origin = MockServer::start().await;
    let config = EdgeConfig {
        maintenance: MaintenanceConfig {
            enabled: false,
            ..Default::default()
        },
        ..config_for(&origin)
    };
    let proxy = EdgeProxy::new(Arc::new(config)).unwrap();

    let response = get(&proxy, "/admin").await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.header("cache-control"), Some("no-store"));
}

#[tokio::test]
async fn test_preflight_answered_locally() {
    let origin = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&origin)
        .await;

    let proxy = proxy_for(&origin);
    // Preflight is answered for any path, in scope or not
    for target in ["/storage/a.png", "/anything"] {
        let response = proxy.handle(&Method::OPTIONS, target, None).await;
        assert_eq!(response.status, StatusCode::NO_CONTENT);
        assert!(response.body.is_empty());
        assert_eq!(response.header("access-control-allow-origin"), Some("*"));
        assert_eq!(
            response.header("access-control-allow-methods"),
            Some("GET, HEAD, OPTIONS")
        );
        assert_eq!(response.header("access-control-allow-headers"), Some("*"));
        assert_eq!(response.header("access-control-max-age"), Some("86400"));
    }
}

#[tokio::test]
async fn test_repeated_get_fetches_origin_once() {
    let origin = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/storage/v1/object/public/avatars/a.png"))
        .respond_with(png_response())
        .expect(1)
        .mount(&origin)
        .await;

    let proxy = proxy_for(&origin);
    let target = "/storage/v1/object/public/avatars/a.png";

    let first = get(&proxy, target).await;
    let second = get(&proxy, target).await;
    let third = get(&proxy, target).await;

    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(&first.body[..], PNG);
    assert_eq!(first.body, second.body);
    assert_eq!(second.body, third.body);
    assert_eq!(first.header("x-cache-status"), Some("MISS"));
    assert_eq!(third.header("x-cache-status"), Some("HIT"));
    assert_eq!(third.header("content-type"), Some("image/png"));

    let stats = proxy.metrics().get_stats();
    assert_eq!(stats.origin_fetches, 1);
    assert_eq!(stats.cache_hits, 2);
    assert_eq!(stats.bytes_from_cache, 2 * PNG.len() as u64);
}

#[tokio::test]
async fn test_epoch_bump_forces_one_refetch() {
    let origin = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/storage/a.png"))
        .respond_with(png_response())
        .expect(2)
        .mount(&origin)
        .await;

    let proxy = proxy_for(&origin);
    get(&proxy, "/storage/a.png").await;
    assert_eq!(get(&proxy, "/storage/a.png").await.header("x-cache-status"), Some("HIT"));

    let changes = proxy
        .reload_config(EdgeConfig {
            cache_epoch: "v2".to_string(),
            ..config_for(&origin)
        })
        .unwrap();
    assert!(changes.epoch_changed);
    assert!(!changes.origin_changed);

    let after_bump = get(&proxy, "/storage/a.png").await;
    assert_eq!(after_bump.header("x-cache-status"), Some("MISS"));
    let again = get(&proxy, "/storage/a.png").await;
    assert_eq!(again.header("x-cache-status"), Some("HIT"));
}

#[tokio::test]
async fn test_query_string_is_part_of_key_and_forwarded() {
    let origin = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/storage/render/a.png"))
        .and(query_param("width", "100"))
        .respond_with(png_response())
        .expect(1)
        .mount(&origin)
        .await;
    Mock::given(method("GET"))
        .and(path("/storage/render/a.png"))
        .and(query_param("width", "200"))
        .respond_with(png_response())
        .expect(1)
        .mount(&origin)
        .await;

    let proxy = proxy_for(&origin);
    get(&proxy, "/storage/render/a.png?width=100").await;
    get(&proxy, "/storage/render/a.png?width=200").await;
    get(&proxy, "/storage/render/a.png?width=100").await;

    // The epoch tag stays inside the cache and is never sent to origin
    let received = origin.received_requests().await.unwrap();
    assert_eq!(received.len(), 2);
    for request in received {
        let query = request.url.query().unwrap_or("");
        assert!(!query.contains("cv="), "epoch leaked to origin: {}", query);
    }
}

#[tokio::test]
async fn test_ttl_for_images() {
    let origin = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/storage/a.png"))
        .respond_with(png_response())
        .mount(&origin)
        .await;
    Mock::given(method("GET"))
        .and(path("/storage/blob.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![0u8; 16], "application/octet-stream"))
        .mount(&origin)
        .await;

    let proxy = proxy_for(&origin);
    for target in ["/storage/a.png", "/storage/blob.bin"] {
        let response = get(&proxy, target).await;
        assert_eq!(
            response.header("cache-control"),
            Some("public, max-age=31536000, immutable"),
            "target {}",
            target
        );
        assert_eq!(response.header("cdn-cache-control"), Some("public, max-age=31536000"));
    }
}

#[tokio::test]
async fn test_ttl_for_non_images() {
    let origin = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/storage/notes.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("hello", "text/plain"))
        .expect(1)
        .mount(&origin)
        .await;

    let proxy = proxy_for(&origin);
    let response = get(&proxy, "/storage/notes.txt").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.header("cache-control"), Some("public, max-age=60, immutable"));
    assert_eq!(response.header("cdn-cache-control"), Some("public, max-age=60"));

    // Short-lived entries are still cached
    assert_eq!(get(&proxy, "/storage/notes.txt").await.header("x-cache-status"), Some("HIT"));
}

#[tokio::test]
async fn test_error_responses_are_passed_through_and_not_stored() {
    let origin = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/storage/missing.png"))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_raw(r#"{"error":"not_found"}"#, "application/json")
                .insert_header("cdn-cache-control", "public, max-age=600"),
        )
        .expect(2)
        .mount(&origin)
        .await;
    Mock::given(method("GET"))
        .and(path("/storage/broken.png"))
        .respond_with(ResponseTemplate::new(500).set_body_raw("boom", "text/plain"))
        .expect(2)
        .mount(&origin)
        .await;

    let proxy = proxy_for(&origin);
    for target in ["/storage/missing.png", "/storage/broken.png"] {
        for _ in 0..2 {
            let response = get(&proxy, target).await;
            assert!(response.status.is_client_error() || response.status.is_server_error());
            assert_eq!(response.header("cache-control"), Some("public, max-age=60"));
            assert!(response.header("cdn-cache-control").is_none());
            assert_eq!(response.header("x-cache-status"), Some("MISS"));
            assert_eq!(response.header("access-control-allow-origin"), Some("*"));
        }
    }

    let missing = get(&proxy, "/storage/missing.png").await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
    assert_eq!(&missing.body[..], br#"{"error":"not_found"}"#);
    assert_eq!(proxy.metrics().get_stats().cache_writes, 0);
}

#[tokio::test]
async fn test_internal_headers_are_stripped() {
    let origin = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/storage/a.png"))
        .respond_with(
            png_response()
                .insert_header("x-kong-upstream-latency", "12")
                .insert_header("x-kong-proxy-latency", "1")
                .insert_header("via", "kong/3.0")
                .insert_header("etag", "\"abc\""),
        )
        .mount(&origin)
        .await;

    let proxy = proxy_for(&origin);
    for expected in ["MISS", "HIT"] {
        let response = get(&proxy, "/storage/a.png").await;
        assert_eq!(response.header("x-cache-status"), Some(expected));
        assert!(response.header("x-kong-upstream-latency").is_none());
        assert!(response.header("x-kong-proxy-latency").is_none());
        assert!(response.header("via").is_none());
        assert_eq!(response.header("etag"), Some("\"abc\""));
        assert_eq!(response.header("x-served-by"), Some("edge-image-cache"));
    }
}

#[tokio::test]
async fn test_credential_forwarded_but_never_returned() {
    let origin = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/storage/a.png"))
        .and(header("apikey", "anon-secret"))
        .respond_with(png_response())
        .expect(1)
        .mount(&origin)
        .await;

    let proxy = proxy_for(&origin);
    let response = get(&proxy, "/storage/a.png").await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.header("apikey").is_none());
}

#[tokio::test]
async fn test_cors_is_wildcard_on_hit_and_miss() {
    let origin = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/storage/a.png"))
        .respond_with(
            png_response().insert_header("access-control-allow-origin", "https://app.example.com"),
        )
        .mount(&origin)
        .await;

    let proxy = proxy_for(&origin);
    for _ in 0..2 {
        let response = get(&proxy, "/storage/a.png").await;
        assert_eq!(response.header("access-control-allow-origin"), Some("*"));
        assert_eq!(
            response.header("access-control-allow-methods"),
            Some("GET, HEAD, OPTIONS")
        );
    }
}

#[tokio::test]
async fn test_head_is_served_from_cached_get() {
    let origin = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/storage/a.png"))
        .respond_with(png_response())
        .expect(1)
        .mount(&origin)
        .await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&origin)
        .await;

    let proxy = proxy_for(&origin);
    get(&proxy, "/storage/a.png").await;

    let head = proxy.handle(&Method::HEAD, "/storage/a.png", None).await;
    assert_eq!(head.status, StatusCode::OK);
    assert!(head.body.is_empty());
    assert_eq!(head.header("x-cache-status"), Some("HIT"));
    assert_eq!(head.header("content-type"), Some("image/png"));
}

#[tokio::test]
async fn test_head_miss_does_not_poison_get() {
    let origin = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/storage/a.png"))
        .respond_with(ResponseTemplate::new(200).insert_header("content-type", "image/png"))
        .expect(1)
        .mount(&origin)
        .await;
    Mock::given(method("GET"))
        .and(path("/storage/a.png"))
        .respond_with(png_response())
        .expect(1)
        .mount(&origin)
        .await;

    let proxy = proxy_for(&origin);
    proxy.handle(&Method::HEAD, "/storage/a.png", None).await;
    proxy.background_writes().wait_idle().await;

    let response = get(&proxy, "/storage/a.png").await;
    assert_eq!(response.header("x-cache-status"), Some("MISS"));
    assert_eq!(&response.body[..], PNG);
}

#[tokio::test]
async fn test_unreachable_origin_gives_502() {
    let config = EdgeConfig {
        origin_base_url: "http://127.0.0.1:9".to_string(),
        origin_timeout_secs: 2,
        ..Default::default()
    };
    let proxy = EdgeProxy::new(Arc::new(config)).unwrap();

    let response = get(&proxy, "/storage/a.png").await;
    assert_eq!(response.status, StatusCode::BAD_GATEWAY);
    assert_eq!(&response.body[..], b"Failed to reach storage");
    assert_eq!(response.header("access-control-allow-origin"), Some("*"));

    let stats = proxy.metrics().get_stats();
    assert_eq!(stats.origin_unreachable, 1);
    assert_eq!(stats.cache_writes, 0);
}

#[tokio::test]
async fn test_cached_entry_served_while_origin_down() {
    let config = EdgeConfig {
        origin_base_url: "http://127.0.0.1:9".to_string(),
        origin_timeout_secs: 2,
        ..Default::default()
    };
    let store = Arc::new(MemoryCacheStore::new(Duration::from_secs(60)));

    let mut headers = HeaderMap::new();
    headers.insert("content-type", HeaderValue::from_static("image/png"));
    headers.insert(
        "cache-control",
        HeaderValue::from_static("public, max-age=31536000, immutable"),
    );
    let stored = EdgeResponse::new(StatusCode::OK, headers, Bytes::from_static(PNG));
    store
        .put(&CacheKey::new("/storage/a.png", None, "v1"), stored)
        .await
        .unwrap();

    let proxy = EdgeProxy::with_store(Arc::new(config), store).unwrap();
    let response = get(&proxy, "/storage/a.png").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(&response.body[..], PNG);
    assert_eq!(proxy.metrics().get_stats().origin_fetches, 0);
}

#[tokio::test]
async fn test_broken_store_fails_open() {
    let origin = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/storage/a.png"))
        .respond_with(png_response())
        .expect(2)
        .mount(&origin)
        .await;

    let proxy = EdgeProxy::with_store(Arc::new(config_for(&origin)), Arc::new(BrokenStore)).unwrap();
    for _ in 0..2 {
        let response = get(&proxy, "/storage/a.png").await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(&response.body[..], PNG);
    }

    let stats = proxy.metrics().get_stats();
    assert_eq!(stats.cache_errors, 2);
    assert_eq!(stats.cache_writes, 2);
    assert_eq!(stats.cache_write_failures, 2);
}
