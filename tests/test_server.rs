//! Tests for the HTTP front end
//!
//! A real listener is bound on an ephemeral port and driven with reqwest.

use edge_image_cache::{EdgeConfig, EdgeProxy, EdgeServer};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct RunningServer {
    addr: SocketAddr,
    proxy: EdgeProxy,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<edge_image_cache::Result<()>>,
}

async fn start_server(origin: &MockServer) -> RunningServer {
    let config = EdgeConfig {
        origin_base_url: origin.uri(),
        origin_credential: Some("anon-secret".to_string()),
        ..Default::default()
    };
    let proxy = EdgeProxy::new(Arc::new(config)).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown, rx) = oneshot::channel::<()>();

    let server = EdgeServer::new(proxy.clone(), addr);
    let handle = tokio::spawn(async move {
        server
            .serve(listener, async {
                let _ = rx.await;
            })
            .await
    });

    RunningServer {
        addr,
        proxy,
        shutdown,
        handle,
    }
}

#[tokio::test]
async fn test_serves_image_over_http() {
    let origin = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/storage/a.png"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(vec![1u8, 2, 3, 4], "image/png")
                .insert_header("via", "kong/3.0"),
        )
        .expect(1)
        .mount(&origin)
        .await;

    let server = start_server(&origin).await;
    let client = reqwest::Client::new();
    let url = format!("http://{}/storage/a.png", server.addr);

    let first = client.get(&url).send().await.unwrap();
    assert_eq!(first.status(), 200);
    assert_eq!(first.headers().get("access-control-allow-origin").unwrap(), "*");
    assert!(first.headers().get("via").is_none());
    assert_eq!(first.bytes().await.unwrap().as_ref(), &[1u8, 2, 3, 4]);

    server.proxy.background_writes().wait_idle().await;

    let second = client.get(&url).send().await.unwrap();
    assert_eq!(second.headers().get("x-cache-status").unwrap(), "HIT");
    assert_eq!(second.bytes().await.unwrap().as_ref(), &[1u8, 2, 3, 4]);

    server.shutdown.send(()).unwrap();
    server.handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_local_answers_over_http() {
    let origin = MockServer::start().await;
    let server = start_server(&origin).await;
    let client = reqwest::Client::new();

    let options = client
        .request(reqwest::Method::OPTIONS, format!("http://{}/storage/a.png", server.addr))
        .send()
        .await
        .unwrap();
    assert_eq!(options.status(), 204);

    let post = client
        .post(format!("http://{}/storage/a.png", server.addr))
        .body("payload")
        .send()
        .await
        .unwrap();
    assert_eq!(post.status(), 405);
    assert_eq!(post.text().await.unwrap(), "Method Not Allowed");

    let maintenance = client
        .get(format!("http://{}/", server.addr))
        .send()
        .await
        .unwrap();
    assert_eq!(maintenance.status(), 503);
    assert_eq!(maintenance.headers().get("retry-after").unwrap(), "86400");

    server.shutdown.send(()).unwrap();
    server.handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_shutdown_waits_for_pending_writes() {
    let origin = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/storage/slow.png"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![7u8; 64], "image/png"))
        .mount(&origin)
        .await;

    let server = start_server(&origin).await;
    let response = reqwest::get(format!("http://{}/storage/slow.png", server.addr))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    server.shutdown.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), server.handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert_eq!(server.proxy.background_writes().in_flight(), 0);
    assert_eq!(server.proxy.metrics().get_stats().cache_writes, 1);
}

#[tokio::test]
async fn test_shutdown_finishes_in_flight_requests() {
    let origin = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/storage/slow.png"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(vec![9u8; 32], "image/png")
                .set_delay(Duration::from_millis(300)),
        )
        .expect(1)
        .mount(&origin)
        .await;

    let server = start_server(&origin).await;
    let url = format!("http://{}/storage/slow.png", server.addr);
    let request = tokio::spawn(async move {
        let response = reqwest::get(url).await?;
        let status = response.status();
        let body = response.bytes().await?;
        Ok::<_, reqwest::Error>((status, body))
    });

    // Shut down while origin is still holding the response
    tokio::time::sleep(Duration::from_millis(100)).await;
    server.shutdown.send(()).unwrap();

    tokio::time::timeout(Duration::from_secs(5), server.handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    let (status, body) = request.await.unwrap().unwrap();
    assert_eq!(status, 200);
    assert_eq!(body.as_ref(), &[9u8; 32]);
    assert_eq!(server.proxy.background_writes().in_flight(), 0);
    assert_eq!(server.proxy.metrics().get_stats().cache_writes, 1);
}
