//! Inbound HTTP server
//!
//! Accepts HTTP/1.1 connections and hands each request to [`EdgeProxy`].
//! On shutdown the accept loop stops first, open connections finish the
//! request they are serving, then the server waits for pending cache writes
//! so populated entries are not lost.

use crate::error::Result;
use crate::models::EdgeResponse;
use crate::proxy::EdgeProxy;
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use hyper_util::server::graceful::GracefulShutdown;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Upper bound on how long open connections get to finish after shutdown
const CONNECTION_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP front end for an [`EdgeProxy`]
pub struct EdgeServer {
    proxy: EdgeProxy,
    addr: SocketAddr,
}

impl EdgeServer {
    pub fn new(proxy: EdgeProxy, addr: SocketAddr) -> Self {
        Self { proxy, addr }
    }

    /// Bind the configured address and serve until `shutdown` resolves
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let local = listener.local_addr()?;
        info!("Edge cache listening on http://{}", local);

        let graceful = GracefulShutdown::new();
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            warn!("Failed to accept connection: {}", e);
                            continue;
                        }
                    };
                    debug!("Accepted connection from {}", peer);

                    let io = TokioIo::new(stream);
                    let proxy = self.proxy.clone();
                    let service = service_fn(move |req| {
                        let proxy = proxy.clone();
                        async move { handle_request(req, proxy).await }
                    });
                    let conn =
                        graceful.watch(http1::Builder::new().serve_connection(io, service));

                    tokio::task::spawn(async move {
                        if let Err(err) = conn.await {
                            error!("Error serving connection from {}: {:?}", peer, err);
                        }
                    });
                }
                _ = &mut shutdown => break,
            }
        }

        info!("Stopped accepting connections, draining open connections");
        if tokio::time::timeout(CONNECTION_DRAIN_TIMEOUT, graceful.shutdown())
            .await
            .is_err()
        {
            warn!(
                "Connections still open after {:?}, abandoning them",
                CONNECTION_DRAIN_TIMEOUT
            );
        }

        let pending = self.proxy.background_writes().in_flight();
        info!("Connections drained, {} cache writes pending", pending);
        self.proxy.background_writes().wait_idle().await;
        Ok(())
    }
}

async fn handle_request(
    req: Request<Incoming>,
    proxy: EdgeProxy,
) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
    let response = proxy
        .handle(req.method(), req.uri().path(), req.uri().query())
        .await;
    Ok(into_http_response(response))
}

/// Convert an [`EdgeResponse`] into a hyper response
pub fn into_http_response(response: EdgeResponse) -> Response<Full<Bytes>> {
    let EdgeResponse {
        status,
        headers,
        body,
    } = response;
    let mut out = Response::new(Full::new(body));
    *out.status_mut() = status;
    *out.headers_mut() = headers;
    out
}
