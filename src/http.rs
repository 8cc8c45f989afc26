use std::convert::Infallible;
use std::io::Write;
use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use http::header::{ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue, Method, Request, Response, StatusCode};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use parking_lot::RwLock;
use tokio::net::TcpListener;
use tokio::task::JoinSet;

use crate::shutdown::ShutdownSignal;

/// The published exposition text. Writers swap in a whole new blob, readers
/// clone the `Bytes` handle, so no lock is held while a response is written.
pub type Snapshot = Arc<RwLock<Bytes>>;

pub const METRICS_PATH: &str = "/metrics";

/// Content type of the Prometheus text format
pub const TEXT_FORMAT: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Serves `snapshot` until `shutdown` fires, then stops accepting and waits
/// for in-flight connections to finish.
pub async fn serve(listener: TcpListener, snapshot: Snapshot, mut shutdown: ShutdownSignal) {
    let mut connections = JoinSet::new();

    loop {
        let (stream, peer) = tokio::select! {
            biased;

            _ = &mut shutdown => break,
            Some(_) = connections.join_next(), if !connections.is_empty() => continue,
            result = listener.accept() => match result {
                Ok(conn) => conn,
                Err(err) => {
                    error!(
                        message = "accept new connection failed",
                        %err
                    );

                    continue;
                }
            }
        };

        let snapshot = Arc::clone(&snapshot);
        let mut shutdown = shutdown.clone();
        connections.spawn(async move {
            let service = service_fn(move |req: Request<Incoming>| {
                let resp = handle(&req, &snapshot);

                trace!(
                    message = "scrape served",
                    %peer,
                    path = req.uri().path(),
                    status = resp.status().as_u16()
                );

                async move { Ok::<_, Infallible>(resp) }
            });

            let conn = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
            tokio::pin!(conn);

            let result = tokio::select! {
                result = conn.as_mut() => result,
                _ = &mut shutdown => {
                    conn.as_mut().graceful_shutdown();
                    conn.await
                }
            };

            if let Err(err) = result {
                trace!(
                    message = "failed to serve http connection",
                    %peer,
                    %err
                );
            }
        });
    }

    // close the listener before draining, new connections are refused
    drop(listener);
    while connections.join_next().await.is_some() {}

    debug!(message = "http server shutdown successful");
}

fn handle<B>(req: &Request<B>, snapshot: &Snapshot) -> Response<Full<Bytes>> {
    if req.method() != Method::GET || req.uri().path() != METRICS_PATH {
        let mut resp = Response::new(Full::default());
        *resp.status_mut() = StatusCode::NOT_FOUND;
        return resp;
    }

    let body = snapshot.read().clone();
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(TEXT_FORMAT));

    let body = if should_compress(req.headers()) {
        match gzip(&body) {
            Ok(compressed) => {
                headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
                compressed
            }
            Err(err) => {
                warn!(
                    message = "compress response failed, fallback to plain text",
                    %err
                );

                body
            }
        }
    } else {
        body
    };

    let mut resp = Response::new(Full::new(body));
    *resp.headers_mut() = headers;
    resp
}

fn should_compress(headers: &HeaderMap) -> bool {
    match headers.get(ACCEPT_ENCODING) {
        Some(value) => match value.to_str() {
            Ok(value) => value.contains("gzip"),
            Err(_err) => false,
        },
        None => false,
    }
}

fn gzip(data: &[u8]) -> std::io::Result<Bytes> {
    let mut encoder =
        flate2::write::GzEncoder::new(BytesMut::new().writer(), flate2::Compression::default());
    encoder.write_all(data)?;

    Ok(encoder.finish()?.into_inner().freeze())
}
