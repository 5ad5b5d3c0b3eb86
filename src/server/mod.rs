//! Async TCP server using Tokio.
//!
//! Accepts TCP connections and dispatches HTTP/1.1 requests to a handler function.
//! Connections are persistent (keep-alive) by default. While a handler is
//! running the connection keeps reading, and if the peer hangs up the handler
//! future is dropped so that any upstream work it was waiting on is cancelled.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::http::{
    StatusCode,
    request::{Request, RequestError},
    response::Response,
};

/// Errors produced by the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Maximum size of a complete HTTP request we will buffer before rejecting it (8 MiB).
const MAX_REQUEST_SIZE: usize = 8 * 1024 * 1024;

/// Initial read buffer capacity per connection.
const INITIAL_BUF_SIZE: usize = 4096;

/// The HTTP server.
///
/// # Examples
///
/// ```rust,no_run
/// use skycache::server::Server;
/// use skycache::http::{Request, Response, StatusCode};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let server = Server::bind("127.0.0.1:8080").await?;
///     server.run(|_req: Request| async {
///         Response::new(StatusCode::Ok).body("Hello!")
///     }).await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Server {
    /// Binds the server to the given TCP address.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound
    /// (e.g. port already in use, insufficient permissions).
    pub async fn bind(addr: impl AsRef<str>) -> Result<Self, ServerError> {
        let addr = addr.as_ref();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.to_owned(),
                source: e,
            })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts connections and dispatches requests to `handler` until the
    /// process is terminated.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] if the TCP listener itself fails.
    pub async fn run<H, F>(self, handler: H) -> Result<(), ServerError>
    where
        H: Fn(Request) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
    {
        self.run_until(handler, std::future::pending()).await
    }

    /// Accepts connections and dispatches requests to `handler` until
    /// `shutdown` resolves.
    ///
    /// The handler is wrapped in an [`Arc`] and shared across all spawned
    /// Tokio tasks. Connections already accepted when `shutdown` fires are
    /// left to finish on their own tasks.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] if the TCP listener itself fails.
    pub async fn run_until<H, F, S>(self, handler: H, shutdown: S) -> Result<(), ServerError>
    where
        H: Fn(Request) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
        S: Future<Output = ()>,
    {
        let handler = Arc::new(handler);
        info!(address = %self.local_addr, "skycache listening");

        tokio::pin!(shutdown);

        loop {
            let accepted = tokio::select! {
                accepted = self.listener.accept() => accepted,
                () = &mut shutdown => {
                    info!("shutdown requested, no longer accepting connections");
                    return Ok(());
                }
            };

            let (stream, peer_addr) = match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                    continue;
                }
            };

            debug!(peer = %peer_addr, "connection accepted");
            let handler = Arc::clone(&handler);

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer_addr, handler).await {
                    warn!(peer = %peer_addr, error = %e, "connection closed with error");
                }
            });
        }
    }
}

/// Handles a single TCP connection over its lifetime.
///
/// HTTP/1.1 connections are persistent by default: we loop, reading one
/// request per iteration, until the peer closes the connection or signals
/// `Connection: close`.
async fn handle_connection<H, F>(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    handler: Arc<H>,
) -> Result<(), std::io::Error>
where
    H: Fn(Request) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);

    loop {
        // Pipelined bytes read during the previous handler may already hold
        // a full request.
        if buf.is_empty() || matches!(Request::parse(&buf), Err(RequestError::Incomplete)) {
            let bytes_read = stream.read_buf(&mut buf).await?;
            if bytes_read == 0 {
                debug!(peer = %peer_addr, "connection closed by peer");
                break;
            }
        }

        let parsed = check_size(buf.len())
            .and_then(|()| Request::parse(&buf))
            .and_then(|(request, body_offset)| {
                let total = body_offset + request.content_length().unwrap_or(0);
                check_size(total).map(|()| (request, total))
            });

        let (request, total_needed) = match parsed {
            Ok(pair) => pair,
            Err(RequestError::Incomplete) => continue,
            Err(e) => {
                let response = rejection(&e);
                warn!(
                    peer = %peer_addr,
                    error = %e,
                    status = response.status().as_u16(),
                    "rejecting request"
                );
                stream.write_all(&response.into_bytes()).await?;
                break;
            }
        };

        // Wait for the full body to arrive if Content-Length is set.
        if buf.len() < total_needed {
            let missing = total_needed - buf.len();
            if read_at_least(&mut stream, &mut buf, missing).await? {
                continue;
            }
            debug!(peer = %peer_addr, "connection closed mid-body");
            break;
        }

        let keep_alive = request.is_keep_alive();

        debug!(
            peer = %peer_addr,
            method = %request.method(),
            path = %request.path(),
            "dispatching request"
        );

        // Drop the consumed request bytes before the handler runs so that
        // anything read while waiting belongs to the next request.
        let _ = buf.split_to(total_needed);

        let response = tokio::select! {
            response = handler(request) => response,
            result = wait_for_hangup(&mut stream, &mut buf) => {
                result?;
                debug!(peer = %peer_addr, "peer hung up, handler cancelled");
                return Ok(());
            }
        };

        stream.write_all(&response.into_bytes()).await?;
        stream.flush().await?;

        if !keep_alive {
            debug!(peer = %peer_addr, "Connection: close — shutting down");
            break;
        }
    }

    Ok(())
}

fn check_size(size: usize) -> Result<(), RequestError> {
    if size > MAX_REQUEST_SIZE {
        return Err(RequestError::BodyTooLarge {
            size,
            limit: MAX_REQUEST_SIZE,
        });
    }
    Ok(())
}

/// Builds the response sent before closing a connection whose request could
/// not be accepted.
fn rejection(error: &RequestError) -> Response {
    let status = match error {
        RequestError::BodyTooLarge { .. } => StatusCode::PayloadTooLarge,
        _ => StatusCode::BadRequest,
    };
    Response::new(status)
        .body(format!("{}: {error}", status.canonical_reason()))
        .keep_alive(false)
}

/// Keeps reading into `buf` and resolves once the peer closes its side.
///
/// Bytes that arrive in the meantime (pipelined requests) are kept. Stops
/// reading, without resolving, once `buf` reaches the request size cap.
async fn wait_for_hangup(stream: &mut TcpStream, buf: &mut BytesMut) -> std::io::Result<()> {
    loop {
        if buf.len() > MAX_REQUEST_SIZE {
            return std::future::pending().await;
        }
        if stream.read_buf(buf).await? == 0 {
            return Ok(());
        }
    }
}

/// Reads until at least `n` more bytes are buffered. Returns `false` on EOF.
async fn read_at_least(
    stream: &mut TcpStream,
    buf: &mut BytesMut,
    n: usize,
) -> std::io::Result<bool> {
    let target = buf.len() + n;
    while buf.len() < target {
        if stream.read_buf(buf).await? == 0 {
            return Ok(false);
        }
    }
    Ok(true)
}
