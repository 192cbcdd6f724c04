//! HTTP server that upgrades the configured path to an echo WebSocket.
//!
//! Every accepted TCP connection is served by hyper on its own task. A
//! successful upgrade hands the socket to a further task that runs the
//! echo loop; the connection permit is held until both are done.

use crate::config::ServerConfig;
use crate::connection::EchoConnection;
use crate::error::ServerError;
use crate::upgrade::{self, is_upgrade_request, Upgrader};
use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{self, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::{TokioIo, TokioTimer};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Listen backlog
const BACKLOG: i32 = 1024;

/// State shared by every connection task
struct Shared {
    path: String,
    welcome_page: bool,
    header_read_timeout: Duration,
    prefix: Option<Arc<str>>,
    upgrader: Upgrader,
}

/// Server instance
pub struct Server {
    config: ServerConfig,
    shared: Arc<Shared>,
    connection_limit: Arc<Semaphore>,
}

impl Server {
    /// Create a new server instance
    pub fn new(config: ServerConfig) -> Self {
        let upgrader = Upgrader::new(
            config.origin_policy(),
            Upgrader::stream_config(
                config.read_buffer_size,
                config.write_buffer_size,
                config.max_message_size,
            ),
        );

        let shared = Arc::new(Shared {
            path: config.path.clone(),
            welcome_page: config.welcome_page,
            header_read_timeout: config.header_read_timeout,
            prefix: config.prefix.as_deref().map(Arc::from),
            upgrader,
        });

        Server {
            connection_limit: Arc::new(Semaphore::new(config.max_connections)),
            config,
            shared,
        }
    }

    /// Resolve the listen address and bind it.
    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        let addr = tokio::net::lookup_host(&self.config.listen)
            .await
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or_else(|| ServerError::Address(self.config.listen.clone()))?;

        create_listener(addr).map_err(|source| ServerError::Bind {
            addr: self.config.listen.clone(),
            source,
        })
    }

    /// Accept connections on `listener` until `shutdown` is cancelled.
    ///
    /// Connections already accepted keep running after shutdown.
    pub async fn serve(
        &self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> Result<(), ServerError> {
        match listener.local_addr() {
            Ok(addr) => info!(address = %addr, path = %self.shared.path, "Server listening"),
            Err(_) => info!(address = %self.config.listen, path = %self.shared.path, "Server listening"),
        }

        loop {
            // Wait for a connection slot
            let permit = tokio::select! {
                _ = shutdown.cancelled() => break,
                permit = self.connection_limit.clone().acquire_owned() => {
                    permit.map_err(|_| ServerError::LimiterClosed)?
                }
            };

            let accepted = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, addr)) => {
                    debug!(peer = %addr, "New connection");
                    let shared = Arc::clone(&self.shared);
                    tokio::spawn(serve_connection(stream, addr, shared, Arc::new(permit)));
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }

        info!("Server stopped accepting connections");
        Ok(())
    }
}

/// Serve HTTP on one TCP connection.
async fn serve_connection(
    stream: tokio::net::TcpStream,
    addr: SocketAddr,
    shared: Arc<Shared>,
    permit: Arc<OwnedSemaphorePermit>,
) {
    let io = TokioIo::new(stream);
    let header_read_timeout = shared.header_read_timeout;
    let service = service_fn(move |req| {
        let shared = Arc::clone(&shared);
        let permit = Arc::clone(&permit);
        async move { Ok::<_, Infallible>(handle_request(&shared, addr, req, permit)) }
    });

    // Clients that never finish their headers give the permit back.
    if let Err(e) = http1::Builder::new()
        .timer(TokioTimer::new())
        .header_read_timeout(header_read_timeout)
        .serve_connection(io, service)
        .with_upgrades()
        .await
    {
        debug!(peer = %addr, error = %e, "Connection error");
    }
}

/// Route one request.
fn handle_request<B>(
    shared: &Arc<Shared>,
    addr: SocketAddr,
    req: Request<B>,
    permit: Arc<OwnedSemaphorePermit>,
) -> Response<Full<Bytes>> {
    let path = req.uri().path();

    if path == shared.path {
        if !is_upgrade_request(req.headers()) {
            return plain(StatusCode::BAD_REQUEST, "Expected WebSocket upgrade");
        }
        return upgrade_request(shared, addr, req, permit);
    }

    if path == "/" && shared.welcome_page && req.method() == Method::GET {
        return welcome_page(&shared.path);
    }

    plain(StatusCode::NOT_FOUND, "Not Found")
}

fn upgrade_request<B>(
    shared: &Arc<Shared>,
    addr: SocketAddr,
    req: Request<B>,
    permit: Arc<OwnedSemaphorePermit>,
) -> Response<Full<Bytes>> {
    let (response, pending) = match shared.upgrader.upgrade(req) {
        Ok(accepted) => accepted,
        Err(e) => {
            warn!(peer = %addr, error = %e, "Upgrade error");
            return upgrade::rejection(&e);
        }
    };

    let prefix = shared.prefix.clone();
    tokio::spawn(async move {
        let ws = match pending.finish().await {
            Ok(ws) => ws,
            Err(e) => {
                error!(peer = %addr, error = %e, "Upgrade error");
                return;
            }
        };

        info!(peer = %addr, "Client connected");
        let stats = EchoConnection::new(ws, Some(addr), prefix).run().await;
        debug!(
            peer = %addr,
            messages = stats.messages,
            bytes = stats.bytes,
            reason = ?stats.close_reason,
            "Client disconnected"
        );
        drop(permit);
    });

    response
}

fn welcome_page(ws_path: &str) -> Response<Full<Bytes>> {
    let body = format!(
        "<html>\n  <body>\n    <h1>Hello!</h1>\n    <p>This is an HTTP server. Connect to <code>{ws_path}</code> for WebSocket.</p>\n  </body>\n</html>\n"
    );
    let mut response = Response::new(Full::new(Bytes::from(body)));
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html"));
    response
}

fn plain(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response
}

/// Create a TCP listener with SO_REUSEADDR.
fn create_listener(addr: SocketAddr) -> std::io::Result<TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(BACKLOG)?;

    TcpListener::from_std(socket.into())
}
