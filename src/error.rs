//! Error types for the echo server and client.

use hyper::StatusCode;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Reasons an HTTP request cannot become a WebSocket.
#[derive(Error, Debug)]
pub enum UpgradeError {
    /// Request is missing the `Connection: upgrade` / `Upgrade: websocket` pair
    #[error("Expected WebSocket upgrade")]
    NotUpgrade,

    /// Handshake must be a GET
    #[error("Method not allowed for upgrade: {0}")]
    Method(String),

    /// Only version 13 is spoken
    #[error("Unsupported WebSocket version: {0}")]
    UnsupportedVersion(String),

    /// No `Sec-WebSocket-Key` header
    #[error("Missing Sec-WebSocket-Key")]
    MissingKey,

    /// Derived `Sec-WebSocket-Accept` is not a valid header value
    #[error("Invalid Sec-WebSocket-Accept value")]
    AcceptHeader,

    /// Origin rejected by the configured policy
    #[error("Origin not allowed: {0}")]
    ForbiddenOrigin(String),

    /// hyper could not hand over the connection
    #[error("Upgrade failed: {0}")]
    Hyper(#[from] hyper::Error),
}

impl UpgradeError {
    /// HTTP status used when rejecting the request.
    pub fn status(&self) -> StatusCode {
        match self {
            UpgradeError::ForbiddenOrigin(_) => StatusCode::FORBIDDEN,
            UpgradeError::AcceptHeader | UpgradeError::Hyper(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

/// Server startup errors. These are fatal to the process.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Listen address did not resolve
    #[error("Invalid listen address '{0}'")]
    Address(String),

    /// Socket could not be created or bound
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Connection limiter was closed
    #[error("Connection limiter closed")]
    LimiterClosed,
}

/// Client errors.
#[derive(Error, Debug)]
pub enum ClientError {
    /// URL failed to parse or has the wrong scheme
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Dial or handshake failed
    #[error("Dial error: {0}")]
    Connect(#[source] tungstenite::Error),

    /// Sending a message failed
    #[error("Write error: {0}")]
    Send(#[source] tungstenite::Error),

    /// Reading local input failed
    #[error("Input error: {0}")]
    Input(#[from] std::io::Error),
}
