//! wsecho: a WebSocket echo server and client
//!
//! The server upgrades requests on one path to a WebSocket and sends every
//! text or binary message straight back to its sender. It can also serve a
//! small welcome page on `/`.
//!
//! The client connects to the server, logs whatever comes back, and sends a
//! fixed text message on a timer (or each line of stdin in interactive mode)
//! until it is interrupted, at which point it performs a close handshake.
//!
//! Features:
//! - One task per connection, no shared state between connections
//! - Origin policy and buffer sizes configured per server instance
//! - Configuration via CLI arguments or TOML file

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod logging;
pub mod message;
pub mod server;
pub mod upgrade;

pub use client::{ClientSession, SessionEnd, SessionSummary};
pub use config::{ClientConfig, ServerConfig};
pub use connection::{CloseReason, ConnState, ConnectionStats, EchoConnection};
pub use error::{ClientError, ServerError, UpgradeError};
pub use server::Server;
pub use upgrade::{OriginPolicy, Upgrader};
