//! Per-connection echo loop.
//!
//! A connection is either `Open` or `Closed`. Every step reads one message
//! and, for data messages, writes the echo back before reading again. The
//! first failed read or write (a close frame or the end of the stream
//! included) moves the connection to `Closed`, which is terminal.

use crate::message::{describe, echo_reply, MessageKind};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, trace, warn};

/// Why a connection left the `Open` state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Peer sent a close frame
    PeerClosed,
    /// Stream ended without a close frame
    StreamEnded,
    ReadError(String),
    WriteError(String),
}

/// Current state of a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnState {
    Open,
    Closed(CloseReason),
}

impl ConnState {
    pub fn is_open(&self) -> bool {
        matches!(self, ConnState::Open)
    }
}

/// Summary returned when the echo loop ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Data messages echoed
    pub messages: u64,
    /// Payload bytes echoed
    pub bytes: u64,
    pub close_reason: CloseReason,
}

/// One upgraded WebSocket being echoed.
pub struct EchoConnection<S> {
    ws: WebSocketStream<S>,
    peer: Option<SocketAddr>,
    prefix: Option<Arc<str>>,
    state: ConnState,
    messages: u64,
    bytes: u64,
}

impl<S> EchoConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(ws: WebSocketStream<S>, peer: Option<SocketAddr>, prefix: Option<Arc<str>>) -> Self {
        Self {
            ws,
            peer,
            prefix,
            state: ConnState::Open,
            messages: 0,
            bytes: 0,
        }
    }

    pub fn state(&self) -> &ConnState {
        &self.state
    }

    /// Receive one message and echo it if it carries data.
    ///
    /// Does nothing once the connection is closed.
    pub async fn step(&mut self) -> &ConnState {
        if !self.state.is_open() {
            return &self.state;
        }

        let msg = match self.ws.next().await {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => {
                warn!(peer = ?self.peer, error = %e, "Read error");
                return self.close(CloseReason::ReadError(e.to_string())).await;
            }
            None => {
                trace!(peer = ?self.peer, "Stream ended");
                return self.close(CloseReason::StreamEnded).await;
            }
        };

        if let Message::Close(frame) = &msg {
            debug!(peer = ?self.peer, ?frame, "Close frame received");
            return self.close(CloseReason::PeerClosed).await;
        }

        let Some(kind) = MessageKind::of(&msg) else {
            trace!(peer = ?self.peer, message = %describe(&msg), "Control frame");
            return &self.state;
        };

        info!(peer = ?self.peer, ?kind, "Received: {}", describe(&msg));
        let len = msg.len() as u64;

        let Some(reply) = echo_reply(msg, self.prefix.as_deref()) else {
            return &self.state;
        };

        match self.ws.send(reply).await {
            Ok(()) => {
                self.messages += 1;
                self.bytes += len;
                &self.state
            }
            Err(e) => {
                warn!(peer = ?self.peer, error = %e, "Write error");
                self.close(CloseReason::WriteError(e.to_string())).await
            }
        }
    }

    /// Echo until the connection closes.
    pub async fn run(mut self) -> ConnectionStats {
        while self.state.is_open() {
            self.step().await;
        }

        let close_reason = match self.state {
            ConnState::Closed(reason) => reason,
            ConnState::Open => unreachable!("loop exits only when closed"),
        };

        ConnectionStats {
            messages: self.messages,
            bytes: self.bytes,
            close_reason,
        }
    }

    async fn close(&mut self, reason: CloseReason) -> &ConnState {
        if reason == CloseReason::PeerClosed {
            // Sends the queued close reply.
            if let Err(e) = self.ws.flush().await {
                debug!(peer = ?self.peer, error = %e, "Close reply not sent");
            }
        }
        self.state = ConnState::Closed(reason);
        &self.state
    }
}
