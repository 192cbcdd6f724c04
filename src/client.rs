//! Echo client session.
//!
//! A session owns the write half of one WebSocket. The read half runs on a
//! background receiver task that logs everything the server sends. The
//! controller (periodic or interactive) is the only writer, and it stops
//! with a single close frame when its cancellation token fires.

use crate::error::ClientError;
use crate::message::{describe, MessageKind};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

/// Replies buffered for the interactive controller
const INBOUND_CAPACITY: usize = 64;

/// How the controller loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Cancellation token fired
    Interrupted,
    /// Message count reached, or `quit` / end of input in interactive mode
    Finished,
    /// The server went away
    PeerClosed,
}

/// Outcome of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub sent: u64,
    pub received: u64,
    pub end: SessionEnd,
}

/// Open a WebSocket to `url`.
pub async fn connect(url: &str) -> Result<WebSocketStream<MaybeTlsStream<TcpStream>>, ClientError> {
    let url = Url::parse(url).map_err(|e| ClientError::InvalidUrl(e.to_string()))?;
    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(ClientError::InvalidUrl(format!(
            "unsupported scheme '{}'",
            url.scheme()
        )));
    }

    let (ws, response) = tokio_tungstenite::connect_async(url.as_str())
        .await
        .map_err(ClientError::Connect)?;
    debug!(status = %response.status(), "Handshake complete");
    Ok(ws)
}

/// One client connection: a writer half plus a background receiver.
pub struct ClientSession<S> {
    sink: SplitSink<WebSocketStream<S>, Message>,
    receiver: JoinHandle<()>,
    received: Arc<AtomicU64>,
    inbound: Option<mpsc::Receiver<Message>>,
    sent: u64,
}

impl<S> ClientSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Start a session that only logs inbound messages.
    pub fn new(ws: WebSocketStream<S>) -> Self {
        Self::start(ws, false)
    }

    /// Start a session that also hands every inbound data message to the
    /// controller. Used by interactive mode to wait for each reply.
    pub fn with_replies(ws: WebSocketStream<S>) -> Self {
        Self::start(ws, true)
    }

    fn start(ws: WebSocketStream<S>, forward: bool) -> Self {
        let (sink, stream) = ws.split();
        let received = Arc::new(AtomicU64::new(0));

        let (tx, rx) = if forward {
            let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        let receiver = tokio::spawn(receive_loop(stream, Arc::clone(&received), tx));

        Self {
            sink,
            receiver,
            received,
            inbound: rx,
            sent: 0,
        }
    }

    /// Data messages received so far.
    fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    /// Send `payload` every `period` until cancelled, `count` sends are done,
    /// or a send fails. Ends with the close handshake.
    pub async fn run_periodic(
        mut self,
        payload: &str,
        period: Duration,
        count: Option<u64>,
        grace: Duration,
        shutdown: CancellationToken,
    ) -> SessionSummary {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let end = loop {
            if count.is_some_and(|limit| self.sent >= limit) {
                break SessionEnd::Finished;
            }

            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Interrupt received, closing connection...");
                    break SessionEnd::Interrupted;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.send_text(payload).await {
                        warn!(error = %e, "Write error");
                        return self.abandon(SessionEnd::PeerClosed);
                    }
                }
            }
        };

        self.close(grace, end).await
    }

    /// Send each input line and wait for its echo. `quit` (any case), end of
    /// input, or cancellation ends the session with the close handshake.
    pub async fn run_interactive<R>(
        mut self,
        input: R,
        grace: Duration,
        shutdown: CancellationToken,
    ) -> Result<SessionSummary, ClientError>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();
        let mut input_error = None;
        info!("Enter message (or 'quit' to exit)");

        let end = loop {
            let line = tokio::select! {
                _ = shutdown.cancelled() => break SessionEnd::Interrupted,
                line = lines.next_line() => line,
            };

            let line = match line {
                Ok(Some(line)) => line,
                Ok(None) => break SessionEnd::Finished,
                Err(e) => {
                    warn!(error = %e, "Input error");
                    input_error = Some(e);
                    break SessionEnd::Finished;
                }
            };
            if line.trim().eq_ignore_ascii_case("quit") {
                break SessionEnd::Finished;
            }

            if let Err(e) = self.send_text(&line).await {
                warn!(error = %e, "Write error");
                return Ok(self.abandon(SessionEnd::PeerClosed));
            }
            info!("Sent: {line}");

            let Some(inbound) = self.inbound.as_mut() else {
                continue;
            };
            let reply = tokio::select! {
                _ = shutdown.cancelled() => break SessionEnd::Interrupted,
                reply = inbound.recv() => reply,
            };
            if reply.is_none() {
                return Ok(self.abandon(SessionEnd::PeerClosed));
            }
        };

        let summary = self.close(grace, end).await;
        match input_error {
            Some(e) => Err(ClientError::Input(e)),
            None => Ok(summary),
        }
    }

    async fn send_text(&mut self, text: &str) -> Result<(), ClientError> {
        self.sink
            .send(Message::text(text))
            .await
            .map_err(ClientError::Send)?;
        self.sent += 1;
        Ok(())
    }

    /// Send one normal-closure frame, wait `grace`, then stop the receiver.
    async fn close(mut self, grace: Duration, end: SessionEnd) -> SessionSummary {
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: "".into(),
        };

        match self.sink.send(Message::Close(Some(frame))).await {
            Ok(()) => tokio::time::sleep(grace).await,
            Err(e) => warn!(error = %e, "Close message error"),
        }

        self.abandon(end)
    }

    fn abandon(self, end: SessionEnd) -> SessionSummary {
        self.receiver.abort();
        SessionSummary {
            sent: self.sent,
            received: self.received(),
            end,
        }
    }
}

async fn receive_loop<S>(
    mut stream: SplitStream<WebSocketStream<S>>,
    received: Arc<AtomicU64>,
    replies: Option<mpsc::Sender<Message>>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(result) = stream.next().await {
        let msg = match result {
            Ok(msg) => msg,
            Err(e) => {
                warn!(error = %e, "Read error");
                return;
            }
        };

        if let Message::Close(frame) = &msg {
            debug!(?frame, "Server closed the connection");
            return;
        }
        if MessageKind::of(&msg).is_none() {
            continue;
        }

        info!("Received: {}", describe(&msg));
        received.fetch_add(1, Ordering::Relaxed);

        if let Some(replies) = &replies {
            if replies.send(msg).await.is_err() {
                return;
            }
        }
    }
    debug!("Receiver stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::DuplexStream;
    use tokio_tungstenite::tungstenite::protocol::Role;

    async fn pair() -> (WebSocketStream<DuplexStream>, WebSocketStream<DuplexStream>) {
        let (a, b) = tokio::io::duplex(64 * 1024);
        let server = WebSocketStream::from_raw_socket(a, Role::Server, None).await;
        let client = WebSocketStream::from_raw_socket(b, Role::Client, None).await;
        (server, client)
    }

    /// Collect everything the client sends until its close frame.
    async fn collect_until_close(mut server: WebSocketStream<DuplexStream>) -> Vec<Message> {
        let mut seen = Vec::new();
        while let Some(Ok(msg)) = server.next().await {
            let is_close = msg.is_close();
            seen.push(msg);
            if is_close {
                // Let the close reply go out.
                let _ = server.flush().await;
                break;
            }
        }
        seen
    }

    #[tokio::test]
    async fn test_count_limited_session() {
        let (server, client) = pair().await;
        let peer = tokio::spawn(collect_until_close(server));

        let summary = ClientSession::new(client)
            .run_periodic(
                "Hello, WebSocket!",
                Duration::from_millis(5),
                Some(3),
                Duration::from_millis(10),
                CancellationToken::new(),
            )
            .await;

        assert_eq!(summary.sent, 3);
        assert_eq!(summary.end, SessionEnd::Finished);

        let seen = peer.await.unwrap();
        assert_eq!(seen.len(), 4);
        assert!(seen[..3]
            .iter()
            .all(|m| *m == Message::text("Hello, WebSocket!")));
        assert!(seen[3].is_close());
    }

    #[tokio::test]
    async fn test_interrupt_sends_one_close_then_waits() {
        let (server, client) = pair().await;
        let peer = tokio::spawn(collect_until_close(server));
        let shutdown = CancellationToken::new();

        let canceller = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            canceller.cancel();
        });

        let grace = Duration::from_millis(100);
        let started = Instant::now();
        let summary = ClientSession::new(client)
            .run_periodic("tick", Duration::from_millis(10), None, grace, shutdown)
            .await;
        let elapsed = started.elapsed();

        assert_eq!(summary.end, SessionEnd::Interrupted);
        assert!(elapsed >= Duration::from_millis(30) + grace);

        let seen = peer.await.unwrap();
        let closes: Vec<_> = seen.iter().filter(|m| m.is_close()).collect();
        assert_eq!(closes.len(), 1);
        match closes[0] {
            Message::Close(Some(frame)) => {
                assert_eq!(frame.code, CloseCode::Normal);
                assert!(frame.reason.is_empty());
            }
            other => panic!("unexpected: {:?}", other),
        }
        // Close is the last thing sent.
        assert!(seen.last().unwrap().is_close());
        assert_eq!(seen.len() as u64, summary.sent + 1);
    }

    #[tokio::test]
    async fn test_receiver_counts_echoes() {
        let (mut server, client) = pair().await;
        let peer = tokio::spawn(async move {
            while let Some(Ok(msg)) = server.next().await {
                if msg.is_close() {
                    let _ = server.flush().await;
                    break;
                }
                server.send(msg).await.unwrap();
            }
        });

        let summary = ClientSession::new(client)
            .run_periodic(
                "echo me",
                Duration::from_millis(5),
                Some(2),
                Duration::from_millis(50),
                CancellationToken::new(),
            )
            .await;

        assert_eq!(summary.sent, 2);
        assert_eq!(summary.received, 2);
        peer.await.unwrap();
    }

    #[tokio::test]
    async fn test_interactive_session() {
        let (mut server, client) = pair().await;
        let peer = tokio::spawn(async move {
            let mut texts = Vec::new();
            while let Some(Ok(msg)) = server.next().await {
                if msg.is_close() {
                    let _ = server.flush().await;
                    break;
                }
                texts.push(msg.to_text().unwrap().to_string());
                server.send(msg).await.unwrap();
            }
            texts
        });

        let input: &[u8] = b"first\nsecond\nQUIT\nnever sent\n";
        let summary = ClientSession::with_replies(client)
            .run_interactive(input, Duration::from_millis(10), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.sent, 2);
        assert_eq!(summary.received, 2);
        assert_eq!(summary.end, SessionEnd::Finished);
        assert_eq!(peer.await.unwrap(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_input_error_still_closes() {
        let (server, client) = pair().await;
        let peer = tokio::spawn(collect_until_close(server));

        let input = tokio_test::io::Builder::new()
            .read(b"hello\n")
            .read_error(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "stdin gone",
            ))
            .build();

        let result = ClientSession::new(client)
            .run_interactive(
                tokio::io::BufReader::new(input),
                Duration::from_millis(10),
                CancellationToken::new(),
            )
            .await;

        assert!(matches!(result, Err(ClientError::Input(_))));

        let seen = peer.await.unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], Message::text("hello"));
        assert!(seen[1].is_close());
    }

    #[tokio::test]
    async fn test_send_failure_ends_session() {
        let (server, client) = pair().await;
        drop(server);

        let summary = ClientSession::new(client)
            .run_periodic(
                "lost",
                Duration::from_millis(5),
                None,
                Duration::from_millis(10),
                CancellationToken::new(),
            )
            .await;

        assert_eq!(summary.end, SessionEnd::PeerClosed);
        assert_eq!(summary.sent, 0);
    }

    #[tokio::test]
    async fn test_connect_rejects_bad_urls() {
        assert!(matches!(
            connect("not a url").await,
            Err(ClientError::InvalidUrl(_))
        ));
        assert!(matches!(
            connect("http://localhost:8080/ws").await,
            Err(ClientError::InvalidUrl(_))
        ));
    }
}
