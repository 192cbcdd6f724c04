//! wsecho-client: WebSocket echo client
//!
//! Connects to the echo server and sends a fixed message on a timer, or each
//! line typed on stdin with `--interactive`. Ctrl-C closes the connection
//! with a normal-closure frame before exiting.

use bytes::Bytes;
use std::io::BufRead;
use tokio::io::AsyncBufRead;
use tokio::sync::mpsc;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use wsecho::{client, logging, ClientConfig, ClientSession};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = ClientConfig::load()?;

    logging::init(&config.log_level);

    info!(url = %config.url, "Connecting");
    let ws = client::connect(&config.url).await.inspect_err(|e| {
        error!(error = %e, "Dial error");
    })?;

    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let summary = if config.interactive {
        ClientSession::with_replies(ws)
            .run_interactive(stdin_lines(), config.grace, shutdown)
            .await?
    } else {
        ClientSession::new(ws)
            .run_periodic(
                &config.payload,
                config.interval,
                config.count,
                config.grace,
                shutdown,
            )
            .await
    };

    info!(
        sent = summary.sent,
        received = summary.received,
        end = ?summary.end,
        "Session ended"
    );
    Ok(())
}

/// Stdin fed from a plain thread, so a pending read never holds up exit.
fn stdin_lines() -> impl AsyncBufRead + Unpin {
    let (tx, rx) = mpsc::unbounded_channel::<std::io::Result<Bytes>>();

    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let failed = line.is_err();
            if tx.send(line.map(|l| Bytes::from(l + "\n"))).is_err() || failed {
                break;
            }
        }
    });

    let lines = futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|line| (line, rx))
    });
    StreamReader::new(Box::pin(lines))
}
