//! wsecho-server: WebSocket echo server
//!
//! Upgrades requests on the configured path (default `/ws`) and echoes every
//! message back to its sender. Stops accepting on Ctrl-C.

use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use wsecho::{logging, Server, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = ServerConfig::load()?;

    logging::init(&config.log_level);

    info!(
        listen = %config.listen,
        path = %config.path,
        welcome_page = config.welcome_page,
        max_connections = config.max_connections,
        header_read_timeout = ?config.header_read_timeout,
        read_buffer_size = config.read_buffer_size,
        write_buffer_size = config.write_buffer_size,
        origins = ?config.origin_policy(),
        "Starting wsecho server"
    );

    let server = Server::new(config);
    let listener = server.bind().await.inspect_err(|e| {
        error!(error = %e, "ListenAndServe error");
    })?;

    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, shutting down");
            on_signal.cancel();
        }
    });

    server.serve(listener, shutdown).await?;
    Ok(())
}
