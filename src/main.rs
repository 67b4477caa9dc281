//! Multi-user TCP Chat Server - Entry Point
//!
//! Validates the port argument, opens the event log, starts the transfer
//! worker and the accept loop, and wires SIGINT to graceful shutdown.

use std::env;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use chatroomd::eventlog::{EventLog, EventTag, DEFAULT_LOG_PATH};
use chatroomd::{Server, ServerState};

/// Highest port the server will bind.
const MAX_PORT: u16 = 10000;

/// Pause after shutdown fan-out so writer tasks flush the goodbye lines.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(100);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=chatroomd=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chatroomd=info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        eprintln!("Usage: {} <port>", args[0]);
        process::exit(1);
    }
    let port = match args[1].parse::<u16>() {
        Ok(p) if (1..=MAX_PORT).contains(&p) => p,
        _ => {
            eprintln!("Invalid port number");
            process::exit(1);
        }
    };

    let log = match EventLog::open(DEFAULT_LOG_PATH) {
        Ok(log) => log,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    };

    let state = ServerState::new(log);
    let server = Server::bind(port, Arc::clone(&state)).await?;
    state
        .log
        .record(EventTag::Server, format!("Chat server started on port {}", port));
    info!("server listening on port {}...", port);

    state.spawn_transfer_worker();

    // SIGINT triggers the graceful shutdown fan-out.
    tokio::spawn({
        let state = Arc::clone(&state);
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => state.shutdown().await,
                Err(e) => error!("failed to listen for SIGINT: {}", e),
            }
        }
    });

    server.run().await;

    // Let per-session writer tasks drain the goodbye lines before exiting.
    tokio::time::sleep(SHUTDOWN_GRACE).await;
    Ok(())
}
