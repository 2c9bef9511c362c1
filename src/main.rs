//! TCP Chat Server - Entry Point
//!
//! Parses arguments, starts the TCP listener, and serves connections until
//! Ctrl+C.

use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tcpchat::config::{DEFAULT_MAX_CLIENTS, DEFAULT_OUTBOUND_BUFFER};
use tcpchat::{serve, ChatServer, Config};

#[derive(Parser, Debug)]
#[command(name = "tcpchat")]
#[command(about = "Line-oriented TCP chat server", long_about = None)]
struct Args {
    /// Port to listen on
    #[arg(default_value_t = 8989)]
    port: u16,

    /// Host address to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Maximum number of concurrently connected clients
    #[arg(short = 'm', long, default_value_t = DEFAULT_MAX_CLIENTS)]
    max_clients: usize,

    /// Lines a slow client may fall behind before messages are dropped for it
    #[arg(long, default_value_t = DEFAULT_OUTBOUND_BUFFER)]
    outbound_buffer: usize,

    /// Do not send the `[time][name]:` input prompt
    #[arg(long)]
    no_prompt: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=tcpchat=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tcpchat=info")),
        )
        .init();

    let args = Args::parse();

    let config = Config::default()
        .with_max_clients(args.max_clients)
        .with_outbound_buffer(args.outbound_buffer)
        .with_message_prompt(!args.no_prompt);

    let addr = format!("{}:{}", args.host, args.port);
    let listener = TcpListener::bind(&addr).await?;
    info!(
        "Chat server listening on {} (max {} clients)",
        listener.local_addr()?,
        config.max_clients
    );

    let server = Arc::new(ChatServer::new(config));

    let signal_server = server.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            return;
        }
        info!("Shutdown signal received");
        signal_server.shutdown().await;
    });

    serve(listener, server).await;

    info!("Server shutdown complete");
    Ok(())
}
