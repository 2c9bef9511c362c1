//! TCP accept loop
//!
//! Spawns one handler task per accepted connection and stops accepting
//! once the server's shutdown token fires.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::handler::handle_connection;
use crate::server::ChatServer;

/// Accept connections until `ChatServer::shutdown` is called
///
/// Waits for every spawned handler to finish before returning.
pub async fn serve(listener: TcpListener, server: Arc<ChatServer>) {
    let shutdown = server.shutdown_token();
    let mut handlers = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            Some(joined) = handlers.join_next(), if !handlers.is_empty() => {
                if let Err(e) = joined {
                    error!("Connection task panicked: {}", e);
                }
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    info!("New connection from {}", addr);
                    let server = server.clone();

                    // Spawn handler task for each connection
                    handlers.spawn(async move {
                        if let Err(e) = handle_connection(stream, server).await {
                            error!("Connection handler error for {}: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            },
        }
    }

    debug!("Waiting for {} connection tasks", handlers.len());
    while handlers.join_next().await.is_some() {}
    info!("Accept loop stopped");
}
