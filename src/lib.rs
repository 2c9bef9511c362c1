//! Line-oriented TCP Chat Server Library
//!
//! Peers connect over a plain byte stream, pick a display name, and
//! exchange chat lines relayed to every other participant. New joiners
//! receive the full message history before any live traffic.
//!
//! # Features
//! - Name negotiation with uniqueness and printable-ASCII checks
//! - Admission ceiling (`Config::max_clients`)
//! - Timestamped broadcast with in-memory history replay
//! - Join/leave announcements
//! - Graceful shutdown closing every open connection
//!
//! # Architecture
//! A single `ChatServer` context holds the registry and history behind one
//! `tokio::sync::Mutex`:
//! - Each connection runs a `handle_connection` task (reader) plus a writer
//!   task draining a bounded per-session queue
//! - Broadcast only enqueues while holding the lock, so a slow peer never
//!   stalls the others
//! - Join (admit + announce + replay) is one critical section, giving every
//!   joiner a gap-free, duplicate-free view of the message order
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//! use tcpchat::{serve, ChatServer, Config};
//!
//! #[tokio::main]
//! async fn main() {
//!     let listener = TcpListener::bind("0.0.0.0:8989").await.unwrap();
//!     let server = Arc::new(ChatServer::new(Config::default()));
//!     serve(listener, server).await;
//! }
//! ```

pub mod config;
pub mod error;
pub mod handler;
pub mod history;
pub mod message;
pub mod registry;
pub mod runner;
pub mod server;
pub mod session;
pub mod time;
pub mod types;

// Re-export main types for convenience
pub use config::Config;
pub use error::{AdmissionError, AppError, LineError, SendError};
pub use handler::handle_connection;
pub use history::History;
pub use registry::Registry;
pub use runner::serve;
pub use server::{ChatServer, ChatState};
pub use session::Session;
pub use time::{Clock, FixedClock, SystemClock};
pub use types::{ConnectionId, DisplayName};
