//! Connection Handler Module
//!
//! This module manages individual client connections. Each accepted
//! connection is handled by its own async task that owns the socket end to
//! end, so workers never share connection-local state.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TCP Listener                            │
//! │                      (main.rs)                              │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │
//!                        │ accept()
//!                        ▼
//!           ┌────────────────────────┐
//!           │   For each client...   │
//!           └────────────┬───────────┘
//!                        │
//!                        │ spawn task
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ConnectionHandler                           │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │  │ Read bytes  │───>│ Parse req   │───>│  Dispatch   │      │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘      │
//! │                                               │             │
//! │                                               ▼             │
//! │                                      ┌─────────────┐        │
//! │                                      │ Send reply  │        │
//! │                                      └─────────────┘        │
//! └──────────────────────────┬──────────────────────────────────┘
//!                            │
//!                            ▼
//!                   Arc<SessionRegistry>
//!                 (shared across handlers)
//! ```
//!
//! ## Features
//!
//! - **State machine**: Idle (no session) vs Bound (session held); the
//!   binding is connection-local and resumable from another connection
//! - **Async I/O**: one Tokio task per connection, blocking only on its
//!   own socket and on short registry critical sections
//! - **Strict ordering**: one reply is flushed before the next request is
//!   read, so per-connection request/response order is exact
//! - **Statistics**: connection and request counters
//!
//! ## Example
//!
//! ```ignore
//! use sessdoc::connection::{handle_connection, ConnectionStats};
//! use sessdoc::registry::SessionRegistry;
//! use std::sync::Arc;
//!
//! let registry = Arc::new(SessionRegistry::new());
//! let stats = Arc::new(ConnectionStats::new());
//!
//! // For each accepted connection...
//! let (stream, addr) = listener.accept().await?;
//! tokio::spawn(handle_connection(stream, addr, Arc::clone(&registry), Arc::clone(&stats)));
//! ```

pub mod handler;

// Re-export commonly used types
pub use handler::{handle_connection, ConnectionError, ConnectionHandler, ConnectionStats};
