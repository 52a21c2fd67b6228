//! # sessdoc - A Session-Oriented Document Exchange Server
//!
//! sessdoc is an in-memory document exchange server written in Rust.
//! Clients open a long-lived logical *session* over a transient TCP
//! connection, read and write named documents scoped to that session, and
//! can resume the session later from a brand-new connection using the
//! identifier they were issued.
//!
//! ## Features
//!
//! - **Resumable sessions**: documents outlive the connection; a session
//!   identifier handed out once is valid until the session is closed
//! - **Unique identifiers**: session ids are strictly increasing and never
//!   reused, even under concurrent opens
//! - **Simple text protocol**: line-oriented verbs with byte-counted
//!   document payloads, easy to drive from netcat
//! - **Async I/O**: built on Tokio, one task per connection
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                              sessdoc                                │
//! │                                                                     │
//! │  ┌─────────────┐    ┌──────────────┐    ┌──────────────┐            │
//! │  │ TCP Server  │───>│ Connection   │───>│  Request     │            │
//! │  │ (Listener)  │    │  Handler     │    │  Parser      │            │
//! │  └─────────────┘    └──────┬───────┘    └──────────────┘            │
//! │                            │                                        │
//! │                            ▼                                        │
//! │  ┌──────────────────────────────────────────────────────────────┐   │
//! │  │                     SessionRegistry                          │   │
//! │  │  next_id: AtomicU64                                          │   │
//! │  │  ┌────────┐ ┌────────┐ ┌────────┐ ┌────────┐                 │   │
//! │  │  │Shard 0 │ │Shard 1 │ │Shard 2 │ │...N    │                 │   │
//! │  │  │RwLock  │ │RwLock  │ │RwLock  │ │shards  │                 │   │
//! │  │  └────────┘ └────────┘ └────────┘ └────────┘                 │   │
//! │  └──────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use sessdoc::connection::{handle_connection, ConnectionStats};
//! use sessdoc::registry::SessionRegistry;
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() {
//!     // Create the shared session registry
//!     let registry = Arc::new(SessionRegistry::new());
//!
//!     // Create connection statistics
//!     let stats = Arc::new(ConnectionStats::new());
//!
//!     // Start listening for connections
//!     let listener = TcpListener::bind("127.0.0.1:7878").await.unwrap();
//!
//!     loop {
//!         let (stream, addr) = listener.accept().await.unwrap();
//!         let registry = Arc::clone(&registry);
//!         let stats = Arc::clone(&stats);
//!
//!         tokio::spawn(handle_connection(stream, addr, registry, stats));
//!     }
//! }
//! ```
//!
//! ## The Protocol
//!
//! One command per round trip:
//!
//! | Request | Reply |
//! |---|---|
//! | `open` | `accepted` + session id |
//! | `resume <id>` | `accepted` + id, or `rejected` + reason |
//! | `get <name>` | `success` + name + length + content, or `error` + reason |
//! | `post <name> <len>` + content | `success`, or `error` + reason |
//! | `close` | `closed` + id, or `error` + reason |
//!
//! Session errors (no session bound, unknown document, closed session) are
//! recoverable: the connection stays open. An unrecognized verb or broken
//! framing gets one `error` reply and the connection is dropped.
//!
//! ## Module Overview
//!
//! - [`protocol`]: request/reply types, incremental wire parser
//! - [`registry`]: the shared, thread-safe session table
//! - [`connection`]: per-connection handler and state machine
//!
//! ## Design Highlights
//!
//! ### Connection-local binding
//!
//! Which session a connection is bound to is state the connection handler
//! alone owns; the registry never tracks "who is connected". That is what
//! makes resuming a session from a different connection trivial.
//!
//! ### Thread Safety
//!
//! The registry is the only cross-connection shared mutable state. Ids come
//! from a single atomic counter; sessions live in sharded RwLocks so every
//! get/put/close is atomic on its session's document map.

pub mod connection;
pub mod protocol;
pub mod registry;

// Re-export commonly used types for convenience
pub use connection::{handle_connection, ConnectionStats};
pub use protocol::{ParseError, Reply, Request, RequestParser};
pub use registry::{SessionError, SessionRegistry};

/// The default port sessdoc listens on
pub const DEFAULT_PORT: u16 = 7878;

/// The default host sessdoc binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of sessdoc
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
