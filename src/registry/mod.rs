//! Session Registry Module
//!
//! This module provides the process-wide session table: the mapping from
//! session identifier to session state, with atomic identifier allocation
//! and concurrency-safe document operations.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    SessionRegistry                          │
//! │  next_id: AtomicU64 (ids never reused, 0 reserved)          │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐            │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │...16    │            │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ shards  │            │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every connection handler holds an `Arc<SessionRegistry>` and goes
//! through its five operations; nothing outside this module touches a
//! session's document map directly.
//!
//! ## Example
//!
//! ```
//! use sessdoc::registry::SessionRegistry;
//! use std::sync::Arc;
//!
//! let registry = Arc::new(SessionRegistry::new());
//!
//! let id = registry.open_session();
//! registry.put_value(id, "report".to_string(), "hello".to_string()).unwrap();
//! assert_eq!(registry.get_value(id, "report").unwrap(), "hello");
//! ```

pub mod table;

// Re-export commonly used types
pub use table::{RegistryStats, SessionError, SessionRegistry, NO_SESSION};
