//! Thread-Safe Session Registry
//!
//! This module implements the shared session table at the heart of the
//! server. It tracks every session ever opened, keyed by a `u64` identifier
//! that is allocated once and never reused. Session identifier `0` is
//! reserved to mean "no session" and is never allocated.
//!
//! ## Design Decisions
//!
//! 1. **Atomic allocation**: identifiers come from a single `AtomicU64`,
//!    so concurrent opens always get distinct, strictly increasing ids.
//! 2. **Sharded locks**: sessions live in shards keyed by `id % NUM_SHARDS`
//!    so operations on different sessions rarely contend.
//! 3. **Monotonic lifecycle**: a session goes Open -> Closed exactly once.
//!    Closed sessions stay in the table so their ids stay burnt.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    SessionRegistry                          │
//! │  next_id: AtomicU64                                         │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐            │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │ Shard N │            │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ RwLock  │            │
//! │  │ HashMap │ │ HashMap │ │ HashMap │ │ HashMap │            │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each operation takes exactly one shard lock for its whole critical
//! section, which makes every get/put/close atomic with respect to the
//! session's state. No cross-session ordering is promised beyond that.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use thiserror::Error;

/// Number of shards for the session table.
/// Sessions are spread by `id % NUM_SHARDS`; ids are dense, so this gives
/// an even spread without hashing.
const NUM_SHARDS: usize = 16;

/// The reserved identifier meaning "no session".
pub const NO_SESSION: u64 = 0;

/// Errors raised by registry operations.
///
/// The two variants are deliberately distinct: the connection handler maps
/// session-establishment failures and operational failures to different
/// wire replies.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The session identifier is unknown or the session has been closed.
    #[error("session not open")]
    NotOpen,

    /// The session is open but holds no document under this name.
    #[error("value not found: {0}")]
    NotFound(String),
}

/// A single client session: a named-document map plus its lifecycle flag.
#[derive(Debug, Default)]
struct Session {
    /// Documents stored under this session, keyed by name.
    documents: HashMap<String, String>,
    /// False once the session has been closed; never flips back.
    open: bool,
}

impl Session {
    fn new() -> Self {
        Self {
            documents: HashMap::new(),
            open: true,
        }
    }
}

/// A point-in-time snapshot of registry counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    /// Total sessions ever opened
    pub sessions_opened: u64,
    /// Total successful resumes
    pub sessions_resumed: u64,
    /// Total sessions closed
    pub sessions_closed: u64,
    /// Total get operations (including failures)
    pub get_ops: u64,
    /// Total put operations (including failures)
    pub put_ops: u64,
}

/// The shared session table.
///
/// This is the only cross-connection shared mutable state in the server.
/// It is designed to be wrapped in an `Arc` and handed to every connection
/// handler; all operations are thread-safe and atomic per session.
///
/// # Example
///
/// ```
/// use sessdoc::registry::SessionRegistry;
///
/// let registry = SessionRegistry::new();
///
/// let id = registry.open_session();
/// registry.put_value(id, "report".to_string(), "hello".to_string()).unwrap();
/// assert_eq!(registry.get_value(id, "report").unwrap(), "hello");
///
/// registry.close_session(id).unwrap();
/// assert!(!registry.resume_session(id));
/// ```
pub struct SessionRegistry {
    /// Sharded session storage
    shards: Vec<RwLock<HashMap<u64, Session>>>,

    /// Next identifier to hand out; the single allocation serialization
    /// point. Starts at 1 because 0 means "no session".
    next_id: AtomicU64,

    /// Statistics counters (relaxed; approximate under contention)
    opened_count: AtomicU64,
    resumed_count: AtomicU64,
    closed_count: AtomicU64,
    get_count: AtomicU64,
    put_count: AtomicU64,
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("shards", &self.shards.len())
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .field("opened", &self.opened_count.load(Ordering::Relaxed))
            .field("closed", &self.closed_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    /// Creates a new, empty registry.
    pub fn new() -> Self {
        let shards = (0..NUM_SHARDS).map(|_| RwLock::new(HashMap::new())).collect();

        Self {
            shards,
            next_id: AtomicU64::new(1),
            opened_count: AtomicU64::new(0),
            resumed_count: AtomicU64::new(0),
            closed_count: AtomicU64::new(0),
            get_count: AtomicU64::new(0),
            put_count: AtomicU64::new(0),
        }
    }

    /// Gets the shard holding a given session id.
    #[inline]
    fn shard(&self, id: u64) -> &RwLock<HashMap<u64, Session>> {
        &self.shards[(id % NUM_SHARDS as u64) as usize]
    }

    /// Opens a new session and returns its identifier.
    ///
    /// Identifiers are strictly increasing and never reused, even when
    /// many connections open sessions concurrently. Never fails.
    pub fn open_session(&self) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let mut sessions = self.shard(id).write().unwrap();
        sessions.insert(id, Session::new());

        self.opened_count.fetch_add(1, Ordering::Relaxed);
        id
    }

    /// Checks whether a session can be resumed.
    ///
    /// Returns `true` iff `id` names a currently open session. Has no side
    /// effect beyond confirming eligibility: the binding itself is
    /// connection-local state recorded by the caller. An unknown or closed
    /// id is an expected, recoverable outcome, so this returns `false`
    /// rather than an error.
    pub fn resume_session(&self, id: u64) -> bool {
        let sessions = self.shard(id).read().unwrap();
        let open = sessions.get(&id).map(|s| s.open).unwrap_or(false);

        if open {
            self.resumed_count.fetch_add(1, Ordering::Relaxed);
        }
        open
    }

    /// Closes a session.
    ///
    /// The session stays in the table (its identifier is burnt forever) but
    /// becomes permanently non-resumable.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotOpen`] if the id is unknown or the
    /// session was already closed.
    pub fn close_session(&self, id: u64) -> Result<(), SessionError> {
        let mut sessions = self.shard(id).write().unwrap();

        match sessions.get_mut(&id) {
            Some(session) if session.open => {
                session.open = false;
                self.closed_count.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            _ => Err(SessionError::NotOpen),
        }
    }

    /// Reads a document from a session.
    ///
    /// # Errors
    ///
    /// - [`SessionError::NotOpen`] if the id is unknown or closed
    /// - [`SessionError::NotFound`] if the session holds no such document
    pub fn get_value(&self, id: u64, key: &str) -> Result<String, SessionError> {
        self.get_count.fetch_add(1, Ordering::Relaxed);

        let sessions = self.shard(id).read().unwrap();
        let session = sessions
            .get(&id)
            .filter(|s| s.open)
            .ok_or(SessionError::NotOpen)?;

        session
            .documents
            .get(key)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(key.to_string()))
    }

    /// Writes a document into a session, inserting or overwriting.
    ///
    /// Visible to any subsequent read of the same key from any connection.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotOpen`] if the id is unknown or closed.
    pub fn put_value(&self, id: u64, key: String, value: String) -> Result<(), SessionError> {
        self.put_count.fetch_add(1, Ordering::Relaxed);

        let mut sessions = self.shard(id).write().unwrap();
        let session = sessions
            .get_mut(&id)
            .filter(|s| s.open)
            .ok_or(SessionError::NotOpen)?;

        session.documents.insert(key, value);
        Ok(())
    }

    /// Returns the total number of sessions in the table, open or closed.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.read().unwrap().len()).sum()
    }

    /// Returns true if no session has ever been opened.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns registry statistics.
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            sessions_opened: self.opened_count.load(Ordering::Relaxed),
            sessions_resumed: self.resumed_count.load(Ordering::Relaxed),
            sessions_closed: self.closed_count.load(Ordering::Relaxed),
            get_ops: self.get_count.load(Ordering::Relaxed),
            put_ops: self.put_count.load(Ordering::Relaxed),
        }
    }
}
