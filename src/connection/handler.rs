//! Connection Handler Module
//!
//! This module owns one client connection end to end. Each accepted
//! connection gets its own handler task that runs a read/dispatch/reply
//! loop until the client disconnects or breaks protocol.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Client connects (TCP handshake)
//!        │
//!        ▼
//! 2. ConnectionHandler spawned (state: Idle, no session bound)
//!        │
//!        ▼
//! 3. ┌──────────────────────────────┐
//!    │      Main Loop               │
//!    │                              │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Read bytes from socket  │ │
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Parse one request       │ │
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Dispatch to registry    │ │
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Send one reply          │ │
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │         [Loop back]          │
//!    └──────────────────────────────┘
//!        │
//!        ▼
//! 4. Disconnect / protocol violation / I/O failure
//!        │
//!        ▼
//! 5. Handler task ends (state: Terminated)
//! ```
//!
//! ## Session binding
//!
//! The bound session identifier is connection-local state: the registry
//! never learns which connection (if any) holds a session, which is what
//! lets a later connection resume the same session. A connection is bound
//! to at most one session at a time; `0` means unbound.
//!
//! ## Error policy
//!
//! - Protocol errors (unknown verb, malformed framing): one `error` reply,
//!   best effort, then the connection is torn down.
//! - Session errors (not open, not found, already open): a structured
//!   `error` or `rejected` reply; the connection stays usable.
//! - Transport errors: no reply attempted, resources released.

use crate::protocol::{ParseError, Reply, Request, RequestParser, MAX_DOCUMENT_SIZE};
use crate::registry::{SessionRegistry, NO_SESSION};
use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tracing::{debug, error, info, trace, warn};

/// Maximum size for the read buffer: one maximal document plus framing.
const MAX_BUFFER_SIZE: usize = MAX_DOCUMENT_SIZE + 4096;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total requests processed
    pub requests_processed: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn request_processed(&self) {
        self.requests_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Handles a single client connection.
///
/// This struct manages the read buffer, request parsing, the per-connection
/// session binding, and reply sending for one connected client.
pub struct ConnectionHandler {
    /// The TCP stream for this connection
    stream: BufWriter<TcpStream>,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Buffer for incoming data
    buffer: BytesMut,

    /// The shared session registry
    registry: Arc<SessionRegistry>,

    /// Request parser
    parser: RequestParser,

    /// The session bound to this connection; `NO_SESSION` (0) when Idle.
    /// This handler is the sole writer of this field.
    session_id: u64,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,
}

impl ConnectionHandler {
    /// Creates a new connection handler.
    ///
    /// # Arguments
    ///
    /// * `stream` - The TCP stream for this connection
    /// * `addr` - The client's socket address
    /// * `registry` - The shared session registry
    /// * `stats` - Shared connection statistics
    pub fn new(
        stream: TcpStream,
        addr: SocketAddr,
        registry: Arc<SessionRegistry>,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.connection_opened();

        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            registry,
            parser: RequestParser::new(),
            session_id: NO_SESSION,
            stats,
        }
    }

    /// Runs the main connection loop.
    ///
    /// Reads requests from the client, dispatches them against the
    /// registry, and sends back replies until the client disconnects or an
    /// error occurs.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(client = %self.addr, "Client disconnected gracefully"),
            Err(e) => match e {
                ConnectionError::ClientDisconnected => {
                    debug!(client = %self.addr, "Client disconnected")
                }
                ConnectionError::IoError(io_err)
                    if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
                {
                    debug!(client = %self.addr, "Connection reset by client")
                }
                _ => warn!(client = %self.addr, error = %e, "Connection error"),
            },
        }

        self.stats.connection_closed();
        result
    }

    /// The main read-dispatch-reply loop.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            // Drain every complete request already in the buffer
            loop {
                match self.try_parse_request() {
                    Ok(Some(request)) => {
                        debug!(
                            client = %self.addr,
                            session = self.session_id,
                            request = %request,
                            "Request received"
                        );

                        let reply = self.dispatch(request);
                        if reply.is_failure() {
                            debug!(
                                client = %self.addr,
                                session = self.session_id,
                                reply = %reply,
                                "Request failed"
                            );
                        }
                        self.stats.request_processed();
                        self.send_reply(&reply).await?;
                    }
                    Ok(None) => break,
                    Err(e) => {
                        // Protocol violation: this client is broken. Reply
                        // once, best effort, then terminate.
                        warn!(client = %self.addr, error = %e, "Protocol error");
                        let _ = self.send_reply(&Reply::error("Invalid message")).await;
                        return Err(ConnectionError::ParseError(e));
                    }
                }
            }

            // Need more data - read from the socket
            self.read_more_data().await?;
        }
    }

    /// Attempts to parse a request from the buffer.
    fn try_parse_request(&mut self) -> Result<Option<Request>, ParseError> {
        // Drop blank lines left between requests (a line-writer client
        // terminates its post payload with a newline of its own), so a
        // trailing one does not read as a partial request at disconnect.
        while matches!(self.buffer.first(), Some(&b'\n') | Some(&b'\r')) {
            let _ = self.buffer.split_to(1);
        }

        if self.buffer.is_empty() {
            return Ok(None);
        }

        match self.parser.parse(&self.buffer)? {
            Some((request, consumed)) => {
                let _ = self.buffer.split_to(consumed);
                trace!(
                    client = %self.addr,
                    consumed = consumed,
                    remaining = self.buffer.len(),
                    "Parsed request"
                );
                Ok(Some(request))
            }
            None => {
                trace!(
                    client = %self.addr,
                    buffered = self.buffer.len(),
                    "Incomplete request, need more data"
                );
                Ok(None)
            }
        }
    }

    /// Dispatches one request against the connection state machine.
    ///
    /// Idle (no session bound) accepts `open` and `resume`; Bound accepts
    /// `get`, `post` and `close`. Everything else earns an error reply and
    /// leaves the state untouched.
    fn dispatch(&mut self, request: Request) -> Reply {
        match request {
            Request::Open => {
                if self.session_id != NO_SESSION {
                    return Reply::error("session already open");
                }

                let id = self.registry.open_session();
                self.session_id = id;
                info!(client = %self.addr, session = id, "Session opened");
                Reply::Accepted(id)
            }

            Request::Resume(id) => {
                if self.session_id != NO_SESSION {
                    return Reply::error("session already open");
                }

                // 0 is the reserved "no session" value and never names a
                // real session.
                if id == NO_SESSION {
                    return Reply::rejected("invalid session id");
                }

                if self.registry.resume_session(id) {
                    self.session_id = id;
                    info!(client = %self.addr, session = id, "Session resumed");
                    Reply::Accepted(id)
                } else {
                    debug!(client = %self.addr, session = id, "Resume rejected");
                    Reply::rejected("session not open")
                }
            }

            Request::Close => {
                if self.session_id == NO_SESSION {
                    return Reply::error("no session open");
                }

                match self.registry.close_session(self.session_id) {
                    Ok(()) => {
                        let id = self.session_id;
                        self.session_id = NO_SESSION;
                        info!(client = %self.addr, session = id, "Session closed");
                        Reply::Closed(id)
                    }
                    Err(e) => Reply::error(e.to_string()),
                }
            }

            Request::Get(name) => {
                if self.session_id == NO_SESSION {
                    return Reply::error("no session open");
                }

                match self.registry.get_value(self.session_id, &name) {
                    Ok(content) => Reply::Document { name, content },
                    Err(e) => Reply::error(e.to_string()),
                }
            }

            Request::Post { name, content } => {
                if self.session_id == NO_SESSION {
                    return Reply::error("no session open");
                }

                match self.registry.put_value(self.session_id, name, content) {
                    Ok(()) => Reply::PostOk,
                    Err(e) => Reply::error(e.to_string()),
                }
            }
        }
    }

    /// Reads more data from the socket into the buffer.
    async fn read_more_data(&mut self) -> Result<(), ConnectionError> {
        // Check buffer size limit
        if self.buffer.len() >= MAX_BUFFER_SIZE {
            error!(
                client = %self.addr,
                size = self.buffer.len(),
                "Buffer size limit exceeded"
            );
            return Err(ConnectionError::BufferFull);
        }

        // Ensure we have some capacity
        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(4096);
        }

        // Read data
        let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;

        if n == 0 {
            // Connection closed by client
            if self.buffer.is_empty() {
                return Err(ConnectionError::ClientDisconnected);
            } else {
                // Partial request in buffer
                return Err(ConnectionError::UnexpectedEof);
            }
        }

        self.stats.bytes_read(n);
        trace!(client = %self.addr, bytes = n, "Read data");

        Ok(())
    }

    /// Sends a reply to the client.
    ///
    /// The whole reply is serialized into one buffer and flushed as a
    /// single unit before the next request is read.
    async fn send_reply(&mut self, reply: &Reply) -> Result<(), ConnectionError> {
        let bytes = reply.serialize();
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        self.stats.bytes_written(bytes.len());
        trace!(
            client = %self.addr,
            reply = %reply,
            bytes = bytes.len(),
            "Sent reply"
        );
        Ok(())
    }
}

/// Errors that can occur while handling a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Protocol parse error
    #[error("Parse error: {0}")]
    ParseError(#[from] ParseError),

    /// Client disconnected normally
    #[error("Client disconnected")]
    ClientDisconnected,

    /// Unexpected end of stream (partial request)
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    /// Buffer size limit exceeded
    #[error("Buffer size limit exceeded")]
    BufferFull,
}

/// Handles a client connection.
///
/// This is a convenience function that creates a ConnectionHandler
/// and runs it to completion.
///
/// # Arguments
///
/// * `stream` - The TCP stream for this connection
/// * `addr` - The client's socket address
/// * `registry` - The shared session registry
/// * `stats` - Shared connection statistics
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    registry: Arc<SessionRegistry>,
    stats: Arc<ConnectionStats>,
) {
    let handler = ConnectionHandler::new(stream, addr, registry, stats);
    if let Err(e) = handler.run().await {
        match e {
            ConnectionError::ClientDisconnected => {}
            ConnectionError::IoError(ref io_err)
                if io_err.kind() == std::io::ErrorKind::ConnectionReset => {}
            _ => {
                debug!(client = %addr, error = %e, "Connection ended with error");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn create_test_server() -> (SocketAddr, Arc<SessionRegistry>, Arc<ConnectionStats>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let registry = Arc::new(SessionRegistry::new());
        let stats = Arc::new(ConnectionStats::new());

        let registry_clone = Arc::clone(&registry);
        let stats_clone = Arc::clone(&stats);

        tokio::spawn(async move {
            while let Ok((stream, client_addr)) = listener.accept().await {
                let registry = Arc::clone(&registry_clone);
                let stats = Arc::clone(&stats_clone);
                tokio::spawn(handle_connection(stream, client_addr, registry, stats));
            }
        });

        (addr, registry, stats)
    }

    /// Reads exactly the expected reply bytes and asserts on them.
    async fn expect_reply(client: &mut TcpStream, expected: &[u8]) {
        let mut buf = vec![0u8; expected.len()];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(
            buf,
            expected,
            "expected {:?}, got {:?}",
            String::from_utf8_lossy(expected),
            String::from_utf8_lossy(&buf)
        );
    }

    #[tokio::test]
    async fn test_open_post_get_close() {
        let (addr, _, _) = create_test_server().await;

        let mut client = TcpStream::connect(addr).await.unwrap();

        client.write_all(b"open\n").await.unwrap();
        expect_reply(&mut client, b"accepted\n1\n").await;

        client.write_all(b"post report 5\nhello").await.unwrap();
        expect_reply(&mut client, b"success\n").await;

        client.write_all(b"get report\n").await.unwrap();
        expect_reply(&mut client, b"success\nreport\n5\nhello\n").await;

        client.write_all(b"close\n").await.unwrap();
        expect_reply(&mut client, b"closed\n1\n").await;
    }

    #[tokio::test]
    async fn test_get_without_session_is_recoverable() {
        let (addr, _, _) = create_test_server().await;

        let mut client = TcpStream::connect(addr).await.unwrap();

        client.write_all(b"get report\n").await.unwrap();
        expect_reply(&mut client, b"error\nno session open\n").await;

        // The connection stays usable after a session error.
        client.write_all(b"open\n").await.unwrap();
        expect_reply(&mut client, b"accepted\n1\n").await;
    }

    #[tokio::test]
    async fn test_post_and_close_without_session() {
        let (addr, _, _) = create_test_server().await;

        let mut client = TcpStream::connect(addr).await.unwrap();

        client.write_all(b"post report 5\nhello").await.unwrap();
        expect_reply(&mut client, b"error\nno session open\n").await;

        client.write_all(b"close\n").await.unwrap();
        expect_reply(&mut client, b"error\nno session open\n").await;
    }

    #[tokio::test]
    async fn test_open_while_bound_is_rejected() {
        let (addr, _, _) = create_test_server().await;

        let mut client = TcpStream::connect(addr).await.unwrap();

        client.write_all(b"open\n").await.unwrap();
        expect_reply(&mut client, b"accepted\n1\n").await;

        client.write_all(b"open\n").await.unwrap();
        expect_reply(&mut client, b"error\nsession already open\n").await;

        client.write_all(b"resume 1\n").await.unwrap();
        expect_reply(&mut client, b"error\nsession already open\n").await;

        // Still bound: document operations keep working.
        client.write_all(b"post doc 2\nok").await.unwrap();
        expect_reply(&mut client, b"success\n").await;
    }

    #[tokio::test]
    async fn test_resume_from_new_connection() {
        let (addr, _, _) = create_test_server().await;

        // First connection: open a session, store a document, disconnect
        // without closing.
        let mut first = TcpStream::connect(addr).await.unwrap();
        first.write_all(b"open\n").await.unwrap();
        expect_reply(&mut first, b"accepted\n1\n").await;
        first.write_all(b"post report 5\nhello").await.unwrap();
        expect_reply(&mut first, b"success\n").await;
        drop(first);

        // Second connection: resume the session and read the document back.
        let mut second = TcpStream::connect(addr).await.unwrap();
        second.write_all(b"resume 1\n").await.unwrap();
        expect_reply(&mut second, b"accepted\n1\n").await;
        second.write_all(b"get report\n").await.unwrap();
        expect_reply(&mut second, b"success\nreport\n5\nhello\n").await;
    }

    #[tokio::test]
    async fn test_resume_closed_or_unknown_session() {
        let (addr, _, _) = create_test_server().await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"open\n").await.unwrap();
        expect_reply(&mut client, b"accepted\n1\n").await;
        client.write_all(b"close\n").await.unwrap();
        expect_reply(&mut client, b"closed\n1\n").await;

        // Closed sessions cannot be resumed.
        client.write_all(b"resume 1\n").await.unwrap();
        expect_reply(&mut client, b"rejected\nsession not open\n").await;

        // Unknown identifiers are rejected the same way.
        client.write_all(b"resume 99\n").await.unwrap();
        expect_reply(&mut client, b"rejected\nsession not open\n").await;

        // 0 is the reserved "no session" id.
        client.write_all(b"resume 0\n").await.unwrap();
        expect_reply(&mut client, b"rejected\ninvalid session id\n").await;
    }

    #[tokio::test]
    async fn test_get_missing_document() {
        let (addr, _, _) = create_test_server().await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"open\n").await.unwrap();
        expect_reply(&mut client, b"accepted\n1\n").await;

        client.write_all(b"get missing\n").await.unwrap();
        expect_reply(&mut client, b"error\nvalue not found: missing\n").await;

        // Recoverable: the session is still bound and usable.
        client.write_all(b"post missing 2\nhi").await.unwrap();
        expect_reply(&mut client, b"success\n").await;
        client.write_all(b"get missing\n").await.unwrap();
        expect_reply(&mut client, b"success\nmissing\n2\nhi\n").await;
    }

    #[tokio::test]
    async fn test_document_content_with_newlines() {
        let (addr, _, _) = create_test_server().await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"open\n").await.unwrap();
        expect_reply(&mut client, b"accepted\n1\n").await;

        client.write_all(b"post notes 11\nhello\nworld").await.unwrap();
        expect_reply(&mut client, b"success\n").await;

        client.write_all(b"get notes\n").await.unwrap();
        expect_reply(&mut client, b"success\nnotes\n11\nhello\nworld\n").await;
    }

    #[tokio::test]
    async fn test_newline_terminated_post_payload() {
        let (addr, _, _) = create_test_server().await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"open\n").await.unwrap();
        expect_reply(&mut client, b"accepted\n1\n").await;

        // A line-writer client terminates the payload with its own newline;
        // the blank line is skipped before the next command.
        client.write_all(b"post report 5\nhello\n").await.unwrap();
        expect_reply(&mut client, b"success\n").await;

        client.write_all(b"get report\n").await.unwrap();
        expect_reply(&mut client, b"success\nreport\n5\nhello\n").await;
    }

    #[tokio::test]
    async fn test_unknown_verb_terminates_connection() {
        let (addr, _, _) = create_test_server().await;

        let mut client = TcpStream::connect(addr).await.unwrap();

        client.write_all(b"frobnicate\n").await.unwrap();
        expect_reply(&mut client, b"error\nInvalid message\n").await;

        // The server hangs up after a protocol violation.
        let mut buf = [0u8; 16];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_reconnect_after_close_opens_fresh_session() {
        let (addr, _, _) = create_test_server().await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"open\n").await.unwrap();
        expect_reply(&mut client, b"accepted\n1\n").await;
        client.write_all(b"close\n").await.unwrap();
        expect_reply(&mut client, b"closed\n1\n").await;

        // Back in Idle on the same connection: a new open hands out a new,
        // never-reused identifier.
        client.write_all(b"open\n").await.unwrap();
        expect_reply(&mut client, b"accepted\n2\n").await;
    }

    #[tokio::test]
    async fn test_connection_stats() {
        let (addr, _, stats) = create_test_server().await;

        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);

        let mut client = TcpStream::connect(addr).await.unwrap();

        // Give the server time to accept the connection
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

        assert_eq!(stats.connections_accepted.load(Ordering::Relaxed), 1);
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 1);

        client.write_all(b"open\n").await.unwrap();
        expect_reply(&mut client, b"accepted\n1\n").await;

        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

        assert!(stats.requests_processed.load(Ordering::Relaxed) >= 1);
        assert!(stats.bytes_read.load(Ordering::Relaxed) > 0);
        assert!(stats.bytes_written.load(Ordering::Relaxed) > 0);

        drop(client);

        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_concurrent_connections_get_distinct_sessions() {
        let (addr, registry, _) = create_test_server().await;

        let mut handles = vec![];
        for _ in 0..10 {
            handles.push(tokio::spawn(async move {
                let mut client = TcpStream::connect(addr).await.unwrap();
                client.write_all(b"open\n").await.unwrap();

                // accepted\n<id>\n - read up to the second newline.
                let mut reply = Vec::new();
                let mut byte = [0u8; 1];
                let mut newlines = 0;
                while newlines < 2 {
                    client.read_exact(&mut byte).await.unwrap();
                    if byte[0] == b'\n' {
                        newlines += 1;
                    }
                    reply.push(byte[0]);
                }

                let text = String::from_utf8(reply).unwrap();
                let mut lines = text.lines();
                assert_eq!(lines.next(), Some("accepted"));
                lines.next().unwrap().parse::<u64>().unwrap()
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }

        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 10);
        assert_eq!(registry.len(), 10);
    }
}
