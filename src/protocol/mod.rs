//! Session-Document Wire Protocol
//!
//! This module implements the line-oriented wire protocol spoken between
//! clients and the server.
//!
//! ## Overview
//!
//! Requests and replies are ASCII-compatible text. Each command is one verb
//! line; a `post` carries a payload framed by a declared byte count, so
//! document content may contain newlines. Replies are multi-line but are
//! always serialized and flushed as a single unit.
//!
//! ## Modules
//!
//! - `types`: the `Request` and `Reply` enums and reply serialization
//! - `parser`: incremental parser for incoming request bytes
//!
//! ## Example
//!
//! ```
//! use sessdoc::protocol::{parse_request, Reply};
//!
//! // Parsing incoming data
//! let data = b"post report 5\nhello";
//! let (request, consumed) = parse_request(data).unwrap().unwrap();
//! assert_eq!(request.verb(), "post");
//! assert_eq!(consumed, data.len());
//!
//! // Creating replies
//! let reply = Reply::Accepted(1);
//! assert_eq!(reply.serialize(), b"accepted\n1\n");
//! ```

pub mod parser;
pub mod types;

// Re-export commonly used types for convenience
pub use parser::{parse_request, ParseError, ParseResult, RequestParser, MAX_DOCUMENT_SIZE};
pub use types::{Reply, Request};
