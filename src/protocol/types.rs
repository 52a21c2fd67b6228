//! Session-Document Protocol Value Types
//!
//! This module defines the request and reply types exchanged between a
//! client and the server. The protocol is text based and line oriented:
//! every field sits on its own line, except document content, which is
//! framed by a declared byte count so it may itself contain newlines.
//!
//! ## Request grammar
//!
//! ```text
//! open
//! resume <sessionId>
//! close
//! get <documentName>
//! post <documentName> <contentLength>\n<contentLength bytes of content>
//! ```
//!
//! ## Reply grammar
//!
//! ```text
//! accepted\n<sessionId>
//! rejected\n<reasonText>
//! closed\n<sessionId>
//! success                                              (post acknowledgment)
//! success\n<documentName>\n<contentLength>\n<content>  (get result)
//! error\n<errorText>
//! ```
//!
//! A reply is always serialized into one contiguous buffer and written to
//! the socket as a single unit, so its lines can never interleave with a
//! later reply on the same connection.

use std::fmt;

/// The line terminator written by the server.
/// On the read side the parser also accepts `\r\n`.
pub const NEWLINE: &[u8] = b"\n";

/// A parsed client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// `open` - allocate a fresh session and bind this connection to it.
    Open,

    /// `resume <sessionId>` - re-bind this connection to a previously
    /// opened, still-open session.
    Resume(u64),

    /// `close` - close the bound session. The identifier is never reused.
    Close,

    /// `get <documentName>` - read a document from the bound session.
    Get(String),

    /// `post <documentName> <contentLength>` followed by the content bytes.
    /// Inserts or overwrites the document in the bound session.
    Post { name: String, content: String },
}

impl Request {
    /// Returns the protocol verb for this request (for logging).
    pub fn verb(&self) -> &'static str {
        match self {
            Request::Open => "open",
            Request::Resume(_) => "resume",
            Request::Close => "close",
            Request::Get(_) => "get",
            Request::Post { .. } => "post",
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::Open => write!(f, "open"),
            Request::Resume(id) => write!(f, "resume {}", id),
            Request::Close => write!(f, "close"),
            Request::Get(name) => write!(f, "get {}", name),
            Request::Post { name, content } => {
                write!(f, "post {} ({} bytes)", name, content.len())
            }
        }
    }
}

/// A server reply, ready to be serialized onto the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// A session was opened or resumed; carries the session identifier.
    Accepted(u64),

    /// A resume request was turned down; carries the reason.
    Rejected(String),

    /// The bound session was closed; carries its identifier.
    Closed(u64),

    /// A post was applied successfully.
    PostOk,

    /// A get result: document name, then content framed by byte count.
    Document { name: String, content: String },

    /// A recoverable or fatal failure; carries the error text.
    Error(String),
}

impl Reply {
    /// Creates an error reply.
    pub fn error(text: impl Into<String>) -> Self {
        Reply::Error(text.into())
    }

    /// Creates a rejected reply.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Reply::Rejected(reason.into())
    }

    /// Returns true if this reply signals a failure to the client.
    pub fn is_failure(&self) -> bool {
        matches!(self, Reply::Error(_) | Reply::Rejected(_))
    }

    /// Serializes the reply to bytes for sending over the wire.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.serialize_into(&mut buf);
        buf
    }

    /// Serializes the reply into an existing buffer.
    ///
    /// All lines of the reply land in `buf` so the caller can flush them
    /// as one write.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) {
        match self {
            Reply::Accepted(id) => {
                buf.extend_from_slice(b"accepted");
                buf.extend_from_slice(NEWLINE);
                buf.extend_from_slice(id.to_string().as_bytes());
                buf.extend_from_slice(NEWLINE);
            }
            Reply::Rejected(reason) => {
                buf.extend_from_slice(b"rejected");
                buf.extend_from_slice(NEWLINE);
                buf.extend_from_slice(reason.as_bytes());
                buf.extend_from_slice(NEWLINE);
            }
            Reply::Closed(id) => {
                buf.extend_from_slice(b"closed");
                buf.extend_from_slice(NEWLINE);
                buf.extend_from_slice(id.to_string().as_bytes());
                buf.extend_from_slice(NEWLINE);
            }
            Reply::PostOk => {
                buf.extend_from_slice(b"success");
                buf.extend_from_slice(NEWLINE);
            }
            Reply::Document { name, content } => {
                buf.extend_from_slice(b"success");
                buf.extend_from_slice(NEWLINE);
                buf.extend_from_slice(name.as_bytes());
                buf.extend_from_slice(NEWLINE);
                buf.extend_from_slice(content.len().to_string().as_bytes());
                buf.extend_from_slice(NEWLINE);
                buf.extend_from_slice(content.as_bytes());
                buf.extend_from_slice(NEWLINE);
            }
            Reply::Error(text) => {
                buf.extend_from_slice(b"error");
                buf.extend_from_slice(NEWLINE);
                buf.extend_from_slice(text.as_bytes());
                buf.extend_from_slice(NEWLINE);
            }
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Accepted(id) => write!(f, "accepted {}", id),
            Reply::Rejected(reason) => write!(f, "rejected: {}", reason),
            Reply::Closed(id) => write!(f, "closed {}", id),
            Reply::PostOk => write!(f, "success"),
            Reply::Document { name, content } => {
                write!(f, "success {} ({} bytes)", name, content.len())
            }
            Reply::Error(text) => write!(f, "error: {}", text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepted_serialize() {
        let reply = Reply::Accepted(42);
        assert_eq!(reply.serialize(), b"accepted\n42\n");
    }

    #[test]
    fn test_rejected_serialize() {
        let reply = Reply::rejected("session not open");
        assert_eq!(reply.serialize(), b"rejected\nsession not open\n");
    }

    #[test]
    fn test_closed_serialize() {
        let reply = Reply::Closed(7);
        assert_eq!(reply.serialize(), b"closed\n7\n");
    }

    #[test]
    fn test_post_ok_serialize() {
        assert_eq!(Reply::PostOk.serialize(), b"success\n");
    }

    #[test]
    fn test_document_serialize() {
        let reply = Reply::Document {
            name: "report".to_string(),
            content: "hello".to_string(),
        };
        assert_eq!(reply.serialize(), b"success\nreport\n5\nhello\n");
    }

    #[test]
    fn test_document_with_newlines_serialize() {
        // Content is framed by byte count, so embedded newlines are fine.
        let reply = Reply::Document {
            name: "notes".to_string(),
            content: "line one\nline two".to_string(),
        };
        assert_eq!(
            reply.serialize(),
            b"success\nnotes\n17\nline one\nline two\n"
        );
    }

    #[test]
    fn test_error_serialize() {
        let reply = Reply::error("Invalid message");
        assert_eq!(reply.serialize(), b"error\nInvalid message\n");
    }

    #[test]
    fn test_empty_document_serialize() {
        let reply = Reply::Document {
            name: "empty".to_string(),
            content: String::new(),
        };
        assert_eq!(reply.serialize(), b"success\nempty\n0\n\n");
    }

    #[test]
    fn test_is_failure() {
        assert!(Reply::error("boom").is_failure());
        assert!(Reply::rejected("nope").is_failure());
        assert!(!Reply::Accepted(1).is_failure());
        assert!(!Reply::PostOk.is_failure());
    }

    #[test]
    fn test_request_verb() {
        assert_eq!(Request::Open.verb(), "open");
        assert_eq!(Request::Resume(3).verb(), "resume");
        assert_eq!(
            Request::Post {
                name: "a".to_string(),
                content: "b".to_string()
            }
            .verb(),
            "post"
        );
    }
}
