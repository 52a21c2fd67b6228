//! Incremental Request Parser
//!
//! This module parses the line-oriented session-document protocol out of a
//! raw byte buffer. TCP is a stream protocol, so a read may deliver half a
//! command, or several commands at once; the parser therefore works
//! incrementally and reports how many bytes it consumed.
//!
//! ## How the parser works
//!
//! The parser reads from a buffer and returns either:
//! - `Ok(Some((request, consumed)))` - a complete request, `consumed` bytes used
//! - `Ok(None)` - the buffered data is incomplete, read more and retry
//! - `Err(ParseError)` - the client sent something that is not protocol
//!
//! Verb lines are terminated by `\n` (a trailing `\r` is stripped, so
//! `\r\n` works too). A `post` payload is framed by its declared byte
//! count, never by a delimiter, so document content may contain newlines.
//! Blank lines between commands are skipped; this keeps clients in protocol
//! when they terminate a post payload with a newline of their own.

use crate::protocol::types::Request;
use thiserror::Error;

/// Maximum size of a single document payload (16 MB).
pub const MAX_DOCUMENT_SIZE: usize = 16 * 1024 * 1024;

/// Maximum length of a single verb line.
/// Verb lines carry at most a name and a length, so this is generous.
pub const MAX_LINE_SIZE: usize = 4096;

/// Errors that can occur while parsing a request.
///
/// Every variant is a protocol violation: the connection handler replies
/// `error` once and tears the connection down.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The verb is not one of open/resume/close/get/post
    #[error("unknown verb: {0}")]
    UnknownVerb(String),

    /// The verb line has the wrong number of arguments
    #[error("malformed {0} command")]
    MalformedCommand(&'static str),

    /// The resume argument is not a valid session identifier
    #[error("invalid session id: {0}")]
    InvalidSessionId(String),

    /// The post length argument is not a valid byte count
    #[error("invalid content length: {0}")]
    InvalidLength(String),

    /// The declared payload size exceeds the limit
    #[error("document too large: {size} bytes (max: {max})")]
    DocumentTooLarge { size: usize, max: usize },

    /// A verb line grew past [`MAX_LINE_SIZE`] without a terminator
    #[error("verb line too long")]
    LineTooLong,

    /// The payload is not valid UTF-8 text
    #[error("invalid UTF-8 in document content: {0}")]
    InvalidUtf8(String),
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// An incremental parser for client requests.
///
/// # Example
///
/// ```
/// use sessdoc::protocol::{Request, RequestParser};
///
/// let mut parser = RequestParser::new();
/// let buf = b"get report\n";
///
/// let (request, consumed) = parser.parse(buf).unwrap().unwrap();
/// assert_eq!(request, Request::Get("report".to_string()));
/// assert_eq!(consumed, 11);
/// ```
#[derive(Debug, Default)]
pub struct RequestParser;

impl RequestParser {
    /// Creates a new parser instance.
    pub fn new() -> Self {
        Self
    }

    /// Attempts to parse one request from the buffer.
    ///
    /// # Returns
    ///
    /// - `Ok(Some((request, consumed)))` - a complete request was parsed
    /// - `Ok(None)` - incomplete data, need more bytes
    /// - `Err(e)` - protocol violation
    pub fn parse(&mut self, buf: &[u8]) -> ParseResult<Option<(Request, usize)>> {
        let mut consumed = 0;

        // Skip blank lines between commands.
        let line = loop {
            let rest = &buf[consumed..];
            let line_end = match find_newline(rest) {
                Some(pos) => pos,
                None => {
                    if rest.len() > MAX_LINE_SIZE {
                        return Err(ParseError::LineTooLong);
                    }
                    return Ok(None);
                }
            };

            let line = strip_cr(&rest[..line_end]);
            consumed += line_end + 1;

            if !line.is_empty() {
                break line;
            }
        };

        if line.len() > MAX_LINE_SIZE {
            return Err(ParseError::LineTooLong);
        }

        // Verb lines are ASCII; anything else cannot match a known verb.
        let line = std::str::from_utf8(line)
            .map_err(|_| ParseError::UnknownVerb("<non-utf8>".to_string()))?;

        let parts: Vec<&str> = line.split_whitespace().collect();

        match parts.as_slice() {
            ["open"] => Ok(Some((Request::Open, consumed))),

            ["resume", id] => {
                let id: u64 = id
                    .parse()
                    .map_err(|_| ParseError::InvalidSessionId(id.to_string()))?;
                Ok(Some((Request::Resume(id), consumed)))
            }

            ["close"] => Ok(Some((Request::Close, consumed))),

            ["get", name] => Ok(Some((Request::Get(name.to_string()), consumed))),

            ["post", name, len] => {
                let len: usize = len
                    .parse()
                    .map_err(|_| ParseError::InvalidLength(len.to_string()))?;

                if len > MAX_DOCUMENT_SIZE {
                    return Err(ParseError::DocumentTooLarge {
                        size: len,
                        max: MAX_DOCUMENT_SIZE,
                    });
                }

                // The payload starts right after the verb line's newline.
                if buf.len() < consumed + len {
                    return Ok(None); // Incomplete
                }

                let content = std::str::from_utf8(&buf[consumed..consumed + len])
                    .map_err(|e| ParseError::InvalidUtf8(e.to_string()))?
                    .to_string();

                Ok(Some((
                    Request::Post {
                        name: name.to_string(),
                        content,
                    },
                    consumed + len,
                )))
            }

            ["open", ..] => Err(ParseError::MalformedCommand("open")),
            ["resume", ..] => Err(ParseError::MalformedCommand("resume")),
            ["close", ..] => Err(ParseError::MalformedCommand("close")),
            ["get", ..] => Err(ParseError::MalformedCommand("get")),
            ["post", ..] => Err(ParseError::MalformedCommand("post")),

            [verb, ..] => Err(ParseError::UnknownVerb(verb.to_string())),

            // Unreachable: blank lines were skipped above.
            [] => Err(ParseError::UnknownVerb(String::new())),
        }
    }
}

/// Finds the position of the first `\n` in the buffer.
#[inline]
fn find_newline(buf: &[u8]) -> Option<usize> {
    buf.iter().position(|&b| b == b'\n')
}

/// Strips a trailing `\r` so `\r\n`-terminated lines parse the same way.
#[inline]
fn strip_cr(line: &[u8]) -> &[u8] {
    match line.last() {
        Some(b'\r') => &line[..line.len() - 1],
        _ => line,
    }
}

/// Parses a single request from bytes.
///
/// This is a convenience function for simple use cases.
pub fn parse_request(buf: &[u8]) -> ParseResult<Option<(Request, usize)>> {
    RequestParser::new().parse(buf)
}
