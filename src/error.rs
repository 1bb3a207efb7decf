//! Error types for embedcss-worker.

use thiserror::Error;

/// Main error type for all worker operations.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// I/O error on the stdio transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error while parsing compile options.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Failed to decode a binary value or packet.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Protocol violation (oversized frame, response to an unknown id, etc.).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The writer task is gone; the transport is unusable.
    #[error("channel closed")]
    ChannelClosed,
}

/// Errors produced by the binary value codec.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// The buffer ended before the value did.
    #[error("truncated input")]
    Truncated,

    /// A type tag outside the closed set.
    #[error("unknown type tag: {0}")]
    UnknownTag(u8),

    /// String bytes were not valid UTF-8.
    #[error("invalid UTF-8 in string")]
    InvalidUtf8,

    /// Bytes left over after the packet value was fully decoded.
    #[error("trailing bytes after packet")]
    TrailingBytes,
}

/// Error returned by command handlers; its message travels back to the host
/// inside an `{Error: true, Msg: ...}` response.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct CommandError {
    message: String,
}

impl CommandError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<serde_json::Error> for CommandError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(err.to_string())
    }
}

/// Result type alias using WorkerError.
pub type Result<T> = std::result::Result<T, WorkerError>;
