//! Error types for the Engram library.
//!
//! Every fallible library operation returns [`Result`]. The variants are the
//! stable error kinds surfaced to callers; the MCP facade flattens them into
//! single-line messages and never propagates stack traces to the assistant.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngramError>;

#[derive(Error, Debug)]
pub enum EngramError {
    /// A required key (master key, vault key) is absent.
    #[error("not initialized: {0}")]
    NotInitialized(String),

    /// AES-GCM tag verification or RSA-OAEP unwrap failed.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Malformed envelope, frontmatter, or recovery share.
    #[error("malformed input: {0}")]
    Format(String),

    /// Sync event payload did not match its stored checksum.
    #[error("checksum mismatch for {0}")]
    ChecksumMismatch(String),

    /// Vector length differs from the configured index dimension.
    #[error("vector dimension mismatch: got {got}, expected {expected}")]
    VectorDimMismatch { got: usize, expected: usize },

    /// Database constraint or I/O failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Non-2xx response or transport failure from the remote.
    #[error("network error: {0}")]
    Network(String),

    /// Missing blind-index key, vault key, or sync configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Insufficient or invalid recovery shares.
    #[error("recovery failed: {0}")]
    Recovery(String),
}

impl From<rusqlite::Error> for EngramError {
    fn from(e: rusqlite::Error) -> Self {
        EngramError::Storage(e.to_string())
    }
}

impl From<std::io::Error> for EngramError {
    fn from(e: std::io::Error) -> Self {
        EngramError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for EngramError {
    fn from(e: serde_json::Error) -> Self {
        EngramError::Format(e.to_string())
    }
}

impl From<reqwest::Error> for EngramError {
    fn from(e: reqwest::Error) -> Self {
        EngramError::Network(e.to_string())
    }
}
