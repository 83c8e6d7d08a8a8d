//! Error types for dynamic-dl
//!
//! The taxonomy mirrors how failures are handled during a crawl:
//! - [`TransportError`]: transient fetch failures (HTTP status, network, timeout,
//!   API error codes). Retryable, recorded in the retry ledger.
//! - [`PersistenceError`]: disk failures while writing artifacts or state files.
//!   Fails the current item, which is then recorded in the retry ledger.
//! - [`Error::MalformedItem`]: an item missing its identifier or timestamp.
//!   Skipped, never retried.
//!
//! The date-threshold stop is not an error. It is a normal
//! termination signal, see [`crate::types::ProcessOutcome::EndOfWalk`].

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for dynamic-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for dynamic-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "session.cookie")
        key: Option<String>,
    },

    /// Remote feed source failure
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Writing artifacts or state to disk failed
    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// Item lacks a required field (identifier or timestamp)
    #[error("malformed item: {0}")]
    MalformedItem(String),

    /// I/O error outside of artifact persistence (e.g. reading a config file)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build a configuration error for a specific key
    pub fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }
}

/// Failures talking to the remote feed source
#[derive(Debug, Error)]
pub enum TransportError {
    /// Server answered with a non-success HTTP status
    #[error("HTTP {status} from {url}")]
    Http {
        /// The HTTP status code
        status: u16,
        /// The requested URL
        url: String,
    },

    /// Connection failure, reset, DNS error, etc.
    #[error("network error for {url}: {cause}")]
    Network {
        /// The requested URL
        url: String,
        /// Underlying cause as reported by the HTTP client
        cause: String,
    },

    /// Request exceeded the configured timeout
    #[error("request to {url} timed out")]
    Timeout {
        /// The requested URL
        url: String,
    },

    /// The API answered 200 but reported an application-level error code
    #[error("API error {code}: {message}")]
    Api {
        /// The non-zero `code` field of the response envelope
        code: i64,
        /// The `message` field of the response envelope
        message: String,
    },

    /// Response body could not be decoded
    #[error("failed to decode response from {url}: {reason}")]
    Decode {
        /// The requested URL
        url: String,
        /// Why decoding failed
        reason: String,
    },
}

impl TransportError {
    /// Map a reqwest error for `url` into the transport taxonomy
    pub fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return TransportError::Timeout {
                url: url.to_string(),
            };
        }
        if let Some(status) = err.status() {
            return TransportError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            };
        }
        if err.is_decode() {
            return TransportError::Decode {
                url: url.to_string(),
                reason: err.to_string(),
            };
        }
        TransportError::Network {
            url: url.to_string(),
            cause: err.to_string(),
        }
    }
}

/// Disk failures while persisting items or crawl state
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Creating a directory failed
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        /// The directory that could not be created
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Writing a file failed
    #[error("failed to write {path}: {source}")]
    Write {
        /// The file that could not be written
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Reading a state file failed
    #[error("failed to read {path}: {source}")]
    Read {
        /// The file that could not be read
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Removing a file that blocks a directory name failed
    #[error("failed to remove {path}: {source}")]
    Remove {
        /// The path that could not be removed
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// A state file contains a line that is not valid for its format
    #[error("corrupt state file {path} at line {line}: {content:?}")]
    CorruptState {
        /// The state file
        path: PathBuf,
        /// 1-based line number
        line: usize,
        /// The offending line
        content: String,
    },
}
