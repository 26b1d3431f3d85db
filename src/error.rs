//! Cache Error Taxonomy
//!
//! Every fallible operation in the library returns [`CacheError`]. The enum is
//! `Clone` because a collapsed remote fetch hands the very same error to every
//! waiter that joined the flight.
//!
//! A missing key is not an error: reads return `Option` and only transport or
//! protocol failures surface here.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Write refused before reaching the log (not leader, empty key or value).
    #[error("write rejected: {0}")]
    WriteRejected(String),

    #[error("consensus submission timed out after {0:?}")]
    ConsensusTimeout(Duration),

    #[error("consensus error: {0}")]
    Consensus(String),

    #[error("network error: {0}")]
    Network(String),

    /// A committed log entry could not be interpreted. Fatal for the node.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl CacheError {
    /// Returns true for errors after which the node must not keep serving.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CacheError::ProtocolViolation(_))
    }
}

impl From<reqwest::Error> for CacheError {
    fn from(e: reqwest::Error) -> Self {
        CacheError::Network(e.to_string())
    }
}

impl From<bincode::Error> for CacheError {
    fn from(e: bincode::Error) -> Self {
        CacheError::Codec(e.to_string())
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::Codec(e.to_string())
    }
}

impl From<std::io::Error> for CacheError {
    fn from(e: std::io::Error) -> Self {
        CacheError::Persistence(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
