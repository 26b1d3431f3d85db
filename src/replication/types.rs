use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

/// Operation carried by a replicated log entry.
///
/// Wire codes: 0 and 1 both upsert, 2 removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOp {
    Upsert,
    Remove,
}

impl LogOp {
    pub fn code(self) -> u8 {
        match self {
            LogOp::Upsert => 1,
            LogOp::Remove => 2,
        }
    }
}

impl TryFrom<u8> for LogOp {
    type Error = CacheError;

    fn try_from(code: u8) -> Result<Self> {
        match code {
            0 | 1 => Ok(LogOp::Upsert),
            2 => Ok(LogOp::Remove),
            other => Err(CacheError::ProtocolViolation(format!(
                "unknown log opcode {}",
                other
            ))),
        }
    }
}

/// Unit of consensus replication, encoded with bincode.
///
/// The opcode stays a raw byte on the wire so an unknown code is caught when
/// the entry is applied rather than when it is decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub op: u8,
    pub key: String,
    pub value: Vec<u8>,
}

impl LogEntry {
    pub fn new(op: LogOp, key: &str, value: &[u8]) -> Self {
        Self {
            op: op.code(),
            key: key.to_string(),
            value: value.to_vec(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Undecodable bytes in a committed entry are a protocol violation.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes)
            .map_err(|e| CacheError::ProtocolViolation(format!("undecodable log entry: {}", e)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeRole {
    Follower,
    Leader,
}
