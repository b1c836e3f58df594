//! Observer error types
//!
//! Chain plumbing uses `anyhow` throughout. The errors here are the ones the
//! observer hands back to its caller: rejected subscriptions and operations
//! that gave up after the retry policy was exhausted.

use alloy_primitives::B256;
use std::fmt;
use thiserror::Error;

/// An operation the observer retries on failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Fetching a block with full transaction bodies
    FetchBlock(u64),
    /// Scanning a block's logs for token transfers
    ScanTransfers(u64),
    /// Advancing both trackers to a block
    AdvanceTrackers(u64),
    /// Adding a detected native transaction to its tracker
    AddTransaction(B256),
    /// Adding a detected token transfer (tx hash, log index) to its tracker
    AddTransfer(B256, u64),
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::FetchBlock(n) => write!(f, "fetch block {}", n),
            Operation::ScanTransfers(n) => write!(f, "scan transfers in block {}", n),
            Operation::AdvanceTrackers(n) => write!(f, "advance trackers to block {}", n),
            Operation::AddTransaction(hash) => write!(f, "add transaction {:?}", hash),
            Operation::AddTransfer(hash, index) => {
                write!(f, "add transfer {:?}#{}", hash, index)
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum ObserverError {
    #[error("gave up on {operation} after {attempts} attempts: {message}")]
    RetriesExhausted {
        operation: Operation,
        attempts: u32,
        message: String,
    },

    #[error("unknown subscription kind: {0}")]
    UnknownSubscription(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ObserverError::RetriesExhausted {
            operation: Operation::FetchBlock(100),
            attempts: 3,
            message: "connection refused".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "gave up on fetch block 100 after 3 attempts: connection refused"
        );

        let err = ObserverError::UnknownSubscription("transfer-foo".to_string());
        assert_eq!(err.to_string(), "unknown subscription kind: transfer-foo");
    }
}
