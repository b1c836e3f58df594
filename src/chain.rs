//! Chain access interface
//!
//! Everything the observer needs from a node. `RpcClient` implements it over
//! JSON-RPC; tests use a scripted in-memory client.

use crate::types::{Block, Log};
use alloy_primitives::B256;
use anyhow::Result;
use async_trait::async_trait;

/// Log query for a block range.
///
/// `topics[i] = None` matches anything at position i; `Some(list)` matches
/// any of the listed values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilter {
    pub from_block: u64,
    pub to_block: u64,
    pub topics: Vec<Option<Vec<B256>>>,
}

impl LogFilter {
    /// Filter for a single block.
    pub fn block(number: u64) -> Self {
        Self {
            from_block: number,
            to_block: number,
            topics: Vec::new(),
        }
    }

    pub fn with_topics(mut self, topics: Vec<Option<Vec<B256>>>) -> Self {
        self.topics = topics;
        self
    }
}

#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Current head block number.
    async fn block_number(&self) -> Result<u64>;

    /// Block with full transaction bodies. A block the node does not have is
    /// an error, never an empty block.
    async fn get_block(&self, number: u64) -> Result<Block>;

    /// Inclusion block of a transaction, `None` if it is not mined yet.
    async fn transaction_block(&self, hash: B256) -> Result<Option<u64>>;

    /// Logs matching `filter`.
    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<Log>>;
}
