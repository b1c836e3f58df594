//! Chain head polling
//!
//! Polls the head block number and yields every block number after the last
//! one yielded, in increasing order and at most once. The first poll yields
//! only the current head. When the head has moved further than the catch-up
//! window since the last poll, the oldest numbers are skipped.

use crate::chain::ChainClient;
use anyhow::{Context, Result};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default catch-up window.
pub const DEFAULT_BLOCKS_CACHE_SIZE: usize = 64;

pub struct BlockFeed {
    chain: Arc<dyn ChainClient>,
    poll_interval: Duration,
    window: usize,
    last: Option<u64>,
    queue: VecDeque<u64>,
}

impl BlockFeed {
    pub fn new(chain: Arc<dyn ChainClient>, poll_interval: Duration, blocks_cache_size: usize) -> Self {
        Self {
            chain,
            poll_interval,
            window: blocks_cache_size.max(1),
            last: None,
            queue: VecDeque::new(),
        }
    }

    /// Read the head once and queue any new block numbers.
    /// Returns how many were queued.
    pub async fn poll(&mut self) -> Result<usize> {
        let head = self
            .chain
            .block_number()
            .await
            .context("Failed to get latest block number")?;

        let from = match self.last {
            None => head,
            Some(last) if head <= last => {
                debug!("Up to date. Last block: {}, head: {}", last, head);
                return Ok(0);
            }
            Some(last) => last + 1,
        };

        let window = self.window as u64;
        let from = if head - from + 1 > window {
            let start = head - window + 1;
            warn!(
                "Fell behind the chain head: skipping blocks {} to {}",
                from,
                start - 1
            );
            start
        } else {
            from
        };

        if from < head {
            info!("New blocks available: {} to {}", from, head);
        }
        self.queue.extend(from..=head);
        self.last = Some(head);
        Ok((head - from + 1) as usize)
    }

    /// Wait for the next block number, polling as needed.
    ///
    /// Poll failures are logged and retried after the poll interval.
    pub async fn next_block(&mut self) -> u64 {
        loop {
            if let Some(number) = self.queue.pop_front() {
                return number;
            }
            match self.poll().await {
                Ok(0) => {}
                Ok(_) => continue,
                Err(e) => warn!("Block poll failed: {:#}", e),
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Highest block number queued so far.
    pub fn last(&self) -> Option<u64> {
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockChainClient;

    fn feed(chain: &Arc<MockChainClient>, window: usize) -> BlockFeed {
        BlockFeed::new(chain.clone(), Duration::from_millis(1), window)
    }

    async fn take(feed: &mut BlockFeed, n: usize) -> Vec<u64> {
        let mut out = Vec::new();
        for _ in 0..n {
            out.push(feed.next_block().await);
        }
        out
    }

    #[tokio::test]
    async fn test_first_poll_yields_head_only() {
        let chain = Arc::new(MockChainClient::new());
        chain.set_head(100);
        let mut feed = feed(&chain, 8);

        assert_eq!(feed.next_block().await, 100);
        assert_eq!(feed.last(), Some(100));
    }

    #[tokio::test]
    async fn test_yields_gap_in_order() {
        let chain = Arc::new(MockChainClient::new());
        chain.set_head(100);
        let mut feed = feed(&chain, 8);
        feed.next_block().await;

        chain.set_head(103);
        assert_eq!(take(&mut feed, 3).await, vec![101, 102, 103]);

        // Head going backwards yields nothing
        chain.set_head(101);
        assert_eq!(feed.poll().await.unwrap(), 0);

        chain.set_head(104);
        assert_eq!(feed.next_block().await, 104);
        assert_eq!(feed.last(), Some(104));
    }

    #[tokio::test]
    async fn test_window_limits_catch_up() {
        let chain = Arc::new(MockChainClient::new());
        chain.set_head(10);
        let mut feed = feed(&chain, 3);
        feed.next_block().await;

        chain.set_head(20);
        assert_eq!(feed.poll().await.unwrap(), 3);
        assert_eq!(take(&mut feed, 3).await, vec![18, 19, 20]);
    }

    #[tokio::test]
    async fn test_poll_failure_is_retried() {
        let chain = Arc::new(MockChainClient::new());
        chain.set_head(7);
        chain.fail_head(2);
        let mut feed = feed(&chain, 8);

        assert!(feed.poll().await.is_err());
        assert_eq!(feed.next_block().await, 7);
    }
}
