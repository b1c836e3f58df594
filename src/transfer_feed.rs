//! ERC20 Transfer event detection
//!
//! Queries a block's `Transfer(address,address,uint256)` logs where a watched
//! address is the sender or the receiver, and emits one `TransferRecord` per
//! log. A bounded cache keyed by (tx hash, log index) keeps a transfer from
//! being emitted twice, including self-transfers that match both queries and
//! scans repeated after a failure.

use crate::cache::SeenCache;
use crate::chain::{ChainClient, LogFilter};
use crate::tracker::TrackedItem;
use crate::types::Log;
use crate::watchlist::WatchListReader;
use alloy_primitives::{Address, B256, U256};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Default number of transfer identities remembered for deduplication.
pub const DEFAULT_TRANSFER_CACHE_SIZE: usize = 512;

/// keccak256("Transfer(address,address,uint256)")
pub const TRANSFER_TOPIC: B256 = B256::new([
    0xdd, 0xf2, 0x52, 0xad, 0x1b, 0xe2, 0xc8, 0x9b, 0x69, 0xc2, 0xb0, 0x68, 0xfc, 0x37, 0x8d,
    0xaa, 0x95, 0x2b, 0xa7, 0xf1, 0x63, 0xc4, 0xa1, 0x16, 0x28, 0xf5, 0x5a, 0x4d, 0xf5, 0x23,
    0xb3, 0xef,
]);

/// A detected token transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRecord {
    /// Token contract that emitted the event
    pub token: Address,
    pub from: Address,
    pub to: Address,
    pub value: U256,
    /// Transaction carrying the event
    pub tx_hash: B256,
    /// Position of the event within its block
    pub log_index: u64,
    pub block_number: Option<u64>,
}

impl TrackedItem for TransferRecord {
    type Key = (B256, u64);

    fn key(&self) -> (B256, u64) {
        (self.tx_hash, self.log_index)
    }

    fn tx_hash(&self) -> B256 {
        self.tx_hash
    }

    fn inclusion_block(&self) -> Option<u64> {
        self.block_number
    }
}

/// Emits token transfers touching the watch list.
pub struct TransferFeed {
    chain: Arc<dyn ChainClient>,
    watchlist: WatchListReader,
    cache: SeenCache<(B256, u64)>,
    sender: mpsc::UnboundedSender<TransferRecord>,
}

impl TransferFeed {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        watchlist: WatchListReader,
        cache_size: usize,
    ) -> (Self, mpsc::UnboundedReceiver<TransferRecord>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let feed = Self {
            chain,
            watchlist,
            cache: SeenCache::new(cache_size),
            sender,
        };
        (feed, receiver)
    }

    /// Scan one block for watched transfers. Returns how many were emitted.
    ///
    /// Safe to repeat: transfers already emitted are skipped.
    pub async fn scan(&mut self, block_number: u64) -> Result<usize> {
        if self.watchlist.is_empty() {
            return Ok(0);
        }

        let watched: Vec<B256> = self
            .watchlist
            .snapshot()
            .iter()
            .map(|address| address.into_word())
            .collect();
        let outgoing = LogFilter::block(block_number)
            .with_topics(vec![Some(vec![TRANSFER_TOPIC]), Some(watched.clone())]);
        let incoming = LogFilter::block(block_number)
            .with_topics(vec![Some(vec![TRANSFER_TOPIC]), None, Some(watched)]);

        let mut emitted = 0;
        for filter in [outgoing, incoming] {
            let logs = self
                .chain
                .get_logs(&filter)
                .await
                .with_context(|| format!("Failed to fetch transfer logs for block {}", block_number))?;

            for log in &logs {
                let Some(record) = self.detect(log) else {
                    continue;
                };
                debug!(
                    "Found transfer {:?}#{} of token {:?}: from={:?}, to={:?}, value={}",
                    record.tx_hash, record.log_index, record.token, record.from, record.to,
                    record.value
                );
                emitted += 1;
                if self.sender.send(record).is_err() {
                    warn!("Transfer receiver dropped");
                }
            }
        }
        Ok(emitted)
    }

    /// Turn a log into a new transfer record, or None if it is not a
    /// watched, not yet emitted ERC20 transfer.
    fn detect(&mut self, log: &Log) -> Option<TransferRecord> {
        if log.removed || !is_transfer_event(log) {
            return None;
        }

        let (from, to, value) = match parse_transfer_log(log) {
            Ok(t) => t,
            Err(e) => {
                warn!("Failed to parse Transfer log: {:?}", e);
                return None;
            }
        };

        if !self.watchlist.contains(&from) && !self.watchlist.contains(&to) {
            return None;
        }

        let (Some(tx_hash), Some(log_index)) = (log.transaction_hash, log.log_index) else {
            warn!("Transfer log of token {:?} has no position, skipping", log.address);
            return None;
        };

        if !self.cache.mark_seen((tx_hash, log_index)) {
            return None;
        }

        Some(TransferRecord {
            token: log.address,
            from,
            to,
            value,
            tx_hash,
            log_index,
            block_number: log.block_number,
        })
    }
}

/// ERC20 transfers carry exactly three topics. ERC721 uses the same
/// signature with the token id as a fourth topic and is not matched.
fn is_transfer_event(log: &Log) -> bool {
    log.topics.len() == 3 && log.topics[0] == TRANSFER_TOPIC
}

/// Parse from, to, value from a Transfer log.
/// topics[1] = from (indexed, padded to 32 bytes), topics[2] = to, data = value
fn parse_transfer_log(log: &Log) -> Result<(Address, Address, U256)> {
    if log.topics.len() < 3 {
        anyhow::bail!("Transfer log has insufficient topics");
    }
    if log.data.len() < 32 {
        anyhow::bail!("Transfer log data too short: {} bytes", log.data.len());
    }
    let from = Address::from_word(log.topics[1]);
    let to = Address::from_word(log.topics[2]);
    let value = U256::from_be_slice(&log.data[0..32]);
    Ok((from, to, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{addr, hash, transfer_log, MockChainClient};
    use crate::watchlist::WatchList;

    fn feed(
        chain: &Arc<MockChainClient>,
        watchlist: &WatchList,
        cache_size: usize,
    ) -> (TransferFeed, mpsc::UnboundedReceiver<TransferRecord>) {
        TransferFeed::new(chain.clone(), watchlist.reader(), cache_size)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<TransferRecord>) -> Vec<TransferRecord> {
        let mut out = Vec::new();
        while let Ok(record) = rx.try_recv() {
            out.push(record);
        }
        out
    }

    #[test]
    fn test_parse_transfer_log() {
        let log = transfer_log(addr(0xaa), addr(1), addr(2), 500, hash(1), 0, 10);
        let (from, to, value) = parse_transfer_log(&log).unwrap();
        assert_eq!(from, addr(1));
        assert_eq!(to, addr(2));
        assert_eq!(value, U256::from(500u64));
        assert!(is_transfer_event(&log));
    }

    #[test]
    fn test_topic_address_padding() {
        let topic: B256 =
            "0x00000000000000000000000070997970c51812dc3a010c7d01b50e0d17dc79c8"
                .parse()
                .unwrap();
        let expected = Address::from_slice(
            &hex::decode("70997970c51812dc3a010c7d01b50e0d17dc79c8").unwrap(),
        );
        assert_eq!(Address::from_word(topic), expected);
        assert_eq!(expected.into_word(), topic);
    }

    #[test]
    fn test_rejects_non_erc20_logs() {
        let mut nft = transfer_log(addr(0xaa), addr(1), addr(2), 0, hash(1), 0, 10);
        nft.topics.push(B256::with_last_byte(7));
        nft.data.clear();
        assert!(!is_transfer_event(&nft));

        let mut short = transfer_log(addr(0xaa), addr(1), addr(2), 1, hash(1), 0, 10);
        short.data.truncate(4);
        assert!(parse_transfer_log(&short).is_err());

        let mut other = transfer_log(addr(0xaa), addr(1), addr(2), 1, hash(1), 0, 10);
        other.topics[0] = B256::with_last_byte(1);
        assert!(!is_transfer_event(&other));
    }

    #[tokio::test]
    async fn test_scan_emits_watched_transfers_once() {
        let chain = Arc::new(MockChainClient::new());
        chain.add_logs(
            10,
            vec![
                transfer_log(addr(0xaa), addr(1), addr(2), 100, hash(1), 0, 10),
                transfer_log(addr(0xaa), addr(3), addr(1), 200, hash(2), 1, 10),
                transfer_log(addr(0xaa), addr(3), addr(4), 300, hash(3), 2, 10),
                // Self-transfer matches both the outgoing and incoming query
                transfer_log(addr(0xbb), addr(1), addr(1), 400, hash(4), 3, 10),
            ],
        );
        let watchlist = WatchList::from_addresses([addr(1)]);
        let (mut feed, mut rx) = feed(&chain, &watchlist, 16);

        assert_eq!(feed.scan(10).await.unwrap(), 3);
        let records = drain(&mut rx);
        let keys: Vec<_> = records.iter().map(|r| r.key()).collect();
        assert_eq!(keys, vec![(hash(1), 0), (hash(2), 1), (hash(4), 3)]);
        assert_eq!(records[1].value, U256::from(200u64));
        assert_eq!(records[1].block_number, Some(10));

        // A repeated scan emits nothing new
        assert_eq!(feed.scan(10).await.unwrap(), 0);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_removed_logs_are_ignored() {
        let chain = Arc::new(MockChainClient::new());
        let mut log = transfer_log(addr(0xaa), addr(1), addr(2), 100, hash(1), 0, 10);
        log.removed = true;
        chain.add_logs(10, vec![log]);
        let watchlist = WatchList::from_addresses([addr(1)]);
        let (mut feed, mut rx) = feed(&chain, &watchlist, 16);

        assert_eq!(feed.scan(10).await.unwrap(), 0);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_scan_failure_propagates_and_retry_resumes() {
        let chain = Arc::new(MockChainClient::new());
        chain.add_logs(
            10,
            vec![transfer_log(addr(0xaa), addr(1), addr(2), 100, hash(1), 0, 10)],
        );
        chain.fail_logs(10, 1);
        let watchlist = WatchList::from_addresses([addr(1)]);
        let (mut feed, mut rx) = feed(&chain, &watchlist, 16);

        assert!(feed.scan(10).await.is_err());
        assert_eq!(feed.scan(10).await.unwrap(), 1);
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[tokio::test]
    async fn test_empty_watchlist_skips_rpc() {
        let chain = Arc::new(MockChainClient::new());
        chain.fail_logs(10, 5);
        let watchlist = WatchList::new();
        let (mut feed, _rx) = feed(&chain, &watchlist, 16);

        assert_eq!(feed.scan(10).await.unwrap(), 0);
    }
}
