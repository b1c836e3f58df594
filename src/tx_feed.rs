//! Native transaction detection
//!
//! Scans a block's transactions and emits a reference to each one whose
//! sender or recipient is watched.

use crate::tracker::TrackedItem;
use crate::types::Transaction;
use crate::watchlist::WatchListReader;
use alloy_primitives::B256;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// A detected native transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRef {
    pub hash: B256,
    /// Inclusion block, known when detected from a block body
    pub block_number: Option<u64>,
}

impl TrackedItem for TransactionRef {
    type Key = B256;

    fn key(&self) -> B256 {
        self.hash
    }

    fn tx_hash(&self) -> B256 {
        self.hash
    }

    fn inclusion_block(&self) -> Option<u64> {
        self.block_number
    }
}

/// Emits transactions touching the watch list.
pub struct TxFeed {
    watchlist: WatchListReader,
    sender: mpsc::UnboundedSender<TransactionRef>,
}

impl TxFeed {
    pub fn new(watchlist: WatchListReader) -> (Self, mpsc::UnboundedReceiver<TransactionRef>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { watchlist, sender }, receiver)
    }

    /// Scan the transactions of block `block_number` and emit the relevant
    /// ones. Returns how many matched.
    pub fn add(&self, block_number: u64, transactions: &[Transaction]) -> usize {
        if self.watchlist.is_empty() {
            return 0;
        }

        let mut matched = 0;
        for tx in transactions {
            if !tx.touches(|address| self.watchlist.contains(address)) {
                continue;
            }

            debug!(
                "Found relevant TX {:?}: from={:?}, to={:?}, value={}",
                tx.hash, tx.from, tx.to, tx.value
            );
            matched += 1;

            let detected = TransactionRef {
                hash: tx.hash,
                block_number: Some(block_number),
            };
            if self.sender.send(detected).is_err() {
                warn!("Transaction receiver dropped, discarding {:?}", tx.hash);
            }
        }
        matched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{addr, hash, transaction};
    use crate::watchlist::WatchList;

    #[test]
    fn test_emits_sender_and_recipient_matches() {
        let watchlist = WatchList::from_addresses([addr(1)]);
        let (feed, mut rx) = TxFeed::new(watchlist.reader());

        let txs = vec![
            transaction(0x10, addr(1), Some(addr(9)), 100),
            transaction(0x11, addr(8), Some(addr(1)), 100),
            transaction(0x12, addr(8), Some(addr(9)), 100),
            transaction(0x13, addr(8), None, 100),
        ];

        assert_eq!(feed.add(100, &txs), 2);
        assert_eq!(rx.try_recv().unwrap().hash, hash(0x10));
        let second = rx.try_recv().unwrap();
        assert_eq!(second.hash, hash(0x11));
        assert_eq!(second.block_number, Some(100));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_inclusion_block_comes_from_scanned_block() {
        let watchlist = WatchList::from_addresses([addr(1)]);
        let (feed, mut rx) = TxFeed::new(watchlist.reader());

        let mut tx = transaction(0x10, addr(1), None, 0);
        tx.block_number = None;

        assert_eq!(feed.add(42, &[tx]), 1);
        assert_eq!(rx.try_recv().unwrap().block_number, Some(42));
    }

    #[test]
    fn test_empty_watchlist_emits_nothing() {
        let watchlist = WatchList::new();
        let (feed, mut rx) = TxFeed::new(watchlist.reader());

        let txs = vec![transaction(0x10, addr(1), Some(addr(2)), 1)];
        assert_eq!(feed.add(1, &txs), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_watchlist_changes_apply_to_next_scan() {
        let watchlist = WatchList::new();
        let (feed, mut rx) = TxFeed::new(watchlist.reader());
        let txs = vec![transaction(0x10, addr(3), Some(addr(4)), 1)];

        assert_eq!(feed.add(1, &txs), 0);
        watchlist.add(addr(4));
        assert_eq!(feed.add(1, &txs), 1);
        assert_eq!(rx.try_recv().unwrap().hash, hash(0x10));
    }
}
