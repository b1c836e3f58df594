//! Observer: block feed, detection feeds and trackers wired together
//!
//! For every new block number the observer fetches the block, hands its
//! transactions to the native feed, scans its transfer logs, adds whatever
//! was detected to the matching tracker and finally advances both trackers
//! to that block. Each step runs under the retry policy; a step whose
//! retries run out is reported on the error channel and skipped.

use crate::address;
use crate::block_feed::BlockFeed;
use crate::chain::ChainClient;
use crate::config::ObserverConfig;
use crate::error::{ObserverError, Operation};
use crate::retry::{Backoff, RetryPolicy};
use crate::tracker::{ConfirmationTracker, Notification, Stage, DEFAULT_FINALIZED_CAPACITY};
use crate::transfer_feed::{TransferFeed, TransferRecord};
use crate::tx_feed::{TransactionRef, TxFeed};
use crate::types::Block;
use crate::watchlist::WatchList;
use alloy_primitives::U160;
use anyhow::Result;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// What a handler subscribes to: an item kind and a lifecycle stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionKind {
    Transaction(Stage),
    Transfer(Stage),
}

impl SubscriptionKind {
    pub const ALL: [SubscriptionKind; 6] = [
        SubscriptionKind::Transaction(Stage::Pending),
        SubscriptionKind::Transaction(Stage::Confirmation),
        SubscriptionKind::Transaction(Stage::Success),
        SubscriptionKind::Transfer(Stage::Pending),
        SubscriptionKind::Transfer(Stage::Confirmation),
        SubscriptionKind::Transfer(Stage::Success),
    ];

    pub fn stage(&self) -> Stage {
        match self {
            SubscriptionKind::Transaction(stage) | SubscriptionKind::Transfer(stage) => *stage,
        }
    }
}

impl fmt::Display for SubscriptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionKind::Transaction(stage) => write!(f, "{}", stage),
            SubscriptionKind::Transfer(stage) => write!(f, "transfer-{}", stage),
        }
    }
}

impl FromStr for SubscriptionKind {
    type Err = ObserverError;

    /// Accepts `pending`, `confirmation`, `success` and their `transfer-`
    /// prefixed forms.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || ObserverError::UnknownSubscription(s.to_string());
        match s.strip_prefix("transfer-") {
            Some(stage) => stage
                .parse()
                .map(SubscriptionKind::Transfer)
                .map_err(|_| unknown()),
            None => s
                .parse()
                .map(SubscriptionKind::Transaction)
                .map_err(|_| unknown()),
        }
    }
}

/// Notification delivered to observer-level handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObserverEvent {
    Transaction(Notification<TransactionRef>),
    Transfer(Notification<TransferRecord>),
}

impl ObserverEvent {
    pub fn kind(&self) -> SubscriptionKind {
        match self {
            ObserverEvent::Transaction(n) => SubscriptionKind::Transaction(n.stage()),
            ObserverEvent::Transfer(n) => SubscriptionKind::Transfer(n.stage()),
        }
    }
}

/// Watches a set of addresses and reports native transactions and token
/// transfers touching them as they gain confirmations.
pub struct Observer {
    chain: Arc<dyn ChainClient>,
    watchlist: WatchList,
    retry: RetryPolicy,
    block_feed: BlockFeed,
    tx_feed: TxFeed,
    transfer_feed: TransferFeed,
    transactions: mpsc::UnboundedReceiver<TransactionRef>,
    transfers: mpsc::UnboundedReceiver<TransferRecord>,
    eth_tracker: ConfirmationTracker<TransactionRef>,
    erc20_tracker: ConfirmationTracker<TransferRecord>,
    error_tx: mpsc::UnboundedSender<ObserverError>,
    error_rx: Option<mpsc::UnboundedReceiver<ObserverError>>,
}

impl Observer {
    pub fn new(chain: Arc<dyn ChainClient>, config: ObserverConfig) -> Self {
        let config = config.normalized();
        let watchlist = WatchList::new();

        let block_feed = BlockFeed::new(
            chain.clone(),
            config.poll_interval(),
            config.blocks_cache_size,
        );
        let (tx_feed, transactions) = TxFeed::new(watchlist.reader());
        let (transfer_feed, transfers) =
            TransferFeed::new(chain.clone(), watchlist.reader(), config.erc20.cache_size);

        let eth_tracker = ConfirmationTracker::new(
            "eth",
            chain.clone(),
            config.confirmations_required,
            DEFAULT_FINALIZED_CAPACITY,
        );
        let erc20_tracker = ConfirmationTracker::new(
            "erc20",
            chain.clone(),
            config.erc20.confirmations_required,
            DEFAULT_FINALIZED_CAPACITY,
        );

        let (error_tx, error_rx) = mpsc::unbounded_channel();

        Self {
            chain,
            watchlist,
            retry: config.retry,
            block_feed,
            tx_feed,
            transfer_feed,
            transactions,
            transfers,
            eth_tracker,
            erc20_tracker,
            error_tx,
            error_rx: Some(error_rx),
        }
    }

    /// Handle to the watched address set. Changes apply from the next block.
    pub fn watchlist(&self) -> WatchList {
        self.watchlist.clone()
    }

    /// Register a handler. Handlers of one kind run in registration order.
    pub fn subscribe<F>(&mut self, kind: SubscriptionKind, handler: F)
    where
        F: Fn(&ObserverEvent) + Send + Sync + 'static,
    {
        match kind {
            SubscriptionKind::Transaction(stage) => {
                self.eth_tracker.subscribe(stage, move |n| {
                    handler(&ObserverEvent::Transaction(n.clone()))
                });
            }
            SubscriptionKind::Transfer(stage) => {
                self.erc20_tracker.subscribe(stage, move |n| {
                    handler(&ObserverEvent::Transfer(n.clone()))
                });
            }
        }
    }

    /// Register a handler by kind name, e.g. `"transfer-success"`.
    pub fn subscribe_named<F>(&mut self, kind: &str, handler: F) -> Result<(), ObserverError>
    where
        F: Fn(&ObserverEvent) + Send + Sync + 'static,
    {
        let kind: SubscriptionKind = kind.parse()?;
        self.subscribe(kind, handler);
        Ok(())
    }

    /// Receiver for operations that gave up. Can be taken once.
    pub fn errors(&mut self) -> Option<mpsc::UnboundedReceiver<ObserverError>> {
        self.error_rx.take()
    }

    pub fn to_big_int(address: &str) -> Result<U160> {
        address::to_big_int(address)
    }

    pub fn to_address(value: U160) -> String {
        address::to_address(value)
    }

    pub fn transaction_tracker(&self) -> &ConfirmationTracker<TransactionRef> {
        &self.eth_tracker
    }

    pub fn transfer_tracker(&self) -> &ConfirmationTracker<TransferRecord> {
        &self.erc20_tracker
    }

    /// Follow the chain head forever, processing each new block in order.
    pub async fn run(&mut self) {
        info!("Observer started, watching {} addresses", self.watchlist.len());
        loop {
            let number = self.block_feed.next_block().await;
            self.process_block(number).await;
        }
    }

    /// Process one block: detect, track, then advance both trackers.
    pub async fn process_block(&mut self, number: u64) {
        debug!("Processing block {}", number);

        if let Some(block) = self.fetch_block(number).await {
            let matched = self.tx_feed.add(block.number, &block.transactions);
            if matched > 0 {
                info!("Block {}: {} watched transactions", number, matched);
            }
        }

        let mut backoff = self.retry.start();
        loop {
            match self.transfer_feed.scan(number).await {
                Ok(found) => {
                    if found > 0 {
                        info!("Block {}: {} watched transfers", number, found);
                    }
                    break;
                }
                Err(e) => {
                    if !self.should_retry(&mut backoff, Operation::ScanTransfers(number), &e).await {
                        break;
                    }
                }
            }
        }

        while let Ok(tx) = self.transactions.try_recv() {
            self.track_transaction(tx).await;
        }
        while let Ok(transfer) = self.transfers.try_recv() {
            self.track_transfer(transfer).await;
        }

        self.advance_trackers(number).await;
    }

    async fn fetch_block(&self, number: u64) -> Option<Block> {
        let mut backoff = self.retry.start();
        loop {
            match self.chain.get_block(number).await {
                Ok(block) => return Some(block),
                Err(e) => {
                    if !self.should_retry(&mut backoff, Operation::FetchBlock(number), &e).await {
                        return None;
                    }
                }
            }
        }
    }

    async fn track_transaction(&mut self, tx: TransactionRef) {
        let mut backoff = self.retry.start();
        loop {
            match self.eth_tracker.add(tx.clone()).await {
                Ok(_) => return,
                Err(e) => {
                    let operation = Operation::AddTransaction(tx.hash);
                    if !self.should_retry(&mut backoff, operation, &e).await {
                        return;
                    }
                }
            }
        }
    }

    async fn track_transfer(&mut self, transfer: TransferRecord) {
        let mut backoff = self.retry.start();
        loop {
            match self.erc20_tracker.add(transfer.clone()).await {
                Ok(_) => return,
                Err(e) => {
                    let operation = Operation::AddTransfer(transfer.tx_hash, transfer.log_index);
                    if !self.should_retry(&mut backoff, operation, &e).await {
                        return;
                    }
                }
            }
        }
    }

    /// Both trackers see every block, even when the other one fails. A
    /// repeated `process` call never re-emits, so retrying the pair after a
    /// partial failure is safe.
    async fn advance_trackers(&mut self, number: u64) {
        let mut backoff = self.retry.start();
        loop {
            let eth = self.eth_tracker.process(number).await;
            let erc20 = self.erc20_tracker.process(number).await;
            match eth.and(erc20) {
                Ok(()) => return,
                Err(e) => {
                    if !self.should_retry(&mut backoff, Operation::AdvanceTrackers(number), &e).await {
                        return;
                    }
                }
            }
        }
    }

    /// Record a failed attempt. Sleeps and returns true if the operation
    /// should run again; otherwise reports it on the error channel.
    async fn should_retry(
        &self,
        backoff: &mut Backoff,
        operation: Operation,
        err: &anyhow::Error,
    ) -> bool {
        match backoff.next_delay() {
            Some(delay) => {
                warn!(
                    "Failed to {} (attempt {}), retrying in {:?}: {:#}",
                    operation,
                    backoff.failures(),
                    delay,
                    err
                );
                tokio::time::sleep(delay).await;
                true
            }
            None => {
                let attempts = backoff.failures();
                error!("Giving up on {} after {} attempts: {:#}", operation, attempts, err);
                let report = ObserverError::RetriesExhausted {
                    operation,
                    attempts,
                    message: format!("{:#}", err),
                };
                if self.error_tx.send(report).is_err() {
                    debug!("Error receiver dropped");
                }
                false
            }
        }
    }
}
