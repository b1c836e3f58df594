//! Confirmation tracking
//!
//! A `ConfirmationTracker` follows detected items (native transactions or
//! token transfers) from detection until they are buried under
//! `confirmations_required` blocks, notifying subscribers at each step:
//!
//! - `pending` once, when the item is first added
//! - `confirmation` whenever a processed block raises its confirmation count
//! - `success` once, when the count reaches the threshold
//!
//! The chain is assumed to only grow: there is no rollback for items whose
//! block is later orphaned, and confirmation counts never decrease.

use crate::cache::SeenCache;
use crate::chain::ChainClient;
use alloy_primitives::B256;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::Hash;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Default threshold separating `confirmation` from `success`.
pub const DEFAULT_CONFIRMATIONS_REQUIRED: u64 = 12;

/// How many finalized keys a tracker remembers.
pub const DEFAULT_FINALIZED_CAPACITY: usize = 1024;

/// Something a tracker can follow.
pub trait TrackedItem: Clone + fmt::Debug + Send + Sync + 'static {
    /// Identity used for deduplication.
    type Key: Ord + Hash + Clone + fmt::Debug + Send + Sync;

    fn key(&self) -> Self::Key;

    /// Hash of the transaction that carries the item.
    fn tx_hash(&self) -> B256;

    /// Inclusion block, if the detector already knows it.
    fn inclusion_block(&self) -> Option<u64>;
}

/// Notification stage a handler subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Pending,
    Confirmation,
    Success,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Pending, Stage::Confirmation, Stage::Success];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Pending => "pending",
            Stage::Confirmation => "confirmation",
            Stage::Success => "success",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Stage::Pending),
            "confirmation" => Ok(Stage::Confirmation),
            "success" => Ok(Stage::Success),
            other => anyhow::bail!("unknown stage: {}", other),
        }
    }
}

/// Lifecycle event delivered to handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification<T> {
    Pending(T),
    Confirmation { item: T, confirmations: u64 },
    Success(T),
}

impl<T> Notification<T> {
    pub fn stage(&self) -> Stage {
        match self {
            Notification::Pending(_) => Stage::Pending,
            Notification::Confirmation { .. } => Stage::Confirmation,
            Notification::Success(_) => Stage::Success,
        }
    }

    pub fn item(&self) -> &T {
        match self {
            Notification::Pending(item)
            | Notification::Confirmation { item, .. }
            | Notification::Success(item) => item,
        }
    }
}

pub type Handler<T> = Arc<dyn Fn(&Notification<T>) + Send + Sync>;

/// Where an entry is in its lifecycle. Finalized entries are dropped, so
/// there is no success variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Added, no block at or above its inclusion block processed yet
    Pending,
    /// At least one confirmation, below the threshold
    Confirming,
}

/// Per-item tracking state.
#[derive(Debug, Clone)]
pub struct TrackedEntry<T> {
    pub item: T,
    /// Unknown until the transaction is mined
    pub inclusion_block: Option<u64>,
    pub confirmations: u64,
    pub lifecycle: Lifecycle,
}

/// Confirmations of an item included in `inclusion` when the head is `head`.
pub fn confirmations_at(head: u64, inclusion: u64) -> u64 {
    if head >= inclusion {
        head - inclusion + 1
    } else {
        0
    }
}

/// Handlers registered per stage, in registration order.
struct Subscribers<T> {
    pending: Vec<Handler<T>>,
    confirmation: Vec<Handler<T>>,
    success: Vec<Handler<T>>,
}

impl<T> Default for Subscribers<T> {
    fn default() -> Self {
        Self {
            pending: Vec::new(),
            confirmation: Vec::new(),
            success: Vec::new(),
        }
    }
}

impl<T> Subscribers<T> {
    fn for_stage(&self, stage: Stage) -> &[Handler<T>] {
        match stage {
            Stage::Pending => &self.pending,
            Stage::Confirmation => &self.confirmation,
            Stage::Success => &self.success,
        }
    }

    fn for_stage_mut(&mut self, stage: Stage) -> &mut Vec<Handler<T>> {
        match stage {
            Stage::Pending => &mut self.pending,
            Stage::Confirmation => &mut self.confirmation,
            Stage::Success => &mut self.success,
        }
    }
}

/// Generic confirmation engine. One instance per item kind.
pub struct ConfirmationTracker<T: TrackedItem> {
    name: &'static str,
    chain: Arc<dyn ChainClient>,
    confirmations_required: u64,
    entries: BTreeMap<T::Key, TrackedEntry<T>>,
    finalized: SeenCache<T::Key>,
    head: Option<u64>,
    subscribers: Subscribers<T>,
}

impl<T: TrackedItem> ConfirmationTracker<T> {
    /// Create a tracker.
    ///
    /// `name` prefixes log lines. `finalized_capacity` bounds how many
    /// finalized keys are remembered to keep `add` idempotent after success.
    pub fn new(
        name: &'static str,
        chain: Arc<dyn ChainClient>,
        confirmations_required: u64,
        finalized_capacity: usize,
    ) -> Self {
        Self {
            name,
            chain,
            confirmations_required: confirmations_required.max(1),
            entries: BTreeMap::new(),
            finalized: SeenCache::new(finalized_capacity),
            head: None,
            subscribers: Subscribers::default(),
        }
    }

    /// Register a handler for a stage. Handlers run in registration order.
    pub fn subscribe<F>(&mut self, stage: Stage, handler: F)
    where
        F: Fn(&Notification<T>) + Send + Sync + 'static,
    {
        self.subscribers.for_stage_mut(stage).push(Arc::new(handler));
    }

    /// Start tracking an item and emit `pending`.
    ///
    /// Returns false without notifying if the item is already tracked or was
    /// recently finalized. Fails only if the inclusion block had to be
    /// looked up and the lookup failed.
    pub async fn add(&mut self, item: T) -> Result<bool> {
        let key = item.key();
        if self.entries.contains_key(&key) || self.finalized.is_seen(&key) {
            debug!("{}: {:?} already tracked", self.name, key);
            return Ok(false);
        }

        let inclusion_block = match item.inclusion_block() {
            Some(block) => Some(block),
            None => self
                .chain
                .transaction_block(item.tx_hash())
                .await
                .with_context(|| {
                    format!("Failed to resolve inclusion block of {:?}", item.tx_hash())
                })?,
        };

        info!(
            "{}: tracking {:?} (inclusion block {:?})",
            self.name, key, inclusion_block
        );

        self.entries.insert(
            key,
            TrackedEntry {
                item: item.clone(),
                inclusion_block,
                confirmations: 0,
                lifecycle: Lifecycle::Pending,
            },
        );
        self.notify(&Notification::Pending(item));
        Ok(true)
    }

    /// Advance every tracked item to `block_number` and emit due notifications.
    ///
    /// Entries whose inclusion block cannot be looked up stay where they
    /// are while the rest advance; the first lookup error is returned after
    /// all due notifications were delivered. A number at or below one
    /// already processed changes nothing, so repeating a call after a
    /// failure never re-emits.
    pub async fn process(&mut self, block_number: u64) -> Result<()> {
        let head = self.head.map_or(block_number, |h| h.max(block_number));
        self.head = Some(head);

        let resolution = self.resolve_pending_inclusions().await;

        let required = self.confirmations_required;
        let mut due = Vec::new();
        let mut finished = Vec::new();

        for (key, entry) in self.entries.iter_mut() {
            let Some(inclusion) = entry.inclusion_block else {
                continue;
            };
            let confirmations = confirmations_at(head, inclusion).min(required);
            if confirmations <= entry.confirmations {
                continue;
            }

            entry.confirmations = confirmations;
            entry.lifecycle = Lifecycle::Confirming;
            due.push(Notification::Confirmation {
                item: entry.item.clone(),
                confirmations,
            });

            if confirmations >= required {
                due.push(Notification::Success(entry.item.clone()));
                finished.push(key.clone());
            }
        }

        for key in finished {
            info!("{}: {:?} reached {} confirmations", self.name, key, required);
            self.entries.remove(&key);
            self.finalized.mark_seen(key);
        }

        debug!(
            "{}: processed block {} ({} notifications, {} still tracked)",
            self.name,
            block_number,
            due.len(),
            self.entries.len()
        );

        for notification in &due {
            self.notify(notification);
        }
        resolution
    }

    /// Look up inclusion blocks for entries added before they were mined.
    /// Every entry is tried; the first failure is returned.
    async fn resolve_pending_inclusions(&mut self) -> Result<()> {
        let unresolved: Vec<(T::Key, B256)> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.inclusion_block.is_none())
            .map(|(key, entry)| (key.clone(), entry.item.tx_hash()))
            .collect();

        let mut first_error = None;
        for (key, hash) in unresolved {
            let block = match self.chain.transaction_block(hash).await {
                Ok(block) => block,
                Err(e) => {
                    warn!("{}: failed to resolve inclusion block of {:?}: {:#}", self.name, key, e);
                    if first_error.is_none() {
                        first_error = Some(e.context(format!(
                            "Failed to resolve inclusion block of {:?}",
                            hash
                        )));
                    }
                    continue;
                }
            };
            if let (Some(block), Some(entry)) = (block, self.entries.get_mut(&key)) {
                debug!("{}: {:?} mined in block {}", self.name, key, block);
                entry.inclusion_block = Some(block);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Deliver a notification to every handler of its stage.
    /// A panicking handler is logged and skipped.
    fn notify(&self, notification: &Notification<T>) {
        let stage = notification.stage();
        for handler in self.subscribers.for_stage(stage) {
            let delivered = catch_unwind(AssertUnwindSafe(|| handler(notification)));
            if delivered.is_err() {
                error!(
                    "{}: {} handler panicked on {:?}",
                    self.name,
                    stage,
                    notification.item().key()
                );
            }
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn confirmations_required(&self) -> u64 {
        self.confirmations_required
    }

    /// Highest block number processed so far.
    pub fn head(&self) -> Option<u64> {
        self.head
    }

    pub fn entry(&self, key: &T::Key) -> Option<&TrackedEntry<T>> {
        self.entries.get(key)
    }

    pub fn confirmations(&self, key: &T::Key) -> Option<u64> {
        self.entries.get(key).map(|entry| entry.confirmations)
    }

    pub fn is_finalized(&self, key: &T::Key) -> bool {
        self.finalized.is_seen(key)
    }

    /// Number of items still being tracked.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
