//! eth-address-observer - confirmation tracking for watched Ethereum addresses
//!
//! This library follows the chain head, detects native transactions and
//! ERC20 transfers touching a set of watched addresses, and notifies
//! subscribers as each one moves from pending through confirmations to
//! success.

pub mod address;
pub mod block_feed;
pub mod cache;
pub mod chain;
pub mod config;
pub mod error;
pub mod observer;
pub mod retry;
pub mod rpc;
pub mod tracker;
pub mod transfer_feed;
pub mod tx_feed;
pub mod types;
pub mod watchlist;

#[cfg(test)]
mod test_utils;

// Re-export the main types for convenience
pub use chain::{ChainClient, LogFilter};
pub use config::{load_watchlist, ObserverConfig};
pub use error::{ObserverError, Operation};
pub use observer::{Observer, ObserverEvent, SubscriptionKind};
pub use retry::RetryPolicy;
pub use rpc::RpcClient;
pub use tracker::{Notification, Stage};
pub use transfer_feed::TransferRecord;
pub use tx_feed::TransactionRef;
pub use watchlist::WatchList;
