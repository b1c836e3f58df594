//! Watched address set
//!
//! `WatchList` is the owning handle: the caller adds and removes addresses,
//! possibly while the observer is running. Feeds hold a `WatchListReader`
//! over the same set and can only query it.

use alloy_primitives::Address;
use dashmap::DashSet;
use std::sync::Arc;

/// Owning handle to the watched address set.
#[derive(Debug, Clone, Default)]
pub struct WatchList {
    addresses: Arc<DashSet<Address>>,
}

impl WatchList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a watch list from an initial set of addresses.
    pub fn from_addresses(addresses: impl IntoIterator<Item = Address>) -> Self {
        let list = Self::new();
        list.extend(addresses);
        list
    }

    /// Returns true if the address was not already watched.
    pub fn add(&self, address: Address) -> bool {
        self.addresses.insert(address)
    }

    pub fn extend(&self, addresses: impl IntoIterator<Item = Address>) {
        for address in addresses {
            self.addresses.insert(address);
        }
    }

    /// Returns true if the address was watched.
    pub fn remove(&self, address: &Address) -> bool {
        self.addresses.remove(address).is_some()
    }

    /// Read-only view for feeds.
    pub fn reader(&self) -> WatchListReader {
        WatchListReader {
            addresses: Arc::clone(&self.addresses),
        }
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.addresses.contains(address)
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}

/// Read-only view of a [`WatchList`].
#[derive(Debug, Clone)]
pub struct WatchListReader {
    addresses: Arc<DashSet<Address>>,
}

impl WatchListReader {
    pub fn contains(&self, address: &Address) -> bool {
        self.addresses.contains(address)
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    /// Point-in-time copy of the watched addresses, sorted.
    pub fn snapshot(&self) -> Vec<Address> {
        let mut addresses: Vec<Address> = self.addresses.iter().map(|a| *a).collect();
        addresses.sort();
        addresses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    #[test]
    fn test_reader_sees_updates() {
        let list = WatchList::new();
        let reader = list.reader();
        let addr = address!("0000000000000000000000000000000000000001");

        assert!(!reader.contains(&addr));
        assert!(list.add(addr));
        assert!(!list.add(addr));
        assert!(reader.contains(&addr));

        assert!(list.remove(&addr));
        assert!(!reader.contains(&addr));
        assert!(reader.is_empty());
    }

    #[test]
    fn test_snapshot_sorted() {
        let a = address!("0000000000000000000000000000000000000002");
        let b = address!("0000000000000000000000000000000000000001");
        let list = WatchList::from_addresses([a, b]);

        assert_eq!(list.len(), 2);
        assert_eq!(list.reader().snapshot(), vec![b, a]);
    }
}
