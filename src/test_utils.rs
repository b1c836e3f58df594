//! Test helpers: a scripted in-memory chain and fixture builders.

use crate::chain::{ChainClient, LogFilter};
use crate::transfer_feed::TRANSFER_TOPIC;
use crate::types::{Block, Log, Transaction};
use alloy_primitives::{Address, B256, U256};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// In-memory chain. Failures are scripted per key: `fail_block(100, 2)`
/// makes the next two fetches of block 100 fail.
#[derive(Default)]
pub struct MockChainClient {
    head: AtomicU64,
    blocks: Mutex<HashMap<u64, Block>>,
    logs: Mutex<HashMap<u64, Vec<Log>>>,
    tx_blocks: Mutex<HashMap<B256, u64>>,
    head_failures: Mutex<u32>,
    block_failures: Mutex<HashMap<u64, u32>>,
    log_failures: Mutex<HashMap<u64, u32>>,
    tx_failures: Mutex<HashMap<B256, u32>>,
    block_fetches: Mutex<HashMap<u64, u32>>,
}

fn take_failure<K: Hash + Eq>(failures: &Mutex<HashMap<K, u32>>, key: &K) -> bool {
    let mut failures = failures.lock().unwrap();
    match failures.get_mut(key) {
        Some(remaining) if *remaining > 0 => {
            *remaining -= 1;
            true
        }
        _ => false,
    }
}

impl MockChainClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_head(&self, number: u64) {
        self.head.store(number, Ordering::SeqCst);
    }

    /// Store a block and record the inclusion block of its transactions.
    pub fn add_block(&self, block: Block) {
        let mut tx_blocks = self.tx_blocks.lock().unwrap();
        for tx in &block.transactions {
            tx_blocks.insert(tx.hash, block.number);
        }
        self.blocks.lock().unwrap().insert(block.number, block);
    }

    pub fn add_logs(&self, block: u64, logs: Vec<Log>) {
        self.logs.lock().unwrap().entry(block).or_default().extend(logs);
    }

    pub fn set_transaction_block(&self, hash: B256, block: u64) {
        self.tx_blocks.lock().unwrap().insert(hash, block);
    }

    pub fn fail_head(&self, times: u32) {
        *self.head_failures.lock().unwrap() = times;
    }

    pub fn fail_block(&self, number: u64, times: u32) {
        self.block_failures.lock().unwrap().insert(number, times);
    }

    pub fn fail_logs(&self, number: u64, times: u32) {
        self.log_failures.lock().unwrap().insert(number, times);
    }

    pub fn fail_transaction(&self, hash: B256, times: u32) {
        self.tx_failures.lock().unwrap().insert(hash, times);
    }

    /// How many times `get_block(number)` was called.
    pub fn block_fetches(&self, number: u64) -> u32 {
        self.block_fetches
            .lock()
            .unwrap()
            .get(&number)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn block_number(&self) -> Result<u64> {
        {
            let mut failures = self.head_failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                anyhow::bail!("head unavailable");
            }
        }
        Ok(self.head.load(Ordering::SeqCst))
    }

    async fn get_block(&self, number: u64) -> Result<Block> {
        *self
            .block_fetches
            .lock()
            .unwrap()
            .entry(number)
            .or_default() += 1;
        if take_failure(&self.block_failures, &number) {
            anyhow::bail!("connection reset fetching block {}", number);
        }
        let blocks = self.blocks.lock().unwrap();
        match blocks.get(&number) {
            Some(block) => Ok(block.clone()),
            // Unknown blocks are served empty so tests only script what they need
            None => Ok(block(number, Vec::new())),
        }
    }

    async fn transaction_block(&self, hash: B256) -> Result<Option<u64>> {
        if take_failure(&self.tx_failures, &hash) {
            anyhow::bail!("timeout looking up {:?}", hash);
        }
        Ok(self.tx_blocks.lock().unwrap().get(&hash).copied())
    }

    /// Returns every log in the range; topic filtering is left to the caller.
    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<Log>> {
        for number in filter.from_block..=filter.to_block {
            if take_failure(&self.log_failures, &number) {
                anyhow::bail!("log query failed for block {}", number);
            }
        }
        let logs = self.logs.lock().unwrap();
        Ok((filter.from_block..=filter.to_block)
            .filter_map(|number| logs.get(&number))
            .flatten()
            .cloned()
            .collect())
    }
}

pub fn addr(byte: u8) -> Address {
    Address::with_last_byte(byte)
}

pub fn hash(byte: u8) -> B256 {
    B256::with_last_byte(byte)
}

pub fn transaction(hash_byte: u8, from: Address, to: Option<Address>, block: u64) -> Transaction {
    Transaction {
        hash: hash(hash_byte),
        from,
        to,
        value: U256::from(1_000u64),
        block_number: Some(block),
    }
}

pub fn block(number: u64, transactions: Vec<Transaction>) -> Block {
    Block {
        number,
        hash: B256::from(U256::from(number)),
        transactions,
    }
}

pub fn transfer_log(
    token: Address,
    from: Address,
    to: Address,
    value: u64,
    tx_hash: B256,
    log_index: u64,
    block: u64,
) -> Log {
    Log {
        address: token,
        topics: vec![TRANSFER_TOPIC, from.into_word(), to.into_word()],
        data: U256::from(value).to_be_bytes_vec(),
        block_number: Some(block),
        transaction_hash: Some(tx_hash),
        log_index: Some(log_index),
        removed: false,
    }
}
