//! JSON-RPC client for Ethereum nodes
//!
//! Provides a typed interface to Ethereum JSON-RPC endpoints and implements
//! [`ChainClient`] on top of it.

use crate::chain::{ChainClient, LogFilter};
use crate::types::{Block, Log};
use alloy_primitives::B256;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

/// JSON-RPC client for Ethereum nodes.
pub struct RpcClient {
    client: reqwest::Client,
    url: String,
}

impl RpcClient {
    /// Create a new RPC client.
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }

    /// Make a JSON-RPC call.
    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params
        });

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("Failed to send {} request", method))?;

        let json: Value = response
            .json()
            .await
            .with_context(|| format!("Failed to parse {} response", method))?;

        // Check for RPC error
        if let Some(error) = json.get("error") {
            anyhow::bail!("RPC error from {}: {}", method, error);
        }

        json.get("result")
            .cloned()
            .with_context(|| format!("{} response missing 'result' field", method))
    }

    /// Get a block by number.
    ///
    /// `full_tx` should be true to get full transaction objects.
    pub async fn get_block_by_number(&self, number: u64, full_tx: bool) -> Result<Block> {
        let params = json!([block_tag(number), full_tx]);
        let result = self.call("eth_getBlockByNumber", params).await?;
        if result.is_null() {
            anyhow::bail!("Block {} not available on node", number);
        }
        serde_json::from_value(result)
            .with_context(|| format!("Failed to deserialize block {}", number))
    }
}

#[async_trait]
impl ChainClient for RpcClient {
    async fn block_number(&self) -> Result<u64> {
        let result = self.call("eth_blockNumber", json!([])).await?;
        parse_quantity(&result).context("Failed to parse block number")
    }

    async fn get_block(&self, number: u64) -> Result<Block> {
        self.get_block_by_number(number, true).await
    }

    async fn transaction_block(&self, hash: B256) -> Result<Option<u64>> {
        let params = json!([hex_word(&hash)]);
        let result = self.call("eth_getTransactionByHash", params).await?;

        // Unknown transaction and pending transaction both have no block yet
        match result.get("blockNumber") {
            None | Some(Value::Null) => Ok(None),
            Some(number) => parse_quantity(number)
                .map(Some)
                .with_context(|| format!("Failed to parse blockNumber of {:?}", hash)),
        }
    }

    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<Log>> {
        let params = json!([filter_params(filter)]);
        let result = self.call("eth_getLogs", params).await?;
        serde_json::from_value(result).context("Failed to deserialize logs")
    }
}

fn block_tag(number: u64) -> String {
    format!("0x{:x}", number)
}

fn hex_word(word: &B256) -> String {
    format!("0x{}", hex::encode(word))
}

/// Parse a hex quantity such as `"0x1b4"`.
fn parse_quantity(value: &Value) -> Result<u64> {
    let s = value.as_str().context("Quantity is not a string")?;
    let s = s.strip_prefix("0x").unwrap_or(s);
    if s.is_empty() {
        anyhow::bail!("Quantity is empty");
    }
    u64::from_str_radix(s, 16).with_context(|| format!("Invalid hex quantity: {}", s))
}

fn filter_params(filter: &LogFilter) -> Value {
    let topics: Vec<Value> = filter
        .topics
        .iter()
        .map(|slot| match slot {
            None => Value::Null,
            Some(options) => Value::Array(
                options
                    .iter()
                    .map(|topic| Value::String(hex_word(topic)))
                    .collect(),
            ),
        })
        .collect();

    json!({
        "fromBlock": block_tag(filter.from_block),
        "toBlock": block_tag(filter.to_block),
        "topics": topics,
    })
}
