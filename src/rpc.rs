//! JSON-RPC chain sources
//!
//! Implements the collaborator traits over HTTP JSON-RPC: an event-gateway
//! method for normalized logs, standard `eth_` methods for heads, block
//! timestamps and contract calls. Handles hex string parsing and error
//! handling.

use crate::event::{EventKind, RawEvent};
use crate::source::{
    BlockTimeOracle, DepositCounterOracle, EventFilter, HeadOracle, LogSource, UtilizationOracle,
};
use alloy_primitives::{keccak256, Address, B256, U256};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

/// JSON-RPC client for a bridge-indexing endpoint.
///
/// The endpoint speaks standard `eth_` methods plus `bridge_getEvents`,
/// which returns logs with their named arguments already decoded (the
/// ABI layer lives behind the gateway, not in this crate).
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
            .context("Failed to send RPC request")?;

        let json: Value = response
            .json()
            .await
            .context("Failed to parse RPC response")?;

        if let Some(error) = json.get("error") {
            anyhow::bail!("RPC error: {}", error);
        }

        json.get("result")
            .cloned()
            .context("RPC response missing 'result' field")
    }

    /// Get just the block number for a given block tag.
    ///
    /// `tag` can be "finalized", "latest", etc.
    pub async fn get_block_number(&self, tag: &str) -> Result<u64> {
        let params = json!([tag, false]);
        let result = self.call("eth_getBlockByNumber", params).await?;

        let number_str = result
            .get("number")
            .and_then(|v| v.as_str())
            .context("Block missing 'number' field")?;
        parse_hex_u64(number_str).context("Failed to parse block number")
    }

    /// Get the timestamp of a block by number.
    pub async fn get_block_timestamp(&self, block: u64) -> Result<u64> {
        let params = json!([format!("0x{:x}", block), false]);
        let result = self.call("eth_getBlockByNumber", params).await?;

        let ts_str = result
            .get("timestamp")
            .and_then(|v| v.as_str())
            .context("Block missing 'timestamp' field")?;
        parse_hex_u64(ts_str).context("Failed to parse block timestamp")
    }

    /// Read-only contract call at a specific block.
    async fn eth_call(&self, to: Address, data: &[u8], block: u64) -> Result<Vec<u8>> {
        let params = json!([
            { "to": format!("0x{:x}", to), "data": format!("0x{}", hex::encode(data)) },
            format!("0x{:x}", block),
        ]);
        let result = self.call("eth_call", params).await?;

        let out = result.as_str().context("eth_call response is not a string")?;
        let out = out.strip_prefix("0x").unwrap_or(out);
        if out.is_empty() {
            return Ok(Vec::new());
        }
        hex::decode(out).context("Failed to decode eth_call output")
    }

    /// Fetch normalized events over an inclusive block range.
    pub async fn get_events(
        &self,
        address: Address,
        kind: EventKind,
        from: u64,
        to: u64,
    ) -> Result<Vec<RawEvent>> {
        let params = json!([
            format!("0x{:x}", address),
            kind.as_str(),
            format!("0x{:x}", from),
            format!("0x{:x}", to),
        ]);
        let result = self.call("bridge_getEvents", params).await?;

        let entries = result.as_array().context("Event response is not an array")?;
        let mut events = Vec::with_capacity(entries.len());
        for entry in entries {
            events.push(parse_event_entry(entry, address, kind)?);
        }
        Ok(events)
    }
}

/// One event entry from the gateway: named args plus provenance fields,
/// all numbers hex-encoded.
fn parse_event_entry(entry: &Value, address: Address, kind: EventKind) -> Result<RawEvent> {
    let args = entry
        .get("args")
        .and_then(|v| v.as_object())
        .context("Event entry missing 'args' object")?;

    let block_number = entry
        .get("blockNumber")
        .and_then(|v| v.as_str())
        .context("Event entry missing 'blockNumber'")
        .and_then(parse_hex_u64)?;
    let transaction_index = entry
        .get("transactionIndex")
        .and_then(|v| v.as_str())
        .context("Event entry missing 'transactionIndex'")
        .and_then(parse_hex_u64)?;
    let log_index = entry
        .get("logIndex")
        .and_then(|v| v.as_str())
        .context("Event entry missing 'logIndex'")
        .and_then(parse_hex_u64)?;
    let transaction_hash = entry
        .get("transactionHash")
        .and_then(|v| v.as_str())
        .context("Event entry missing 'transactionHash'")
        .and_then(parse_hex_b256)?;

    Ok(RawEvent {
        kind,
        address,
        args: Map::clone(args),
        block_number,
        transaction_index,
        log_index,
        transaction_hash,
    })
}

/// Parse a 0x-prefixed hex string to u64.
fn parse_hex_u64(s: &str) -> Result<u64> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    if s.is_empty() {
        anyhow::bail!("empty hex quantity");
    }
    u64::from_str_radix(s, 16).context("invalid hex quantity")
}

/// Parse a 0x-prefixed hex string to B256.
fn parse_hex_b256(s: &str) -> Result<B256> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(s).context("invalid hex hash")?;
    if bytes.len() != 32 {
        anyhow::bail!("Expected 32 bytes for hash, got {}", bytes.len());
    }
    Ok(B256::from_slice(&bytes))
}

/// All collaborator traits for one chain, over one RPC endpoint and one
/// bridge contract.
pub struct RpcChainSource {
    rpc: RpcClient,
    /// Bridge contract on this chain (spoke, or the hub pool)
    contract: Address,
}

impl RpcChainSource {
    pub fn new(url: String, contract: Address) -> Self {
        Self {
            rpc: RpcClient::new(url),
            contract,
        }
    }

    fn selector(signature: &str) -> [u8; 4] {
        let hash = keccak256(signature.as_bytes());
        [hash[0], hash[1], hash[2], hash[3]]
    }

    fn encode_address(addr: Address) -> [u8; 32] {
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(addr.as_slice());
        word
    }
}

#[async_trait]
impl LogSource for RpcChainSource {
    async fn query_logs(&self, filter: &EventFilter, from: u64, to: u64) -> Result<Vec<RawEvent>> {
        self.rpc
            .get_events(filter.address, filter.kind, from, to)
            .await
    }
}

#[async_trait]
impl HeadOracle for RpcChainSource {
    async fn current_height(&self) -> Result<u64> {
        self.rpc.get_block_number("latest").await
    }
}

#[async_trait]
impl DepositCounterOracle for RpcChainSource {
    async fn deposit_count_at_height(&self, height: u64) -> Result<u64> {
        let data = Self::selector("numberOfDeposits()");
        let out = self.rpc.eth_call(self.contract, &data, height).await?;
        if out.len() < 32 {
            anyhow::bail!("numberOfDeposits returned {} bytes", out.len());
        }
        let count = U256::from_be_slice(&out[..32]);
        u64::try_from(count).context("deposit count out of u64 range")
    }
}

#[async_trait]
impl BlockTimeOracle for RpcChainSource {
    /// Binary search over block timestamps. Timestamps are monotonically
    /// non-decreasing, so the greatest block at or before `timestamp` is
    /// found in log2(head) probes.
    async fn block_at_or_before_timestamp(&self, timestamp: u64) -> Result<u64> {
        let head = self.rpc.get_block_number("latest").await?;
        let mut lo = 0u64;
        let mut hi = head;
        while lo < hi {
            // Bias up so the loop converges onto the *last* block at or
            // before the target.
            let mid = lo + (hi - lo + 1) / 2;
            let ts = self.rpc.get_block_timestamp(mid).await?;
            if ts <= timestamp {
                lo = mid;
            } else {
                hi = mid - 1;
            }
        }
        let ts = self.rpc.get_block_timestamp(lo).await?;
        if ts > timestamp {
            anyhow::bail!("no block at or before timestamp {}", timestamp);
        }
        Ok(lo)
    }
}

#[async_trait]
impl UtilizationOracle for RpcChainSource {
    async fn utilization(
        &self,
        l1_token: Address,
        block: u64,
        amount: U256,
    ) -> Result<(U256, U256)> {
        let mut current = Self::selector("liquidityUtilizationCurrent(address)").to_vec();
        current.extend_from_slice(&Self::encode_address(l1_token));
        let out = self.rpc.eth_call(self.contract, &current, block).await?;
        if out.len() < 32 {
            anyhow::bail!("liquidityUtilizationCurrent returned {} bytes", out.len());
        }
        let before = U256::from_be_slice(&out[..32]);

        let mut post = Self::selector("liquidityUtilizationPostRelay(address,uint256)").to_vec();
        post.extend_from_slice(&Self::encode_address(l1_token));
        post.extend_from_slice(&amount.to_be_bytes::<32>());
        let out = self.rpc.eth_call(self.contract, &post, block).await?;
        if out.len() < 32 {
            anyhow::bail!("liquidityUtilizationPostRelay returned {} bytes", out.len());
        }
        let after = U256::from_be_slice(&out[..32]);

        Ok((before, after))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_u64() {
        assert_eq!(parse_hex_u64("0x10").unwrap(), 16);
        assert_eq!(parse_hex_u64("ff").unwrap(), 255);
        assert!(parse_hex_u64("0x").is_err());
        assert!(parse_hex_u64("0xzz").is_err());
    }

    #[test]
    fn test_selector() {
        // keccak("numberOfDeposits()")[..4], stable contract constant
        let sel = RpcChainSource::selector("numberOfDeposits()");
        assert_eq!(sel.len(), 4);
        assert_eq!(sel, keccak256(b"numberOfDeposits()")[..4]);
    }

    #[test]
    fn test_encode_address_left_pads() {
        let addr = Address::repeat_byte(0xab);
        let word = RpcChainSource::encode_address(addr);
        assert_eq!(&word[..12], &[0u8; 12]);
        assert_eq!(&word[12..], addr.as_slice());
    }

    #[test]
    fn test_parse_event_entry() {
        let entry = json!({
            "args": { "rootBundleId": 3 },
            "blockNumber": "0x64",
            "transactionIndex": "0x2",
            "logIndex": "0x7",
            "transactionHash": "0x1111111111111111111111111111111111111111111111111111111111111111",
        });
        let event =
            parse_event_entry(&entry, Address::ZERO, EventKind::RelayedRootBundle).unwrap();
        assert_eq!(event.block_number, 100);
        assert_eq!(event.transaction_index, 2);
        assert_eq!(event.log_index, 7);
        assert_eq!(event.args["rootBundleId"], json!(3));
    }
}
