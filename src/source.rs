//! Collaborator interfaces consumed by the clients
//!
//! The transport/provider layer lives behind these traits. Implementations
//! issue the actual chain queries (`rpc.rs` in this crate); the clients only
//! depend on the contracts below, which keeps their state machines testable
//! against in-memory mocks.

use crate::event::{EventKind, RawEvent};
use alloy_primitives::{Address, U256};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// What to query logs for: one event type emitted by one contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventFilter {
    pub kind: EventKind,
    pub address: Address,
}

/// Source of raw chain logs.
///
/// Must support arbitrary disjoint range queries. Returned events carry no
/// ordering guarantee; callers sort.
#[async_trait]
pub trait LogSource: Send + Sync {
    async fn query_logs(&self, filter: &EventFilter, from: u64, to: u64) -> Result<Vec<RawEvent>>;
}

/// Current chain head height.
#[async_trait]
pub trait HeadOracle: Send + Sync {
    async fn current_height(&self) -> Result<u64>;
}

/// Number of deposits the spoke contract had recorded as of a height.
///
/// Monotonically non-decreasing in height; drives the binary-search
/// narrowing in `find_deposit`.
#[async_trait]
pub trait DepositCounterOracle: Send + Sync {
    async fn deposit_count_at_height(&self, height: u64) -> Result<u64>;
}

/// Translation from timestamps to hub-chain blocks.
#[async_trait]
pub trait BlockTimeOracle: Send + Sync {
    /// The greatest block whose timestamp is ≤ `timestamp`.
    async fn block_at_or_before_timestamp(&self, timestamp: u64) -> Result<u64>;
}

/// Pool utilization readings used for realized LP fee computation.
#[async_trait]
pub trait UtilizationOracle: Send + Sync {
    /// Utilization of the `l1_token` pool at `block`, and the utilization
    /// after additionally committing `amount`. Both wad.
    async fn utilization(
        &self,
        l1_token: Address,
        block: u64,
        amount: U256,
    ) -> Result<(U256, U256)>;
}

/// Everything a hub client needs from its chain.
#[derive(Clone)]
pub struct HubSources {
    pub logs: Arc<dyn LogSource>,
    pub head: Arc<dyn HeadOracle>,
    pub block_time: Arc<dyn BlockTimeOracle>,
    pub utilization: Arc<dyn UtilizationOracle>,
}

/// Everything a spoke client needs from its chain.
#[derive(Clone)]
pub struct SpokeSources {
    pub logs: Arc<dyn LogSource>,
    pub head: Arc<dyn HeadOracle>,
    pub deposit_counter: Arc<dyn DepositCounterOracle>,
}
