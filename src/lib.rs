//! Relayscope - event-sourced bridge state reconstruction
//!
//! This library indexes hub and spoke bridge contract events into an
//! in-memory, queryable view of cross-chain bridge state: deposits matched
//! to fills, token route and rate-model history, and the append-only
//! bundle/refund logs. Reconstruction is deterministic: the same on-chain
//! history yields the same state regardless of how the range queries are
//! chunked or replayed.

pub mod cache;
pub mod config;
pub mod error;
pub mod event;
pub mod hub;
pub mod lifecycle;
pub mod lpfee;
pub mod pagination;
pub mod relay;
pub mod rpc;
pub mod source;
pub mod spoke;
pub mod types;

#[cfg(test)]
pub(crate) mod testutil;

// Re-export the main types for convenience
pub use error::ClientError;
pub use hub::{HubClient, LpFeeQuote};
pub use spoke::{SpokeClient, UnfilledAmount};
pub use types::{Deposit, DepositKey, Fill, SlowFillRequest, SpeedUp};
