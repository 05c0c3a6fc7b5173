//! Error types for the indexing clients
//!
//! One enum covers the whole failure taxonomy: transient transport failures
//! surfaced after retry exhaustion, caller precondition violations, typed
//! not-found outcomes, and invariant violations that abort an update cycle.

use alloy_primitives::Address;
use thiserror::Error;

/// Errors produced by the hub/spoke clients and the range query engine.
#[derive(Debug, Error)]
pub enum ClientError {
    /// A client that has been updated can never go back to not-updated.
    #[error("invalid state transition: client cannot revert to not-updated")]
    InvalidStateTransition,

    /// An explicit search window had its bounds inverted.
    #[error("invalid search window: from {from} > to {to}")]
    InvalidSearchWindow { from: u64, to: u64 },

    /// A lookback of zero was explicitly supplied to the range engine.
    /// Pagination is disabled by omitting the lookback, not by zeroing it.
    #[error("invalid lookback: explicit lookback must be positive")]
    InvalidLookback,

    /// A sub-range query failed after exhausting its retry budget.
    /// No partial results are returned for the cycle.
    #[error("range query over [{from}, {to}] failed after {attempts} attempts: {source}")]
    RangeQueryFailure {
        from: u64,
        to: u64,
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },

    /// Spoke `update()` was called while its hub client is not yet updated.
    #[error("dependency not ready: hub client must be updated first")]
    DependencyNotReady,

    /// No token route entry exists at or before the queried block.
    #[error("no route mapping for token {token} on chain {chain_id} at block {block}")]
    MappingNotFound {
        token: Address,
        chain_id: u64,
        block: u64,
    },

    /// No protocol config entry exists at or before the queried block.
    #[error("no protocol config at block {block}")]
    ConfigNotFound { block: u64 },

    /// `find_deposit` narrowed its search to a range that does not contain
    /// the deposit-creation event.
    #[error("deposit {deposit_id} not found in blocks [{from}, {to}]")]
    DepositNotFound {
        deposit_id: u64,
        from: u64,
        to: u64,
    },

    /// An update was asked to refresh an event name this client does not know.
    #[error("unknown event requested: {0}")]
    UnknownEvent(String),

    /// The chain head moved backward between updates.
    #[error("chain head {head} is behind previously searched height {searched}")]
    StaleChainHead { head: u64, searched: u64 },

    /// Failure in a collaborator oracle (chain head, deposit counter,
    /// block-time or utilization lookup).
    #[error("oracle call failed: {0}")]
    Oracle(#[source] anyhow::Error),

    /// A raw event could not be decoded into its typed record.
    #[error("event decode failed: {0}")]
    Decode(String),
}

/// Convenience alias used throughout the clients.
pub type Result<T> = std::result::Result<T, ClientError>;
