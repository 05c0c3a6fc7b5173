//! Domain record types for bridge state
//!
//! Value objects reconstructed from on-chain events: deposits, fills,
//! speed-ups, slow-fill requests and the append-only bundle/refund history.
//! Every record carries its block provenance, which defines the canonical
//! total order all consumers rely on.

use alloy_primitives::{keccak256, Address, B256, U256};
use serde::{Deserialize, Serialize};

/// Block provenance of an on-chain event.
///
/// The tuple `(block_number, transaction_index, log_index)` is the canonical
/// total order over events; `Ord` implements exactly that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventMeta {
    /// Block the event was emitted in
    pub block_number: u64,
    /// Position of the transaction within its block
    pub transaction_index: u64,
    /// Position of the log within its transaction
    pub log_index: u64,
    /// Hash of the emitting transaction
    pub transaction_hash: B256,
}

/// Access to a record's block provenance.
pub trait Provenance {
    fn meta(&self) -> &EventMeta;
}

/// Sort records ascending by the canonical `(block, tx_index, log_index)` order.
pub fn sort_canonical<T: Provenance>(records: &mut [T]) {
    records.sort_by(|a, b| {
        let a = a.meta();
        let b = b.meta();
        (a.block_number, a.transaction_index, a.log_index).cmp(&(
            b.block_number,
            b.transaction_index,
            b.log_index,
        ))
    });
}

/// Identity of a deposit: deposit ids are assigned per origin chain, so the
/// pair is globally unique. Fills sharing this key belong to the same
/// deposit attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DepositKey {
    pub deposit_id: u64,
    pub origin_chain_id: u64,
}

/// Funds locked on an origin chain for release on a destination chain.
///
/// Immutable once recorded, except for the speed-up overlay fields and the
/// one-time backfill of `realized_lp_fee_pct` / `quote_block_number` once
/// hub data is available.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
    /// Chain-scoped monotonically assigned id, origin-chain authoritative
    pub deposit_id: u64,
    pub origin_chain_id: u64,
    pub destination_chain_id: u64,
    pub depositor: Address,
    pub recipient: Address,
    /// Token locked on the origin chain
    pub input_token: Address,
    /// Token to pay out on the destination chain. The on-chain value may be
    /// the zero-address sentinel, resolved through the hub route table.
    pub output_token: Address,
    pub input_amount: U256,
    pub output_amount: U256,
    /// Timestamp whose hub-chain state governs fee/token resolution
    pub quote_timestamp: u64,
    pub fill_deadline: u64,
    pub exclusivity_deadline: u64,
    pub exclusive_relayer: Address,
    /// Opaque payload forwarded to the recipient
    pub message: Vec<u8>,
    pub meta: EventMeta,

    /// LP fee pct (1e18 fixed point), backfilled from hub history
    pub realized_lp_fee_pct: Option<U256>,
    /// Hub-chain block resolved from `quote_timestamp`
    pub quote_block_number: Option<u64>,

    /// Speed-up overlay: present only after a speed-up has been applied
    pub updated_recipient: Option<Address>,
    pub updated_output_amount: Option<U256>,
    pub updated_message: Option<Vec<u8>>,
    pub speed_up_signature: Option<Vec<u8>>,
}

impl Deposit {
    pub fn key(&self) -> DepositKey {
        DepositKey {
            deposit_id: self.deposit_id,
            origin_chain_id: self.origin_chain_id,
        }
    }

    /// Output amount after any applied speed-up.
    pub fn effective_output_amount(&self) -> U256 {
        self.updated_output_amount.unwrap_or(self.output_amount)
    }

    /// Recipient after any applied speed-up.
    pub fn effective_recipient(&self) -> Address {
        self.updated_recipient.unwrap_or(self.recipient)
    }

    /// Keccak hash of the deposit message, compared against fill message hashes.
    pub fn message_hash(&self) -> B256 {
        keccak256(&self.message)
    }
}

impl Provenance for Deposit {
    fn meta(&self) -> &EventMeta {
        &self.meta
    }
}

/// Depositor-signed instruction lowering the minimum acceptable output
/// amount for a specific deposit. Many may exist per `(depositor,
/// deposit_id)`; only the lowest `updated_output_amount` is authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeedUp {
    pub depositor: Address,
    pub deposit_id: u64,
    pub origin_chain_id: u64,
    pub updated_recipient: Address,
    pub updated_output_amount: U256,
    pub updated_message: Vec<u8>,
    pub depositor_signature: Vec<u8>,
    pub meta: EventMeta,
}

impl Provenance for SpeedUp {
    fn meta(&self) -> &EventMeta {
        &self.meta
    }
}

/// How a relay was executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FillType {
    FastFill,
    ReplacedSlowFill,
    SlowFill,
}

/// Execution metadata attached to a fill event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayExecutionInfo {
    pub updated_recipient: Address,
    pub updated_message_hash: B256,
    pub updated_output_amount: U256,
    pub fill_type: FillType,
}

/// Evidence a relayer satisfied a deposit on the destination chain.
///
/// Mirrors the deposit's relay data plus relayer/repayment fields. Never
/// validated at ingestion time; validity against a deposit is checked
/// field-by-field at query time, every time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fill {
    pub deposit_id: u64,
    pub origin_chain_id: u64,
    pub destination_chain_id: u64,
    pub depositor: Address,
    pub recipient: Address,
    pub input_token: Address,
    pub output_token: Address,
    pub input_amount: U256,
    pub output_amount: U256,
    pub fill_deadline: u64,
    pub exclusivity_deadline: u64,
    pub exclusive_relayer: Address,
    /// Keccak hash of the deposit message as claimed by the relayer
    pub message_hash: B256,
    /// LP fee pct claimed by the relayer at fill time
    pub realized_lp_fee_pct: U256,
    pub relayer: Address,
    pub repayment_chain_id: u64,
    pub relay_execution_info: RelayExecutionInfo,
    pub meta: EventMeta,
}

impl Fill {
    pub fn key(&self) -> DepositKey {
        DepositKey {
            deposit_id: self.deposit_id,
            origin_chain_id: self.origin_chain_id,
        }
    }
}

impl Provenance for Fill {
    fn meta(&self) -> &EventMeta {
        &self.meta
    }
}

/// Request to trigger a delayed, partial-repayment fill.
///
/// Keyed by the relay-data hash (content hash over the fill/deposit
/// comparison fields) plus the destination chain id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlowFillRequest {
    pub deposit_id: u64,
    pub origin_chain_id: u64,
    pub destination_chain_id: u64,
    pub depositor: Address,
    pub recipient: Address,
    pub input_token: Address,
    pub output_token: Address,
    pub input_amount: U256,
    pub output_amount: U256,
    pub fill_deadline: u64,
    pub exclusivity_deadline: u64,
    pub exclusive_relayer: Address,
    pub message_hash: B256,
    pub realized_lp_fee_pct: U256,
    pub meta: EventMeta,
}

impl Provenance for SlowFillRequest {
    fn meta(&self) -> &EventMeta {
        &self.meta
    }
}

/// A root bundle relayed from the hub to this spoke. Pure history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootBundleRelay {
    pub root_bundle_id: u64,
    pub relayer_refund_root: B256,
    pub slow_relay_root: B256,
    pub meta: EventMeta,
}

impl Provenance for RootBundleRelay {
    fn meta(&self) -> &EventMeta {
        &self.meta
    }
}

/// Execution of one relayer-refund leaf of a root bundle. Pure history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayerRefundExecution {
    pub amount_to_return: U256,
    pub chain_id: u64,
    pub refund_amounts: Vec<U256>,
    pub root_bundle_id: u64,
    pub leaf_id: u64,
    pub l2_token_address: Address,
    pub refund_addresses: Vec<Address>,
    pub deferred_refunds: bool,
    pub meta: EventMeta,
}

impl Provenance for RelayerRefundExecution {
    fn meta(&self) -> &EventMeta {
        &self.meta
    }
}

/// Tokens returned from a spoke to the hub pool. Pure history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokensBridged {
    pub amount_to_return: U256,
    pub chain_id: u64,
    pub leaf_id: u64,
    pub l2_token_address: Address,
    pub meta: EventMeta,
}

impl Provenance for TokensBridged {
    fn meta(&self) -> &EventMeta {
        &self.meta
    }
}

/// Toggle of a deposit route on a spoke. Only the latest value per
/// `(origin_token, destination_chain_id)` matters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositRouteToggle {
    pub origin_token: Address,
    pub destination_chain_id: u64,
    pub enabled: bool,
    pub meta: EventMeta,
}

impl Provenance for DepositRouteToggle {
    fn meta(&self) -> &EventMeta {
        &self.meta
    }
}

/// A hub route-setting event: as of its block, `l1_token` maps to
/// `destination_token` on `destination_chain_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolRebalanceRoute {
    pub destination_chain_id: u64,
    pub l1_token: Address,
    pub destination_token: Address,
    pub meta: EventMeta,
}

impl Provenance for PoolRebalanceRoute {
    fn meta(&self) -> &EventMeta {
        &self.meta
    }
}

/// Per-route rate model override, keyed by origin/destination chain pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteRateModel {
    pub origin_chain_id: u64,
    pub destination_chain_id: u64,
    pub rate_model: crate::lpfee::RateModel,
}

/// A hub config event: as of its block, `l1_token` is governed by
/// `rate_model`, with optional per-route overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateModelUpdate {
    pub l1_token: Address,
    pub rate_model: crate::lpfee::RateModel,
    pub route_rate_models: Vec<RouteRateModel>,
    /// Timestamp of the block the event was emitted in
    pub block_timestamp: u64,
    pub meta: EventMeta,
}

impl Provenance for RateModelUpdate {
    fn meta(&self) -> &EventMeta {
        &self.meta
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::b256;

    fn meta(block: u64, tx: u64, log: u64) -> EventMeta {
        EventMeta {
            block_number: block,
            transaction_index: tx,
            log_index: log,
            transaction_hash: b256!(
                "0000000000000000000000000000000000000000000000000000000000000000"
            ),
        }
    }

    #[test]
    fn test_canonical_order() {
        let mut bundles = vec![
            RootBundleRelay {
                root_bundle_id: 2,
                relayer_refund_root: B256::ZERO,
                slow_relay_root: B256::ZERO,
                meta: meta(10, 0, 5),
            },
            RootBundleRelay {
                root_bundle_id: 0,
                relayer_refund_root: B256::ZERO,
                slow_relay_root: B256::ZERO,
                meta: meta(9, 3, 1),
            },
            RootBundleRelay {
                root_bundle_id: 1,
                relayer_refund_root: B256::ZERO,
                slow_relay_root: B256::ZERO,
                meta: meta(10, 0, 2),
            },
        ];
        sort_canonical(&mut bundles);
        let ids: Vec<u64> = bundles.iter().map(|b| b.root_bundle_id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_effective_fields_without_speed_up() {
        let deposit = Deposit {
            deposit_id: 1,
            origin_chain_id: 1,
            destination_chain_id: 10,
            depositor: Address::ZERO,
            recipient: Address::repeat_byte(0x11),
            input_token: Address::ZERO,
            output_token: Address::ZERO,
            input_amount: U256::from(100),
            output_amount: U256::from(99),
            quote_timestamp: 0,
            fill_deadline: 0,
            exclusivity_deadline: 0,
            exclusive_relayer: Address::ZERO,
            message: vec![],
            meta: meta(1, 0, 0),
            realized_lp_fee_pct: None,
            quote_block_number: None,
            updated_recipient: None,
            updated_output_amount: None,
            updated_message: None,
            speed_up_signature: None,
        };
        assert_eq!(deposit.effective_output_amount(), U256::from(99));
        assert_eq!(deposit.effective_recipient(), Address::repeat_byte(0x11));
    }
}
