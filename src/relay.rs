//! Deposit/fill correspondence
//!
//! The fixed comparison key set tying a fill (or slow-fill request) back to
//! its deposit, the content hash over that key set, and the speed-up
//! overlay rules. Everything here is pure; the spoke client calls in at
//! query time, never caching a verdict.

use crate::types::{Deposit, Fill, SlowFillRequest, SpeedUp};
use alloy_primitives::{keccak256, Address, B256, U256};

/// The relay data shared verbatim between a deposit and any fill that
/// satisfies it. Equality over this struct *is* fill validity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayData {
    pub deposit_id: u64,
    pub origin_chain_id: u64,
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
    /// LP fee pct; `None` on a deposit whose hub backfill has not landed
    pub realized_lp_fee_pct: Option<U256>,
}

impl From<&Deposit> for RelayData {
    fn from(d: &Deposit) -> Self {
        RelayData {
            deposit_id: d.deposit_id,
            origin_chain_id: d.origin_chain_id,
            depositor: d.depositor,
            recipient: d.recipient,
            input_token: d.input_token,
            output_token: d.output_token,
            input_amount: d.input_amount,
            output_amount: d.output_amount,
            fill_deadline: d.fill_deadline,
            exclusivity_deadline: d.exclusivity_deadline,
            exclusive_relayer: d.exclusive_relayer,
            message_hash: d.message_hash(),
            realized_lp_fee_pct: d.realized_lp_fee_pct,
        }
    }
}

impl From<&Fill> for RelayData {
    fn from(f: &Fill) -> Self {
        RelayData {
            deposit_id: f.deposit_id,
            origin_chain_id: f.origin_chain_id,
            depositor: f.depositor,
            recipient: f.recipient,
            input_token: f.input_token,
            output_token: f.output_token,
            input_amount: f.input_amount,
            output_amount: f.output_amount,
            fill_deadline: f.fill_deadline,
            exclusivity_deadline: f.exclusivity_deadline,
            exclusive_relayer: f.exclusive_relayer,
            message_hash: f.message_hash,
            realized_lp_fee_pct: Some(f.realized_lp_fee_pct),
        }
    }
}

impl From<&SlowFillRequest> for RelayData {
    fn from(r: &SlowFillRequest) -> Self {
        RelayData {
            deposit_id: r.deposit_id,
            origin_chain_id: r.origin_chain_id,
            depositor: r.depositor,
            recipient: r.recipient,
            input_token: r.input_token,
            output_token: r.output_token,
            input_amount: r.input_amount,
            output_amount: r.output_amount,
            fill_deadline: r.fill_deadline,
            exclusivity_deadline: r.exclusivity_deadline,
            exclusive_relayer: r.exclusive_relayer,
            message_hash: r.message_hash,
            realized_lp_fee_pct: Some(r.realized_lp_fee_pct),
        }
    }
}

/// Content hash identifying a relay on a destination chain.
///
/// Fixed-width big-endian encoding of every comparison field, then keccak.
/// Used as the slow-fill request key.
pub fn relay_data_hash(relay: &RelayData, destination_chain_id: u64) -> B256 {
    let mut buf = Vec::with_capacity(256);
    buf.extend_from_slice(&relay.deposit_id.to_be_bytes());
    buf.extend_from_slice(&relay.origin_chain_id.to_be_bytes());
    buf.extend_from_slice(relay.depositor.as_slice());
    buf.extend_from_slice(relay.recipient.as_slice());
    buf.extend_from_slice(relay.input_token.as_slice());
    buf.extend_from_slice(relay.output_token.as_slice());
    buf.extend_from_slice(&relay.input_amount.to_be_bytes::<32>());
    buf.extend_from_slice(&relay.output_amount.to_be_bytes::<32>());
    buf.extend_from_slice(&relay.fill_deadline.to_be_bytes());
    buf.extend_from_slice(&relay.exclusivity_deadline.to_be_bytes());
    buf.extend_from_slice(relay.exclusive_relayer.as_slice());
    buf.extend_from_slice(relay.message_hash.as_slice());
    buf.extend_from_slice(
        &relay
            .realized_lp_fee_pct
            .unwrap_or(U256::ZERO)
            .to_be_bytes::<32>(),
    );
    buf.extend_from_slice(&destination_chain_id.to_be_bytes());
    keccak256(&buf)
}

/// Field-exact fill validity check.
///
/// True iff every field in the comparison key set matches between fill and
/// deposit, including the destination chain and the fee the relayer
/// claimed. A deposit whose fee backfill has not happened yet cannot
/// validate any fill. Checked every time, never cached as trusted.
pub fn validate_fill_for_deposit(fill: &Fill, deposit: &Deposit) -> bool {
    if fill.destination_chain_id != deposit.destination_chain_id {
        return false;
    }
    RelayData::from(fill) == RelayData::from(deposit)
}

/// The authoritative speed-up among all recorded for a deposit key: the one
/// with the lowest `updated_output_amount`. Provenance order breaks ties so
/// the choice is independent of processing order.
pub fn find_best_speed_up<'a>(speed_ups: &'a [SpeedUp]) -> Option<&'a SpeedUp> {
    speed_ups
        .iter()
        .min_by_key(|s| (s.updated_output_amount, s.meta))
}

/// Apply the authoritative speed-up to a deposit, if strictly improving.
///
/// Returns a new deposit value; the input is never mutated. A depositor
/// only ever tightens terms, so only a strictly lower output amount than
/// the deposit's current effective amount is applied.
pub fn append_max_speed_up_signature_to_deposit(
    deposit: &Deposit,
    speed_ups: &[SpeedUp],
) -> Deposit {
    let mut updated = deposit.clone();
    let Some(best) = find_best_speed_up(speed_ups) else {
        return updated;
    };
    if best.updated_output_amount >= deposit.effective_output_amount() {
        return updated;
    }
    updated.updated_output_amount = Some(best.updated_output_amount);
    updated.updated_recipient = Some(best.updated_recipient);
    updated.updated_message = Some(best.updated_message.clone());
    updated.speed_up_signature = Some(best.depositor_signature.clone());
    updated
}
