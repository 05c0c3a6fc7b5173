//! In-memory chain mocks and event builders shared by client tests.

use crate::event::{EventKind, RawEvent};
use crate::lpfee::RateModel;
use crate::source::{
    BlockTimeOracle, DepositCounterOracle, EventFilter, HeadOracle, HubSources, LogSource,
    SpokeSources, UtilizationOracle,
};
use crate::types::{Deposit, EventMeta, RouteRateModel};
use alloy_primitives::{Address, B256, U256};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// A scripted chain: push events, set the head, and hand out source
/// bundles. One instance plays one chain.
pub struct MockChain {
    head: AtomicU64,
    events: Mutex<Vec<RawEvent>>,
    block_timestamps: Mutex<BTreeMap<u64, u64>>,
    utilization: Mutex<HashMap<Address, (U256, U256)>>,
}

impl MockChain {
    pub fn new() -> Self {
        Self {
            head: AtomicU64::new(0),
            events: Mutex::new(Vec::new()),
            block_timestamps: Mutex::new(BTreeMap::new()),
            utilization: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_head(&self, head: u64) {
        self.head.store(head, Ordering::SeqCst);
    }

    pub fn push_event(&self, event: RawEvent) {
        self.events.lock().unwrap().push(event);
    }

    pub fn set_block_timestamp(&self, block: u64, timestamp: u64) {
        self.block_timestamps.lock().unwrap().insert(block, timestamp);
    }

    pub fn set_utilization(&self, token: Address, before: U256, after: U256) {
        self.utilization.lock().unwrap().insert(token, (before, after));
    }

    pub fn sources_for_hub(self: &Arc<Self>) -> HubSources {
        HubSources {
            logs: self.clone(),
            head: self.clone(),
            block_time: self.clone(),
            utilization: self.clone(),
        }
    }

    pub fn sources_for_spoke(self: &Arc<Self>) -> SpokeSources {
        SpokeSources {
            logs: self.clone(),
            head: self.clone(),
            deposit_counter: self.clone(),
        }
    }
}

#[async_trait]
impl LogSource for MockChain {
    async fn query_logs(&self, filter: &EventFilter, from: u64, to: u64) -> Result<Vec<RawEvent>> {
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.kind == filter.kind && e.block_number >= from && e.block_number <= to)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl HeadOracle for MockChain {
    async fn current_height(&self) -> Result<u64> {
        Ok(self.head.load(Ordering::SeqCst))
    }
}

#[async_trait]
impl DepositCounterOracle for MockChain {
    async fn deposit_count_at_height(&self, height: u64) -> Result<u64> {
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.kind == EventKind::FundsDeposited && e.block_number <= height)
            .count() as u64)
    }
}

#[async_trait]
impl BlockTimeOracle for MockChain {
    async fn block_at_or_before_timestamp(&self, timestamp: u64) -> Result<u64> {
        Ok(self
            .block_timestamps
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, ts)| **ts <= timestamp)
            .map(|(block, _)| *block)
            .max()
            .unwrap_or(0))
    }
}

#[async_trait]
impl UtilizationOracle for MockChain {
    async fn utilization(
        &self,
        l1_token: Address,
        _block: u64,
        _amount: U256,
    ) -> Result<(U256, U256)> {
        Ok(self
            .utilization
            .lock()
            .unwrap()
            .get(&l1_token)
            .copied()
            .unwrap_or((U256::ZERO, U256::ZERO)))
    }
}

fn raw(kind: EventKind, args: Value, block: u64, log_index: u64) -> RawEvent {
    let Value::Object(args) = args else {
        panic!("event args must be an object");
    };
    RawEvent {
        kind,
        address: Address::ZERO,
        args,
        block_number: block,
        transaction_index: 0,
        log_index,
        transaction_hash: B256::ZERO,
    }
}

pub fn rebalance_route_event(
    l1_token: Address,
    destination_chain_id: u64,
    destination_token: Address,
    block: u64,
    log_index: u64,
) -> RawEvent {
    raw(
        EventKind::SetPoolRebalanceRoute,
        json!({
            "destinationChainId": destination_chain_id,
            "l1Token": format!("{l1_token}"),
            "destinationToken": format!("{destination_token}"),
        }),
        block,
        log_index,
    )
}

pub fn rate_model_event(
    l1_token: Address,
    rate_model: RateModel,
    route_overrides: Vec<((u64, u64), RateModel)>,
    block: u64,
    log_index: u64,
) -> RawEvent {
    let overrides: Vec<RouteRateModel> = route_overrides
        .into_iter()
        .map(|((origin, dest), model)| RouteRateModel {
            origin_chain_id: origin,
            destination_chain_id: dest,
            rate_model: model,
        })
        .collect();
    raw(
        EventKind::UpdatedRateModel,
        json!({
            "l1Token": format!("{l1_token}"),
            "rateModel": serde_json::to_value(rate_model).unwrap(),
            "routeRateModels": serde_json::to_value(overrides).unwrap(),
            "blockTimestamp": block * 12,
        }),
        block,
        log_index,
    )
}

/// A deposit event with fixed depositor/recipient/amounts; the output token
/// defaults to the zero-address sentinel.
pub fn deposit_event(
    deposit_id: u64,
    destination_chain_id: u64,
    input_token: Address,
    output_token: Address,
    quote_timestamp: u64,
    block: u64,
    log_index: u64,
) -> RawEvent {
    raw(
        EventKind::FundsDeposited,
        json!({
            "depositId": deposit_id,
            "destinationChainId": destination_chain_id,
            "depositor": format!("{}", test_depositor()),
            "recipient": format!("{}", test_recipient()),
            "inputToken": format!("{input_token}"),
            "outputToken": format!("{output_token}"),
            "inputAmount": "100",
            "outputAmount": "99",
            "quoteTimestamp": quote_timestamp,
            "fillDeadline": quote_timestamp + 3600,
            "exclusivityDeadline": 0,
            "exclusiveRelayer": format!("{}", Address::ZERO),
            "message": "0x",
        }),
        block,
        log_index,
    )
}

pub fn speed_up_event(
    deposit_id: u64,
    updated_output_amount: u64,
    block: u64,
    log_index: u64,
) -> RawEvent {
    raw(
        EventKind::RequestedSpeedUpDeposit,
        json!({
            "depositId": deposit_id,
            "depositor": format!("{}", test_depositor()),
            "updatedRecipient": format!("{}", test_recipient()),
            "updatedOutputAmount": updated_output_amount.to_string(),
            "updatedMessage": "0x",
            "depositorSignature": "0xaabb",
        }),
        block,
        log_index,
    )
}

/// A fill event matching `deposit` on every compared field.
pub fn fill_event_matching(deposit: &Deposit, block: u64, log_index: u64) -> RawEvent {
    raw(
        EventKind::FilledRelay,
        json!({
            "depositId": deposit.deposit_id,
            "originChainId": deposit.origin_chain_id,
            "depositor": format!("{}", deposit.depositor),
            "recipient": format!("{}", deposit.recipient),
            "inputToken": format!("{}", deposit.input_token),
            "outputToken": format!("{}", deposit.output_token),
            "inputAmount": deposit.input_amount.to_string(),
            "outputAmount": deposit.output_amount.to_string(),
            "fillDeadline": deposit.fill_deadline,
            "exclusivityDeadline": deposit.exclusivity_deadline,
            "exclusiveRelayer": format!("{}", deposit.exclusive_relayer),
            "messageHash": format!("{}", deposit.message_hash()),
            "realizedLpFeePct": deposit.realized_lp_fee_pct.unwrap_or(U256::ZERO).to_string(),
            "relayer": format!("{}", Address::repeat_byte(0x0a)),
            "repaymentChainId": deposit.origin_chain_id,
            "updatedRecipient": format!("{}", deposit.effective_recipient()),
            "updatedMessageHash": format!("{}", deposit.message_hash()),
            "updatedOutputAmount": deposit.effective_output_amount().to_string(),
            "fillType": 0,
        }),
        block,
        log_index,
    )
}

pub fn slow_fill_request_event(deposit: &Deposit, block: u64, log_index: u64) -> RawEvent {
    raw(
        EventKind::RequestedSlowFill,
        json!({
            "depositId": deposit.deposit_id,
            "originChainId": deposit.origin_chain_id,
            "depositor": format!("{}", deposit.depositor),
            "recipient": format!("{}", deposit.recipient),
            "inputToken": format!("{}", deposit.input_token),
            "outputToken": format!("{}", deposit.output_token),
            "inputAmount": deposit.input_amount.to_string(),
            "outputAmount": deposit.output_amount.to_string(),
            "fillDeadline": deposit.fill_deadline,
            "exclusivityDeadline": deposit.exclusivity_deadline,
            "exclusiveRelayer": format!("{}", deposit.exclusive_relayer),
            "messageHash": format!("{}", deposit.message_hash()),
            "realizedLpFeePct": deposit.realized_lp_fee_pct.unwrap_or(U256::ZERO).to_string(),
        }),
        block,
        log_index,
    )
}

pub fn route_toggle_event(
    origin_token: Address,
    destination_chain_id: u64,
    enabled: bool,
    block: u64,
    log_index: u64,
) -> RawEvent {
    raw(
        EventKind::EnabledDepositRoute,
        json!({
            "originToken": format!("{origin_token}"),
            "destinationChainId": destination_chain_id,
            "enabled": enabled,
        }),
        block,
        log_index,
    )
}

pub fn root_bundle_event(root_bundle_id: u64, block: u64, log_index: u64) -> RawEvent {
    raw(
        EventKind::RelayedRootBundle,
        json!({
            "rootBundleId": root_bundle_id,
            "relayerRefundRoot": format!("{}", B256::repeat_byte(0x01)),
            "slowRelayRoot": format!("{}", B256::repeat_byte(0x02)),
        }),
        block,
        log_index,
    )
}

pub fn refund_execution_event(root_bundle_id: u64, block: u64, log_index: u64) -> RawEvent {
    raw(
        EventKind::ExecutedRelayerRefundRoot,
        json!({
            "amountToReturn": "0",
            "chainId": 10,
            "refundAmounts": ["7"],
            "rootBundleId": root_bundle_id,
            "leafId": 0,
            "l2TokenAddress": format!("{}", Address::repeat_byte(0x04)),
            "refundAddresses": [format!("{}", Address::repeat_byte(0x0a))],
            "deferredRefunds": false,
        }),
        block,
        log_index,
    )
}

pub fn tokens_bridged_event(block: u64, log_index: u64) -> RawEvent {
    raw(
        EventKind::TokensBridged,
        json!({
            "amountToReturn": "42",
            "chainId": 10,
            "leafId": 0,
            "l2TokenAddress": format!("{}", Address::repeat_byte(0x04)),
        }),
        block,
        log_index,
    )
}

pub fn test_depositor() -> Address {
    Address::repeat_byte(0x01)
}

pub fn test_recipient() -> Address {
    Address::repeat_byte(0x02)
}

/// A typed deposit value matching what `deposit_event` decodes to.
pub fn sample_deposit(
    deposit_id: u64,
    origin_chain_id: u64,
    destination_chain_id: u64,
    input_token: Address,
) -> Deposit {
    Deposit {
        deposit_id,
        origin_chain_id,
        destination_chain_id,
        depositor: test_depositor(),
        recipient: test_recipient(),
        input_token,
        output_token: Address::ZERO,
        input_amount: U256::from(100),
        output_amount: U256::from(99),
        quote_timestamp: 1_700_000_000,
        fill_deadline: 1_700_003_600,
        exclusivity_deadline: 0,
        exclusive_relayer: Address::ZERO,
        message: vec![],
        meta: EventMeta {
            block_number: 0,
            transaction_index: 0,
            log_index: 0,
            transaction_hash: B256::ZERO,
        },
        realized_lp_fee_pct: None,
        quote_block_number: None,
        updated_recipient: None,
        updated_output_amount: None,
        updated_message: None,
        speed_up_signature: None,
    }
}
