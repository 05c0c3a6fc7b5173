//! Event log normalizer
//!
//! Converts raw chain log objects into canonical, strongly-typed records.
//! Each event type has its own decode function producing one fixed record
//! type; which fields exist and how they coerce (address vs small integer
//! vs big integer vs bytes) is an explicit static table, not runtime
//! introspection.

use crate::error::{ClientError, Result};
use crate::types::{
    Deposit, DepositRouteToggle, EventMeta, Fill, FillType, PoolRebalanceRoute,
    RateModelUpdate, RelayExecutionInfo, RelayerRefundExecution, RootBundleRelay,
    RouteRateModel, SlowFillRequest, SpeedUp, TokensBridged,
};
use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The fixed, versioned set of upstream event names. The layouts are a
/// contract with the chain programs and are treated as given constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    // Spoke events
    FundsDeposited,
    RequestedSpeedUpDeposit,
    FilledRelay,
    RequestedSlowFill,
    EnabledDepositRoute,
    RelayedRootBundle,
    ExecutedRelayerRefundRoot,
    TokensBridged,
    // Hub events
    SetPoolRebalanceRoute,
    UpdatedRateModel,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::FundsDeposited => "FundsDeposited",
            EventKind::RequestedSpeedUpDeposit => "RequestedSpeedUpDeposit",
            EventKind::FilledRelay => "FilledRelay",
            EventKind::RequestedSlowFill => "RequestedSlowFill",
            EventKind::EnabledDepositRoute => "EnabledDepositRoute",
            EventKind::RelayedRootBundle => "RelayedRootBundle",
            EventKind::ExecutedRelayerRefundRoot => "ExecutedRelayerRefundRoot",
            EventKind::TokensBridged => "TokensBridged",
            EventKind::SetPoolRebalanceRoute => "SetPoolRebalanceRoute",
            EventKind::UpdatedRateModel => "UpdatedRateModel",
        }
    }

    pub fn from_name(name: &str) -> Option<EventKind> {
        match name {
            "FundsDeposited" => Some(EventKind::FundsDeposited),
            "RequestedSpeedUpDeposit" => Some(EventKind::RequestedSpeedUpDeposit),
            "FilledRelay" => Some(EventKind::FilledRelay),
            "RequestedSlowFill" => Some(EventKind::RequestedSlowFill),
            "EnabledDepositRoute" => Some(EventKind::EnabledDepositRoute),
            "RelayedRootBundle" => Some(EventKind::RelayedRootBundle),
            "ExecutedRelayerRefundRoot" => Some(EventKind::ExecutedRelayerRefundRoot),
            "TokensBridged" => Some(EventKind::TokensBridged),
            "SetPoolRebalanceRoute" => Some(EventKind::SetPoolRebalanceRoute),
            "UpdatedRateModel" => Some(EventKind::UpdatedRateModel),
            _ => None,
        }
    }

    /// All event names a spoke client refreshes by default.
    pub fn spoke_events() -> &'static [EventKind] {
        &[
            EventKind::FundsDeposited,
            EventKind::RequestedSpeedUpDeposit,
            EventKind::FilledRelay,
            EventKind::RequestedSlowFill,
            EventKind::EnabledDepositRoute,
            EventKind::RelayedRootBundle,
            EventKind::ExecutedRelayerRefundRoot,
            EventKind::TokensBridged,
        ]
    }

    /// All event names a hub client refreshes by default.
    pub fn hub_events() -> &'static [EventKind] {
        &[EventKind::SetPoolRebalanceRoute, EventKind::UpdatedRateModel]
    }
}

/// How a named argument coerces into its record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Address,
    U64,
    U256,
    Hash,
    Bytes,
    Bool,
    U256List,
    AddressList,
    RateModel,
    RouteRateModels,
}

/// Static field-coercion table: which named args each event carries and how
/// each one coerces. Decode functions check presence against this table
/// before reading, so a malformed log fails loudly with the missing field.
pub fn event_fields(kind: EventKind) -> &'static [(&'static str, FieldKind)] {
    use FieldKind::*;
    match kind {
        EventKind::FundsDeposited => &[
            ("depositId", U64),
            ("destinationChainId", U64),
            ("depositor", Address),
            ("recipient", Address),
            ("inputToken", Address),
            ("outputToken", Address),
            ("inputAmount", U256),
            ("outputAmount", U256),
            ("quoteTimestamp", U64),
            ("fillDeadline", U64),
            ("exclusivityDeadline", U64),
            ("exclusiveRelayer", Address),
            ("message", Bytes),
        ],
        EventKind::RequestedSpeedUpDeposit => &[
            ("depositId", U64),
            ("depositor", Address),
            ("updatedRecipient", Address),
            ("updatedOutputAmount", U256),
            ("updatedMessage", Bytes),
            ("depositorSignature", Bytes),
        ],
        EventKind::FilledRelay => &[
            ("depositId", U64),
            ("originChainId", U64),
            ("depositor", Address),
            ("recipient", Address),
            ("inputToken", Address),
            ("outputToken", Address),
            ("inputAmount", U256),
            ("outputAmount", U256),
            ("fillDeadline", U64),
            ("exclusivityDeadline", U64),
            ("exclusiveRelayer", Address),
            ("messageHash", Hash),
            ("realizedLpFeePct", U256),
            ("relayer", Address),
            ("repaymentChainId", U64),
            ("updatedRecipient", Address),
            ("updatedMessageHash", Hash),
            ("updatedOutputAmount", U256),
            ("fillType", U64),
        ],
        EventKind::RequestedSlowFill => &[
            ("depositId", U64),
            ("originChainId", U64),
            ("depositor", Address),
            ("recipient", Address),
            ("inputToken", Address),
            ("outputToken", Address),
            ("inputAmount", U256),
            ("outputAmount", U256),
            ("fillDeadline", U64),
            ("exclusivityDeadline", U64),
            ("exclusiveRelayer", Address),
            ("messageHash", Hash),
            ("realizedLpFeePct", U256),
        ],
        EventKind::EnabledDepositRoute => &[
            ("originToken", Address),
            ("destinationChainId", U64),
            ("enabled", Bool),
        ],
        EventKind::RelayedRootBundle => &[
            ("rootBundleId", U64),
            ("relayerRefundRoot", Hash),
            ("slowRelayRoot", Hash),
        ],
        EventKind::ExecutedRelayerRefundRoot => &[
            ("amountToReturn", U256),
            ("chainId", U64),
            ("refundAmounts", U256List),
            ("rootBundleId", U64),
            ("leafId", U64),
            ("l2TokenAddress", Address),
            ("refundAddresses", AddressList),
            ("deferredRefunds", Bool),
        ],
        EventKind::TokensBridged => &[
            ("amountToReturn", U256),
            ("chainId", U64),
            ("leafId", U64),
            ("l2TokenAddress", Address),
        ],
        EventKind::SetPoolRebalanceRoute => &[
            ("destinationChainId", U64),
            ("l1Token", Address),
            ("destinationToken", Address),
        ],
        EventKind::UpdatedRateModel => &[
            ("l1Token", Address),
            ("rateModel", RateModel),
            ("routeRateModels", RouteRateModels),
            ("blockTimestamp", U64),
        ],
    }
}

/// A raw chain log: the event name, named arguments as loosely-typed JSON
/// values, and block provenance. Produced by the log source; consumed only
/// by the decode functions below.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEvent {
    pub kind: EventKind,
    /// Address of the emitting contract
    pub address: Address,
    /// Named event arguments
    pub args: Map<String, Value>,
    pub block_number: u64,
    pub transaction_index: u64,
    pub log_index: u64,
    pub transaction_hash: B256,
}

impl RawEvent {
    pub fn meta(&self) -> EventMeta {
        EventMeta {
            block_number: self.block_number,
            transaction_index: self.transaction_index,
            log_index: self.log_index,
            transaction_hash: self.transaction_hash,
        }
    }
}

// Coercion helpers. JSON-RPC encodes quantities as hex strings; normalized
// feeds may use decimal strings or plain numbers. All three are accepted.

fn missing(kind: EventKind, field: &str) -> ClientError {
    ClientError::Decode(format!("{}: missing field {}", kind.as_str(), field))
}

fn bad(kind: EventKind, field: &str, why: &str) -> ClientError {
    ClientError::Decode(format!("{}: field {}: {}", kind.as_str(), field, why))
}

fn require(raw: &RawEvent) -> Result<()> {
    for (field, _) in event_fields(raw.kind) {
        if !raw.args.contains_key(*field) {
            return Err(missing(raw.kind, field));
        }
    }
    Ok(())
}

fn get<'a>(raw: &'a RawEvent, field: &str) -> Result<&'a Value> {
    raw.args.get(field).ok_or_else(|| missing(raw.kind, field))
}

fn hex_bytes(kind: EventKind, field: &str, s: &str) -> Result<Vec<u8>> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    if s.is_empty() {
        return Ok(Vec::new());
    }
    let padded = if s.len() % 2 == 1 {
        format!("0{}", s)
    } else {
        s.to_string()
    };
    hex::decode(&padded).map_err(|e| bad(kind, field, &format!("invalid hex: {}", e)))
}

fn get_address(raw: &RawEvent, field: &str) -> Result<Address> {
    let s = get(raw, field)?
        .as_str()
        .ok_or_else(|| bad(raw.kind, field, "expected address string"))?;
    let bytes = hex_bytes(raw.kind, field, s)?;
    if bytes.len() != 20 {
        return Err(bad(
            raw.kind,
            field,
            &format!("expected 20 bytes, got {}", bytes.len()),
        ));
    }
    Ok(Address::from_slice(&bytes))
}

fn get_hash(raw: &RawEvent, field: &str) -> Result<B256> {
    let s = get(raw, field)?
        .as_str()
        .ok_or_else(|| bad(raw.kind, field, "expected hash string"))?;
    let bytes = hex_bytes(raw.kind, field, s)?;
    if bytes.len() != 32 {
        return Err(bad(
            raw.kind,
            field,
            &format!("expected 32 bytes, got {}", bytes.len()),
        ));
    }
    Ok(B256::from_slice(&bytes))
}

fn get_u64(raw: &RawEvent, field: &str) -> Result<u64> {
    match get(raw, field)? {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| bad(raw.kind, field, "number out of u64 range")),
        Value::String(s) => {
            if let Some(hexpart) = s.strip_prefix("0x") {
                u64::from_str_radix(hexpart, 16)
                    .map_err(|e| bad(raw.kind, field, &format!("invalid hex u64: {}", e)))
            } else {
                s.parse::<u64>()
                    .map_err(|e| bad(raw.kind, field, &format!("invalid u64: {}", e)))
            }
        }
        _ => Err(bad(raw.kind, field, "expected u64")),
    }
}

fn parse_u256(kind: EventKind, field: &str, v: &Value) -> Result<U256> {
    match v {
        Value::Number(n) => {
            let n = n
                .as_u64()
                .ok_or_else(|| bad(kind, field, "number out of range"))?;
            Ok(U256::from(n))
        }
        Value::String(s) => {
            if s.starts_with("0x") {
                let bytes = hex_bytes(kind, field, s)?;
                if bytes.len() > 32 {
                    return Err(bad(kind, field, "more than 32 bytes"));
                }
                Ok(U256::from_be_slice(&bytes))
            } else {
                U256::from_str_radix(s, 10)
                    .map_err(|e| bad(kind, field, &format!("invalid u256: {}", e)))
            }
        }
        _ => Err(bad(kind, field, "expected u256")),
    }
}

fn get_u256(raw: &RawEvent, field: &str) -> Result<U256> {
    parse_u256(raw.kind, field, get(raw, field)?)
}

fn get_bytes(raw: &RawEvent, field: &str) -> Result<Vec<u8>> {
    let s = get(raw, field)?
        .as_str()
        .ok_or_else(|| bad(raw.kind, field, "expected bytes string"))?;
    hex_bytes(raw.kind, field, s)
}

fn get_bool(raw: &RawEvent, field: &str) -> Result<bool> {
    get(raw, field)?
        .as_bool()
        .ok_or_else(|| bad(raw.kind, field, "expected bool"))
}

fn get_u256_list(raw: &RawEvent, field: &str) -> Result<Vec<U256>> {
    let arr = get(raw, field)?
        .as_array()
        .ok_or_else(|| bad(raw.kind, field, "expected array"))?;
    arr.iter()
        .map(|v| parse_u256(raw.kind, field, v))
        .collect()
}

fn get_address_list(raw: &RawEvent, field: &str) -> Result<Vec<Address>> {
    let arr = get(raw, field)?
        .as_array()
        .ok_or_else(|| bad(raw.kind, field, "expected array"))?;
    arr.iter()
        .map(|v| {
            let s = v
                .as_str()
                .ok_or_else(|| bad(raw.kind, field, "expected address string"))?;
            let bytes = hex_bytes(raw.kind, field, s)?;
            if bytes.len() != 20 {
                return Err(bad(raw.kind, field, "expected 20 bytes"));
            }
            Ok(Address::from_slice(&bytes))
        })
        .collect()
}

fn get_fill_type(raw: &RawEvent, field: &str) -> Result<FillType> {
    match get_u64(raw, field)? {
        0 => Ok(FillType::FastFill),
        1 => Ok(FillType::ReplacedSlowFill),
        2 => Ok(FillType::SlowFill),
        other => Err(bad(
            raw.kind,
            field,
            &format!("unknown fill type {}", other),
        )),
    }
}

// Per-event decode functions. Each produces exactly one fixed record type.

/// Decode a FundsDeposited event. The origin chain is the spoke's own chain
/// and is not part of the event payload.
pub fn decode_deposit(raw: &RawEvent, origin_chain_id: u64) -> Result<Deposit> {
    require(raw)?;
    Ok(Deposit {
        deposit_id: get_u64(raw, "depositId")?,
        origin_chain_id,
        destination_chain_id: get_u64(raw, "destinationChainId")?,
        depositor: get_address(raw, "depositor")?,
        recipient: get_address(raw, "recipient")?,
        input_token: get_address(raw, "inputToken")?,
        output_token: get_address(raw, "outputToken")?,
        input_amount: get_u256(raw, "inputAmount")?,
        output_amount: get_u256(raw, "outputAmount")?,
        quote_timestamp: get_u64(raw, "quoteTimestamp")?,
        fill_deadline: get_u64(raw, "fillDeadline")?,
        exclusivity_deadline: get_u64(raw, "exclusivityDeadline")?,
        exclusive_relayer: get_address(raw, "exclusiveRelayer")?,
        message: get_bytes(raw, "message")?,
        meta: raw.meta(),
        realized_lp_fee_pct: None,
        quote_block_number: None,
        updated_recipient: None,
        updated_output_amount: None,
        updated_message: None,
        speed_up_signature: None,
    })
}

pub fn decode_speed_up(raw: &RawEvent, origin_chain_id: u64) -> Result<SpeedUp> {
    require(raw)?;
    Ok(SpeedUp {
        depositor: get_address(raw, "depositor")?,
        deposit_id: get_u64(raw, "depositId")?,
        origin_chain_id,
        updated_recipient: get_address(raw, "updatedRecipient")?,
        updated_output_amount: get_u256(raw, "updatedOutputAmount")?,
        updated_message: get_bytes(raw, "updatedMessage")?,
        depositor_signature: get_bytes(raw, "depositorSignature")?,
        meta: raw.meta(),
    })
}

/// Decode a FilledRelay event. The destination chain is the spoke's own
/// chain and is not part of the event payload.
pub fn decode_fill(raw: &RawEvent, destination_chain_id: u64) -> Result<Fill> {
    require(raw)?;
    Ok(Fill {
        deposit_id: get_u64(raw, "depositId")?,
        origin_chain_id: get_u64(raw, "originChainId")?,
        destination_chain_id,
        depositor: get_address(raw, "depositor")?,
        recipient: get_address(raw, "recipient")?,
        input_token: get_address(raw, "inputToken")?,
        output_token: get_address(raw, "outputToken")?,
        input_amount: get_u256(raw, "inputAmount")?,
        output_amount: get_u256(raw, "outputAmount")?,
        fill_deadline: get_u64(raw, "fillDeadline")?,
        exclusivity_deadline: get_u64(raw, "exclusivityDeadline")?,
        exclusive_relayer: get_address(raw, "exclusiveRelayer")?,
        message_hash: get_hash(raw, "messageHash")?,
        realized_lp_fee_pct: get_u256(raw, "realizedLpFeePct")?,
        relayer: get_address(raw, "relayer")?,
        repayment_chain_id: get_u64(raw, "repaymentChainId")?,
        relay_execution_info: RelayExecutionInfo {
            updated_recipient: get_address(raw, "updatedRecipient")?,
            updated_message_hash: get_hash(raw, "updatedMessageHash")?,
            updated_output_amount: get_u256(raw, "updatedOutputAmount")?,
            fill_type: get_fill_type(raw, "fillType")?,
        },
        meta: raw.meta(),
    })
}

pub fn decode_slow_fill_request(
    raw: &RawEvent,
    destination_chain_id: u64,
) -> Result<SlowFillRequest> {
    require(raw)?;
    Ok(SlowFillRequest {
        deposit_id: get_u64(raw, "depositId")?,
        origin_chain_id: get_u64(raw, "originChainId")?,
        destination_chain_id,
        depositor: get_address(raw, "depositor")?,
        recipient: get_address(raw, "recipient")?,
        input_token: get_address(raw, "inputToken")?,
        output_token: get_address(raw, "outputToken")?,
        input_amount: get_u256(raw, "inputAmount")?,
        output_amount: get_u256(raw, "outputAmount")?,
        fill_deadline: get_u64(raw, "fillDeadline")?,
        exclusivity_deadline: get_u64(raw, "exclusivityDeadline")?,
        exclusive_relayer: get_address(raw, "exclusiveRelayer")?,
        message_hash: get_hash(raw, "messageHash")?,
        realized_lp_fee_pct: get_u256(raw, "realizedLpFeePct")?,
        meta: raw.meta(),
    })
}

pub fn decode_route_toggle(raw: &RawEvent) -> Result<DepositRouteToggle> {
    require(raw)?;
    Ok(DepositRouteToggle {
        origin_token: get_address(raw, "originToken")?,
        destination_chain_id: get_u64(raw, "destinationChainId")?,
        enabled: get_bool(raw, "enabled")?,
        meta: raw.meta(),
    })
}

pub fn decode_root_bundle(raw: &RawEvent) -> Result<RootBundleRelay> {
    require(raw)?;
    Ok(RootBundleRelay {
        root_bundle_id: get_u64(raw, "rootBundleId")?,
        relayer_refund_root: get_hash(raw, "relayerRefundRoot")?,
        slow_relay_root: get_hash(raw, "slowRelayRoot")?,
        meta: raw.meta(),
    })
}

pub fn decode_refund_execution(raw: &RawEvent) -> Result<RelayerRefundExecution> {
    require(raw)?;
    Ok(RelayerRefundExecution {
        amount_to_return: get_u256(raw, "amountToReturn")?,
        chain_id: get_u64(raw, "chainId")?,
        refund_amounts: get_u256_list(raw, "refundAmounts")?,
        root_bundle_id: get_u64(raw, "rootBundleId")?,
        leaf_id: get_u64(raw, "leafId")?,
        l2_token_address: get_address(raw, "l2TokenAddress")?,
        refund_addresses: get_address_list(raw, "refundAddresses")?,
        deferred_refunds: get_bool(raw, "deferredRefunds")?,
        meta: raw.meta(),
    })
}

pub fn decode_tokens_bridged(raw: &RawEvent) -> Result<TokensBridged> {
    require(raw)?;
    Ok(TokensBridged {
        amount_to_return: get_u256(raw, "amountToReturn")?,
        chain_id: get_u64(raw, "chainId")?,
        leaf_id: get_u64(raw, "leafId")?,
        l2_token_address: get_address(raw, "l2TokenAddress")?,
        meta: raw.meta(),
    })
}

pub fn decode_rebalance_route(raw: &RawEvent) -> Result<PoolRebalanceRoute> {
    require(raw)?;
    Ok(PoolRebalanceRoute {
        destination_chain_id: get_u64(raw, "destinationChainId")?,
        l1_token: get_address(raw, "l1Token")?,
        destination_token: get_address(raw, "destinationToken")?,
        meta: raw.meta(),
    })
}

pub fn decode_rate_model_update(raw: &RawEvent) -> Result<RateModelUpdate> {
    require(raw)?;
    let rate_model: crate::lpfee::RateModel =
        serde_json::from_value(get(raw, "rateModel")?.clone())
            .map_err(|e| bad(raw.kind, "rateModel", &format!("{}", e)))?;
    let route_rate_models: Vec<RouteRateModel> =
        serde_json::from_value(get(raw, "routeRateModels")?.clone())
            .map_err(|e| bad(raw.kind, "routeRateModels", &format!("{}", e)))?;
    Ok(RateModelUpdate {
        l1_token: get_address(raw, "l1Token")?,
        rate_model,
        route_rate_models,
        block_timestamp: get_u64(raw, "blockTimestamp")?,
        meta: raw.meta(),
    })
}
