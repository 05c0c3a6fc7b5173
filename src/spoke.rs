//! Spoke client
//!
//! Ingests one chain's bridge events into queryable in-memory state:
//! deposits, speed-ups, fills, slow-fill requests, route enablement and the
//! append-only bundle/refund history. Fee and output-token resolution go
//! through the hub client, which the caller must update first. State
//! mutation is all-or-nothing per update cycle: every fetch and every hub
//! resolution completes before the first map is touched.

use crate::error::{ClientError, Result};
use crate::event::{
    decode_deposit, decode_fill, decode_refund_execution, decode_root_bundle,
    decode_route_toggle, decode_slow_fill_request, decode_speed_up, decode_tokens_bridged,
    EventKind, RawEvent,
};
use crate::hub::HubClient;
use crate::lifecycle::{resolve_search_window, SearchCursor, SearchWindow, UpdateStatus};
use crate::pagination::RangeQueryEngine;
use crate::relay::{
    append_max_speed_up_signature_to_deposit, relay_data_hash, validate_fill_for_deposit,
    RelayData,
};
use crate::source::{EventFilter, SpokeSources};
use crate::types::{
    sort_canonical, Deposit, DepositKey, DepositRouteToggle, EventMeta, Fill,
    RelayerRefundExecution, RootBundleRelay, SlowFillRequest, SpeedUp, TokensBridged,
};
use alloy_primitives::{Address, B256, U256};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// Default iteration bound for the `find_deposit` binary search. Empirically
/// 5-10 halvings narrow a chain history to a range one log query can cover.
const FIND_DEPOSIT_MAX_ITERATIONS: u32 = 8;

/// Result of partitioning a deposit's fills into valid and invalid.
#[derive(Debug, Clone)]
pub struct UnfilledAmount {
    /// Full output amount if no valid fill exists, zero otherwise: one
    /// valid fill settles a deposit completely.
    pub unfilled_amount: U256,
    pub valid_fill_count: usize,
    /// Fills sharing the deposit's identity key that failed the field-exact
    /// check, returned for diagnostics.
    pub invalid_fills: Vec<Fill>,
}

/// Client over one spoke contract's event history.
pub struct SpokeClient {
    chain_id: u64,
    address: Address,
    deployment_block: u64,
    sources: SpokeSources,
    engine: RangeQueryEngine,
    find_deposit_max_iterations: u32,

    status: UpdateStatus,
    cursor: SearchCursor,

    deposits: HashMap<DepositKey, Deposit>,
    speed_ups: HashMap<(Address, u64), Vec<SpeedUp>>,
    fills_by_origin: HashMap<u64, Vec<Fill>>,
    fills_by_key: HashMap<DepositKey, Vec<Fill>>,
    slow_fill_requests: HashMap<(B256, u64), SlowFillRequest>,
    route_enabled: HashMap<(Address, u64), bool>,
    root_bundles: Vec<RootBundleRelay>,
    refund_executions: Vec<RelayerRefundExecution>,
    tokens_bridged: Vec<TokensBridged>,
    /// Provenance of every ingested event, for idempotent re-runs
    seen: HashSet<EventMeta>,

    earliest_deposit_id: Option<u64>,
    latest_deposit_id: Option<u64>,
}

impl SpokeClient {
    /// `start_block` lets a caller begin indexing later than deployment;
    /// route enablement is still always recovered from deployment on the
    /// first update.
    pub fn new(
        chain_id: u64,
        address: Address,
        deployment_block: u64,
        start_block: Option<u64>,
        sources: SpokeSources,
        max_lookback: Option<u64>,
    ) -> Self {
        let engine = RangeQueryEngine::new(sources.logs.clone(), max_lookback);
        Self {
            chain_id,
            address,
            deployment_block,
            sources,
            engine,
            find_deposit_max_iterations: FIND_DEPOSIT_MAX_ITERATIONS,
            status: UpdateStatus::NotUpdated,
            cursor: SearchCursor::new(start_block.unwrap_or(deployment_block)),
            deposits: HashMap::new(),
            speed_ups: HashMap::new(),
            fills_by_origin: HashMap::new(),
            fills_by_key: HashMap::new(),
            slow_fill_requests: HashMap::new(),
            route_enabled: HashMap::new(),
            root_bundles: Vec::new(),
            refund_executions: Vec::new(),
            tokens_bridged: Vec::new(),
            seen: HashSet::new(),
            earliest_deposit_id: None,
            latest_deposit_id: None,
        }
    }

    /// Attach an advisory cache for paginated sub-range queries.
    pub fn with_cache(mut self, cache: std::sync::Arc<dyn crate::cache::Cache>) -> Self {
        self.engine = self.engine.with_cache(cache);
        self
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn is_updated(&self) -> bool {
        self.status.is_updated()
    }

    pub fn latest_height_searched(&self) -> Option<u64> {
        self.cursor.latest_height_searched
    }

    /// Lowest and highest deposit ids ingested so far.
    pub fn deposit_id_bounds(&self) -> (Option<u64>, Option<u64>) {
        (self.earliest_deposit_id, self.latest_deposit_id)
    }

    /// Incremental update: fetch the requested event types (default: all)
    /// over the next search window and fold them into state.
    ///
    /// Fails with `DependencyNotReady` if a hub client is supplied but not
    /// yet updated, and `UnknownEvent` if asked for an event this client
    /// does not index. A window that has produced no new blocks is a pure
    /// no-op: it mutates nothing and does not mark a never-updated client
    /// as updated.
    pub async fn update(
        &mut self,
        hub: Option<&HubClient>,
        kinds: Option<&[EventKind]>,
        to: Option<u64>,
    ) -> Result<()> {
        if let Some(hub) = hub {
            if !hub.is_updated() {
                return Err(ClientError::DependencyNotReady);
            }
        }
        let requested = match kinds {
            Some(kinds) => kinds,
            None => EventKind::spoke_events(),
        };
        let mut kinds: Vec<EventKind> = Vec::with_capacity(requested.len());
        for kind in requested {
            if !EventKind::spoke_events().contains(kind) {
                return Err(ClientError::UnknownEvent(kind.as_str().to_string()));
            }
            if !kinds.contains(kind) {
                kinds.push(*kind);
            }
        }

        let window = resolve_search_window(&self.cursor, to, self.sources.head.as_ref()).await?;
        let SearchWindow::Range { from, to } = window else {
            debug!(chain = self.chain_id, "spoke already up to date");
            return Ok(());
        };

        // Fan out one range query per event type; nothing mutates until
        // every fetch and every hub resolution has succeeded.
        let first_update = !self.status.is_updated();
        let queries = kinds.iter().map(|&kind| {
            // Route enablement must never be missed because of a narrow
            // initial window: before the first successful update it is
            // always fetched from deployment.
            let from = if kind == EventKind::EnabledDepositRoute && first_update {
                self.deployment_block
            } else {
                from
            };
            let filter = EventFilter {
                kind,
                address: self.address,
            };
            let engine = &self.engine;
            async move {
                engine
                    .query(&filter, from, to)
                    .await
                    .map(|events| (kind, events))
            }
        });
        let fetched = futures::future::try_join_all(queries).await?;

        let mut deposits: Vec<Deposit> = Vec::new();
        let mut speed_ups: Vec<SpeedUp> = Vec::new();
        let mut fills: Vec<Fill> = Vec::new();
        let mut slow_fills: Vec<SlowFillRequest> = Vec::new();
        let mut toggles: Vec<DepositRouteToggle> = Vec::new();
        let mut bundles: Vec<RootBundleRelay> = Vec::new();
        let mut refunds: Vec<RelayerRefundExecution> = Vec::new();
        let mut bridged: Vec<TokensBridged> = Vec::new();
        for (kind, raws) in &fetched {
            match kind {
                EventKind::FundsDeposited => {
                    deposits = decode_all(raws, |raw| decode_deposit(raw, self.chain_id))?
                }
                EventKind::RequestedSpeedUpDeposit => {
                    speed_ups = decode_all(raws, |raw| decode_speed_up(raw, self.chain_id))?
                }
                EventKind::FilledRelay => {
                    fills = decode_all(raws, |raw| decode_fill(raw, self.chain_id))?
                }
                EventKind::RequestedSlowFill => {
                    slow_fills =
                        decode_all(raws, |raw| decode_slow_fill_request(raw, self.chain_id))?
                }
                EventKind::EnabledDepositRoute => {
                    toggles = decode_all(raws, decode_route_toggle)?
                }
                EventKind::RelayedRootBundle => bundles = decode_all(raws, decode_root_bundle)?,
                EventKind::ExecutedRelayerRefundRoot => {
                    refunds = decode_all(raws, decode_refund_execution)?
                }
                EventKind::TokensBridged => bridged = decode_all(raws, decode_tokens_bridged)?,
                _ => unreachable!("validated against spoke_events above"),
            }
        }

        // Stage genuinely new deposits and resolve their fees and output
        // tokens through the hub before touching any state. Deposits are
        // immutable once recorded: an identity key already present (or
        // repeated within this batch) is skipped, never overwritten.
        let mut new_deposits: Vec<Deposit> = Vec::new();
        for deposit in &deposits {
            if self.seen.contains(&deposit.meta)
                || self.deposits.contains_key(&deposit.key())
                || new_deposits.iter().any(|d| d.key() == deposit.key())
            {
                continue;
            }
            new_deposits.push(deposit.clone());
        }
        if let Some(hub) = hub {
            if !new_deposits.is_empty() {
                let quotes = hub.batch_compute_realized_lp_fee_pct(&new_deposits).await?;
                for (deposit, quote) in new_deposits.iter_mut().zip(quotes) {
                    deposit.realized_lp_fee_pct = Some(quote.realized_lp_fee_pct);
                    deposit.quote_block_number = Some(quote.quote_block);
                }
                for deposit in &mut new_deposits {
                    if deposit.output_token == Address::ZERO {
                        deposit.output_token = hub.get_l2_token_for_deposit(deposit)?;
                    }
                }
            }
        }

        // Mutation phase: pure in-memory folds, no fallible I/O past this
        // point.
        let mut staged: HashMap<EventMeta, Deposit> =
            new_deposits.into_iter().map(|d| (d.meta, d)).collect();
        let mut ingested_deposits = 0usize;
        for deposit in &deposits {
            if !self.seen.insert(deposit.meta) {
                continue;
            }
            let Some(mut deposit) = staged.remove(&deposit.meta) else {
                continue;
            };
            // Speed-ups may have been recorded before their deposit arrived.
            if let Some(speed_ups) = self.speed_ups.get(&(deposit.depositor, deposit.deposit_id))
            {
                deposit = append_max_speed_up_signature_to_deposit(&deposit, speed_ups);
            }
            self.earliest_deposit_id = Some(
                self.earliest_deposit_id
                    .map_or(deposit.deposit_id, |id| id.min(deposit.deposit_id)),
            );
            self.latest_deposit_id = Some(
                self.latest_deposit_id
                    .map_or(deposit.deposit_id, |id| id.max(deposit.deposit_id)),
            );
            self.deposits.insert(deposit.key(), deposit);
            ingested_deposits += 1;
        }

        for speed_up in speed_ups {
            if !self.seen.insert(speed_up.meta) {
                continue;
            }
            let key = (speed_up.depositor, speed_up.deposit_id);
            let deposit_key = DepositKey {
                deposit_id: speed_up.deposit_id,
                origin_chain_id: self.chain_id,
            };
            self.speed_ups.entry(key).or_default().push(speed_up);
            // Re-derive the authoritative speed-up for the deposit, if we
            // have it and it belongs to this depositor.
            if let Some(deposit) = self.deposits.get(&deposit_key) {
                if deposit.depositor == key.0 {
                    let updated =
                        append_max_speed_up_signature_to_deposit(deposit, &self.speed_ups[&key]);
                    self.deposits.insert(deposit_key, updated);
                }
            }
        }

        for fill in fills {
            if !self.seen.insert(fill.meta) {
                continue;
            }
            self.fills_by_key
                .entry(fill.key())
                .or_default()
                .push(fill.clone());
            self.fills_by_origin
                .entry(fill.origin_chain_id)
                .or_default()
                .push(fill);
        }

        for request in slow_fills {
            if !self.seen.insert(request.meta) {
                continue;
            }
            let hash = relay_data_hash(&RelayData::from(&request), self.chain_id);
            self.slow_fill_requests
                .entry((hash, self.chain_id))
                .or_insert(request);
        }

        for toggle in toggles {
            if !self.seen.insert(toggle.meta) {
                continue;
            }
            self.route_enabled
                .insert((toggle.origin_token, toggle.destination_chain_id), toggle.enabled);
        }
        for bundle in bundles {
            if self.seen.insert(bundle.meta) {
                self.root_bundles.push(bundle);
            }
        }
        for refund in refunds {
            if self.seen.insert(refund.meta) {
                self.refund_executions.push(refund);
            }
        }
        for tokens in bridged {
            if self.seen.insert(tokens.meta) {
                self.tokens_bridged.push(tokens);
            }
        }

        self.cursor.advance(to);
        self.status.mark_updated();
        info!(
            chain = self.chain_id,
            from, to, ingested_deposits, "spoke client updated"
        );
        Ok(())
    }

    /// A deposit made on this chain, by id.
    pub fn get_deposit(&self, deposit_id: u64) -> Option<&Deposit> {
        self.deposits.get(&DepositKey {
            deposit_id,
            origin_chain_id: self.chain_id,
        })
    }

    /// All ingested deposits in canonical event order.
    pub fn get_deposits(&self) -> Vec<&Deposit> {
        let mut deposits: Vec<&Deposit> = self.deposits.values().collect();
        deposits.sort_by_key(|d| d.meta);
        deposits
    }

    /// The deposit a fill satisfies, if the fill passes the field-exact
    /// validity check against it. An unmatched fill is informational, not
    /// an error.
    pub fn get_deposit_for_fill(&self, fill: &Fill) -> Option<&Deposit> {
        let deposit = self.deposits.get(&fill.key())?;
        validate_fill_for_deposit(fill, deposit).then_some(deposit)
    }

    /// Partition the fills sharing a deposit's identity key into valid and
    /// invalid. One valid fill settles the deposit in full; invalid fills
    /// are logged and returned for diagnostics.
    pub fn get_valid_unfilled_amount_for_deposit(&self, deposit: &Deposit) -> UnfilledAmount {
        let fills = self
            .fills_by_key
            .get(&deposit.key())
            .map(Vec::as_slice)
            .unwrap_or(&[]);

        let mut valid_fill_count = 0usize;
        let mut invalid_fills = Vec::new();
        for fill in fills {
            if validate_fill_for_deposit(fill, deposit) {
                valid_fill_count += 1;
            } else {
                warn!(
                    chain = self.chain_id,
                    deposit_id = deposit.deposit_id,
                    origin_chain = deposit.origin_chain_id,
                    tx = %fill.meta.transaction_hash,
                    "fill shares deposit id but fails validation"
                );
                invalid_fills.push(fill.clone());
            }
        }

        let unfilled_amount = if valid_fill_count == 0 {
            deposit.output_amount
        } else {
            U256::ZERO
        };
        UnfilledAmount {
            unfilled_amount,
            valid_fill_count,
            invalid_fills,
        }
    }

    /// Locate a deposit outside the indexed window.
    ///
    /// Binary-searches block height through the deposit-counter oracle
    /// until the creation block is bracketed (or the iteration budget runs
    /// out), then issues one direct event query over the bracket. The
    /// `destination_chain_id` and `depositor` arguments cross-check the
    /// found event; a mismatch means the id was wrong.
    pub async fn find_deposit(
        &self,
        deposit_id: u64,
        destination_chain_id: u64,
        depositor: Address,
    ) -> Result<Deposit> {
        if let Some(deposit) = self.get_deposit(deposit_id) {
            if deposit.destination_chain_id == destination_chain_id
                && deposit.depositor == depositor
            {
                return Ok(deposit.clone());
            }
            return Err(ClientError::DepositNotFound {
                deposit_id,
                from: deposit.meta.block_number,
                to: deposit.meta.block_number,
            });
        }

        let head = self
            .sources
            .head
            .current_height()
            .await
            .map_err(ClientError::Oracle)?;
        let mut lo = self.deployment_block;
        let mut hi = head;

        let total = self.deposit_count_at(hi).await?;
        if total <= deposit_id {
            return Err(ClientError::DepositNotFound {
                deposit_id,
                from: lo,
                to: hi,
            });
        }

        // Invariant: count(hi) > deposit_id, count(lo - 1) <= deposit_id.
        // The creation block is the lowest height where the count exceeds
        // the id; the loop narrows [lo, hi] around it.
        for _ in 0..self.find_deposit_max_iterations {
            if lo >= hi {
                break;
            }
            let mid = lo + (hi - lo) / 2;
            let count = self.deposit_count_at(mid).await?;
            if count > deposit_id {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }

        let filter = EventFilter {
            kind: EventKind::FundsDeposited,
            address: self.address,
        };
        let events = self.engine.query(&filter, lo, hi).await?;
        for raw in &events {
            let deposit = decode_deposit(raw, self.chain_id)?;
            if deposit.deposit_id == deposit_id
                && deposit.destination_chain_id == destination_chain_id
                && deposit.depositor == depositor
            {
                return Ok(deposit);
            }
        }
        Err(ClientError::DepositNotFound {
            deposit_id,
            from: lo,
            to: hi,
        })
    }

    async fn deposit_count_at(&self, height: u64) -> Result<u64> {
        self.sources
            .deposit_counter
            .deposit_count_at_height(height)
            .await
            .map_err(ClientError::Oracle)
    }

    /// A new deposit value with the authoritative recorded speed-up
    /// applied, per the lowest-output-amount rule. Pure: no state changes.
    pub fn append_max_speed_up_signature_to_deposit(&self, deposit: &Deposit) -> Deposit {
        match self.speed_ups.get(&(deposit.depositor, deposit.deposit_id)) {
            Some(speed_ups) => append_max_speed_up_signature_to_deposit(deposit, speed_ups),
            None => deposit.clone(),
        }
    }

    /// Fills observed on this chain for deposits originating on `chain_id`.
    pub fn get_fills_for_origin_chain(&self, chain_id: u64) -> &[Fill] {
        self.fills_by_origin
            .get(&chain_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The slow-fill request recorded for this relay data, if any.
    pub fn get_slow_fill_request(&self, relay: &RelayData) -> Option<&SlowFillRequest> {
        let hash = relay_data_hash(relay, self.chain_id);
        self.slow_fill_requests.get(&(hash, self.chain_id))
    }

    pub fn get_relayed_root_bundles(&self) -> &[RootBundleRelay] {
        &self.root_bundles
    }

    pub fn get_relayer_refund_executions(&self) -> &[RelayerRefundExecution] {
        &self.refund_executions
    }

    pub fn get_tokens_bridged(&self) -> &[TokensBridged] {
        &self.tokens_bridged
    }

    /// Latest recorded enablement of a deposit route. Unknown routes are
    /// disabled.
    pub fn is_deposit_route_enabled(&self, origin_token: Address, destination_chain_id: u64) -> bool {
        self.route_enabled
            .get(&(origin_token, destination_chain_id))
            .copied()
            .unwrap_or(false)
    }
}

fn decode_all<T>(raws: &[RawEvent], decode: impl Fn(&RawEvent) -> Result<T>) -> Result<Vec<T>>
where
    T: crate::types::Provenance,
{
    let mut records = raws.iter().map(decode).collect::<Result<Vec<T>>>()?;
    sort_canonical(&mut records);
    Ok(records)
}
