//! Hub client
//!
//! Maintains the time-varying L1↔L2 token route table and the protocol
//! configuration history (rate models with per-route overrides), and
//! answers "as of block" queries over both. Spoke clients depend on this
//! state for fee and output-token resolution and must be updated after it.

use crate::error::{ClientError, Result};
use crate::event::{
    decode_rate_model_update, decode_rebalance_route, EventKind,
};
use crate::lifecycle::{resolve_search_window, SearchCursor, SearchWindow, UpdateStatus};
use crate::lpfee::{self, RateModel};
use crate::pagination::RangeQueryEngine;
use crate::source::{EventFilter, HubSources};
use crate::types::{sort_canonical, Deposit, EventMeta, PoolRebalanceRoute, RateModelUpdate};
use alloy_primitives::{Address, U256};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// Per-deposit result of the batched fee computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LpFeeQuote {
    /// Realized LP fee pct, wad
    pub realized_lp_fee_pct: U256,
    /// Hub block whose state governed the quote
    pub quote_block: u64,
}

/// Client over the hub contract's route and config history.
pub struct HubClient {
    chain_id: u64,
    address: Address,
    deployment_block: u64,
    sources: HubSources,
    engine: RangeQueryEngine,

    status: UpdateStatus,
    cursor: SearchCursor,

    /// Route-setting history per `(l1_token, destination_chain_id)`,
    /// ascending by block
    routes: HashMap<(Address, u64), Vec<PoolRebalanceRoute>>,
    /// Inverse index per `(destination_chain_id, destination_token)`,
    /// ascending by block
    inverse_routes: HashMap<(u64, Address), Vec<PoolRebalanceRoute>>,
    /// Config history per l1 token, ascending by block
    configs: HashMap<Address, Vec<RateModelUpdate>>,
    /// Provenance of every ingested event, for idempotent re-runs
    seen: HashSet<EventMeta>,
}

impl HubClient {
    pub fn new(
        chain_id: u64,
        address: Address,
        deployment_block: u64,
        sources: HubSources,
        max_lookback: Option<u64>,
    ) -> Self {
        let engine = RangeQueryEngine::new(sources.logs.clone(), max_lookback);
        Self {
            chain_id,
            address,
            deployment_block,
            sources,
            engine,
            status: UpdateStatus::NotUpdated,
            cursor: SearchCursor::new(deployment_block),
            routes: HashMap::new(),
            inverse_routes: HashMap::new(),
            configs: HashMap::new(),
            seen: HashSet::new(),
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

    pub fn deployment_block(&self) -> u64 {
        self.deployment_block
    }

    pub fn is_updated(&self) -> bool {
        self.status.is_updated()
    }

    pub fn latest_height_searched(&self) -> Option<u64> {
        self.cursor.latest_height_searched
    }

    /// Default query block when a caller passes none: the end of ingested
    /// history.
    fn latest_block(&self) -> u64 {
        self.cursor.latest_height_searched.unwrap_or(0)
    }

    /// Fetch and ingest all route and config events past the cursor.
    ///
    /// Idempotent: a re-run with no new events changes nothing, and an
    /// event already ingested (by block/tx/log identity) is never applied
    /// twice regardless of how the range was chunked.
    pub async fn update(&mut self, to: Option<u64>) -> Result<()> {
        let window =
            resolve_search_window(&self.cursor, to, self.sources.head.as_ref()).await?;
        let SearchWindow::Range { from, to } = window else {
            debug!(chain = self.chain_id, "hub already up to date");
            return Ok(());
        };

        // Fan out both event queries; nothing mutates until both succeed.
        let route_filter = EventFilter {
            kind: EventKind::SetPoolRebalanceRoute,
            address: self.address,
        };
        let config_filter = EventFilter {
            kind: EventKind::UpdatedRateModel,
            address: self.address,
        };
        let (route_raw, config_raw) = futures::try_join!(
            self.engine.query(&route_filter, from, to),
            self.engine.query(&config_filter, from, to),
        )?;

        let mut routes = route_raw
            .iter()
            .map(decode_rebalance_route)
            .collect::<Result<Vec<_>>>()?;
        let mut configs = config_raw
            .iter()
            .map(decode_rate_model_update)
            .collect::<Result<Vec<_>>>()?;
        sort_canonical(&mut routes);
        sort_canonical(&mut configs);

        let mut new_routes = 0usize;
        for route in routes {
            if !self.seen.insert(route.meta) {
                continue;
            }
            self.inverse_routes
                .entry((route.destination_chain_id, route.destination_token))
                .or_default()
                .push(route.clone());
            self.routes
                .entry((route.l1_token, route.destination_chain_id))
                .or_default()
                .push(route);
            new_routes += 1;
        }
        let mut new_configs = 0usize;
        for config in configs {
            if !self.seen.insert(config.meta) {
                continue;
            }
            self.configs
                .entry(config.l1_token)
                .or_default()
                .push(config);
            new_configs += 1;
        }

        self.cursor.advance(to);
        self.status.mark_updated();
        info!(
            chain = self.chain_id,
            from, to, new_routes, new_configs, "hub client updated"
        );
        Ok(())
    }

    /// The L2 token `l1_token` mapped to on `destination_chain_id`, as of
    /// `block`. The entry in effect is the one from the greatest event
    /// block ≤ `block`; a query before the first route-setting event fails.
    pub fn get_l2_token_for_l1_token_at_block(
        &self,
        l1_token: Address,
        destination_chain_id: u64,
        block: u64,
    ) -> Result<Address> {
        self.routes
            .get(&(l1_token, destination_chain_id))
            .and_then(|history| effective_entry(history, block))
            .map(|route| route.destination_token)
            .ok_or(ClientError::MappingNotFound {
                token: l1_token,
                chain_id: destination_chain_id,
                block,
            })
    }

    /// Inverse of [`get_l2_token_for_l1_token_at_block`].
    pub fn get_l1_token_for_l2_token_at_block(
        &self,
        l2_token: Address,
        chain_id: u64,
        block: u64,
    ) -> Result<Address> {
        self.inverse_routes
            .get(&(chain_id, l2_token))
            .and_then(|history| effective_entry(history, block))
            .map(|route| route.l1_token)
            .ok_or(ClientError::MappingNotFound {
                token: l2_token,
                chain_id,
                block,
            })
    }

    /// The hub-chain token backing a deposit's input token, as of the
    /// deposit's quote block (or the end of ingested history if the quote
    /// block has not been resolved yet).
    pub fn get_l1_token_for_deposit(&self, deposit: &Deposit) -> Result<Address> {
        let block = deposit.quote_block_number.unwrap_or(self.latest_block());
        self.get_l1_token_for_l2_token_at_block(
            deposit.input_token,
            deposit.origin_chain_id,
            block,
        )
    }

    /// The destination-chain token a deposit pays out in, resolved through
    /// the hub route table as of the deposit's quote block.
    pub fn get_l2_token_for_deposit(&self, deposit: &Deposit) -> Result<Address> {
        let block = deposit.quote_block_number.unwrap_or(self.latest_block());
        let l1_token = self.get_l1_token_for_deposit(deposit)?;
        self.get_l2_token_for_l1_token_at_block(l1_token, deposit.destination_chain_id, block)
    }

    /// Whether two chain-scoped tokens resolve to the same L1 token as of
    /// `block` (default: end of ingested history). A predicate, not an
    /// assertion: missing mappings yield `false`, never an error.
    pub fn are_tokens_equivalent(
        &self,
        token_a: Address,
        chain_a: u64,
        token_b: Address,
        chain_b: u64,
        block: Option<u64>,
    ) -> bool {
        let block = block.unwrap_or(self.latest_block());
        let a = self.get_l1_token_for_l2_token_at_block(token_a, chain_a, block);
        let b = self.get_l1_token_for_l2_token_at_block(token_b, chain_b, block);
        match (a, b) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }

    /// The rate model governing `l1_token` for the given route as of
    /// `block`: the per-route override if the effective config carries one,
    /// else its default model.
    pub fn get_rate_model_at_block(
        &self,
        l1_token: Address,
        origin_chain_id: u64,
        destination_chain_id: u64,
        block: u64,
    ) -> Result<RateModel> {
        let config = self
            .configs
            .get(&l1_token)
            .and_then(|history| effective_entry(history, block))
            .ok_or(ClientError::ConfigNotFound { block })?;
        let override_model = config.route_rate_models.iter().find(|r| {
            r.origin_chain_id == origin_chain_id
                && r.destination_chain_id == destination_chain_id
        });
        Ok(override_model
            .map(|r| r.rate_model)
            .unwrap_or(config.rate_model))
    }

    /// Compute realized LP fee quotes for a batch of deposits.
    ///
    /// Batching only shares the quote-timestamp → block resolution; each
    /// item's result is identical to computing it alone.
    pub async fn batch_compute_realized_lp_fee_pct(
        &self,
        deposits: &[Deposit],
    ) -> Result<Vec<LpFeeQuote>> {
        // Resolve each distinct quote timestamp once.
        let mut quote_blocks: HashMap<u64, u64> = HashMap::new();
        for deposit in deposits {
            if quote_blocks.contains_key(&deposit.quote_timestamp) {
                continue;
            }
            let block = self
                .sources
                .block_time
                .block_at_or_before_timestamp(deposit.quote_timestamp)
                .await
                .map_err(ClientError::Oracle)?;
            quote_blocks.insert(deposit.quote_timestamp, block);
        }

        let mut quotes = Vec::with_capacity(deposits.len());
        for deposit in deposits {
            let quote_block = quote_blocks[&deposit.quote_timestamp];
            let l1_token = self.get_l1_token_for_l2_token_at_block(
                deposit.input_token,
                deposit.origin_chain_id,
                quote_block,
            )?;
            let model = self.get_rate_model_at_block(
                l1_token,
                deposit.origin_chain_id,
                deposit.destination_chain_id,
                quote_block,
            )?;
            let (util_before, util_after) = self
                .sources
                .utilization
                .utilization(l1_token, quote_block, deposit.input_amount)
                .await
                .map_err(ClientError::Oracle)?;
            quotes.push(LpFeeQuote {
                realized_lp_fee_pct: lpfee::realized_lp_fee_pct(&model, util_before, util_after),
                quote_block,
            });
        }
        Ok(quotes)
    }
}

/// The entry in effect at `block`: the last one whose event block is
/// ≤ `block`. Histories are ascending by block, so scan from the back.
fn effective_entry<T: crate::types::Provenance>(history: &[T], block: u64) -> Option<&T> {
    history
        .iter()
        .rev()
        .find(|entry| entry.meta().block_number <= block)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{rate_model_event, rebalance_route_event, MockChain};
    use alloy_primitives::address;
    use std::sync::Arc;

    const HUB_CHAIN: u64 = 1;
    const SPOKE_CHAIN: u64 = 10;

    fn l1_token() -> Address {
        address!("1000000000000000000000000000000000000001")
    }

    fn l2_token() -> Address {
        address!("2000000000000000000000000000000000000002")
    }

    fn hub_with_chain(chain: &Arc<MockChain>) -> HubClient {
        HubClient::new(
            HUB_CHAIN,
            Address::ZERO,
            0,
            chain.sources_for_hub(),
            None,
        )
    }

    #[tokio::test]
    async fn test_update_ingests_routes() {
        let chain = Arc::new(MockChain::new());
        chain.push_event(rebalance_route_event(l1_token(), SPOKE_CHAIN, l2_token(), 50, 0));
        chain.set_head(100);

        let mut hub = hub_with_chain(&chain);
        assert!(!hub.is_updated());
        hub.update(None).await.unwrap();
        assert!(hub.is_updated());
        assert_eq!(hub.latest_height_searched(), Some(100));

        let token = hub
            .get_l2_token_for_l1_token_at_block(l1_token(), SPOKE_CHAIN, 100)
            .unwrap();
        assert_eq!(token, l2_token());
    }

    #[tokio::test]
    async fn test_as_of_block_semantics() {
        let chain = Arc::new(MockChain::new());
        let new_l2 = address!("3000000000000000000000000000000000000003");
        chain.push_event(rebalance_route_event(l1_token(), SPOKE_CHAIN, l2_token(), 50, 0));
        chain.push_event(rebalance_route_event(l1_token(), SPOKE_CHAIN, new_l2, 70, 0));
        chain.set_head(100);

        let mut hub = hub_with_chain(&chain);
        hub.update(None).await.unwrap();

        // At the exact event block the new mapping is in effect.
        assert_eq!(
            hub.get_l2_token_for_l1_token_at_block(l1_token(), SPOKE_CHAIN, 70)
                .unwrap(),
            new_l2
        );
        // One block earlier the prior mapping holds.
        assert_eq!(
            hub.get_l2_token_for_l1_token_at_block(l1_token(), SPOKE_CHAIN, 69)
                .unwrap(),
            l2_token()
        );
        // Before the first event there is no mapping at all.
        let err = hub
            .get_l2_token_for_l1_token_at_block(l1_token(), SPOKE_CHAIN, 49)
            .unwrap_err();
        assert!(matches!(err, ClientError::MappingNotFound { block: 49, .. }));
    }

    #[tokio::test]
    async fn test_inverse_lookup() {
        let chain = Arc::new(MockChain::new());
        chain.push_event(rebalance_route_event(l1_token(), SPOKE_CHAIN, l2_token(), 50, 0));
        chain.set_head(100);

        let mut hub = hub_with_chain(&chain);
        hub.update(None).await.unwrap();

        assert_eq!(
            hub.get_l1_token_for_l2_token_at_block(l2_token(), SPOKE_CHAIN, 100)
                .unwrap(),
            l1_token()
        );
    }

    #[tokio::test]
    async fn test_update_is_idempotent() {
        let chain = Arc::new(MockChain::new());
        chain.push_event(rebalance_route_event(l1_token(), SPOKE_CHAIN, l2_token(), 50, 0));
        chain.set_head(100);

        let mut hub = hub_with_chain(&chain);
        hub.update(None).await.unwrap();
        let history_len = hub.routes[&(l1_token(), SPOKE_CHAIN)].len();

        // No new blocks: benign no-op.
        hub.update(None).await.unwrap();
        assert_eq!(hub.routes[&(l1_token(), SPOKE_CHAIN)].len(), history_len);

        // New head but no new events: still no duplicates.
        chain.set_head(120);
        hub.update(None).await.unwrap();
        assert_eq!(hub.routes[&(l1_token(), SPOKE_CHAIN)].len(), history_len);
    }

    #[tokio::test]
    async fn test_chunked_replay_matches_single_shot() {
        let chain = Arc::new(MockChain::new());
        chain.push_event(rebalance_route_event(l1_token(), SPOKE_CHAIN, l2_token(), 10, 0));
        chain.push_event(rebalance_route_event(
            l1_token(),
            SPOKE_CHAIN,
            address!("3000000000000000000000000000000000000003"),
            60,
            0,
        ));
        chain.set_head(100);

        let mut single = hub_with_chain(&chain);
        single.update(None).await.unwrap();

        let mut chunked = hub_with_chain(&chain);
        chunked.update(Some(30)).await.unwrap();
        chunked.update(Some(75)).await.unwrap();
        chunked.update(None).await.unwrap();

        assert_eq!(
            single.routes[&(l1_token(), SPOKE_CHAIN)],
            chunked.routes[&(l1_token(), SPOKE_CHAIN)]
        );
    }

    #[tokio::test]
    async fn test_are_tokens_equivalent_is_a_predicate() {
        let chain = Arc::new(MockChain::new());
        chain.push_event(rebalance_route_event(l1_token(), SPOKE_CHAIN, l2_token(), 50, 0));
        chain.set_head(100);

        let mut hub = hub_with_chain(&chain);
        hub.update(None).await.unwrap();

        // l2 on spoke ↔ itself
        assert!(hub.are_tokens_equivalent(
            l2_token(),
            SPOKE_CHAIN,
            l2_token(),
            SPOKE_CHAIN,
            None
        ));
        // Unknown token: false, not an error.
        assert!(!hub.are_tokens_equivalent(
            l2_token(),
            SPOKE_CHAIN,
            address!("00000000000000000000000000000000000000ff"),
            SPOKE_CHAIN,
            None
        ));
        // Known mapping but queried before it existed: false.
        assert!(!hub.are_tokens_equivalent(
            l2_token(),
            SPOKE_CHAIN,
            l2_token(),
            SPOKE_CHAIN,
            Some(10)
        ));
    }

    #[tokio::test]
    async fn test_rate_model_route_override() {
        let chain = Arc::new(MockChain::new());
        let default_model = RateModel {
            ubar: U256::from(650_000_000_000_000_000u64),
            r0: U256::from(1_000),
            r1: U256::ZERO,
            r2: U256::ZERO,
        };
        let override_model = RateModel {
            ubar: U256::from(650_000_000_000_000_000u64),
            r0: U256::from(9_999),
            r1: U256::ZERO,
            r2: U256::ZERO,
        };
        chain.push_event(rate_model_event(
            l1_token(),
            default_model,
            vec![((5, SPOKE_CHAIN), override_model)],
            40,
            0,
        ));
        chain.set_head(100);

        let mut hub = hub_with_chain(&chain);
        hub.update(None).await.unwrap();

        let model = hub
            .get_rate_model_at_block(l1_token(), HUB_CHAIN, SPOKE_CHAIN, 90)
            .unwrap();
        assert_eq!(model.r0, U256::from(1_000));

        let model = hub
            .get_rate_model_at_block(l1_token(), 5, SPOKE_CHAIN, 90)
            .unwrap();
        assert_eq!(model.r0, U256::from(9_999));

        let err = hub
            .get_rate_model_at_block(l1_token(), HUB_CHAIN, SPOKE_CHAIN, 10)
            .unwrap_err();
        assert!(matches!(err, ClientError::ConfigNotFound { block: 10 }));
    }

    #[tokio::test]
    async fn test_batch_fee_computation() {
        let chain = Arc::new(MockChain::new());
        let model = RateModel {
            ubar: U256::from(650_000_000_000_000_000u64),
            r0: U256::from(12_345),
            r1: U256::ZERO,
            r2: U256::ZERO,
        };
        chain.push_event(rebalance_route_event(l1_token(), SPOKE_CHAIN, l2_token(), 10, 0));
        chain.push_event(rebalance_route_event(l1_token(), HUB_CHAIN, l1_token(), 10, 1));
        chain.push_event(rate_model_event(l1_token(), model, vec![], 10, 2));
        chain.set_block_timestamp(40, 1_700_000_000);
        chain.set_head(100);

        let mut hub = hub_with_chain(&chain);
        hub.update(None).await.unwrap();

        let deposit = crate::testutil::sample_deposit(5, HUB_CHAIN, SPOKE_CHAIN, l1_token());
        let quotes = hub
            .batch_compute_realized_lp_fee_pct(std::slice::from_ref(&deposit))
            .await
            .unwrap();
        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes[0].quote_block, 40);
        // Flat utilization: the fee is exactly the base rate.
        assert_eq!(quotes[0].realized_lp_fee_pct, U256::from(12_345));

        // Batching is pure efficiency: a two-item batch gives the same
        // per-item result.
        let quotes2 = hub
            .batch_compute_realized_lp_fee_pct(&[deposit.clone(), deposit])
            .await
            .unwrap();
        assert_eq!(quotes2[0], quotes[0]);
        assert_eq!(quotes2[1], quotes[0]);
    }
}
