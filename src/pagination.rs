//! Paginated range query engine
//!
//! Splits a block range into lookback-sized sub-ranges, issues the
//! sub-queries concurrently with bounded fixed-delay retries, and filters
//! the merged results back to the exact requested range. Sub-range starts
//! are aligned to lookback multiples so repeated calls with different
//! starting points hit the same cache keys.

use crate::cache::Cache;
use crate::error::{ClientError, Result};
use crate::event::RawEvent;
use crate::source::{EventFilter, LogSource};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Total attempts per sub-range query before the cycle is aborted.
pub const QUERY_ATTEMPTS: u32 = 3;

/// Fixed delay between attempts. Not exponential: transient RPC failures
/// clear quickly or not at all within one update cycle.
pub const RETRY_DELAY: Duration = Duration::from_millis(250);

/// TTL for cached sub-range results.
const CACHE_TTL: Duration = Duration::from_secs(600);

/// Partition `[from, to]` into inclusive sub-ranges of `max_lookback`
/// blocks, aligned to lookback multiples.
///
/// The first sub-range may extend below `from`; the last is clamped to
/// `to`. With no lookback the whole range is one query. An explicit zero
/// lookback is a caller contract violation, pagination is disabled by
/// omitting the lookback entirely.
pub fn get_paginated_block_ranges(
    from: u64,
    to: u64,
    max_lookback: Option<u64>,
) -> Result<Vec<(u64, u64)>> {
    if from > to {
        return Err(ClientError::InvalidSearchWindow { from, to });
    }
    let lookback = match max_lookback {
        None => return Ok(vec![(from, to)]),
        Some(0) => return Err(ClientError::InvalidLookback),
        Some(n) => n,
    };

    let mut ranges = Vec::new();
    let mut lo = (from / lookback) * lookback;
    while lo <= to {
        let hi = (lo + lookback - 1).min(to);
        ranges.push((lo, hi));
        lo = hi + 1;
    }
    Ok(ranges)
}

/// Engine issuing paginated, retried, cache-assisted log queries.
pub struct RangeQueryEngine {
    source: Arc<dyn LogSource>,
    max_lookback: Option<u64>,
    attempts: u32,
    retry_delay: Duration,
    cache: Option<Arc<dyn Cache>>,
}

impl RangeQueryEngine {
    pub fn new(source: Arc<dyn LogSource>, max_lookback: Option<u64>) -> Self {
        Self {
            source,
            max_lookback,
            attempts: QUERY_ATTEMPTS,
            retry_delay: RETRY_DELAY,
            cache: None,
        }
    }

    /// Attach an advisory cache for aligned full-width sub-ranges.
    pub fn with_cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    #[cfg(test)]
    pub fn with_retry(mut self, attempts: u32, retry_delay: Duration) -> Self {
        self.attempts = attempts;
        self.retry_delay = retry_delay;
        self
    }

    /// Fetch all events matching `filter` in `[from, to]`.
    ///
    /// Results are exact for the requested range but carry no ordering
    /// guarantee; sorting is the caller's responsibility. Any sub-query
    /// failing after its retry budget aborts the whole call with no partial
    /// results.
    pub async fn query(&self, filter: &EventFilter, from: u64, to: u64) -> Result<Vec<RawEvent>> {
        let ranges = get_paginated_block_ranges(from, to, self.max_lookback)?;
        debug!(
            event = filter.kind.as_str(),
            from,
            to,
            sub_ranges = ranges.len(),
            "querying log range"
        );

        let futures = ranges
            .iter()
            .map(|&(lo, hi)| self.query_sub_range(filter, lo, hi));
        let results = futures::future::try_join_all(futures).await?;

        // Over-fetch from alignment is internal; trim to the true range.
        let events = results
            .into_iter()
            .flatten()
            .filter(|e| e.block_number >= from && e.block_number <= to)
            .collect();
        Ok(events)
    }

    async fn query_sub_range(
        &self,
        filter: &EventFilter,
        from: u64,
        to: u64,
    ) -> Result<Vec<RawEvent>> {
        // Only aligned full-width sub-ranges are cacheable: the clamped tail
        // range grows as the chain advances.
        let cache_key = match self.max_lookback {
            Some(n) if from % n == 0 && to == from + n - 1 => Some(format!(
                "logs:{}:{}:{}-{}",
                filter.address,
                filter.kind.as_str(),
                from,
                to
            )),
            _ => None,
        };

        if let (Some(cache), Some(key)) = (&self.cache, &cache_key) {
            if let Some(bytes) = cache.get(key) {
                if let Ok(events) = serde_json::from_slice::<Vec<RawEvent>>(&bytes) {
                    debug!(key = %key, "sub-range served from cache");
                    return Ok(events);
                }
            }
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.source.query_logs(filter, from, to).await {
                Ok(events) => {
                    if let (Some(cache), Some(key)) = (&self.cache, &cache_key) {
                        if let Ok(bytes) = serde_json::to_vec(&events) {
                            cache.set(key, bytes, Some(CACHE_TTL));
                        }
                    }
                    return Ok(events);
                }
                Err(err) if attempt < self.attempts => {
                    warn!(
                        event = filter.kind.as_str(),
                        from,
                        to,
                        attempt,
                        error = %err,
                        "sub-range query failed, retrying"
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(err) => {
                    return Err(ClientError::RangeQueryFailure {
                        from,
                        to,
                        attempts: attempt,
                        source: err,
                    });
                }
            }
        }
    }
}
