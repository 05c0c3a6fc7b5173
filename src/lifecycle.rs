//! Client lifecycle and search-window bookkeeping
//!
//! Every client follows the same two-state lifecycle: not-updated until the
//! first successful `update()`, then updated forever. The search cursor
//! tracks the block window already ingested so successive updates only
//! fetch new history.

use crate::error::{ClientError, Result};
use crate::source::HeadOracle;

/// One-way update status. `Updated → NotUpdated` is not a legal transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStatus {
    NotUpdated,
    Updated,
}

impl UpdateStatus {
    pub fn is_updated(&self) -> bool {
        matches!(self, UpdateStatus::Updated)
    }

    /// Record a successful update. Idempotent.
    pub fn mark_updated(&mut self) {
        *self = UpdateStatus::Updated;
    }

    /// Set the flag explicitly. Clearing an already-updated client is a
    /// programmer error and fails with `InvalidStateTransition`.
    pub fn set(&mut self, updated: bool) -> Result<()> {
        if !updated && self.is_updated() {
            return Err(ClientError::InvalidStateTransition);
        }
        if updated {
            self.mark_updated();
        }
        Ok(())
    }
}

/// Block-window bookkeeping shared by all clients.
///
/// `first_height_to_search` only ever advances; it is moved to one past the
/// end of each successfully ingested window.
#[derive(Debug, Clone, Copy)]
pub struct SearchCursor {
    pub first_height_to_search: u64,
    /// End of the last ingested window; `None` until the first ingestion.
    pub latest_height_searched: Option<u64>,
}

impl SearchCursor {
    pub fn new(deployment_block: u64) -> Self {
        Self {
            first_height_to_search: deployment_block,
            latest_height_searched: None,
        }
    }

    /// Advance past a successfully ingested window ending at `search_end`.
    pub fn advance(&mut self, search_end: u64) {
        self.latest_height_searched = Some(search_end);
        self.first_height_to_search = search_end + 1;
    }
}

/// Outcome of resolving a client's next search window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchWindow {
    /// Inclusive block range to ingest.
    Range { from: u64, to: u64 },
    /// The chain has produced nothing past the cursor; a safe no-op.
    NothingToUpdate,
}

/// Resolve the next search window for a client.
///
/// An explicit upper bound below the cursor is a caller error. Without an
/// explicit bound the live chain head is used; a head that merely has not
/// advanced is benign, but a head strictly below already-ingested history
/// means the chain view moved backward and the cycle must abort.
pub async fn resolve_search_window(
    cursor: &SearchCursor,
    explicit_to: Option<u64>,
    head: &dyn HeadOracle,
) -> Result<SearchWindow> {
    let from = cursor.first_height_to_search;
    if let Some(to) = explicit_to {
        if to < from {
            return Err(ClientError::InvalidSearchWindow { from, to });
        }
        return Ok(SearchWindow::Range { from, to });
    }

    let head = head.current_height().await.map_err(ClientError::Oracle)?;
    if let Some(searched) = cursor.latest_height_searched {
        if head < searched {
            return Err(ClientError::StaleChainHead { head, searched });
        }
    }
    if head < from {
        return Ok(SearchWindow::NothingToUpdate);
    }
    Ok(SearchWindow::Range { from, to: head })
}
