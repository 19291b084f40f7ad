//! # Market Contract
//!
//! Deterministic market logic: validates operations, mutates market
//! records, computes payouts. Mutating operations arrive through a
//! replicated, totally ordered command log, so every peer applying the
//! same operations against the same store derives byte-identical state.
//!
//! The contract is the sole writer of market and index records. Mutations
//! on the same market are serialized through a per-market lock table; the
//! original single-threaded host got this for free, here it is explicit so
//! a scheduler pass and an incoming command cannot interleave their
//! read-modify-write cycles.

use crate::clock::Clock;
use crate::error::{MarketError, Result};
use crate::market::{
    Category, DueTransition, Market, MarketState, MarketSummary, Outcome, Side, StakeView,
};
use crate::store::{relock, MarketIndex, MarketStore};
use crate::{DEFAULT_CLOSES_IN_SECS, DEFAULT_LIST_LIMIT, DEFAULT_RESOLVE_BY_SECS, MAX_LIST_LIMIT};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Result of a successful stake.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct StakeReceipt {
    pub market_id: String,
    pub side: Side,
    pub amount: u64,
    pub yes_pool: u64,
    pub no_pool: u64,
}

/// Result of a successful resolution.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ResolveReceipt {
    pub market_id: String,
    pub outcome: Outcome,
    pub yes_pool: u64,
    pub no_pool: u64,
}

/// Result of a successful claim. The value transfer itself happens in the
/// router, after this receipt is returned.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ClaimReceipt {
    pub market_id: String,
    pub claimant: String,
    pub payout: u64,
}

/// Filter for market listings.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ListFilter {
    pub category: Option<Category>,
    pub state: Option<MarketState>,
    pub limit: Option<usize>,
}

/// Validated market operations over a [`MarketStore`].
pub struct MarketContract {
    store: MarketStore,
    clock: Arc<dyn Clock>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl MarketContract {
    pub fn new(store: MarketStore, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Create a new market and index it.
    pub fn create(
        &self,
        creator: &str,
        question: &str,
        category: Category,
        closes_in: Option<u64>,
        resolve_by: Option<u64>,
        oracle_address: &str,
    ) -> Result<Market> {
        let now = self.clock.now_ms();
        let market = Market::new(
            Uuid::new_v4().to_string(),
            creator.to_string(),
            question,
            category,
            oracle_address.to_string(),
            closes_in.unwrap_or(DEFAULT_CLOSES_IN_SECS),
            resolve_by.unwrap_or(DEFAULT_RESOLVE_BY_SECS),
            now,
        )?;
        self.store.save_market(&market)?;
        self.store
            .insert_index_entry(&market.id, market.state, market.category)?;
        Ok(market)
    }

    /// Stake on one side of an open market.
    pub fn stake(
        &self,
        staker: &str,
        market_id: &str,
        side: Side,
        amount: u64,
    ) -> Result<StakeReceipt> {
        let lock = self.market_lock(market_id);
        let _guard = relock(lock.lock());
        let now = self.clock.now_ms();

        let mut market = self.require_market(market_id)?;
        self.close_if_due_locked(&mut market, now)?;
        market.record_stake(staker, side, amount, now)?;
        self.store.save_market(&market)?;

        Ok(StakeReceipt {
            market_id: market.id,
            side,
            amount,
            yes_pool: market.yes_pool,
            no_pool: market.no_pool,
        })
    }

    /// Resolve a market. Only the designated oracle may do this, only once.
    pub fn resolve(
        &self,
        resolver: &str,
        market_id: &str,
        outcome: Outcome,
    ) -> Result<ResolveReceipt> {
        let lock = self.market_lock(market_id);
        let _guard = relock(lock.lock());
        let now = self.clock.now_ms();

        let mut market = self.require_market(market_id)?;
        self.close_if_due_locked(&mut market, now)?;
        market.record_resolution(resolver, outcome, now)?;
        self.store.save_market(&market)?;
        self.store.update_index_state(&market.id, market.state)?;

        Ok(ResolveReceipt {
            market_id: market.id,
            outcome,
            yes_pool: market.yes_pool,
            no_pool: market.no_pool,
        })
    }

    /// Claim the payout owed to `claimant` on a settled market.
    pub fn claim(&self, claimant: &str, market_id: &str) -> Result<ClaimReceipt> {
        let lock = self.market_lock(market_id);
        let _guard = relock(lock.lock());
        let now = self.clock.now_ms();

        let mut market = self.require_market(market_id)?;
        self.close_if_due_locked(&mut market, now)?;
        let payout = market.record_claim(claimant, now)?;
        self.store.save_market(&market)?;

        Ok(ClaimReceipt {
            market_id: market.id,
            claimant: claimant.to_string(),
            payout,
        })
    }

    /// Close an open market whose staking deadline has passed.
    ///
    /// Returns the updated market when the transition fired. Idempotent;
    /// safe to call from both command handling and the scheduler pass.
    pub fn close_if_due(&self, market_id: &str) -> Result<Option<Market>> {
        let lock = self.market_lock(market_id);
        let _guard = relock(lock.lock());
        let now = self.clock.now_ms();

        let Some(mut market) = self.store.load_market(market_id)? else {
            return Ok(None);
        };
        Ok(self
            .close_if_due_locked(&mut market, now)?
            .then_some(market))
    }

    /// Void a closed market whose oracle missed the resolution deadline.
    ///
    /// Returns the updated market when the transition fired. Deadline
    /// misses are applied only from the scheduler pass, so a late oracle
    /// can still resolve until the next tick.
    pub fn void_if_overdue(&self, market_id: &str) -> Result<Option<Market>> {
        let lock = self.market_lock(market_id);
        let _guard = relock(lock.lock());
        let now = self.clock.now_ms();

        let Some(mut market) = self.store.load_market(market_id)? else {
            return Ok(None);
        };
        if market.due_transition(now) != Some(DueTransition::Void) {
            return Ok(None);
        }
        market.apply_transition(DueTransition::Void, now);
        self.store.save_market(&market)?;
        self.store.update_index_state(&market.id, market.state)?;
        tracing::info!(market_id = %market.id, "voided market, oracle missed deadline");
        Ok(Some(market))
    }

    /// List market summaries, newest first.
    pub fn list(&self, filter: &ListFilter) -> Result<Vec<MarketSummary>> {
        let index = self.store.load_index()?;
        let limit = filter
            .limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .min(MAX_LIST_LIMIT);

        let ids = index
            .iter()
            .filter(|(_, entry)| {
                filter.category.map_or(true, |c| entry.category == c)
                    && filter.state.map_or(true, |s| entry.state == s)
            })
            .map(|(id, _)| id)
            .take(limit);

        let mut summaries = Vec::new();
        for id in ids {
            if let Some(market) = self.store.load_market(id)? {
                summaries.push(market.summary());
            }
        }
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(summaries)
    }

    /// Load one market, if it exists.
    pub fn get(&self, market_id: &str) -> Result<Option<Market>> {
        self.store.load_market(market_id)
    }

    /// Every market where `address` has a nonzero stake on either side.
    pub fn stakes_of(&self, address: &str) -> Result<Vec<StakeView>> {
        let index = self.store.load_index()?;
        let mut views = Vec::new();
        for id in index.keys() {
            let Some(market) = self.store.load_market(id)? else {
                continue;
            };
            let view = market.stake_view(address);
            if view.your_yes > 0 || view.your_no > 0 {
                views.push(view);
            }
        }
        Ok(views)
    }

    /// Current index snapshot.
    pub fn index(&self) -> Result<MarketIndex> {
        self.store.load_index()
    }

    fn require_market(&self, market_id: &str) -> Result<Market> {
        self.store
            .load_market(market_id)?
            .ok_or_else(|| MarketError::NotFound(market_id.to_string()))
    }

    /// Apply the close arm of the due transitions to an already-locked
    /// market, persisting market and index when it fires.
    fn close_if_due_locked(&self, market: &mut Market, now: i64) -> Result<bool> {
        if market.due_transition(now) != Some(DueTransition::Close) {
            return Ok(false);
        }
        market.apply_transition(DueTransition::Close, now);
        self.store.save_market(market)?;
        self.store.update_index_state(&market.id, market.state)?;
        tracing::info!(market_id = %market.id, "closed staking on market");
        Ok(true)
    }

    /// Lock handle for one market id. Handles live for the life of the
    /// contract; markets are never deleted, so the table only grows with
    /// the market set.
    fn market_lock(&self, market_id: &str) -> Arc<Mutex<()>> {
        let mut table = relock(self.locks.lock());
        table
            .entry(market_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
