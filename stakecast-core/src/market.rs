//! # Market Aggregate
//!
//! The `Market` struct is the sole persisted aggregate: a binary prediction
//! contract with its own stake pools, deadlines, and lifecycle state. All
//! mutation happens through the methods in this module so the pool
//! invariants (`yes_pool == Σ yes_stakers`, symmetrically for no) hold at
//! every observation point.

use crate::error::{MarketError, Result};
use crate::{
    MAX_CLOSES_IN_SECS, MAX_RESOLVE_BY_SECS, MIN_CLOSES_IN_SECS, MIN_RESOLVE_BY_SECS,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a market.
///
/// `Resolved` and `Void` are terminal; a market is never deleted and stays
/// queryable after reaching either.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MarketState {
    Open,
    Closed,
    Resolved,
    Void,
}

impl MarketState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Resolved => "resolved",
            Self::Void => "void",
        }
    }
}

impl fmt::Display for MarketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MarketState {
    type Err = MarketError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "open" => Ok(Self::Open),
            "closed" => Ok(Self::Closed),
            "resolved" => Ok(Self::Resolved),
            "void" => Ok(Self::Void),
            other => Err(MarketError::Validation(format!(
                "unknown market state: {other}"
            ))),
        }
    }
}

/// Side of a market a stake is placed on.
///
/// An explicit two-armed enum so an invalid side can never reach pool or
/// storage logic.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Yes,
    No,
}

impl Side {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Yes => "yes",
            Self::No => "no",
        }
    }

    pub const fn opposite(self) -> Self {
        match self {
            Self::Yes => Self::No,
            Self::No => Self::Yes,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = MarketError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "yes" => Ok(Self::Yes),
            "no" => Ok(Self::No),
            _ => Err(MarketError::Validation(
                "side must be 'yes' or 'no'".to_string(),
            )),
        }
    }
}

/// Resolution outcome, set exactly once.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Yes,
    No,
    Void,
}

impl Outcome {
    /// The side that wins under this outcome, if any.
    pub const fn winning_side(self) -> Option<Side> {
        match self {
            Self::Yes => Some(Side::Yes),
            Self::No => Some(Side::No),
            Self::Void => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Yes => "yes",
            Self::No => "no",
            Self::Void => "void",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Outcome {
    type Err = MarketError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "yes" => Ok(Self::Yes),
            "no" => Ok(Self::No),
            "void" => Ok(Self::Void),
            _ => Err(MarketError::Validation(
                "outcome must be 'yes', 'no', or 'void'".to_string(),
            )),
        }
    }
}

/// Fixed market categories.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Crypto,
    Sports,
    Politics,
    Science,
    Tech,
    Other,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Self::Crypto,
        Self::Sports,
        Self::Politics,
        Self::Science,
        Self::Tech,
        Self::Other,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Crypto => "crypto",
            Self::Sports => "sports",
            Self::Politics => "politics",
            Self::Science => "science",
            Self::Tech => "tech",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = MarketError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "crypto" => Ok(Self::Crypto),
            "sports" => Ok(Self::Sports),
            "politics" => Ok(Self::Politics),
            "science" => Ok(Self::Science),
            "tech" => Ok(Self::Tech),
            "other" => Ok(Self::Other),
            _ => Err(MarketError::Validation(format!(
                "category must be one of: {}",
                Category::ALL.map(|c| c.as_str()).join(", ")
            ))),
        }
    }
}

/// Time-driven transition a market is due for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DueTransition {
    /// `Open` past `closes_at`: staking closes.
    Close,
    /// `Closed` past `resolve_at`: oracle missed the deadline, market voids.
    Void,
}

/// A binary prediction market.
///
/// Stakers back `yes` or `no` before `closes_at`; the designated oracle
/// resolves the outcome before `resolve_at`; winners then claim a
/// proportional share of the combined pools. All timestamps are epoch
/// milliseconds.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Market {
    /// Unique market identifier, assigned at creation
    pub id: String,

    /// Address that created the market
    pub creator: String,

    /// Market question (trimmed, at least 10 characters)
    pub question: String,

    /// Market category
    pub category: Category,

    /// The only address allowed to resolve this market
    pub oracle_address: String,

    /// Lifecycle state
    pub state: MarketState,

    /// Resolution outcome, set exactly once
    pub outcome: Option<Outcome>,

    /// Staking deadline
    pub closes_at: i64,

    /// Oracle resolution deadline, strictly after `closes_at`
    pub resolve_at: i64,

    /// Creation timestamp
    pub created_at: i64,

    /// Advances on every mutation
    pub updated_at: i64,

    /// Total staked on yes
    pub yes_pool: u64,

    /// Total staked on no
    pub no_pool: u64,

    /// Address → amount staked on yes
    pub yes_stakers: BTreeMap<String, u64>,

    /// Address → amount staked on no
    pub no_stakers: BTreeMap<String, u64>,

    /// Addresses that have successfully claimed
    pub claimed: BTreeSet<String>,
}

/// Denormalized listing row for a market.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct MarketSummary {
    pub id: String,
    pub question: String,
    pub category: Category,
    pub state: MarketState,
    pub outcome: Option<Outcome>,
    pub yes_pool: u64,
    pub no_pool: u64,
    pub total_pool: u64,
    pub closes_at: i64,
    pub resolve_at: i64,
    pub oracle_address: String,
    pub created_at: i64,
}

/// A market summary annotated with one address's stakes.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct StakeView {
    #[serde(flatten)]
    pub market: MarketSummary,
    pub your_yes: u64,
    pub your_no: u64,
}

impl Market {
    /// Create a new market in state `Open`.
    ///
    /// `closes_in` and `resolve_by` are offsets in seconds from `now`,
    /// clamped to their allowed ranges (1 min–30 days and 2 min–60 days)
    /// before being applied. Both offsets are relative to `now`, not to
    /// each other; creation fails if the clamped deadlines end up with
    /// `resolve_at <= closes_at`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: String,
        creator: String,
        question: &str,
        category: Category,
        oracle_address: String,
        closes_in: u64,
        resolve_by: u64,
        now: i64,
    ) -> Result<Self> {
        let question = question.trim();
        if question.len() < 10 {
            return Err(MarketError::Validation(
                "question must be at least 10 characters".to_string(),
            ));
        }
        if oracle_address.is_empty() {
            return Err(MarketError::Validation(
                "oracle_address required".to_string(),
            ));
        }

        let closes_in = closes_in.clamp(MIN_CLOSES_IN_SECS, MAX_CLOSES_IN_SECS);
        let resolve_by = resolve_by.clamp(MIN_RESOLVE_BY_SECS, MAX_RESOLVE_BY_SECS);
        let closes_at = now + closes_in as i64 * 1000;
        let resolve_at = now + resolve_by as i64 * 1000;

        if resolve_at <= closes_at {
            return Err(MarketError::Validation(
                "resolve_by must be after closes_in".to_string(),
            ));
        }

        Ok(Self {
            id,
            creator,
            question: question.to_string(),
            category,
            oracle_address,
            state: MarketState::Open,
            outcome: None,
            closes_at,
            resolve_at,
            created_at: now,
            updated_at: now,
            yes_pool: 0,
            no_pool: 0,
            yes_stakers: BTreeMap::new(),
            no_stakers: BTreeMap::new(),
            claimed: BTreeSet::new(),
        })
    }

    /// Record a stake on one side.
    ///
    /// Rejected once the market is no longer `Open`, once `now` is past the
    /// staking deadline, for zero amounts, and for the market's own oracle.
    pub fn record_stake(&mut self, staker: &str, side: Side, amount: u64, now: i64) -> Result<()> {
        if self.state != MarketState::Open {
            return Err(MarketError::InvalidState(
                "market is not open for staking".to_string(),
            ));
        }
        if now > self.closes_at {
            return Err(MarketError::InvalidState(
                "staking period has ended".to_string(),
            ));
        }
        if amount == 0 {
            return Err(MarketError::Validation(
                "amount must be greater than zero".to_string(),
            ));
        }
        if self.oracle_address == staker {
            return Err(MarketError::Unauthorized(
                "oracle cannot stake on their own market".to_string(),
            ));
        }
        // The combined pools must stay within u64: per-pool totals, staker
        // entries, and refunds are all bounded by that sum, so checking it
        // here keeps every later addition and the payout divisor exact.
        if self
            .yes_pool
            .checked_add(self.no_pool)
            .and_then(|total| total.checked_add(amount))
            .is_none()
        {
            return Err(MarketError::Validation(
                "stake overflows pool".to_string(),
            ));
        }

        match side {
            Side::Yes => {
                self.yes_pool += amount;
                *self.yes_stakers.entry(staker.to_string()).or_insert(0) += amount;
            }
            Side::No => {
                self.no_pool += amount;
                *self.no_stakers.entry(staker.to_string()).or_insert(0) += amount;
            }
        }
        self.updated_at = now;
        Ok(())
    }

    /// Record the oracle's resolution.
    ///
    /// Only the designated oracle may resolve, and only once: a market that
    /// is already `Resolved` or `Void` rejects further resolutions. A still
    /// `Open` market may be resolved early.
    pub fn record_resolution(&mut self, resolver: &str, outcome: Outcome, now: i64) -> Result<()> {
        match self.state {
            MarketState::Resolved => {
                return Err(MarketError::InvalidState("already resolved".to_string()))
            }
            MarketState::Void => {
                return Err(MarketError::InvalidState("market is void".to_string()))
            }
            MarketState::Open | MarketState::Closed => {}
        }
        if self.oracle_address != resolver {
            return Err(MarketError::Unauthorized(
                "only the designated oracle can resolve".to_string(),
            ));
        }

        self.state = match outcome {
            Outcome::Void => MarketState::Void,
            Outcome::Yes | Outcome::No => MarketState::Resolved,
        };
        self.outcome = Some(outcome);
        self.updated_at = now;
        Ok(())
    }

    /// Compute the payout owed to `claimant`, without mutating anything.
    ///
    /// Void outcome refunds the claimant's stakes on both sides in full.
    /// Otherwise the claimant's winning-side stake earns a proportional
    /// share of the combined pools, floor-divided; rounding dust is never
    /// redistributed.
    pub fn payout_for(&self, claimant: &str) -> Result<u64> {
        if self.state != MarketState::Resolved && self.state != MarketState::Void {
            return Err(MarketError::InvalidState(
                "market has not been resolved yet".to_string(),
            ));
        }
        let outcome = self.outcome.ok_or_else(|| {
            MarketError::InvalidState("settled market has no outcome".to_string())
        })?;

        let payout = match outcome.winning_side() {
            None => self
                .stake_of(claimant, Side::Yes)
                .saturating_add(self.stake_of(claimant, Side::No)),
            Some(winning_side) => {
                let my_stake = self.stake_of(claimant, winning_side);
                if my_stake == 0 {
                    return Err(MarketError::NothingToClaim(
                        "did not stake on the winning side".to_string(),
                    ));
                }
                let winning_pool = self.pool(winning_side);
                let losing_pool = self.pool(winning_side.opposite());
                // my_stake / winning_pool × total_pool, in u128 to avoid
                // overflow; the result fits u64 because it never exceeds
                // the total pool.
                let total_pool = winning_pool as u128 + losing_pool as u128;
                (my_stake as u128 * total_pool / winning_pool as u128) as u64
            }
        };

        if payout == 0 {
            return Err(MarketError::NothingToClaim(
                "computed payout is zero".to_string(),
            ));
        }
        Ok(payout)
    }

    /// Record a claim and return the payout owed.
    ///
    /// Each address may claim at most once per market. The value transfer
    /// itself is the caller's concern.
    pub fn record_claim(&mut self, claimant: &str, now: i64) -> Result<u64> {
        if self.claimed.contains(claimant) {
            return Err(MarketError::AlreadyClaimed(claimant.to_string()));
        }
        let payout = self.payout_for(claimant)?;
        self.claimed.insert(claimant.to_string());
        self.updated_at = now;
        Ok(payout)
    }

    /// The time-driven transition this market is due for at `now`, if any.
    pub fn due_transition(&self, now: i64) -> Option<DueTransition> {
        match self.state {
            MarketState::Open if now > self.closes_at => Some(DueTransition::Close),
            MarketState::Closed if now > self.resolve_at => Some(DueTransition::Void),
            _ => None,
        }
    }

    /// Apply a due transition. Idempotent against re-application: a
    /// transition only fires from the state `due_transition` reported it
    /// for.
    pub fn apply_transition(&mut self, transition: DueTransition, now: i64) {
        match transition {
            DueTransition::Close if self.state == MarketState::Open => {
                self.state = MarketState::Closed;
                self.updated_at = now;
            }
            DueTransition::Void if self.state == MarketState::Closed => {
                self.state = MarketState::Void;
                self.outcome = Some(Outcome::Void);
                self.updated_at = now;
            }
            _ => {}
        }
    }

    /// Amount `address` has staked on `side`.
    pub fn stake_of(&self, address: &str, side: Side) -> u64 {
        let stakers = match side {
            Side::Yes => &self.yes_stakers,
            Side::No => &self.no_stakers,
        };
        stakers.get(address).copied().unwrap_or(0)
    }

    /// Pool total for one side.
    pub const fn pool(&self, side: Side) -> u64 {
        match side {
            Side::Yes => self.yes_pool,
            Side::No => self.no_pool,
        }
    }

    pub const fn total_pool(&self) -> u64 {
        // record_stake caps the combined pools at u64::MAX; saturate so a
        // hand-built record can never panic here.
        self.yes_pool.saturating_add(self.no_pool)
    }

    /// True while the pool accumulators agree with the stakers maps.
    pub fn pools_consistent(&self) -> bool {
        self.yes_pool == self.yes_stakers.values().sum::<u64>()
            && self.no_pool == self.no_stakers.values().sum::<u64>()
    }

    pub fn summary(&self) -> MarketSummary {
        MarketSummary {
            id: self.id.clone(),
            question: self.question.clone(),
            category: self.category,
            state: self.state,
            outcome: self.outcome,
            yes_pool: self.yes_pool,
            no_pool: self.no_pool,
            total_pool: self.total_pool(),
            closes_at: self.closes_at,
            resolve_at: self.resolve_at,
            oracle_address: self.oracle_address.clone(),
            created_at: self.created_at,
        }
    }

    /// Summary annotated with `address`'s stakes on both sides.
    pub fn stake_view(&self, address: &str) -> StakeView {
        StakeView {
            market: self.summary(),
            your_yes: self.stake_of(address, Side::Yes),
            your_no: self.stake_of(address, Side::No),
        }
    }
}
