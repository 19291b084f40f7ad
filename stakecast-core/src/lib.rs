//! # Stakecast Core
//!
//! Deterministic state machine for a peer-to-peer prediction market:
//! participants open a market, stake value on a binary (or void) outcome,
//! a designated oracle resolves it, and winners claim a proportional
//! payout.
//!
//! Mutating operations are assumed to arrive through a replicated, totally
//! ordered command log; every peer that replays the same log against the
//! same store derives byte-identical state. The replication layer, the
//! key-value store, signer verification, and the value-transfer primitive
//! are external collaborators consumed through the traits in [`store`] and
//! [`protocol`].
//!
//! ## Components
//!
//! - [`market`] — the `Market` aggregate and its pure state machine
//! - [`store`] — versioned persistence façade over an opaque K/V store
//! - [`contract`] — validated operations: create, stake, resolve, claim
//! - [`protocol`] — signed-command router with post-success side effects
//! - [`scheduler`] — the recurring deadline pass (close, remind, void)
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use stakecast_core::{
//!     Category, MarketContract, MarketStore, MemoryStore, Outcome, Side, SystemClock,
//! };
//!
//! let store = MarketStore::new(Arc::new(MemoryStore::new()));
//! let contract = MarketContract::new(store, Arc::new(SystemClock));
//!
//! let market = contract.create(
//!     "addr-creator",
//!     "Will it rain tomorrow in San Francisco?",
//!     Category::Science,
//!     Some(3600),
//!     Some(7200),
//!     "addr-oracle",
//! )?;
//! contract.stake("addr-alice", &market.id, Side::Yes, 100)?;
//! contract.stake("addr-bob", &market.id, Side::No, 50)?;
//! contract.resolve("addr-oracle", &market.id, Outcome::Yes)?;
//! let receipt = contract.claim("addr-alice", &market.id)?;
//! assert_eq!(receipt.payout, 150);
//! # Ok::<(), stakecast_core::MarketError>(())
//! ```

pub mod clock;
pub mod contract;
pub mod error;
pub mod market;
pub mod protocol;
pub mod scheduler;
pub mod store;
#[cfg(test)]
pub mod test_utils;

pub use clock::{Clock, SystemClock};
pub use contract::{ClaimReceipt, ListFilter, MarketContract, ResolveReceipt, StakeReceipt};
pub use error::{MarketError, Result};
pub use market::{
    Category, DueTransition, Market, MarketState, MarketSummary, Outcome, Side, StakeView,
};
pub use protocol::{
    oracle_channel, ActivityEvent, Broadcast, Command, CommandEnvelope, CommandOutput, Protocol,
    ValueTransfer, ACTIVITY_CHANNEL,
};
pub use scheduler::LifecycleScheduler;
pub use store::{IndexEntry, KvStore, MarketIndex, MarketStore, MemoryStore};

/// Smallest accepted staking window (1 minute)
pub const MIN_CLOSES_IN_SECS: u64 = 60;

/// Largest accepted staking window (30 days)
pub const MAX_CLOSES_IN_SECS: u64 = 2_592_000;

/// Smallest accepted resolution window (2 minutes)
pub const MIN_RESOLVE_BY_SECS: u64 = 120;

/// Largest accepted resolution window (60 days)
pub const MAX_RESOLVE_BY_SECS: u64 = 5_184_000;

/// Staking window applied when a create command omits `closes_in` (1 hour)
pub const DEFAULT_CLOSES_IN_SECS: u64 = 3_600;

/// Resolution window applied when a create command omits `resolve_by` (2 hours)
pub const DEFAULT_RESOLVE_BY_SECS: u64 = 7_200;

/// Listing page size when a list command omits `limit`
pub const DEFAULT_LIST_LIMIT: usize = 20;

/// Hard cap on listing page size
pub const MAX_LIST_LIMIT: usize = 100;
