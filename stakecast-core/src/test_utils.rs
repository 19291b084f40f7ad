//! Common test utilities for stakecast-core tests.
//!
//! Deterministic fixtures shared across module tests: a manually driven
//! clock, recording doubles for the broadcast and transfer collaborators,
//! and contract/protocol setup over an in-memory store.

use crate::clock::Clock;
use crate::contract::MarketContract;
use crate::market::{Category, Market};
use crate::protocol::{ActivityEvent, Broadcast, Protocol, ValueTransfer};
use crate::store::{MarketStore, MemoryStore};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

/// Common test constants
pub mod constants {
    /// 2025-01-01T00:00:00Z in epoch milliseconds
    pub const START_MS: i64 = 1_735_689_600_000;

    pub const ALICE: &str = "addr-alice";
    pub const BOB: &str = "addr-bob";
    pub const CAROL: &str = "addr-carol";
    pub const ORACLE: &str = "addr-oracle";
}

/// A clock that only moves when told to.
pub struct ManualClock {
    now_ms: AtomicI64,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now_ms: AtomicI64::new(start_ms),
        }
    }

    pub fn advance(&self, delta_ms: i64) {
        self.now_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }

    pub fn set(&self, now_ms: i64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

/// Broadcast double that records every (channel, payload) pair.
#[derive(Default)]
pub struct RecordingBroadcast {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingBroadcast {
    /// Every send so far, as raw (channel, payload) pairs.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    /// Every event so far, decoded.
    pub fn events(&self) -> Vec<ActivityEvent> {
        self.sent()
            .iter()
            .map(|(_, payload)| serde_json::from_str(payload).unwrap())
            .collect()
    }

    /// Events sent on one channel, decoded.
    pub fn events_on(&self, channel: &str) -> Vec<ActivityEvent> {
        self.sent()
            .iter()
            .filter(|(sent_channel, _)| sent_channel == channel)
            .map(|(_, payload)| serde_json::from_str(payload).unwrap())
            .collect()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

impl Broadcast for RecordingBroadcast {
    fn send(&self, channel: &str, payload: &str) -> anyhow::Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((channel.to_string(), payload.to_string()));
        Ok(())
    }
}

/// Broadcast double whose every send fails.
pub struct FailingBroadcast;

impl Broadcast for FailingBroadcast {
    fn send(&self, _channel: &str, _payload: &str) -> anyhow::Result<()> {
        Err(anyhow::anyhow!("broadcast channel down"))
    }
}

/// Transfer double that records every (to, amount, memo) triple.
#[derive(Default)]
pub struct RecordingTransfer {
    transfers: Mutex<Vec<(String, u64, String)>>,
}

impl RecordingTransfer {
    pub fn transfers(&self) -> Vec<(String, u64, String)> {
        self.transfers.lock().unwrap().clone()
    }
}

impl ValueTransfer for RecordingTransfer {
    fn transfer(&self, to: &str, amount: u64, memo: &str) -> anyhow::Result<()> {
        self.transfers
            .lock()
            .unwrap()
            .push((to.to_string(), amount, memo.to_string()));
        Ok(())
    }
}

/// A contract over a fresh in-memory store, driven by a manual clock
/// starting at [`constants::START_MS`].
pub fn test_contract() -> (MarketContract, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(constants::START_MS));
    let store = MarketStore::new(Arc::new(MemoryStore::new()));
    (MarketContract::new(store, clock.clone()), clock)
}

/// A full protocol stack over a fresh in-memory store with recording
/// collaborator doubles.
pub fn test_protocol() -> (
    Protocol,
    Arc<ManualClock>,
    Arc<RecordingBroadcast>,
    Arc<RecordingTransfer>,
) {
    let (contract, clock) = test_contract();
    let broadcast = Arc::new(RecordingBroadcast::default());
    let transfer = Arc::new(RecordingTransfer::default());
    let protocol = Protocol::new(Arc::new(contract), broadcast.clone(), transfer.clone());
    (protocol, clock, broadcast, transfer)
}

/// A standard open market with the usual deadlines, no stakes yet.
pub fn open_market() -> Market {
    Market::new(
        "test-market-id".to_string(),
        constants::ALICE.to_string(),
        "Will BTC close above 100k this year?",
        Category::Crypto,
        constants::ORACLE.to_string(),
        60,
        120,
        constants::START_MS,
    )
    .unwrap()
}
