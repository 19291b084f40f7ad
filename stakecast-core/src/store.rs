//! # Market Persistence
//!
//! Persistence façade over an opaque key-value interface. The store owns
//! the versioned encode/decode of market records and the secondary index,
//! so every replica decodes bytes identically: all maps inside persisted
//! records are ordered (`BTreeMap`) and the codec version is checked on
//! every read.
//!
//! Keys: one record per market under `market:<id>`, and the whole
//! id → {state, category} index under `index:markets`.

use crate::error::{MarketError, Result};
use crate::market::{Category, Market, MarketState};
use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

/// Codec version written into every persisted record.
pub const CODEC_VERSION: u32 = 1;

/// Key holding the market index.
pub const INDEX_KEY: &str = "index:markets";

/// Opaque persistent key-value store.
///
/// Get/put only: no range queries, no transactions. Implementations are
/// supplied by the hosting peer; errors are surfaced as
/// [`MarketError::Store`].
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;
    fn put(&self, key: &str, value: &[u8]) -> anyhow::Result<()>;
}

/// In-memory [`KvStore`], for tests and examples.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("memory store mutex poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("memory store mutex poisoned"))?;
        entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }
}

/// Denormalized projection of one market, kept in the index for
/// listing/filtering without loading every record.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexEntry {
    pub state: MarketState,
    pub category: Category,
}

/// The full market index: id → {state, category}, ordered for a stable
/// encoding.
pub type MarketIndex = BTreeMap<String, IndexEntry>;

#[derive(Serialize, Deserialize)]
struct MarketRecord {
    v: u32,
    market: Market,
}

#[derive(Serialize, Deserialize)]
struct IndexRecord {
    v: u32,
    entries: MarketIndex,
}

/// Persistence façade owning key construction and the record codec.
#[derive(Clone)]
pub struct MarketStore {
    kv: Arc<dyn KvStore>,
}

impl MarketStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    fn market_key(id: &str) -> String {
        format!("market:{id}")
    }

    /// Encode a market with the current codec version.
    pub fn encode_market(market: &Market) -> Result<Vec<u8>> {
        let record = MarketRecord {
            v: CODEC_VERSION,
            market: market.clone(),
        };
        Ok(serde_json::to_vec(&record)?)
    }

    /// Decode a market record, rejecting foreign codec versions.
    pub fn decode_market(bytes: &[u8]) -> Result<Market> {
        let record: MarketRecord = serde_json::from_slice(bytes)?;
        if record.v != CODEC_VERSION {
            return Err(MarketError::UnsupportedVersion(record.v));
        }
        Ok(record.market)
    }

    pub fn load_market(&self, id: &str) -> Result<Option<Market>> {
        let bytes = self
            .kv
            .get(&Self::market_key(id))
            .map_err(MarketError::Store)?;
        bytes.as_deref().map(Self::decode_market).transpose()
    }

    pub fn save_market(&self, market: &Market) -> Result<()> {
        let bytes = Self::encode_market(market)?;
        self.kv
            .put(&Self::market_key(&market.id), &bytes)
            .map_err(MarketError::Store)
    }

    pub fn load_index(&self) -> Result<MarketIndex> {
        let bytes = self.kv.get(INDEX_KEY).map_err(MarketError::Store)?;
        let Some(bytes) = bytes else {
            return Ok(MarketIndex::new());
        };
        let record: IndexRecord = serde_json::from_slice(&bytes)?;
        if record.v != CODEC_VERSION {
            return Err(MarketError::UnsupportedVersion(record.v));
        }
        Ok(record.entries)
    }

    pub fn save_index(&self, entries: &MarketIndex) -> Result<()> {
        let record = IndexRecord {
            v: CODEC_VERSION,
            entries: entries.clone(),
        };
        let bytes = serde_json::to_vec(&record)?;
        self.kv.put(INDEX_KEY, &bytes).map_err(MarketError::Store)
    }

    /// Insert a freshly created market into the index.
    pub fn insert_index_entry(&self, id: &str, state: MarketState, category: Category) -> Result<()> {
        let mut index = self.load_index()?;
        index.insert(id.to_string(), IndexEntry { state, category });
        self.save_index(&index)
    }

    /// Update the indexed state of an existing market. Unknown ids are
    /// ignored, matching the record-first write order.
    pub fn update_index_state(&self, id: &str, state: MarketState) -> Result<()> {
        let mut index = self.load_index()?;
        if let Some(entry) = index.get_mut(id) {
            entry.state = state;
            self.save_index(&index)?;
        }
        Ok(())
    }

    /// Re-derive every index entry from its market record.
    ///
    /// The record is put before the index on every mutation, so a crash
    /// between the two leaves the index stale. This refreshes state and
    /// category for each indexed id and drops entries whose record is
    /// missing, then persists and returns the repaired index.
    pub fn reconcile_index(&self) -> Result<MarketIndex> {
        let stale = self.load_index()?;
        let mut repaired = MarketIndex::new();
        for id in stale.keys() {
            if let Some(market) = self.load_market(id)? {
                repaired.insert(
                    id.clone(),
                    IndexEntry {
                        state: market.state,
                        category: market.category,
                    },
                );
            }
        }
        self.save_index(&repaired)?;
        Ok(repaired)
    }
}

/// Recover a possibly poisoned mutex guard.
///
/// Mutation state lives in the store, not behind the lock, so a panic in
/// another holder cannot leave the guarded data half-written.
pub(crate) fn relock<T>(result: std::result::Result<T, PoisonError<T>>) -> T {
    result.unwrap_or_else(PoisonError::into_inner)
}
