//! Pin records for priority retention
//!
//! A pin marks an item as exempt from size-based eviction. Pins persist in
//! their own namespace so they survive restarts, and are mirrored in an
//! in-process map so eviction sweeps can consult them without async calls.

use crate::error::Result;
use crate::metadata::CacheMetadata;
use bridge_traits::kv::KeyValueStore;
use bridge_traits::time::Clock;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Namespace that holds persisted pin records.
pub const PIN_NAMESPACE: &str = "cache_pins";

/// Retention priority of a pinned item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PinLevel {
    High,
    Medium,
    Low,
}

/// One pinned item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinRecord {
    pub level: PinLevel,
    pub pinned_at_ms: i64,
    pub last_access_ms: i64,
    pub access_count: u64,
}

/// Registry of pinned items.
///
/// Any pinned item, regardless of level, survives size-based eviction;
/// the level orders retention for future policies and UI display.
pub struct PinRegistry {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    pins: RwLock<HashMap<String, PinRecord>>,
}

impl PinRegistry {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            pins: RwLock::new(HashMap::new()),
        }
    }

    /// Load persisted pins into the in-process map. Returns the pin count.
    ///
    /// Unparseable records are dropped from the map (and logged), not
    /// propagated; a corrupt pin must not block startup.
    pub async fn load(&self) -> Result<usize> {
        let keys = self.store.list_keys(PIN_NAMESPACE).await?;
        let mut loaded = HashMap::new();

        for key in keys {
            match self.store.get(PIN_NAMESPACE, &key).await {
                Ok(Some(raw)) => match serde_json::from_str::<PinRecord>(&raw) {
                    Ok(record) => {
                        loaded.insert(key, record);
                    }
                    Err(e) => {
                        warn!(item_id = %key, error = %e, "Dropping unparseable pin record");
                    }
                },
                Ok(None) => {}
                Err(e) => {
                    warn!(item_id = %key, error = %e, "Failed to read pin record");
                }
            }
        }

        let count = loaded.len();
        *self.pins.write() = loaded;
        debug!(count = count, "Loaded pin records");
        Ok(count)
    }

    /// Pin an item. Re-pinning updates the level and keeps access stats.
    pub async fn pin(&self, item_id: &str, level: PinLevel) -> Result<()> {
        let now = self.clock.unix_timestamp_millis();
        let record = {
            let pins = self.pins.read();
            match pins.get(item_id) {
                Some(existing) => PinRecord {
                    level,
                    ..existing.clone()
                },
                None => PinRecord {
                    level,
                    pinned_at_ms: now,
                    last_access_ms: now,
                    access_count: 0,
                },
            }
        };

        let raw = serde_json::to_string(&record)?;
        self.store.put(PIN_NAMESPACE, item_id, &raw).await?;
        self.pins.write().insert(item_id.to_string(), record);

        debug!(item_id = item_id, ?level, "Pinned item");
        Ok(())
    }

    /// Remove an item's pin. Returns whether a pin existed.
    pub async fn unpin(&self, item_id: &str) -> Result<bool> {
        self.store.delete(PIN_NAMESPACE, item_id).await?;
        let existed = self.pins.write().remove(item_id).is_some();

        debug!(item_id = item_id, existed = existed, "Unpinned item");
        Ok(existed)
    }

    /// Whether an item is currently pinned.
    pub fn is_pinned(&self, item_id: &str) -> bool {
        self.pins.read().contains_key(item_id)
    }

    /// The pin level of an item, if pinned.
    pub fn level(&self, item_id: &str) -> Option<PinLevel> {
        self.pins.read().get(item_id).map(|r| r.level)
    }

    /// Snapshot of a pin record, if pinned.
    pub fn record(&self, item_id: &str) -> Option<PinRecord> {
        self.pins.read().get(item_id).cloned()
    }

    /// Number of pinned items.
    pub fn len(&self) -> usize {
        self.pins.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pins.read().is_empty()
    }

    /// Record a read hit against a pinned item.
    ///
    /// The persisted copy is refreshed best-effort; pin access stats are
    /// advisory and must never fail a read.
    pub async fn record_access(&self, item_id: &str) {
        let now = self.clock.unix_timestamp_millis();
        let updated = {
            let mut pins = self.pins.write();
            match pins.get_mut(item_id) {
                Some(record) => {
                    record.access_count += 1;
                    record.last_access_ms = record.last_access_ms.max(now);
                    Some(record.clone())
                }
                None => None,
            }
        };

        if let Some(record) = updated {
            match serde_json::to_string(&record) {
                Ok(raw) => {
                    if let Err(e) = self.store.put(PIN_NAMESPACE, item_id, &raw).await {
                        warn!(item_id = item_id, error = %e, "Failed to persist pin access stats");
                    }
                }
                Err(e) => {
                    warn!(item_id = item_id, error = %e, "Failed to serialize pin record");
                }
            }
        }
    }

    /// Whether eviction must skip the entry with this metadata record.
    pub fn protects(&self, metadata: &CacheMetadata) -> bool {
        self.is_pinned(&metadata.original_key)
    }
}
