use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;

use crate::types::{ScanTarget, StorageId};

/// Hard cap on the world-snapshot queue, per SPEC_FULL.md §4.D.
pub const WORLD_QUEUE_LIMIT: usize = 50_000;

/// One decoded block entity's aggregate, waiting to become snapshot events.
#[derive(Debug, Clone)]
pub struct WorldSnapshotItem {
    pub dimension: String,
    pub position: crate::types::WorldPosition,
    pub storage_mod: String,
    pub storage_id: StorageId,
    pub item_counts: HashMap<String, i64>,
}

/// An already-aggregated result (nested storage or decoded network-offline
/// data) ready to publish with no further decode step.
#[derive(Debug, Clone)]
pub struct AggregatedItem {
    pub storage_id: StorageId,
    pub storage_mod: String,
    pub item_counts: HashMap<String, i64>,
}

/// All per-session queues the scanner drains. Owned exclusively by the
/// scheduler thread — no locking, per SPEC_FULL.md §5.
#[derive(Debug, Default)]
pub struct SessionQueues {
    pub region_dirs: VecDeque<(String, PathBuf)>,
    pub region_files: VecDeque<(String, PathBuf)>,
    pub world_snapshots: VecDeque<WorldSnapshotItem>,
    pub nested_ready: VecDeque<AggregatedItem>,
    pub network_offline_pending: VecDeque<ScanTarget>,
    pub network_offline_ready: VecDeque<AggregatedItem>,
    pub runtime_containers: VecDeque<ScanTarget>,
    pub runtime_networks: VecDeque<ScanTarget>,
}

impl SessionQueues {
    pub fn is_empty(&self) -> bool {
        self.region_dirs.is_empty()
            && self.region_files.is_empty()
            && self.world_snapshots.is_empty()
            && self.nested_ready.is_empty()
            && self.network_offline_pending.is_empty()
            && self.network_offline_ready.is_empty()
            && self.runtime_containers.is_empty()
            && self.runtime_networks.is_empty()
    }

    /// Admits up to `allowed = max(0, LIMIT - queue_len)` of the `k` new
    /// snapshots, per SPEC_FULL.md §4.D's backpressure rule. Returns the
    /// number dropped, which the caller turns into a `PARTIAL_COMPLETED`
    /// reason and an observability line if non-zero.
    pub fn admit_world_snapshots(&mut self, items: Vec<WorldSnapshotItem>) -> usize {
        let allowed = WORLD_QUEUE_LIMIT.saturating_sub(self.world_snapshots.len());
        let k = items.len();
        let admit = k.min(allowed);
        for item in items.into_iter().take(admit) {
            self.world_snapshots.push_back(item);
        }
        k - admit
    }
}

/// `storage-id → last-successful-scan-ms`, persisted across sessions in
/// memory per SPEC_FULL.md §3.
#[derive(Debug, Default)]
pub struct CooldownMap {
    last_success_ms: HashMap<StorageId, i64>,
}

impl CooldownMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn should_skip(&self, storage_id: &StorageId, now_ms: i64, cooldown_ms: i64) -> bool {
        if cooldown_ms <= 0 {
            return false;
        }
        match self.last_success_ms.get(storage_id) {
            Some(last) => now_ms - last < cooldown_ms,
            None => false,
        }
    }

    pub fn record_success(&mut self, storage_id: StorageId, now_ms: i64) {
        self.last_success_ms.insert(storage_id, now_ms);
    }
}
