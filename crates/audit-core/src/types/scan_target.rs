use std::collections::HashMap;
use std::path::PathBuf;

use super::ids::StorageId;
use super::snapshot_event::WorldPosition;

/// Identity of an opaque, in-process network-storage handle. This is the
/// handle's process address, hashed — per §3, "network identity is the
/// handle's process-address; never persisted". It is only ever compared
/// within a single process lifetime and is never written to disk or sent
/// upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NetworkHandle(pub u64);

/// Tagged sum type describing one unit of scannable storage. See
/// SPEC_FULL.md §3.
#[derive(Debug, Clone)]
pub enum ScanTarget {
    RuntimeContainer {
        dimension: String,
        position: WorldPosition,
        storage_mod: String,
        storage_id: StorageId,
    },
    RuntimeNetwork {
        handle: NetworkHandle,
        storage_id: StorageId,
    },
    RegionDirectory {
        dimension_id: String,
        directory_path: PathBuf,
    },
    RegionFile {
        dimension_id: String,
        file_path: PathBuf,
    },
    WorldSnapshot {
        item_counts: HashMap<String, i64>,
        storage_mod: String,
        storage_id: StorageId,
        dimension: String,
        position: WorldPosition,
    },
    NestedStorageRoot {
        storage_id: StorageId,
        item_counts: HashMap<String, i64>,
    },
    OfflineData {
        path: PathBuf,
        storage_mod: String,
        storage_id: StorageId,
    },
}

impl ScanTarget {
    /// The storage-id used for cooldown and dedupe bookkeeping, when the
    /// target variant carries one up front. Region directories/files don't
    /// have a single storage-id until decoded into world snapshots.
    pub fn storage_id(&self) -> Option<&StorageId> {
        match self {
            ScanTarget::RuntimeContainer { storage_id, .. }
            | ScanTarget::RuntimeNetwork { storage_id, .. }
            | ScanTarget::WorldSnapshot { storage_id, .. }
            | ScanTarget::NestedStorageRoot { storage_id, .. }
            | ScanTarget::OfflineData { storage_id, .. } => Some(storage_id),
            ScanTarget::RegionDirectory { .. } | ScanTarget::RegionFile { .. } => None,
        }
    }

    pub fn source_bucket(&self) -> SourceBucket {
        match self {
            ScanTarget::RuntimeContainer { .. } | ScanTarget::RuntimeNetwork { .. } => {
                SourceBucket::OnlineRuntime
            }
            ScanTarget::RegionDirectory { .. }
            | ScanTarget::RegionFile { .. }
            | ScanTarget::WorldSnapshot { .. } => SourceBucket::WorldContainers,
            ScanTarget::NestedStorageRoot { .. } => SourceBucket::NestedOffline,
            ScanTarget::OfflineData { .. } => SourceBucket::NetworkOffline,
        }
    }
}

/// Matches `counters.targets_total_by_source` / `done_by_source` in
/// [`crate::types::progress::ProgressRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceBucket {
    WorldContainers,
    NestedOffline,
    NetworkOffline,
    OnlineRuntime,
}
