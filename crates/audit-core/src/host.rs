use std::path::PathBuf;

use crate::aggregator::Value;
use crate::types::{NetworkHandle, StorageId, WorldPosition};

/// One loaded dimension, as reported by the host. `namespace`/`path` follow
/// the vanilla-overworld / `DIM-1` / `DIM1` / `dimensions/<ns>/<path>`
/// convention resolved by [`crate::indexer::seed_world`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimensionHandle {
    pub id: String,
    pub namespace: Option<String>,
    pub path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnlinePlayer {
    pub uuid: String,
    pub name: String,
}

/// A currently-loaded block entity offering indexed slot access — the
/// runtime counterpart of a decoded region-file block entity.
#[derive(Debug, Clone)]
pub struct RuntimeContainerHandle {
    pub dimension: String,
    pub position: WorldPosition,
    pub storage_mod: String,
    pub storage_id: StorageId,
    pub slots: Vec<Value>,
}

/// A currently-loaded opaque network-storage aggregate.
#[derive(Debug, Clone)]
pub struct RuntimeNetworkHandle {
    pub handle: NetworkHandle,
    pub storage_id: StorageId,
    pub slots: Vec<Value>,
}

/// Stable capability surface the scanner/audit tasks use to reach the host
/// process. SPEC_FULL.md §9's "Reflective field-walking in the source" maps
/// onto this trait: implementations that run against an older host may fall
/// back to dynamic property lookup internally, but callers only ever see
/// these well-typed methods. Deliberately has **no** "load chunk from disk"
/// method — Open Question #2 in DESIGN.md resolves in favor of pure
/// region-file decoding, so there is no path that could reach for live
/// chunk loading.
pub trait HostBridge: Send + Sync {
    fn world_root(&self) -> PathBuf;
    fn loaded_dimensions(&self) -> Vec<DimensionHandle>;
    fn online_players(&self) -> Vec<OnlinePlayer>;
    fn player_inventory(&self, uuid: &str) -> Vec<Value>;
    fn player_ender_chest(&self, uuid: &str) -> Vec<Value>;
    fn list_block_entities(&self) -> Vec<RuntimeContainerHandle>;
    fn network_handles(&self) -> Vec<RuntimeNetworkHandle>;
    fn online_player_count(&self) -> u32;
    fn avg_tick_ms(&self) -> f64;
}

/// Deterministic in-memory [`HostBridge`] used by tests and by the scanner's
/// own unit tests for end-to-end scenarios — never compiled into the daemon
/// binary.
#[cfg(any(test, feature = "test-support"))]
pub mod test_support {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct FakeHost {
        pub world_root: PathBuf,
        pub dimensions: Vec<DimensionHandle>,
        pub players: Vec<OnlinePlayer>,
        pub inventories: Mutex<std::collections::HashMap<String, Vec<Value>>>,
        pub ender_chests: Mutex<std::collections::HashMap<String, Vec<Value>>>,
        pub containers: Vec<RuntimeContainerHandle>,
        pub networks: Vec<RuntimeNetworkHandle>,
        pub avg_tick_ms: f64,
    }

    impl HostBridge for FakeHost {
        fn world_root(&self) -> PathBuf {
            self.world_root.clone()
        }

        fn loaded_dimensions(&self) -> Vec<DimensionHandle> {
            self.dimensions.clone()
        }

        fn online_players(&self) -> Vec<OnlinePlayer> {
            self.players.clone()
        }

        fn player_inventory(&self, uuid: &str) -> Vec<Value> {
            self.inventories
                .lock()
                .unwrap()
                .get(uuid)
                .cloned()
                .unwrap_or_default()
        }

        fn player_ender_chest(&self, uuid: &str) -> Vec<Value> {
            self.ender_chests
                .lock()
                .unwrap()
                .get(uuid)
                .cloned()
                .unwrap_or_default()
        }

        fn list_block_entities(&self) -> Vec<RuntimeContainerHandle> {
            self.containers.clone()
        }

        fn network_handles(&self) -> Vec<RuntimeNetworkHandle> {
            self.networks.clone()
        }

        fn online_player_count(&self) -> u32 {
            self.players.len() as u32
        }

        fn avg_tick_ms(&self) -> f64 {
            self.avg_tick_ms
        }
    }
}
