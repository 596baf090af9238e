mod nested;
mod network_offline;
mod world;

pub use nested::{resolve_player_linked_storage, seed_nested_storage};
pub use network_offline::seed_network_offline;
pub use world::seed_world;

use std::collections::HashSet;

use crate::host::{HostBridge, RuntimeContainerHandle, RuntimeNetworkHandle};
use crate::types::{NetworkHandle, ScanTarget, StorageId};

/// Per-session dedupe sets keyed by stable id (containers/offline) or by
/// network-handle identity, per SPEC_FULL.md §4.C's "Duplication is
/// prevented by per-session sets". Owned by whichever caller seeds targets
/// for one session; dropped at session end.
#[derive(Debug, Default)]
pub struct SeenSet {
    storage_ids: HashSet<StorageId>,
    network_handles: HashSet<NetworkHandle>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_storage(&mut self, id: StorageId) -> bool {
        self.storage_ids.insert(id)
    }

    pub fn insert_network(&mut self, handle: NetworkHandle) -> bool {
        self.network_handles.insert(handle)
    }
}

/// `seed_runtime(server)` — iterates all loaded block entities and network
/// handles via the host bridge, enqueuing each exactly once (SPEC_FULL.md
/// §4.C). The "reflective fallback" mentioned in §9 is entirely inside the
/// `HostBridge` implementation; this function only ever sees the trait.
pub fn seed_runtime(host: &dyn HostBridge, seen: &mut SeenSet) -> Vec<ScanTarget> {
    let mut targets = Vec::new();

    for container in host.list_block_entities() {
        let RuntimeContainerHandle {
            dimension,
            position,
            storage_mod,
            storage_id,
            ..
        } = container;
        if !seen.insert_storage(storage_id.clone()) {
            continue;
        }
        targets.push(ScanTarget::RuntimeContainer {
            dimension,
            position,
            storage_mod,
            storage_id,
        });
    }

    for network in host.network_handles() {
        let RuntimeNetworkHandle {
            handle,
            storage_id,
            ..
        } = network;
        if !seen.insert_network(handle) {
            continue;
        }
        targets.push(ScanTarget::RuntimeNetwork { handle, storage_id });
    }

    targets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::test_support::FakeHost;
    use crate::types::WorldPosition;

    #[test]
    fn seed_runtime_dedupes_repeated_storage_ids() {
        let container = RuntimeContainerHandle {
            dimension: "overworld".into(),
            position: WorldPosition {
                dimension: "overworld".into(),
                x: 0,
                y: 0,
                z: 0,
            },
            storage_mod: "minecraft".into(),
            storage_id: StorageId::new("chest-1"),
            slots: Vec::new(),
        };
        let host = FakeHost {
            containers: vec![container.clone(), container],
            ..Default::default()
        };
        let mut seen = SeenSet::new();
        let targets = seed_runtime(&host, &mut seen);
        assert_eq!(targets.len(), 1);
    }
}
