use std::path::PathBuf;

use audit_core::aggregator::Value;
use audit_core::host::{DimensionHandle, HostBridge, OnlinePlayer, RuntimeContainerHandle, RuntimeNetworkHandle};

const OVERWORLD: &str = "minecraft:overworld";
const THE_NETHER: &str = "minecraft:the_nether";
const THE_END: &str = "minecraft:the_end";

/// Standalone `HostBridge` for this binary: reads the real on-disk world
/// layout for the offline sources (components B/C/D's world-region path),
/// and reports no online players, runtime containers, or network handles.
///
/// A live deployment is embedded in the running voxel-world server process
/// and substitutes its own `HostBridge` bridging into that process's player
/// and block-entity state (per DESIGN NOTES §9, the scanner only ever sees
/// the trait) — exactly the kind of external collaborator the interfaces in
/// this spec name but don't implement (REST/WS backend endpoints, the
/// desktop operator UI, RCON plumbing). This bridge is the one concrete
/// implementation this repo ships: a cold/offline audit over a world
/// directory with nobody connected, which is a real and complete operating
/// mode in its own right (item (d) in §1's scope list is independent of
/// online players).
pub struct WorldRootHostBridge {
    world_root: PathBuf,
}

impl WorldRootHostBridge {
    pub fn new(world_root: PathBuf) -> Self {
        Self { world_root }
    }

    fn has_region_dir(&self, relative: &std::path::Path) -> bool {
        self.world_root.join(relative).join("region").is_dir()
    }
}

impl HostBridge for WorldRootHostBridge {
    fn world_root(&self) -> PathBuf {
        self.world_root.clone()
    }

    /// Probes the well-known vanilla-layout paths (overworld at the world
    /// root, `DIM-1`/`DIM1` for nether/end, `dimensions/<ns>/<path>` for
    /// anything else) the same way `indexer::seed_world` resolves them, and
    /// reports a dimension "loaded" when its `region/` directory exists.
    fn loaded_dimensions(&self) -> Vec<DimensionHandle> {
        let mut dims = Vec::new();

        if self.has_region_dir(std::path::Path::new("")) {
            dims.push(DimensionHandle {
                id: OVERWORLD.to_string(),
                namespace: None,
                path: None,
            });
        }
        if self.has_region_dir(std::path::Path::new("DIM-1")) {
            dims.push(DimensionHandle {
                id: THE_NETHER.to_string(),
                namespace: None,
                path: None,
            });
        }
        if self.has_region_dir(std::path::Path::new("DIM1")) {
            dims.push(DimensionHandle {
                id: THE_END.to_string(),
                namespace: None,
                path: None,
            });
        }

        let custom_root = self.world_root.join("dimensions");
        if let Ok(namespaces) = std::fs::read_dir(&custom_root) {
            for namespace_entry in namespaces.flatten() {
                let Ok(namespace_meta) = namespace_entry.file_type() else { continue };
                if !namespace_meta.is_dir() {
                    continue;
                }
                let namespace = namespace_entry.file_name().to_string_lossy().into_owned();
                let Ok(paths) = std::fs::read_dir(namespace_entry.path()) else { continue };
                for path_entry in paths.flatten() {
                    let Ok(path_meta) = path_entry.file_type() else { continue };
                    if !path_meta.is_dir() {
                        continue;
                    }
                    let path = path_entry.file_name().to_string_lossy().into_owned();
                    if path_entry.path().join("region").is_dir() {
                        dims.push(DimensionHandle {
                            id: format!("{namespace}:{path}"),
                            namespace: Some(namespace.clone()),
                            path: Some(path),
                        });
                    }
                }
            }
        }

        dims
    }

    fn online_players(&self) -> Vec<OnlinePlayer> {
        Vec::new()
    }

    fn player_inventory(&self, _uuid: &str) -> Vec<Value> {
        Vec::new()
    }

    fn player_ender_chest(&self, _uuid: &str) -> Vec<Value> {
        Vec::new()
    }

    fn list_block_entities(&self) -> Vec<RuntimeContainerHandle> {
        Vec::new()
    }

    fn network_handles(&self) -> Vec<RuntimeNetworkHandle> {
        Vec::new()
    }

    fn online_player_count(&self) -> u32 {
        0
    }

    fn avg_tick_ms(&self) -> f64 {
        0.0
    }
}
