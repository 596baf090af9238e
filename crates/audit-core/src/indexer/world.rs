use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{AuditError, Result};
use crate::host::{DimensionHandle, HostBridge};
use crate::types::ScanTarget;

const OVERWORLD: &str = "minecraft:overworld";
const THE_NETHER: &str = "minecraft:the_nether";
const THE_END: &str = "minecraft:the_end";

/// Resolves a dimension's on-disk path relative to the world root, per
/// SPEC_FULL.md §4.C: overworld is the world root itself, nether is
/// `DIM-1`, end is `DIM1`, anything else is `dimensions/<namespace>/<path>`.
fn dimension_path(world_root: &Path, dim: &DimensionHandle) -> PathBuf {
    match dim.id.as_str() {
        OVERWORLD => world_root.to_path_buf(),
        THE_NETHER => world_root.join("DIM-1"),
        THE_END => world_root.join("DIM1"),
        _ => {
            let namespace = dim.namespace.as_deref().unwrap_or("minecraft");
            let path = dim.path.as_deref().unwrap_or(dim.id.as_str());
            world_root.join("dimensions").join(namespace).join(path)
        }
    }
}

/// `seed_world(server) → list<RegionDirectory>` (SPEC_FULL.md §4.C). For
/// every loaded dimension whose resolved path has a `region/` subdirectory,
/// enqueues one `RegionDirectory`. A hard failure enumerating dimensions
/// raises `WORLD_INDEX_FAILED`; a missing `region/` for one dimension is not
/// an error, just an absent target.
pub fn seed_world(host: &dyn HostBridge) -> Result<Vec<ScanTarget>> {
    let world_root = host.world_root();
    if !world_root.exists() {
        return Err(AuditError::Internal(format!(
            "world root {} does not exist",
            world_root.display()
        )));
    }

    let dimensions = host.loaded_dimensions();
    let mut targets = Vec::with_capacity(dimensions.len());
    for dim in dimensions {
        let dim_path = dimension_path(&world_root, &dim);
        let region_dir = dim_path.join("region");
        match region_dir.try_exists() {
            Ok(true) => targets.push(ScanTarget::RegionDirectory {
                dimension_id: dim.id,
                directory_path: region_dir,
            }),
            Ok(false) => {}
            Err(err) => warn!(dimension = %dim.id, error = %err, "failed to probe region directory"),
        }
    }
    Ok(targets)
}
