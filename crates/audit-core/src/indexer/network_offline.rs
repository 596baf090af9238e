use std::path::{Path, PathBuf};

use tracing::warn;

use crate::types::{ScanTarget, StorageId};

/// Candidate path fragments identifying a third-party network-storage mod's
/// on-disk data. Representative, not exhaustive — new mods are matched by
/// adding a keyword, not by changing the walk logic.
const KEYWORDS: [&str; 5] = [
    "refinedstorage",
    "appliedenergistics",
    "sophisticatedstorage",
    "storagenetwork",
    "rs2",
];

const MAX_WALK_DEPTH: usize = 6;
const MAX_FILES: usize = 10_000;

fn is_candidate(path: &Path) -> bool {
    let ext_ok = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("dat") || e.eq_ignore_ascii_case("nbt"))
        .unwrap_or(false);
    if !ext_ok {
        return false;
    }
    let lowered = path.to_string_lossy().to_lowercase();
    KEYWORDS.iter().any(|kw| lowered.contains(kw))
}

fn storage_mod_for(path: &Path) -> String {
    let lowered = path.to_string_lossy().to_lowercase();
    KEYWORDS
        .iter()
        .find(|kw| lowered.contains(*kw))
        .map(|kw| kw.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn walk(dir: &Path, depth: usize, remaining: &mut usize, out: &mut Vec<ScanTarget>) {
    if depth > MAX_WALK_DEPTH || *remaining == 0 {
        return;
    }
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(dir = %dir.display(), error = %err, "failed to read directory during network-offline seeding");
            return;
        }
    };

    for entry in entries.flatten() {
        if *remaining == 0 {
            break;
        }
        let path = entry.path();
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        if is_dir {
            walk(&path, depth + 1, remaining, out);
            continue;
        }
        if !is_candidate(&path) {
            continue;
        }
        *remaining -= 1;
        out.push(ScanTarget::OfflineData {
            storage_mod: storage_mod_for(&path),
            storage_id: StorageId::new(path.to_string_lossy().to_string()),
            path,
        });
    }
}

/// `seed_network_offline(world_root)` (SPEC_FULL.md §4.C): discovers
/// candidate third-party storage-network data files under `data/` and
/// `playerdata/`, bounded to 6 directory levels and 10 000 files total.
pub fn seed_network_offline(world_root: &Path) -> Vec<ScanTarget> {
    let mut out = Vec::new();
    let mut remaining = MAX_FILES;
    for subdir in ["data", "playerdata"] {
        let dir = world_root.join(subdir);
        if dir.is_dir() {
            walk(&dir, 0, &mut remaining, &mut out);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_matching_files_and_ignores_others() {
        let tmp = tempfile::tempdir().unwrap();
        let data = tmp.path().join("data");
        std::fs::create_dir_all(&data).unwrap();
        std::fs::write(data.join("refinedstorage_network.dat"), b"x").unwrap();
        std::fs::write(data.join("unrelated.dat"), b"x").unwrap();
        std::fs::write(data.join("refinedstorage_network.txt"), b"x").unwrap();

        let targets = seed_network_offline(tmp.path());
        assert_eq!(targets.len(), 1);
        match &targets[0] {
            ScanTarget::OfflineData { storage_mod, .. } => {
                assert_eq!(storage_mod, "refinedstorage");
            }
            _ => panic!("expected OfflineData"),
        }
    }

    #[test]
    fn missing_directories_yield_no_targets() {
        let tmp = tempfile::tempdir().unwrap();
        let targets = seed_network_offline(tmp.path());
        assert!(targets.is_empty());
    }

    #[test]
    fn respects_file_cap() {
        let tmp = tempfile::tempdir().unwrap();
        let playerdata = tmp.path().join("playerdata");
        std::fs::create_dir_all(&playerdata).unwrap();
        for i in 0..5 {
            std::fs::write(
                playerdata.join(format!("rs2_{i}.nbt")),
                b"x",
            )
            .unwrap();
        }
        let targets = seed_network_offline(tmp.path());
        assert_eq!(targets.len(), 5);
    }
}
