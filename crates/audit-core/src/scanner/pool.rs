use std::collections::HashMap;
use std::path::PathBuf;

use tokio::sync::mpsc;
use tracing::warn;

use crate::aggregator::ItemFilter;
use crate::region::{extract_block_entities, parse_region_filename, read_region};
use crate::types::{StorageId, WorldPosition};

use super::queues::{AggregatedItem, WorldSnapshotItem};

pub enum WorldJobOutcome {
    Directory {
        dimension_id: String,
        files: Vec<(String, PathBuf)>,
    },
    Chunk {
        items: Vec<WorldSnapshotItem>,
    },
    ReadFailed {
        dimension_id: String,
        path: PathBuf,
    },
}

pub enum OfflineJobOutcome {
    Aggregated(AggregatedItem),
    Failed { storage_id: StorageId },
}

/// Fixed-size worker pool shared by two logical job classes — "world-region
/// jobs" and "offline-data jobs" — each with its own completion channel, per
/// SPEC_FULL.md §4.D. Jobs run on `spawn_blocking`; the scheduler thread
/// only ever polls the channels non-blockingly (`try_recv`), never awaits.
pub struct WorkerPool {
    runtime: tokio::runtime::Handle,
    pool_size: usize,
    in_flight: usize,
    world_tx: mpsc::UnboundedSender<WorldJobOutcome>,
    world_rx: mpsc::UnboundedReceiver<WorldJobOutcome>,
    offline_tx: mpsc::UnboundedSender<OfflineJobOutcome>,
    offline_rx: mpsc::UnboundedReceiver<OfflineJobOutcome>,
}

impl WorkerPool {
    pub fn new(runtime: tokio::runtime::Handle, pool_size: usize) -> Self {
        let (world_tx, world_rx) = mpsc::unbounded_channel();
        let (offline_tx, offline_rx) = mpsc::unbounded_channel();
        Self {
            runtime,
            pool_size: pool_size.max(1),
            in_flight: 0,
            world_tx,
            world_rx,
            offline_tx,
            offline_rx,
        }
    }

    pub fn set_pool_size(&mut self, pool_size: usize) {
        self.pool_size = pool_size.max(1);
    }

    pub fn available_slots(&self) -> usize {
        self.pool_size.saturating_sub(self.in_flight)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn submit_list_directory(&mut self, dimension_id: String, dir: PathBuf) {
        self.in_flight += 1;
        let tx = self.world_tx.clone();
        self.runtime.spawn_blocking(move || {
            let files = list_region_files(&dir);
            let _ = tx.send(WorldJobOutcome::Directory {
                dimension_id,
                files,
            });
        });
    }

    pub fn submit_decode_region(
        &mut self,
        dimension_id: String,
        path: PathBuf,
        filter: ItemFilter,
    ) {
        self.in_flight += 1;
        let tx = self.world_tx.clone();
        self.runtime.spawn_blocking(move || {
            let outcome = match decode_region_file(&dimension_id, &path, &filter) {
                Ok(items) => WorldJobOutcome::Chunk { items },
                Err(()) => WorldJobOutcome::ReadFailed {
                    dimension_id: dimension_id.clone(),
                    path: path.clone(),
                },
            };
            let _ = tx.send(outcome);
        });
    }

    pub fn submit_decode_offline(
        &mut self,
        storage_id: StorageId,
        storage_mod: String,
        path: PathBuf,
        filter: ItemFilter,
    ) {
        self.in_flight += 1;
        let tx = self.offline_tx.clone();
        self.runtime.spawn_blocking(move || {
            let outcome = match decode_offline_file(&path, &filter) {
                Ok(item_counts) => OfflineJobOutcome::Aggregated(AggregatedItem {
                    storage_id,
                    storage_mod,
                    item_counts,
                }),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "offline-data decode failed");
                    OfflineJobOutcome::Failed { storage_id }
                }
            };
            let _ = tx.send(outcome);
        });
    }

    pub fn poll_world(&mut self) -> Option<WorldJobOutcome> {
        match self.world_rx.try_recv() {
            Ok(outcome) => {
                self.in_flight = self.in_flight.saturating_sub(1);
                Some(outcome)
            }
            Err(_) => None,
        }
    }

    pub fn poll_offline(&mut self) -> Option<OfflineJobOutcome> {
        match self.offline_rx.try_recv() {
            Ok(outcome) => {
                self.in_flight = self.in_flight.saturating_sub(1);
                Some(outcome)
            }
            Err(_) => None,
        }
    }
}

fn list_region_files(dir: &std::path::Path) -> Vec<(String, PathBuf)> {
    let mut out = Vec::new();
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(dir = %dir.display(), error = %err, "failed to list region directory");
            return out;
        }
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if parse_region_filename(name).is_some() {
            out.push((name.to_string(), path));
        }
    }
    out
}

fn decode_region_file(
    dimension_id: &str,
    path: &std::path::Path,
    filter: &ItemFilter,
) -> Result<Vec<WorldSnapshotItem>, ()> {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return Ok(Vec::new());
    };
    let Some((rx, rz)) = parse_region_filename(name) else {
        return Ok(Vec::new());
    };
    let chunks = match read_region(path, rx, rz) {
        Ok(chunks) => chunks,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed to read region file");
            return Err(());
        }
    };

    let mut out = Vec::new();
    for chunk in chunks {
        for entity in extract_block_entities(&chunk.tree) {
            let Some(x) = entity.get("x").and_then(|v| v.as_i64()) else {
                continue;
            };
            let Some(y) = entity.get("y").and_then(|v| v.as_i64()) else {
                continue;
            };
            let Some(z) = entity.get("z").and_then(|v| v.as_i64()) else {
                continue;
            };
            let storage_mod = entity
                .get("id")
                .and_then(|v| v.as_str())
                .and_then(|id| id.split_once(':'))
                .map(|(ns, _)| ns.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            let storage_id = StorageId::new(format!("{dimension_id}@{x},{y},{z}"));

            let agg_value = crate::region::NbtValue::Compound(entity.clone()).to_agg_value();
            let outcome = crate::aggregator::aggregate_nested(&agg_value, filter);
            if outcome.counts.is_empty() {
                continue;
            }
            out.push(WorldSnapshotItem {
                dimension: dimension_id.to_string(),
                position: WorldPosition {
                    dimension: dimension_id.to_string(),
                    x: x as i32,
                    y: y as i32,
                    z: z as i32,
                },
                storage_mod,
                storage_id,
                item_counts: outcome.counts.into_iter().collect::<HashMap<_, _>>(),
            });
        }
    }
    Ok(out)
}

fn decode_offline_file(
    path: &std::path::Path,
    filter: &ItemFilter,
) -> crate::error::Result<HashMap<String, i64>> {
    use std::io::Read;

    let raw = std::fs::read(path)?;
    let decompressed = if raw.len() >= 2 && raw[0] == 0x1f && raw[1] == 0x8b {
        let mut decoder = flate2::read::GzDecoder::new(&raw[..]);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out)?;
        out
    } else {
        raw
    };
    let tree = crate::region::parse_nbt(&decompressed)?;
    let value = tree.to_agg_value();
    let outcome = crate::aggregator::aggregate_nested(&value, filter);
    Ok(outcome.counts.into_iter().collect())
}
