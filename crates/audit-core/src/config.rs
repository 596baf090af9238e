use serde::{Deserialize, Serialize};

/// Domain configuration consumed by the scanner, scheduler, and config sync
/// components. `audit-config` owns parsing this out of the persisted file
/// format and environment overlay; this crate only owns the shape and the
/// defaults from SPEC_FULL.md §6.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    pub scan_enabled: bool,
    pub scan_interval_minutes: i64,
    pub scan_rescan_cooldown_minutes: i64,
    pub scan_containers_per_tick: u32,
    pub scan_rs2_networks_per_tick: u32,
    pub scan_include_containers: bool,
    pub scan_include_rs2: bool,
    pub scan_max_avg_tick_ms: f64,
    pub scan_max_online_players: i32,
    pub scan_world_offline_enabled: bool,
    pub scan_sb_offline_enabled: bool,
    pub scan_rs2_offline_enabled: bool,
    pub scan_offline_chunks_per_tick: u32,
    pub scan_offline_sources_per_tick: u32,
    pub scan_offline_workers: usize,
    pub scan_offline_chunk_interval_ms: u64,
    pub scan_include_online_runtime: bool,
    pub scan_item_filter: Vec<String>,

    pub audit_enabled: bool,
    pub audit_interval_minutes: i64,
    pub audit_players_per_tick: u32,
    pub audit_item_filter: Vec<String>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            scan_enabled: true,
            scan_interval_minutes: 1440,
            scan_rescan_cooldown_minutes: 1440,
            scan_containers_per_tick: 1,
            scan_rs2_networks_per_tick: 1,
            scan_include_containers: true,
            scan_include_rs2: true,
            scan_max_avg_tick_ms: 25.0,
            scan_max_online_players: -1,
            scan_world_offline_enabled: true,
            scan_sb_offline_enabled: true,
            scan_rs2_offline_enabled: true,
            scan_offline_chunks_per_tick: 1,
            scan_offline_sources_per_tick: 1,
            scan_offline_workers: 1,
            scan_offline_chunk_interval_ms: 1000,
            scan_include_online_runtime: false,
            scan_item_filter: Vec::new(),

            audit_enabled: true,
            audit_interval_minutes: 1440,
            audit_players_per_tick: 1,
            audit_item_filter: Vec::new(),
        }
    }
}

impl ScannerConfig {
    /// Worker-pool size per SPEC_FULL.md §4.D: `min(16, cpu_count,
    /// scan_offline_workers)`, and `scan_offline_workers = 0` is treated as 1.
    pub fn worker_pool_size(&self, cpu_count: usize) -> usize {
        let configured = if self.scan_offline_workers == 0 {
            1
        } else {
            self.scan_offline_workers
        };
        configured.min(16).min(cpu_count.max(1))
    }

    pub fn rescan_cooldown_ms(&self) -> i64 {
        self.scan_rescan_cooldown_minutes.max(0) * 60_000
    }

    pub fn scan_interval_ms(&self) -> Option<i64> {
        if self.scan_interval_minutes <= 0 {
            None
        } else {
            Some(self.scan_interval_minutes * 60_000)
        }
    }

    pub fn audit_interval_ms(&self) -> Option<i64> {
        if self.audit_interval_minutes <= 0 {
            None
        } else {
            Some(self.audit_interval_minutes * 60_000)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_workers_is_treated_as_one() {
        let mut cfg = ScannerConfig::default();
        cfg.scan_offline_workers = 0;
        assert_eq!(cfg.worker_pool_size(8), 1);
    }

    #[test]
    fn pool_size_capped_at_sixteen_and_cpu_count() {
        let mut cfg = ScannerConfig::default();
        cfg.scan_offline_workers = 64;
        assert_eq!(cfg.worker_pool_size(8), 8);
        assert_eq!(cfg.worker_pool_size(32), 16);
    }

    #[test]
    fn non_positive_interval_disables_periodic_trigger() {
        let mut cfg = ScannerConfig::default();
        cfg.scan_interval_minutes = 0;
        assert_eq!(cfg.scan_interval_ms(), None);
    }
}
