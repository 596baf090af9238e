//! Per-field validation for a parsed [`audit_core::ScannerConfig`], run after
//! parsing/overlay and before the value is allowed to reach the live config
//! cell (SPEC_FULL.md's "validates values before they ever reach the live
//! config cell").

use audit_core::ScannerConfig;

use crate::error::{ConfigError, Result};

/// Item filter entries are matched against the aggregator's `namespace:path`
/// item-id contract; an entry with no `:` can never match anything and is
/// almost certainly a typo.
pub fn validate_item_filter(filter: &[String]) -> std::result::Result<(), String> {
    for entry in filter {
        if !entry.contains(':') {
            return Err(format!(
                "item filter entry '{entry}' must be a namespace:path identifier"
            ));
        }
    }
    Ok(())
}

/// A per-tick budget of zero would start sessions that can never drain.
pub fn validate_per_tick_budget(field: &str, value: u32) -> std::result::Result<(), String> {
    if value == 0 {
        return Err(format!("{field} must be greater than zero"));
    }
    Ok(())
}

/// `scan_offline_workers` is clamped to 16 at runtime; anything wildly above
/// that is almost certainly a misconfiguration rather than an intentional
/// request for more parallelism than will ever be used.
pub fn validate_worker_count(workers: usize) -> std::result::Result<(), String> {
    if workers > 1024 {
        return Err(format!(
            "scan_offline_workers={workers} is implausibly large (pool is capped at 16)"
        ));
    }
    Ok(())
}

/// `-1` is the documented "unlimited" sentinel; any other negative value has
/// no defined meaning.
pub fn validate_max_online_players(value: i32) -> std::result::Result<(), String> {
    if value < -1 {
        return Err(format!(
            "scan_max_online_players={value} must be -1 (unlimited) or >= 0"
        ));
    }
    Ok(())
}

pub fn validate(cfg: &ScannerConfig) -> Result<()> {
    validate_item_filter(&cfg.scan_item_filter).map_err(ConfigError::Validation)?;
    validate_item_filter(&cfg.audit_item_filter).map_err(ConfigError::Validation)?;
    validate_per_tick_budget("scan_containers_per_tick", cfg.scan_containers_per_tick)
        .map_err(ConfigError::Validation)?;
    validate_per_tick_budget("scan_rs2_networks_per_tick", cfg.scan_rs2_networks_per_tick)
        .map_err(ConfigError::Validation)?;
    validate_per_tick_budget("scan_offline_chunks_per_tick", cfg.scan_offline_chunks_per_tick)
        .map_err(ConfigError::Validation)?;
    validate_per_tick_budget("scan_offline_sources_per_tick", cfg.scan_offline_sources_per_tick)
        .map_err(ConfigError::Validation)?;
    validate_per_tick_budget("audit_players_per_tick", cfg.audit_players_per_tick)
        .map_err(ConfigError::Validation)?;
    validate_worker_count(cfg.scan_offline_workers).map_err(ConfigError::Validation)?;
    validate_max_online_players(cfg.scan_max_online_players).map_err(ConfigError::Validation)?;
    Ok(())
}
