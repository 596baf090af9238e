//! Environment-variable overlay applied on top of the persisted config file,
//! one level below an explicit remote config-sync apply. Each recognised
//! scanner config key has an env var of the same name upper-cased (e.g.
//! `scan_containers_per_tick` -> `SCAN_CONTAINERS_PER_TICK`).

use serde_json::{Map, Value};

/// Accepted truthy values (case-insensitive): `1`, `true`, `yes`, `on`.
/// Accepted falsy values: `0`, `false`, `no`, `off`.
fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Clone, Copy)]
enum FieldKind {
    Bool,
    Int,
    Float,
    StringArray,
}

const FIELDS: &[(&str, FieldKind)] = &[
    ("scan_enabled", FieldKind::Bool),
    ("scan_interval_minutes", FieldKind::Int),
    ("scan_rescan_cooldown_minutes", FieldKind::Int),
    ("scan_containers_per_tick", FieldKind::Int),
    ("scan_rs2_networks_per_tick", FieldKind::Int),
    ("scan_include_containers", FieldKind::Bool),
    ("scan_include_rs2", FieldKind::Bool),
    ("scan_max_avg_tick_ms", FieldKind::Float),
    ("scan_max_online_players", FieldKind::Int),
    ("scan_world_offline_enabled", FieldKind::Bool),
    ("scan_sb_offline_enabled", FieldKind::Bool),
    ("scan_rs2_offline_enabled", FieldKind::Bool),
    ("scan_offline_chunks_per_tick", FieldKind::Int),
    ("scan_offline_sources_per_tick", FieldKind::Int),
    ("scan_offline_workers", FieldKind::Int),
    ("scan_offline_chunk_interval_ms", FieldKind::Int),
    ("scan_include_online_runtime", FieldKind::Bool),
    ("scan_item_filter", FieldKind::StringArray),
    ("audit_enabled", FieldKind::Bool),
    ("audit_interval_minutes", FieldKind::Int),
    ("audit_players_per_tick", FieldKind::Int),
    ("audit_item_filter", FieldKind::StringArray),
];

/// Overrides `map` in place with any recognised env vars that are set.
/// Unset or unparsable env vars leave the existing value untouched; a
/// present-but-malformed value is logged and skipped rather than rejected,
/// since an overlay pass has no good way to surface a parse error upstream.
pub fn apply_overlay(map: &mut Map<String, Value>) {
    for (key, kind) in FIELDS {
        let var_name = key.to_ascii_uppercase();
        let Ok(raw) = std::env::var(&var_name) else {
            continue;
        };
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        match kind {
            FieldKind::Bool => match parse_bool(raw) {
                Some(value) => {
                    map.insert(key.to_string(), Value::Bool(value));
                }
                None => tracing::warn!(var = %var_name, value = %raw, "ignoring unparsable boolean env override"),
            },
            FieldKind::Int => match raw.parse::<i64>() {
                Ok(value) => {
                    map.insert(key.to_string(), Value::Number(value.into()));
                }
                Err(_) => tracing::warn!(var = %var_name, value = %raw, "ignoring unparsable integer env override"),
            },
            FieldKind::Float => match raw.parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
                Some(value) => {
                    map.insert(key.to_string(), Value::Number(value));
                }
                None => tracing::warn!(var = %var_name, value = %raw, "ignoring unparsable float env override"),
            },
            FieldKind::StringArray => {
                let items = parse_csv(raw).into_iter().map(Value::String).collect();
                map.insert(key.to_string(), Value::Array(items));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Env vars are process-global; serialise tests that touch them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn overrides_a_bool_field_when_set() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("SCAN_ENABLED", "false");
        let mut map = Map::new();
        map.insert("scan_enabled".to_string(), Value::Bool(true));
        apply_overlay(&mut map);
        assert_eq!(map["scan_enabled"], Value::Bool(false));
        std::env::remove_var("SCAN_ENABLED");
    }

    #[test]
    fn overrides_a_csv_array_field() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("SCAN_ITEM_FILTER", "minecraft:diamond, minecraft:emerald");
        let mut map = Map::new();
        apply_overlay(&mut map);
        let items = map["scan_item_filter"].as_array().unwrap();
        assert_eq!(items.len(), 2);
        std::env::remove_var("SCAN_ITEM_FILTER");
    }

    #[test]
    fn leaves_existing_value_when_env_var_is_unset() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var("AUDIT_ENABLED");
        let mut map = Map::new();
        map.insert("audit_enabled".to_string(), Value::Bool(false));
        apply_overlay(&mut map);
        assert_eq!(map["audit_enabled"], Value::Bool(false));
    }
}
