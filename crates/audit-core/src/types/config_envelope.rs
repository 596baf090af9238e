use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::ids::ServerId;

/// Delivered by the Config Sync component. `config` is a loose JSON object so
/// unknown keys are preserved verbatim and round-tripped on republish, per
/// SPEC_FULL.md §3.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConfigEnvelope {
    pub server_id: ServerId,
    pub revision: u64,
    pub updated_at_ms: i64,
    pub updated_by: String,
    pub checksum_sha256: String,
    pub config: Map<String, Value>,
}

impl ConfigEnvelope {
    /// Top-level keys present in `self.config` but not in `other.config`, or
    /// vice versa, or present in both with differing values. Used to compute
    /// `changed_keys` for the ack payload (§4.G).
    pub fn changed_keys(&self, previous: Option<&ConfigEnvelope>) -> Vec<String> {
        let mut changed: Vec<String> = match previous {
            None => self.config.keys().cloned().collect(),
            Some(prev) => {
                let mut keys: Vec<String> = Vec::new();
                for (key, value) in self.config.iter() {
                    if prev.config.get(key) != Some(value) {
                        keys.push(key.clone());
                    }
                }
                for key in prev.config.keys() {
                    if !self.config.contains_key(key) {
                        keys.push(key.clone());
                    }
                }
                keys
            }
        };
        changed.sort();
        changed.dedup();
        changed
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AckStatus {
    Applied,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConfigAck {
    pub server_id: ServerId,
    pub revision: u64,
    pub status: AckStatus,
    pub applied_at_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub changed_keys: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(config: Map<String, Value>) -> ConfigEnvelope {
        ConfigEnvelope {
            server_id: ServerId("srv-1".into()),
            revision: 1,
            updated_at_ms: 0,
            updated_by: "test".into(),
            checksum_sha256: "deadbeef".into(),
            config,
        }
    }

    #[test]
    fn changed_keys_against_none_is_all_keys() {
        let mut map = Map::new();
        map.insert("a".into(), Value::from(1));
        map.insert("b".into(), Value::from(2));
        let env = envelope(map);
        let mut changed = env.changed_keys(None);
        changed.sort();
        assert_eq!(changed, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn changed_keys_is_symmetric_diff() {
        let mut old_map = Map::new();
        old_map.insert("scan_item_filter".into(), Value::from(Vec::<String>::new()));
        old_map.insert("scan_enabled".into(), Value::from(true));
        let old = envelope(old_map);

        let mut new_map = Map::new();
        new_map.insert(
            "scan_item_filter".into(),
            Value::from(vec!["minecraft:diamond"]),
        );
        new_map.insert("scan_enabled".into(), Value::from(true));
        let new = envelope(new_map);

        assert_eq!(new.changed_keys(Some(&old)), vec!["scan_item_filter"]);
    }
}
