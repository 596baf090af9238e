use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::aggregator::{ItemFilter, Value};
use crate::error::{AuditError, Result};
use crate::region::{parse_nbt, NbtValue};
use crate::types::{ScanTarget, StorageId};

/// File holding the `{uuid, contents}` pairs for "backpack-like" nested
/// storage, per SPEC_FULL.md §4.C. Relative to the world root.
const NESTED_STORAGE_RELATIVE_PATH: &str = "data/storage_backpacks.dat";

const MAX_DEPTH: usize = 8;
const COUNT_KEYS: [&str; 3] = ["Count", "count", "amount"];

static UUID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .expect("static regex")
});

/// Raw `uuid -> contents` table read from the nested-storage file.
struct NestedIndex {
    by_uuid: HashMap<String, Value>,
}

fn load_nested_file(path: &Path) -> Result<NestedIndex> {
    let compressed = std::fs::read(path)?;
    let mut decoder = flate2::read::GzDecoder::new(&compressed[..]);
    let mut raw = Vec::new();
    decoder
        .read_to_end(&mut raw)
        .map_err(|e| AuditError::Decode(format!("failed to gunzip nested storage file: {e}")))?;
    let tree = parse_nbt(&raw)?;
    let root = tree
        .as_compound()
        .ok_or_else(|| AuditError::Decode("nested storage root is not a compound".into()))?;

    let mut by_uuid = HashMap::new();
    if let Some(NbtValue::List(entries)) = root.get("entries") {
        for entry in entries {
            let Some(entry_map) = entry.as_compound() else {
                continue;
            };
            let Some(uuid) = entry_uuid(entry_map) else {
                continue;
            };
            let Some(contents) = entry_map.get("contents") else {
                continue;
            };
            by_uuid.insert(uuid, contents.to_agg_value());
        }
    }
    Ok(NestedIndex { by_uuid })
}

fn entry_uuid(map: &indexmap::IndexMap<String, NbtValue>) -> Option<String> {
    if let Some(v) = map.get("uuid") {
        if let Some(s) = v.as_str() {
            return Some(s.to_string());
        }
        if let NbtValue::IntArray(ints) = v {
            return uuid_from_int_array(ints);
        }
    }
    None
}

fn uuid_from_int_array(ints: &[i32]) -> Option<String> {
    if ints.len() != 4 {
        return None;
    }
    let mut bytes = [0u8; 16];
    for (i, word) in ints.iter().enumerate() {
        bytes[i * 4..i * 4 + 4].copy_from_slice(&word.to_be_bytes());
    }
    Some(uuid::Uuid::from_bytes(bytes).to_string())
}

fn uuid_from_most_least(most: i64, least: i64) -> String {
    let mut bytes = [0u8; 16];
    bytes[0..8].copy_from_slice(&most.to_be_bytes());
    bytes[8..16].copy_from_slice(&least.to_be_bytes());
    uuid::Uuid::from_bytes(bytes).to_string()
}

/// Reads a value known (by its key) to hold a UUID, in any of the binary
/// shapes SPEC_FULL.md §4.C names: a plain string, a 4-element int array, or
/// a `{most, least}` long pair.
fn uuid_value(value: &Value) -> Option<String> {
    match value {
        Value::Str(s) => Some(s.to_string()),
        Value::Array(items) if items.len() == 4 => {
            let mut ints = Vec::with_capacity(4);
            for item in items.iter() {
                ints.push(item.as_int()? as i32);
            }
            uuid_from_int_array(&ints)
        }
        Value::Compound(map) => {
            let most = map.get("most").and_then(Value::as_int);
            let least = map.get("least").and_then(Value::as_int);
            most.zip(least).map(|(m, l)| uuid_from_most_least(m, l))
        }
        _ => None,
    }
}

/// Falls back to scanning a compound's direct string children for text that
/// merely *looks* like a canonical UUID, with no key naming it as one.
fn scan_for_uuid_text(map: &indexmap::IndexMap<String, Value>) -> Option<String> {
    map.values().find_map(|v| match v {
        Value::Str(s) if UUID_PATTERN.is_match(s) => Some(s.to_string()),
        _ => None,
    })
}

/// Extracts a nested-storage UUID reference from a stack-like compound, per
/// the four forms named in SPEC_FULL.md §4.C: a structured `storage_uuid`
/// component, an int-array encoding, a `{most,least}` long pair, or a
/// canonical-text match — searched directly and one level under a `tag` or
/// `components` wrapper (the common "nbt payload" convention).
fn extract_nested_uuid(map: &indexmap::IndexMap<String, Value>) -> Option<String> {
    if let Some(v) = map.get("storage_uuid") {
        if let Some(u) = uuid_value(v) {
            return Some(u);
        }
    }
    if let (Some(most), Some(least)) = (
        map.get("UUIDMost").and_then(Value::as_int),
        map.get("UUIDLeast").and_then(Value::as_int),
    ) {
        return Some(uuid_from_most_least(most, least));
    }
    for wrapper_key in ["tag", "components"] {
        if let Some(Value::Compound(inner)) = map.get(wrapper_key) {
            if let Some(v) = inner.get("storage_uuid") {
                if let Some(u) = uuid_value(v) {
                    return Some(u);
                }
            }
            if let (Some(most), Some(least)) = (
                inner.get("UUIDMost").and_then(Value::as_int),
                inner.get("UUIDLeast").and_then(Value::as_int),
            ) {
                return Some(uuid_from_most_least(most, least));
            }
            if let Some(u) = scan_for_uuid_text(inner) {
                return Some(u);
            }
        }
    }
    scan_for_uuid_text(map)
}

/// A stack is "backpack-like" when its item-id's path segment names a
/// portable-storage item — the namespace/path convention SPEC_FULL.md §4.C
/// asks implementers to match on.
fn is_backpack_like(item_id: &str) -> bool {
    item_id
        .split_once(':')
        .map(|(_, path)| path.contains("backpack") || path.contains("storage_bag"))
        .unwrap_or(false)
}

fn recognize_stack(map: &indexmap::IndexMap<String, Value>) -> Option<(String, i64)> {
    let id = map.get("id")?.as_str()?;
    let item_id = id.trim().to_lowercase();
    if !item_id.contains(':') {
        return None;
    }
    for key in COUNT_KEYS {
        if let Some(count) = map.get(key).and_then(Value::as_int) {
            if count > 0 {
                return Some((item_id, count));
            }
        }
    }
    None
}

struct Resolver<'a> {
    by_uuid: &'a HashMap<String, Value>,
    memo: HashMap<String, (HashMap<String, i64>, bool)>,
    visiting: HashSet<String>,
}

impl<'a> Resolver<'a> {
    fn new(by_uuid: &'a HashMap<String, Value>) -> Self {
        Self {
            by_uuid,
            memo: HashMap::new(),
            visiting: HashSet::new(),
        }
    }

    /// Fully resolves one root UUID's aggregate, following nested UUID
    /// references discovered along the way. Returns `(counts, truncated)`;
    /// truncation (depth/cycle) is logged by the caller as partial
    /// completion, never surfaced as an error.
    fn resolve(&mut self, uuid: &str, filter: &ItemFilter, depth: usize) -> (HashMap<String, i64>, bool) {
        if let Some(cached) = self.memo.get(uuid) {
            return cached.clone();
        }
        if depth > MAX_DEPTH || self.visiting.contains(uuid) {
            return (HashMap::new(), true);
        }
        let Some(contents) = self.by_uuid.get(uuid) else {
            return (HashMap::new(), false);
        };

        self.visiting.insert(uuid.to_string());
        let mut counts = HashMap::new();
        let mut truncated = false;
        self.walk(contents, filter, 1, depth, &mut counts, &mut truncated);
        self.visiting.remove(uuid);

        let result = (counts, truncated);
        if !result.1 {
            // A truncated result depends on the `visiting` stack/depth that
            // produced it, not just on `uuid` — caching it would leak that
            // path-dependence into unrelated callers resolving the same
            // UUID as an independent root.
            self.memo.insert(uuid.to_string(), result.clone());
        }
        result
    }

    fn walk(
        &mut self,
        node: &Value,
        filter: &ItemFilter,
        ambient: i64,
        depth: usize,
        counts: &mut HashMap<String, i64>,
        truncated: &mut bool,
    ) {
        if depth > MAX_DEPTH {
            *truncated = true;
            return;
        }
        match node {
            Value::Compound(map) => {
                if let Some((item_id, count)) = recognize_stack(map) {
                    if filter.accepts(&item_id) {
                        let entry = counts.entry(item_id.clone()).or_insert(0);
                        *entry = entry.saturating_add(count.saturating_mul(ambient));
                    }
                    if is_backpack_like(&item_id) {
                        if let Some(nested_uuid) = extract_nested_uuid(map) {
                            let child_ambient = ambient.saturating_mul(count.max(1)).min(i32::MAX as i64);
                            let (nested_counts, nested_truncated) =
                                self.resolve(&nested_uuid, filter, depth + 1);
                            if nested_truncated {
                                *truncated = true;
                            }
                            for (item_id, nested_count) in nested_counts {
                                let entry = counts.entry(item_id).or_insert(0);
                                *entry = entry.saturating_add(nested_count.saturating_mul(child_ambient));
                            }
                        }
                    }
                    let child_ambient = ambient.saturating_mul(count.max(1)).min(i32::MAX as i64);
                    for value in map.values() {
                        self.walk(value, filter, child_ambient, depth + 1, counts, truncated);
                    }
                } else {
                    for value in map.values() {
                        self.walk(value, filter, ambient, depth + 1, counts, truncated);
                    }
                }
            }
            Value::List(items) | Value::Array(items) => {
                for item in items.iter() {
                    self.walk(item, filter, ambient, depth + 1, counts, truncated);
                }
            }
            Value::Optional(inner) => {
                if let Some(inner) = inner {
                    self.walk(inner, filter, ambient, depth + 1, counts, truncated);
                }
            }
            Value::Int(_) | Value::Float(_) | Value::Str(_) | Value::Bytes(_) => {}
        }
    }
}

/// `seed_nested_storage(world_root) → list<NestedStorageRoot>`
/// (SPEC_FULL.md §4.C). Reads the mod-specific `.dat` file, resolves every
/// root UUID's aggregate while following nested UUID references, and yields
/// one already-aggregated target per root. A missing or unreadable base
/// file raises `NESTED_DATA_UNAVAILABLE`; truncation from depth/cycle bounds
/// is silent (the caller decides whether to surface `PARTIAL_COMPLETED`).
pub fn seed_nested_storage(world_root: &Path, filter: &ItemFilter) -> Result<(Vec<ScanTarget>, bool)> {
    let path = world_root.join(NESTED_STORAGE_RELATIVE_PATH);
    if !path.exists() {
        return Ok((Vec::new(), false));
    }
    let index = load_nested_file(&path)
        .map_err(|e| AuditError::Internal(format!("nested storage data unavailable: {e}")))?;

    let mut resolver = Resolver::new(&index.by_uuid);
    let mut targets = Vec::with_capacity(index.by_uuid.len());
    let mut any_truncated = false;

    let mut uuids: Vec<&String> = index.by_uuid.keys().collect();
    uuids.sort();
    for uuid in uuids {
        let (counts, truncated) = resolver.resolve(uuid, filter, 0);
        any_truncated |= truncated;
        targets.push(ScanTarget::NestedStorageRoot {
            storage_id: StorageId::new(uuid.clone()),
            item_counts: counts,
        });
    }

    Ok((targets, any_truncated))
}

fn collect_backpack_uuids(node: &Value, depth: usize, seen: &mut HashSet<String>, out: &mut Vec<String>) {
    if depth > MAX_DEPTH {
        return;
    }
    match node {
        Value::Compound(map) => {
            if let Some((item_id, _count)) = recognize_stack(map) {
                if is_backpack_like(&item_id) {
                    if let Some(uuid) = extract_nested_uuid(map) {
                        if seen.insert(uuid.clone()) {
                            out.push(uuid);
                        }
                    }
                }
            }
            for value in map.values() {
                collect_backpack_uuids(value, depth + 1, seen, out);
            }
        }
        Value::List(items) | Value::Array(items) => {
            for item in items.iter() {
                collect_backpack_uuids(item, depth + 1, seen, out);
            }
        }
        Value::Optional(inner) => {
            if let Some(inner) = inner {
                collect_backpack_uuids(inner, depth + 1, seen, out);
            }
        }
        Value::Int(_) | Value::Float(_) | Value::Str(_) | Value::Bytes(_) => {}
    }
}

/// Scans a player's own item slots (inventory or ender chest) for
/// backpack-like stacks carrying a nested-storage UUID reference, then
/// resolves each distinct UUID found against the same `storage_backpacks.dat`
/// table `seed_nested_storage` uses for world containers. Returns one
/// `(storage_id, item_counts, truncated)` per distinct UUID discovered;
/// the player's own top-level stacks are counted separately by the caller
/// and are not duplicated here. A missing nested-storage file yields no
/// roots rather than an error, since a player can simply own no backpacks.
pub fn resolve_player_linked_storage(
    world_root: &Path,
    items: &[Value],
    filter: &ItemFilter,
) -> Result<Vec<(StorageId, HashMap<String, i64>, bool)>> {
    let path = world_root.join(NESTED_STORAGE_RELATIVE_PATH);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let index = load_nested_file(&path)
        .map_err(|e| AuditError::Internal(format!("nested storage data unavailable: {e}")))?;

    let mut seen = HashSet::new();
    let mut uuids = Vec::new();
    for item in items {
        collect_backpack_uuids(item, 0, &mut seen, &mut uuids);
    }

    let mut resolver = Resolver::new(&index.by_uuid);
    Ok(uuids
        .into_iter()
        .map(|uuid| {
            let (counts, truncated) = resolver.resolve(&uuid, filter, 0);
            (StorageId::new(uuid), counts, truncated)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use std::sync::Arc;

    fn stack(id: &str, count: i64) -> Value {
        let mut map = IndexMap::new();
        map.insert("id".to_string(), Value::str(id));
        map.insert("Count".to_string(), Value::Int(count));
        Value::Compound(Arc::new(map))
    }

    #[test]
    fn resolves_simple_root_with_no_links() {
        let mut by_uuid = HashMap::new();
        by_uuid.insert(
            "root".to_string(),
            Value::list(vec![stack("minecraft:emerald", 3)]),
        );
        let mut resolver = Resolver::new(&by_uuid);
        let (counts, truncated) = resolver.resolve("root", &ItemFilter::accept_all(), 0);
        assert_eq!(counts.get("minecraft:emerald"), Some(&3));
        assert!(!truncated);
    }

    #[test]
    fn cycle_a_to_b_to_a_counts_each_once() {
        let mut backpack_to_b = IndexMap::new();
        backpack_to_b.insert("id".to_string(), Value::str("storagemod:backpack"));
        backpack_to_b.insert("Count".to_string(), Value::Int(1));
        backpack_to_b.insert("storage_uuid".to_string(), Value::str("B"));

        let mut backpack_to_a = IndexMap::new();
        backpack_to_a.insert("id".to_string(), Value::str("storagemod:backpack"));
        backpack_to_a.insert("Count".to_string(), Value::Int(1));
        backpack_to_a.insert("storage_uuid".to_string(), Value::str("A"));

        let mut by_uuid = HashMap::new();
        by_uuid.insert(
            "A".to_string(),
            Value::list(vec![
                stack("minecraft:emerald", 3),
                Value::Compound(Arc::new(backpack_to_b)),
            ]),
        );
        by_uuid.insert(
            "B".to_string(),
            Value::list(vec![
                stack("minecraft:emerald", 3),
                Value::Compound(Arc::new(backpack_to_a)),
            ]),
        );

        // Each root is resolved independently (as `seed_nested_storage` does,
        // once per UUID in the table), not as a single combined walk — so
        // resolving B after A must not reuse a path-truncated cache entry
        // computed while A was still on the visiting stack.
        let mut resolver = Resolver::new(&by_uuid);
        let (counts_a, _truncated) = resolver.resolve("A", &ItemFilter::accept_all(), 0);
        assert_eq!(counts_a.get("minecraft:emerald"), Some(&6));

        let (counts_b, _truncated) = resolver.resolve("B", &ItemFilter::accept_all(), 0);
        assert_eq!(counts_b.get("minecraft:emerald"), Some(&6));
    }

    #[test]
    fn dangling_reference_is_empty_not_an_error() {
        let mut backpack = IndexMap::new();
        backpack.insert("id".to_string(), Value::str("storagemod:backpack"));
        backpack.insert("Count".to_string(), Value::Int(1));
        backpack.insert("storage_uuid".to_string(), Value::str("missing-uuid"));

        let mut by_uuid = HashMap::new();
        by_uuid.insert(
            "root".to_string(),
            Value::list(vec![Value::Compound(Arc::new(backpack))]),
        );
        let mut resolver = Resolver::new(&by_uuid);
        let (_counts, truncated) = resolver.resolve("root", &ItemFilter::accept_all(), 0);
        assert!(!truncated);
    }
}
