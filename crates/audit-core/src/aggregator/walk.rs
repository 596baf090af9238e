use std::collections::{HashMap, HashSet};

use super::value::Value;

/// Bounds from SPEC_FULL.md §3's "Traversal Context": `max-depth = 8`,
/// `max-node-visits-per-root = 4096`.
const MAX_DEPTH: usize = 8;
const MAX_NODE_VISITS: i64 = 4096;

/// Candidate keys for a stack's count, checked in order — "first positive
/// wins" per §4.A.
const COUNT_KEYS: [&str; 3] = ["Count", "count", "amount"];

/// Normalised, non-empty set of accepted item-ids; empty means "accept all".
#[derive(Debug, Clone, Default)]
pub struct ItemFilter {
    accepted: HashSet<String>,
}

impl ItemFilter {
    pub fn new(ids: impl IntoIterator<Item = String>) -> Self {
        let accepted = ids
            .into_iter()
            .map(|id| id.trim().to_lowercase())
            .collect();
        Self { accepted }
    }

    pub fn accept_all() -> Self {
        Self::default()
    }

    pub fn accepts(&self, item_id: &str) -> bool {
        self.accepted.is_empty() || self.accepted.contains(item_id)
    }
}

/// Result of a bounded traversal. `truncated` is set, never an `Err`, when
/// the depth or visit budget was exhausted on any branch — see SPEC_FULL.md
/// §9's `TraversalOutcome::Truncated` mapping from Java-style exceptions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TraversalOutcome {
    pub counts: HashMap<String, i64>,
    pub truncated: bool,
}

impl TraversalOutcome {
    fn merge_count(&mut self, item_id: String, count: i64) {
        let entry = self.counts.entry(item_id).or_insert(0);
        *entry = entry.saturating_add(count);
    }
}

struct Context {
    visited: HashSet<usize>,
    remaining_visits: i64,
    truncated: bool,
}

impl Context {
    fn new() -> Self {
        Self {
            visited: HashSet::new(),
            remaining_visits: MAX_NODE_VISITS,
            truncated: false,
        }
    }

    /// Returns `false` (and marks truncated) if this node should not be
    /// descended into — either it has already been visited (a cycle or a
    /// shared sub-structure reached twice) or the visit budget is spent.
    fn enter(&mut self, node: &Value) -> bool {
        let Some(identity) = node.identity() else {
            return true;
        };
        if self.visited.contains(&identity) {
            return false;
        }
        if self.remaining_visits <= 0 {
            self.truncated = true;
            return false;
        }
        self.visited.insert(identity);
        self.remaining_visits -= 1;
        true
    }
}

/// A stack-like compound: has an `"id"` key whose value contains `":"`, and
/// one of `COUNT_KEYS` with a positive value.
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

/// Saturating per-level multiplier, per §4.A: "max(1, stack.count) clamped
/// so the cumulative multiplier never overflows 32-bit; saturates at
/// `i32::MAX`."
fn next_multiplier(ambient: i64, stack_count: i64) -> i64 {
    let factor = stack_count.max(1);
    ambient.saturating_mul(factor).min(i32::MAX as i64)
}

fn walk(node: &Value, filter: &ItemFilter, ambient: i64, depth: usize, ctx: &mut Context, out: &mut TraversalOutcome) {
    if depth > MAX_DEPTH {
        ctx.truncated = true;
        return;
    }
    if !ctx.enter(node) {
        return;
    }

    match node {
        Value::Compound(map) => {
            if let Some((item_id, count)) = recognize_stack(map) {
                if filter.accepts(&item_id) {
                    out.merge_count(item_id.clone(), count.saturating_mul(ambient));
                }
                let child_ambient = next_multiplier(ambient, count);
                for value in map.values() {
                    walk(value, filter, child_ambient, depth + 1, ctx, out);
                }
            } else {
                for value in map.values() {
                    walk(value, filter, ambient, depth + 1, ctx, out);
                }
            }
        }
        Value::List(items) | Value::Array(items) => {
            for item in items.iter() {
                walk(item, filter, ambient, depth + 1, ctx, out);
            }
        }
        Value::Optional(inner) => {
            if let Some(inner) = inner {
                walk(inner, filter, ambient, depth + 1, ctx, out);
            }
        }
        Value::Int(_) | Value::Float(_) | Value::Str(_) | Value::Bytes(_) => {}
    }
}

/// Walks a heterogeneous graph rooted at `node` (SPEC_FULL.md §4.A op 2).
pub fn aggregate_nested(node: &Value, filter: &ItemFilter) -> TraversalOutcome {
    let mut ctx = Context::new();
    let mut out = TraversalOutcome::default();
    walk(node, filter, 1, 0, &mut ctx, &mut out);
    out.truncated = ctx.truncated;
    out
}

/// Iterates indexed slots, adding each non-empty stack's `count ×
/// multiplier` (multiplier 1 at the root) then recursing into its
/// sub-structure. Slots are themselves walked through [`aggregate_nested`]'s
/// generic recognizer, since a root container is just a list of stack-like
/// (or empty) values (SPEC_FULL.md §4.A op 1).
pub fn aggregate_container(slots: &[Value], filter: &ItemFilter) -> TraversalOutcome {
    let mut ctx = Context::new();
    let mut out = TraversalOutcome::default();
    for slot in slots {
        walk(slot, filter, 1, 0, &mut ctx, &mut out);
    }
    out.truncated = ctx.truncated;
    out
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

    fn stack_with_nested(id: &str, count: i64, nested: Vec<Value>) -> Value {
        let mut map = IndexMap::new();
        map.insert("id".to_string(), Value::str(id));
        map.insert("Count".to_string(), Value::Int(count));
        map.insert("contents".to_string(), Value::list(nested));
        Value::Compound(Arc::new(map))
    }

    #[test]
    fn simple_container_sums_counts() {
        let slots = vec![
            stack("minecraft:diamond", 5),
            stack("minecraft:diamond", 2),
            stack("minecraft:stick", 64),
        ];
        let outcome = aggregate_container(&slots, &ItemFilter::accept_all());
        assert_eq!(outcome.counts.get("minecraft:diamond"), Some(&7));
        assert_eq!(outcome.counts.get("minecraft:stick"), Some(&64));
        assert!(!outcome.truncated);
    }

    #[test]
    fn missing_colon_item_id_is_ignored() {
        let slots = vec![stack("diamond", 5)];
        let outcome = aggregate_container(&slots, &ItemFilter::accept_all());
        assert!(outcome.counts.is_empty());
    }

    #[test]
    fn non_positive_count_is_ignored() {
        let slots = vec![stack("minecraft:diamond", 0), stack("minecraft:diamond", -3)];
        let outcome = aggregate_container(&slots, &ItemFilter::accept_all());
        assert!(outcome.counts.is_empty());
    }

    #[test]
    fn filter_excludes_non_matching_but_still_recurses() {
        let nested = stack("minecraft:emerald", 3);
        let bundle = stack_with_nested("minecraft:bundle", 1, vec![nested]);
        let filter = ItemFilter::new(["minecraft:emerald".to_string()]);
        let outcome = aggregate_container(&[bundle], &filter);
        assert_eq!(outcome.counts.get("minecraft:emerald"), Some(&3));
        assert!(outcome.counts.get("minecraft:bundle").is_none());
    }

    #[test]
    fn nested_stack_multiplier_compounds() {
        let inner = stack("minecraft:emerald", 2);
        let bundle = stack_with_nested("minecraft:bundle", 5, vec![inner]);
        let outcome = aggregate_container(&[bundle], &ItemFilter::accept_all());
        // bundle itself: 5 * 1 = 5; nested emerald: 2 * max(1,5) = 10
        assert_eq!(outcome.counts.get("minecraft:bundle"), Some(&5));
        assert_eq!(outcome.counts.get("minecraft:emerald"), Some(&10));
    }

    #[test]
    fn shared_substructure_counted_once_by_identity() {
        let shared = Arc::new({
            let mut map = IndexMap::new();
            map.insert("id".to_string(), Value::str("minecraft:emerald"));
            map.insert("Count".to_string(), Value::Int(3));
            map
        });
        let shared_value = Value::Compound(shared);
        let root = Value::list(vec![shared_value.clone(), shared_value]);
        let outcome = aggregate_nested(&root, &ItemFilter::accept_all());
        assert_eq!(outcome.counts.get("minecraft:emerald"), Some(&3));
    }

    #[test]
    fn depth_beyond_bound_truncates_without_error() {
        // Build a chain of nested single-item lists 10 deep, terminating in a stack.
        let mut value = stack("minecraft:emerald", 1);
        for _ in 0..10 {
            value = Value::list(vec![value]);
        }
        let outcome = aggregate_nested(&value, &ItemFilter::accept_all());
        assert!(outcome.truncated);
    }
}
