use std::sync::Arc;

use indexmap::IndexMap;

/// Canonical in-memory representation of the "heterogeneous graph composed of
/// maps, lists, arrays, optional cells, and primitive-leaf values" the
/// Aggregator walks (SPEC_FULL.md §4.A). Both the parsed tagged-tree format
/// (`crate::region::NbtValue`) and runtime host containers convert into this
/// shape so the aggregator only has one walker to maintain.
///
/// Compound/list/array payloads are wrapped in `Arc` so the same
/// sub-structure reached through two independent paths carries one stable
/// pointer identity — this is what lets the traversal dedupe "by identity,
/// not equality" per §4.A's contract.
#[derive(Debug, Clone)]
pub enum Value {
    Compound(Arc<IndexMap<String, Value>>),
    List(Arc<Vec<Value>>),
    Array(Arc<Vec<Value>>),
    Optional(Option<Box<Value>>),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    Bytes(Arc<Vec<u8>>),
}

impl Value {
    pub fn compound(entries: IndexMap<String, Value>) -> Self {
        Value::Compound(Arc::new(entries))
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Arc::new(items))
    }

    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Arc::new(items))
    }

    pub fn str(s: impl Into<Arc<str>>) -> Self {
        Value::Str(s.into())
    }

    /// Stable identity used for the visited set. Only compound/list/array
    /// nodes are tracked — scalars have no sub-structure to recurse into
    /// twice, so they need no identity.
    pub fn identity(&self) -> Option<usize> {
        match self {
            Value::Compound(arc) => Some(Arc::as_ptr(arc) as usize),
            Value::List(arc) => Some(Arc::as_ptr(arc) as usize),
            Value::Array(arc) => Some(Arc::as_ptr(arc) as usize),
            Value::Optional(_) | Value::Int(_) | Value::Float(_) | Value::Str(_) | Value::Bytes(_) => {
                None
            }
        }
    }

    pub fn as_compound(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Compound(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) => Some(*f as i64),
            _ => None,
        }
    }
}
