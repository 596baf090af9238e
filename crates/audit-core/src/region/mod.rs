mod codec;
mod nbt;

pub use codec::{parse_region_filename, read_region, RegionChunk};
pub use nbt::{parse_nbt, NbtValue};

use indexmap::IndexMap;

/// Locates the block-entity list inside a decoded chunk tree: modern chunks
/// keep `block_entities` at the root, legacy ones nest `TileEntities` under a
/// `Level` compound (SPEC_FULL.md §4.B).
pub fn extract_block_entities(tree: &NbtValue) -> Vec<&IndexMap<String, NbtValue>> {
    let root = tree.as_compound();

    let direct = root.and_then(|map| map.get("block_entities")).and_then(list_of_compounds);
    if let Some(entries) = direct {
        return entries;
    }

    let legacy = root
        .and_then(|map| map.get("Level"))
        .and_then(NbtValue::as_compound)
        .and_then(|level| level.get("TileEntities"))
        .and_then(list_of_compounds);
    legacy.unwrap_or_default()
}

fn list_of_compounds(value: &NbtValue) -> Option<Vec<&IndexMap<String, NbtValue>>> {
    match value {
        NbtValue::List(items) => Some(items.iter().filter_map(NbtValue::as_compound).collect()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(id: &str) -> NbtValue {
        let mut map = IndexMap::new();
        map.insert("id".to_string(), NbtValue::String(id.to_string()));
        NbtValue::Compound(map)
    }

    #[test]
    fn finds_modern_block_entities_at_root() {
        let mut root = IndexMap::new();
        root.insert(
            "block_entities".to_string(),
            NbtValue::List(vec![entity("minecraft:chest")]),
        );
        let tree = NbtValue::Compound(root);
        let found = extract_block_entities(&tree);
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn finds_legacy_tile_entities_under_level() {
        let mut level = IndexMap::new();
        level.insert(
            "TileEntities".to_string(),
            NbtValue::List(vec![entity("minecraft:furnace")]),
        );
        let mut root = IndexMap::new();
        root.insert("Level".to_string(), NbtValue::Compound(level));
        let tree = NbtValue::Compound(root);
        let found = extract_block_entities(&tree);
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn missing_both_forms_yields_empty() {
        let tree = NbtValue::Compound(IndexMap::new());
        assert!(extract_block_entities(&tree).is_empty());
    }
}
