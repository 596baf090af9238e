//! Fixture builders shared across the integration tests: a tiny NBT tree
//! builder and a real `.mca` region-file writer. Kept separate from the
//! crate's own `region`/`pool` modules since from outside the crate the
//! wire format is opaque — these helpers only know the bytes, not the
//! parser's internals.

const TAG_END: u8 = 0;
const TAG_INT: u8 = 3;
const TAG_STRING: u8 = 8;
const TAG_LIST: u8 = 9;
const TAG_COMPOUND: u8 = 10;

const SECTOR_SIZE: usize = 4096;

/// A handful of NBT value shapes — just enough to build block-entity and
/// item-stack fixtures, not a general-purpose writer.
pub enum Field {
    Int(String, i32),
    Str(String, String),
    List(String, Vec<Compound>),
}

pub type Compound = Vec<Field>;

fn write_name(buf: &mut Vec<u8>, name: &str) {
    buf.extend_from_slice(&(name.len() as u16).to_be_bytes());
    buf.extend_from_slice(name.as_bytes());
}

fn write_compound_body(buf: &mut Vec<u8>, fields: &Compound) {
    for field in fields {
        match field {
            Field::Int(name, value) => {
                buf.push(TAG_INT);
                write_name(buf, name);
                buf.extend_from_slice(&value.to_be_bytes());
            }
            Field::Str(name, value) => {
                buf.push(TAG_STRING);
                write_name(buf, name);
                buf.extend_from_slice(&(value.len() as u16).to_be_bytes());
                buf.extend_from_slice(value.as_bytes());
            }
            Field::List(name, entries) => {
                buf.push(TAG_LIST);
                write_name(buf, name);
                buf.push(TAG_COMPOUND);
                buf.extend_from_slice(&(entries.len() as i32).to_be_bytes());
                for entry in entries {
                    // write_compound_body already appends its own TAG_END.
                    write_compound_body(buf, entry);
                }
            }
        }
    }
    buf.push(TAG_END);
}

/// One full NBT document: an unnamed root `TAG_Compound` holding `fields`.
pub fn chunk_root_bytes(fields: Compound) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.push(TAG_COMPOUND);
    write_name(&mut buf, "");
    write_compound_body(&mut buf, &fields);
    buf
}

/// An item stack compound: `{id, Count}`.
pub fn stack(item_id: &str, count: i32) -> Compound {
    vec![
        Field::Str("id".to_string(), item_id.to_string()),
        Field::Int("Count".to_string(), count),
    ]
}

/// A block entity holding a list of stacks under `Items`.
pub fn block_entity(x: i32, y: i32, z: i32, id: &str, items: Vec<Compound>) -> Compound {
    vec![
        Field::Int("x".to_string(), x),
        Field::Int("y".to_string(), y),
        Field::Int("z".to_string(), z),
        Field::Str("id".to_string(), id.to_string()),
        Field::List("Items".to_string(), items),
    ]
}

/// A compact block entity with its own `id`/`Count`, recognized as a stack
/// in its own right by the generic aggregator walk — used for fixtures that
/// need many distinct entities without the per-entity overhead of a nested
/// `Items` list (e.g. queue-backpressure volume tests).
pub fn compact_block_entity(x: i32, y: i32, z: i32, item_id: &str, count: i32) -> Compound {
    vec![
        Field::Int("x".to_string(), x),
        Field::Int("y".to_string(), y),
        Field::Int("z".to_string(), z),
        Field::Str("id".to_string(), item_id.to_string()),
        Field::Int("Count".to_string(), count),
    ]
}

/// Writes a real `.mca` region file at `path` with one populated slot per
/// `(local_x, local_z, chunk_nbt_bytes)` entry (raw/uncompressed, matching
/// the crate's own `skips_empty_slots_and_decodes_raw_chunk` test
/// convention), padding each chunk to a sector boundary.
pub fn write_region_file(path: &std::path::Path, slots: &[(u8, u8, Vec<u8>)]) {
    let mut header = vec![0u8; SECTOR_SIZE];
    let mut body = Vec::new();
    let mut next_sector: u32 = 1; // sector 0 is the header

    for (local_x, local_z, nbt_bytes) in slots {
        let stored_length = (nbt_bytes.len() + 1) as u32;
        let mut sector = Vec::with_capacity(5 + nbt_bytes.len());
        sector.extend_from_slice(&stored_length.to_be_bytes());
        sector.push(3); // raw/uncompressed
        sector.extend_from_slice(nbt_bytes);
        let sector_count = ((sector.len() + SECTOR_SIZE - 1) / SECTOR_SIZE).max(1);
        sector.resize(sector_count * SECTOR_SIZE, 0);

        let slot_index = (*local_z as usize) * 32 + (*local_x as usize);
        let base = slot_index * 4;
        header[base] = ((next_sector >> 16) & 0xFF) as u8;
        header[base + 1] = ((next_sector >> 8) & 0xFF) as u8;
        header[base + 2] = (next_sector & 0xFF) as u8;
        header[base + 3] = sector_count as u8;

        body.extend_from_slice(&sector);
        next_sector += sector_count as u32;
    }

    let mut out = header;
    out.extend_from_slice(&body);
    std::fs::write(path, out).expect("write fixture region file");
}
