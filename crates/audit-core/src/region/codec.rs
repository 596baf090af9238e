use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use super::nbt::{parse_nbt, NbtValue};

const SECTOR_SIZE: u64 = 4096;
const HEADER_SLOTS: usize = 1024;

static REGION_FILENAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^r\.(-?\d+)\.(-?\d+)\.mca$").expect("static regex"));

/// Parses `r.<rx>.<rz>.mca` out of a region file name, per SPEC_FULL.md
/// §4.B. Names that don't match are the caller's signal to skip the file.
pub fn parse_region_filename(name: &str) -> Option<(i32, i32)> {
    let caps = REGION_FILENAME.captures(name)?;
    let rx: i32 = caps.get(1)?.as_str().parse().ok()?;
    let rz: i32 = caps.get(2)?.as_str().parse().ok()?;
    Some((rx, rz))
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    offset_sectors: u32,
    sector_count: u8,
}

impl Slot {
    fn is_empty(&self) -> bool {
        self.offset_sectors == 0 || self.sector_count == 0
    }
}

fn read_header(file: &mut File) -> std::io::Result<[Slot; HEADER_SLOTS]> {
    let mut raw = [0u8; SECTOR_SIZE as usize];
    file.seek(SeekFrom::Start(0))?;
    file.read_exact(&mut raw)?;
    let mut slots = [Slot {
        offset_sectors: 0,
        sector_count: 0,
    }; HEADER_SLOTS];
    for (i, slot) in slots.iter_mut().enumerate() {
        let base = i * 4;
        let offset = ((raw[base] as u32) << 16) | ((raw[base + 1] as u32) << 8) | raw[base + 2] as u32;
        slot.offset_sectors = offset;
        slot.sector_count = raw[base + 3];
    }
    Ok(slots)
}

/// One successfully decoded chunk: its position within the region (0..32)
/// and the parsed tagged tree.
pub struct RegionChunk {
    pub local_x: u8,
    pub local_z: u8,
    pub tree: NbtValue,
}

/// Decodes every present, parseable chunk out of a region file. Recoverable
/// per-chunk faults (truncated payload, unknown compression byte, a missing
/// `.mcc` sidecar, a malformed tagged tree) are logged and skipped — per
/// SPEC_FULL.md §4.B they "MUST NOT abort the region" — so this returns a
/// `Vec` of only the chunks that decoded cleanly, never an `Err` for
/// per-chunk problems. A hard I/O failure opening the region file itself is
/// still an `Err`.
pub fn read_region(path: &Path, region_x: i32, region_z: i32) -> std::io::Result<Vec<RegionChunk>> {
    let mut file = File::open(path)?;
    let slots = read_header(&mut file)?;
    let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();

    let mut chunks = Vec::new();
    for (i, slot) in slots.iter().enumerate() {
        if slot.is_empty() {
            continue;
        }
        let local_x = (i % 32) as u8;
        let local_z = (i / 32) as u8;

        match read_chunk_payload(&mut file, slot, &dir, region_x, region_z, local_x, local_z) {
            Ok(Some(tree)) => chunks.push(RegionChunk {
                local_x,
                local_z,
                tree,
            }),
            Ok(None) => {
                debug!(local_x, local_z, "skipped empty or unparseable chunk slot");
            }
            Err(err) => {
                warn!(local_x, local_z, error = %err, "skipped chunk after decode failure");
            }
        }
    }
    Ok(chunks)
}

fn read_chunk_payload(
    file: &mut File,
    slot: &Slot,
    dir: &Path,
    region_x: i32,
    region_z: i32,
    local_x: u8,
    local_z: u8,
) -> std::io::Result<Option<NbtValue>> {
    file.seek(SeekFrom::Start(slot.offset_sectors as u64 * SECTOR_SIZE))?;
    let mut prefix = [0u8; 5];
    file.read_exact(&mut prefix)?;
    let stored_length = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]);
    if stored_length <= 1 {
        return Ok(None);
    }
    let compression_byte = prefix[4];
    let compression_type = compression_byte & 0x7F;
    let external = (compression_byte & 0x80) != 0;

    let payload = if external {
        let cx = region_x * 32 + local_x as i32;
        let cz = region_z * 32 + local_z as i32;
        let mcc_path: PathBuf = dir.join(format!("c.{cx}.{cz}.mcc"));
        match std::fs::read(&mcc_path) {
            Ok(bytes) => bytes,
            Err(_) => return Ok(None),
        }
    } else {
        let available = (slot.sector_count as u64 * SECTOR_SIZE).saturating_sub(5);
        let len = (stored_length as u64 - 1).min(available) as usize;
        let mut buf = vec![0u8; len];
        file.read_exact(&mut buf)?;
        buf
    };

    let decompressed = match decompress(compression_type, &payload) {
        Some(bytes) => bytes,
        None => return Ok(None),
    };

    match parse_nbt(&decompressed) {
        Ok(tree) => Ok(Some(tree)),
        Err(_) => Ok(None),
    }
}

fn decompress(compression_type: u8, payload: &[u8]) -> Option<Vec<u8>> {
    match compression_type {
        1 => {
            let mut decoder = flate2::read::GzDecoder::new(payload);
            let mut out = Vec::new();
            decoder.read_to_end(&mut out).ok()?;
            Some(out)
        }
        2 => {
            let mut decoder = flate2::read::ZlibDecoder::new(payload);
            let mut out = Vec::new();
            decoder.read_to_end(&mut out).ok()?;
            Some(out)
        }
        3 => Some(payload.to_vec()),
        _ => None,
    }
}
