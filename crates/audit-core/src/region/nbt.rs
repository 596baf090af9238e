use std::sync::Arc;

use indexmap::IndexMap;

use crate::aggregator::Value as AggValue;
use crate::error::{AuditError, Result};

/// Self-describing binary tree of typed values used for world and mod data
/// (the "tagged tree" of SPEC_FULL.md §4.B.1). Parsed from the big-endian
/// NBT wire format; not a general-purpose NBT library, just what this
/// crate's region/offline-data readers need.
#[derive(Debug, Clone, PartialEq)]
pub enum NbtValue {
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    ByteArray(Vec<i8>),
    String(String),
    List(Vec<NbtValue>),
    Compound(IndexMap<String, NbtValue>),
    IntArray(Vec<i32>),
    LongArray(Vec<i64>),
}

impl NbtValue {
    pub fn as_compound(&self) -> Option<&IndexMap<String, NbtValue>> {
        match self {
            NbtValue::Compound(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            NbtValue::Byte(v) => Some(*v as i64),
            NbtValue::Short(v) => Some(*v as i64),
            NbtValue::Int(v) => Some(*v as i64),
            NbtValue::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            NbtValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Converts into the aggregator's canonical [`AggValue`] shape so the
    /// Aggregator never has to know about the NBT wire format directly.
    pub fn to_agg_value(&self) -> AggValue {
        match self {
            NbtValue::Byte(v) => AggValue::Int(*v as i64),
            NbtValue::Short(v) => AggValue::Int(*v as i64),
            NbtValue::Int(v) => AggValue::Int(*v as i64),
            NbtValue::Long(v) => AggValue::Int(*v),
            NbtValue::Float(v) => AggValue::Float(*v as f64),
            NbtValue::Double(v) => AggValue::Float(*v),
            NbtValue::ByteArray(bytes) => {
                AggValue::array(bytes.iter().map(|b| AggValue::Int(*b as i64)).collect())
            }
            NbtValue::String(s) => AggValue::str(s.as_str()),
            NbtValue::List(items) => {
                AggValue::list(items.iter().map(NbtValue::to_agg_value).collect())
            }
            NbtValue::Compound(map) => {
                let mut out = IndexMap::with_capacity(map.len());
                for (key, value) in map.iter() {
                    out.insert(key.clone(), value.to_agg_value());
                }
                AggValue::compound(out)
            }
            NbtValue::IntArray(items) => {
                AggValue::array(items.iter().map(|v| AggValue::Int(*v as i64)).collect())
            }
            NbtValue::LongArray(items) => {
                AggValue::array(items.iter().map(|v| AggValue::Int(*v)).collect())
            }
        }
    }
}

const TAG_END: u8 = 0;
const TAG_BYTE: u8 = 1;
const TAG_SHORT: u8 = 2;
const TAG_INT: u8 = 3;
const TAG_LONG: u8 = 4;
const TAG_FLOAT: u8 = 5;
const TAG_DOUBLE: u8 = 6;
const TAG_BYTE_ARRAY: u8 = 7;
const TAG_STRING: u8 = 8;
const TAG_LIST: u8 = 9;
const TAG_COMPOUND: u8 = 10;
const TAG_INT_ARRAY: u8 = 11;
const TAG_LONG_ARRAY: u8 = 12;

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.bytes.len() {
            return Err(AuditError::Decode("unexpected end of NBT data".into()));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn i8(&mut self) -> Result<i8> {
        Ok(self.u8()? as i8)
    }

    fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn i16(&mut self) -> Result<i16> {
        Ok(self.u16()? as i16)
    }

    fn i32(&mut self) -> Result<i32> {
        let b = self.take(4)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn i64(&mut self) -> Result<i64> {
        let b = self.take(8)?;
        Ok(i64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    fn f32(&mut self) -> Result<f32> {
        Ok(f32::from_bits(self.i32()? as u32))
    }

    fn f64(&mut self) -> Result<f64> {
        Ok(f64::from_bits(self.i64()? as u64))
    }

    fn string(&mut self) -> Result<String> {
        let len = self.u16()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|e| AuditError::Decode(e.to_string()))
    }

    fn payload(&mut self, tag: u8, depth: usize) -> Result<NbtValue> {
        if depth > 512 {
            return Err(AuditError::Decode("NBT nesting too deep".into()));
        }
        match tag {
            TAG_BYTE => Ok(NbtValue::Byte(self.i8()?)),
            TAG_SHORT => Ok(NbtValue::Short(self.i16()?)),
            TAG_INT => Ok(NbtValue::Int(self.i32()?)),
            TAG_LONG => Ok(NbtValue::Long(self.i64()?)),
            TAG_FLOAT => Ok(NbtValue::Float(self.f32()?)),
            TAG_DOUBLE => Ok(NbtValue::Double(self.f64()?)),
            TAG_BYTE_ARRAY => {
                let len = self.i32()?.max(0) as usize;
                let mut out = Vec::with_capacity(len.min(1 << 20));
                for _ in 0..len {
                    out.push(self.i8()?);
                }
                Ok(NbtValue::ByteArray(out))
            }
            TAG_STRING => Ok(NbtValue::String(self.string()?)),
            TAG_LIST => {
                let elem_tag = self.u8()?;
                let len = self.i32()?.max(0) as usize;
                let mut out = Vec::with_capacity(len.min(1 << 16));
                for _ in 0..len {
                    if elem_tag == TAG_END {
                        break;
                    }
                    out.push(self.payload(elem_tag, depth + 1)?);
                }
                Ok(NbtValue::List(out))
            }
            TAG_COMPOUND => {
                let mut map = IndexMap::new();
                loop {
                    let child_tag = self.u8()?;
                    if child_tag == TAG_END {
                        break;
                    }
                    let name = self.string()?;
                    let value = self.payload(child_tag, depth + 1)?;
                    map.insert(name, value);
                }
                Ok(NbtValue::Compound(map))
            }
            TAG_INT_ARRAY => {
                let len = self.i32()?.max(0) as usize;
                let mut out = Vec::with_capacity(len.min(1 << 20));
                for _ in 0..len {
                    out.push(self.i32()?);
                }
                Ok(NbtValue::IntArray(out))
            }
            TAG_LONG_ARRAY => {
                let len = self.i32()?.max(0) as usize;
                let mut out = Vec::with_capacity(len.min(1 << 20));
                for _ in 0..len {
                    out.push(self.i64()?);
                }
                Ok(NbtValue::LongArray(out))
            }
            other => Err(AuditError::Decode(format!("unknown NBT tag {other}"))),
        }
    }
}

/// Parses a complete NBT document: a single named root tag (almost always a
/// `TAG_Compound`). The root name is discarded — callers address fields by
/// path, not by the root's name.
pub fn parse_nbt(bytes: &[u8]) -> Result<NbtValue> {
    let mut reader = Reader::new(bytes);
    let tag = reader.u8()?;
    if tag == TAG_END {
        return Err(AuditError::Decode("empty NBT document".into()));
    }
    let _name = reader.string()?;
    reader.payload(tag, 0)
}
