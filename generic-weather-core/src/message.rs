//! Key/value dictionaries exchanged with the companion app.
//!
//! Wire image: one byte tuple count, then for every tuple a little-endian
//! `u32` key, a one byte type tag, a little-endian `u16` value length and the
//! value bytes. Integers are little-endian and 1, 2 or 4 bytes wide.

use std::collections::BTreeMap;

const TYPE_BYTES: u8 = 0;
const TYPE_CSTRING: u8 = 1;
const TYPE_UINT: u8 = 2;
const TYPE_INT: u8 = 3;

const HEADER_LEN: usize = 1;
const TUPLE_HEADER_LEN: usize = 4 + 1 + 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TupleValue {
    Bytes(Vec<u8>),
    CString(String),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    Int8(i8),
    Int16(i16),
    Int32(i32),
}

impl TupleValue {
    /// Integer view of any integer tuple; `None` for text and byte arrays.
    pub fn as_int(&self) -> Option<i64> {
        match *self {
            TupleValue::UInt8(v) => Some(i64::from(v)),
            TupleValue::UInt16(v) => Some(i64::from(v)),
            TupleValue::UInt32(v) => Some(i64::from(v)),
            TupleValue::Int8(v) => Some(i64::from(v)),
            TupleValue::Int16(v) => Some(i64::from(v)),
            TupleValue::Int32(v) => Some(i64::from(v)),
            TupleValue::Bytes(_) | TupleValue::CString(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            TupleValue::CString(s) => Some(s),
            _ => None,
        }
    }

    fn type_tag(&self) -> u8 {
        match self {
            TupleValue::Bytes(_) => TYPE_BYTES,
            TupleValue::CString(_) => TYPE_CSTRING,
            TupleValue::UInt8(_) | TupleValue::UInt16(_) | TupleValue::UInt32(_) => TYPE_UINT,
            TupleValue::Int8(_) | TupleValue::Int16(_) | TupleValue::Int32(_) => TYPE_INT,
        }
    }

    fn value_bytes(&self) -> Vec<u8> {
        match self {
            TupleValue::Bytes(b) => b.clone(),
            TupleValue::CString(s) => {
                let mut v = Vec::with_capacity(s.len() + 1);
                v.extend_from_slice(s.as_bytes());
                v.push(0);
                v
            }
            TupleValue::UInt8(v) => v.to_le_bytes().to_vec(),
            TupleValue::UInt16(v) => v.to_le_bytes().to_vec(),
            TupleValue::UInt32(v) => v.to_le_bytes().to_vec(),
            TupleValue::Int8(v) => v.to_le_bytes().to_vec(),
            TupleValue::Int16(v) => v.to_le_bytes().to_vec(),
            TupleValue::Int32(v) => v.to_le_bytes().to_vec(),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("message needs {needed} bytes but the buffer holds {capacity}")]
    Overflow { needed: usize, capacity: usize },

    #[error("message holds more than {max} tuples", max = u8::MAX)]
    TooManyTuples,

    #[error("tuple {key} value of {len} bytes does not fit a u16 length")]
    ValueTooLong { key: u32, len: usize },

    #[error("message truncated at byte {offset}")]
    Truncated { offset: usize },

    #[error("tuple {key} has unknown type tag {tag}")]
    UnknownType { key: u32, tag: u8 },

    #[error("tuple {key} has integer width {len}")]
    BadIntegerWidth { key: u32, len: usize },

    #[error("{extra} trailing bytes after the last tuple")]
    TrailingBytes { extra: usize },
}

/// Ordered set of tuples, at most one per key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dictionary {
    tuples: BTreeMap<u32, TupleValue>,
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: u32, value: TupleValue) -> &mut Self {
        self.tuples.insert(key, value);
        self
    }

    pub fn write_u8(&mut self, key: u32, value: u8) -> &mut Self {
        self.insert(key, TupleValue::UInt8(value))
    }

    pub fn write_i8(&mut self, key: u32, value: i8) -> &mut Self {
        self.insert(key, TupleValue::Int8(value))
    }

    pub fn write_i32(&mut self, key: u32, value: i32) -> &mut Self {
        self.insert(key, TupleValue::Int32(value))
    }

    pub fn write_cstring(&mut self, key: u32, value: &str) -> &mut Self {
        self.insert(key, TupleValue::CString(value.to_owned()))
    }

    pub fn find(&self, key: u32) -> Option<&TupleValue> {
        self.tuples.get(&key)
    }

    pub fn contains(&self, key: u32) -> bool {
        self.tuples.contains_key(&key)
    }

    pub fn find_int(&self, key: u32) -> Option<i64> {
        self.find(key).and_then(TupleValue::as_int)
    }

    pub fn find_cstring(&self, key: u32) -> Option<&str> {
        self.find(key).and_then(TupleValue::as_str)
    }

    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &TupleValue)> {
        self.tuples.iter().map(|(k, v)| (*k, v))
    }

    /// Size of the wire image without building it.
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN
            + self
                .tuples
                .values()
                .map(|v| TUPLE_HEADER_LEN + v.value_bytes().len())
                .sum::<usize>()
    }

    /// Builds the wire image, failing if it would not fit in `capacity` bytes.
    pub fn encode(&self, capacity: usize) -> Result<Vec<u8>, CodecError> {
        let count = u8::try_from(self.tuples.len()).map_err(|_| CodecError::TooManyTuples)?;

        let needed = self.encoded_len();
        if needed > capacity {
            return Err(CodecError::Overflow { needed, capacity });
        }

        let mut out = Vec::with_capacity(needed);
        out.push(count);
        for (key, value) in &self.tuples {
            let bytes = value.value_bytes();
            let len = u16::try_from(bytes.len()).map_err(|_| CodecError::ValueTooLong {
                key: *key,
                len: bytes.len(),
            })?;
            out.extend_from_slice(&key.to_le_bytes());
            out.push(value.type_tag());
            out.extend_from_slice(&len.to_le_bytes());
            out.extend_from_slice(&bytes);
        }

        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut cursor = Cursor { bytes, pos: 0 };
        let count = cursor.take(1)?[0];

        let mut dict = Dictionary::new();
        for _ in 0..count {
            let key = u32::from_le_bytes(cursor.array()?);
            let tag = cursor.take(1)?[0];
            let len = usize::from(u16::from_le_bytes(cursor.array()?));
            let raw = cursor.take(len)?;

            let value = match tag {
                TYPE_BYTES => TupleValue::Bytes(raw.to_vec()),
                TYPE_CSTRING => {
                    let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
                    TupleValue::CString(String::from_utf8_lossy(&raw[..end]).into_owned())
                }
                TYPE_UINT => match *raw {
                    [a] => TupleValue::UInt8(a),
                    [a, b] => TupleValue::UInt16(u16::from_le_bytes([a, b])),
                    [a, b, c, d] => TupleValue::UInt32(u32::from_le_bytes([a, b, c, d])),
                    _ => return Err(CodecError::BadIntegerWidth { key, len }),
                },
                TYPE_INT => match *raw {
                    [a] => TupleValue::Int8(i8::from_le_bytes([a])),
                    [a, b] => TupleValue::Int16(i16::from_le_bytes([a, b])),
                    [a, b, c, d] => TupleValue::Int32(i32::from_le_bytes([a, b, c, d])),
                    _ => return Err(CodecError::BadIntegerWidth { key, len }),
                },
                other => return Err(CodecError::UnknownType { key, tag: other }),
            };
            dict.insert(key, value);
        }

        let extra = bytes.len() - cursor.pos;
        if extra > 0 {
            return Err(CodecError::TrailingBytes { extra });
        }

        Ok(dict)
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        let end = self.pos + n;
        let slice = self
            .bytes
            .get(self.pos..end)
            .ok_or(CodecError::Truncated { offset: self.bytes.len() })?;
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }
}
