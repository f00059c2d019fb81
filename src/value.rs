//! A convenience, allocating view of a record, for callers who would rather
//! materialize a whole tree than wire up a [`crate::callback`] tree by hand.

use std::collections::BTreeMap;
use std::fmt;

use crate::byte_range::ByteRange;
use crate::decoder::Decoder;
use crate::error::MmdbResult;

/// An owned, fully-materialized data-section value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Double(f64),
    Bytes(Vec<u8>),
    Uint16(u32),
    Uint32(u32),
    Map(BTreeMap<String, Value>),
    Int32(i32),
    Uint64(u64),
    Uint128(u128),
    Array(Vec<Value>),
    Boolean(bool),
    Float(f32),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{s}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Bytes(b) => write!(f, "{b:02x?}"),
            Value::Uint16(v) | Value::Uint32(v) => write!(f, "{v}"),
            Value::Map(m) => {
                write!(f, "{{")?;
                for (i, (k, v)) in m.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
            Value::Int32(v) => write!(f, "{v}"),
            Value::Uint64(v) => write!(f, "{v}"),
            Value::Uint128(v) => write!(f, "{v}"),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
            Value::Boolean(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
        }
    }
}

impl Value {
    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Uint16(v) | Value::Uint32(v) => Some(*v as u64),
            Value::Uint64(v) => Some(*v),
            Value::Uint128(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }
}

/// Materializes the value at `pos` into an owned [`Value`] tree, chasing
/// pointers along the way.
pub(crate) fn materialize(bytes: &ByteRange, data_start: usize, pos: usize) -> MmdbResult<Value> {
    let decoder = Decoder::new(bytes, data_start);
    decoder.materialize_value(pos, 0).map(|(v, _)| v)
}
