//! The data-section decoder: walks the self-describing control-byte format
//! and drives a [`Callback`] tree without ever materializing a value the
//! caller didn't ask for.

use crate::byte_range::ByteRange;
use crate::callback::{ArrayCallback, Callback, ObjectCallback};
use crate::error::{MmdbError, MmdbResult};

/// Pointer chains longer than this are treated as a corrupt database rather
/// than walked indefinitely.
pub(crate) const MAX_POINTER_DEPTH: u8 = 32;

const TYPE_POINTER: u8 = 1;
const TYPE_UTF8_STRING: u8 = 2;
const TYPE_DOUBLE: u8 = 3;
const TYPE_BYTES: u8 = 4;
const TYPE_UINT16: u8 = 5;
const TYPE_UINT32: u8 = 6;
const TYPE_MAP: u8 = 7;
const TYPE_INT32: u8 = 8;
const TYPE_UINT64: u8 = 9;
const TYPE_UINT128: u8 = 10;
const TYPE_ARRAY: u8 = 11;
const TYPE_CONTAINER: u8 = 12;
const TYPE_END_MARKER: u8 = 13;
const TYPE_BOOLEAN: u8 = 14;
const TYPE_FLOAT: u8 = 15;

/// Borrows the backing image for the lifetime `'d` of the open database, so
/// every string and byte slice handed to a sink is a direct view into the
/// mmap or owned buffer, never a copy.
pub(crate) struct Decoder<'d> {
    bytes: &'d ByteRange,
    data_start: usize,
}

impl<'d> Decoder<'d> {
    pub fn new(bytes: &'d ByteRange, data_start: usize) -> Self {
        Self { bytes, data_start }
    }

    fn read_type_and_control(&self, pos: usize) -> MmdbResult<(u8, u8, usize)> {
        let control = self.bytes.read_u8(pos)?;
        let mut type_num = control >> 5;
        let mut p = pos + 1;
        if type_num == 0 {
            let extended = self.bytes.read_u8(p)?;
            p += 1;
            type_num = extended
                .checked_add(7)
                .ok_or(MmdbError::InvalidDatabase("extended type overflow"))?;
        }
        Ok((type_num, control, p))
    }

    fn read_size(&self, control: u8, pos: usize) -> MmdbResult<(usize, usize)> {
        let base = (control & 0x1f) as usize;
        match base {
            0..=28 => Ok((base, pos)),
            29 => {
                let extra = self.bytes.read_u8(pos)? as usize;
                Ok((29 + extra, pos + 1))
            }
            30 => {
                let extra = self.bytes.read_uint(pos, 2)? as usize;
                Ok((285 + extra, pos + 2))
            }
            31 => {
                let extra = self.bytes.read_uint(pos, 3)? as usize;
                Ok((65821 + extra, pos + 3))
            }
            _ => unreachable!("5-bit field never exceeds 31"),
        }
    }

    /// Returns the pointer's target offset (relative to the data section
    /// start) and the position right after the pointer's own bytes.
    fn read_pointer(&self, control: u8, pos: usize) -> MmdbResult<(usize, usize)> {
        let size_class = (control >> 3) & 0x3;
        let low = (control & 0x7) as u32;
        let (value, next) = match size_class {
            0 => {
                let b0 = self.bytes.read_u8(pos)? as u32;
                ((low << 8) | b0, pos + 1)
            }
            1 => {
                let v = self.bytes.read_uint(pos, 2)? as u32;
                (((low << 16) | v) + 2048, pos + 2)
            }
            2 => {
                let v = self.bytes.read_uint(pos, 3)? as u32;
                (((low << 24) | v) + 526336, pos + 3)
            }
            3 => {
                let v = self.bytes.read_u32(pos)?;
                (v, pos + 4)
            }
            _ => unreachable!("2-bit field never exceeds 3"),
        };
        Ok((value as usize, next))
    }

    fn pointer_target(&self, relative: usize) -> MmdbResult<usize> {
        self.data_start
            .checked_add(relative)
            .ok_or(MmdbError::InvalidDatabase("pointer target overflow"))
    }

    /// Reads a map key, which the format always encodes as a UTF-8 string or
    /// a pointer to one. Returns the key and the position after the key's
    /// own token (not the pointer target, if any).
    fn read_key(&self, pos: usize, depth: u8) -> MmdbResult<(&'d str, usize)> {
        let (type_num, control, p) = self.read_type_and_control(pos)?;
        if type_num == TYPE_POINTER {
            let (relative, after) = self.read_pointer(control, p)?;
            let target = self.pointer_target(relative)?;
            if depth >= MAX_POINTER_DEPTH {
                return Err(MmdbError::InvalidDatabase("pointer chase too deep"));
            }
            let (key, _) = self.read_key(target, depth + 1)?;
            return Ok((key, after));
        }
        if type_num != TYPE_UTF8_STRING {
            return Err(MmdbError::InvalidDatabase("map key is not a string"));
        }
        let (size, start) = self.read_size(control, p)?;
        let raw = self.bytes.slice(start, size)?;
        let text = std::str::from_utf8(raw)?;
        Ok((text, start + size))
    }

    /// Decodes the value at `pos`, driving `callback` if present and
    /// discarding the result (without allocating) otherwise. Returns the
    /// position immediately after this value's own token — for a pointer,
    /// that is after the pointer bytes, not after the pointee.
    pub fn decode_value<S>(
        &self,
        pos: usize,
        callback: Option<&Callback<S>>,
        state: &mut S,
        depth: u8,
    ) -> MmdbResult<usize> {
        let (type_num, control, p) = self.read_type_and_control(pos)?;

        if type_num == TYPE_POINTER {
            let (relative, after) = self.read_pointer(control, p)?;
            let target = self.pointer_target(relative)?;
            if depth >= MAX_POINTER_DEPTH {
                return Err(MmdbError::InvalidDatabase("pointer chase too deep"));
            }
            self.decode_value(target, callback, state, depth + 1)?;
            return Ok(after);
        }

        match type_num {
            TYPE_UTF8_STRING => {
                let (size, start) = self.read_size(control, p)?;
                let raw = self.bytes.slice(start, size)?;
                if let Some(Callback::Text(sink)) = callback {
                    let text = std::str::from_utf8(raw)?;
                    sink(state, text);
                }
                Ok(start + size)
            }
            TYPE_BYTES | TYPE_CONTAINER => {
                let (size, start) = self.read_size(control, p)?;
                if let Some(Callback::Bytes(sink)) = callback {
                    sink(state, self.bytes.slice(start, size)?);
                }
                Ok(start + size)
            }
            TYPE_DOUBLE => {
                let (size, start) = self.read_size(control, p)?;
                if size != 8 {
                    return Err(MmdbError::InvalidDatabase("double value must be 8 bytes"));
                }
                if let Some(Callback::Float(sink)) = callback {
                    sink(state, self.bytes.read_f64(start)?);
                }
                Ok(start + size)
            }
            TYPE_FLOAT => {
                let (size, start) = self.read_size(control, p)?;
                if size != 4 {
                    return Err(MmdbError::InvalidDatabase("float value must be 4 bytes"));
                }
                if let Some(Callback::Float(sink)) = callback {
                    sink(state, self.bytes.read_f32(start)? as f64);
                }
                Ok(start + size)
            }
            TYPE_UINT16 | TYPE_UINT32 => {
                let (size, start) = self.read_size(control, p)?;
                if let Some(Callback::Int(sink)) = callback {
                    sink(state, self.bytes.read_uint(start, size)? as i64);
                }
                Ok(start + size)
            }
            TYPE_INT32 => {
                let (size, start) = self.read_size(control, p)?;
                if let Some(Callback::Int(sink)) = callback {
                    // widths below 4 bytes are zero-extended, not sign-extended:
                    // the stored bytes are the magnitude, not a truncated two's
                    // complement pattern. `read_uint` already zero-extends into
                    // its u64, so a plain cast is correct for every width.
                    let value = self.bytes.read_uint(start, size)? as i32;
                    sink(state, value as i64);
                }
                Ok(start + size)
            }
            TYPE_UINT64 => {
                let (size, start) = self.read_size(control, p)?;
                if let Some(Callback::BigInt(sink)) = callback {
                    sink(state, self.bytes.read_uint(start, size)? as u128);
                }
                Ok(start + size)
            }
            TYPE_UINT128 => {
                let (size, start) = self.read_size(control, p)?;
                if let Some(Callback::BigInt(sink)) = callback {
                    sink(state, self.bytes.read_uint128(start, size)?);
                }
                Ok(start + size)
            }
            TYPE_BOOLEAN => {
                // the size field *is* the value; there is no payload.
                let (size, after) = self.read_size(control, p)?;
                if size > 1 {
                    return Err(MmdbError::InvalidDatabase("boolean size must be 0 or 1"));
                }
                if let Some(Callback::Bool(sink)) = callback {
                    sink(state, size != 0);
                }
                Ok(after)
            }
            TYPE_MAP => {
                let (count, start) = self.read_size(control, p)?;
                let object = match callback {
                    Some(Callback::Object(object)) => Some(object),
                    _ => None,
                };
                self.decode_map_body(start, count, object, state, depth)
            }
            TYPE_ARRAY => {
                let (count, start) = self.read_size(control, p)?;
                let array = match callback {
                    Some(Callback::Array(array)) => Some(array),
                    _ => None,
                };
                self.decode_array_body(start, count, array, state, depth)
            }
            TYPE_END_MARKER => Ok(p),
            _ => Err(MmdbError::InvalidDatabase("unrecognized data type")),
        }
    }

    /// Materializes the value at `pos` into an owned [`crate::value::Value`]
    /// tree, chasing pointers as it goes. Used by the convenience value
    /// layer; the zero-alloc callback path above never calls this.
    pub(crate) fn materialize_value(
        &self,
        pos: usize,
        depth: u8,
    ) -> MmdbResult<(crate::value::Value, usize)> {
        use crate::value::Value;

        let (type_num, control, p) = self.read_type_and_control(pos)?;

        if type_num == TYPE_POINTER {
            let (relative, after) = self.read_pointer(control, p)?;
            let target = self.pointer_target(relative)?;
            if depth >= MAX_POINTER_DEPTH {
                return Err(MmdbError::InvalidDatabase("pointer chase too deep"));
            }
            let (value, _) = self.materialize_value(target, depth + 1)?;
            return Ok((value, after));
        }

        match type_num {
            TYPE_UTF8_STRING => {
                let (size, start) = self.read_size(control, p)?;
                let text = std::str::from_utf8(self.bytes.slice(start, size)?)?;
                Ok((Value::String(text.to_owned()), start + size))
            }
            TYPE_BYTES | TYPE_CONTAINER => {
                let (size, start) = self.read_size(control, p)?;
                Ok((
                    Value::Bytes(self.bytes.slice(start, size)?.to_vec()),
                    start + size,
                ))
            }
            TYPE_DOUBLE => {
                let (size, start) = self.read_size(control, p)?;
                if size != 8 {
                    return Err(MmdbError::InvalidDatabase("double value must be 8 bytes"));
                }
                Ok((Value::Double(self.bytes.read_f64(start)?), start + size))
            }
            TYPE_FLOAT => {
                let (size, start) = self.read_size(control, p)?;
                if size != 4 {
                    return Err(MmdbError::InvalidDatabase("float value must be 4 bytes"));
                }
                Ok((Value::Float(self.bytes.read_f32(start)?), start + size))
            }
            TYPE_UINT16 => {
                let (size, start) = self.read_size(control, p)?;
                Ok((
                    Value::Uint16(self.bytes.read_uint(start, size)? as u32),
                    start + size,
                ))
            }
            TYPE_UINT32 => {
                let (size, start) = self.read_size(control, p)?;
                Ok((
                    Value::Uint32(self.bytes.read_uint(start, size)? as u32),
                    start + size,
                ))
            }
            TYPE_INT32 => {
                let (size, start) = self.read_size(control, p)?;
                let value = self.bytes.read_uint(start, size)? as i32;
                Ok((Value::Int32(value), start + size))
            }
            TYPE_UINT64 => {
                let (size, start) = self.read_size(control, p)?;
                Ok((
                    Value::Uint64(self.bytes.read_uint(start, size)?),
                    start + size,
                ))
            }
            TYPE_UINT128 => {
                let (size, start) = self.read_size(control, p)?;
                Ok((
                    Value::Uint128(self.bytes.read_uint128(start, size)?),
                    start + size,
                ))
            }
            TYPE_BOOLEAN => {
                let (size, after) = self.read_size(control, p)?;
                if size > 1 {
                    return Err(MmdbError::InvalidDatabase("boolean size must be 0 or 1"));
                }
                Ok((Value::Boolean(size != 0), after))
            }
            TYPE_MAP => {
                let (count, mut at) = self.read_size(control, p)?;
                let mut map = std::collections::BTreeMap::new();
                for _ in 0..count {
                    let (key, after_key) = self.read_key(at, depth)?;
                    let (value, after_value) = self.materialize_value(after_key, depth)?;
                    map.insert(key.to_owned(), value);
                    at = after_value;
                }
                Ok((Value::Map(map), at))
            }
            TYPE_ARRAY => {
                let (count, mut at) = self.read_size(control, p)?;
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    let (value, after_value) = self.materialize_value(at, depth)?;
                    items.push(value);
                    at = after_value;
                }
                Ok((Value::Array(items), at))
            }
            TYPE_END_MARKER => Ok((Value::Boolean(false), p)),
            _ => Err(MmdbError::InvalidDatabase("unrecognized data type")),
        }
    }

    /// Decodes the top-level record at `pos` straight into `object`,
    /// chasing an initial pointer if the record itself is stored indirectly.
    /// Unlike [`Decoder::decode_value`], this requires the target to be a
    /// map: every MaxMind DB record is one.
    pub(crate) fn decode_record<S>(
        &self,
        pos: usize,
        object: &ObjectCallback<S>,
        state: &mut S,
    ) -> MmdbResult<()> {
        self.decode_record_at(pos, object, state, 0)
    }

    fn decode_record_at<S>(
        &self,
        pos: usize,
        object: &ObjectCallback<S>,
        state: &mut S,
        depth: u8,
    ) -> MmdbResult<()> {
        let (type_num, control, p) = self.read_type_and_control(pos)?;
        if type_num == TYPE_POINTER {
            let (relative, _after) = self.read_pointer(control, p)?;
            let target = self.pointer_target(relative)?;
            if depth >= MAX_POINTER_DEPTH {
                return Err(MmdbError::InvalidDatabase("pointer chase too deep"));
            }
            return self.decode_record_at(target, object, state, depth + 1);
        }
        if type_num != TYPE_MAP {
            return Err(MmdbError::InvalidDatabase("record is not a map"));
        }
        let (count, start) = self.read_size(control, p)?;
        self.decode_map_body(start, count, Some(object), state, depth)?;
        Ok(())
    }

    fn decode_map_body<S>(
        &self,
        mut pos: usize,
        count: usize,
        object: Option<&ObjectCallback<S>>,
        state: &mut S,
        depth: u8,
    ) -> MmdbResult<usize> {
        if let Some(object) = object {
            if let Some(begin) = object.on_begin {
                begin(state);
            }
        }
        for _ in 0..count {
            let (key, after_key) = self.read_key(pos, depth)?;
            let field = object.and_then(|o| o.field(key));
            pos = self.decode_value(after_key, field, state, depth)?;
        }
        if let Some(object) = object {
            if let Some(end) = object.on_end {
                end(state);
            }
        }
        Ok(pos)
    }

    fn decode_array_body<S>(
        &self,
        mut pos: usize,
        count: usize,
        array: Option<&ArrayCallback<S>>,
        state: &mut S,
        depth: u8,
    ) -> MmdbResult<usize> {
        if let Some(array) = array {
            if let Some(begin) = array.on_begin {
                begin(state, count);
            }
        }
        for index in 0..count {
            if let Some(array) = array {
                if let Some(on_element) = array.on_element {
                    on_element(state, index, count);
                }
            }
            let element = array.and_then(|a| a.element_for(index, count));
            pos = self.decode_value(pos, element, state, depth)?;
        }
        if let Some(array) = array {
            if let Some(end) = array.on_end {
                end(state);
            }
        }
        Ok(pos)
    }
}
