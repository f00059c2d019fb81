use byteorder::{BigEndian, ByteOrder};
use memmap2::Mmap;

use crate::error::{MmdbError, MmdbResult};

/// An immutable, random-access view over the bytes of a database image.
///
/// Either a memory-mapped file or an owned in-memory buffer; callers never
/// need to know which. All reads are bounds-checked and big-endian, and none
/// of them allocate.
pub enum ByteRange {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl ByteRange {
    pub fn as_slice(&self) -> &[u8] {
        match self {
            ByteRange::Mapped(map) => &map[..],
            ByteRange::Owned(buf) => &buf[..],
        }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A bounds-checked sub-slice `[pos, pos+len)`.
    pub fn slice(&self, pos: usize, len: usize) -> MmdbResult<&[u8]> {
        let data = self.as_slice();
        let end = pos
            .checked_add(len)
            .ok_or(MmdbError::InvalidDatabase("offset overflow"))?;
        data.get(pos..end)
            .ok_or(MmdbError::InvalidDatabase("read past end of database"))
    }

    pub fn read_u8(&self, pos: usize) -> MmdbResult<u8> {
        Ok(self.slice(pos, 1)?[0])
    }

    pub fn read_u24(&self, pos: usize) -> MmdbResult<u32> {
        Ok(BigEndian::read_u24(self.slice(pos, 3)?))
    }

    pub fn read_u32(&self, pos: usize) -> MmdbResult<u32> {
        Ok(BigEndian::read_u32(self.slice(pos, 4)?))
    }

    pub fn read_f32(&self, pos: usize) -> MmdbResult<f32> {
        Ok(BigEndian::read_f32(self.slice(pos, 4)?))
    }

    pub fn read_f64(&self, pos: usize) -> MmdbResult<f64> {
        Ok(BigEndian::read_f64(self.slice(pos, 8)?))
    }

    /// Big-endian unsigned integer of `size` bytes (`0..=8`), widened into a `u64`.
    pub fn read_uint(&self, pos: usize, size: usize) -> MmdbResult<u64> {
        if size == 0 {
            return Ok(0);
        }
        if size > 8 {
            return Err(MmdbError::InvalidDatabase("integer width exceeds 8 bytes"));
        }
        Ok(BigEndian::read_uint(self.slice(pos, size)?, size))
    }

    /// Big-endian unsigned integer of `size` bytes (`0..=16`), widened into a `u128`.
    pub fn read_uint128(&self, pos: usize, size: usize) -> MmdbResult<u128> {
        if size == 0 {
            return Ok(0);
        }
        if size > 16 {
            return Err(MmdbError::InvalidDatabase(
                "integer width exceeds 16 bytes",
            ));
        }
        Ok(BigEndian::read_uint128(self.slice(pos, size)?, size))
    }
}
