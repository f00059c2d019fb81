//! The public entry point: open a database once, then run many concurrent,
//! allocation-free lookups against it.

use std::fs::File;
use std::net::IpAddr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, trace};

use crate::byte_range::ByteRange;
use crate::callback::RecordCallback;
use crate::decoder::Decoder;
use crate::error::{MmdbError, MmdbResult};
use crate::metadata::Metadata;
use crate::tree::TreeWalker;
use crate::value::{self, Value};

struct Inner {
    bytes: ByteRange,
    metadata: Metadata,
    data_section_start: usize,
    ipv4_start: u32,
    closed: AtomicBool,
}

/// A handle to an open MaxMind DB database.
///
/// Cloning is cheap: it bumps an `Arc` refcount and shares the same
/// memory-mapped (or owned) image across threads. `close` is visible across
/// every clone, so a caller holding a stray clone cannot keep querying a
/// database another part of the program has intentionally closed.
#[derive(Clone)]
pub struct Reader {
    inner: Arc<Inner>,
}

impl Reader {
    /// Opens and memory-maps a database file.
    pub fn open_file<P: AsRef<Path>>(path: P) -> MmdbResult<Reader> {
        let path = path.as_ref();
        debug!("opening mmdb database at {}", path.display());
        let file = File::open(path)?;
        // SAFETY: the file is not expected to be mutated or truncated while
        // mapped; callers sharing a database across processes must uphold
        // the same invariant the underlying `mmap(2)` call always requires.
        let mmap = unsafe { memmap2::Mmap::map(&file)? };
        Self::from_byte_range(ByteRange::Mapped(mmap))
    }

    /// Opens a database already held in memory, taking ownership of the buffer.
    pub fn open_bytes(data: Vec<u8>) -> MmdbResult<Reader> {
        Self::from_byte_range(ByteRange::Owned(data))
    }

    fn from_byte_range(bytes: ByteRange) -> MmdbResult<Reader> {
        let (metadata, data_section_start) = Metadata::locate_and_decode(&bytes)?;
        trace!(
            "database type {:?}, ip_version {}, node_count {}, record_size {}",
            metadata.database_type, metadata.ip_version, metadata.node_count, metadata.record_size
        );
        let tree = TreeWalker::new(&bytes, metadata.node_count, metadata.record_size, metadata.ip_version)?;
        let ipv4_start = tree.ipv4_start()?;
        Ok(Reader {
            inner: Arc::new(Inner {
                bytes,
                metadata,
                data_section_start,
                ipv4_start,
                closed: AtomicBool::new(false),
            }),
        })
    }

    pub fn metadata(&self) -> &Metadata {
        &self.inner.metadata
    }

    /// Marks the database closed for every handle sharing this `Reader`'s
    /// backing image. Already-running lookups are unaffected; new lookups
    /// fail with [`MmdbError::ClosedDatabase`].
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Looks up `address`, driving `callback` against whatever record (if
    /// any) it resolves to. `state` accumulates whatever the callback's
    /// sinks write into it.
    pub fn lookup<S>(&self, address: IpAddr, callback: &RecordCallback<S>, state: &mut S) -> MmdbResult<()> {
        if self.is_closed() {
            return Err(MmdbError::ClosedDatabase);
        }

        let inner = &*self.inner;
        let (bits, bit_length) = address_bits(address, inner.metadata.ip_version)?;

        let tree = TreeWalker::new(
            &inner.bytes,
            inner.metadata.node_count,
            inner.metadata.record_size,
            inner.metadata.ip_version,
        )?;

        let mut node = tree.start_node(bit_length, inner.ipv4_start);
        let mut prefix_len = bit_length;
        let mut record = None;
        for (i, bit) in bits.iter().take(bit_length).enumerate() {
            if node >= inner.metadata.node_count {
                prefix_len = i;
                record = Some(node);
                break;
            }
            node = tree.read_child(node, *bit)?;
        }
        if record.is_none() {
            prefix_len = bit_length;
            record = Some(node);
        }
        let record = record.unwrap();

        if let Some(sink) = callback.on_network() {
            let (network, bytes_used) = address_bytes(address, inner.metadata.ip_version);
            sink(state, &network[..bytes_used], prefix_len);
        }

        if record == inner.metadata.node_count {
            // no data record for this address: a valid "no match".
            return Ok(());
        }
        if record < inner.metadata.node_count {
            return Err(MmdbError::InvalidDatabase(
                "search terminated on another tree node, not a data pointer",
            ));
        }

        // The record value, once past the node-count threshold, becomes a
        // direct offset into the file from the start of the (separator-less)
        // search tree -- which is the same thing as the absolute position,
        // since the 16-byte separator is already folded into that offset.
        let pos = tree
            .search_tree_size()
            .checked_add((record - inner.metadata.node_count) as usize)
            .ok_or(MmdbError::InvalidDatabase("data offset overflow"))?;

        let decoder = Decoder::new(&inner.bytes, inner.data_section_start);
        decoder.decode_record(pos, callback.object(), state)?;
        Ok(())
    }

    /// Looks up `address` and materializes the whole record as an owned
    /// [`Value`] tree, or `None` if there is no data for that address.
    pub fn lookup_value(&self, address: IpAddr) -> MmdbResult<Option<Value>> {
        if self.is_closed() {
            return Err(MmdbError::ClosedDatabase);
        }
        let inner = &*self.inner;
        let (bits, bit_length) = address_bits(address, inner.metadata.ip_version)?;

        let tree = TreeWalker::new(
            &inner.bytes,
            inner.metadata.node_count,
            inner.metadata.record_size,
            inner.metadata.ip_version,
        )?;
        let mut node = tree.start_node(bit_length, inner.ipv4_start);
        for bit in bits.iter().take(bit_length) {
            if node >= inner.metadata.node_count {
                break;
            }
            node = tree.read_child(node, *bit)?;
        }

        if node == inner.metadata.node_count {
            return Ok(None);
        }
        if node < inner.metadata.node_count {
            return Err(MmdbError::InvalidDatabase(
                "search terminated on another tree node, not a data pointer",
            ));
        }

        let pos = tree
            .search_tree_size()
            .checked_add((node - inner.metadata.node_count) as usize)
            .ok_or(MmdbError::InvalidDatabase("data offset overflow"))?;

        value::materialize(&inner.bytes, inner.data_section_start, pos).map(Some)
    }
}

/// Converts an address into a fixed 128-bit bit array plus the number of
/// significant bits to walk, mapping IPv4 addresses into the historical
/// `::a.b.c.d/96` layout when the database is IPv6-capable.
fn address_bits(address: IpAddr, db_ip_version: u16) -> MmdbResult<([u8; 128], usize)> {
    let v6 = match address {
        IpAddr::V4(v4) => {
            if db_ip_version == 4 {
                return Ok((bits_of(&v4.octets()), 32));
            }
            #[allow(deprecated)]
            v4.to_ipv6_compatible()
        }
        IpAddr::V6(v6) => {
            if db_ip_version == 4 {
                return Err(MmdbError::WrongDatabaseType);
            }
            v6
        }
    };
    Ok((bits_of(&v6.octets()), 128))
}

fn bits_of(octets: &[u8]) -> [u8; 128] {
    let mut bits = [0u8; 128];
    for (i, byte) in octets.iter().enumerate() {
        for b in 0..8 {
            bits[i * 8 + b] = (byte >> (7 - b)) & 1;
        }
    }
    bits
}

/// The raw big-endian bytes of an address, for the network callback: 4 bytes
/// for IPv4, 16 for IPv6, with no canonicalization of the queried form.
fn address_bytes(address: IpAddr, _db_ip_version: u16) -> ([u8; 16], usize) {
    let mut buf = [0u8; 16];
    match address {
        IpAddr::V4(v4) => {
            buf[..4].copy_from_slice(&v4.octets());
            (buf, 4)
        }
        IpAddr::V6(v6) => {
            buf.copy_from_slice(&v6.octets());
            (buf, 16)
        }
    }
}
