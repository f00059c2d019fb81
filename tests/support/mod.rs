//! A minimal, hand-built MMDB image shared by the integration tests that
//! don't depend on an external fixture file.
//!
//! Layout: one 24-bit tree node whose children both resolve immediately to
//! the same data record, a 16-byte separator, the data record itself, then
//! the metadata marker and map.

use std::collections::BTreeMap;

const METADATA_MARKER: &[u8] = b"\xab\xcd\xefMaxMind.com";

fn push_str(buf: &mut Vec<u8>, s: &str) {
    buf.push(0x40 | s.len() as u8);
    buf.extend_from_slice(s.as_bytes());
}

fn push_uint32(buf: &mut Vec<u8>, v: u32) {
    let bytes = v.to_be_bytes();
    let mut i = 0;
    while i < 3 && bytes[i] == 0 {
        i += 1;
    }
    let trimmed = &bytes[i..];
    buf.push(0xc0 | trimmed.len() as u8);
    buf.extend_from_slice(trimmed);
}

fn metadata_map(node_count: u32) -> Vec<u8> {
    let fields: [(&str, u32); 4] = [
        ("binary_format_major_version", 2),
        ("binary_format_minor_version", 0),
        ("ip_version", 4),
        ("record_size", 24),
    ];
    let mut body = Vec::new();
    for (k, v) in fields {
        push_str(&mut body, k);
        push_uint32(&mut body, v);
    }
    push_str(&mut body, "build_epoch");
    push_uint32(&mut body, 1_600_000_000);
    push_str(&mut body, "node_count");
    push_uint32(&mut body, node_count);
    push_str(&mut body, "database_type");
    push_str(&mut body, "Test-DB");
    push_str(&mut body, "languages");
    body.push(0x01); // extended type escape
    body.push(0x04); // array: 11 - 7
    push_str(&mut body, "en");
    push_str(&mut body, "description");
    body.push(0xe1); // map, 1 pair
    push_str(&mut body, "en");
    push_str(&mut body, "Test database");

    let pair_count = fields.len() + 5;
    let mut meta = vec![0xe0 | pair_count as u8];
    meta.extend_from_slice(&body);
    meta
}

/// Builds a single-node IPv4 database that resolves every address to the
/// same record: `{"city": "Testville", "population": 42}`.
pub fn minimal_database() -> Vec<u8> {
    // One 24-bit node: both children point to record `node_count + 16`, so
    // the search resolves to a data record after the very first bit. The
    // `16` lines the record up with the real data bytes, which sit right
    // after the 16-byte separator that follows the tree.
    let record: u32 = 1 + 16;
    let mut data = Vec::new();
    data.extend_from_slice(&record.to_be_bytes()[1..]); // left, 3 bytes
    data.extend_from_slice(&record.to_be_bytes()[1..]); // right, 3 bytes
    data.extend_from_slice(&[0u8; 16]); // separator

    // {"city": "Testville", "population": 42}
    let mut record_bytes = vec![0xe2u8]; // map, 2 pairs
    push_str(&mut record_bytes, "city");
    push_str(&mut record_bytes, "Testville");
    push_str(&mut record_bytes, "population");
    push_uint32(&mut record_bytes, 42);
    data.extend_from_slice(&record_bytes);

    data.extend_from_slice(METADATA_MARKER);
    data.extend_from_slice(&metadata_map(1));
    data
}

/// The record `minimal_database` resolves every address to, as a plain map
/// for assertions that don't want to build their own callback tree.
pub fn expected_record() -> BTreeMap<&'static str, &'static str> {
    BTreeMap::from([("city", "Testville")])
}
