//! Database metadata: the trailing self-describing map that tells a reader
//! how to interpret everything that comes before it.

use crate::byte_range::ByteRange;
use crate::decoder::Decoder;
use crate::error::{MmdbError, MmdbResult};
use crate::value::Value;

/// The marker bytes MaxMind DB files use to locate the metadata map: they
/// appear nowhere else in a well-formed database, so a reader searches for
/// the *last* occurrence of this sequence.
const METADATA_MARKER: &[u8] = b"\xab\xcd\xefMaxMind.com";

/// How far from the end of the file to search for the marker. MaxMind's own
/// readers use 128 KiB; metadata maps are always far smaller than that, so a
/// marker found further back than this would indicate a corrupt file anyway.
const METADATA_MAX_SEARCH_WINDOW: usize = 128 * 1024;

/// Parsed database metadata, decoded once at open time.
#[derive(Debug, Clone)]
pub struct Metadata {
    pub binary_format_major_version: u16,
    pub binary_format_minor_version: u16,
    pub build_epoch: u64,
    pub database_type: String,
    pub description: std::collections::BTreeMap<String, String>,
    pub ip_version: u16,
    pub languages: Vec<String>,
    pub node_count: u32,
    pub record_size: u16,
}

impl Metadata {
    /// Searches the tail of `bytes` for the metadata marker and decodes the
    /// map that follows it. Returns the metadata plus the absolute offset of
    /// the start of the data section (immediately after the search tree and
    /// its 16-byte all-zero separator).
    pub(crate) fn locate_and_decode(bytes: &ByteRange) -> MmdbResult<(Metadata, usize)> {
        let marker_start = find_metadata_marker(bytes)?;
        let metadata_start = marker_start + METADATA_MARKER.len();

        let decoder = Decoder::new(bytes, metadata_start);
        let (value, _) = decoder.materialize_value(metadata_start, 0)?;
        let metadata = Metadata::from_value(&value)?;

        let node_bytes = crate::tree::bytes_per_node(metadata.record_size)?;
        let search_tree_size = metadata.node_count as usize * node_bytes as usize;
        let data_section_start = search_tree_size + 16;

        Ok((metadata, data_section_start))
    }

    fn from_value(value: &Value) -> MmdbResult<Metadata> {
        let map = value
            .as_map()
            .ok_or(MmdbError::InvalidDatabase("metadata is not a map"))?;

        let take_u64 = |key: &str| -> MmdbResult<u64> {
            map.get(key)
                .and_then(Value::as_u64)
                .ok_or(MmdbError::InvalidDatabase("metadata missing required field"))
        };
        let take_string = |key: &str| -> MmdbResult<String> {
            map.get(key)
                .and_then(Value::as_str)
                .map(str::to_owned)
                .ok_or(MmdbError::InvalidDatabase("metadata missing required field"))
        };
        let take_string_array = |key: &str| -> MmdbResult<Vec<String>> {
            let items = map
                .get(key)
                .and_then(Value::as_array)
                .ok_or(MmdbError::InvalidDatabase("metadata missing required field"))?;
            items
                .iter()
                .map(|v| {
                    v.as_str()
                        .map(str::to_owned)
                        .ok_or(MmdbError::InvalidDatabase("metadata array element is not a string"))
                })
                .collect()
        };
        let take_string_map = |key: &str| -> MmdbResult<std::collections::BTreeMap<String, String>> {
            let inner = map
                .get(key)
                .and_then(Value::as_map)
                .ok_or(MmdbError::InvalidDatabase("metadata missing required field"))?;
            inner
                .iter()
                .map(|(k, v)| {
                    v.as_str()
                        .map(|s| (k.clone(), s.to_owned()))
                        .ok_or(MmdbError::InvalidDatabase("metadata map value is not a string"))
                })
                .collect()
        };

        Ok(Metadata {
            binary_format_major_version: take_u64("binary_format_major_version")? as u16,
            binary_format_minor_version: take_u64("binary_format_minor_version")? as u16,
            build_epoch: take_u64("build_epoch")?,
            database_type: take_string("database_type")?,
            description: take_string_map("description")?,
            ip_version: take_u64("ip_version")? as u16,
            languages: take_string_array("languages")?,
            node_count: take_u64("node_count")? as u32,
            record_size: take_u64("record_size")? as u16,
        })
    }
}

fn find_metadata_marker(bytes: &ByteRange) -> MmdbResult<usize> {
    let data = bytes.as_slice();
    let window_start = data.len().saturating_sub(METADATA_MAX_SEARCH_WINDOW);
    let window = &data[window_start..];

    window
        .windows(METADATA_MARKER.len())
        .rposition(|w| w == METADATA_MARKER)
        .map(|pos| window_start + pos)
        .ok_or(MmdbError::InvalidDatabase(
            "metadata marker not found near end of file",
        ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_database() -> Vec<u8> {
        // A single search-tree node (24-bit records, both children pointing
        // past the tree -> no match), the 16-byte separator, then the data
        // section holding just the metadata map itself (no lookup records).
        let mut data = vec![0u8; 6]; // one 24-bit node
        data.extend_from_slice(&[0u8; 16]); // separator

        // metadata map with the six required fields plus description/languages.
        let mut meta = vec![0xe6u8]; // map, 6 pairs... we'll append more below, fix count after.
        meta.clear();

        fn push_str(buf: &mut Vec<u8>, s: &str) {
            // type 2 (utf8_string) fits directly in the 3-bit type field.
            buf.push(0x40 | s.len() as u8);
            buf.extend_from_slice(s.as_bytes());
        }
        fn push_key(buf: &mut Vec<u8>, s: &str) {
            push_str(buf, s);
        }
        fn push_uint32(buf: &mut Vec<u8>, v: u32) {
            let bytes = v.to_be_bytes();
            let trimmed: Vec<u8> = {
                let mut i = 0;
                while i < 3 && bytes[i] == 0 {
                    i += 1;
                }
                bytes[i..].to_vec()
            };
            buf.push(0xc0 | trimmed.len() as u8);
            buf.extend_from_slice(&trimmed);
        }

        let fields: [(&str, u32); 6] = [
            ("binary_format_major_version", 2),
            ("binary_format_minor_version", 0),
            ("build_epoch", 1_600_000_000),
            ("ip_version", 6),
            ("node_count", 1),
            ("record_size", 24),
        ];

        let mut body = Vec::new();
        for (k, v) in fields {
            push_key(&mut body, k);
            push_uint32(&mut body, v);
        }
        push_key(&mut body, "database_type");
        push_str(&mut body, "Test-DB");
        push_key(&mut body, "languages");
        // type 11 (array) doesn't fit in the 3-bit type field: extended
        // escape (type_num=0, size=1) followed by extended byte 11-7=4.
        body.push(0x01);
        body.push(0x04);
        push_str(&mut body, "en");
        push_key(&mut body, "description");
        body.push(0xe1); // map, 1 pair
        push_key(&mut body, "en");
        push_str(&mut body, "Test database");

        let pair_count = fields.len() + 3;
        meta.push(0xe0 | pair_count as u8);
        meta.extend_from_slice(&body);

        // the marker comes first, with the metadata map immediately following it.
        data.extend_from_slice(METADATA_MARKER);
        data.extend_from_slice(&meta);
        data
    }

    #[test]
    fn finds_and_decodes_metadata() {
        let raw = sample_database();
        let bytes = ByteRange::Owned(raw);
        let (metadata, data_start) = Metadata::locate_and_decode(&bytes).unwrap();
        assert_eq!(metadata.database_type, "Test-DB");
        assert_eq!(metadata.ip_version, 6);
        assert_eq!(metadata.record_size, 24);
        assert_eq!(metadata.node_count, 1);
        assert_eq!(data_start, 6 + 16);
        assert_eq!(metadata.languages, vec!["en".to_string()]);
        assert_eq!(
            metadata.description.get("en").map(String::as_str),
            Some("Test database")
        );
    }

    #[test]
    fn missing_marker_is_invalid_database() {
        let bytes = ByteRange::Owned(vec![0u8; 64]);
        assert!(Metadata::locate_and_decode(&bytes).is_err());
    }
}
