//! Zero-allocation reader for the MaxMind DB binary format.
//!
//! Opening a database maps or loads its bytes once; every lookup after that
//! walks the packed search tree and decodes the matched record by driving a
//! caller-supplied [`callback`] tree, never allocating on the hot path. For
//! callers who would rather get an owned tree back, [`Reader::lookup_value`]
//! builds one out of the same decoder.
//!
//! ```no_run
//! use mmdb::Reader;
//! use mmdb::callback::ObjectBuilder;
//!
//! #[derive(Default)]
//! struct City {
//!     name: String,
//! }
//!
//! let reader = Reader::open_file("GeoIP2-City.mmdb")?;
//! let callback = ObjectBuilder::<City>::new()
//!     .obj("city", |b| b.obj("names", |b| b.text("en", |s, v| s.name = v.to_owned())))
//!     .build_record();
//!
//! let mut city = City::default();
//! reader.lookup("8.8.8.8".parse()?, &callback, &mut city)?;
//! println!("{}", city.name);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod byte_range;
pub mod callback;
mod decoder;
pub mod error;
pub mod metadata;
mod reader;
mod tree;
pub mod value;

pub use callback::{ArrayBuilder, ObjectBuilder};
pub use error::{MmdbError, MmdbResult};
pub use metadata::Metadata;
pub use reader::Reader;
pub use value::Value;
