//! The archive descriptor: what `meta.xml` says about the data files.
//!
//! - [`FieldDescriptor`] - one column (or constant) of a source
//! - [`SourceDescriptor`] - a core or extension file and its text dialect
//! - [`ArchiveDescriptor`] - the core plus its extensions, anchored at a base path
//! - [`parse_metadata`] / [`write_metadata`] - reading and writing `meta.xml`

pub mod archive;
pub mod field;
pub mod parser;
pub mod source;
pub mod vocab;
pub mod writer;

pub use archive::ArchiveDescriptor;
pub use field::FieldDescriptor;
pub use parser::{locate_metadata, parse_metadata, parse_metadata_file, read_archive};
pub use source::{Role, SourceDescriptor, TextEncoding};
pub use writer::{metadata_to_string, write_metadata};
