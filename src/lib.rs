//! # dwca-stream
//!
//! A **streaming reader for Darwin Core Archives**. An archive is a set of
//! delimited text files described by a `meta.xml`: one *core* file with one row
//! per record, and any number of *extension* files whose rows point back at a core
//! row through a key column. dwca-stream joins them without loading any file into
//! memory: every file is externally sorted on its key, the sorted files are
//! streamed concurrently, and a sort-merge join hands out one [`RecordSet`] per
//! core row.
//!
//! ## Key Features
//!
//! - **Descriptor model** - parse and write `meta.xml`, with invariant checks
//! - **Bounded memory** - external sort with disk spill, bounded hand-off channels
//! - **Concurrent producers** - one per file on a pass-private rayon pool
//! - **Explicit failure handling** - producer errors surface from the pass, or truncate the source
//! - **Cooperative cancellation** - a [`CancelToken`] stops sorts, producers and the join
//! - **Compressed data files** - gzip, zstd, bzip2 and xz (optional via feature flags)
//!
//! ## Quick Start
//!
//! ```no_run
//! use dwca_stream::descriptor::read_archive;
//! use dwca_stream::FieldValue;
//! # fn main() -> anyhow::Result<()> {
//!
//! let archive = read_archive("path/to/archive")?;
//! let images = archive.extensions().first().cloned();
//!
//! for set in archive.pass(true)? {
//!     let set = set?;
//!     let name = set.core().get("http://rs.tdwg.org/dwc/terms/scientificName");
//!     if let (FieldValue::Present(name), Some(ext)) = (name, &images) {
//!         let has_image = set.extension(ext).is_some();
//!         println!("{name}: image={has_image}");
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Passes
//!
//! A [`Pass`] is a single traversal. It is lazy (nothing runs until the first
//! [`has_next`](Pass::has_next)), owns a scratch directory for its sorted copies,
//! and tears everything down on [`close`](Pass::close) or drop. Tune it with a
//! [`PassConfig`]; in particular [`KeyOrdering::Numeric`] lets unpadded integer
//! keys join in numeric order.
//!
//! ## Module Overview
//!
//! - [`descriptor`] - archive, source and field descriptors; `meta.xml` parsing and writing
//! - [`io`] - text dialects, decompression, external sort and per-file record sources
//! - [`record`] - records, record sets and three-way field lookup
//! - [`join`] - the pass state machine and its producers
//! - [`checker`] - whole-archive validation and summaries
//! - [`config`] - pass configuration
//! - [`testing`] - fixture builders for archives in temp directories

pub mod checker;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod io;
pub mod join;
pub mod record;
pub mod testing;

pub use config::{KeyOrdering, PassConfig, SourceErrorPolicy};
pub use descriptor::{ArchiveDescriptor, FieldDescriptor, Role, SourceDescriptor};
pub use error::{ArchiveError, Result};
pub use join::{CancelToken, Pass, PassPhase, PassStats};
pub use record::{FieldValue, Record, RecordSet};
