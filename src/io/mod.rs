//! Reading data files: dialect, decompression, external sort and record sources.

pub mod compression;
pub mod dialect;
pub mod sort;
pub mod source;

pub use compression::{Codec, open_decoded};
pub use dialect::Dialect;
pub use sort::{ExternalSorter, SortStats};
pub use source::{CountRows, ForwardRows, RecordSource, RowSink};
