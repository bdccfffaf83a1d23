//! External sort of a delimited file on one key column.
//!
//! Rows are read in chunks of at most `chunk_rows`, each chunk is sorted in
//! parallel with a stable sort and spilled to a run file, and the runs are then
//! merged through a min-heap into the output. Ties between runs go to the lower
//! run index, so rows with equal keys keep their input order end to end.
//! A single chunk skips the spill and is written straight to the output.

use super::dialect::Dialect;
use crate::config::KeyOrdering;
use crate::error::{ArchiveError, Result};
use crate::join::CancelToken;
use csv::ByteRecord;
use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

/// Counters from one [`ExternalSorter::sort`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SortStats {
    pub rows: u64,
    /// Sorted runs produced; 1 means no spill happened.
    pub chunks: usize,
    pub header_lines: usize,
}

/// Sorts files of one dialect by key column.
#[derive(Clone, Debug)]
pub struct ExternalSorter {
    dialect: Dialect,
    ordering: KeyOrdering,
    chunk_rows: usize,
    scratch: Option<PathBuf>,
    cancel: CancelToken,
    label: String,
}

struct Row {
    key: String,
    record: ByteRecord,
}

impl ExternalSorter {
    #[must_use]
    pub fn new(dialect: Dialect, ordering: KeyOrdering) -> Self {
        Self {
            dialect,
            ordering,
            chunk_rows: 100_000,
            scratch: None,
            cancel: CancelToken::new(),
            label: "input".into(),
        }
    }

    #[must_use]
    pub fn with_chunk_rows(mut self, rows: usize) -> Self {
        self.chunk_rows = rows.max(1);
        self
    }

    /// Directory under which run files are created; the system temp dir otherwise.
    #[must_use]
    pub fn with_scratch(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch = Some(dir.into());
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Name used in error messages for the input.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Sort `input` into `output` by column `key_index`.
    ///
    /// The first `header_lines` lines are copied through untouched.
    ///
    /// # Errors
    /// [`ArchiveError::CsvSyntax`] for unreadable rows or rows without a key column,
    /// [`ArchiveError::Io`] for scratch or output failures, and
    /// [`ArchiveError::Cancelled`] if the token fires mid-sort.
    pub fn sort(
        &self,
        input: impl Read,
        output: &Path,
        header_lines: usize,
        key_index: usize,
    ) -> Result<SortStats> {
        let mut input = BufReader::new(input);
        let header = self
            .dialect
            .take_raw_lines(&mut input, header_lines)
            .map_err(|e| ArchiveError::io(output, e))?;
        let mut reader = self.dialect.reader(input);

        let out = File::create(output).map_err(|e| ArchiveError::io(output, e))?;
        let mut out = BufWriter::new(out);
        out.write_all(&header).map_err(|e| ArchiveError::io(output, e))?;

        let mut stats = SortStats {
            header_lines,
            ..SortStats::default()
        };
        let mut runs: Option<RunDir> = None;
        let mut pending: Option<Vec<Row>> = None;

        loop {
            let chunk = self.read_chunk(&mut reader, header_lines, key_index)?;
            if chunk.is_empty() {
                break;
            }
            stats.rows += chunk.len() as u64;
            stats.chunks += 1;
            let mut chunk = chunk;
            self.sort_chunk(&mut chunk);
            if let Some(dir) = runs.as_mut() {
                dir.spill(&self.dialect, &chunk)?;
            } else if let Some(first) = pending.take() {
                let mut dir = RunDir::create(self.scratch.as_deref())?;
                dir.spill(&self.dialect, &first)?;
                dir.spill(&self.dialect, &chunk)?;
                runs = Some(dir);
            } else {
                pending = Some(chunk);
            }
        }

        let mut writer = self.dialect.writer(out);
        match (pending, runs) {
            (Some(only), None) => {
                for row in &only {
                    writer
                        .write_byte_record(&row.record)
                        .map_err(|e| csv_io(output, e))?;
                }
            }
            (_, Some(dir)) => {
                debug!(input = %self.label, runs = dir.runs.len(), "merging sorted runs");
                self.merge(dir, &mut writer, key_index, output)?;
            }
            (None, None) => {}
        }
        writer.flush().map_err(|e| ArchiveError::io(output, e))?;
        Ok(stats)
    }

    fn read_chunk<R: Read>(
        &self,
        reader: &mut csv::Reader<R>,
        header_lines: usize,
        key_index: usize,
    ) -> Result<Vec<Row>> {
        let mut chunk = Vec::new();
        while chunk.len() < self.chunk_rows {
            self.cancel.check()?;
            let mut record = ByteRecord::new();
            let more = reader.read_byte_record(&mut record).map_err(|e| {
                let line = e.position().map_or(0, csv::Position::line) + header_lines as u64;
                ArchiveError::csv(&self.label, line, e.to_string())
            })?;
            if !more {
                break;
            }
            let line = record.position().map_or(0, csv::Position::line) + header_lines as u64;
            let raw = record.get(key_index).ok_or_else(|| {
                ArchiveError::csv(
                    &self.label,
                    line,
                    format!("no key column {key_index} in a row of {} columns", record.len()),
                )
            })?;
            let key = self
                .dialect
                .decode(raw)
                .map_err(|msg| ArchiveError::csv(&self.label, line, format!("key column: {msg}")))?
                .into_owned();
            chunk.push(Row { key, record });
        }
        Ok(chunk)
    }

    fn sort_chunk(&self, chunk: &mut [Row]) {
        let ordering = self.ordering;
        chunk.par_sort_by(|a, b| ordering.compare(&a.key, &b.key));
    }

    fn merge<W: Write>(
        &self,
        dir: RunDir,
        writer: &mut csv::Writer<W>,
        key_index: usize,
        output: &Path,
    ) -> Result<()> {
        let mut readers = Vec::with_capacity(dir.runs.len());
        let mut heap = BinaryHeap::new();

        for (run, path) in dir.runs.iter().enumerate() {
            let f = File::open(path).map_err(|e| ArchiveError::io(path, e))?;
            let mut reader = RunReader {
                reader: self.dialect.reader(BufReader::new(f)),
                path: path.clone(),
            };
            if let Some(head) = reader.read_next(&self.dialect, key_index)? {
                heap.push(HeapItem {
                    ordering: self.ordering,
                    key: head.key,
                    record: head.record,
                    run,
                });
            }
            readers.push(reader);
        }

        while let Some(item) = heap.pop() {
            self.cancel.check()?;
            writer
                .write_byte_record(&item.record)
                .map_err(|e| csv_io(output, e))?;
            let reader = &mut readers[item.run];
            match reader.read_next(&self.dialect, key_index)? {
                Some(next) => heap.push(HeapItem {
                    ordering: self.ordering,
                    key: next.key,
                    record: next.record,
                    run: item.run,
                }),
                // exhausted runs are removed right away to bound scratch usage
                None => {
                    let _ = fs::remove_file(&reader.path);
                }
            }
        }
        dir.close()
    }
}

fn csv_io(path: &Path, e: csv::Error) -> ArchiveError {
    ArchiveError::io(path, std::io::Error::other(e))
}

/// Private directory holding the spilled runs of one sort.
struct RunDir {
    dir: TempDir,
    runs: Vec<PathBuf>,
}

impl RunDir {
    fn create(root: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("runs-");
        let dir = match root {
            Some(root) => builder.tempdir_in(root).map_err(|e| ArchiveError::io(root, e))?,
            None => builder
                .tempdir()
                .map_err(|e| ArchiveError::io(std::env::temp_dir(), e))?,
        };
        Ok(Self {
            dir,
            runs: Vec::new(),
        })
    }

    fn spill(&mut self, dialect: &Dialect, rows: &[Row]) -> Result<()> {
        let path = self.dir.path().join(format!("run-{}.txt", self.runs.len()));
        let f = File::create(&path).map_err(|e| ArchiveError::io(&path, e))?;
        let mut writer = dialect.writer(BufWriter::new(f));
        for row in rows {
            writer
                .write_byte_record(&row.record)
                .map_err(|e| csv_io(&path, e))?;
        }
        writer.flush().map_err(|e| ArchiveError::io(&path, e))?;
        self.runs.push(path);
        Ok(())
    }

    fn close(self) -> Result<()> {
        let path = self.dir.path().to_path_buf();
        self.dir.close().map_err(|e| ArchiveError::io(path, e))
    }
}

struct RunReader {
    reader: csv::Reader<BufReader<File>>,
    path: PathBuf,
}

impl RunReader {
    fn read_next(&mut self, dialect: &Dialect, key_index: usize) -> Result<Option<Row>> {
        let mut record = ByteRecord::new();
        let more = self
            .reader
            .read_byte_record(&mut record)
            .map_err(|e| csv_io(&self.path, e))?;
        if !more {
            return Ok(None);
        }
        // run files only hold rows that already yielded a key
        let key = record
            .get(key_index)
            .map(|raw| dialect.decode(raw).map(std::borrow::Cow::into_owned))
            .transpose()
            .map_err(|msg| ArchiveError::csv(self.path.display().to_string(), 0, msg))?
            .unwrap_or_default();
        Ok(Some(Row { key, record }))
    }
}

/// Min-heap entry: smallest key first, lower run index on ties.
struct HeapItem {
    ordering: KeyOrdering,
    key: String,
    record: ByteRecord,
    run: usize,
}

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapItem {}

impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        // reversed for BinaryHeap's max-first order
        self.ordering
            .compare(&other.key, &self.key)
            .then_with(|| other.run.cmp(&self.run))
    }
}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
