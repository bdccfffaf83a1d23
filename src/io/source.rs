//! Per-file record source.
//!
//! A [`RecordSource`] walks one data file front to back and turns every line into
//! a [`Record`]. What happens to converted records is decided by a [`RowSink`]:
//! [`CountRows`] only counts them (validation), [`ForwardRows`] pushes them into a
//! join channel.

use super::compression::open_decoded;
use super::dialect::Dialect;
use crate::descriptor::SourceDescriptor;
use crate::error::{ArchiveError, Result};
use crate::join::{CancelToken, StreamItem};
use crate::record::Record;
use crossbeam_channel::{SendTimeoutError, Sender};
use csv::ByteRecord;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

type RowReader = csv::Reader<BufReader<Box<dyn Read + Send>>>;

/// Lazy, forward-only iterator over the records of one file.
pub struct RecordSource {
    source: Arc<SourceDescriptor>,
    dialect: Dialect,
    reader: RowReader,
    file: String,
    include_defaults: bool,
    cancel: CancelToken,
    row: ByteRecord,
    min_columns: usize,
    done: bool,
}

impl RecordSource {
    /// Open `path` as a file of `source`, skipping its header lines.
    ///
    /// # Errors
    /// [`ArchiveError::Io`] if the file cannot be opened, [`ArchiveError::Structural`]
    /// if the source's dialect is unusable.
    pub fn open(
        source: Arc<SourceDescriptor>,
        path: impl AsRef<Path>,
        include_defaults: bool,
        cancel: CancelToken,
    ) -> Result<Self> {
        let path = path.as_ref();
        let dialect = Dialect::from_source(&source)?;
        let mut input = BufReader::new(open_decoded(path)?);
        dialect
            .take_raw_lines(&mut input, source.header_lines())
            .map_err(|e| ArchiveError::io(path, e))?;
        let reader = dialect.reader(input);
        let file = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        Ok(Self {
            min_columns: source.min_columns(),
            source,
            dialect,
            reader,
            file,
            include_defaults,
            cancel,
            row: ByteRecord::new(),
            done: false,
        })
    }

    #[must_use]
    pub fn source(&self) -> &Arc<SourceDescriptor> {
        &self.source
    }

    /// Physical line number of the row just read.
    fn line(&self) -> u64 {
        let within = self.row.position().map_or(0, csv::Position::line);
        within + self.source.header_lines() as u64
    }

    fn column(&self, index: usize) -> Result<String> {
        self.dialect
            .decode(&self.row[index])
            .map(std::borrow::Cow::into_owned)
            .map_err(|msg| {
                ArchiveError::csv(&self.file, self.line(), format!("column {index}: {msg}"))
            })
    }

    fn convert(&self) -> Result<Record> {
        if self.row.len() < self.min_columns {
            return Err(ArchiveError::csv(
                &self.file,
                self.line(),
                format!(
                    "expected at least {} columns, found {}",
                    self.min_columns,
                    self.row.len()
                ),
            ));
        }
        let values = self
            .source
            .fields()
            .iter()
            .map(|f| match f.index() {
                Some(i) => self.column(i),
                None => Ok(String::new()),
            })
            .collect::<Result<Vec<_>>>()?;
        let key = self.column(self.source.key_index())?;
        Ok(Record::new(
            Arc::clone(&self.source),
            key,
            values,
            self.include_defaults,
            self.line(),
        ))
    }

    fn read_next(&mut self) -> Result<Option<Record>> {
        self.cancel.check()?;
        match self.reader.read_byte_record(&mut self.row) {
            Ok(false) => Ok(None),
            Ok(true) => self.convert().map(Some),
            Err(e) => {
                let line = e.position().map_or(0, csv::Position::line)
                    + self.source.header_lines() as u64;
                Err(ArchiveError::csv(&self.file, line, e.to_string()))
            }
        }
    }

    /// Feed every remaining record into `sink`, stopping early if the sink asks to.
    ///
    /// # Errors
    /// The first conversion error, cancellation, or sink failure.
    pub fn drain<S: RowSink>(self, sink: &mut S) -> Result<u64> {
        let mut rows = 0;
        for record in self {
            let record = record?;
            rows += 1;
            if !sink.accept(record)? {
                break;
            }
        }
        Ok(rows)
    }
}

impl Iterator for RecordSource {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let item = self.read_next().transpose();
        if !matches!(item, Some(Ok(_))) {
            self.done = true;
        }
        item
    }
}

/// What to do with each converted record.
pub trait RowSink {
    /// Returns `false` to stop reading.
    ///
    /// # Errors
    /// Any failure aborts the drain.
    fn accept(&mut self, record: Record) -> Result<bool>;
}

/// Parse-only sink.
#[derive(Debug, Default)]
pub struct CountRows {
    rows: u64,
}

impl CountRows {
    #[must_use]
    pub fn rows(&self) -> u64 {
        self.rows
    }
}

impl RowSink for CountRows {
    fn accept(&mut self, _record: Record) -> Result<bool> {
        self.rows += 1;
        Ok(true)
    }
}

/// Pushes records into a join channel, re-checking cancellation while the
/// channel is full.
pub struct ForwardRows<'a> {
    tx: &'a Sender<StreamItem>,
    cancel: &'a CancelToken,
    poll: Duration,
    sent: u64,
}

impl<'a> ForwardRows<'a> {
    pub(crate) fn new(tx: &'a Sender<StreamItem>, cancel: &'a CancelToken, poll: Duration) -> Self {
        Self {
            tx,
            cancel,
            poll,
            sent: 0,
        }
    }

    #[must_use]
    pub fn sent(&self) -> u64 {
        self.sent
    }
}

impl RowSink for ForwardRows<'_> {
    fn accept(&mut self, record: Record) -> Result<bool> {
        let mut item = StreamItem::Record(record);
        loop {
            self.cancel.check()?;
            match self.tx.send_timeout(item, self.poll) {
                Ok(()) => {
                    self.sent += 1;
                    return Ok(true);
                }
                Err(SendTimeoutError::Timeout(back)) => item = back,
                Err(SendTimeoutError::Disconnected(_)) => {
                    return Err(ArchiveError::Channel("consumer released the channel".into()));
                }
            }
        }
    }
}
