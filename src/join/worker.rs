//! Producer side of a pass: sort one file, stream it into a channel, sign off.

use super::{Parked, StreamItem};
use super::cancel::CancelToken;
use crate::config::{PassConfig, SourceErrorPolicy};
use crate::descriptor::SourceDescriptor;
use crate::error::{ArchiveError, Result};
use crate::io::compression::{open_decoded, strip_extension};
use crate::io::{Dialect, ExternalSorter, ForwardRows, RecordSource};
use crossbeam_channel::{SendTimeoutError, Sender};
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, warn};

/// How a producer finished.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Outcome {
    Finished,
    Cancelled,
    Failed(String),
    Truncated(String),
}

/// Sent once by every producer when it is done, whether or not its terminal
/// item could be placed.
#[derive(Clone, Debug)]
pub(crate) struct WorkerReport {
    pub(crate) position: usize,
    pub(crate) label: String,
    pub(crate) sent: u64,
    pub(crate) outcome: Outcome,
    pub(crate) terminal_placed: bool,
}

pub(crate) struct WorkerJob {
    /// 0 for the core, `i + 1` for extension `i`.
    pub(crate) position: usize,
    pub(crate) source: Arc<SourceDescriptor>,
    pub(crate) input: PathBuf,
    pub(crate) scratch: PathBuf,
    pub(crate) include_defaults: bool,
    pub(crate) config: PassConfig,
    pub(crate) cancel: CancelToken,
    pub(crate) tx: Sender<StreamItem>,
    /// Where the terminal item goes when it cannot be sent.
    pub(crate) parked: Parked,
    pub(crate) done: Sender<WorkerReport>,
}

impl WorkerJob {
    fn sorted_path(&self) -> PathBuf {
        let name = self.input.file_name().map_or_else(
            || format!("source-{}", self.position),
            |n| n.to_string_lossy().into_owned(),
        );
        self.scratch.join(format!("sorted-{}", strip_extension(&name)))
    }

    /// Sort, then stream. `sent` is kept current even when this fails part way.
    fn produce(&self, sent: &mut u64) -> Result<()> {
        let sorted = self.sorted_path();
        match fs::remove_file(&sorted) {
            Ok(()) => debug!(path = %sorted.display(), "removed stale sorted file"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(ArchiveError::io(&sorted, e)),
        }

        let dialect = Dialect::from_source(&self.source)?;
        let sorter = ExternalSorter::new(dialect, self.config.key_ordering)
            .with_chunk_rows(self.config.sort_chunk_rows)
            .with_scratch(&self.scratch)
            .with_cancel(self.cancel.clone())
            .with_label(self.source.label());
        let stats = sorter.sort(
            open_decoded(&self.input)?,
            &sorted,
            self.source.header_lines(),
            self.source.key_index(),
        )?;
        debug!(source = %self.source.label(), rows = stats.rows, runs = stats.chunks, "sorted");

        let records = RecordSource::open(
            Arc::clone(&self.source),
            &sorted,
            self.include_defaults,
            self.cancel.clone(),
        )?;
        let mut sink = ForwardRows::new(&self.tx, &self.cancel, self.config.poll_interval());
        let result = records.drain(&mut sink);
        *sent = sink.sent();
        result.map(|_| ())
    }

    /// Give the consumer a moment to catch up before the terminal item goes in.
    fn wait_for_drain(&self) {
        for _ in 0..self.config.drain_attempts {
            if self.tx.is_empty() || self.cancel.is_cancelled() {
                return;
            }
            thread::sleep(self.config.drain_interval());
        }
    }

    /// Hands the item back if it could not be sent.
    fn place_terminal(&self, mut item: StreamItem) -> std::result::Result<(), StreamItem> {
        for _ in 0..self.config.marker_attempts {
            match self.tx.send_timeout(item, self.config.marker_timeout()) {
                Ok(()) => return Ok(()),
                Err(SendTimeoutError::Timeout(back)) => item = back,
                Err(SendTimeoutError::Disconnected(back)) => return Err(back),
            }
        }
        Err(item)
    }
}

/// Body of one producer task.
pub(crate) fn run(job: WorkerJob) {
    let label = job.source.label();
    let mut sent = 0;
    let (terminal, outcome) = match job.produce(&mut sent) {
        Ok(()) => (StreamItem::End, Outcome::Finished),
        Err(e) if e.is_cancelled() => (StreamItem::End, Outcome::Cancelled),
        Err(e) => match job.config.on_source_error {
            SourceErrorPolicy::Fail => {
                error!(source = %label, error = %e, "producer failed");
                let msg = e.to_string();
                (StreamItem::Failed(e), Outcome::Failed(msg))
            }
            SourceErrorPolicy::Truncate => {
                warn!(source = %label, error = %e, rows = sent, "truncating source after error");
                (StreamItem::End, Outcome::Truncated(e.to_string()))
            }
        },
    };

    job.wait_for_drain();
    let terminal_placed = match job.place_terminal(terminal) {
        Ok(()) => true,
        Err(item) => {
            if outcome != Outcome::Cancelled && !job.cancel.is_cancelled() {
                warn!(source = %label, "could not place end-of-stream marker, parking it");
            }
            // must happen before the sender drops with the job
            job.parked.put(item);
            false
        }
    };

    let report = WorkerReport {
        position: job.position,
        label,
        sent,
        outcome,
        terminal_placed,
    };
    // the pass may already have stopped listening
    let _ = job.done.send(report);
}
