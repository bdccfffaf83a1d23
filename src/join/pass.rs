use super::Parked;
use super::cancel::CancelToken;
use super::lane::Lane;
use super::worker::{self, Outcome, WorkerJob, WorkerReport};
use crate::config::PassConfig;
use crate::descriptor::{ArchiveDescriptor, SourceDescriptor};
use crate::error::{ArchiveError, Result};
use crate::record::{Record, RecordSet};
use crossbeam_channel::{Receiver, RecvTimeoutError, bounded, unbounded};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Where a [`Pass`] is in its life.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PassPhase {
    /// Opened; no producer has been started.
    Idle,
    /// Producers are running; no core record has been requested yet.
    Started,
    /// The consumer is pulling core records.
    Draining,
    Closed,
}

/// Counters for one pass. Index 0 of `rows` is the core; extension `i` is at
/// `rows[i + 1]`, `matches[i]` and `orphans[i]`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassStats {
    /// Records received by the consumer, per source.
    pub rows: Vec<u64>,
    /// Extension records joined to a core record.
    pub matches: Vec<u64>,
    /// Extension records skipped because no core record carried their key.
    pub orphans: Vec<u64>,
}

struct Running {
    scratch: TempDir,
    core: Lane,
    extensions: Vec<Lane>,
    done: Receiver<WorkerReport>,
    workers: usize,
    core_done: bool,
}

impl Running {
    fn stats(&self) -> PassStats {
        PassStats {
            rows: std::iter::once(&self.core)
                .chain(&self.extensions)
                .map(|l| l.received)
                .collect(),
            matches: self.extensions.iter().map(|l| l.matches).collect(),
            orphans: self.extensions.iter().map(|l| l.orphans).collect(),
        }
    }
}

enum State {
    Idle,
    Running(Box<Running>),
    Closed,
}

/// One streaming traversal of an archive, yielding a [`RecordSet`] per core row.
///
/// Nothing happens until the first call to [`Pass::has_next`] or
/// [`Pass::next_record_set`]: then every source is sorted on its key column and
/// streamed by its own producer, and the consumer merges the streams in key
/// order. A pass is single-use; open another for a second traversal.
///
/// ```no_run
/// use dwca_stream::descriptor::read_archive;
///
/// let archive = read_archive("path/to/archive")?;
/// for set in archive.pass(true)? {
///     let set = set?;
///     println!("{} has {} extension records", set.core().key(), set.matched());
/// }
/// # Ok::<(), dwca_stream::ArchiveError>(())
/// ```
pub struct Pass {
    /// Core first, then extensions in document order.
    sources: Vec<(Arc<SourceDescriptor>, PathBuf)>,
    include_defaults: bool,
    config: PassConfig,
    cancel: CancelToken,
    state: State,
    phase: PassPhase,
    pending: Option<Result<Record>>,
    stats: PassStats,
}

impl Pass {
    /// Validate `archive` and prepare a pass over it.
    ///
    /// # Errors
    /// [`ArchiveError::Structural`] if the archive breaks an invariant or has no
    /// base path to resolve its files against.
    pub fn open(
        archive: &ArchiveDescriptor,
        include_defaults: bool,
        config: PassConfig,
    ) -> Result<Self> {
        archive.check()?;
        let core = archive.core()?;
        let sources = std::iter::once(core)
            .chain(archive.extensions())
            .map(|s| Ok((Arc::clone(s), archive.resolve(s)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            sources,
            include_defaults,
            config,
            cancel: CancelToken::new(),
            state: State::Idle,
            phase: PassPhase::Idle,
            pending: None,
            stats: PassStats::default(),
        })
    }

    /// Token that stops this pass from any thread.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    #[must_use]
    pub fn phase(&self) -> PassPhase {
        self.phase
    }

    #[must_use]
    pub fn stats(&self) -> PassStats {
        match &self.state {
            State::Running(running) => running.stats(),
            State::Idle | State::Closed => self.stats.clone(),
        }
    }

    fn make_scratch(&self) -> Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("dwca-pass-");
        match &self.config.scratch_dir {
            Some(root) => {
                fs::create_dir_all(root).map_err(|e| ArchiveError::io(root, e))?;
                builder.tempdir_in(root).map_err(|e| ArchiveError::io(root, e))
            }
            None => builder
                .tempdir()
                .map_err(|e| ArchiveError::io(std::env::temp_dir(), e)),
        }
    }

    fn start(&mut self) -> Result<()> {
        let scratch = self.make_scratch()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.sources.len())
            .thread_name(|i| format!("dwca-source-{i}"))
            .build()
            .map_err(|e| ArchiveError::io(scratch.path(), std::io::Error::other(e)))?;

        let (done_tx, done_rx) = unbounded();
        let mut lanes = Vec::with_capacity(self.sources.len());
        for (position, (source, input)) in self.sources.iter().enumerate() {
            let (tx, rx) = bounded(self.config.channel_capacity.max(1));
            let parked = Parked::default();
            let job = WorkerJob {
                position,
                source: Arc::clone(source),
                input: input.clone(),
                scratch: scratch.path().to_path_buf(),
                include_defaults: self.include_defaults,
                config: self.config.clone(),
                cancel: self.cancel.clone(),
                tx,
                parked: parked.clone(),
                done: done_tx.clone(),
            };
            pool.spawn(move || worker::run(job));
            lanes.push(Lane::new(Arc::clone(source), rx, parked));
        }
        // no further work is accepted; the threads exit once their job returns
        drop(pool);

        let mut lanes = lanes.into_iter();
        let core = lanes
            .next()
            .ok_or_else(|| ArchiveError::structural("pass has no core source"))?;
        info!(
            sources = self.sources.len(),
            scratch = %scratch.path().display(),
            "pass started"
        );
        self.state = State::Running(Box::new(Running {
            scratch,
            core,
            extensions: lanes.collect(),
            done: done_rx,
            workers: self.sources.len(),
            core_done: false,
        }));
        self.phase = PassPhase::Started;
        Ok(())
    }

    /// Start on first use. A failure to start is parked as the pending item so
    /// the next call to [`Self::next_record_set`] reports it.
    fn ensure_started(&mut self) {
        if matches!(self.state, State::Idle) {
            if let Err(e) = self.start() {
                self.state = State::Closed;
                self.phase = PassPhase::Closed;
                self.pending = Some(Err(e));
            }
        }
    }

    /// Whether another record set (or an error) is available. May block until a
    /// producer delivers. False once the core is exhausted or the pass is
    /// cancelled or closed; a cancelled pass is closed on the spot.
    pub fn has_next(&mut self) -> bool {
        self.ensure_started();
        if self.cancel.is_cancelled() {
            self.close();
            return false;
        }
        if self.pending.is_some() {
            return true;
        }
        let poll = self.config.poll_interval();
        let State::Running(running) = &mut self.state else {
            return false;
        };
        if running.core_done {
            return false;
        }
        self.phase = PassPhase::Draining;
        match running.core.pull(&self.cancel, poll) {
            Ok(Some(record)) => {
                self.pending = Some(Ok(record));
                true
            }
            Ok(None) => {
                running.core_done = true;
                self.close();
                false
            }
            Err(e) if e.is_cancelled() => {
                self.close();
                false
            }
            Err(e) => {
                self.pending = Some(Err(e));
                true
            }
        }
    }

    /// The next joined record set.
    ///
    /// # Errors
    /// [`ArchiveError::NoSuchElement`] when nothing is left, any producer's
    /// failure, or [`ArchiveError::Cancelled`] if the pass is cancelled while the
    /// set is being assembled. The pass is closed after any of the latter two.
    pub fn next_record_set(&mut self) -> Result<RecordSet> {
        if !self.has_next() {
            return Err(ArchiveError::NoSuchElement);
        }
        let core = match self.pending.take() {
            Some(Ok(record)) => record,
            Some(Err(e)) => {
                self.close();
                return Err(e);
            }
            None => return Err(ArchiveError::NoSuchElement),
        };
        let State::Running(running) = &mut self.state else {
            return Err(ArchiveError::NoSuchElement);
        };

        let ordering = self.config.key_ordering;
        let poll = self.config.poll_interval();
        let mut set = RecordSet::new(core);
        let mut failure = None;
        for (position, lane) in running.extensions.iter_mut().enumerate() {
            match lane.next_match(set.core().key(), ordering, &self.cancel, poll) {
                Ok(Some(record)) => set.insert(position, record),
                Ok(None) => {}
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        match failure {
            Some(e) => {
                self.close();
                Err(e)
            }
            None => Ok(set),
        }
    }

    /// Stop producers, release channels and remove scratch files.
    ///
    /// Safe to call at any point and more than once. Producers that do not report
    /// back within the configured close timeout are left to stop on their own at
    /// their next cancellation check.
    pub fn close(&mut self) {
        if matches!(self.state, State::Closed) {
            self.phase = PassPhase::Closed;
            return;
        }
        // an unstarted pass goes through the same teardown
        self.ensure_started();
        self.pending = None;
        self.phase = PassPhase::Closed;
        let State::Running(running) = std::mem::replace(&mut self.state, State::Closed) else {
            return;
        };
        self.cancel.cancel();
        self.stats = running.stats();

        let Running {
            scratch,
            core,
            extensions,
            done,
            workers,
            ..
        } = *running;
        core.release();
        extensions.into_iter().for_each(Lane::release);

        let deadline = Instant::now() + self.config.close_timeout();
        let reported = collect_reports(&done, workers, deadline);
        if reported < workers {
            warn!(
                detached = workers - reported,
                "producers did not finish before the close timeout"
            );
        }

        let scratch_path = scratch.path().to_path_buf();
        if let Err(e) = scratch.close() {
            warn!(
                path = %scratch_path.display(),
                error = %e,
                "could not remove scratch directory"
            );
        }
        info!(rows = ?self.stats.rows, orphans = ?self.stats.orphans, "pass closed");
    }
}

fn collect_reports(done: &Receiver<WorkerReport>, workers: usize, deadline: Instant) -> usize {
    let mut reported = 0;
    while reported < workers {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match done.recv_timeout(remaining) {
            Ok(report) => {
                reported += 1;
                log_report(&report);
            }
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => break,
        }
    }
    reported
}

fn log_report(report: &WorkerReport) {
    match &report.outcome {
        Outcome::Finished | Outcome::Cancelled => debug!(
            position = report.position,
            source = %report.label,
            sent = report.sent,
            outcome = ?report.outcome,
            terminal_placed = report.terminal_placed,
            "producer finished"
        ),
        Outcome::Failed(msg) | Outcome::Truncated(msg) => debug!(
            position = report.position,
            source = %report.label,
            sent = report.sent,
            error = %msg,
            "producer stopped early"
        ),
    }
}

impl Iterator for Pass {
    type Item = Result<RecordSet>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.has_next() {
            return None;
        }
        match self.next_record_set() {
            Err(ArchiveError::Cancelled | ArchiveError::NoSuchElement) => None,
            other => Some(other),
        }
    }
}

impl Drop for Pass {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Pass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pass")
            .field(
                "sources",
                &self.sources.iter().map(|(_, p)| p.as_path()).collect::<Vec<&Path>>(),
            )
            .field("include_defaults", &self.include_defaults)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}
