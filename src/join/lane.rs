use super::{Parked, StreamItem};
use super::cancel::CancelToken;
use crate::config::KeyOrdering;
use crate::descriptor::SourceDescriptor;
use crate::error::{ArchiveError, Result};
use crate::record::Record;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// Consumer end of one source's channel, with a one-record look-ahead.
pub(crate) struct Lane {
    source: Arc<SourceDescriptor>,
    rx: Receiver<StreamItem>,
    parked: Parked,
    cached: Option<Record>,
    exhausted: bool,
    pub(crate) received: u64,
    pub(crate) matches: u64,
    pub(crate) orphans: u64,
}

impl Lane {
    pub(crate) fn new(
        source: Arc<SourceDescriptor>,
        rx: Receiver<StreamItem>,
        parked: Parked,
    ) -> Self {
        Self {
            source,
            rx,
            parked,
            cached: None,
            exhausted: false,
            received: 0,
            matches: 0,
            orphans: 0,
        }
    }

    /// Next record, or `None` at end of stream. Blocks, re-checking `cancel`
    /// every `poll`.
    pub(crate) fn pull(&mut self, cancel: &CancelToken, poll: Duration) -> Result<Option<Record>> {
        if self.exhausted {
            return Ok(None);
        }
        loop {
            cancel.check()?;
            let item = match self.rx.recv_timeout(poll) {
                Ok(item) => item,
                Err(RecvTimeoutError::Timeout) => continue,
                // a producer that gave up on a stalled channel leaves its marker behind
                Err(RecvTimeoutError::Disconnected) => match self.parked.take() {
                    Some(item) => item,
                    None => {
                        self.exhausted = true;
                        return Err(ArchiveError::Channel(format!(
                            "producer for {} stopped without an end-of-stream marker",
                            self.source.label()
                        )));
                    }
                },
            };
            match item {
                StreamItem::Record(r) => {
                    self.received += 1;
                    return Ok(Some(r));
                }
                StreamItem::End => {
                    self.exhausted = true;
                    return Ok(None);
                }
                StreamItem::Failed(e) => {
                    self.exhausted = true;
                    return Err(e);
                }
            }
        }
    }

    /// The record of this lane keyed `key`, if the stream holds one at its current
    /// position. Records with smaller keys are orphans and are skipped; a record
    /// with a larger key stays cached for a later core key.
    pub(crate) fn next_match(
        &mut self,
        key: &str,
        ordering: KeyOrdering,
        cancel: &CancelToken,
        poll: Duration,
    ) -> Result<Option<Record>> {
        loop {
            let candidate = match self.cached.take() {
                Some(r) => r,
                None => match self.pull(cancel, poll)? {
                    Some(r) => r,
                    None => return Ok(None),
                },
            };
            match ordering.compare(candidate.key(), key) {
                Ordering::Equal => {
                    self.matches += 1;
                    return Ok(Some(candidate));
                }
                Ordering::Less => {
                    self.orphans += 1;
                    trace!(
                        source = %self.source.label(),
                        key = candidate.key(),
                        line = candidate.line(),
                        "discarding orphan"
                    );
                }
                Ordering::Greater => {
                    self.cached = Some(candidate);
                    return Ok(None);
                }
            }
        }
    }

    /// Drop everything still queued and let go of the channel, so a producer
    /// blocked on a full channel fails its next send.
    pub(crate) fn release(self) {
        self.rx.try_iter().for_each(drop);
    }
}
