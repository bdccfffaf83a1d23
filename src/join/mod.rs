//! Streaming sort-merge join over a core and its extensions.
//!
//! Every source gets a producer on a pass-private pool that sorts the file on its
//! key column and streams the sorted rows through a bounded channel. The consumer
//! (the thread owning the [`Pass`]) walks the core stream and, for each core key,
//! advances every extension stream just far enough to find a record with the same
//! key. Extension rows whose key never appears in the core are discarded as
//! orphans.

mod cancel;
mod lane;
mod pass;
mod worker;

pub use cancel::CancelToken;
pub use pass::{Pass, PassPhase, PassStats};

use crate::error::ArchiveError;
use crate::record::Record;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// What travels through a producer's channel.
#[derive(Debug)]
pub(crate) enum StreamItem {
    Record(Record),
    /// End of stream. Nothing follows.
    End,
    /// The producer failed; nothing follows.
    Failed(ArchiveError),
}

/// Terminal item a producer could not place in its channel.
///
/// The producer parks it here before letting go of its sender, so the consumer
/// finds it once the channel reports disconnection and still ends the stream
/// the way the producer meant to.
#[derive(Clone, Debug, Default)]
pub(crate) struct Parked(Arc<Mutex<Option<StreamItem>>>);

impl Parked {
    pub(crate) fn put(&self, item: StreamItem) {
        *self.slot() = Some(item);
    }

    pub(crate) fn take(&self) -> Option<StreamItem> {
        self.slot().take()
    }

    fn slot(&self) -> MutexGuard<'_, Option<StreamItem>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
