//! Pass configuration.
//!
//! A [`PassConfig`] controls channel sizing, the retry/timeout budget of the
//! producer and close paths, the external sort, and how a failing source is
//! treated. Every field has a default, so a config file only needs to name the
//! knobs it changes:
//!
//! ```
//! use dwca_stream::config::{KeyOrdering, PassConfig};
//!
//! let json = r#"{ "key_ordering": "numeric", "channel_capacity": 64 }"#;
//! let cfg = PassConfig::from_json_str(json)?;
//! assert_eq!(cfg.key_ordering, KeyOrdering::Numeric);
//! assert_eq!(cfg.close_timeout_ms, PassConfig::default().close_timeout_ms);
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How join keys are ordered, both by the external sort and by the merge-join.
///
/// The sorter and the join always share one `KeyOrdering`, so the two-pointer
/// scan sees monotonically aligned streams whichever variant is chosen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyOrdering {
    /// Byte-wise comparison of the key text. `"10" < "2"`.
    #[default]
    Ordinal,
    /// Keys that parse as `i64` compare numerically and sort before all other keys;
    /// the rest compare ordinally. `"2" < "10" < "abc"`.
    Numeric,
}

impl KeyOrdering {
    /// Total order over key text. Equality only ever holds for identical strings.
    #[must_use]
    pub fn compare(self, a: &str, b: &str) -> Ordering {
        match self {
            Self::Ordinal => a.as_bytes().cmp(b.as_bytes()),
            Self::Numeric => match (a.parse::<i64>(), b.parse::<i64>()) {
                (Ok(x), Ok(y)) => x.cmp(&y).then_with(|| a.as_bytes().cmp(b.as_bytes())),
                (Ok(_), Err(_)) => Ordering::Less,
                (Err(_), Ok(_)) => Ordering::Greater,
                (Err(_), Err(_)) => a.as_bytes().cmp(b.as_bytes()),
            },
        }
    }
}

/// What a pass does when one of its sources fails to sort or parse.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceErrorPolicy {
    /// Deliver the error through the channel; the pass surfaces it and closes.
    #[default]
    Fail,
    /// Log the error and end that source's stream early.
    Truncate,
}

/// Tunables for one join pass.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PassConfig {
    /// Capacity of each per-source hand-off channel.
    pub channel_capacity: usize,
    /// How many times a finished producer waits for its channel to drain before
    /// placing the end-of-stream marker.
    pub drain_attempts: u32,
    pub drain_interval_ms: u64,
    /// Timed attempts at placing the end-of-stream marker.
    pub marker_attempts: u32,
    pub marker_timeout_ms: u64,
    /// Upper bound on how long `close` waits for producers to report.
    pub close_timeout_ms: u64,
    /// Granularity at which blocked sends and receives re-check cancellation.
    pub poll_interval_ms: u64,
    /// Rows held in memory per sorted run before spilling to disk.
    pub sort_chunk_rows: usize,
    /// Root under which each pass creates its private scratch directory.
    /// `None` uses the system temp directory.
    pub scratch_dir: Option<PathBuf>,
    pub key_ordering: KeyOrdering,
    pub on_source_error: SourceErrorPolicy,
}

impl Default for PassConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 10,
            drain_attempts: 10,
            drain_interval_ms: 10,
            marker_attempts: 3,
            marker_timeout_ms: 10_000,
            close_timeout_ms: 10_000,
            poll_interval_ms: 50,
            sort_chunk_rows: 100_000,
            scratch_dir: None,
            key_ordering: KeyOrdering::Ordinal,
            on_source_error: SourceErrorPolicy::Fail,
        }
    }
}

impl PassConfig {
    /// Parse a JSON config; absent fields keep their defaults.
    ///
    /// # Errors
    /// Returns an error if the text is not valid JSON for this shape.
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("parse pass config")
    }

    /// Load a JSON config file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or parsed.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
        serde_json::from_reader(BufReader::new(f))
            .with_context(|| format!("parse pass config {}", path.display()))
    }

    #[must_use]
    pub fn with_key_ordering(mut self, ordering: KeyOrdering) -> Self {
        self.key_ordering = ordering;
        self
    }

    #[must_use]
    pub fn with_source_error_policy(mut self, policy: SourceErrorPolicy) -> Self {
        self.on_source_error = policy;
        self
    }

    #[must_use]
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn with_sort_chunk_rows(mut self, rows: usize) -> Self {
        self.sort_chunk_rows = rows;
        self
    }

    pub(crate) fn drain_interval(&self) -> Duration {
        Duration::from_millis(self.drain_interval_ms)
    }

    pub(crate) fn marker_timeout(&self) -> Duration {
        Duration::from_millis(self.marker_timeout_ms)
    }

    pub(crate) fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }

    pub(crate) fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordinal_is_bytewise() {
        assert_eq!(KeyOrdering::Ordinal.compare("10", "2"), Ordering::Less);
        assert_eq!(KeyOrdering::Ordinal.compare("a", "a"), Ordering::Equal);
    }

    #[test]
    fn numeric_orders_integers_first() {
        let n = KeyOrdering::Numeric;
        assert_eq!(n.compare("2", "10"), Ordering::Less);
        assert_eq!(n.compare("-3", "1"), Ordering::Less);
        assert_eq!(n.compare("99", "abc"), Ordering::Less);
        assert_eq!(n.compare("abc", "abd"), Ordering::Less);
        // same value, different text: never equal
        assert_ne!(n.compare("01", "1"), Ordering::Equal);
    }
}
