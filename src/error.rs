//! Error taxonomy shared by the descriptor, I/O and join layers.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = ArchiveError> = std::result::Result<T, E>;

/// Everything that can go wrong while describing, sorting, or streaming an archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// A descriptor invariant is broken (e.g. extensions present but no core id).
    #[error("structural violation: {0}")]
    Structural(String),

    /// The metadata document could not be read as a Darwin Core descriptor.
    #[error("malformed metadata document: {0}")]
    Metadata(String),

    /// A data line could not be split or decoded.
    #[error("CSV syntax error in {file} at line {line}: {message}")]
    CsvSyntax {
        file: String,
        line: u64,
        message: String,
    },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A producer could not hand off its terminal item, or vanished without one.
    #[error("channel failure: {0}")]
    Channel(String),

    #[error("pass was cancelled")]
    Cancelled,

    #[error("no more record sets in this pass")]
    NoSuchElement,
}

impl ArchiveError {
    pub(crate) fn structural(msg: impl Into<String>) -> Self {
        Self::Structural(msg.into())
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn csv(file: impl Into<String>, line: u64, message: impl Into<String>) -> Self {
        Self::CsvSyntax {
            file: file.into(),
            line,
            message: message.into(),
        }
    }

    /// True for the cooperative-cancellation signal, which is never a data fault.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
