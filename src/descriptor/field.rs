use crate::error::{ArchiveError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// One `<field>` of a core or extension.
///
/// A field either maps a column (`index`), supplies a constant (`default`), or both.
/// When both are set, the default stands in for empty cells at lookup time.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldDescriptor {
    index: Option<usize>,
    term: Option<String>,
    default: Option<String>,
    vocabulary: Option<String>,
    delimited_by: Option<String>,
}

/// Assign `value` to `slot`, rejecting a different value if one is already there.
fn set_once<T: PartialEq + fmt::Debug>(slot: &mut Option<T>, value: T, what: &str) -> Result<()> {
    match slot {
        Some(existing) if *existing != value => Err(ArchiveError::structural(format!(
            "cannot specify multiple {what} values for a field: {existing:?} and {value:?}"
        ))),
        _ => {
            *slot = Some(value);
            Ok(())
        }
    }
}

impl FieldDescriptor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A field mapped to column `index`.
    #[must_use]
    pub fn indexed(index: usize, term: impl Into<String>) -> Self {
        Self {
            index: Some(index),
            term: Some(term.into()),
            ..Self::default()
        }
    }

    /// A field with no column whose value is always `default`.
    #[must_use]
    pub fn constant(term: impl Into<String>, default: impl Into<String>) -> Self {
        Self {
            term: Some(term.into()),
            default: Some(default.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    #[must_use]
    pub fn with_vocabulary(mut self, uri: impl Into<String>) -> Self {
        self.vocabulary = Some(uri.into());
        self
    }

    #[must_use]
    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimited_by = Some(delimiter.into());
        self
    }

    pub fn set_index(&mut self, index: usize) -> Result<()> {
        set_once(&mut self.index, index, "index")
    }

    pub fn set_term(&mut self, term: impl Into<String>) -> Result<()> {
        set_once(&mut self.term, term.into(), "term")
    }

    pub fn set_default(&mut self, default: impl Into<String>) -> Result<()> {
        set_once(&mut self.default, default.into(), "default")
    }

    pub fn set_vocabulary(&mut self, uri: impl Into<String>) -> Result<()> {
        set_once(&mut self.vocabulary, uri.into(), "vocabulary")
    }

    pub fn set_delimiter(&mut self, delimiter: impl Into<String>) -> Result<()> {
        set_once(&mut self.delimited_by, delimiter.into(), "delimitedBy")
    }

    #[must_use]
    pub fn index(&self) -> Option<usize> {
        self.index
    }

    #[must_use]
    pub fn term(&self) -> Option<&str> {
        self.term.as_deref()
    }

    #[must_use]
    pub fn default_value(&self) -> Option<&str> {
        self.default.as_deref()
    }

    #[must_use]
    pub fn vocabulary(&self) -> Option<&str> {
        self.vocabulary.as_deref()
    }

    /// Separator for multi-valued cells. Values are never split by this crate.
    #[must_use]
    pub fn delimiter(&self) -> Option<&str> {
        self.delimited_by.as_deref()
    }

    /// Check the field invariants.
    ///
    /// # Errors
    /// [`ArchiveError::Structural`] if neither `index` nor `default` is set, or if
    /// the term is missing on a field without a default.
    pub fn check(&self) -> Result<()> {
        if self.index.is_none() && self.default.is_none() {
            return Err(ArchiveError::structural(format!(
                "fields that do not have indexes must have default values set: {self}"
            )));
        }
        if self.term.is_none() && self.default.is_none() {
            return Err(ArchiveError::structural(format!(
                "term was required for field, but was not set: {self}"
            )));
        }
        Ok(())
    }
}

impl Ord for FieldDescriptor {
    fn cmp(&self, other: &Self) -> Ordering {
        let by_index = match (self.index, other.index) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        by_index
            .then_with(|| self.term.cmp(&other.term))
            .then_with(|| self.default.cmp(&other.default))
            .then_with(|| self.vocabulary.cmp(&other.vocabulary))
            .then_with(|| self.delimited_by.cmp(&other.delimited_by))
    }
}

impl PartialOrd for FieldDescriptor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "field[")?;
        if let Some(i) = self.index {
            write!(f, "index={i} ")?;
        }
        write!(f, "term={}", self.term.as_deref().unwrap_or("?"))?;
        if let Some(d) = &self.default {
            write!(f, " default={d:?}")?;
        }
        write!(f, "]")
    }
}
