//! Rows as the join hands them out.

use crate::descriptor::SourceDescriptor;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Outcome of looking a term up in a [`Record`].
///
/// The three cases are kept apart: a present-but-empty column is not the same
/// thing as a substituted default, and neither is the same as a term the source
/// never declared.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldValue<'a> {
    /// The raw column text (possibly empty).
    Present(&'a str),
    /// The column was empty and the field's declared default was substituted.
    Defaulted(&'a str),
    /// The term is not among the source's fields.
    Absent,
}

impl<'a> FieldValue<'a> {
    #[must_use]
    pub fn as_str(self) -> Option<&'a str> {
        match self {
            Self::Present(s) | Self::Defaulted(s) => Some(s),
            Self::Absent => None,
        }
    }

    #[must_use]
    pub fn is_defaulted(self) -> bool {
        matches!(self, Self::Defaulted(_))
    }

    /// True for a non-empty present or defaulted value.
    #[must_use]
    pub fn is_populated(self) -> bool {
        self.as_str().is_some_and(|s| !s.is_empty())
    }
}

/// One data row: raw column values in field order, its join key and where it came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    source: Arc<SourceDescriptor>,
    key: String,
    values: Vec<String>,
    include_defaults: bool,
    line: u64,
}

impl Record {
    /// `values` holds one entry per field of `source`, in field order.
    #[must_use]
    pub fn new(
        source: Arc<SourceDescriptor>,
        key: String,
        values: Vec<String>,
        include_defaults: bool,
        line: u64,
    ) -> Self {
        debug_assert_eq!(values.len(), source.fields().len());
        Self {
            source,
            key,
            values,
            include_defaults,
            line,
        }
    }

    #[must_use]
    pub fn source(&self) -> &Arc<SourceDescriptor> {
        &self.source
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Raw values, before any default substitution.
    #[must_use]
    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// Line of the row in the file it was read from.
    #[must_use]
    pub fn line(&self) -> u64 {
        self.line
    }

    #[must_use]
    pub fn include_defaults(&self) -> bool {
        self.include_defaults
    }

    /// Look `term` up, substituting defaults only when `include_defaults` is set.
    #[must_use]
    pub fn value_for(&self, term: &str, include_defaults: bool) -> FieldValue<'_> {
        let Some(pos) = self.source.position_of(term) else {
            return FieldValue::Absent;
        };
        let raw = self.values[pos].as_str();
        if raw.is_empty() && include_defaults {
            if let Some(default) = self.source.fields()[pos].default_value() {
                return FieldValue::Defaulted(default);
            }
        }
        FieldValue::Present(raw)
    }

    /// [`Self::value_for`] with the pass's default-substitution setting.
    #[must_use]
    pub fn get(&self, term: &str) -> FieldValue<'_> {
        self.value_for(term, self.include_defaults)
    }

    /// `(term, value)` for every field, in field order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, FieldValue<'_>)> + '_ {
        self.source.fields().iter().filter_map(move |f| {
            let term = f.term()?;
            Some((term, self.get(term)))
        })
    }
}

/// A core record and whichever extension records joined to it.
#[derive(Clone, Debug)]
pub struct RecordSet {
    core: Record,
    extensions: BTreeMap<usize, Record>,
}

impl RecordSet {
    #[must_use]
    pub fn new(core: Record) -> Self {
        Self {
            core,
            extensions: BTreeMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, position: usize, record: Record) {
        self.extensions.insert(position, record);
    }

    #[must_use]
    pub fn core(&self) -> &Record {
        &self.core
    }

    /// The matched record for `extension`, if the join found one.
    #[must_use]
    pub fn extension(&self, extension: &SourceDescriptor) -> Option<&Record> {
        self.extensions
            .values()
            .find(|r| r.source().as_ref() == extension)
    }

    /// The matched record of the extension at `position` in the archive's
    /// extension list.
    #[must_use]
    pub fn extension_at(&self, position: usize) -> Option<&Record> {
        self.extensions.get(&position)
    }

    /// Matched extension records, keyed by extension position.
    pub fn extensions(&self) -> impl Iterator<Item = (usize, &Record)> {
        self.extensions.iter().map(|(k, v)| (*k, v))
    }

    #[must_use]
    pub fn matched(&self) -> usize {
        self.extensions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::FieldDescriptor;

    #[test]
    fn constant_field_reads_empty_without_defaults() {
        let source = Arc::new(
            SourceDescriptor::core("r", "f.txt")
                .with_id(0)
                .with_field(FieldDescriptor::indexed(0, "id"))
                .with_field(FieldDescriptor::constant("country", "DE")),
        );
        let rec = Record::new(source, "1".into(), vec!["1".into(), String::new()], false, 1);
        assert_eq!(rec.get("country"), FieldValue::Present(""));
        assert_eq!(rec.value_for("country", true), FieldValue::Defaulted("DE"));
        assert_eq!(rec.get("missing"), FieldValue::Absent);
    }
}
