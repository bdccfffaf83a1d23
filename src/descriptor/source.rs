use super::field::FieldDescriptor;
use crate::error::{ArchiveError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_FIELD_DELIMITER: &str = ",";
pub const DEFAULT_RECORD_DELIMITER: &str = "\n";
pub const DEFAULT_QUOTE: &str = "\"";
pub const DEFAULT_DATE_FORMAT: &str = "YYYY-MM-DD";
pub const DEFAULT_HEADER_LINES: usize = 0;
/// Key column used for sorting a source that declares no id.
pub const DEFAULT_KEY_INDEX: usize = 0;

/// Whether a source is the archive's core or one of its extensions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Core,
    Extension,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Core => "core",
            Self::Extension => "extension",
        })
    }
}

/// Character encodings a data file may declare.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextEncoding {
    #[default]
    Utf8,
    Ascii,
    Latin1,
}

impl TextEncoding {
    /// Resolve an `encoding` attribute value.
    ///
    /// # Errors
    /// [`ArchiveError::Structural`] for encodings this crate cannot decode.
    pub fn from_label(label: &str) -> Result<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(Self::Utf8),
            "us-ascii" | "ascii" => Ok(Self::Ascii),
            "iso-8859-1" | "iso8859-1" | "latin1" | "latin-1" => Ok(Self::Latin1),
            other => Err(ArchiveError::structural(format!(
                "unsupported text encoding: {other}"
            ))),
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Utf8 => "UTF-8",
            Self::Ascii => "US-ASCII",
            Self::Latin1 => "ISO-8859-1",
        }
    }
}

/// A `<core>` or `<extension>` element: one delimited file and how to read it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceDescriptor {
    role: Role,
    row_type: Option<String>,
    id_index: Option<usize>,
    field_delimiter: String,
    record_delimiter: String,
    quote: String,
    encoding: TextEncoding,
    header_lines: usize,
    date_format: String,
    fields: Vec<FieldDescriptor>,
    locations: Vec<String>,
}

impl SourceDescriptor {
    fn with_role(role: Role) -> Self {
        Self {
            role,
            row_type: None,
            id_index: None,
            field_delimiter: DEFAULT_FIELD_DELIMITER.to_string(),
            record_delimiter: DEFAULT_RECORD_DELIMITER.to_string(),
            quote: DEFAULT_QUOTE.to_string(),
            encoding: TextEncoding::Utf8,
            header_lines: DEFAULT_HEADER_LINES,
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            fields: Vec::new(),
            locations: Vec::new(),
        }
    }

    #[must_use]
    pub fn new_core() -> Self {
        Self::with_role(Role::Core)
    }

    #[must_use]
    pub fn new_extension() -> Self {
        Self::with_role(Role::Extension)
    }

    /// Builder for a core over `location` with the given row type.
    #[must_use]
    pub fn core(row_type: impl Into<String>, location: impl Into<String>) -> Self {
        let mut s = Self::new_core();
        s.row_type = Some(row_type.into());
        s.locations.push(location.into());
        s
    }

    /// Builder for an extension over `location` keyed on column `core_id`.
    #[must_use]
    pub fn extension(
        row_type: impl Into<String>,
        location: impl Into<String>,
        core_id: usize,
    ) -> Self {
        let mut s = Self::new_extension();
        s.row_type = Some(row_type.into());
        s.id_index = Some(core_id);
        s.locations.push(location.into());
        s
    }

    #[must_use]
    pub fn with_id(mut self, index: usize) -> Self {
        self.id_index = Some(index);
        self
    }

    #[must_use]
    pub fn with_field(mut self, field: FieldDescriptor) -> Self {
        self.add_field(field);
        self
    }

    #[must_use]
    pub fn with_header_lines(mut self, lines: usize) -> Self {
        self.header_lines = lines;
        self
    }

    #[must_use]
    pub fn with_field_delimiter(mut self, delimiter: &str) -> Self {
        self.set_field_delimiter(delimiter);
        self
    }

    #[must_use]
    pub fn with_quote(mut self, quote: impl Into<String>) -> Self {
        self.quote = quote.into();
        self
    }

    pub fn set_row_type(&mut self, row_type: impl Into<String>) -> Result<()> {
        let row_type = row_type.into();
        match &self.row_type {
            Some(existing) if *existing != row_type => Err(ArchiveError::structural(
                "multiple values found for row type",
            )),
            _ => {
                self.row_type = Some(row_type);
                Ok(())
            }
        }
    }

    pub fn set_id_index(&mut self, index: usize) -> Result<()> {
        match self.id_index {
            Some(existing) if existing != index => Err(ArchiveError::structural(
                "multiple values found for id/coreid",
            )),
            _ => {
                self.id_index = Some(index);
                Ok(())
            }
        }
    }

    /// Accepts the escaped forms `\t` and `\b` used in metadata documents.
    pub fn set_field_delimiter(&mut self, delimiter: &str) {
        self.field_delimiter = delimiter.replace("\\t", "\t").replace("\\b", "\u{8}");
    }

    /// Accepts the escaped forms `\n` and `\r`.
    pub fn set_record_delimiter(&mut self, delimiter: &str) {
        self.record_delimiter = delimiter.replace("\\n", "\n").replace("\\r", "\r");
    }

    pub fn set_quote(&mut self, quote: impl Into<String>) {
        self.quote = quote.into();
    }

    pub fn set_encoding(&mut self, encoding: TextEncoding) {
        self.encoding = encoding;
    }

    pub fn set_header_lines(&mut self, lines: usize) {
        self.header_lines = lines;
    }

    pub fn set_date_format(&mut self, pattern: impl Into<String>) {
        self.date_format = pattern.into();
    }

    /// Insert a field, keeping the field list in its canonical order. A field
    /// equal to one already present is not added twice.
    pub fn add_field(&mut self, field: FieldDescriptor) {
        let pos = self.fields.partition_point(|f| f < &field);
        if self.fields.get(pos) != Some(&field) {
            self.fields.insert(pos, field);
        }
    }

    pub fn add_location(&mut self, location: impl Into<String>) {
        self.locations.push(location.into());
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    #[must_use]
    pub fn row_type(&self) -> Option<&str> {
        self.row_type.as_deref()
    }

    #[must_use]
    pub fn id_index(&self) -> Option<usize> {
        self.id_index
    }

    /// Column the external sort and the join key on.
    #[must_use]
    pub fn key_index(&self) -> usize {
        self.id_index.unwrap_or(DEFAULT_KEY_INDEX)
    }

    #[must_use]
    pub fn field_delimiter(&self) -> &str {
        &self.field_delimiter
    }

    #[must_use]
    pub fn record_delimiter(&self) -> &str {
        &self.record_delimiter
    }

    /// Quote character; empty when quoting is disabled.
    #[must_use]
    pub fn quote(&self) -> &str {
        &self.quote
    }

    #[must_use]
    pub fn encoding(&self) -> TextEncoding {
        self.encoding
    }

    #[must_use]
    pub fn header_lines(&self) -> usize {
        self.header_lines
    }

    #[must_use]
    pub fn date_format(&self) -> &str {
        &self.date_format
    }

    #[must_use]
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    #[must_use]
    pub fn locations(&self) -> &[String] {
        &self.locations
    }

    /// The one location that is actually read.
    #[must_use]
    pub fn primary_location(&self) -> Option<&str> {
        self.locations.first().map(String::as_str)
    }

    /// Field mapped to column `index`, if any.
    #[must_use]
    pub fn find_field(&self, index: usize) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.index() == Some(index))
    }

    /// First field declared with `term`.
    #[must_use]
    pub fn field(&self, term: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.term() == Some(term))
    }

    /// Position in [`Self::fields`] of the first field with this term.
    #[must_use]
    pub fn position_of(&self, term: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.term() == Some(term))
    }

    #[must_use]
    pub fn terms(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.term().unwrap_or("")).collect()
    }

    /// One entry per field: its default, or the empty string.
    #[must_use]
    pub fn default_values(&self) -> Vec<&str> {
        self.fields
            .iter()
            .map(|f| f.default_value().unwrap_or(""))
            .collect()
    }

    /// Minimum number of columns every data row must carry.
    #[must_use]
    pub fn min_columns(&self) -> usize {
        self.fields
            .iter()
            .filter_map(FieldDescriptor::index)
            .chain(std::iter::once(self.key_index()))
            .max()
            .map_or(0, |m| m + 1)
    }

    /// Short human label, e.g. `extension occurrence.txt`.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{} {}", self.role, self.primary_location().unwrap_or("<no file>"))
    }

    /// Check the source invariants and those of every field.
    ///
    /// # Errors
    /// [`ArchiveError::Structural`] describing the first violation found.
    pub fn check(&self) -> Result<()> {
        if self.row_type.is_none() {
            return Err(ArchiveError::structural(format!(
                "{} did not declare the required rowType",
                self.role
            )));
        }
        if self.role == Role::Extension && self.id_index.is_none() {
            return Err(ArchiveError::structural("extensions must have coreid set"));
        }
        if self.fields.is_empty() {
            return Err(ArchiveError::structural(format!(
                "{} must have fields",
                self.role
            )));
        }
        if self.locations.is_empty() {
            return Err(ArchiveError::structural(format!(
                "{} must have files set",
                self.role
            )));
        }
        self.fields.iter().try_for_each(FieldDescriptor::check)
    }
}
