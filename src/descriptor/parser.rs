//! `meta.xml` reader.
//!
//! A pull parser over `quick-xml` events driving a five-state machine:
//! outside the archive, inside `<archive>`, inside a `<core>`/`<extension>`,
//! inside `<files>`, and inside a `<location>` (the only element whose text
//! content matters). Everything else in the document is ignored, so vendor
//! additions to the descriptor do not break parsing.

use super::archive::ArchiveDescriptor;
use super::field::FieldDescriptor;
use super::source::{SourceDescriptor, TextEncoding};
use super::vocab;
use crate::error::{ArchiveError, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Outside,
    Archive,
    Source,
    Files,
    Location,
}

struct MetadataParser {
    state: State,
    archive: ArchiveDescriptor,
    current: Option<SourceDescriptor>,
    text: String,
}

fn xml_err(e: impl std::fmt::Display) -> ArchiveError {
    ArchiveError::Metadata(e.to_string())
}

fn parse_index(value: &str, what: &str) -> Result<usize> {
    value
        .trim()
        .parse::<usize>()
        .map_err(|_| {
            ArchiveError::Metadata(format!("{what} index is not a column number: {value:?}"))
        })
}

/// Decoded `(local name, value)` pairs of an element's attributes.
fn attributes<R>(reader: &Reader<R>, e: &BytesStart<'_>) -> Result<Vec<(String, String)>> {
    let mut out = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(xml_err)?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr
            .decode_and_unescape_value(reader.decoder())
            .map_err(xml_err)?
            .into_owned();
        out.push((key, value));
    }
    Ok(out)
}

impl MetadataParser {
    fn new() -> Self {
        Self {
            state: State::Outside,
            archive: ArchiveDescriptor::new(),
            current: None,
            text: String::new(),
        }
    }

    fn source_mut(&mut self) -> Result<&mut SourceDescriptor> {
        self.current
            .as_mut()
            .ok_or_else(|| ArchiveError::Metadata("element outside of core/extension".into()))
    }

    fn open(&mut self, name: &str, attrs: Vec<(String, String)>) -> Result<()> {
        match (self.state, name) {
            (State::Outside, vocab::ARCHIVE) => self.state = State::Archive,
            (State::Archive, vocab::CORE | vocab::EXTENSION) => {
                let mut source = if name == vocab::CORE {
                    SourceDescriptor::new_core()
                } else {
                    SourceDescriptor::new_extension()
                };
                apply_source_attributes(&mut source, attrs)?;
                self.current = Some(source);
                self.state = State::Source;
            }
            (State::Source, vocab::FILES) => self.state = State::Files,
            (State::Files, vocab::LOCATION) => {
                self.text.clear();
                self.state = State::Location;
            }
            (State::Source, vocab::ID | vocab::CORE_ID | vocab::CORE_ID_CAMEL) => {
                if let Some((_, v)) = attrs.iter().find(|(k, _)| k == vocab::INDEX) {
                    let index = parse_index(v, name)?;
                    self.source_mut()?.set_id_index(index)?;
                }
            }
            (State::Source, vocab::FIELD) => {
                let field = field_from_attributes(attrs)?;
                self.source_mut()?.add_field(field);
            }
            (state, other) => debug!(?state, element = other, "skipping element"),
        }
        Ok(())
    }

    fn close(&mut self, name: &str) -> Result<()> {
        match (self.state, name) {
            (State::Location, vocab::LOCATION) => {
                let location = self.text.trim().to_string();
                self.source_mut()?.add_location(location);
                self.state = State::Files;
            }
            (State::Files, vocab::FILES) => self.state = State::Source,
            (State::Source, vocab::CORE | vocab::EXTENSION) => {
                let source = self.current.take().ok_or_else(|| {
                    ArchiveError::Metadata(format!("unbalanced </{name}>"))
                })?;
                if name == vocab::CORE {
                    self.archive.set_core(source)?;
                } else {
                    self.archive.add_extension(source)?;
                }
                self.state = State::Archive;
            }
            (State::Archive, vocab::ARCHIVE) => self.state = State::Outside,
            _ => {}
        }
        Ok(())
    }

    fn text(&mut self, chunk: &str) {
        if self.state == State::Location {
            self.text.push_str(chunk);
        }
    }
}

fn apply_source_attributes(
    source: &mut SourceDescriptor,
    attrs: Vec<(String, String)>,
) -> Result<()> {
    for (key, value) in attrs {
        match key.as_str() {
            vocab::ROW_TYPE => source.set_row_type(value)?,
            vocab::FIELDS_TERMINATED_BY => source.set_field_delimiter(&value),
            vocab::LINES_TERMINATED_BY => source.set_record_delimiter(&value),
            vocab::FIELDS_ENCLOSED_BY => source.set_quote(value),
            vocab::ENCODING => source.set_encoding(TextEncoding::from_label(&value)?),
            vocab::IGNORE_HEADER_LINES => {
                let lines = value.trim().parse::<usize>().map_err(|_| {
                    ArchiveError::Metadata(format!("ignoreHeaderLines is not a count: {value:?}"))
                })?;
                source.set_header_lines(lines);
            }
            vocab::DATE_FORMAT => source.set_date_format(value),
            other => debug!(role = %source.role(), attribute = other, "unrecognised attribute"),
        }
    }
    Ok(())
}

fn field_from_attributes(attrs: Vec<(String, String)>) -> Result<FieldDescriptor> {
    let mut field = FieldDescriptor::new();
    for (key, value) in attrs {
        match key.as_str() {
            vocab::INDEX => field.set_index(parse_index(&value, "field")?)?,
            vocab::TERM => field.set_term(value)?,
            vocab::DEFAULT => field.set_default(value)?,
            vocab::VOCABULARY => field.set_vocabulary(value)?,
            vocab::DELIMITED_BY => field.set_delimiter(value)?,
            other => debug!(attribute = other, "unrecognised field attribute, skipping"),
        }
    }
    Ok(field)
}

/// Parse a metadata document. The result has no base path.
///
/// Structural invariants are not checked here; call [`ArchiveDescriptor::check`]
/// (or open a pass, which does).
///
/// # Errors
/// [`ArchiveError::Metadata`] for malformed XML or attribute values, and
/// [`ArchiveError::Structural`] for conflicting declarations (two cores, two row types).
pub fn parse_metadata<R: BufRead>(input: R) -> Result<ArchiveDescriptor> {
    let mut reader = Reader::from_reader(input);
    reader.config_mut().trim_text(true);
    let mut parser = MetadataParser::new();
    let mut buf = Vec::with_capacity(1024);

    loop {
        match reader.read_event_into(&mut buf).map_err(xml_err)? {
            Event::Start(ref e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                let attrs = attributes(&reader, e)?;
                parser.open(&name, attrs)?;
            }
            Event::Empty(ref e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                let attrs = attributes(&reader, e)?;
                parser.open(&name, attrs)?;
                parser.close(&name)?;
            }
            Event::End(ref e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                parser.close(&name)?;
            }
            Event::Text(ref t) => parser.text(&t.decode().map_err(xml_err)?),
            Event::CData(ref t) => parser.text(&String::from_utf8_lossy(t)),
            Event::GeneralRef(ref r) => {
                if let Some(ch) = r.resolve_char_ref().map_err(xml_err)? {
                    parser.text(ch.encode_utf8(&mut [0u8; 4]));
                } else {
                    let name = r.decode().map_err(xml_err)?;
                    let resolved = quick_xml::escape::resolve_predefined_entity(&name)
                        .ok_or_else(|| ArchiveError::Metadata(format!("unknown entity &{name};")))?;
                    parser.text(resolved);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if parser.state != State::Outside {
        return Err(ArchiveError::Metadata(
            "document ended inside an open element".into(),
        ));
    }
    Ok(parser.archive)
}

/// Parse a metadata file and set the archive's base path to its directory.
///
/// # Errors
/// I/O failures opening the file, plus everything [`parse_metadata`] reports.
pub fn parse_metadata_file(path: impl AsRef<Path>) -> Result<ArchiveDescriptor> {
    let path = path.as_ref();
    let f = File::open(path).map_err(|e| ArchiveError::io(path, e))?;
    let mut archive = parse_metadata(BufReader::new(f))?;
    let base = path
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    archive.set_base_path(base);
    Ok(archive)
}

/// Find the metadata document for an archive given either its directory or the
/// document itself.
///
/// # Errors
/// [`ArchiveError::Io`] if the path cannot be read, [`ArchiveError::Structural`]
/// if a directory holds no descriptor or more than one.
pub fn locate_metadata(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    if !path.is_dir() {
        return match fs::metadata(path) {
            Ok(_) => Ok(path.to_path_buf()),
            Err(e) => Err(ArchiveError::io(path, e)),
        };
    }
    let mut found: Option<PathBuf> = None;
    for entry in fs::read_dir(path).map_err(|e| ArchiveError::io(path, e))? {
        let entry = entry.map_err(|e| ArchiveError::io(path, e))?;
        let name = entry.file_name().to_string_lossy().to_ascii_lowercase();
        if vocab::METADATA_FILE_NAMES.contains(&name.as_str()) {
            if let Some(previous) = &found {
                return Err(ArchiveError::structural(format!(
                    "duplicate metadata files found: {} and {}",
                    previous.display(),
                    entry.path().display()
                )));
            }
            found = Some(entry.path());
        }
    }
    found.ok_or_else(|| {
        ArchiveError::structural(format!(
            "did not find a metadata file in {}",
            path.display()
        ))
    })
}

/// Locate and parse an archive from its directory or metadata path.
///
/// # Errors
/// See [`locate_metadata`] and [`parse_metadata_file`].
pub fn read_archive(path: impl AsRef<Path>) -> Result<ArchiveDescriptor> {
    let meta = locate_metadata(path)?;
    parse_metadata_file(meta)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbalanced_document_is_rejected() {
        let xml = r#"<archive><core rowType="x"><files><location>a.txt</location></files>"#;
        let err = parse_metadata(xml.as_bytes()).unwrap_err();
        assert!(matches!(err, ArchiveError::Metadata(_)), "{err}");
    }

    #[test]
    fn bad_index_is_metadata_error() {
        let xml = r#"<archive><core rowType="x"><field index="two" term="t"/></core></archive>"#;
        let err = parse_metadata(xml.as_bytes()).unwrap_err();
        assert!(matches!(err, ArchiveError::Metadata(_)), "{err}");
    }
}
