//! `meta.xml` writer.

use super::archive::ArchiveDescriptor;
use super::source::{
    DEFAULT_DATE_FORMAT, DEFAULT_FIELD_DELIMITER, DEFAULT_HEADER_LINES, DEFAULT_QUOTE,
    DEFAULT_RECORD_DELIMITER, Role, SourceDescriptor, TextEncoding,
};
use super::vocab;
use crate::error::{ArchiveError, Result};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use std::io::Write;

fn xml_err(e: impl std::fmt::Display) -> ArchiveError {
    ArchiveError::Metadata(e.to_string())
}

fn escape_delimiter(value: &str) -> String {
    value
        .replace('\t', "\\t")
        .replace('\u{8}', "\\b")
        .replace('\r', "\\r")
        .replace('\n', "\\n")
}

/// Serialize `archive` as a metadata document.
///
/// With `show_defaults`, attributes equal to the text guide's defaults are written
/// anyway, which some consumers of archives require.
///
/// # Errors
/// [`ArchiveError::Structural`] if the archive fails [`ArchiveDescriptor::check`],
/// [`ArchiveError::Metadata`] if writing fails.
pub fn write_metadata<W: Write>(
    archive: &ArchiveDescriptor,
    out: W,
    show_defaults: bool,
) -> Result<()> {
    archive.check()?;
    let mut writer = Writer::new_with_indent(out, b' ', 2);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(xml_err)?;

    let mut root = BytesStart::new(vocab::ARCHIVE);
    root.push_attribute(("xmlns", vocab::DWC_TEXT));
    root.push_attribute(("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance"));
    root.push_attribute(("xsi:schemaLocation", vocab::SCHEMA_LOCATION));
    writer.write_event(Event::Start(root)).map_err(xml_err)?;

    write_source(&mut writer, archive.core()?, show_defaults)?;
    for ext in archive.extensions() {
        write_source(&mut writer, ext, show_defaults)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new(vocab::ARCHIVE)))
        .map_err(xml_err)?;
    Ok(())
}

/// [`write_metadata`] into a `String`.
///
/// # Errors
/// See [`write_metadata`].
pub fn metadata_to_string(archive: &ArchiveDescriptor, show_defaults: bool) -> Result<String> {
    let mut buf = Vec::new();
    write_metadata(archive, &mut buf, show_defaults)?;
    String::from_utf8(buf).map_err(xml_err)
}

fn write_source<W: Write>(
    writer: &mut Writer<W>,
    source: &SourceDescriptor,
    show_defaults: bool,
) -> Result<()> {
    let tag = match source.role() {
        Role::Core => vocab::CORE,
        Role::Extension => vocab::EXTENSION,
    };
    let mut start = BytesStart::new(tag);
    if let Some(row_type) = source.row_type() {
        start.push_attribute((vocab::ROW_TYPE, row_type));
    }
    if show_defaults || source.field_delimiter() != DEFAULT_FIELD_DELIMITER {
        start.push_attribute((
            vocab::FIELDS_TERMINATED_BY,
            escape_delimiter(source.field_delimiter()).as_str(),
        ));
    }
    if show_defaults || source.record_delimiter() != DEFAULT_RECORD_DELIMITER {
        start.push_attribute((
            vocab::LINES_TERMINATED_BY,
            escape_delimiter(source.record_delimiter()).as_str(),
        ));
    }
    if show_defaults || source.quote() != DEFAULT_QUOTE {
        start.push_attribute((vocab::FIELDS_ENCLOSED_BY, source.quote()));
    }
    if show_defaults || source.encoding() != TextEncoding::Utf8 {
        start.push_attribute((vocab::ENCODING, source.encoding().label()));
    }
    if show_defaults || source.header_lines() != DEFAULT_HEADER_LINES {
        start.push_attribute((
            vocab::IGNORE_HEADER_LINES,
            source.header_lines().to_string().as_str(),
        ));
    }
    if show_defaults || source.date_format() != DEFAULT_DATE_FORMAT {
        start.push_attribute((vocab::DATE_FORMAT, source.date_format()));
    }
    writer.write_event(Event::Start(start)).map_err(xml_err)?;

    writer
        .write_event(Event::Start(BytesStart::new(vocab::FILES)))
        .map_err(xml_err)?;
    for location in source.locations() {
        writer
            .write_event(Event::Start(BytesStart::new(vocab::LOCATION)))
            .map_err(xml_err)?;
        writer
            .write_event(Event::Text(BytesText::new(location)))
            .map_err(xml_err)?;
        writer
            .write_event(Event::End(BytesEnd::new(vocab::LOCATION)))
            .map_err(xml_err)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new(vocab::FILES)))
        .map_err(xml_err)?;

    if let Some(id) = source.id_index() {
        let id_tag = match source.role() {
            Role::Core => vocab::ID,
            Role::Extension => vocab::CORE_ID,
        };
        let mut el = BytesStart::new(id_tag);
        el.push_attribute((vocab::INDEX, id.to_string().as_str()));
        writer.write_event(Event::Empty(el)).map_err(xml_err)?;
    }

    for field in source.fields() {
        let mut el = BytesStart::new(vocab::FIELD);
        if let Some(i) = field.index() {
            el.push_attribute((vocab::INDEX, i.to_string().as_str()));
        }
        if let Some(term) = field.term() {
            el.push_attribute((vocab::TERM, term));
        }
        if let Some(d) = field.default_value() {
            el.push_attribute((vocab::DEFAULT, d));
        }
        if let Some(v) = field.vocabulary() {
            el.push_attribute((vocab::VOCABULARY, v));
        }
        if let Some(d) = field.delimiter() {
            el.push_attribute((vocab::DELIMITED_BY, d));
        }
        writer.write_event(Event::Empty(el)).map_err(xml_err)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new(tag)))
        .map_err(xml_err)?;
    Ok(())
}
