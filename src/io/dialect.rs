//! Text dialect of a data file, as `csv` sees it.

use crate::descriptor::{SourceDescriptor, TextEncoding};
use crate::error::{ArchiveError, Result};
use csv::{QuoteStyle, ReaderBuilder, Terminator, WriterBuilder};
use std::borrow::Cow;
use std::io::{BufRead, Read, Write};

/// Single-byte delimiters, optional quote, line terminator and encoding of one source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Dialect {
    delimiter: u8,
    quote: Option<u8>,
    terminator: u8,
    crlf: bool,
    encoding: TextEncoding,
}

fn single_byte(value: &str, what: &str) -> Result<u8> {
    match value.as_bytes() {
        [b] => Ok(*b),
        _ => Err(ArchiveError::structural(format!(
            "{what} must be a single byte, got {value:?}"
        ))),
    }
}

impl Dialect {
    /// # Errors
    /// [`ArchiveError::Structural`] for multi-byte delimiters or quotes, which the
    /// line reader cannot split on.
    pub fn from_source(source: &SourceDescriptor) -> Result<Self> {
        let delimiter = single_byte(source.field_delimiter(), "field delimiter")?;
        let quote = match source.quote() {
            "" => None,
            q => Some(single_byte(q, "quote")?),
        };
        let (terminator, crlf) = match source.record_delimiter() {
            "\r\n" => (b'\n', true),
            other => (single_byte(other, "record delimiter")?, false),
        };
        Ok(Self {
            delimiter,
            quote,
            terminator,
            crlf,
            encoding: source.encoding(),
        })
    }

    #[must_use]
    pub fn encoding(&self) -> TextEncoding {
        self.encoding
    }

    /// Newline-terminated files are read leniently, so `\r\n` endings never leak a
    /// trailing `\r` into the last column.
    fn read_terminator(&self) -> Terminator {
        if self.crlf || matches!(self.terminator, b'\n' | b'\r') {
            Terminator::CRLF
        } else {
            Terminator::Any(self.terminator)
        }
    }

    #[must_use]
    pub fn reader_builder(&self) -> ReaderBuilder {
        let mut b = ReaderBuilder::new();
        b.has_headers(false)
            .flexible(true)
            .delimiter(self.delimiter)
            .terminator(self.read_terminator());
        match self.quote {
            Some(q) => b.quote(q).quoting(true),
            None => b.quoting(false),
        };
        b
    }

    #[must_use]
    pub fn writer_builder(&self) -> WriterBuilder {
        let mut b = WriterBuilder::new();
        b.has_headers(false)
            .flexible(true)
            .delimiter(self.delimiter)
            .terminator(if self.crlf {
                Terminator::CRLF
            } else {
                Terminator::Any(self.terminator)
            });
        match self.quote {
            Some(q) => b.quote(q).quote_style(QuoteStyle::Necessary),
            None => b.quote_style(QuoteStyle::Never),
        };
        b
    }

    pub fn reader<R: Read>(&self, input: R) -> csv::Reader<R> {
        self.reader_builder().from_reader(input)
    }

    pub fn writer<W: Write>(&self, output: W) -> csv::Writer<W> {
        self.writer_builder().from_writer(output)
    }

    /// Consume `count` raw lines from `input` and return them verbatim.
    ///
    /// Header lines are never parsed, so a malformed header cannot fail a source.
    ///
    /// # Errors
    /// Propagates read failures.
    pub fn take_raw_lines<R: BufRead>(
        &self,
        input: &mut R,
        count: usize,
    ) -> std::io::Result<Vec<u8>> {
        let mut out = Vec::new();
        for _ in 0..count {
            if input.read_until(self.terminator, &mut out)? == 0 {
                break;
            }
        }
        Ok(out)
    }

    /// Decode one raw column.
    ///
    /// # Errors
    /// A message naming the offending byte when the column is not valid in the
    /// declared encoding.
    pub fn decode<'a>(&self, raw: &'a [u8]) -> std::result::Result<Cow<'a, str>, String> {
        match self.encoding {
            TextEncoding::Utf8 => std::str::from_utf8(raw)
                .map(Cow::Borrowed)
                .map_err(|e| format!("invalid UTF-8 at byte {}", e.valid_up_to())),
            TextEncoding::Ascii => match raw.iter().position(|b| !b.is_ascii()) {
                None => Ok(Cow::Borrowed(
                    std::str::from_utf8(raw).map_err(|e| e.to_string())?,
                )),
                Some(pos) => Err(format!("non-ASCII byte 0x{:02x} at byte {pos}", raw[pos])),
            },
            // every byte is the code point of the same value
            TextEncoding::Latin1 => Ok(Cow::Owned(raw.iter().map(|&b| char::from(b)).collect())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(delim: &str, quote: &str, lines: &str) -> SourceDescriptor {
        let mut s = SourceDescriptor::core("r", "f.txt");
        s.set_field_delimiter(delim);
        s.set_quote(quote);
        s.set_record_delimiter(lines);
        s
    }

    #[test]
    fn tab_without_quotes() {
        let d = Dialect::from_source(&source("\\t", "", "\\n")).unwrap();
        let mut r = d.reader("a\"b\tc\n".as_bytes());
        let row = r.records().next().unwrap().unwrap();
        assert_eq!(&row[0], "a\"b");
        assert_eq!(&row[1], "c");
    }

    #[test]
    fn multi_byte_delimiter_is_structural() {
        let err = Dialect::from_source(&source("||", "\"", "\\n")).unwrap_err();
        assert!(matches!(err, ArchiveError::Structural(_)));
    }

    #[test]
    fn latin1_decodes_every_byte() {
        let mut s = source(",", "\"", "\\n");
        s.set_encoding(TextEncoding::Latin1);
        let d = Dialect::from_source(&s).unwrap();
        assert_eq!(d.decode(&[0x43, 0xe9]).unwrap(), "C\u{e9}");
    }

    #[test]
    fn header_lines_are_taken_verbatim() {
        let d = Dialect::from_source(&source(",", "\"", "\\n")).unwrap();
        let mut input = "id,\"name\nx\"\n1,a\n".as_bytes();
        let header = d.take_raw_lines(&mut input, 1).unwrap();
        assert_eq!(header, b"id,\"name\n");
    }
}
