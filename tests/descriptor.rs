use anyhow::Result;
use dwca_stream::descriptor::{
    ArchiveDescriptor, FieldDescriptor, SourceDescriptor, TextEncoding, metadata_to_string,
    parse_metadata, read_archive, vocab,
};
use dwca_stream::testing::{ArchiveFixture, multimedia_extension, occurrence_core};
use dwca_stream::{ArchiveError, Role};

const META: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<archive xmlns="http://rs.tdwg.org/dwc/text/" metadata="eml.xml">
  <core encoding="UTF-8" fieldsTerminatedBy="\t" linesTerminatedBy="\n" fieldsEnclosedBy=""
        ignoreHeaderLines="1" rowType="http://rs.tdwg.org/dwc/terms/Occurrence">
    <files>
      <location>occurrence.txt</location>
    </files>
    <id index="0" />
    <field index="2" term="http://rs.tdwg.org/dwc/terms/scientificName"/>
    <field index="1" term="http://rs.tdwg.org/dwc/terms/basisOfRecord"/>
    <field term="http://rs.tdwg.org/dwc/terms/country" default="DE"/>
  </core>
  <extension rowType="http://rs.gbif.org/terms/1.0/Multimedia" encoding="ISO-8859-1">
    <files><location>multimedia.txt</location></files>
    <coreid index="0" />
    <field index="1" term="http://purl.org/dc/terms/identifier" vocabulary="http://example.org/v"/>
  </extension>
</archive>"#;

#[test]
fn parses_core_and_extension() -> Result<()> {
    let archive = parse_metadata(META.as_bytes())?;
    let core = archive.core()?;
    assert_eq!(core.role(), Role::Core);
    assert_eq!(core.row_type(), Some(vocab::OCCURRENCE));
    assert_eq!(core.field_delimiter(), "\t");
    assert_eq!(core.quote(), "");
    assert_eq!(core.header_lines(), 1);
    assert_eq!(core.id_index(), Some(0));
    assert_eq!(core.locations(), ["occurrence.txt"]);

    // indexed fields by index, then constants
    let indices: Vec<_> = core.fields().iter().map(FieldDescriptor::index).collect();
    assert_eq!(indices, vec![Some(1), Some(2), None]);
    assert_eq!(
        core.field("http://rs.tdwg.org/dwc/terms/country")
            .and_then(FieldDescriptor::default_value),
        Some("DE")
    );

    let ext = &archive.extensions()[0];
    assert_eq!(ext.role(), Role::Extension);
    assert_eq!(ext.key_index(), 0);
    assert_eq!(ext.encoding(), TextEncoding::Latin1);
    assert_eq!(ext.fields()[0].vocabulary(), Some("http://example.org/v"));
    Ok(())
}

#[test]
fn field_ordering_puts_constants_last() {
    let a = FieldDescriptor::indexed(3, "a");
    let b = FieldDescriptor::indexed(1, "z");
    let c = FieldDescriptor::constant("b", "x");
    let d = FieldDescriptor::constant("a", "x");
    let mut fields = vec![c.clone(), a.clone(), d.clone(), b.clone()];
    fields.sort();
    assert_eq!(fields, vec![b, a, d, c]);
}

#[test]
fn repeated_field_is_kept_once() {
    let source = SourceDescriptor::core(vocab::OCCURRENCE, "occurrence.txt")
        .with_field(FieldDescriptor::indexed(1, "name"))
        .with_field(FieldDescriptor::indexed(0, "id"))
        .with_field(FieldDescriptor::indexed(1, "name"))
        .with_field(FieldDescriptor::constant("country", "DE"))
        .with_field(FieldDescriptor::constant("country", "DE"));
    assert_eq!(source.terms(), vec!["id", "name", "country"]);

    // same term, different column: a distinct field
    let source = source.with_field(FieldDescriptor::indexed(2, "name"));
    assert_eq!(source.fields().len(), 4);
}

#[test]
fn field_needs_index_or_default() {
    let err = FieldDescriptor::new().check().unwrap_err();
    assert!(matches!(err, ArchiveError::Structural(_)));

    let mut f = FieldDescriptor::indexed(0, "t");
    assert!(f.set_index(0).is_ok());
    assert!(matches!(f.set_index(1), Err(ArchiveError::Structural(_))));
}

#[test]
fn extensions_require_a_core_id() -> Result<()> {
    let core = SourceDescriptor::core(vocab::OCCURRENCE, "occurrence.txt")
        .with_field(FieldDescriptor::indexed(0, "id"));
    let ext = multimedia_extension("multimedia.txt", &["coreid", "identifier"]);
    let archive = ArchiveDescriptor::with_sources(core, [ext])?;
    assert!(matches!(archive.check(), Err(ArchiveError::Structural(_))));
    Ok(())
}

#[test]
fn second_core_is_rejected() {
    let xml = r#"<archive>
      <core rowType="a"><files><location>a.txt</location></files><field index="0" term="t"/></core>
      <core rowType="b"><files><location>b.txt</location></files><field index="0" term="t"/></core>
    </archive>"#;
    assert!(matches!(
        parse_metadata(xml.as_bytes()),
        Err(ArchiveError::Structural(_))
    ));
}

#[test]
fn extension_typed_as_core_is_rejected() {
    let mut archive = ArchiveDescriptor::new();
    let err = archive
        .add_extension(SourceDescriptor::core("r", "x.txt"))
        .unwrap_err();
    assert!(matches!(err, ArchiveError::Structural(_)));
}

#[test]
fn malformed_xml_is_metadata_error() {
    let err = parse_metadata("<archive><core></archive>".as_bytes()).unwrap_err();
    assert!(matches!(err, ArchiveError::Metadata(_)), "{err}");
}

#[test]
fn writer_output_parses_back_to_the_same_archive() -> Result<()> {
    let original = parse_metadata(META.as_bytes())?;
    for show_defaults in [false, true] {
        let xml = metadata_to_string(&original, show_defaults)?;
        let reparsed = parse_metadata(xml.as_bytes())?;
        assert_eq!(reparsed.core()?, original.core()?);
        assert_eq!(reparsed.extensions(), original.extensions());
    }
    Ok(())
}

#[test]
fn show_defaults_writes_default_attributes() -> Result<()> {
    let archive = ArchiveDescriptor::with_sources(occurrence_core("o.txt", &["id"]), [])?;
    let terse = metadata_to_string(&archive, false)?;
    let full = metadata_to_string(&archive, true)?;
    assert!(!terse.contains("fieldsTerminatedBy"));
    assert!(full.contains(r#"fieldsTerminatedBy=",""#));
    assert!(full.contains(r#"linesTerminatedBy="\n""#));
    Ok(())
}

#[test]
fn archive_opens_from_directory_or_metadata_path() -> Result<()> {
    let fixture = ArchiveFixture::new()?
        .raw_metadata(META)
        .file("occurrence.txt", "id\tbasis\tname\n1\tHuman\tPuma\n")
        .file("multimedia.txt", "1,http://img\n")
        .write()?;

    let by_dir = read_archive(fixture.path())?;
    let by_file = read_archive(fixture.file_path("meta.xml"))?;
    assert_eq!(by_dir.base_path(), Some(fixture.path()));
    assert_eq!(by_file.base_path(), by_dir.base_path());
    assert_eq!(
        by_dir.resolve(by_dir.core()?)?,
        fixture.file_path("occurrence.txt")
    );
    Ok(())
}

#[test]
fn directory_with_two_descriptors_is_rejected() -> Result<()> {
    let fixture = ArchiveFixture::new()?
        .raw_metadata(META)
        .file("METADATA.XML", META)
        .write()?;
    assert!(matches!(
        read_archive(fixture.path()),
        Err(ArchiveError::Structural(_))
    ));
    Ok(())
}
