use anyhow::Result;
use dwca_stream::checker::{
    ArchiveSummary, SAMPLE_LIMIT, check_archive, check_sources, open_archive, summarize,
    write_statistics,
};
use dwca_stream::descriptor::{FieldDescriptor, SourceDescriptor, vocab};
use dwca_stream::testing::{ArchiveFixture, multimedia_extension};
use dwca_stream::{ArchiveError, PassConfig};

fn fixture() -> Result<ArchiveFixture> {
    let core = SourceDescriptor::core(vocab::OCCURRENCE, "occurrence.txt")
        .with_id(0)
        .with_header_lines(1)
        .with_field(FieldDescriptor::indexed(0, "id"))
        .with_field(FieldDescriptor::indexed(1, "name"))
        .with_field(FieldDescriptor::constant("country", "DE"));
    ArchiveFixture::new()?
        .core(core, "id,name\n3,\n1,Puma\n2,Lynx\n")
        .extension(
            multimedia_extension("multimedia.txt", &["coreid", "identifier"]),
            "2,img-2\n9,lost\n1,\n",
        )
        .write()
}

#[test]
fn check_counts_every_row() -> Result<()> {
    let fx = fixture()?;
    let checks = check_archive(fx.path())?;
    let rows: Vec<u64> = checks.iter().map(|c| c.rows).collect();
    assert_eq!(rows, vec![3, 3]);
    assert_eq!(checks[0].label, "core occurrence.txt");
    Ok(())
}

#[test]
fn check_reports_the_broken_file() -> Result<()> {
    let fx = fixture()?.file("multimedia.txt", "2,img\n1\n").write()?;
    let archive = open_archive(fx.path())?;
    let err = check_sources(&archive).unwrap_err();
    assert!(format!("{err:#}").contains("multimedia.txt"), "{err:#}");
    assert!(matches!(
        err.downcast_ref::<ArchiveError>(),
        Some(ArchiveError::CsvSyntax { line: 2, .. })
    ));
    Ok(())
}

#[test]
fn summary_counts_populated_values_and_orphans() -> Result<()> {
    let fx = fixture()?;
    let archive = open_archive(fx.path())?;
    let summary = summarize(&archive, true, PassConfig::default())?;

    assert_eq!(summary.core_rows, 3);
    assert_eq!(summary.core_location.as_deref(), Some("occurrence.txt"));
    assert_eq!(summary.fields["id"].populated, 3);
    assert_eq!(summary.fields["name"].populated, 2);
    assert_eq!(summary.fields["name"].empty, 1);
    // constant field filled from its default
    assert_eq!(summary.fields["country"].populated, 3);

    let ext = &summary.extensions[0];
    assert_eq!(ext.matches, 2);
    assert_eq!(ext.orphans, 1);
    assert_eq!(ext.fields["identifier"].populated, 1);
    assert_eq!(ext.fields["identifier"].empty, 1);
    assert_eq!(ext.location.as_deref(), Some("multimedia.txt"));

    let without_defaults = summarize(&archive, false, PassConfig::default())?;
    assert_eq!(without_defaults.fields["country"].populated, 0);
    assert_eq!(without_defaults.fields["country"].empty, 3);
    Ok(())
}

#[test]
fn summary_keeps_distinct_counts_and_samples() -> Result<()> {
    let fx = fixture()?;
    let archive = open_archive(fx.path())?;
    let summary = summarize(&archive, true, PassConfig::default())?;

    let id = &summary.fields["id"];
    assert_eq!(id.distinct, 3);
    assert!(id.integers);
    assert!(id.possible_key());

    // samples follow key order, empty values are not samples
    let name = &summary.fields["name"];
    assert_eq!(name.samples, vec!["Puma", "Lynx"]);
    assert!(!name.integers);
    assert!(!name.possible_key());

    let country = &summary.fields["country"];
    assert_eq!(country.distinct, 1);
    assert_eq!(country.samples, vec!["DE"]);
    Ok(())
}

#[test]
fn samples_stop_at_the_limit() -> Result<()> {
    let rows: String = (0..SAMPLE_LIMIT + 5).map(|i| format!("{i:03},v{i}\n")).collect();
    let core = SourceDescriptor::core(vocab::OCCURRENCE, "occurrence.txt")
        .with_id(0)
        .with_field(FieldDescriptor::indexed(0, "id"))
        .with_field(FieldDescriptor::indexed(1, "value"));
    let fx = ArchiveFixture::new()?.core(core, rows).write()?;
    let summary = summarize(&fx.open()?, false, PassConfig::default())?;
    let value = &summary.fields["value"];
    assert_eq!(value.distinct, (SAMPLE_LIMIT + 5) as u64);
    assert_eq!(value.samples.len(), SAMPLE_LIMIT);
    assert_eq!(value.samples[0], "v0");
    Ok(())
}

#[test]
fn statistics_and_mapping_files_are_written() -> Result<()> {
    let fx = fixture()?;
    let archive = open_archive(fx.path())?;
    let summary = summarize(&archive, true, PassConfig::default())?;
    let out = tempfile::tempdir()?;
    let written = write_statistics(&archive, &summary, out.path().join("stats"))?;
    let names: Vec<String> = written
        .iter()
        .filter_map(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .collect();
    assert_eq!(
        names,
        [
            "Statistics-occurrence.txt",
            "Mapping-occurrence.txt",
            "Statistics-multimedia.txt",
            "Mapping-multimedia.txt",
        ]
    );

    let mut stats = csv::Reader::from_path(&written[0])?;
    let rows: Vec<csv::StringRecord> = stats.records().collect::<Result<_, _>>()?;
    let terms: Vec<&str> = rows.iter().map(|r| &r[0]).collect();
    assert_eq!(terms, ["id", "name", "country"]);
    assert_eq!(&rows[0][4], "true");
    assert_eq!(&rows[1][1], "2");
    assert_eq!(&rows[1][2], "1");
    assert_eq!(&rows[1][6], "Puma | Lynx");

    let mut mapping = csv::Reader::from_path(&written[1])?;
    let rows: Vec<csv::StringRecord> = mapping.records().collect::<Result<_, _>>()?;
    assert_eq!(&rows[2][0], "country");
    assert_eq!(&rows[2][1], "country");
    assert_eq!(&rows[2][3], "DE");
    Ok(())
}

#[test]
fn summary_serializes_to_json() -> Result<()> {
    let fx = fixture()?;
    let archive = open_archive(fx.path())?;
    let summary = summarize(&archive, false, PassConfig::default())?;
    let json = summary.to_json()?;
    let back: ArchiveSummary = serde_json::from_str(&json)?;
    assert_eq!(back, summary);
    Ok(())
}

#[test]
fn missing_metadata_is_reported_with_the_path() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let err = open_archive(dir.path()).unwrap_err();
    assert!(format!("{err:#}").contains(&dir.path().display().to_string()));
    Ok(())
}
