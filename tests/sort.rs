use anyhow::Result;
use dwca_stream::descriptor::SourceDescriptor;
use dwca_stream::io::{Dialect, ExternalSorter};
use dwca_stream::{CancelToken, KeyOrdering};
use std::fs;

fn tab_dialect() -> Result<Dialect> {
    let source = SourceDescriptor::core("r", "f.txt")
        .with_field_delimiter("\\t")
        .with_quote("");
    Ok(Dialect::from_source(&source)?)
}

#[test]
fn sorts_across_spill_chunks_and_keeps_header() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let out = dir.path().join("sorted.txt");
    let keys = ["k7", "k3", "k9", "k1", "k5", "k2", "k8", "k4", "k6", "k0"];
    let mut input = String::from("id\tvalue\n");
    for k in keys {
        input.push_str(&format!("{k}\tv-{k}\n"));
    }

    let stats = ExternalSorter::new(tab_dialect()?, KeyOrdering::Ordinal)
        .with_chunk_rows(3)
        .with_scratch(dir.path())
        .sort(input.as_bytes(), &out, 1, 0)?;
    assert_eq!(stats.rows, 10);
    assert_eq!(stats.chunks, 4);

    let sorted = fs::read_to_string(&out)?;
    let mut lines = sorted.lines();
    assert_eq!(lines.next(), Some("id\tvalue"));
    let got: Vec<_> = lines.map(|l| l.split('\t').next().unwrap_or("")).collect();
    assert_eq!(got, vec!["k0", "k1", "k2", "k3", "k4", "k5", "k6", "k7", "k8", "k9"]);

    // run files are gone; only the output remains
    let leftovers: Vec<_> = fs::read_dir(dir.path())?.collect::<std::io::Result<_>>()?;
    assert_eq!(leftovers.len(), 1);
    Ok(())
}

#[test]
fn numeric_ordering_handles_unpadded_keys() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let out = dir.path().join("sorted.txt");
    let input = "10\ta\n2\tb\n1\tc\nx\td\n-4\te\n";

    ExternalSorter::new(tab_dialect()?, KeyOrdering::Numeric)
        .with_chunk_rows(2)
        .sort(input.as_bytes(), &out, 0, 0)?;
    let keys: Vec<String> = fs::read_to_string(&out)?
        .lines()
        .map(|l| l.split('\t').next().unwrap_or("").to_string())
        .collect();
    assert_eq!(keys, vec!["-4", "1", "2", "10", "x"]);

    ExternalSorter::new(tab_dialect()?, KeyOrdering::Ordinal).sort(input.as_bytes(), &out, 0, 0)?;
    let ordinal: Vec<String> = fs::read_to_string(&out)?
        .lines()
        .map(|l| l.split('\t').next().unwrap_or("").to_string())
        .collect();
    assert_eq!(ordinal, vec!["-4", "1", "10", "2", "x"]);
    Ok(())
}

#[test]
fn sort_on_a_non_leading_key_column() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let out = dir.path().join("sorted.txt");
    let input = "1\tc\n2\ta\n3\tb\n";
    ExternalSorter::new(tab_dialect()?, KeyOrdering::Ordinal).sort(input.as_bytes(), &out, 0, 1)?;
    assert_eq!(fs::read_to_string(&out)?, "2\ta\n3\tb\n1\tc\n");
    Ok(())
}

#[test]
fn cancelled_sort_stops() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let cancel = CancelToken::new();
    cancel.cancel();
    let err = ExternalSorter::new(tab_dialect()?, KeyOrdering::Ordinal)
        .with_cancel(cancel)
        .sort("a\t1\n".as_bytes(), &dir.path().join("o.txt"), 0, 0)
        .unwrap_err();
    assert!(err.is_cancelled());
    Ok(())
}

#[test]
fn quoted_fields_survive_a_spill() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let out = dir.path().join("sorted.txt");
    let dialect = Dialect::from_source(&SourceDescriptor::core("r", "f.txt"))?;
    let input = "b,\"x, y\"\na,\"line\nbreak\"\nc,plain\n";
    ExternalSorter::new(dialect, KeyOrdering::Ordinal)
        .with_chunk_rows(1)
        .with_scratch(dir.path())
        .sort(input.as_bytes(), &out, 0, 0)?;
    let mut reader = dialect.reader(fs::File::open(&out)?);
    let rows: Vec<csv::StringRecord> = reader.records().collect::<Result<_, _>>()?;
    assert_eq!(&rows[0][1], "line\nbreak");
    assert_eq!(&rows[1][1], "x, y");
    assert_eq!(&rows[2][0], "c");
    Ok(())
}
