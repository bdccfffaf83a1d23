#[cfg(feature = "compression-gzip")]
mod gzip_tests {
    use dwca_stream::io::compression::{Codec, open_decoded};
    use dwca_stream::testing::{ArchiveFixture, multimedia_extension, occurrence_core};
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::{Read, Write};

    fn gzip(text: &str) -> anyhow::Result<Vec<u8>> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(text.as_bytes())?;
        Ok(enc.finish()?)
    }

    #[test]
    fn detects_by_extension_and_by_magic() -> anyhow::Result<()> {
        assert_eq!(Codec::from_path("occurrence.txt.gz"), Some(Codec::Gzip));
        assert_eq!(Codec::from_path("occurrence.txt"), None);

        let dir = tempfile::tempdir()?;
        // no telling extension: falls back to the magic bytes
        let path = dir.path().join("occurrence.dat");
        std::fs::write(&path, gzip("1,a\n2,b\n")?)?;
        let mut text = String::new();
        open_decoded(&path)?.read_to_string(&mut text)?;
        assert_eq!(text, "1,a\n2,b\n");
        Ok(())
    }

    #[test]
    fn compressed_sources_join_like_plain_ones() -> anyhow::Result<()> {
        let fixture = ArchiveFixture::new()?
            .core(
                occurrence_core("occurrence.txt.gz", &["id", "name"]),
                gzip("2,b\n1,a\n")?,
            )
            .extension(
                multimedia_extension("multimedia.txt", &["coreid", "identifier"]),
                "1,img-1\n",
            )
            .write()?;
        let archive = fixture.open()?;
        let sets = archive.pass(false)?.collect::<Result<Vec<_>, _>>()?;
        let keys: Vec<&str> = sets.iter().map(|s| s.core().key()).collect();
        assert_eq!(keys, ["1", "2"]);
        assert_eq!(sets[0].matched(), 1);
        Ok(())
    }
}

#[test]
fn plain_files_pass_through() -> anyhow::Result<()> {
    use std::io::Read;
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("plain.txt");
    std::fs::write(&path, "BZh,name\n1,a\n")?;
    let mut text = String::new();
    dwca_stream::io::open_decoded(&path)?.read_to_string(&mut text)?;
    assert_eq!(text, "BZh,name\n1,a\n");
    Ok(())
}
