//! Transparent decompression of data files.
//!
//! A data file may be shipped compressed. The codec is detected from the file
//! extension first, falling back to magic bytes, and each codec is only available
//! when its feature is enabled:
//! - **Gzip** (`.gz`) via `flate2` (feature: `compression-gzip`)
//! - **Zstd** (`.zst`) via `zstd` (feature: `compression-zstd`)
//! - **Bzip2** (`.bz2`) via `bzip2` (feature: `compression-bzip2`)
//! - **Xz** (`.xz`) via `xz2` (feature: `compression-xz`)
//!
//! Files with no recognised codec are read as-is.

use crate::error::{ArchiveError, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

/// A compression format a data file may be stored in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Codec {
    Gzip,
    Zstd,
    Bzip2,
    Xz,
}

impl Codec {
    const ALL: [Self; 4] = [Self::Gzip, Self::Zstd, Self::Bzip2, Self::Xz];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Gzip => "gzip",
            Self::Zstd => "zstd",
            Self::Bzip2 => "bzip2",
            Self::Xz => "xz",
        }
    }

    /// Lowercase extensions, leading dot included.
    #[must_use]
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            Self::Gzip => &[".gz", ".gzip"],
            Self::Zstd => &[".zst", ".zstd"],
            Self::Bzip2 => &[".bz2", ".bzip2"],
            Self::Xz => &[".xz"],
        }
    }

    fn magic_bytes(self) -> &'static [u8] {
        match self {
            Self::Gzip => &[0x1f, 0x8b],
            Self::Zstd => &[0x28, 0xb5, 0x2f, 0xfd],
            // "BZh" is printable, so require the block header too
            Self::Bzip2 => b"BZh",
            Self::Xz => &[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00],
        }
    }

    fn magic_matches(self, head: &[u8]) -> bool {
        let magic = self.magic_bytes();
        if !head.starts_with(magic) {
            return false;
        }
        match self {
            Self::Bzip2 => {
                head.len() >= 10
                    && (b'1'..=b'9').contains(&head[3])
                    && &head[4..10] == b"1AY&SY"
            }
            _ => true,
        }
    }

    /// Whether this build can decode the codec.
    #[must_use]
    pub fn is_enabled(self) -> bool {
        match self {
            Self::Gzip => cfg!(feature = "compression-gzip"),
            Self::Zstd => cfg!(feature = "compression-zstd"),
            Self::Bzip2 => cfg!(feature = "compression-bzip2"),
            Self::Xz => cfg!(feature = "compression-xz"),
        }
    }

    /// Codec implied by the file name, if any.
    #[must_use]
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        let name = path.as_ref().to_string_lossy().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| c.extensions().iter().any(|ext| name.ends_with(ext)))
    }

    fn from_magic(head: &[u8]) -> Option<Self> {
        Self::ALL
            .into_iter()
            .filter(|c| c.is_enabled())
            .find(|c| c.magic_matches(head))
    }

    fn wrap(self, reader: Box<dyn Read + Send>) -> std::io::Result<Box<dyn Read + Send>> {
        match self {
            #[cfg(feature = "compression-gzip")]
            Self::Gzip => Ok(Box::new(flate2::read::MultiGzDecoder::new(reader))),
            #[cfg(feature = "compression-zstd")]
            Self::Zstd => zstd::stream::read::Decoder::new(reader)
                .map(|d| Box::new(d) as Box<dyn Read + Send>),
            #[cfg(feature = "compression-bzip2")]
            Self::Bzip2 => Ok(Box::new(bzip2::read::MultiBzDecoder::new(reader))),
            #[cfg(feature = "compression-xz")]
            Self::Xz => Ok(Box::new(xz2::read::XzDecoder::new_multi_decoder(reader))),
            #[allow(unreachable_patterns)]
            other => Err(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                format!("{} support is not compiled in", other.name()),
            )),
        }
    }
}

/// File name with any codec extension removed: `occurrence.txt.gz` becomes
/// `occurrence.txt`.
#[must_use]
pub fn strip_extension(name: &str) -> &str {
    Codec::ALL
        .into_iter()
        .flat_map(|c| c.extensions().iter())
        .find(|ext| {
            name.len() >= ext.len()
                && name.as_bytes()[name.len() - ext.len()..].eq_ignore_ascii_case(ext.as_bytes())
        })
        .map_or(name, |ext| &name[..name.len() - ext.len()])
}

/// Open `path` for reading, decompressing on the fly when a codec is detected.
///
/// # Errors
/// [`ArchiveError::Io`] if the file cannot be opened or its codec is not
/// compiled into this build.
pub fn open_decoded(path: impl AsRef<Path>) -> Result<Box<dyn Read + Send>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| ArchiveError::io(path, e))?;

    if let Some(codec) = Codec::from_path(path) {
        return codec
            .wrap(Box::new(file))
            .map_err(|e| ArchiveError::io(path, e));
    }

    let mut buffered = BufReader::new(file);
    let head = buffered.fill_buf().map_err(|e| ArchiveError::io(path, e))?;
    match Codec::from_magic(head) {
        Some(codec) => codec
            .wrap(Box::new(buffered))
            .map_err(|e| ArchiveError::io(path, e)),
        None => Ok(Box::new(buffered)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_codec_suffix_only() {
        assert_eq!(strip_extension("occurrence.txt.GZ"), "occurrence.txt");
        assert_eq!(strip_extension("occurrence.txt"), "occurrence.txt");
        assert_eq!(strip_extension("a.tar.zst"), "a.tar");
    }

    #[test]
    fn plain_text_starting_with_bz_is_not_bzip2() {
        assert_eq!(Codec::from_magic(b"BZh,name\n1,a\n"), None);
    }
}
