//! Compression framing for reads and writes.
//!
//! Vellum does not implement codecs; it recognizes them. Recognition is
//! extension-first with a magic-byte fallback, and decoding always
//! drains the whole stream into memory because the indexer needs random
//! access over the decompressed bytes.

use std::io::{Cursor, Read, Write};
use std::path::Path;

use vellum_result::{Error, Result};

/// Compression codecs recognized by filename suffix or magic bytes.
///
/// `.gz`, `.bz2`, and `.xz` are supported for both reads and writes.
/// `.zip` is read-only and decodes the first archive entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Gzip,
    Bzip2,
    Xz,
    Zip,
}

impl Codec {
    /// File extensions associated with this codec, lowercase with the
    /// leading dot.
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            Codec::Gzip => &[".gz"],
            Codec::Bzip2 => &[".bz2"],
            Codec::Xz => &[".xz"],
            Codec::Zip => &[".zip"],
        }
    }

    /// Magic byte signature at stream start.
    pub fn magic_bytes(self) -> &'static [u8] {
        match self {
            Codec::Gzip => &[0x1f, 0x8b],
            Codec::Bzip2 => &[0x42, 0x5a, 0x68],
            Codec::Xz => &[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00],
            Codec::Zip => &[0x50, 0x4b],
        }
    }

    const ALL: [Codec; 4] = [Codec::Gzip, Codec::Bzip2, Codec::Xz, Codec::Zip];

    /// Detect a codec from a file path extension. Case-insensitive.
    pub fn from_path(path: impl AsRef<Path>) -> Option<Codec> {
        let path = path.as_ref().to_string_lossy().to_lowercase();
        Codec::ALL
            .into_iter()
            .find(|codec| codec.extensions().iter().any(|ext| path.ends_with(ext)))
    }

    /// Detect a codec from the leading bytes of a stream.
    pub fn from_magic(head: &[u8]) -> Option<Codec> {
        Codec::ALL
            .into_iter()
            .find(|codec| head.starts_with(codec.magic_bytes()))
    }

    /// Whether this codec can wrap a write sink.
    pub fn writable(self) -> bool {
        !matches!(self, Codec::Zip)
    }

    /// Decode an entire compressed stream into memory.
    pub fn decode_to_vec<R: Read>(self, mut reader: R) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        match self {
            Codec::Gzip => {
                // MultiGzDecoder handles concatenated gzip members, which
                // block-compressed tools emit routinely.
                flate2::read::MultiGzDecoder::new(reader)
                    .read_to_end(&mut out)
                    .map_err(Error::codec)?;
            }
            Codec::Bzip2 => {
                bzip2::read::BzDecoder::new(reader)
                    .read_to_end(&mut out)
                    .map_err(Error::codec)?;
            }
            Codec::Xz => {
                xz2::read::XzDecoder::new(reader)
                    .read_to_end(&mut out)
                    .map_err(Error::codec)?;
            }
            Codec::Zip => {
                // Zip archives need Seek; buffer the raw bytes first.
                let mut raw = Vec::new();
                reader.read_to_end(&mut raw).map_err(Error::codec)?;
                let mut archive =
                    zip::ZipArchive::new(Cursor::new(raw)).map_err(Error::codec)?;
                if archive.is_empty() {
                    return Err(Error::Codec("zip archive contains no entries".into()));
                }
                if archive.len() > 1 {
                    tracing::debug!(
                        entries = archive.len(),
                        "zip archive has multiple entries; reading the first"
                    );
                }
                let mut entry = archive.by_index(0).map_err(Error::codec)?;
                entry.read_to_end(&mut out).map_err(Error::codec)?;
            }
        }
        Ok(out)
    }

    /// Wrap a write sink with this codec's encoder.
    pub fn wrap_writer(self, sink: Box<dyn Write + Send>) -> Result<Box<dyn Write + Send>> {
        match self {
            Codec::Gzip => Ok(Box::new(flate2::write::GzEncoder::new(
                sink,
                flate2::Compression::default(),
            ))),
            Codec::Bzip2 => Ok(Box::new(bzip2::write::BzEncoder::new(
                sink,
                bzip2::Compression::default(),
            ))),
            Codec::Xz => Ok(Box::new(xz2::write::XzEncoder::new(sink, 6))),
            Codec::Zip => Err(Error::Codec(
                "zip is recognized for reads only; pick .gz, .bz2, or .xz".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn detects_codec_from_path() {
        assert_eq!(Codec::from_path("data.csv.gz"), Some(Codec::Gzip));
        assert_eq!(Codec::from_path("DATA.CSV.BZ2"), Some(Codec::Bzip2));
        assert_eq!(Codec::from_path("a/b/c.tsv.xz"), Some(Codec::Xz));
        assert_eq!(Codec::from_path("archive.zip"), Some(Codec::Zip));
        assert_eq!(Codec::from_path("plain.csv"), None);
    }

    #[test]
    fn detects_codec_from_magic() {
        assert_eq!(Codec::from_magic(&[0x1f, 0x8b, 0x08]), Some(Codec::Gzip));
        assert_eq!(Codec::from_magic(b"BZh9"), Some(Codec::Bzip2));
        assert_eq!(Codec::from_magic(b"plain text"), None);
    }

    #[test]
    fn gzip_round_trip() {
        let payload = b"a,b\n1,2\n";
        let mut enc =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(payload).unwrap();
        let compressed = enc.finish().unwrap();

        let decoded = Codec::Gzip.decode_to_vec(&compressed[..]).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn zip_rejects_writes() {
        assert!(Codec::Zip.wrap_writer(Box::new(Vec::new())).is_err());
    }
}
