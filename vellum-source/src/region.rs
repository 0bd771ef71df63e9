use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use vellum_result::{Error, Result};

use crate::compression::Codec;
use crate::connection_size;

enum Backing {
    Mmap(Mmap),
    Owned(Vec<u8>),
}

/// A finite, immutable, random-access byte region.
///
/// Backed by a memory mapping for uncompressed seekable files and by a
/// single owned buffer otherwise. The bytes never change for the
/// lifetime of the region.
pub struct ByteSource {
    backing: Backing,
    path: Option<PathBuf>,
}

impl ByteSource {
    /// Open a file, decompressing it fully into memory when the path or
    /// leading magic bytes identify a known codec, and memory mapping it
    /// otherwise.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut file = File::open(path)?;

        let codec = match Codec::from_path(path) {
            Some(codec) => Some(codec),
            None => {
                let mut head = [0u8; 8];
                let n = read_head(&mut file, &mut head)?;
                Codec::from_magic(&head[..n])
            }
        };

        if let Some(codec) = codec {
            tracing::debug!(path = %path.display(), codec = ?codec, "decompressing source");
            let bytes = codec.decode_to_vec(&mut file)?;
            return Ok(Self {
                backing: Backing::Owned(bytes),
                path: Some(path.to_path_buf()),
            });
        }

        // Mapping an empty file is an error on some platforms; an empty
        // owned buffer behaves identically.
        let len = file.metadata()?.len();
        if len == 0 {
            return Ok(Self {
                backing: Backing::Owned(Vec::new()),
                path: Some(path.to_path_buf()),
            });
        }

        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self {
            backing: Backing::Mmap(mmap),
            path: Some(path.to_path_buf()),
        })
    }

    /// Wrap an in-memory buffer.
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self {
            backing: Backing::Owned(bytes),
            path: None,
        }
    }

    /// Drain a non-seekable reader into memory, decompressing when the
    /// path hint or magic bytes identify a codec.
    pub fn from_reader<R: Read>(mut reader: R, path_hint: Option<&Path>) -> Result<Self> {
        let chunk = connection_size();
        let mut bytes = Vec::with_capacity(chunk);
        let mut buf = vec![0u8; chunk];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            bytes.extend_from_slice(&buf[..n]);
        }

        let codec = path_hint
            .and_then(Codec::from_path)
            .or_else(|| Codec::from_magic(&bytes));
        if let Some(codec) = codec {
            bytes = codec.decode_to_vec(&bytes[..])?;
        }

        Ok(Self {
            backing: Backing::Owned(bytes),
            path: path_hint.map(Path::to_path_buf),
        })
    }

    /// Total length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The whole region as one slice.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        match &self.backing {
            Backing::Mmap(map) => map,
            Backing::Owned(bytes) => bytes,
        }
    }

    /// A sub-slice `[lo, hi)`. Bounds are checked.
    #[inline]
    pub fn slice(&self, lo: usize, hi: usize) -> Result<&[u8]> {
        self.as_bytes().get(lo..hi).ok_or_else(|| {
            Error::Internal(format!(
                "byte range {lo}..{hi} out of bounds for region of {} bytes",
                self.len()
            ))
        })
    }

    /// Whether the bytes at `off` begin with `needle`.
    #[inline]
    pub fn starts_with(&self, off: usize, needle: &[u8]) -> bool {
        self.as_bytes()
            .get(off..)
            .is_some_and(|tail| tail.starts_with(needle))
    }

    /// True when backed by a memory mapping. The indexer uses this to
    /// choose between mapped parallel chunks and sequential scanning.
    #[inline]
    pub fn is_mmap(&self) -> bool {
        matches!(self.backing, Backing::Mmap(_))
    }

    /// The path this region was opened from, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Hint the OS that the region will be scanned front to back.
    pub fn advise_sequential(&self) {
        #[cfg(unix)]
        if let Backing::Mmap(map) = &self.backing {
            let _ = map.advise(memmap2::Advice::Sequential);
        }
    }

    /// Hint the OS that access is about to turn random (column reads).
    pub fn advise_random(&self) {
        #[cfg(unix)]
        if let Backing::Mmap(map) = &self.backing {
            let _ = map.advise(memmap2::Advice::Random);
        }
    }
}

fn read_head(file: &mut File, head: &mut [u8]) -> Result<usize> {
    use std::io::{Seek, SeekFrom};
    let mut filled = 0;
    while filled < head.len() {
        let n = file.read(&mut head[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    file.seek(SeekFrom::Start(0))?;
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::NamedTempFile;

    #[test]
    fn open_maps_uncompressed_files() {
        let mut tmp = NamedTempFile::new().expect("create tmp");
        tmp.write_all(b"a,b\n1,2\n").unwrap();

        let src = ByteSource::open(tmp.path()).expect("open");
        assert!(src.is_mmap());
        assert_eq!(src.len(), 8);
        assert_eq!(src.slice(0, 3).unwrap(), b"a,b");
        assert!(src.starts_with(4, b"1,2"));
    }

    #[test]
    fn open_decompresses_gzip_by_magic() {
        // No .gz suffix on purpose; detection must fall back to magic bytes.
        let mut tmp = NamedTempFile::new().expect("create tmp");
        let mut enc =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(b"x,y\n3,4\n").unwrap();
        tmp.write_all(&enc.finish().unwrap()).unwrap();

        let src = ByteSource::open(tmp.path()).expect("open");
        assert!(!src.is_mmap());
        assert_eq!(src.as_bytes(), b"x,y\n3,4\n");
    }

    #[test]
    fn empty_file_is_an_empty_region() {
        let tmp = NamedTempFile::new().expect("create tmp");
        let src = ByteSource::open(tmp.path()).expect("open");
        assert!(src.is_empty());
        assert!(!src.is_mmap());
    }

    #[test]
    fn slice_out_of_bounds_is_an_error() {
        let src = ByteSource::from_vec(b"abc".to_vec());
        assert!(src.slice(1, 9).is_err());
    }
}
