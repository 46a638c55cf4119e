//! Local-file source (C7): positional reads against a file on disk.
//!
//! Grounded on the teacher's `FSStore::get` (`tokio::fs::read` into an owned
//! buffer), generalized from whole-file reads to the byte-range positional
//! reads this system needs.

use std::io::SeekFrom;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::{ChunkDescriptor, ChunkIndex, Source};
use crate::error::{Error, Result};

/// A variable backed by a single local file, with its chunk index already
/// populated by the caller of [`open`](crate::handle::open) (§4.8 — the
/// HDF5 B-tree walk itself is the out-of-scope external collaborator named
/// in §1).
pub struct LocalFileSource {
    path: String,
    chunks: ChunkIndex,
}

impl LocalFileSource {
    pub fn new(path: impl Into<String>, chunks: ChunkIndex) -> Self {
        Self {
            path: path.into(),
            chunks,
        }
    }

    async fn open_file(&self) -> Result<tokio::fs::File> {
        tokio::fs::File::open(&self.path).await.map_err(Error::from)
    }
}

#[async_trait]
impl Source for LocalFileSource {
    fn get_chunk(&self, coords: &[u64]) -> Result<ChunkDescriptor> {
        self.chunks.get(coords).ok_or_else(|| {
            Error::NotFound(format!(
                "no chunk descriptor for coordinates {coords:?} in {}",
                self.path
            ))
        })
    }

    async fn read(&self, offset: u64, size: u64) -> Result<Vec<u8>> {
        // Each call opens its own file handle and seeks independently, so
        // concurrent reads from different offsets never contend on a
        // shared cursor.
        let mut file = self.open_file().await?;
        file.seek(SeekFrom::Start(offset)).await?;
        let mut buf = vec![0u8; size as usize];
        file.read_exact(&mut buf).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                Error::DecodeFailure(format!(
                    "short read at offset {offset}: expected {size} bytes"
                ))
            } else {
                Error::from(e)
            }
        })?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ChunkDescriptor;
    use std::io::Write;

    #[tokio::test]
    async fn reads_byte_range() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"0123456789").unwrap();
        let path = tmp.path().to_str().unwrap().to_string();

        let mut chunks = ChunkIndex::new();
        chunks.insert(
            vec![0],
            ChunkDescriptor {
                offset: 2,
                size: 4,
                filter_mask: 0,
            },
        );
        let source = LocalFileSource::new(path, chunks);
        let desc = source.get_chunk(&[0]).unwrap();
        let bytes = source.read(desc.offset, desc.size).await.unwrap();
        assert_eq!(bytes, b"2345");
    }

    #[tokio::test]
    async fn missing_chunk_coords_is_not_found() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let path = tmp.path().to_str().unwrap().to_string();
        let source = LocalFileSource::new(path, ChunkIndex::new());
        assert!(matches!(
            source.get_chunk(&[0, 0]).unwrap_err(),
            Error::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn short_read_is_decode_failure() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"abc").unwrap();
        let path = tmp.path().to_str().unwrap().to_string();
        let source = LocalFileSource::new(path, ChunkIndex::new());
        let err = source.read(0, 100).await.unwrap_err();
        assert!(matches!(err, Error::DecodeFailure(_)));
    }
}
