//! Tar and gzip access primitives for image tarballs.
//!
//! Image tarballs are read repeatedly and never mutated, so everything here
//! operates on forward-only readers: open a fresh reader per scan, extract a
//! single member by exact name, or walk all entries to sum their declared
//! sizes. Gzip compression is transparent on open (by file suffix) and when
//! reading stored layer blobs (by magic bytes).

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use flate2::read::GzDecoder;
use tar::Archive;
use thiserror::Error;

/// Errors from archive access.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("file {0} not found in tar")]
    MemberNotFound(String),
}

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Open a tarball for reading, transparently decompressing when the path
/// carries a `.gz` suffix.
///
/// Each call consumes a file descriptor; the reader owns it and releases it
/// on drop, whichever exit path the caller takes.
pub fn open(path: &Path) -> io::Result<Box<dyn Read + Send>> {
    let f = File::open(path)?;
    if path.extension().is_some_and(|ext| ext == "gz") {
        Ok(Box::new(GzDecoder::new(f)))
    } else {
        Ok(Box::new(f))
    }
}

/// Scan `reader` as a tar stream and return the bytes of the first entry
/// whose name matches `member` exactly.
///
/// The scan is forward-only; a miss reads the whole archive before failing
/// with [`ArchiveError::MemberNotFound`].
pub fn extract_file<R: Read>(reader: R, member: &str) -> Result<Vec<u8>, ArchiveError> {
    let mut archive = Archive::new(reader);
    for entry in archive.entries()? {
        let mut entry = entry?;
        if entry.path_bytes().as_ref() == member.as_bytes() {
            let mut buf = Vec::with_capacity(entry.header().size()? as usize);
            entry.read_to_end(&mut buf)?;
            return Ok(buf);
        }
    }
    Err(ArchiveError::MemberNotFound(member.to_string()))
}

/// Sum the declared uncompressed size of every entry in the tar stream.
///
/// Sizes come from the tar headers; no decompression-size verification is
/// attempted. Docker computes layer sizes differently for some images, so
/// this is a best-effort figure.
pub fn uncompressed_size<R: Read>(reader: R) -> Result<u64, ArchiveError> {
    let mut archive = Archive::new(reader);
    let mut total = 0u64;
    for entry in archive.entries()? {
        let entry = entry?;
        total += entry.header().size()?;
    }
    Ok(total)
}

/// Whether `bytes` starts with the gzip magic number.
pub fn is_gzipped(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[..2] == GZIP_MAGIC
}

/// Wrap stored blob bytes in a reader, gunzipping when the blob is
/// gzip-compressed.
pub fn blob_reader(bytes: &[u8]) -> Box<dyn Read + Send + '_> {
    if is_gzipped(bytes) {
        Box::new(GzDecoder::new(bytes))
    } else {
        Box::new(bytes)
    }
}
