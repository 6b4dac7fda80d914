//! File storage helpers.
//!
//! The server confines all file I/O to a single storage root; requested
//! names are reduced to their final path component before they are joined
//! to the root, so a peer cannot escape it with `../` tricks. Transfers
//! move through [`ChunkReader`] and [`ChunkWriter`], which deal in chunks
//! of at most one packet payload.

use crate::error::TransferError;
use crate::packet::MAX_PAYLOAD_SIZE;
use bytes::Bytes;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// Strip every directory component from a requested filename.
///
/// Both separator styles are treated as separators regardless of host OS, so
/// a Windows-style `..\..\name` cannot traverse on Unix either.
pub fn sanitize_filename(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

/// A directory all server-side transfers are rooted in.
#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    /// Open a storage root, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, TransferError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Storage { root })
    }

    /// The sanitized on-disk path for a requested name.
    pub fn resolve(&self, filename: &str) -> PathBuf {
        self.root.join(sanitize_filename(filename))
    }

    /// Open a stored file for a download.
    pub fn open_source(&self, filename: &str) -> Result<ChunkReader, TransferError> {
        let path = self.resolve(filename);
        if !path.is_file() {
            return Err(TransferError::FileNotFound(path));
        }
        ChunkReader::open(&path)
    }

    /// Create (truncating) the destination file for an upload.
    pub fn create_target(&self, filename: &str) -> Result<ChunkWriter, TransferError> {
        ChunkWriter::create(&self.resolve(filename))
    }
}

/// Reads a file as a sequence of packet-sized chunks.
#[derive(Debug)]
pub struct ChunkReader {
    inner: BufReader<File>,
}

impl ChunkReader {
    pub fn open(path: &Path) -> Result<Self, TransferError> {
        let file = File::open(path)?;
        Ok(ChunkReader {
            inner: BufReader::new(file),
        })
    }

    /// Total file size in bytes.
    pub fn len(&self) -> Result<u64, TransferError> {
        Ok(self.inner.get_ref().metadata()?.len())
    }

    /// Read the next chunk of at most [`MAX_PAYLOAD_SIZE`] bytes.
    /// An empty chunk marks end of file.
    pub fn read_chunk(&mut self) -> Result<Bytes, TransferError> {
        let mut chunk = vec![0u8; MAX_PAYLOAD_SIZE];
        let mut filled = 0;

        // Short reads are legal; keep filling so every chunk except the
        // last carries a full payload.
        while filled < chunk.len() {
            let n = self.inner.read(&mut chunk[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        chunk.truncate(filled);
        Ok(Bytes::from(chunk))
    }
}

/// Writes a file from a sequence of in-order chunks.
#[derive(Debug)]
pub struct ChunkWriter {
    inner: BufWriter<File>,
}

impl ChunkWriter {
    pub fn create(path: &Path) -> Result<Self, TransferError> {
        let file = File::create(path)?;
        Ok(ChunkWriter {
            inner: BufWriter::new(file),
        })
    }

    pub fn write_chunk(&mut self, data: &[u8]) -> Result<(), TransferError> {
        self.inner.write_all(data)?;
        Ok(())
    }

    /// Flush buffered chunks out to the file.
    pub fn finish(mut self) -> Result<(), TransferError> {
        self.inner.flush()?;
        Ok(())
    }
}
