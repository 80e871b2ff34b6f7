//! Content providers supplying the bytes behind a [`ReadableTree`].
//!
//! A tree only knows `(offset, length)` coordinates into the content pool. A
//! [`ContentProvider`] turns those coordinates into bytes, decoupling the
//! tree's structure from where the pool physically lives: an in-memory image
//! ([`MemoryProvider`]) or the archive's own executable file
//! ([`FileProvider`]).
//!
//! [`ReadableTree`]: crate::tree::ReadableTree

use crate::error::{Error, Result};
use crate::pread;
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt::Debug;
use std::fs::File;
use std::io;
use std::sync::Arc;
use tracing::trace;

/// Source of content-pool bytes.
///
/// Both variants clamp the requested range to [`len`](Self::len), so a read
/// never leaves the content region.
#[async_trait]
pub trait ContentProvider: Debug + Send + Sync {
    /// Total length of the content region
    fn len(&self) -> u64;

    /// Returns true if the content region holds no bytes
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Blocking read of `length` bytes at `offset` within the content region
    fn read_contents_sync(&self, offset: u64, length: u64) -> Result<Bytes>;

    /// Asynchronous read of `length` bytes at `offset` within the content region
    async fn read_contents(&self, offset: u64, length: u64) -> Result<Bytes>;
}

/// Clamps `(offset, length)` to a region of `total` bytes.
pub(crate) fn clamp_range(offset: u64, length: u64, total: u64) -> (u64, u64) {
    let start = offset.min(total);
    let len = length.min(total - start);
    (start, len)
}

/// Content pool held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryProvider {
    content: Bytes,
}

impl MemoryProvider {
    /// Wraps an in-memory content pool
    pub fn new(content: impl Into<Bytes>) -> Self {
        Self {
            content: content.into(),
        }
    }

    fn slice(&self, offset: u64, length: u64) -> Bytes {
        let (start, len) = clamp_range(offset, length, self.len());
        let start = start as usize;
        self.content.slice(start..start + len as usize)
    }
}

#[async_trait]
impl ContentProvider for MemoryProvider {
    fn len(&self) -> u64 {
        self.content.len() as u64
    }

    fn read_contents_sync(&self, offset: u64, length: u64) -> Result<Bytes> {
        Ok(self.slice(offset, length))
    }

    async fn read_contents(&self, offset: u64, length: u64) -> Result<Bytes> {
        Ok(self.slice(offset, length))
    }
}

/// Content pool stored inside a file, typically the running executable.
///
/// Reads are positioned reads against a handle owned by the provider, taken
/// before any overlay exists.
#[derive(Debug, Clone)]
pub struct FileProvider {
    file: Arc<File>,
    base: u64,
    length: u64,
}

impl FileProvider {
    /// Serves the `length` byte region starting at `base` of `file`
    pub fn new(file: Arc<File>, base: u64, length: u64) -> Self {
        Self { file, base, length }
    }

    fn read_blocking(file: &File, base: u64, offset: u64, len: u64) -> Result<Bytes> {
        let mut buf = vec![0u8; len as usize];
        pread::read_exact_at(file, &mut buf, base + offset).map_err(Error::Provider)?;
        Ok(Bytes::from(buf))
    }
}

#[async_trait]
impl ContentProvider for FileProvider {
    fn len(&self) -> u64 {
        self.length
    }

    fn read_contents_sync(&self, offset: u64, length: u64) -> Result<Bytes> {
        let (offset, len) = clamp_range(offset, length, self.length);
        trace!("Reading {} content bytes at {}", len, offset);
        Self::read_blocking(&self.file, self.base, offset, len)
    }

    async fn read_contents(&self, offset: u64, length: u64) -> Result<Bytes> {
        let (offset, len) = clamp_range(offset, length, self.length);
        if len == 0 {
            return Ok(Bytes::new());
        }
        trace!("Scheduling read of {} content bytes at {}", len, offset);
        let file = Arc::clone(&self.file);
        let base = self.base;
        tokio::task::spawn_blocking(move || FileProvider::read_blocking(&file, base, offset, len))
            .await
            .map_err(|e| Error::Provider(io::Error::new(io::ErrorKind::Other, e)))?
    }
}
