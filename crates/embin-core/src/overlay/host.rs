//! Host file-system boundary.
//!
//! [`HostFs`] is the single seam through which application code performs
//! file operations. [`StdFs`] implements it against the real file system;
//! an [`Overlay`](super::Overlay) implements it on top of another `HostFs`.

use async_trait::async_trait;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::fs::{self, File, Metadata};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::pread;
use crate::tree::Stat;

/// Opaque file descriptor issued by a [`HostFs`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fd(pub u64);

impl fmt::Display for Fd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fd {}", self.0)
    }
}

/// Stat record returned by [`HostFs`] operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    /// Entry is a regular file
    pub is_file: bool,
    /// Entry is a directory
    pub is_dir: bool,
    /// Entry is a symbolic link (only reported by `lstat`)
    pub is_symlink: bool,
    /// Size in bytes
    pub size: u64,
    /// Entry cannot be written
    pub readonly: bool,
    /// Last access time
    pub accessed: SystemTime,
    /// Last modification time
    pub modified: SystemTime,
    /// Last status change time
    pub changed: SystemTime,
    /// Creation time
    pub created: SystemTime,
}

impl FileStat {
    /// Synthesizes a record for an embedded entry.
    ///
    /// Archives carry no timestamps, so `now` is used for every time field.
    pub fn synthetic(stat: Stat, now: SystemTime) -> Self {
        Self {
            is_file: stat.is_file,
            is_dir: stat.is_directory,
            is_symlink: false,
            size: stat.size,
            readonly: true,
            accessed: now,
            modified: now,
            changed: now,
            created: now,
        }
    }
}

impl From<Metadata> for FileStat {
    fn from(meta: Metadata) -> Self {
        let modified = meta.modified().unwrap_or(UNIX_EPOCH);
        Self {
            is_file: meta.is_file(),
            is_dir: meta.is_dir(),
            is_symlink: meta.file_type().is_symlink(),
            size: meta.len(),
            readonly: meta.permissions().readonly(),
            accessed: meta.accessed().unwrap_or(modified),
            modified,
            changed: modified,
            created: meta.created().unwrap_or(modified),
        }
    }
}

/// File operations as seen by application code.
///
/// Every operation comes in a blocking `*_sync` form and, where the host
/// offers one, an asynchronous form. Implementations are used from a single
/// thread; the futures are not `Send`.
#[async_trait(?Send)]
pub trait HostFs {
    /// Opens `path` for reading
    fn open_sync(&self, path: &Path) -> io::Result<Fd>;
    /// Releases a descriptor
    fn close_sync(&self, fd: Fd) -> io::Result<()>;
    /// Reads into `buf` at `position`, or at the descriptor's cursor when `None`
    fn read_sync(&self, fd: Fd, buf: &mut [u8], position: Option<u64>) -> io::Result<usize>;
    /// Stats an open descriptor
    fn fstat_sync(&self, fd: Fd) -> io::Result<FileStat>;
    /// Stats a path, following symbolic links
    fn stat_sync(&self, path: &Path) -> io::Result<FileStat>;
    /// Stats a path without following symbolic links
    fn lstat_sync(&self, path: &Path) -> io::Result<FileStat>;
    /// Lists the entry names of a directory
    fn read_dir_sync(&self, path: &Path) -> io::Result<Vec<String>>;
    /// Reads a whole file
    fn read_file_sync(&self, path: &Path) -> io::Result<Vec<u8>>;
    /// Returns true if `path` exists
    fn exists_sync(&self, path: &Path) -> bool;
    /// Fails unless `path` is accessible
    fn access_sync(&self, path: &Path) -> io::Result<()>;
    /// Resolves `path` to its canonical form
    fn realpath_sync(&self, path: &Path) -> io::Result<PathBuf>;
    /// Creates or truncates `path` with `contents`
    fn write_file_sync(&self, path: &Path, contents: &[u8]) -> io::Result<()>;
    /// Creates a directory
    fn create_dir_sync(&self, path: &Path) -> io::Result<()>;
    /// Removes a file
    fn remove_file_sync(&self, path: &Path) -> io::Result<()>;
    /// Removes an empty directory
    fn remove_dir_sync(&self, path: &Path) -> io::Result<()>;
    /// Renames `from` to `to`
    fn rename_sync(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Asynchronous [`open_sync`](Self::open_sync)
    async fn open(&self, path: &Path) -> io::Result<Fd>;
    /// Asynchronous [`close_sync`](Self::close_sync)
    async fn close(&self, fd: Fd) -> io::Result<()>;
    /// Asynchronous [`read_sync`](Self::read_sync)
    async fn read(&self, fd: Fd, buf: &mut [u8], position: Option<u64>) -> io::Result<usize>;
    /// Asynchronous [`fstat_sync`](Self::fstat_sync)
    async fn fstat(&self, fd: Fd) -> io::Result<FileStat>;
    /// Asynchronous [`stat_sync`](Self::stat_sync)
    async fn stat(&self, path: &Path) -> io::Result<FileStat>;
    /// Asynchronous [`lstat_sync`](Self::lstat_sync)
    async fn lstat(&self, path: &Path) -> io::Result<FileStat>;
    /// Asynchronous [`read_dir_sync`](Self::read_dir_sync)
    async fn read_dir(&self, path: &Path) -> io::Result<Vec<String>>;
    /// Asynchronous [`read_file_sync`](Self::read_file_sync)
    async fn read_file(&self, path: &Path) -> io::Result<Vec<u8>>;
    /// Asynchronous [`exists_sync`](Self::exists_sync)
    async fn exists(&self, path: &Path) -> bool;
    /// Asynchronous [`access_sync`](Self::access_sync)
    async fn access(&self, path: &Path) -> io::Result<()>;
    /// Asynchronous [`realpath_sync`](Self::realpath_sync)
    async fn realpath(&self, path: &Path) -> io::Result<PathBuf>;
    /// Asynchronous [`write_file_sync`](Self::write_file_sync)
    async fn write_file(&self, path: &Path, contents: &[u8]) -> io::Result<()>;
}

/// First descriptor handed out by [`StdFs`]
const STD_FD_BASE: u64 = 3;

/// Passthrough to the real file system.
///
/// Descriptors map to open [`File`] handles owned by this value.
#[derive(Debug)]
pub struct StdFs {
    files: RefCell<HashMap<Fd, Arc<File>>>,
    next: Cell<u64>,
}

impl Default for StdFs {
    fn default() -> Self {
        Self::new()
    }
}

impl StdFs {
    /// Creates a passthrough with no open descriptors
    pub fn new() -> Self {
        Self {
            files: RefCell::new(HashMap::new()),
            next: Cell::new(STD_FD_BASE),
        }
    }

    fn register(&self, file: File) -> Fd {
        let fd = Fd(self.next.get());
        self.next.set(fd.0 + 1);
        self.files.borrow_mut().insert(fd, Arc::new(file));
        fd
    }

    fn file(&self, fd: Fd) -> io::Result<Arc<File>> {
        self.files
            .borrow()
            .get(&fd)
            .cloned()
            .ok_or_else(|| bad_descriptor(fd))
    }

    fn read_file_at(file: &File, buf: &mut [u8], position: Option<u64>) -> io::Result<usize> {
        match position {
            Some(offset) => pread::read_at(file, buf, offset),
            None => {
                let mut handle = file;
                handle.read(buf)
            }
        }
    }
}

fn bad_descriptor(fd: Fd) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, format!("bad file descriptor: {}", fd))
}

async fn blocking<T, F>(f: F) -> io::Result<T>
where
    F: FnOnce() -> io::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
}

fn file_names(entries: fs::ReadDir) -> io::Result<Vec<String>> {
    entries
        .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
        .collect()
}

#[async_trait(?Send)]
impl HostFs for StdFs {
    fn open_sync(&self, path: &Path) -> io::Result<Fd> {
        Ok(self.register(File::open(path)?))
    }

    fn close_sync(&self, fd: Fd) -> io::Result<()> {
        self.files
            .borrow_mut()
            .remove(&fd)
            .map(drop)
            .ok_or_else(|| bad_descriptor(fd))
    }

    fn read_sync(&self, fd: Fd, buf: &mut [u8], position: Option<u64>) -> io::Result<usize> {
        let file = self.file(fd)?;
        Self::read_file_at(&file, buf, position)
    }

    fn fstat_sync(&self, fd: Fd) -> io::Result<FileStat> {
        Ok(self.file(fd)?.metadata()?.into())
    }

    fn stat_sync(&self, path: &Path) -> io::Result<FileStat> {
        Ok(fs::metadata(path)?.into())
    }

    fn lstat_sync(&self, path: &Path) -> io::Result<FileStat> {
        Ok(fs::symlink_metadata(path)?.into())
    }

    fn read_dir_sync(&self, path: &Path) -> io::Result<Vec<String>> {
        file_names(fs::read_dir(path)?)
    }

    fn read_file_sync(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn exists_sync(&self, path: &Path) -> bool {
        path.exists()
    }

    fn access_sync(&self, path: &Path) -> io::Result<()> {
        fs::metadata(path).map(drop)
    }

    fn realpath_sync(&self, path: &Path) -> io::Result<PathBuf> {
        fs::canonicalize(path)
    }

    fn write_file_sync(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        fs::write(path, contents)
    }

    fn create_dir_sync(&self, path: &Path) -> io::Result<()> {
        fs::create_dir(path)
    }

    fn remove_file_sync(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn remove_dir_sync(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir(path)
    }

    fn rename_sync(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    async fn open(&self, path: &Path) -> io::Result<Fd> {
        let file = tokio::fs::File::open(path).await?.into_std().await;
        Ok(self.register(file))
    }

    async fn close(&self, fd: Fd) -> io::Result<()> {
        self.close_sync(fd)
    }

    async fn read(&self, fd: Fd, buf: &mut [u8], position: Option<u64>) -> io::Result<usize> {
        let file = self.file(fd)?;
        let len = buf.len();
        let data = blocking(move || {
            let mut data = vec![0u8; len];
            let n = StdFs::read_file_at(&file, &mut data, position)?;
            data.truncate(n);
            Ok(data)
        })
        .await?;
        buf[..data.len()].copy_from_slice(&data);
        Ok(data.len())
    }

    async fn fstat(&self, fd: Fd) -> io::Result<FileStat> {
        let file = self.file(fd)?;
        let meta = blocking(move || file.metadata()).await?;
        Ok(meta.into())
    }

    async fn stat(&self, path: &Path) -> io::Result<FileStat> {
        Ok(tokio::fs::metadata(path).await?.into())
    }

    async fn lstat(&self, path: &Path) -> io::Result<FileStat> {
        Ok(tokio::fs::symlink_metadata(path).await?.into())
    }

    async fn read_dir(&self, path: &Path) -> io::Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(path).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        Ok(names)
    }

    async fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        tokio::fs::read(path).await
    }

    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    async fn access(&self, path: &Path) -> io::Result<()> {
        tokio::fs::metadata(path).await.map(drop)
    }

    async fn realpath(&self, path: &Path) -> io::Result<PathBuf> {
        tokio::fs::canonicalize(path).await
    }

    async fn write_file(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        tokio::fs::write(path, contents).await
    }
}
