//! Routing of host file operations into the embedded tree.
//!
//! An [`Overlay`] wraps a [`HostFs`] and claims every path under its mount
//! prefix. Claimed paths are served from the [`ReadableTree`] and never fall
//! back to the host; a missing embedded entry is reported as `NotFound`.
//! Everything else goes to the wrapped host unchanged, errors included.
//!
//! Calls that would modify a claimed path fail with
//! [`io::ErrorKind::Unsupported`].
//!
//! ```no_run
//! use embin_core::{HostFs, Runtime, RuntimeConfig, StdFs};
//! use std::path::Path;
//!
//! let runtime = Runtime::from_current_exe(RuntimeConfig::from_env())?;
//! let vfs = runtime.mount_overlay("/embedded", StdFs::new());
//! let config = vfs.read_file_sync(Path::new("/embedded/config.json"))?;
//! let hosts = vfs.read_file_sync(Path::new("/etc/hosts"))?;
//! # let _ = (config, hosts);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod descriptors;
mod host;
mod router;

pub use descriptors::SYNTHETIC_FD_BASE;
pub use host::{Fd, FileStat, HostFs, StdFs};
pub use router::{Route, Router};

use crate::error::{Error, Result};
use crate::tree::ReadableTree;
use async_trait::async_trait;
use bytes::Bytes;
use descriptors::DescriptorTable;
use std::cell::RefCell;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::trace;

/// A [`HostFs`] serving one mount prefix from an embedded tree.
#[derive(Debug)]
pub struct Overlay<H> {
    router: Router,
    tree: Arc<ReadableTree>,
    host: H,
    descriptors: RefCell<DescriptorTable>,
}

impl<H: HostFs> Overlay<H> {
    /// Mounts `tree` at `prefix` on top of `host`
    pub fn new(prefix: impl AsRef<Path>, tree: Arc<ReadableTree>, host: H) -> Self {
        let router = Router::new(prefix);
        trace!("Mounting embedded tree at {}", router.prefix().display());
        Self {
            router,
            tree,
            host,
            descriptors: RefCell::new(DescriptorTable::new()),
        }
    }

    /// The routing decision in use
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// The wrapped host
    pub fn host(&self) -> &H {
        &self.host
    }

    /// Unmounts and returns the wrapped host
    pub fn into_host(self) -> H {
        self.host
    }

    /// Number of embedded files currently open
    pub fn open_descriptors(&self) -> usize {
        self.descriptors.borrow().len()
    }

    fn route(&self, op: &'static str, path: &Path) -> Option<String> {
        match self.router.route(path) {
            router::Route::Embedded(embedded) => {
                trace!("{} {} -> embedded {}", op, path.display(), embedded);
                Some(embedded)
            }
            router::Route::Passthrough => None,
        }
    }

    fn stat_embedded(&self, path: &str) -> io::Result<FileStat> {
        let stat = self.tree.stat(path);
        if !stat.exists() {
            return Err(Error::not_found(path).into());
        }
        Ok(FileStat::synthetic(stat, SystemTime::now()))
    }

    fn open_embedded(&self, path: String) -> io::Result<Fd> {
        if !self.tree.exists(&path) {
            return Err(Error::not_found(path).into());
        }
        Ok(self.descriptors.borrow_mut().open(path))
    }

    fn access_embedded(&self, path: &str) -> io::Result<()> {
        if self.tree.exists(path) {
            Ok(())
        } else {
            Err(Error::not_found(path).into())
        }
    }

    fn realpath_embedded(&self, path: &str) -> io::Result<PathBuf> {
        self.access_embedded(path)?;
        Ok(self.router.host_path(path))
    }

    /// Resolves a descriptor read to a [`Claim`].
    ///
    /// Returns `None` for descriptors this overlay did not issue. Without a
    /// position the read is claimed at the cursor here, before any bytes are
    /// fetched.
    fn begin_read(&self, fd: Fd, len: usize, position: Option<u64>) -> Option<Claim> {
        let mut table = self.descriptors.borrow_mut();
        let file = table.get_mut(fd)?;
        let (offset, reserved) = match position {
            Some(offset) => (offset, None),
            None => {
                let size = self.tree.stat(&file.path).size;
                let (start, claimed) = file.reserve(len as u64, size);
                (start, Some(claimed))
            }
        };
        Some(Claim {
            path: file.path.clone(),
            offset,
            reserved,
        })
    }

    /// Copies fetched bytes out, or hands the cursor claim back on failure
    fn finish_read(
        &self,
        fd: Fd,
        claim: &Claim,
        buf: &mut [u8],
        fetched: Result<Bytes>,
    ) -> io::Result<usize> {
        match fetched {
            Ok(bytes) => Ok(fill(buf, &bytes)),
            Err(err) => {
                if let Some(claimed) = claim.reserved {
                    if let Some(file) = self.descriptors.borrow_mut().get_mut(fd) {
                        file.release(claim.offset, claimed);
                    }
                }
                Err(err.into())
            }
        }
    }

    fn embedded_fd_path(&self, fd: Fd) -> Option<String> {
        self.descriptors.borrow().get(fd).map(|file| file.path.clone())
    }

    fn refuse(&self, operation: &'static str, path: &Path) -> Option<io::Error> {
        self.route(operation, path)
            .map(|embedded| Error::unsupported(operation, embedded).into())
    }
}

/// A descriptor read resolved to an archive range
struct Claim {
    path: String,
    offset: u64,
    /// Length taken from the cursor; `None` for positioned reads
    reserved: Option<u64>,
}

fn fill(buf: &mut [u8], bytes: &[u8]) -> usize {
    let n = bytes.len().min(buf.len());
    buf[..n].copy_from_slice(&bytes[..n]);
    n
}

#[async_trait(?Send)]
impl<H: HostFs> HostFs for Overlay<H> {
    fn open_sync(&self, path: &Path) -> io::Result<Fd> {
        match self.route("open", path) {
            Some(embedded) => self.open_embedded(embedded),
            None => self.host.open_sync(path),
        }
    }

    fn close_sync(&self, fd: Fd) -> io::Result<()> {
        if self.descriptors.borrow_mut().close(fd) {
            return Ok(());
        }
        self.host.close_sync(fd)
    }

    fn read_sync(&self, fd: Fd, buf: &mut [u8], position: Option<u64>) -> io::Result<usize> {
        match self.begin_read(fd, buf.len(), position) {
            Some(claim) => {
                let fetched =
                    self.tree
                        .read_file_sync(&claim.path, claim.offset, Some(buf.len() as u64));
                self.finish_read(fd, &claim, buf, fetched)
            }
            None => self.host.read_sync(fd, buf, position),
        }
    }

    fn fstat_sync(&self, fd: Fd) -> io::Result<FileStat> {
        match self.embedded_fd_path(fd) {
            Some(path) => self.stat_embedded(&path),
            None => self.host.fstat_sync(fd),
        }
    }

    fn stat_sync(&self, path: &Path) -> io::Result<FileStat> {
        match self.route("stat", path) {
            Some(embedded) => self.stat_embedded(&embedded),
            None => self.host.stat_sync(path),
        }
    }

    fn lstat_sync(&self, path: &Path) -> io::Result<FileStat> {
        match self.route("lstat", path) {
            Some(embedded) => self.stat_embedded(&embedded),
            None => self.host.lstat_sync(path),
        }
    }

    fn read_dir_sync(&self, path: &Path) -> io::Result<Vec<String>> {
        match self.route("read_dir", path) {
            Some(embedded) => Ok(self.tree.read_dir(&embedded)?),
            None => self.host.read_dir_sync(path),
        }
    }

    fn read_file_sync(&self, path: &Path) -> io::Result<Vec<u8>> {
        match self.route("read_file", path) {
            Some(embedded) => Ok(Vec::from(self.tree.read_file_sync(&embedded, 0, None)?)),
            None => self.host.read_file_sync(path),
        }
    }

    fn exists_sync(&self, path: &Path) -> bool {
        match self.route("exists", path) {
            Some(embedded) => self.tree.exists(&embedded),
            None => self.host.exists_sync(path),
        }
    }

    fn access_sync(&self, path: &Path) -> io::Result<()> {
        match self.route("access", path) {
            Some(embedded) => self.access_embedded(&embedded),
            None => self.host.access_sync(path),
        }
    }

    fn realpath_sync(&self, path: &Path) -> io::Result<PathBuf> {
        match self.route("realpath", path) {
            Some(embedded) => self.realpath_embedded(&embedded),
            None => self.host.realpath_sync(path),
        }
    }

    fn write_file_sync(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        match self.refuse("write_file", path) {
            Some(err) => Err(err),
            None => self.host.write_file_sync(path, contents),
        }
    }

    fn create_dir_sync(&self, path: &Path) -> io::Result<()> {
        match self.refuse("create_dir", path) {
            Some(err) => Err(err),
            None => self.host.create_dir_sync(path),
        }
    }

    fn remove_file_sync(&self, path: &Path) -> io::Result<()> {
        match self.refuse("remove_file", path) {
            Some(err) => Err(err),
            None => self.host.remove_file_sync(path),
        }
    }

    fn remove_dir_sync(&self, path: &Path) -> io::Result<()> {
        match self.refuse("remove_dir", path) {
            Some(err) => Err(err),
            None => self.host.remove_dir_sync(path),
        }
    }

    fn rename_sync(&self, from: &Path, to: &Path) -> io::Result<()> {
        match self.refuse("rename", from).or_else(|| self.refuse("rename", to)) {
            Some(err) => Err(err),
            None => self.host.rename_sync(from, to),
        }
    }

    async fn open(&self, path: &Path) -> io::Result<Fd> {
        match self.route("open", path) {
            Some(embedded) => self.open_embedded(embedded),
            None => self.host.open(path).await,
        }
    }

    async fn close(&self, fd: Fd) -> io::Result<()> {
        if self.descriptors.borrow_mut().close(fd) {
            return Ok(());
        }
        self.host.close(fd).await
    }

    async fn read(&self, fd: Fd, buf: &mut [u8], position: Option<u64>) -> io::Result<usize> {
        match self.begin_read(fd, buf.len(), position) {
            Some(claim) => {
                let fetched = self
                    .tree
                    .read_file(&claim.path, claim.offset, Some(buf.len() as u64))
                    .await;
                self.finish_read(fd, &claim, buf, fetched)
            }
            None => self.host.read(fd, buf, position).await,
        }
    }

    async fn fstat(&self, fd: Fd) -> io::Result<FileStat> {
        match self.embedded_fd_path(fd) {
            Some(path) => self.stat_embedded(&path),
            None => self.host.fstat(fd).await,
        }
    }

    async fn stat(&self, path: &Path) -> io::Result<FileStat> {
        match self.route("stat", path) {
            Some(embedded) => self.stat_embedded(&embedded),
            None => self.host.stat(path).await,
        }
    }

    async fn lstat(&self, path: &Path) -> io::Result<FileStat> {
        match self.route("lstat", path) {
            Some(embedded) => self.stat_embedded(&embedded),
            None => self.host.lstat(path).await,
        }
    }

    async fn read_dir(&self, path: &Path) -> io::Result<Vec<String>> {
        match self.route("read_dir", path) {
            Some(embedded) => Ok(self.tree.read_dir(&embedded)?),
            None => self.host.read_dir(path).await,
        }
    }

    async fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        match self.route("read_file", path) {
            Some(embedded) => Ok(Vec::from(self.tree.read_file(&embedded, 0, None).await?)),
            None => self.host.read_file(path).await,
        }
    }

    async fn exists(&self, path: &Path) -> bool {
        match self.route("exists", path) {
            Some(embedded) => self.tree.exists(&embedded),
            None => self.host.exists(path).await,
        }
    }

    async fn access(&self, path: &Path) -> io::Result<()> {
        match self.route("access", path) {
            Some(embedded) => self.access_embedded(&embedded),
            None => self.host.access(path).await,
        }
    }

    async fn realpath(&self, path: &Path) -> io::Result<PathBuf> {
        match self.route("realpath", path) {
            Some(embedded) => self.realpath_embedded(&embedded),
            None => self.host.realpath(path).await,
        }
    }

    async fn write_file(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        match self.refuse("write_file", path) {
            Some(err) => Err(err),
            None => self.host.write_file(path, contents).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{assemble, Archive};
    use crate::tree::WritableTree;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    fn tree() -> Arc<ReadableTree> {
        let mut tree = WritableTree::new();
        tree.write_file("/a/b/c.txt", &b"hello"[..]).unwrap();
        tree.write_file("/a/d.txt", &b"world"[..]).unwrap();
        let image = assemble(b"RT", "/a/d.txt", tree).unwrap();
        let (_, tree) = Archive::from_bytes(image).unwrap().into_parts();
        Arc::new(tree)
    }

    fn overlay() -> Overlay<StdFs> {
        Overlay::new("/embedded", tree(), StdFs::new())
    }

    #[test]
    fn test_read_file_is_served() {
        let vfs = overlay();
        assert_eq!(vfs.read_file_sync(Path::new("/embedded/a/d.txt")).unwrap(), b"world");
        assert_eq!(vfs.read_file_sync(Path::new("/embedded/a/b/c.txt")).unwrap(), b"hello");
        assert_eq!(
            vfs.read_dir_sync(Path::new("/embedded/a")).unwrap(),
            vec!["b", "d.txt"]
        );
        assert!(vfs.stat_sync(Path::new("/embedded/a/b")).unwrap().is_dir);
        assert_eq!(vfs.stat_sync(Path::new("/embedded/a/d.txt")).unwrap().size, 5);
        assert!(vfs.exists_sync(Path::new("/embedded")));
    }

    #[test]
    fn test_other_paths_pass_through() {
        let tmp = TempDir::new().unwrap();
        let outside = tmp.path().join("x");
        fs::write(&outside, b"on disk").unwrap();

        let vfs = overlay();
        assert_eq!(vfs.read_file_sync(&outside).unwrap(), b"on disk");
        assert!(vfs.stat_sync(&outside).unwrap().is_file);
        vfs.write_file_sync(&tmp.path().join("y"), b"new").unwrap();
        assert_eq!(fs::read(tmp.path().join("y")).unwrap(), b"new");

        let err = vfs.read_file_sync(Path::new("/elsewhere/x")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(err.get_ref().map_or(true, |inner| !inner.is::<Error>()));
    }

    #[test]
    fn test_missing_embedded_path_does_not_fall_back() {
        let vfs = overlay();
        let missing = Path::new("/embedded/a/none.txt");
        for err in [
            vfs.read_file_sync(missing).unwrap_err(),
            vfs.stat_sync(missing).unwrap_err(),
            vfs.open_sync(missing).unwrap_err(),
            vfs.access_sync(missing).unwrap_err(),
            vfs.read_dir_sync(Path::new("/embedded/zzz")).unwrap_err(),
        ] {
            assert_eq!(err.kind(), io::ErrorKind::NotFound);
        }
        assert!(!vfs.exists_sync(missing));
    }

    #[test]
    fn test_read_dir_on_embedded_file() {
        let vfs = overlay();
        let err = vfs.read_dir_sync(Path::new("/embedded/a/d.txt")).unwrap_err();
        let inner = err.get_ref().and_then(|e| e.downcast_ref::<Error>());
        assert_eq!(inner.and_then(Error::code), Some("ENOTDIR"));
    }

    #[test]
    fn test_cursor_reads_reconstitute_file() {
        let vfs = overlay();
        let fd = vfs.open_sync(Path::new("/embedded/a/b/c.txt")).unwrap();
        assert!(fd.0 >= SYNTHETIC_FD_BASE);

        let mut first = [0u8; 3];
        let mut second = [0u8; 3];
        assert_eq!(vfs.read_sync(fd, &mut first, None).unwrap(), 3);
        assert_eq!(vfs.read_sync(fd, &mut second, None).unwrap(), 2);
        let mut all = first.to_vec();
        all.extend_from_slice(&second[..2]);
        assert_eq!(all, b"hello");
        assert_eq!(vfs.read_sync(fd, &mut first, None).unwrap(), 0);
    }

    fn file_backed(dir: &TempDir) -> (PathBuf, Vec<u8>, Overlay<StdFs>) {
        let mut tree = WritableTree::new();
        tree.write_file("/m/f.txt", &b"abcdefgh"[..]).unwrap();
        let image = assemble(b"RT", "/m/f.txt", tree).unwrap();
        let path = dir.path().join("app");
        fs::write(&path, &image).unwrap();
        let (_, tree) = Archive::open(&path).unwrap().into_parts();
        (path, image, Overlay::new("/embedded", Arc::new(tree), StdFs::new()))
    }

    fn truncate(path: &Path, len: u64) {
        fs::OpenOptions::new().write(true).open(path).unwrap().set_len(len).unwrap();
    }

    #[test]
    fn test_failed_read_gives_back_cursor() {
        let tmp = TempDir::new().unwrap();
        let (path, image, vfs) = file_backed(&tmp);
        let fd = vfs.open_sync(Path::new("/embedded/m/f.txt")).unwrap();

        truncate(&path, 4);
        let mut buf = [0u8; 4];
        let err = vfs.read_sync(fd, &mut buf, None).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);

        fs::write(&path, &image).unwrap();
        assert_eq!(vfs.read_sync(fd, &mut buf, None).unwrap(), 4);
        assert_eq!(&buf, b"abcd");
        assert_eq!(vfs.read_sync(fd, &mut buf, None).unwrap(), 4);
        assert_eq!(&buf, b"efgh");
    }

    #[tokio::test]
    async fn test_failed_async_read_gives_back_cursor() {
        let tmp = TempDir::new().unwrap();
        let (path, image, vfs) = file_backed(&tmp);
        let fd = vfs.open(Path::new("/embedded/m/f.txt")).await.unwrap();

        let mut buf = [0u8; 3];
        assert_eq!(vfs.read(fd, &mut buf, None).await.unwrap(), 3);
        truncate(&path, 4);
        let err = vfs.read(fd, &mut buf, None).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);

        fs::write(&path, &image).unwrap();
        assert_eq!(vfs.read(fd, &mut buf, None).await.unwrap(), 3);
        assert_eq!(&buf, b"def");
    }

    #[test]
    fn test_positioned_read_keeps_cursor() {
        let vfs = overlay();
        let fd = vfs.open_sync(Path::new("/embedded/a/d.txt")).unwrap();
        let mut buf = [0u8; 2];
        assert_eq!(vfs.read_sync(fd, &mut buf, Some(3)).unwrap(), 2);
        assert_eq!(&buf, b"ld");
        assert_eq!(vfs.read_sync(fd, &mut buf, None).unwrap(), 2);
        assert_eq!(&buf, b"wo");
        assert_eq!(vfs.fstat_sync(fd).unwrap().size, 5);
    }

    #[test]
    fn test_close_releases_descriptor() {
        let vfs = overlay();
        let fd = vfs.open_sync(Path::new("/embedded/a/d.txt")).unwrap();
        assert_eq!(vfs.open_descriptors(), 1);
        vfs.close_sync(fd).unwrap();
        assert_eq!(vfs.open_descriptors(), 0);
        // Now unknown to the overlay, so the host rejects it
        assert!(vfs.close_sync(fd).is_err());
        let mut buf = [0u8; 1];
        assert!(vfs.read_sync(fd, &mut buf, None).is_err());
    }

    #[test]
    fn test_mutations_under_mount_are_refused() {
        let vfs = overlay();
        let inside = Path::new("/embedded/a/d.txt");
        let results = [
            vfs.write_file_sync(inside, b"x"),
            vfs.create_dir_sync(Path::new("/embedded/new")),
            vfs.remove_file_sync(inside),
            vfs.remove_dir_sync(Path::new("/embedded/a/b")),
            vfs.rename_sync(inside, Path::new("/tmp/elsewhere.txt")),
            vfs.rename_sync(Path::new("/tmp/elsewhere.txt"), inside),
        ];
        for result in results {
            assert_eq!(result.unwrap_err().kind(), io::ErrorKind::Unsupported);
        }
        assert_eq!(vfs.read_file_sync(inside).unwrap(), b"world");
    }

    #[cfg(unix)]
    #[test]
    fn test_realpath_maps_back_to_mount() {
        let vfs = overlay();
        assert_eq!(
            vfs.realpath_sync(Path::new("/embedded/a/./b/../d.txt")).unwrap(),
            PathBuf::from("/embedded/a/d.txt")
        );
        assert!(vfs.lstat_sync(Path::new("/embedded/a")).unwrap().is_dir);
    }

    #[tokio::test]
    async fn test_async_variants() {
        let vfs = overlay();
        assert_eq!(vfs.read_file(Path::new("/embedded/a/d.txt")).await.unwrap(), b"world");
        assert!(vfs.exists(Path::new("/embedded/a/b/c.txt")).await);
        assert!(vfs.stat(Path::new("/embedded/a")).await.unwrap().is_dir);

        let fd = vfs.open(Path::new("/embedded/a/b/c.txt")).await.unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(vfs.read(fd, &mut buf, None).await.unwrap(), 4);
        assert_eq!(&buf, b"hell");
        assert_eq!(vfs.read(fd, &mut buf, None).await.unwrap(), 1);
        assert_eq!(buf[0], b'o');
        vfs.close(fd).await.unwrap();

        let err = vfs.write_file(Path::new("/embedded/a/d.txt"), b"x").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
    }

    #[tokio::test]
    async fn test_async_passthrough() {
        let tmp = TempDir::new().unwrap();
        let outside = tmp.path().join("host.txt");
        fs::write(&outside, b"host bytes").unwrap();

        let vfs = overlay();
        let fd = vfs.open(&outside).await.unwrap();
        assert!(fd.0 < SYNTHETIC_FD_BASE);
        let mut buf = [0u8; 4];
        assert_eq!(vfs.read(fd, &mut buf, Some(5)).await.unwrap(), 4);
        assert_eq!(&buf, b"byte");
        vfs.close(fd).await.unwrap();
        assert_eq!(vfs.read_dir(tmp.path()).await.unwrap(), vec!["host.txt"]);
    }
}
