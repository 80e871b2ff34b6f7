//! Read-side directory tree parsed from a serialized header.
//!
//! Leaves hold only `(byte_offset, byte_length)` coordinates into the content
//! pool; bytes are fetched on demand through the tree's [`ContentProvider`].
//! Every path-taking operation goes through the same resolution helper, and
//! both read variants share the same clamping core.

use crate::codec::Reader;
use crate::error::{Error, Result};
use crate::path;
use crate::provider::ContentProvider;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Location of a file's bytes within the content pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileEntry {
    /// Offset from the start of the content pool
    pub byte_offset: u32,
    /// Number of bytes
    pub byte_length: u32,
}

impl FileEntry {
    /// Clamps a relative `(offset, length)` request to this entry.
    ///
    /// Returns the absolute pool offset and the number of bytes to read.
    pub fn span(&self, offset: u64, length: Option<u64>) -> (u64, u64) {
        let start = u64::from(self.byte_offset);
        let size = u64::from(self.byte_length);
        let end = start + size;
        let absolute = start.saturating_add(offset).min(end);
        let length = length.unwrap_or(size).min(size).min(end - absolute);
        (absolute, length)
    }
}

/// Result of a stat against the embedded tree.
///
/// Missing entries yield the all-false default rather than an error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stat {
    /// Entry is a file
    pub is_file: bool,
    /// Entry is a directory
    pub is_directory: bool,
    /// File size in bytes, zero for directories
    pub size: u64,
}

impl Stat {
    const DIRECTORY: Stat = Stat {
        is_file: false,
        is_directory: true,
        size: 0,
    };

    /// Returns true if the entry exists at all
    pub fn exists(&self) -> bool {
        self.is_file || self.is_directory
    }
}

/// Navigable, immutable view of an embedded directory tree.
#[derive(Debug, Clone)]
pub struct ReadableTree {
    directories: BTreeMap<String, ReadableTree>,
    files: BTreeMap<String, FileEntry>,
    provider: Arc<dyn ContentProvider>,
}

impl ReadableTree {
    /// Parses a header produced by [`WritableTree::build`](super::WritableTree::build)
    ///
    /// Directories are parsed with an explicit stack, so nesting depth is
    /// bounded by the header size only.
    pub fn from_buffer(header: &[u8], provider: Arc<dyn ContentProvider>) -> Result<Self> {
        let mut stack = vec![Frame::new(String::new(), Reader::new(header))?];

        while let Some(mut frame) = stack.pop() {
            if frame.pending > 0 {
                frame.pending -= 1;
                let name = frame.reader.read_string()?;
                let len = frame.reader.read_u32()? as usize;
                let sub = Reader::new(frame.reader.read_bytes(len)?);
                stack.push(frame);
                stack.push(Frame::new(name, sub)?);
                continue;
            }

            let files = Self::parse_files(&mut frame.reader)?;
            if !frame.reader.is_exhausted() {
                let details = if stack.is_empty() {
                    format!("{} trailing bytes after tree header", frame.reader.remaining())
                } else {
                    format!(
                        "directory '{}' header has {} trailing bytes",
                        frame.name,
                        frame.reader.remaining()
                    )
                };
                return Err(Error::malformed(details));
            }

            let tree = Self {
                directories: std::mem::take(&mut frame.directories),
                files,
                provider: Arc::clone(&provider),
            };
            match stack.last_mut() {
                Some(parent) => {
                    parent.directories.insert(frame.name, tree);
                }
                None => return Ok(tree),
            }
        }
        Err(Error::malformed("empty tree header"))
    }

    fn parse_files(reader: &mut Reader<'_>) -> Result<BTreeMap<String, FileEntry>> {
        let mut files = BTreeMap::new();
        let file_count = reader.read_u16()?;
        for _ in 0..file_count {
            let name = reader.read_string()?;
            let byte_offset = reader.read_u32()?;
            let byte_length = reader.read_u32()?;
            files.insert(
                name,
                FileEntry {
                    byte_offset,
                    byte_length,
                },
            );
        }
        Ok(files)
    }

    /// Returns the subdirectory `name`
    pub fn cd(&self, name: &str) -> Option<&ReadableTree> {
        self.directories.get(name)
    }

    /// Names of subdirectories followed by names of files
    pub fn ls(&self) -> Vec<&str> {
        self.directories
            .keys()
            .chain(self.files.keys())
            .map(String::as_str)
            .collect()
    }

    /// Returns the file entry `name`
    pub fn entry(&self, name: &str) -> Option<&FileEntry> {
        self.files.get(name)
    }

    /// Stats the child `name` of this directory
    pub fn stat_entry(&self, name: &str) -> Stat {
        let file = self.files.get(name);
        Stat {
            is_file: file.is_some(),
            is_directory: self.directories.contains_key(name),
            size: file.map_or(0, |f| u64::from(f.byte_length)),
        }
    }

    fn entry_span(&self, name: &str, offset: u64, length: Option<u64>) -> Result<(u64, u64)> {
        let entry = self.files.get(name).ok_or_else(|| Error::not_found(name))?;
        Ok(entry.span(offset, length))
    }

    /// Reads the file `name`, clamping the range to the entry's bounds
    pub async fn read(&self, name: &str, offset: u64, length: Option<u64>) -> Result<Bytes> {
        let (offset, length) = self.entry_span(name, offset, length)?;
        self.provider.read_contents(offset, length).await
    }

    /// Blocking equivalent of [`read`](Self::read)
    pub fn read_sync(&self, name: &str, offset: u64, length: Option<u64>) -> Result<Bytes> {
        let (offset, length) = self.entry_span(name, offset, length)?;
        self.provider.read_contents_sync(offset, length)
    }

    /// Splits `path` and walks all but its last segment.
    ///
    /// Returns the containing directory and the leaf name, or `None` when an
    /// intermediate directory is missing or the path names the root.
    pub fn resolve<'p>(&self, path: &'p str) -> Option<(&ReadableTree, &'p str)> {
        let parts = path::segments(path);
        let (leaf, dirs) = parts.split_last()?;
        let mut tree = self;
        for part in dirs {
            tree = tree.cd(part)?;
        }
        Some((tree, *leaf))
    }

    /// Returns the directory at `path`; the empty path names this tree
    pub fn directory(&self, path: &str) -> Option<&ReadableTree> {
        match self.resolve(path) {
            Some((parent, name)) => parent.cd(name),
            None if path::segments(path).is_empty() => Some(self),
            None => None,
        }
    }

    fn locate_file<'p>(&self, path: &'p str) -> Result<(&ReadableTree, &'p str)> {
        match self.resolve(path) {
            Some((dir, name)) if dir.files.contains_key(name) => Ok((dir, name)),
            _ => Err(Error::not_found(path)),
        }
    }

    /// Stats the entry at `path`
    pub fn stat(&self, path: &str) -> Stat {
        match self.resolve(path) {
            Some((dir, name)) => dir.stat_entry(name),
            None if path::segments(path).is_empty() => Stat::DIRECTORY,
            None => Stat::default(),
        }
    }

    /// Returns true if `path` names a file or directory
    pub fn exists(&self, path: &str) -> bool {
        self.stat(path).exists()
    }

    /// Lists the directory at `path`
    pub fn read_dir(&self, path: &str) -> Result<Vec<String>> {
        match self.directory(path) {
            Some(dir) => Ok(dir.ls().into_iter().map(str::to_owned).collect()),
            None if self.stat(path).is_file => Err(Error::not_a_directory(path)),
            None => Err(Error::not_found(path)),
        }
    }

    /// Reads `length` bytes (default: the rest) at `offset` of the file at `path`
    pub async fn read_file(&self, path: &str, offset: u64, length: Option<u64>) -> Result<Bytes> {
        let (dir, name) = self.locate_file(path)?;
        dir.read(name, offset, length).await
    }

    /// Blocking equivalent of [`read_file`](Self::read_file)
    pub fn read_file_sync(&self, path: &str, offset: u64, length: Option<u64>) -> Result<Bytes> {
        let (dir, name) = self.locate_file(path)?;
        dir.read_sync(name, offset, length)
    }

    /// Every file below this directory as `(path, entry)`, depth first
    pub fn files(&self) -> Vec<(String, FileEntry)> {
        let mut out = Vec::new();
        let mut stack = vec![(String::new(), self, false)];
        while let Some((prefix, dir, visited)) = stack.pop() {
            if visited {
                out.extend(
                    dir.files
                        .iter()
                        .map(|(name, entry)| (format!("{}/{}", prefix, name), *entry)),
                );
                continue;
            }
            stack.push((prefix.clone(), dir, true));
            for (name, child) in dir.directories.iter().rev() {
                stack.push((format!("{}/{}", prefix, name), child, false));
            }
        }
        out
    }
}

/// A directory whose header is still being read
struct Frame<'a> {
    name: String,
    reader: Reader<'a>,
    pending: u16,
    directories: BTreeMap<String, ReadableTree>,
}

impl<'a> Frame<'a> {
    fn new(name: String, mut reader: Reader<'a>) -> Result<Self> {
        let pending = reader.read_u16()?;
        Ok(Self {
            name,
            reader,
            pending,
            directories: BTreeMap::new(),
        })
    }
}

impl Drop for ReadableTree {
    // Flattens the subtree first so deep nesting does not recurse here
    fn drop(&mut self) {
        let mut pending: Vec<ReadableTree> = std::mem::take(&mut self.directories)
            .into_values()
            .collect();
        while let Some(mut dir) = pending.pop() {
            pending.extend(std::mem::take(&mut dir.directories).into_values());
        }
    }
}
