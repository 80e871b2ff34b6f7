//! Write-side directory tree.
//!
//! Directories live in an arena indexed by [`DirId`]; each node records its
//! parent handle so that file contents can bubble up to the single content
//! pool owned by the root, whatever the nesting depth.

use crate::codec::{encoded_len, write_string};
use crate::error::{Error, Result};
use crate::path;
use bytes::{BufMut, Bytes};
use std::collections::BTreeMap;
use tracing::{debug, trace};

/// Handle to a directory within a [`WritableTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DirId(usize);

/// Bump allocator over the root's content buffers.
#[derive(Debug, Default)]
struct ContentPool {
    buffers: Vec<Bytes>,
    length: u64,
}

impl ContentPool {
    /// Appends `bytes` and returns the offset they were stored at
    fn push(&mut self, bytes: Bytes) -> u64 {
        let offset = self.length;
        self.length += bytes.len() as u64;
        self.buffers.push(bytes);
        offset
    }

    fn concat(self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.length as usize);
        for buf in self.buffers {
            out.extend_from_slice(&buf);
        }
        out
    }
}

#[derive(Debug, Default)]
struct DirNode {
    parent: Option<DirId>,
    directories: BTreeMap<String, DirId>,
    files: BTreeMap<String, Bytes>,
    pool: ContentPool,
}

/// Serialized form of a [`WritableTree`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltTree {
    /// Directory structure with per-file offset and length
    pub header: Vec<u8>,
    /// Concatenated file bytes, addressed by the header's offsets
    pub content: Vec<u8>,
}

/// In-memory directory tree accumulated during packaging.
///
/// The tree is consumed by [`build`](Self::build); a fresh tree is needed for
/// every archive.
#[derive(Debug)]
pub struct WritableTree {
    nodes: Vec<DirNode>,
}

impl Default for WritableTree {
    fn default() -> Self {
        Self::new()
    }
}

impl WritableTree {
    /// Handle of the root directory
    pub const ROOT: DirId = DirId(0);

    /// Creates an empty tree
    pub fn new() -> Self {
        Self {
            nodes: vec![DirNode::default()],
        }
    }

    /// Inserts or overwrites the file `name` in `dir`
    pub fn write(&mut self, dir: DirId, name: impl Into<String>, bytes: impl Into<Bytes>) {
        self.nodes[dir.0].files.insert(name.into(), bytes.into());
    }

    /// Returns the child directory `name` of `dir`, creating it if absent
    pub fn cd(&mut self, dir: DirId, name: &str) -> DirId {
        if let Some(&child) = self.nodes[dir.0].directories.get(name) {
            return child;
        }
        let child = DirId(self.nodes.len());
        self.nodes.push(DirNode {
            parent: Some(dir),
            ..DirNode::default()
        });
        self.nodes[dir.0].directories.insert(name.to_string(), child);
        child
    }

    /// Writes a file at a `/`-separated path, creating intermediate directories
    pub fn write_file(&mut self, path: &str, bytes: impl Into<Bytes>) -> Result<()> {
        let parts = path::segments(path);
        let Some((name, dirs)) = parts.split_last() else {
            return Err(Error::invalid_path(path));
        };
        let mut dir = Self::ROOT;
        for part in dirs {
            dir = self.cd(dir, part);
        }
        trace!("Storing {}", path);
        self.write(dir, *name, bytes);
        Ok(())
    }

    /// Number of files across all directories
    pub fn file_count(&self) -> usize {
        self.nodes.iter().map(|n| n.files.len()).sum()
    }

    /// Serializes the tree into its header and content regions
    pub fn build(mut self) -> Result<BuiltTree> {
        let sizes = self.header_sizes()?;
        let header = self.serialize(&sizes)?;
        let pool = std::mem::take(&mut self.nodes[Self::ROOT.0].pool);
        if pool.length > u64::from(u32::MAX) {
            return Err(Error::too_large("content pool", pool.length));
        }
        debug!(
            "Built tree: {} header bytes, {} content bytes in {} files",
            header.len(),
            pool.length,
            pool.buffers.len()
        );
        Ok(BuiltTree {
            header,
            content: pool.concat(),
        })
    }

    /// Encoded header length of every directory.
    ///
    /// A child is always allocated after its parent, so walking the arena
    /// backwards sizes every child before the parent that embeds it.
    fn header_sizes(&self) -> Result<Vec<u64>> {
        let mut sizes = vec![0u64; self.nodes.len()];
        for (id, node) in self.nodes.iter().enumerate().rev() {
            check_count(node.directories.len())?;
            check_count(node.files.len())?;
            let dirs: u64 = node
                .directories
                .iter()
                .map(|(name, child)| (encoded_len(name) + 4) as u64 + sizes[child.0])
                .sum();
            let files: u64 = node
                .files
                .keys()
                .map(|name| (encoded_len(name) + 4 + 4) as u64)
                .sum();
            sizes[id] = 2 + dirs + 2 + files;
        }
        Ok(sizes)
    }

    /// Writes the header in a single pass with an explicit work stack.
    ///
    /// A directory's files follow all of its subdirectories in the layout,
    /// so contents reach the pool in post-order: children before parents.
    fn serialize(&mut self, sizes: &[u64]) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(sizes[Self::ROOT.0] as usize);
        let mut steps = vec![Step::Enter(Self::ROOT)];

        while let Some(step) = steps.pop() {
            match step {
                Step::Enter(dir) => {
                    let node = &mut self.nodes[dir.0];
                    let directories = std::mem::take(&mut node.directories);
                    let files = std::mem::take(&mut node.files);
                    buf.put_u16(directories.len() as u16);
                    steps.push(Step::Files(dir, files));
                    for (name, child) in directories.into_iter().rev() {
                        steps.push(Step::Enter(child));
                        steps.push(Step::Label(name, child));
                    }
                }
                Step::Label(name, child) => {
                    write_string(&mut buf, &name)?;
                    buf.put_u32(fit_u32("directory header", sizes[child.0])?);
                }
                Step::Files(dir, files) => {
                    buf.put_u16(files.len() as u16);
                    for (name, bytes) in files {
                        let length = fit_u32("file", bytes.len() as u64)?;
                        write_string(&mut buf, &name)?;
                        let offset = self.store(dir, bytes)?;
                        buf.put_u32(offset);
                        buf.put_u32(length);
                    }
                }
            }
        }

        debug_assert_eq!(buf.len() as u64, sizes[Self::ROOT.0]);
        Ok(buf)
    }

    /// Bubbles `bytes` up to the root's pool and returns their offset
    fn store(&mut self, dir: DirId, bytes: Bytes) -> Result<u32> {
        let mut current = dir;
        while let Some(parent) = self.nodes[current.0].parent {
            current = parent;
        }
        let offset = self.nodes[current.0].pool.push(bytes);
        fit_u32("content offset", offset)
    }
}

/// Pending work while writing the header
enum Step {
    /// Directory count, then the directory's children
    Enter(DirId),
    /// Name and sub-header length preceding a child's header
    Label(String, DirId),
    /// File count and entries closing a directory
    Files(DirId, BTreeMap<String, Bytes>),
}

fn check_count(count: usize) -> Result<()> {
    if count > u16::MAX as usize {
        return Err(Error::TooManyEntries { count });
    }
    Ok(())
}

fn fit_u32(what: &'static str, len: u64) -> Result<u32> {
    u32::try_from(len).map_err(|_| Error::too_large(what, len))
}
