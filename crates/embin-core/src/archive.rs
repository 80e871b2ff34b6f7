//! Archive assembly and loading.
//!
//! ## File layout
//!
//! ```text
//! [runtime executable][u16 len + UTF-8 entry path][tree header][tree content][footer]
//! ```
//!
//! The footer records `header_length = len(entry path string) + len(tree header)`,
//! `header_offset = len(runtime)`, `content_length = len(content)` and
//! `content_offset = header_offset + header_length`.

use crate::codec::{encode_string, Reader};
use crate::error::{Error, Result};
use crate::footer::Footer;
use crate::pread;
use crate::provider::{ContentProvider, FileProvider, MemoryProvider};
use crate::tree::{BuiltTree, ReadableTree, WritableTree};
use bytes::Bytes;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Computes the footer for a runtime of `runtime_len` bytes.
fn layout(runtime_len: u64, entry: &[u8], built: &BuiltTree) -> Result<Footer> {
    let fit = |what, len: u64| u32::try_from(len).map_err(|_| Error::too_large(what, len));

    let header_offset = fit("runtime executable", runtime_len)?;
    let header_length = fit("header", (entry.len() + built.header.len()) as u64)?;
    let content_length = fit("content", built.content.len() as u64)?;
    let content_offset = fit(
        "content offset",
        u64::from(header_offset) + u64::from(header_length),
    )?;
    fit(
        "archive",
        u64::from(content_offset) + u64::from(content_length),
    )?;

    Ok(Footer {
        header_length,
        header_offset,
        content_length,
        content_offset,
    })
}

/// Appends `tree` and `entry_path` to a copy of `runtime`.
pub fn assemble(runtime: &[u8], entry_path: &str, tree: WritableTree) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut source = runtime;
    assemble_to(&mut out, &mut source, runtime.len() as u64, entry_path, tree)?;
    Ok(out)
}

/// Streams an archive into `out`, copying exactly `runtime_len` bytes of runtime.
///
/// Returns the total number of bytes written.
pub fn assemble_to<W, R>(
    out: &mut W,
    runtime: &mut R,
    runtime_len: u64,
    entry_path: &str,
    tree: WritableTree,
) -> Result<u64>
where
    W: Write + ?Sized,
    R: Read + ?Sized,
{
    let entry = encode_string(entry_path)?;
    let built = tree.build()?;
    let footer = layout(runtime_len, &entry, &built)?;

    let copied = io::copy(&mut runtime.take(runtime_len), out)?;
    if copied != runtime_len {
        return Err(Error::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!(
                "runtime ended after {} of {} bytes",
                copied, runtime_len
            ),
        )));
    }
    out.write_all(&entry)?;
    out.write_all(&built.header)?;
    out.write_all(&built.content)?;
    out.write_all(&footer.encode())?;
    out.flush()?;

    debug!(
        "Assembled archive: runtime {} bytes, header {} bytes, content {} bytes",
        runtime_len, footer.header_length, footer.content_length
    );
    Ok(u64::from(footer.content_offset) + u64::from(footer.content_length) + 16)
}

/// A loaded archive: the entry path and the embedded tree.
#[derive(Debug, Clone)]
pub struct Archive {
    entry_path: String,
    tree: ReadableTree,
    footer: Footer,
}

impl Archive {
    /// Opens the archive appended to the file at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::file_read(path, e))?;
        debug!("Loading archive from {}", path.display());
        Self::from_file(file)
    }

    /// Loads the archive appended to an open file.
    ///
    /// The returned tree keeps the handle and reads content with positioned
    /// reads, so the file must stay in place for as long as the tree is used.
    pub fn from_file(file: File) -> Result<Self> {
        let size = file.metadata().map_err(Error::Provider)?.len();
        let footer = Footer::read_from(&file, size)?;

        let mut header = vec![0u8; footer.header_length as usize];
        pread::read_exact_at(&file, &mut header, u64::from(footer.header_offset))
            .map_err(Error::Provider)?;

        let provider = FileProvider::new(
            Arc::new(file),
            u64::from(footer.content_offset),
            u64::from(footer.content_length),
        );
        Self::parse(footer, &header, Arc::new(provider))
    }

    /// Loads an archive from a complete in-memory image
    pub fn from_bytes(image: impl Into<Bytes>) -> Result<Self> {
        let image: Bytes = image.into();
        let footer = Footer::from_tail(&image)?;

        let header_start = footer.header_offset as usize;
        let header = &image[header_start..header_start + footer.header_length as usize];
        let content_start = footer.content_offset as usize;
        let content = image.slice(content_start..content_start + footer.content_length as usize);

        Self::parse(footer, header, Arc::new(MemoryProvider::new(content)))
    }

    fn parse(footer: Footer, header: &[u8], provider: Arc<dyn ContentProvider>) -> Result<Self> {
        let mut reader = Reader::new(header);
        let entry_path = reader.read_string()?;
        let tree = ReadableTree::from_buffer(&header[reader.position()..], provider)?;
        debug!(
            "Archive entry '{}', {} content bytes",
            entry_path, footer.content_length
        );
        Ok(Self {
            entry_path,
            tree,
            footer,
        })
    }

    /// Path of the entry file within the archive
    pub fn entry_path(&self) -> &str {
        &self.entry_path
    }

    /// The embedded tree
    pub fn tree(&self) -> &ReadableTree {
        &self.tree
    }

    /// The decoded footer
    pub fn footer(&self) -> Footer {
        self.footer
    }

    /// Splits the archive into its entry path and tree
    pub fn into_parts(self) -> (String, ReadableTree) {
        (self.entry_path, self.tree)
    }
}
