//! Runtime context for code running inside a packaged executable.
//!
//! A [`Runtime`] is created once during an explicit initialization step,
//! typically from the current executable, and handed to whatever needs the
//! embedded tree. There is no hidden process-wide singleton.
//!
//! ```no_run
//! use embin_core::{Runtime, RuntimeConfig, StdFs};
//!
//! let runtime = Runtime::from_current_exe(RuntimeConfig::from_env())?;
//! let source = runtime.read_to_string_sync(runtime.main_entry_path())?;
//! let overlay = runtime.mount_overlay("/app", StdFs::new());
//! # let _ = (source, overlay);
//! # Ok::<(), embin_core::Error>(())
//! ```

use crate::archive::Archive;
use crate::error::{Error, Result};
use crate::overlay::{HostFs, Overlay};
use crate::tree::{ReadableTree, Stat};
use bytes::Bytes;
use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Default environment variable that enables bypass mode
pub const BYPASS_VAR: &str = "EMBIN_BYPASS";

/// Configuration for a [`Runtime`]
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Environment variable consulted for bypass mode
    pub bypass_var: String,
    /// When set, the executable behaves as a plain runtime invocation
    pub bypass: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            bypass_var: BYPASS_VAR.to_string(),
            bypass: false,
        }
    }
}

impl RuntimeConfig {
    /// Creates a config with bypass disabled
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a config with bypass read from [`BYPASS_VAR`]
    pub fn from_env() -> Self {
        let config = Self::default();
        let bypass = config.bypass_requested();
        config.bypass(bypass)
    }

    /// Sets the bypass variable name
    pub fn bypass_var(mut self, name: impl Into<String>) -> Self {
        self.bypass_var = name.into();
        self
    }

    /// Sets bypass mode explicitly
    pub fn bypass(mut self, bypass: bool) -> Self {
        self.bypass = bypass;
        self
    }

    /// Returns true if the bypass variable holds a truthy value
    pub fn bypass_requested(&self) -> bool {
        env::var(&self.bypass_var).map_or(false, |v| is_truthy(&v))
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Parsed archive state for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct Runtime {
    entry_path: String,
    tree: Arc<ReadableTree>,
    config: RuntimeConfig,
}

impl Runtime {
    /// Loads the archive appended to the running executable.
    ///
    /// A [`Error::MalformedArchive`] here means the executable is corrupted;
    /// callers should abort start-up.
    pub fn from_current_exe(config: RuntimeConfig) -> Result<Self> {
        let exe = env::current_exe().map_err(|e| Error::file_read(PathBuf::from("<current exe>"), e))?;
        Self::from_path(&exe, config)
    }

    /// Loads the archive appended to the file at `path`
    pub fn from_path(path: &Path, config: RuntimeConfig) -> Result<Self> {
        Ok(Self::from_archive(Archive::open(path)?, config))
    }

    /// Wraps an already loaded archive
    pub fn from_archive(archive: Archive, config: RuntimeConfig) -> Self {
        let (entry_path, tree) = archive.into_parts();
        debug!("Runtime initialized with entry '{}'", entry_path);
        Self {
            entry_path,
            tree: Arc::new(tree),
            config,
        }
    }

    /// Path of the entry file within the archive
    pub fn main_entry_path(&self) -> &str {
        &self.entry_path
    }

    /// Returns true when bypass mode is active
    pub fn is_bypassed(&self) -> bool {
        self.config.bypass
    }

    /// The embedded tree
    pub fn tree(&self) -> &ReadableTree {
        &self.tree
    }

    /// Returns true if `path` exists in the archive
    pub fn exists_sync(&self, path: &str) -> bool {
        self.tree.exists(path)
    }

    /// Stats `path`; missing paths yield the all-false default
    pub fn stat_sync(&self, path: &str) -> Stat {
        self.tree.stat(path)
    }

    /// Lists the directory at `path`
    pub fn read_dir_sync(&self, path: &str) -> Result<Vec<String>> {
        self.tree.read_dir(path)
    }

    /// Reads the whole file at `path`
    pub async fn read_file(&self, path: &str) -> Result<Bytes> {
        self.tree.read_file(path, 0, None).await
    }

    /// Reads `length` bytes (default: the rest) at `offset` of the file at `path`
    pub async fn read_file_range(&self, path: &str, offset: u64, length: Option<u64>) -> Result<Bytes> {
        self.tree.read_file(path, offset, length).await
    }

    /// Blocking read of the whole file at `path`
    pub fn read_file_sync(&self, path: &str) -> Result<Bytes> {
        self.tree.read_file_sync(path, 0, None)
    }

    /// Blocking ranged read
    pub fn read_file_range_sync(&self, path: &str, offset: u64, length: Option<u64>) -> Result<Bytes> {
        self.tree.read_file_sync(path, offset, length)
    }

    /// Reads the file at `path` as UTF-8
    pub async fn read_to_string(&self, path: &str) -> Result<String> {
        into_string(path, self.read_file(path).await?)
    }

    /// Blocking read of the file at `path` as UTF-8
    pub fn read_to_string_sync(&self, path: &str) -> Result<String> {
        into_string(path, self.read_file_sync(path)?)
    }

    /// Serves `prefix` from the embedded tree on top of `host`
    pub fn mount_overlay<H: HostFs>(&self, prefix: impl AsRef<Path>, host: H) -> Overlay<H> {
        Overlay::new(prefix, Arc::clone(&self.tree), host)
    }

    /// Inserts the entry path as the first argument after the program name.
    ///
    /// In bypass mode the arguments are returned unchanged.
    pub fn splice_args<I>(&self, args: I) -> Vec<OsString>
    where
        I: IntoIterator,
        I::Item: Into<OsString>,
    {
        let mut args: Vec<OsString> = args.into_iter().map(Into::into).collect();
        if !self.config.bypass {
            let at = args.len().min(1);
            args.insert(at, OsString::from(&self.entry_path));
        }
        args
    }
}

fn into_string(path: &str, bytes: Bytes) -> Result<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, format!("{}: {}", path, e))))
}
