//! Builder interface used at packaging time.
//!
//! A [`Packager`] accumulates files into a [`WritableTree`] and appends the
//! result to a copy of the configured runtime executable.
//!
//! ```no_run
//! use embin_core::{Packager, PackagerConfig};
//!
//! let config = PackagerConfig::new("./runtime/node", "/app/main.js");
//! let mut packager = Packager::new(config);
//! packager.write_file("/app/main.js", &b"console.log('hi')"[..])?;
//! packager.write_files("app/lib/**/*.js")?;
//! packager.build_to_path("./dist/app")?;
//! # Ok::<(), embin_core::Error>(())
//! ```

use crate::archive;
use crate::error::{Error, Result};
use crate::path;
use crate::tree::WritableTree;
use bytes::Bytes;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace};
use walkdir::WalkDir;

/// Configuration for a [`Packager`]
#[derive(Debug, Clone)]
pub struct PackagerConfig {
    /// Runtime executable the archive is appended to
    pub runtime_path: PathBuf,
    /// Path of the entry file within the archive
    pub entry_path: String,
    /// Archive directory that [`Packager::write_module`] places modules under
    pub modules_root: String,
    /// Mark the output of [`Packager::build_to_path`] as executable
    pub executable: bool,
}

impl PackagerConfig {
    /// Creates a config for `runtime_path` running `entry_path`
    pub fn new(runtime_path: impl Into<PathBuf>, entry_path: impl Into<String>) -> Self {
        Self {
            runtime_path: runtime_path.into(),
            entry_path: entry_path.into(),
            modules_root: "/node_modules".to_string(),
            executable: true,
        }
    }

    /// Sets the directory modules are placed under
    pub fn modules_root(mut self, root: impl Into<String>) -> Self {
        self.modules_root = root.into();
        self
    }

    /// Sets whether the output is marked executable
    pub fn executable(mut self, executable: bool) -> Self {
        self.executable = executable;
        self
    }
}

/// Accumulates files and produces the final executable image.
#[derive(Debug)]
pub struct Packager {
    config: PackagerConfig,
    tree: WritableTree,
}

impl Packager {
    /// Creates a packager with an empty tree
    pub fn new(config: PackagerConfig) -> Self {
        Self {
            config,
            tree: WritableTree::new(),
        }
    }

    /// The active configuration
    pub fn config(&self) -> &PackagerConfig {
        &self.config
    }

    /// Number of files written so far
    pub fn file_count(&self) -> usize {
        self.tree.file_count()
    }

    /// Writes `content` at `path` inside the archive
    pub fn write_file(&mut self, path: &str, content: impl Into<Bytes>) -> Result<()> {
        self.tree.write_file(path, content)
    }

    /// Copies a file from disk to `archive_path`
    pub fn write_file_from(&mut self, archive_path: &str, source: impl AsRef<Path>) -> Result<()> {
        let source = source.as_ref();
        let content = fs::read(source).map_err(|e| Error::file_read(source, e))?;
        self.write_file(archive_path, content)
    }

    /// Writes every file matched by `pattern`, keeping its matched path.
    ///
    /// Relative patterns are resolved against the working directory.
    /// Directories are skipped. Returns the number of files written.
    pub fn write_files(&mut self, pattern: &str) -> Result<usize> {
        let paths = glob::glob(pattern).map_err(|e| Error::Glob(e.to_string()))?;
        let mut count = 0;
        for entry in paths {
            let source = entry.map_err(|e| Error::Glob(e.to_string()))?;
            if !source.is_file() {
                trace!("Skipping non-file match {}", source.display());
                continue;
            }
            let archive_path = path::normalize(&path::host_str(&source));
            self.write_file_from(&archive_path, &source)?;
            count += 1;
        }
        debug!("Pattern '{}' matched {} files", pattern, count);
        Ok(count)
    }

    /// Copies every file below `dir` to `<modules_root>/<dir name>/...`.
    ///
    /// Returns the number of files written.
    pub fn write_module(&mut self, dir: impl AsRef<Path>) -> Result<usize> {
        let dir = dir.as_ref();
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::invalid_path(path::host_str(dir)))?;
        let prefix = format!("{}/{}", self.config.modules_root.trim_end_matches('/'), name);

        let mut count = 0;
        for entry in WalkDir::new(dir).follow_links(true) {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(dir).to_path_buf();
                Error::file_read(path, e.into())
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry.path().strip_prefix(dir).unwrap_or(entry.path());
            let archive_path = format!("{}/{}", prefix, path::host_str(relative));
            self.write_file_from(&archive_path, entry.path())?;
            count += 1;
        }
        debug!("Module '{}' contributed {} files under {}", name, count, prefix);
        Ok(count)
    }

    /// Produces the final image: runtime, entry path, header, content, footer
    pub fn build(self) -> Result<Vec<u8>> {
        let runtime_path = &self.config.runtime_path;
        let runtime = fs::read(runtime_path).map_err(|e| Error::file_read(runtime_path, e))?;
        archive::assemble(&runtime, &self.config.entry_path, self.tree)
    }

    /// Streams the final image to `output` and returns its size
    pub fn build_to_path(self, output: impl AsRef<Path>) -> Result<u64> {
        let output = output.as_ref();
        let runtime_path = &self.config.runtime_path;
        let mut runtime = File::open(runtime_path).map_err(|e| Error::file_read(runtime_path, e))?;
        let runtime_len = runtime
            .metadata()
            .map_err(|e| Error::file_read(runtime_path, e))?
            .len();

        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| Error::file_write(parent, e))?;
        }
        let mut out = File::create(output).map_err(|e| Error::file_write(output, e))?;
        let files = self.tree.file_count();
        let written = archive::assemble_to(
            &mut out,
            &mut runtime,
            runtime_len,
            &self.config.entry_path,
            self.tree,
        )?;

        if self.config.executable {
            mark_executable(output)?;
        }
        info!(
            "Wrote {} ({} bytes, {} embedded files)",
            output.display(),
            written,
            files
        );
        Ok(written)
    }
}

#[cfg(unix)]
fn mark_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
        .map_err(|e| Error::file_write(path, e))
}

#[cfg(not(unix))]
fn mark_executable(_path: &Path) -> Result<()> {
    Ok(())
}
