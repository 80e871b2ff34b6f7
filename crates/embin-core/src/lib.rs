//! # embin-core
//!
//! A library for packaging a file tree into a single self-contained executable
//! and reading it back at run time.
//!
//! This crate provides the core functionality for:
//! - Serializing a directory tree into a compact header and a content pool
//! - Appending the archive to a copy of a runtime executable
//! - Locating and parsing the archive from the running executable
//! - Serving embedded files through ordinary file-system calls under a mount prefix
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`codec`] and [`footer`]: Fixed-width big-endian wire primitives
//! - [`tree`]: Write-side and read-side directory trees
//! - [`provider`]: Where the bytes of a read-side tree come from
//! - [`archive`]: Assembly and loading of the full image
//! - [`package`]: Build-time interface
//! - [`runtime`]: Run-time query interface
//! - [`overlay`]: Routing of host file operations into the embedded tree
//! - [`error`]: Error types and handling
//!
//! ## Example
//!
//! ```no_run
//! use embin_core::{Archive, Packager, PackagerConfig};
//!
//! // Package two files onto a runtime
//! let mut packager = Packager::new(PackagerConfig::new("./node", "/app/main.js"));
//! packager.write_file("/app/main.js", &b"require('./lib')"[..])?;
//! packager.write_file("/app/lib.js", &b"module.exports = 1"[..])?;
//! packager.build_to_path("./dist/app")?;
//!
//! // Read them back
//! let archive = Archive::open("./dist/app")?;
//! for name in archive.tree().read_dir("/app")? {
//!     println!("{}", name);
//! }
//! # Ok::<(), embin_core::Error>(())
//! ```
//!
//! ## Extensibility
//!
//! The library provides several traits for customization:
//!
//! - [`ContentProvider`]: Supply tree content from somewhere other than a file or buffer
//! - [`HostFs`]: Put an [`Overlay`] in front of any file-system implementation
//!

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod archive;
pub mod codec;
pub mod error;
pub mod footer;
pub mod overlay;
pub mod package;
pub mod path;
pub mod provider;
pub mod runtime;
pub mod tree;

mod pread;

// Re-export primary types for convenience
pub use archive::{assemble, assemble_to, Archive};
pub use error::{Error, Result};
pub use footer::{Footer, FOOTER_LEN};
pub use overlay::{Fd, FileStat, HostFs, Overlay, Route, Router, StdFs, SYNTHETIC_FD_BASE};
pub use package::{Packager, PackagerConfig};
pub use provider::{ContentProvider, FileProvider, MemoryProvider};
pub use runtime::{Runtime, RuntimeConfig, BYPASS_VAR};
pub use tree::{FileEntry, ReadableTree, Stat, WritableTree};

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
