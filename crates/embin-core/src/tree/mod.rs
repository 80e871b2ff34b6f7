//! Directory trees on both sides of the archive format.
//!
//! ## Header layout
//!
//! ```text
//! u16 dir_count
//! repeated { string name; u32 sub_header_len; [u8; sub_header_len] sub_header }
//! u16 file_count
//! repeated { string name; u32 content_offset; u32 content_length }
//! ```
//!
//! `string` is a u16 byte length followed by UTF-8 bytes. The writer and the
//! parser agree on this order exactly; there is no tolerance for reordering.

mod readable;
mod writable;

pub use readable::{FileEntry, ReadableTree, Stat};
pub use writable::{BuiltTree, DirId, WritableTree};
