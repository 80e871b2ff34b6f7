//! Synthetic descriptors for embedded files.

use super::host::Fd;
use std::collections::HashMap;

/// First synthetic descriptor number.
///
/// Chosen far above anything a host hands out so the two ranges never meet.
pub const SYNTHETIC_FD_BASE: u64 = 1 << 30;

#[derive(Debug)]
pub(crate) struct OpenFile {
    pub(crate) path: String,
    pub(crate) cursor: u64,
}

impl OpenFile {
    /// Claims the next read at the cursor.
    ///
    /// The cursor advances by the clamped length immediately, so reads issued
    /// back to back observe consecutive ranges whatever order they finish in.
    /// Returns the start of the claimed range and its clamped length.
    pub(crate) fn reserve(&mut self, len: u64, size: u64) -> (u64, u64) {
        let start = self.cursor;
        let claimed = len.min(size.saturating_sub(start));
        self.cursor += claimed;
        (start, claimed)
    }

    /// Gives back a claim whose read failed.
    ///
    /// Only the most recent claim can be returned; once a later read has
    /// claimed past it the cursor stays where it is.
    pub(crate) fn release(&mut self, start: u64, claimed: u64) {
        if self.cursor == start + claimed {
            self.cursor = start;
        }
    }
}

/// Open embedded files keyed by synthetic descriptor
#[derive(Debug)]
pub(crate) struct DescriptorTable {
    next: u64,
    open: HashMap<Fd, OpenFile>,
}

impl DescriptorTable {
    pub(crate) fn new() -> Self {
        Self {
            next: SYNTHETIC_FD_BASE,
            open: HashMap::new(),
        }
    }

    pub(crate) fn open(&mut self, path: String) -> Fd {
        let fd = Fd(self.next);
        self.next += 1;
        self.open.insert(fd, OpenFile { path, cursor: 0 });
        fd
    }

    /// Returns false if `fd` was not issued by this table
    pub(crate) fn close(&mut self, fd: Fd) -> bool {
        self.open.remove(&fd).is_some()
    }

    pub(crate) fn get(&self, fd: Fd) -> Option<&OpenFile> {
        self.open.get(&fd)
    }

    pub(crate) fn get_mut(&mut self, fd: Fd) -> Option<&mut OpenFile> {
        self.open.get_mut(&fd)
    }

    pub(crate) fn len(&self) -> usize {
        self.open.len()
    }
}
