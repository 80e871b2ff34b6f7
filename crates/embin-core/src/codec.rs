//! Byte-level codec shared by the header, footer and entry-path encodings.
//!
//! Integers are fixed-width big-endian. Strings are a 2-byte big-endian byte
//! length followed by the UTF-8 bytes.
//!
//! Writing goes through [`bytes::BufMut`], reading through the bounds-checked
//! [`Reader`] cursor. A truncated or garbled buffer always surfaces as
//! [`Error::MalformedArchive`], never as a panic.

use crate::error::{Error, Result};
use bytes::{Buf, BufMut};

/// Size of the string length prefix
pub const STRING_PREFIX_LEN: usize = 2;

/// Number of bytes `value` occupies once encoded.
pub fn encoded_len(value: &str) -> usize {
    STRING_PREFIX_LEN + value.len()
}

/// Writes a length-prefixed UTF-8 string.
///
/// Strings longer than 65535 bytes are rejected with
/// [`Error::StringTooLong`] rather than truncated.
pub fn write_string<B: BufMut>(buf: &mut B, value: &str) -> Result<()> {
    let len = u16::try_from(value.len()).map_err(|_| Error::StringTooLong { len: value.len() })?;
    buf.put_u16(len);
    buf.put_slice(value.as_bytes());
    Ok(())
}

/// Encodes a single string into a fresh buffer.
pub fn encode_string(value: &str) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(encoded_len(value));
    write_string(&mut buf, value)?;
    Ok(buf)
}

/// Reads a length-prefixed string at `offset`.
///
/// Returns the decoded value and the offset immediately after it.
pub fn read_string(data: &[u8], offset: usize) -> Result<(String, usize)> {
    let mut reader = Reader::at(data, offset)?;
    let value = reader.read_string()?;
    Ok((value, reader.position()))
}

/// Bounds-checked big-endian cursor over a byte slice.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Creates a reader positioned at the start of `data`
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Creates a reader positioned at `offset`
    pub fn at(data: &'a [u8], offset: usize) -> Result<Self> {
        if offset > data.len() {
            return Err(Error::malformed(format!(
                "offset {} is past the end of a {} byte buffer",
                offset,
                data.len()
            )));
        }
        Ok(Self { data, pos: offset })
    }

    /// Current offset into the underlying slice
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Returns true once every byte was consumed
    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(Error::malformed(format!(
                "unexpected end of data at offset {}: need {} bytes, {} left",
                self.pos,
                len,
                self.remaining()
            )));
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    /// Reads a big-endian u16
    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(self.take(2)?.get_u16())
    }

    /// Reads a big-endian u32
    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(self.take(4)?.get_u32())
    }

    /// Reads `len` raw bytes
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        self.take(len)
    }

    /// Reads a length-prefixed UTF-8 string
    pub fn read_string(&mut self) -> Result<String> {
        let start = self.pos;
        let len = self.read_u16()? as usize;
        let raw = self.take(len)?;
        std::str::from_utf8(raw)
            .map(str::to_owned)
            .map_err(|e| Error::malformed(format!("invalid UTF-8 string at offset {}: {}", start, e)))
    }
}
