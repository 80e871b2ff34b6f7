//! Fixed-size trailer locating the header and content regions.
//!
//! The footer is always the last [`FOOTER_LEN`] bytes of the archive, so a
//! reader can bootstrap from the end of an arbitrarily large file without any
//! other index. The record carries no version field.

use crate::codec::Reader;
use crate::error::{Error, Result};
use crate::pread;
use bytes::BufMut;
use std::fs::File;

/// Encoded size of a [`Footer`]
pub const FOOTER_LEN: usize = 16;

/// Locations of the header and content regions within the archive file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footer {
    /// Length of the entry path string plus the tree header
    pub header_length: u32,
    /// Absolute offset of the entry path string
    pub header_offset: u32,
    /// Length of the content pool
    pub content_length: u32,
    /// Absolute offset of the content pool
    pub content_offset: u32,
}

impl Footer {
    /// Encodes the footer as four big-endian u32 values
    pub fn encode(&self) -> [u8; FOOTER_LEN] {
        let mut out = [0u8; FOOTER_LEN];
        let mut buf = &mut out[..];
        buf.put_u32(self.header_length);
        buf.put_u32(self.header_offset);
        buf.put_u32(self.content_length);
        buf.put_u32(self.content_offset);
        out
    }

    /// Decodes a footer from exactly [`FOOTER_LEN`] bytes
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() != FOOTER_LEN {
            return Err(Error::malformed(format!(
                "footer must be {} bytes, got {}",
                FOOTER_LEN,
                data.len()
            )));
        }
        let mut reader = Reader::new(data);
        Ok(Self {
            header_length: reader.read_u32()?,
            header_offset: reader.read_u32()?,
            content_length: reader.read_u32()?,
            content_offset: reader.read_u32()?,
        })
    }

    /// Decodes the footer from the tail of a complete archive image
    pub fn from_tail(image: &[u8]) -> Result<Self> {
        let start = tail_offset(image.len() as u64)?;
        let footer = Self::decode(&image[start as usize..])?;
        footer.validate(image.len() as u64)?;
        Ok(footer)
    }

    /// Reads the footer from `file_size - 16` of an open archive
    pub fn read_from(file: &File, file_size: u64) -> Result<Self> {
        let start = tail_offset(file_size)?;
        let mut buf = [0u8; FOOTER_LEN];
        pread::read_exact_at(file, &mut buf, start).map_err(Error::Provider)?;
        let footer = Self::decode(&buf)?;
        footer.validate(file_size)?;
        Ok(footer)
    }

    /// Checks the recorded regions against the size of the archive
    pub fn validate(&self, file_size: u64) -> Result<()> {
        let header_end = u64::from(self.header_offset) + u64::from(self.header_length);
        if header_end != u64::from(self.content_offset) {
            return Err(Error::malformed(format!(
                "header ends at {} but content starts at {}",
                header_end, self.content_offset
            )));
        }
        let content_end = u64::from(self.content_offset) + u64::from(self.content_length);
        if content_end + FOOTER_LEN as u64 > file_size {
            return Err(Error::malformed(format!(
                "content region ends at {} beyond the {} byte archive",
                content_end, file_size
            )));
        }
        Ok(())
    }
}

fn tail_offset(file_size: u64) -> Result<u64> {
    file_size.checked_sub(FOOTER_LEN as u64).ok_or_else(|| {
        Error::malformed(format!(
            "file of {} bytes is too small to hold a footer",
            file_size
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> Footer {
        Footer {
            header_length: 0x0102,
            header_offset: 10,
            content_length: 5,
            content_offset: 10 + 0x0102,
        }
    }

    #[test]
    fn test_field_order() {
        let bytes = sample().encode();
        assert_eq!(bytes[..4], [0, 0, 0x01, 0x02]);
        assert_eq!(bytes[4..8], [0, 0, 0, 10]);
        assert_eq!(bytes[8..12], [0, 0, 0, 5]);
        assert_eq!(Footer::decode(&bytes).unwrap(), sample());
    }

    #[test]
    fn test_from_tail_with_varying_prefix() {
        for prefix in [0usize, 1, 4096, 70_001] {
            let footer = Footer {
                header_length: 4,
                header_offset: prefix as u32,
                content_length: 3,
                content_offset: prefix as u32 + 4,
            };
            let mut image = vec![0x7F; prefix];
            image.extend_from_slice(&[1, 2, 3, 4, 5, 6, 7]);
            image.extend_from_slice(&footer.encode());

            let decoded = Footer::from_tail(&image).unwrap();
            assert_eq!(decoded, footer);
            let start = decoded.content_offset as usize;
            assert_eq!(&image[start..start + 3], &[5, 6, 7]);
        }
    }

    #[test]
    fn test_too_small() {
        assert!(matches!(
            Footer::from_tail(&[0u8; 15]),
            Err(Error::MalformedArchive { .. })
        ));
    }

    #[test]
    fn test_inconsistent_regions() {
        let mut footer = sample();
        footer.content_offset += 1;
        assert!(footer.validate(4096).is_err());

        // Regions run past the end of the file
        assert!(sample().validate(100).is_err());
        assert!(sample().validate(10 + 0x0102 + 5 + 16).is_ok());
    }

    #[test]
    fn test_read_from_file() {
        use std::io::Write;

        let footer = Footer {
            header_length: 2,
            header_offset: 3,
            content_length: 1,
            content_offset: 5,
        };
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&[9, 9, 9, 0, 0, 42]).unwrap();
        tmp.write_all(&footer.encode()).unwrap();
        tmp.flush().unwrap();

        let file = File::open(tmp.path()).unwrap();
        let size = file.metadata().unwrap().len();
        assert_eq!(Footer::read_from(&file, size).unwrap(), footer);
    }
}
