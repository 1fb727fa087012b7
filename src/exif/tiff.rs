//! TIFF directory layout, for rewriting a block in place.
//!
//! Reading tag values goes through [`super::view::ExifView`]. This module only
//! locates directories and their entries so the writer can copy them.

use std::ops::Range;

pub const TAG_EXIF_IFD_POINTER: u16 = 0x8769;
pub const TAG_USER_COMMENT: u16 = 0x9286;

pub const FORMAT_BYTE: u16 = 1;
pub const FORMAT_ASCII: u16 = 2;
pub const FORMAT_SHORT: u16 = 3;
pub const FORMAT_LONG: u16 = 4;
pub const FORMAT_UNDEFINED: u16 = 7;

/// Byte order of a TIFF block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

impl Endian {
    /// Detect byte order from the TIFF header (`II*\0` or `MM\0*`).
    pub fn detect(data: &[u8]) -> Option<Self> {
        match data.get(0..4)? {
            [b'I', b'I', 0x2A, 0x00] => Some(Self::Little),
            [b'M', b'M', 0x00, 0x2A] => Some(Self::Big),
            _ => None,
        }
    }

    pub fn read_u16(self, data: &[u8], offset: usize) -> Option<u16> {
        let b: [u8; 2] = data.get(offset..offset.checked_add(2)?)?.try_into().ok()?;
        Some(match self {
            Self::Little => u16::from_le_bytes(b),
            Self::Big => u16::from_be_bytes(b),
        })
    }

    pub fn read_u32(self, data: &[u8], offset: usize) -> Option<u32> {
        let b: [u8; 4] = data.get(offset..offset.checked_add(4)?)?.try_into().ok()?;
        Some(match self {
            Self::Little => u32::from_le_bytes(b),
            Self::Big => u32::from_be_bytes(b),
        })
    }

    pub fn encode_u16(self, val: u16) -> [u8; 2] {
        match self {
            Self::Little => val.to_le_bytes(),
            Self::Big => val.to_be_bytes(),
        }
    }

    pub fn encode_u32(self, val: u32) -> [u8; 4] {
        match self {
            Self::Little => val.to_le_bytes(),
            Self::Big => val.to_be_bytes(),
        }
    }
}

/// Size in bytes of one value of the given TIFF field type.
pub fn format_size(format: u16) -> Option<usize> {
    match format {
        FORMAT_BYTE | FORMAT_ASCII | 6 | FORMAT_UNDEFINED => Some(1),
        FORMAT_SHORT | 8 => Some(2),
        FORMAT_LONG | 9 | 11 => Some(4),
        5 | 10 | 12 => Some(8),
        _ => None,
    }
}

/// Location of a directory inside a TIFF block.
#[derive(Debug, Clone)]
pub struct IfdLayout {
    pub offset: usize,
    pub tags: Vec<u16>,
    pub next: u32,
}

impl IfdLayout {
    pub fn entries_start(&self) -> usize {
        self.offset + 2
    }

    /// Offset just past the next-directory pointer.
    pub fn table_end(&self) -> usize {
        self.entries_start() + self.tags.len() * 12 + 4
    }

    pub fn position(&self, tag: u16) -> Option<usize> {
        self.tags.iter().position(|&t| t == tag)
    }

    /// Byte range of an entry's value when it is stored outside the entry.
    ///
    /// Values of unknown type are reported as an empty range at the offset
    /// the entry holds.
    pub fn external_value(
        &self,
        data: &[u8],
        endian: Endian,
        index: usize,
    ) -> Option<Range<usize>> {
        let eo = self.entries_start() + index * 12;
        let format = endian.read_u16(data, eo + 2)?;
        let count = endian.read_u32(data, eo + 4)? as usize;
        let size = format_size(format).and_then(|s| s.checked_mul(count));
        if size.is_some_and(|s| s <= 4) {
            return None;
        }
        let start = endian.read_u32(data, eo + 8)? as usize;
        Some(start..start.saturating_add(size.unwrap_or(0)))
    }
}

/// Read the entry table of the directory at `offset`.
pub fn read_ifd_layout(data: &[u8], endian: Endian, offset: usize) -> Option<IfdLayout> {
    let count = endian.read_u16(data, offset)? as usize;
    let start = offset + 2;
    let end = start.checked_add(count.checked_mul(12)?)?;
    let next = endian.read_u32(data, end)?;
    let tags = (0..count)
        .map(|i| endian.read_u16(data, start + i * 12))
        .collect::<Option<Vec<_>>>()?;
    Some(IfdLayout { offset, tags, next })
}


#[cfg(test)]
mod tests {
    use super::fixtures::{build, Entry};
    use super::*;

    const TAG_ORIENTATION: u16 = 0x0112;
    const TAG_DATE_TIME: u16 = 0x0132;

    #[test]
    fn detects_byte_order() {
        assert_eq!(Endian::detect(b"II\x2A\x00rest"), Some(Endian::Little));
        assert_eq!(Endian::detect(b"MM\x00\x2Arest"), Some(Endian::Big));
        assert_eq!(Endian::detect(b"XX\x00\x2A"), None);
        assert_eq!(Endian::detect(b"II"), None);
    }

    #[test]
    fn layout_of_ifd0() {
        let data = build(
            &[Entry::short(TAG_ORIENTATION, 6), Entry::ascii(TAG_DATE_TIME, "2023:05:01 10:00:00")],
            &[],
        );
        let ifd0 = read_ifd_layout(&data, Endian::Little, 8).unwrap();
        assert_eq!(ifd0.tags, [TAG_ORIENTATION, TAG_DATE_TIME]);
        assert_eq!(ifd0.next, 0);
        assert_eq!(ifd0.table_end(), 8 + 2 + 2 * 12 + 4);
        assert_eq!(ifd0.position(TAG_DATE_TIME), Some(1));
        assert_eq!(ifd0.position(TAG_USER_COMMENT), None);
    }

    #[test]
    fn external_values_are_located() {
        let data = build(
            &[Entry::short(TAG_ORIENTATION, 6), Entry::ascii(TAG_DATE_TIME, "2023:05:01 10:00:00")],
            &[],
        );
        let ifd0 = read_ifd_layout(&data, Endian::Little, 8).unwrap();
        assert_eq!(ifd0.external_value(&data, Endian::Little, 0), None);

        let range = ifd0.external_value(&data, Endian::Little, 1).unwrap();
        assert_eq!(range.start, ifd0.table_end());
        assert_eq!(&data[range], b"2023:05:01 10:00:00\0");
    }

    #[test]
    fn exif_pointer_is_written_into_ifd0() {
        let data = build(&[], &[Entry::undefined(TAG_USER_COMMENT, b"ASCII\0\0\0hello")]);
        let ifd0 = read_ifd_layout(&data, Endian::Little, 8).unwrap();
        let slot = ifd0.position(TAG_EXIF_IFD_POINTER).unwrap();
        let offset = Endian::Little.read_u32(&data, ifd0.entries_start() + slot * 12 + 8).unwrap();
        let exif = read_ifd_layout(&data, Endian::Little, offset as usize).unwrap();
        assert_eq!(exif.tags, [TAG_USER_COMMENT]);
    }

    #[test]
    fn truncated_directory_is_rejected() {
        let data = build(&[Entry::short(TAG_ORIENTATION, 1)], &[]);
        assert!(read_ifd_layout(&data[..12], Endian::Little, 8).is_none());
        assert!(read_ifd_layout(&data, Endian::Little, 4096).is_none());
    }
}
