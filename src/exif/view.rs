//! Tag lookups over a raw EXIF (TIFF) block, backed by kamadak-exif.
//!
//! Values come back as the bytes stored in the file so callers decide how to
//! interpret them. The UserComment charset prefix, for example, must survive
//! untouched.

use ::exif::{Context, Exif, Field, In, Reader, Tag, Value};

use super::tiff::Endian;

/// IPTC-NAA record stream stored in TIFF IFD0.
pub const TAG_IPTC_NAA: Tag = Tag(Context::Tiff, 0x83BB);
/// XMP packet stored in TIFF IFD0.
pub const TAG_XMP: Tag = Tag(Context::Tiff, 0x02BC);

/// Parsed fields of the primary image (IFD0 and its Exif sub-IFD).
pub struct ExifView {
    exif: Exif,
}

impl ExifView {
    /// Parse a raw TIFF block. Returns `None` if the header or IFD0 is unreadable.
    ///
    /// Entries that cannot be read (a value pointing outside the block, for
    /// instance) are dropped and the rest are kept.
    pub fn parse(data: &[u8]) -> Option<Self> {
        let parsed = Reader::new()
            .continue_on_error(true)
            .read_raw(data.to_vec())
            .or_else(|e| {
                e.distill_partial_result(|errors| {
                    for err in errors {
                        log::debug!("Skipping unreadable EXIF entry: {err}");
                    }
                })
            });
        match parsed {
            Ok(exif) => Some(Self { exif }),
            Err(e) => {
                log::debug!("Unreadable EXIF block: {e}");
                None
            }
        }
    }

    pub fn endian(&self) -> Endian {
        if self.exif.little_endian() {
            Endian::Little
        } else {
            Endian::Big
        }
    }

    fn field(&self, tag: Tag) -> Option<&Field> {
        self.exif.get_field(tag, In::PRIMARY)
    }

    /// Value bytes of a tag as stored in the block.
    ///
    /// Numeric values are re-encoded in the block's byte order.
    pub fn bytes(&self, tag: Tag) -> Option<Vec<u8>> {
        let endian = self.endian();
        match &self.field(tag)?.value {
            Value::Byte(v) | Value::Undefined(v, _) => Some(v.clone()),
            Value::Ascii(parts) => Some(parts.concat()),
            Value::Short(v) => Some(v.iter().flat_map(|n| endian.encode_u16(*n)).collect()),
            Value::Long(v) => Some(v.iter().flat_map(|n| endian.encode_u32(*n)).collect()),
            other => {
                log::debug!("EXIF tag {tag} has a non-byte value: {other:?}");
                None
            }
        }
    }

    /// First ASCII string of a tag, trimmed. Empty strings read as absent.
    pub fn ascii(&self, tag: Tag) -> Option<String> {
        let Value::Ascii(parts) = &self.field(tag)?.value else {
            return None;
        };
        parts
            .iter()
            .map(|p| String::from_utf8_lossy(p).trim().to_string())
            .find(|s| !s.is_empty())
    }

    /// First value of a BYTE, SHORT or LONG tag.
    pub fn uint(&self, tag: Tag) -> Option<u32> {
        self.field(tag)?.value.get_uint(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exif::tiff::fixtures::{build, Entry};
    use crate::exif::tiff::{FORMAT_BYTE, FORMAT_LONG, FORMAT_SHORT};

    #[test]
    fn reads_primary_and_exif_tags() {
        let data = build(
            &[
                Entry::short(Tag::Orientation.number(), 6),
                Entry::ascii(Tag::DateTime.number(), "2023:05:01 10:00:00"),
            ],
            &[Entry::ascii(Tag::DateTimeOriginal.number(), "2024:01:15 10:30:00")],
        );
        let view = ExifView::parse(&data).unwrap();
        assert_eq!(view.endian(), Endian::Little);
        assert_eq!(view.uint(Tag::Orientation), Some(6));
        assert_eq!(view.ascii(Tag::DateTime).as_deref(), Some("2023:05:01 10:00:00"));
        assert_eq!(
            view.ascii(Tag::DateTimeOriginal).as_deref(),
            Some("2024:01:15 10:30:00")
        );
        assert!(view.ascii(Tag::DateTimeDigitized).is_none());
    }

    #[test]
    fn keeps_undefined_bytes_verbatim() {
        let comment = b"ASCII\0\0\0hello";
        let data = build(&[], &[Entry::undefined(Tag::UserComment.number(), comment)]);
        let view = ExifView::parse(&data).unwrap();
        assert_eq!(view.bytes(Tag::UserComment).as_deref(), Some(&comment[..]));
    }

    #[test]
    fn reads_iptc_and_xmp_tags_from_ifd0() {
        let iptc = [&[0x1C, 0x02, 0x78, 0x06][..], b"Cellar"].concat();
        let xmp = b"<x:xmpmeta/>";
        let data = build(
            &[
                Entry { tag: TAG_XMP.number(), format: FORMAT_BYTE, bytes: xmp.to_vec() },
                Entry::undefined(TAG_IPTC_NAA.number(), &iptc),
            ],
            &[],
        );
        let view = ExifView::parse(&data).unwrap();
        assert_eq!(view.bytes(TAG_IPTC_NAA), Some(iptc));
        assert_eq!(view.bytes(TAG_XMP).as_deref(), Some(&xmp[..]));
    }

    #[test]
    fn long_values_keep_block_byte_order() {
        // Photoshop writes IPTC-NAA as LONG; the bytes must come back unchanged.
        let iptc = [0x1C, 0x02, 0x78, 0x03, b'A', b'B', b'C', 0x00];
        let data = build(
            &[Entry { tag: TAG_IPTC_NAA.number(), format: FORMAT_LONG, bytes: iptc.to_vec() }],
            &[],
        );
        let view = ExifView::parse(&data).unwrap();
        assert_eq!(view.bytes(TAG_IPTC_NAA).as_deref(), Some(&iptc[..]));
    }

    #[test]
    fn big_endian_short() {
        // MM header, IFD0 at 8 with one SHORT entry (orientation = 8)
        let mut data = b"MM\x00\x2A".to_vec();
        data.extend_from_slice(&8u32.to_be_bytes());
        data.extend_from_slice(&1u16.to_be_bytes());
        data.extend_from_slice(&Tag::Orientation.number().to_be_bytes());
        data.extend_from_slice(&FORMAT_SHORT.to_be_bytes());
        data.extend_from_slice(&1u32.to_be_bytes());
        data.extend_from_slice(&[0x00, 0x08, 0x00, 0x00]);
        data.extend_from_slice(&0u32.to_be_bytes());

        let view = ExifView::parse(&data).unwrap();
        assert_eq!(view.endian(), Endian::Big);
        assert_eq!(view.uint(Tag::Orientation), Some(8));
    }

    #[test]
    fn unreadable_blocks_yield_nothing() {
        let data = build(&[Entry::short(Tag::Orientation.number(), 3)], &[]);
        let truncated = ExifView::parse(&data[..10]);
        assert!(truncated.and_then(|v| v.uint(Tag::Orientation)).is_none());
        assert!(ExifView::parse(b"garbage").is_none());
        assert!(ExifView::parse(b"MM\x00\x2A\xFF\xFF\xFF\xFF").is_none());
    }

    #[test]
    fn out_of_range_value_is_skipped() {
        let mut data = build(
            &[
                Entry::short(Tag::Orientation.number(), 6),
                Entry::ascii(Tag::DateTime.number(), "2023:05:01 10:00:00"),
            ],
            &[],
        );
        // Second entry: point its value far past the end.
        let eo = 8 + 2 + 12;
        data[eo + 8..eo + 12].copy_from_slice(&0xFFFF_0000u32.to_le_bytes());
        let view = ExifView::parse(&data);
        assert!(view.as_ref().and_then(|v| v.ascii(Tag::DateTime)).is_none());
    }
}
