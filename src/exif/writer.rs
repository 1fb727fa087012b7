use anyhow::{Context, Result};
use img_parts::jpeg::Jpeg;
use img_parts::png::Png;
use img_parts::{Bytes, ImageEXIF};
use little_exif::exif_tag::ExifTag;
use little_exif::filetype::FileExtension;
use little_exif::metadata::Metadata;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::container::{ImageKind, EXIF_PREFIX};
use super::tiff::{
    read_ifd_layout, Endian, IfdLayout, FORMAT_LONG, FORMAT_UNDEFINED, TAG_EXIF_IFD_POINTER,
    TAG_USER_COMMENT,
};
use crate::error::Error;

/// Character code prefix for ASCII UserComments.
const ASCII_PREFIX: &[u8] = b"ASCII\0\0\0";

// little_exif as_u8_vec(JPEG) returns: [APP1 marker 2B][length 2B][Exif\0\0 6B][TIFF data]
// img-parts set_exif() expects just the TIFF data (after Exif\0\0)
const JPEG_EXIF_OVERHEAD: usize = 10; // 2 + 2 + 6

/// Serialises swaps of the process-wide panic hook.
static PANIC_HOOK: Mutex<()> = Mutex::new(());

/// Little-endian TIFF header with an empty IFD0.
const EMPTY_TIFF: &[u8] = &[
    b'I', b'I', 0x2A, 0x00, // byte order + magic
    0x08, 0x00, 0x00, 0x00, // IFD0 offset
    0x00, 0x00, // entry count
    0x00, 0x00, 0x00, 0x00, // next IFD
];

/// Encode a caption as an EXIF UserComment.
///
/// Always uses the ASCII character code. Characters outside ASCII are
/// replaced with `?`.
pub fn encode_user_comment(text: &str) -> Vec<u8> {
    let mut bytes = ASCII_PREFIX.to_vec();
    bytes.extend(text.chars().map(|c| if c.is_ascii() { c as u8 } else { b'?' }));
    bytes
}

/// Write a caption into the EXIF UserComment of an image, in place.
///
/// The container format is preserved and other metadata is kept. An empty
/// string clears the caption. IPTC and XMP blocks are never touched.
///
/// TIFF files (and PNG eXIf blocks) are rewritten by appending new copies of
/// IFD0 and the Exif sub-IFD. When the block already ends with directories
/// appended this way they are replaced, so repeated edits do not grow the
/// file; the first edit adds one directory pair plus the comment.
pub fn set_caption(path: &Path, text: &str) -> Result<()> {
    let kind = ImageKind::from_path(path)
        .ok_or_else(|| Error::UnsupportedFormat(path.display().to_string()))?;
    let comment = encode_user_comment(text);

    let written = match kind {
        ImageKind::Jpeg => write_jpeg(path, &comment),
        ImageKind::Png => write_png(path, &comment),
        ImageKind::Tiff => write_tiff(path, &comment),
    };
    written.context(Error::CaptionWrite(path.to_path_buf()))?;

    log::debug!("Caption written to {}", path.display());
    Ok(())
}

/// Load existing EXIF metadata from a file path using little_exif.
/// Returns None if it can't parse (instead of losing data).
fn load_existing_metadata(path: &Path) -> Option<Metadata> {
    let path_owned = path.to_path_buf();
    // Suppress panics from little_exif
    let result = {
        let _guard = panic_hook_lock();
        let prev_hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(|_| {}));
        let result = std::panic::catch_unwind(move || Metadata::new_from_path(&path_owned));
        std::panic::set_hook(prev_hook);
        result
    };

    match result {
        Ok(Ok(m)) => {
            if m.data().is_empty() {
                log::debug!("little_exif loaded empty metadata");
                None
            } else {
                log::debug!("little_exif loaded {} existing EXIF tags", m.data().len());
                Some(m)
            }
        }
        Ok(Err(e)) => {
            log::debug!("little_exif could not parse EXIF: {e}");
            None
        }
        Err(_) => {
            log::debug!("little_exif panicked parsing EXIF");
            None
        }
    }
}

fn panic_hook_lock() -> MutexGuard<'static, ()> {
    PANIC_HOOK.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Serialize little_exif metadata to a bare TIFF block.
fn tiff_from_metadata(metadata: &Metadata) -> Option<Vec<u8>> {
    let exif_bytes = metadata.as_u8_vec(FileExtension::JPEG);
    (exif_bytes.len() > JPEG_EXIF_OVERHEAD).then(|| exif_bytes[JPEG_EXIF_OVERHEAD..].to_vec())
}

/// Write the caption into a JPEG, preserving all other segments.
///
/// Strategy:
/// 1. Try to load existing EXIF with little_exif and merge the UserComment
/// 2. If little_exif can't parse, inject into the raw EXIF block
/// 3. With no EXIF at all, build a fresh block
fn write_jpeg(path: &Path, comment: &[u8]) -> Result<()> {
    let file_bytes = std::fs::read(path).context("Failed to read image file")?;
    let mut jpeg = Jpeg::from_bytes(Bytes::from(file_bytes))
        .map_err(|e| anyhow::anyhow!("Failed to parse JPEG: {e}"))?;

    // Remember where the EXIF segment was originally positioned
    let orig_exif_pos = find_exif_segment_pos(&jpeg);
    let original_exif = jpeg.exif().unwrap_or_default();

    let merged = load_existing_metadata(path).and_then(|mut metadata| {
        log::debug!("Using little_exif merge strategy");
        metadata.set_tag(ExifTag::UserComment(comment.to_vec()));
        tiff_from_metadata(&metadata)
    });
    let tiff_data = match merged {
        Some(tiff) => tiff,
        None if original_exif.is_empty() => {
            let mut metadata = Metadata::new();
            metadata.set_tag(ExifTag::UserComment(comment.to_vec()));
            match tiff_from_metadata(&metadata) {
                Some(tiff) => tiff,
                None => inject_user_comment(EMPTY_TIFF, comment)?,
            }
        }
        None => {
            log::debug!("Using raw TIFF injection to preserve original EXIF");
            inject_user_comment(&original_exif, comment)?
        }
    };

    jpeg.set_exif(Some(Bytes::from(tiff_data)));

    // set_exif() inserts at a fixed position, which may be after XMP APP1.
    // Move the EXIF segment back to where it was so EXIF comes first.
    if let Some(new_pos) = find_exif_segment_pos(&jpeg) {
        let target_pos = orig_exif_pos.unwrap_or(1); // default: right after APP0
        if target_pos < new_pos {
            let segments = jpeg.segments_mut();
            let seg = segments.remove(new_pos);
            segments.insert(target_pos, seg);
        }
    }

    let output = jpeg.encoder().bytes();
    std::fs::write(path, &output).context("Failed to write JPEG file")?;
    Ok(())
}

/// Write the caption into the eXIf chunk of a PNG.
fn write_png(path: &Path, comment: &[u8]) -> Result<()> {
    let file_bytes = std::fs::read(path).context("Failed to read image file")?;
    let mut png = Png::from_bytes(Bytes::from(file_bytes))
        .map_err(|e| anyhow::anyhow!("Failed to parse PNG: {e}"))?;

    let tiff_data = match png.exif() {
        Some(existing) => {
            let data: &[u8] = &existing;
            inject_user_comment(data.strip_prefix(EXIF_PREFIX).unwrap_or(data), comment)?
        }
        None => inject_user_comment(EMPTY_TIFF, comment)?,
    };
    png.set_exif(Some(Bytes::from(tiff_data)));

    let output = png.encoder().bytes();
    std::fs::write(path, &output).context("Failed to write PNG file")?;
    Ok(())
}

/// Write the caption into a TIFF file's own directories.
fn write_tiff(path: &Path, comment: &[u8]) -> Result<()> {
    let file_bytes = std::fs::read(path).context("Failed to read image file")?;
    let output = inject_user_comment(&file_bytes, comment)?;
    std::fs::write(path, &output).context("Failed to write TIFF file")?;
    Ok(())
}

/// Find the position of the EXIF APP1 segment in a JPEG.
fn find_exif_segment_pos(jpeg: &Jpeg) -> Option<usize> {
    jpeg.segments()
        .iter()
        .position(|s| s.marker() == 0xE1 && s.contents().starts_with(EXIF_PREFIX))
}

/// A directory entry to write, with its value already encoded in the
/// target byte order.
struct RawIfdEntry {
    tag: u16,
    format: u16,
    count: u32,
    data: Vec<u8>,
}

impl RawIfdEntry {
    fn undefined(tag: u16, data: &[u8]) -> Self {
        Self {
            tag,
            format: FORMAT_UNDEFINED,
            count: data.len() as u32,
            data: data.to_vec(),
        }
    }

    fn long(tag: u16, value: u32, endian: Endian) -> Self {
        Self {
            tag,
            format: FORMAT_LONG,
            count: 1,
            data: endian.encode_u32(value).to_vec(),
        }
    }
}

/// Set the UserComment in a raw TIFF block, building the Exif sub-IFD if
/// there is none.
///
/// The original bytes are left in place so every existing offset stays
/// valid. Rebuilt copies of the Exif sub-IFD and IFD0 are appended and the
/// header is pointed at the new IFD0. Copies left by an earlier call are cut
/// off first.
pub fn inject_user_comment(original: &[u8], comment: &[u8]) -> Result<Vec<u8>> {
    let endian = Endian::detect(original).context("Invalid TIFF byte order")?;
    let ifd0_offset = endian
        .read_u32(original, 4)
        .context("TIFF header too short")? as usize;
    let ifd0 = read_ifd_layout(original, endian, ifd0_offset)
        .context("IFD0 extends beyond TIFF data")?;

    let exif_ifd = ifd0
        .position(TAG_EXIF_IFD_POINTER)
        .and_then(|i| endian.read_u32(original, ifd0.entries_start() + i * 12 + 8))
        .and_then(|off| read_ifd_layout(original, endian, off as usize));
    if ifd0.position(TAG_EXIF_IFD_POINTER).is_some() && exif_ifd.is_none() {
        log::warn!("Exif sub-IFD is unreadable, replacing it");
    }

    let reusable = exif_ifd
        .as_ref()
        .and_then(|exif| appended_tail(original, endian, &ifd0, exif));
    let mut result = match reusable {
        Some(cut) => {
            log::debug!("Replacing directories appended at offset {cut}");
            original[..cut].to_vec()
        }
        None => original.to_vec(),
    };
    let exif_start = append_ifd(
        &mut result,
        original,
        endian,
        exif_ifd.as_ref(),
        vec![RawIfdEntry::undefined(TAG_USER_COMMENT, comment)],
    )?;
    let ifd0_start = append_ifd(
        &mut result,
        original,
        endian,
        Some(&ifd0),
        vec![RawIfdEntry::long(TAG_EXIF_IFD_POINTER, exif_start, endian)],
    )?;

    // Update TIFF header to point to new IFD0
    result[4..8].copy_from_slice(&endian.encode_u32(ifd0_start));
    Ok(result)
}

/// Start of an Exif sub-IFD, comment and IFD0 that sit at the very end of
/// the block in the order [`inject_user_comment`] appends them.
///
/// Returns `None` unless nothing else in the two directories points into
/// that tail, so cutting it off loses no data.
fn appended_tail(
    original: &[u8],
    endian: Endian,
    ifd0: &IfdLayout,
    exif: &IfdLayout,
) -> Option<usize> {
    let start = exif.offset;
    if start < 8 || ifd0.offset <= start || ifd0.table_end() != original.len() {
        return None;
    }

    let comment = exif.position(TAG_USER_COMMENT)?;
    let comment_end = match exif.external_value(original, endian, comment) {
        Some(range) if range.start >= exif.table_end() && range.start - exif.table_end() <= 1 => {
            range.end
        }
        Some(_) => return None,
        None => exif.table_end(),
    };
    // word-alignment padding only
    if ifd0.offset < comment_end || ifd0.offset - comment_end > 1 {
        return None;
    }

    let before_tail = |layout: &IfdLayout, skip: Option<usize>| {
        (layout.next == 0 || (layout.next as usize) < start)
            && (0..layout.tags.len())
                .filter(|&i| Some(i) != skip)
                .all(|i| {
                    layout
                        .external_value(original, endian, i)
                        .is_none_or(|range| range.end <= start)
                })
    };
    (before_tail(ifd0, None) && before_tail(exif, Some(comment))).then_some(start)
}

/// Append a copy of a directory with `updates` replacing or adding entries.
/// Entries are kept sorted by tag. Returns the offset of the new directory.
fn append_ifd(
    result: &mut Vec<u8>,
    original: &[u8],
    endian: Endian,
    existing: Option<&IfdLayout>,
    updates: Vec<RawIfdEntry>,
) -> Result<u32> {
    enum Slot<'a> {
        Kept(&'a [u8]),
        New(RawIfdEntry),
    }

    let mut slots: Vec<(u16, Slot)> = Vec::new();
    if let Some(layout) = existing {
        for (i, &tag) in layout.tags.iter().enumerate() {
            if updates.iter().any(|u| u.tag == tag) {
                continue;
            }
            let eo = layout.entries_start() + i * 12;
            slots.push((tag, Slot::Kept(&original[eo..eo + 12])));
        }
    }
    slots.extend(updates.into_iter().map(|u| (u.tag, Slot::New(u))));
    slots.sort_by_key(|(tag, _)| *tag);

    // IFDs start on a word boundary
    if result.len() % 2 != 0 {
        result.push(0);
    }
    let start = offset_of(result)?;
    result.extend_from_slice(&endian.encode_u16(slots.len() as u16));
    let table = result.len();
    result.resize(table + slots.len() * 12, 0);
    result.extend_from_slice(&endian.encode_u32(existing.map_or(0, |l| l.next)));

    for (i, (_, slot)) in slots.into_iter().enumerate() {
        let mut entry = [0u8; 12];
        match slot {
            Slot::Kept(raw) => entry.copy_from_slice(raw),
            Slot::New(new) => {
                entry[0..2].copy_from_slice(&endian.encode_u16(new.tag));
                entry[2..4].copy_from_slice(&endian.encode_u16(new.format));
                entry[4..8].copy_from_slice(&endian.encode_u32(new.count));
                if new.data.len() <= 4 {
                    entry[8..8 + new.data.len()].copy_from_slice(&new.data);
                } else {
                    if result.len() % 2 != 0 {
                        result.push(0);
                    }
                    entry[8..12].copy_from_slice(&endian.encode_u32(offset_of(result)?));
                    result.extend_from_slice(&new.data);
                }
            }
        }
        let off = table + i * 12;
        result[off..off + 12].copy_from_slice(&entry);
    }

    Ok(start)
}

fn offset_of(data: &[u8]) -> Result<u32> {
    u32::try_from(data.len()).context("TIFF data exceeds 4 GiB")
}

/// Test helper for TIFF files carrying extra IFD0 tags.
#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// Point a TIFF file at a copy of its IFD0 with `(tag, format, bytes)`
    /// entries added.
    pub fn add_ifd0_tags(path: &Path, tags: Vec<(u16, u16, Vec<u8>)>) {
        let original = std::fs::read(path).unwrap();
        let endian = Endian::detect(&original).unwrap();
        let offset = endian.read_u32(&original, 4).unwrap() as usize;
        let ifd0 = read_ifd_layout(&original, endian, offset).unwrap();
        let entries = tags
            .into_iter()
            .map(|(tag, format, data)| RawIfdEntry {
                tag,
                format,
                count: data.len() as u32,
                data,
            })
            .collect();

        let mut out = original.clone();
        let start = append_ifd(&mut out, &original, endian, Some(&ifd0), entries).unwrap();
        out[4..8].copy_from_slice(&endian.encode_u32(start));
        std::fs::write(path, out).unwrap();
    }
}
