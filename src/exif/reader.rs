use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDateTime};
use image::DynamicImage;
use std::path::Path;

use ::exif::Tag;

use super::container::{read_blocks, MetadataBlocks};
use super::view::ExifView;

/// EXIF date format: `YYYY:MM:DD HH:MM:SS`.
const EXIF_DATE_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

const IPTC_MARKER: u8 = 0x1C;
const IPTC_RECORD_APPLICATION: u8 = 0x02;
const IPTC_CAPTION_DATASET: u8 = 0x78; // 2:120 Caption/Abstract

/// Metadata resolved from a single image file.
#[derive(Debug, Clone, PartialEq)]
pub struct PhotoMetadata {
    pub caption: Option<String>,
    pub timestamp: Option<NaiveDateTime>,
    pub dimensions: (u32, u32),
    pub is_landscape: bool,
}

/// One place a caption can come from.
struct CaptionSource {
    name: &'static str,
    block: fn(&MetadataBlocks) -> Option<&[u8]>,
    extract: fn(&[u8]) -> Option<String>,
}

/// Caption sources in priority order. The first non-empty value wins.
const CAPTION_SOURCES: &[CaptionSource] = &[
    CaptionSource {
        name: "EXIF UserComment",
        block: MetadataBlocks::exif,
        extract: exif_user_comment,
    },
    CaptionSource {
        name: "IPTC Caption/Abstract",
        block: MetadataBlocks::iptc,
        extract: iptc_caption,
    },
    CaptionSource {
        name: "XMP dc:description",
        block: MetadataBlocks::xmp,
        extract: xmp_description,
    },
];

/// Read the caption from an image's metadata.
///
/// Checks EXIF UserComment, then IPTC Caption/Abstract, then XMP
/// dc:description. Unreadable files and malformed blocks yield `None`.
pub fn get_caption(path: &Path) -> Option<String> {
    match read_blocks(path) {
        Ok(blocks) => caption_from_blocks(&blocks),
        Err(e) => {
            log::debug!("No metadata blocks in {}: {e:#}", path.display());
            None
        }
    }
}

/// Run the caption source chain over already-extracted blocks.
pub fn caption_from_blocks(blocks: &MetadataBlocks) -> Option<String> {
    CAPTION_SOURCES.iter().find_map(|source| {
        let raw = (source.extract)((source.block)(blocks)?)?;
        let caption = decode_html_entities(&raw);
        let caption = caption.trim();
        if caption.is_empty() {
            return None;
        }
        log::debug!("Caption found in {}", source.name);
        Some(caption.to_string())
    })
}

/// Read the capture time of an image.
///
/// Tries DateTimeOriginal, DateTimeDigitized, then the IFD0 DateTime; falls
/// back to the file's modification time.
pub fn get_timestamp(path: &Path) -> Option<NaiveDateTime> {
    let view = read_blocks(path).ok().and_then(|b| b.exif_view());
    timestamp_from_view(view.as_ref()).or_else(|| file_modified_time(path))
}

/// Read the EXIF orientation (1–8). Absent or invalid values read as 1.
pub fn get_orientation(path: &Path) -> u16 {
    let view = read_blocks(path).ok().and_then(|b| b.exif_view());
    orientation_from_view(view.as_ref())
}

/// Pixel dimensions corrected for EXIF orientation.
pub fn get_dimensions(path: &Path) -> Option<(u32, u32)> {
    let (width, height) = match image::image_dimensions(path) {
        Ok(dims) => dims,
        Err(e) => {
            log::debug!("Could not read dimensions of {}: {e}", path.display());
            return None;
        }
    };
    Some(oriented_dimensions(width, height, get_orientation(path)))
}

/// Check if an image is wider than it is tall (after orientation correction).
pub fn is_landscape(path: &Path) -> bool {
    get_dimensions(path).is_some_and(|(w, h)| w > h)
}

/// Resolve caption, timestamp and dimensions with a single read of the file.
pub fn read_metadata(path: &Path) -> PhotoMetadata {
    let blocks = match read_blocks(path) {
        Ok(b) => b,
        Err(e) => {
            log::debug!("No metadata blocks in {}: {e:#}", path.display());
            MetadataBlocks::default()
        }
    };
    let view = blocks.exif_view();

    let caption = caption_from_blocks(&blocks);
    let timestamp = timestamp_from_view(view.as_ref()).or_else(|| file_modified_time(path));
    let dimensions = match image::image_dimensions(path) {
        Ok((w, h)) => oriented_dimensions(w, h, orientation_from_view(view.as_ref())),
        Err(e) => {
            log::debug!("Could not read dimensions of {}: {e}", path.display());
            (0, 0)
        }
    };

    PhotoMetadata {
        caption,
        timestamp,
        dimensions,
        is_landscape: dimensions.0 > dimensions.1,
    }
}

/// Decode an image with its EXIF orientation applied to the pixels.
pub fn open_upright(path: &Path) -> Result<DynamicImage> {
    let mut img = image::open(path)
        .with_context(|| format!("Failed to decode image: {}", path.display()))?;
    let orientation = get_orientation(path);
    if let Some(o) = image::metadata::Orientation::from_exif(orientation as u8) {
        img.apply_orientation(o);
    }
    Ok(img)
}

/// Orientations 5–8 are stored rotated by 90°, so width and height swap.
pub fn oriented_dimensions(width: u32, height: u32, orientation: u16) -> (u32, u32) {
    if (5..=8).contains(&orientation) {
        (height, width)
    } else {
        (width, height)
    }
}

fn orientation_from_view(view: Option<&ExifView>) -> u16 {
    view.and_then(|v| v.uint(Tag::Orientation))
        .and_then(|o| u16::try_from(o).ok())
        .filter(|o| (1..=8).contains(o))
        .unwrap_or(1)
}

fn timestamp_from_view(view: Option<&ExifView>) -> Option<NaiveDateTime> {
    let view = view?;
    [Tag::DateTimeOriginal, Tag::DateTimeDigitized, Tag::DateTime]
        .into_iter()
        .filter_map(|tag| view.ascii(tag))
        .find_map(|raw| NaiveDateTime::parse_from_str(&raw, EXIF_DATE_FORMAT).ok())
}

fn file_modified_time(path: &Path) -> Option<NaiveDateTime> {
    let modified = std::fs::metadata(path).and_then(|m| m.modified()).ok()?;
    Some(DateTime::<Local>::from(modified).naive_local())
}

/// Extract the UserComment from a raw EXIF (TIFF) block.
fn exif_user_comment(exif: &[u8]) -> Option<String> {
    let view = ExifView::parse(exif)?;
    let raw = view.bytes(Tag::UserComment)?;
    let text = decode_user_comment(&raw);
    if text.is_empty() { None } else { Some(text) }
}

/// Decode an EXIF UserComment, honouring its 8-byte character code prefix.
///
/// NUL characters and surrounding whitespace are removed from the result.
pub fn decode_user_comment(data: &[u8]) -> String {
    let decoded = match data.split_at_checked(8) {
        None => String::from_utf8_lossy(data).into_owned(),
        Some((b"UNICODE\0", rest)) => {
            // BOM-sniffed, little-endian when no BOM is present
            encoding_rs::UTF_16LE.decode(rest).0.into_owned()
        }
        Some((b"ASCII\0\0\0", rest)) => rest
            .iter()
            .filter(|b| b.is_ascii())
            .map(|&b| b as char)
            .collect(),
        Some((b"JIS\0\0\0\0\0", rest)) => encoding_rs::SHIFT_JIS
            .decode_without_bom_handling(rest)
            .0
            .into_owned(),
        Some(([0, 0, 0, 0, 0, 0, 0, 0], rest)) => String::from_utf8_lossy(rest).into_owned(),
        Some(_) => String::from_utf8_lossy(data).into_owned(),
    };
    decoded.replace('\0', "").trim().to_string()
}

/// Find the IPTC Caption/Abstract (2:120) in an IPTC-IIM dataset stream.
pub fn iptc_caption(data: &[u8]) -> Option<String> {
    let mut i = 0;
    while i + 4 < data.len() {
        if data[i] != IPTC_MARKER {
            i += 1;
            continue;
        }
        let record = data[i + 1];
        let dataset = data[i + 2];
        let size_byte = data[i + 3];

        let (size, data_start) = if size_byte & 0x80 != 0 {
            ((((size_byte & 0x7F) as usize) << 8) + data[i + 4] as usize, i + 5)
        } else {
            (size_byte as usize, i + 4)
        };
        let data_end = (data_start + size).min(data.len());

        if record == IPTC_RECORD_APPLICATION && dataset == IPTC_CAPTION_DATASET {
            let payload = &data[data_start.min(data.len())..data_end];
            let text = match std::str::from_utf8(payload) {
                Ok(s) => s.to_string(),
                Err(_) => payload.iter().map(|&b| b as char).collect(),
            };
            return Some(text.trim().to_string());
        }

        i = data_start + size;
    }
    None
}

/// Find the first non-empty `rdf:li` inside `dc:description` in an XMP packet.
pub fn xmp_description(data: &[u8]) -> Option<String> {
    let xmp = String::from_utf8_lossy(data);
    let start = xmp.find("<dc:description")?;
    let after_open = start + xmp[start..].find('>')? + 1;

    let mut rest = &xmp[after_open..];
    while let Some(li) = rest.find("<rdf:li") {
        let tag_end = li + rest[li..].find('>')? + 1;
        let body = &rest[tag_end..];
        let text_end = body.find('<').unwrap_or(body.len());
        let text = &body[..text_end];
        if !text.is_empty() && body[text_end..].starts_with("</rdf:li>") {
            return Some(text.trim().to_string());
        }
        rest = body;
    }
    None
}

/// Decode HTML character entities (`&amp;`, `&eacute;`, `&#39;`, `&#x2019;`, ...).
///
/// Unknown entities are left as they are. Decoding is a single pass, so
/// `&amp;amp;` becomes `&amp;`.
pub fn decode_html_entities(text: &str) -> String {
    html_escape::decode_html_entities(text).into_owned()
}
