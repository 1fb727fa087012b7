use anyhow::{Context, Result};
use img_parts::jpeg::{Jpeg, JpegSegment};
use img_parts::png::Png;
use img_parts::{Bytes, ImageEXIF};
use std::path::Path;

use super::view::{ExifView, TAG_IPTC_NAA, TAG_XMP};

/// Supported image extensions (lowercase, without the dot).
pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "tif", "tiff"];

pub(crate) const EXIF_PREFIX: &[u8] = b"Exif\0\0";
pub(crate) const XMP_HEADER: &[u8] = b"http://ns.adobe.com/xap/1.0/\0";
const IPTC_HEADER: &[u8] = b"Photoshop 3.0\0";
const IPTC_8BIM: &[u8] = b"8BIM";
const IPTC_RESOURCE_ID: u16 = 0x0404;
const XMP_KEYWORD: &[u8] = b"XML:com.adobe.xmp";

/// The container format of an image file, determined by its extension.
///
/// ```rust
/// use contact_sheet::exif::ImageKind;
/// use std::path::Path;
///
/// assert_eq!(ImageKind::from_path(Path::new("IMG_0001.JPG")), Some(ImageKind::Jpeg));
/// assert_eq!(ImageKind::from_path(Path::new("scan.tif")), Some(ImageKind::Tiff));
/// assert_eq!(ImageKind::from_path(Path::new("notes.txt")), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    /// JPEG: EXIF in APP1, XMP in APP1, IPTC in APP13
    Jpeg,
    /// PNG: EXIF in eXIf, XMP in iTXt
    Png,
    /// TIFF: the file itself is the EXIF block; IPTC and XMP are IFD0 tags
    Tiff,
}

impl ImageKind {
    /// Determine the image kind from a file path extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "tif" | "tiff" => Some(Self::Tiff),
            _ => None,
        }
    }
}

/// Check if a file has a supported image extension.
pub fn is_supported_image(path: &Path) -> bool {
    ImageKind::from_path(path).is_some()
}

/// Raw metadata blocks pulled out of one image file.
///
/// `exif` is a TIFF-structured block (starting with `II`/`MM`), `iptc` is the
/// IPTC-IIM dataset stream, `xmp` is the XMP packet text.
#[derive(Debug, Clone, Default)]
pub struct MetadataBlocks {
    pub exif: Option<Vec<u8>>,
    pub iptc: Option<Vec<u8>>,
    pub xmp: Option<Vec<u8>>,
}

impl MetadataBlocks {
    pub fn exif(&self) -> Option<&[u8]> {
        self.exif.as_deref()
    }

    pub fn iptc(&self) -> Option<&[u8]> {
        self.iptc.as_deref()
    }

    pub fn xmp(&self) -> Option<&[u8]> {
        self.xmp.as_deref()
    }

    /// Parsed numeric-tag view of the EXIF block, if it is readable.
    pub fn exif_view(&self) -> Option<ExifView> {
        self.exif().and_then(ExifView::parse)
    }
}

/// Read the raw EXIF, IPTC and XMP blocks of an image file.
pub fn read_blocks(path: &Path) -> Result<MetadataBlocks> {
    let kind = ImageKind::from_path(path)
        .with_context(|| format!("Unsupported image format: {}", path.display()))?;
    let bytes = std::fs::read(path).context("Failed to read image file")?;
    match kind {
        ImageKind::Jpeg => jpeg_blocks(bytes),
        ImageKind::Png => png_blocks(bytes),
        ImageKind::Tiff => Ok(tiff_blocks(bytes)),
    }
}

fn jpeg_blocks(bytes: Vec<u8>) -> Result<MetadataBlocks> {
    let jpeg = Jpeg::from_bytes(Bytes::from(bytes))
        .map_err(|e| anyhow::anyhow!("Failed to parse JPEG: {e}"))?;

    let exif = jpeg.exif().map(|b| b.to_vec());
    let xmp = jpeg
        .segments()
        .iter()
        .find(|s| is_xmp_segment(s))
        .map(|s| s.contents()[XMP_HEADER.len()..].to_vec());
    let iptc = jpeg
        .segments()
        .iter()
        .find(|s| s.marker() == 0xED && s.contents().starts_with(IPTC_HEADER))
        .and_then(|s| photoshop_resource(&s.contents()[IPTC_HEADER.len()..], IPTC_RESOURCE_ID))
        .map(|r| r.to_vec());

    Ok(MetadataBlocks { exif, iptc, xmp })
}

fn png_blocks(bytes: Vec<u8>) -> Result<MetadataBlocks> {
    let png = Png::from_bytes(Bytes::from(bytes))
        .map_err(|e| anyhow::anyhow!("Failed to parse PNG: {e}"))?;

    // Some writers keep the JPEG-style "Exif\0\0" prefix inside eXIf.
    let exif = png.exif().map(|b| {
        let data: &[u8] = &b;
        data.strip_prefix(EXIF_PREFIX).unwrap_or(data).to_vec()
    });
    let xmp = png.chunks().iter().find_map(|c| {
        let kind = c.kind();
        png_text_chunk(&kind, c.contents())
            .filter(|(keyword, _)| *keyword == XMP_KEYWORD)
            .map(|(_, text)| text.to_vec())
    });

    Ok(MetadataBlocks { exif, iptc: None, xmp })
}

fn tiff_blocks(bytes: Vec<u8>) -> MetadataBlocks {
    let (iptc, xmp) = match ExifView::parse(&bytes) {
        Some(view) => (view.bytes(TAG_IPTC_NAA), view.bytes(TAG_XMP)),
        None => (None, None),
    };
    MetadataBlocks {
        exif: Some(bytes),
        iptc,
        xmp,
    }
}

/// Whether a JPEG segment is the XMP APP1 packet.
pub(crate) fn is_xmp_segment(segment: &JpegSegment) -> bool {
    segment.marker() == 0xE1 && segment.contents().starts_with(XMP_HEADER)
}

/// Split an uncompressed `tEXt`/`iTXt` chunk into (keyword, text).
fn png_text_chunk<'a>(kind: &[u8; 4], contents: &'a [u8]) -> Option<(&'a [u8], &'a [u8])> {
    let nul = contents.iter().position(|&b| b == 0)?;
    let keyword = &contents[..nul];
    let rest = &contents[nul + 1..];
    match kind {
        b"tEXt" => Some((keyword, rest)),
        b"iTXt" => {
            // compression flag, compression method, language\0, translated keyword\0, text
            let (&compressed, rest) = rest.split_first()?;
            if compressed != 0 {
                return None;
            }
            let rest = rest.get(1..)?;
            let lang_end = rest.iter().position(|&b| b == 0)?;
            let rest = &rest[lang_end + 1..];
            let translated_end = rest.iter().position(|&b| b == 0)?;
            Some((keyword, &rest[translated_end + 1..]))
        }
        _ => None,
    }
}

/// Find one Photoshop image resource (`8BIM` block) by id.
pub(crate) fn photoshop_resource(data: &[u8], wanted: u16) -> Option<&[u8]> {
    let mut pos = 0;
    while pos + 12 <= data.len() {
        if &data[pos..pos + 4] != IPTC_8BIM {
            break;
        }
        let resource_id = u16::from_be_bytes([data[pos + 4], data[pos + 5]]);
        // Pascal name: length byte + name, padded to even
        let pascal_len = data[pos + 6] as usize;
        let pascal_padded = if (pascal_len + 1) % 2 == 0 { pascal_len + 1 } else { pascal_len + 2 };
        let data_start = pos + 6 + pascal_padded;
        if data_start + 4 > data.len() {
            break;
        }
        let data_len = u32::from_be_bytes([
            data[data_start],
            data[data_start + 1],
            data[data_start + 2],
            data[data_start + 3],
        ]) as usize;
        let body_start = data_start + 4;
        let body_end = body_start.saturating_add(data_len).min(data.len());

        if resource_id == wanted {
            return Some(&data[body_start..body_end]);
        }

        pos = if data_len % 2 == 0 { body_end } else { body_end + 1 };
    }
    None
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use img_parts::png::PngChunk;

    /// Write a solid-colour image in the format implied by the extension.
    pub fn write_image(path: &Path, width: u32, height: u32) {
        let img = RgbImage::from_pixel(width, height, Rgb([120, 160, 200]));
        let format = ImageFormat::from_path(path).unwrap();
        img.save_with_format(path, format).unwrap();
    }

    /// Re-write a JPEG with extra APP segments inserted after SOI/APP0.
    pub fn add_jpeg_segments(path: &Path, segments: Vec<(u8, Vec<u8>)>) {
        let bytes = std::fs::read(path).unwrap();
        let mut jpeg = Jpeg::from_bytes(Bytes::from(bytes)).unwrap();
        for (marker, contents) in segments.into_iter().rev() {
            let seg = JpegSegment::new_with_contents(marker, Bytes::from(contents));
            let at = jpeg.segments().len().min(1);
            jpeg.segments_mut().insert(at, seg);
        }
        std::fs::write(path, jpeg.encoder().bytes()).unwrap();
    }

    /// Attach a raw TIFF block as the EXIF of a JPEG or PNG.
    pub fn set_exif_block(path: &Path, tiff: Vec<u8>) {
        let bytes = Bytes::from(std::fs::read(path).unwrap());
        let out = match ImageKind::from_path(path).unwrap() {
            ImageKind::Jpeg => {
                let mut jpeg = Jpeg::from_bytes(bytes).unwrap();
                jpeg.set_exif(Some(Bytes::from(tiff)));
                jpeg.encoder().bytes()
            }
            ImageKind::Png => {
                let mut png = Png::from_bytes(bytes).unwrap();
                png.set_exif(Some(Bytes::from(tiff)));
                png.encoder().bytes()
            }
            ImageKind::Tiff => panic!("TIFF files carry their own IFDs"),
        };
        std::fs::write(path, out).unwrap();
    }

    /// Insert a chunk into a PNG just before IEND.
    pub fn add_png_chunk(path: &Path, kind: [u8; 4], contents: Vec<u8>) {
        let bytes = Bytes::from(std::fs::read(path).unwrap());
        let mut png = Png::from_bytes(bytes).unwrap();
        let at = png.chunks().len() - 1;
        png.chunks_mut().insert(at, PngChunk::new(kind, Bytes::from(contents)));
        std::fs::write(path, png.encoder().bytes()).unwrap();
    }

    /// Uncompressed iTXt contents holding an XMP packet.
    pub fn xmp_itxt(description: &str) -> Vec<u8> {
        let mut out = XMP_KEYWORD.to_vec();
        out.extend_from_slice(&[0, 0, 0]); // nul, flag, method
        out.extend_from_slice(b"\0\0"); // language, translated keyword
        out.extend_from_slice(xmp_packet(description).as_bytes());
        out
    }

    /// tEXt contents holding an XMP packet.
    pub fn xmp_text(description: &str) -> Vec<u8> {
        let mut out = XMP_KEYWORD.to_vec();
        out.push(0);
        out.extend_from_slice(xmp_packet(description).as_bytes());
        out
    }

    /// IPTC-IIM stream holding one 2:120 caption (shorter than 128 bytes).
    pub fn iptc_iim(caption: &[u8]) -> Vec<u8> {
        let mut iim = vec![0x1C, 0x02, 0x00, 0x02, 0x00, 0x04];
        iim.extend_from_slice(&[0x1C, 0x02, 0x78, caption.len() as u8]);
        iim.extend_from_slice(caption);
        iim
    }

    /// APP13 contents holding one IPTC 2:120 caption.
    pub fn iptc_app13(caption: &[u8]) -> Vec<u8> {
        let iim = iptc_iim(caption);

        let mut out = IPTC_HEADER.to_vec();
        out.extend_from_slice(IPTC_8BIM);
        out.extend_from_slice(&IPTC_RESOURCE_ID.to_be_bytes());
        out.extend_from_slice(&[0, 0]);
        out.extend_from_slice(&(iim.len() as u32).to_be_bytes());
        out.extend_from_slice(&iim);
        if iim.len() % 2 != 0 {
            out.push(0);
        }
        out
    }

    /// APP1 contents holding an XMP packet with a dc:description.
    pub fn xmp_app1(description: &str) -> Vec<u8> {
        let mut out = XMP_HEADER.to_vec();
        out.extend_from_slice(xmp_packet(description).as_bytes());
        out
    }

    pub fn xmp_packet(description: &str) -> String {
        format!(
            "<x:xmpmeta xmlns:x=\"adobe:ns:meta/\"><rdf:RDF>\
             <rdf:Description rdf:about=\"\" xmlns:dc=\"http://purl.org/dc/elements/1.1/\">\
             <dc:description><rdf:Alt><rdf:li xml:lang=\"x-default\">{description}</rdf:li></rdf:Alt></dc:description>\
             </rdf:Description></rdf:RDF></x:xmpmeta>"
        )
    }
}
