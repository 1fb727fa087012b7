use anyhow::{Context, Result};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use std::collections::BTreeMap;
use std::path::Path;

use super::fonts::{encode_win_ansi, StandardFont};
use super::layout::Placement;

/// A JPEG ready to embed, with its pixel size.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// A page-based drawing surface.
///
/// Drawing goes to the current page; [`PdfCanvas::show_page`] starts a new
/// one and [`PdfCanvas::save`] writes the document.
pub trait PdfCanvas {
    fn page_size(&self) -> (f64, f64);

    fn draw_image(&mut self, image: &EncodedImage, placement: &Placement) -> Result<()>;

    /// Draw `text` with its baseline starting at (`x`, `y`).
    fn draw_text(&mut self, text: &str, font: StandardFont, size: f64, x: f64, y: f64);

    fn text_width(&self, text: &str, font: StandardFont, size: f64) -> f64 {
        font.text_width(text, size)
    }

    fn show_page(&mut self) -> Result<()>;

    fn save(&mut self, path: &Path) -> Result<()>;
}

#[derive(Default)]
struct PageState {
    operations: Vec<Operation>,
    images: BTreeMap<String, ObjectId>,
    fonts: BTreeMap<String, ObjectId>,
}

/// [`PdfCanvas`] backed by an in-memory lopdf document.
pub struct LopdfCanvas {
    doc: Document,
    pages_id: ObjectId,
    width: f64,
    height: f64,
    pages: Vec<ObjectId>,
    current: PageState,
    fonts: BTreeMap<&'static str, ObjectId>,
    image_count: usize,
}

impl LopdfCanvas {
    pub fn new(width: f64, height: f64) -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            width,
            height,
            pages: Vec::new(),
            current: PageState::default(),
            fonts: BTreeMap::new(),
            image_count: 0,
        }
    }

    /// Number of finished pages.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn font_id(&mut self, font: StandardFont) -> ObjectId {
        let base = font.base_font();
        if let Some(&id) = self.fonts.get(base) {
            return id;
        }
        let id = self.doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => base,
            "Encoding" => "WinAnsiEncoding",
        });
        self.fonts.insert(base, id);
        id
    }

    fn finish_page(&mut self) -> Result<()> {
        let page = std::mem::take(&mut self.current);
        let content = Content {
            operations: page.operations,
        };
        let content_id = self.doc.add_object(Stream::new(
            dictionary! {},
            content.encode().context("Failed to encode page content")?,
        ));

        let to_dict = |entries: BTreeMap<String, ObjectId>| {
            let mut dict = Dictionary::new();
            for (name, id) in entries {
                dict.set(name, id);
            }
            dict
        };
        let resources = dictionary! {
            "Font" => to_dict(page.fonts),
            "XObject" => to_dict(page.images),
        };

        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => vec![0.into(), 0.into(), real(self.width), real(self.height)],
            "Contents" => content_id,
            "Resources" => resources,
        });
        self.pages.push(page_id);
        Ok(())
    }
}

fn real(v: f64) -> Object {
    Object::Real(v as f32)
}

impl PdfCanvas for LopdfCanvas {
    fn page_size(&self) -> (f64, f64) {
        (self.width, self.height)
    }

    fn draw_image(&mut self, image: &EncodedImage, placement: &Placement) -> Result<()> {
        self.image_count += 1;
        let name = format!("Im{}", self.image_count);
        let stream = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => i64::from(image.width),
                "Height" => i64::from(image.height),
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "DCTDecode",
            },
            image.data.clone(),
        )
        .with_compression(false);
        let image_id = self.doc.add_object(stream);
        self.current.images.insert(name.clone(), image_id);

        let Placement {
            x,
            y,
            width,
            height,
            rotated,
        } = *placement;
        // Maps the unit square onto the visible box; rotated images are
        // turned 90° counter-clockwise about the box centre.
        let matrix = if rotated {
            [0.0, height, -width, 0.0, x + width, y]
        } else {
            [width, 0.0, 0.0, height, x, y]
        };

        let ops = &mut self.current.operations;
        ops.push(Operation::new("q", vec![]));
        ops.push(Operation::new("cm", matrix.iter().copied().map(real).collect()));
        ops.push(Operation::new("Do", vec![Object::Name(name.into_bytes())]));
        ops.push(Operation::new("Q", vec![]));
        Ok(())
    }

    fn draw_text(&mut self, text: &str, font: StandardFont, size: f64, x: f64, y: f64) {
        let font_id = self.font_id(font);
        let name = format!("F{}", font.base_font().replace('-', ""));
        self.current.fonts.insert(name.clone(), font_id);

        let ops = &mut self.current.operations;
        ops.push(Operation::new("BT", vec![]));
        ops.push(Operation::new(
            "Tf",
            vec![Object::Name(name.into_bytes()), real(size)],
        ));
        ops.push(Operation::new("Td", vec![real(x), real(y)]));
        ops.push(Operation::new(
            "Tj",
            vec![Object::String(encode_win_ansi(text), StringFormat::Literal)],
        ));
        ops.push(Operation::new("ET", vec![]));
    }

    fn show_page(&mut self) -> Result<()> {
        self.finish_page()
    }

    fn save(&mut self, path: &Path) -> Result<()> {
        if !self.current.operations.is_empty() || self.pages.is_empty() {
            self.finish_page()?;
        }

        let kids: Vec<Object> = self.pages.iter().map(|&id| id.into()).collect();
        let count = kids.len() as i64;
        self.doc.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);

        self.doc
            .save(path)
            .with_context(|| format!("Failed to write PDF: {}", path.display()))?;
        Ok(())
    }
}
