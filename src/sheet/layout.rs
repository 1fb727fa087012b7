//! Page geometry for contact sheets. All values are PDF points (1/72 in)
//! with the origin at the bottom-left of the page.

use anyhow::Result;

use crate::config::{Orientation, PdfSettings};
use crate::error::Error;

/// US Letter, portrait.
pub const LETTER: (f64, f64) = (612.0, 792.0);
pub const POINTS_PER_INCH: f64 = 72.0;

/// Caption band is 15% of the cell height, capped at 20 pt.
const CAPTION_BAND_RATIO: f64 = 0.15;
const CAPTION_BAND_CAP: f64 = 20.0;
/// Gap around the image inside a cell.
pub const CELL_PADDING: f64 = 4.0;

const MAX_FONT_SIZE: u32 = 12;
const MIN_FONT_SIZE: u32 = 5;
/// Used when no size from 12 down to 5 fits.
pub const FALLBACK_FONT_SIZE: f64 = 6.0;

/// Page size for an orientation.
pub fn page_size(orientation: Orientation) -> (f64, f64) {
    match orientation {
        Orientation::Portrait => LETTER,
        Orientation::Landscape => (LETTER.1, LETTER.0),
    }
}

/// Position of the n-th photo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub page: usize,
    pub row: usize,
    pub column: usize,
}

/// Where an image lands on the page.
///
/// `width`/`height` are the visible box. When `rotated`, the image is drawn
/// turned 90° counter-clockwise, so its own width spans `height`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub rotated: bool,
}

/// The cell grid for one settings value.
#[derive(Debug, Clone, PartialEq)]
pub struct GridLayout {
    pub page_width: f64,
    pub page_height: f64,
    pub margin_left: f64,
    pub margin_top: f64,
    pub rows: usize,
    pub columns: usize,
    pub cell_width: f64,
    pub cell_height: f64,
    pub caption_height: f64,
    pub image_height: f64,
}

impl GridLayout {
    pub fn new(settings: &PdfSettings) -> Result<Self> {
        settings.validate()?;

        let (page_width, page_height) = page_size(settings.orientation);
        let margin_left = settings.margin_left * POINTS_PER_INCH;
        let margin_top = settings.margin_top * POINTS_PER_INCH;
        let available_width = page_width - margin_left - settings.margin_right * POINTS_PER_INCH;
        let available_height = page_height - margin_top - settings.margin_bottom * POINTS_PER_INCH;

        let rows = settings.rows as usize;
        let columns = settings.columns as usize;
        let cell_width = available_width / columns as f64;
        let cell_height = available_height / rows as f64;
        let caption_height = (cell_height * CAPTION_BAND_RATIO).min(CAPTION_BAND_CAP);
        let image_height = cell_height - caption_height - CELL_PADDING;

        if cell_width <= 2.0 * CELL_PADDING || image_height <= 0.0 {
            return Err(Error::InvalidSettings(format!(
                "margins leave no room for a {rows}x{columns} grid on a {page_width}x{page_height} pt page"
            ))
            .into());
        }

        Ok(Self {
            page_width,
            page_height,
            margin_left,
            margin_top,
            rows,
            columns,
            cell_width,
            cell_height,
            caption_height,
            image_height,
        })
    }

    pub fn per_page(&self) -> usize {
        self.rows * self.columns
    }

    /// Width available to the image and caption inside a cell.
    pub fn image_width(&self) -> f64 {
        self.cell_width - 2.0 * CELL_PADDING
    }

    pub fn page_count(&self, photos: usize) -> usize {
        photos.div_ceil(self.per_page())
    }

    /// Row-major slot of the photo at `index`, top row first.
    pub fn slot(&self, index: usize) -> Slot {
        let on_page = index % self.per_page();
        Slot {
            page: index / self.per_page(),
            row: on_page / self.columns,
            column: on_page % self.columns,
        }
    }

    /// Bottom-left corner of a cell.
    pub fn cell_origin(&self, slot: Slot) -> (f64, f64) {
        let x = self.margin_left + slot.column as f64 * self.cell_width;
        let y = self.page_height - self.margin_top - (slot.row + 1) as f64 * self.cell_height;
        (x, y)
    }

    /// Fit an image of `src_width`×`src_height` into the cell at `origin`,
    /// centred in the image band.
    pub fn place_image(&self, origin: (f64, f64), src_width: f64, src_height: f64) -> Placement {
        let box_width = self.image_width();
        let rotated = should_rotate(src_width, src_height, box_width, self.image_height);
        let (width, height) = if rotated {
            fit(src_height, src_width, box_width, self.image_height)
        } else {
            fit(src_width, src_height, box_width, self.image_height)
        };

        Placement {
            x: origin.0 + (self.cell_width - width) / 2.0,
            y: origin.1
                + self.caption_height
                + CELL_PADDING
                + (self.image_height - height) / 2.0,
            width,
            height,
            rotated,
        }
    }

    /// Caption baseline position for text of the given width.
    pub fn caption_origin(&self, origin: (f64, f64), text_width: f64) -> (f64, f64) {
        (
            origin.0 + (self.cell_width - text_width) / 2.0,
            origin.1 + CELL_PADDING,
        )
    }
}

/// Scale `src` to fit inside `box_width`×`box_height`, keeping aspect ratio.
pub fn fit(src_width: f64, src_height: f64, box_width: f64, box_height: f64) -> (f64, f64) {
    if src_width <= 0.0 || src_height <= 0.0 {
        return (0.0, 0.0);
    }
    let scale = (box_width / src_width).min(box_height / src_height);
    (src_width * scale, src_height * scale)
}

/// Whether turning the image 90° covers strictly more of the box.
pub fn should_rotate(src_width: f64, src_height: f64, box_width: f64, box_height: f64) -> bool {
    let area = |(w, h): (f64, f64)| w * h;
    area(fit(src_height, src_width, box_width, box_height))
        > area(fit(src_width, src_height, box_width, box_height))
}

/// Largest integer size from 12 down to 5 whose text fits `max_width` and
/// is no taller than `max_height`, or 6 if none does.
pub fn caption_font_size(
    max_width: f64,
    max_height: f64,
    text_width: impl Fn(f64) -> f64,
) -> f64 {
    (MIN_FONT_SIZE..=MAX_FONT_SIZE)
        .rev()
        .map(f64::from)
        .find(|&size| text_width(size) <= max_width && size <= max_height)
        .unwrap_or(FALLBACK_FONT_SIZE)
}
