//! Contact sheet rendering.
//!
//! [`ContactSheetRenderer`] lays captioned photos out on a grid of
//! letter-size pages, one photo per cell with its caption underneath, and
//! writes the result as a PDF.
//!
//! ```rust,no_run
//! use contact_sheet::config::PdfSettings;
//! use contact_sheet::photo::Photo;
//! use contact_sheet::sheet::ContactSheetRenderer;
//! use std::path::Path;
//!
//! let photos = Photo::from_directory(Path::new("./Claim 1234"));
//! let renderer = ContactSheetRenderer::new(PdfSettings::default());
//! let output = ContactSheetRenderer::default_filename("Claim 1234");
//! renderer
//!     .generate(&photos, Path::new(&output), |done, total| println!("{done}/{total}"))
//!     .unwrap();
//! ```

mod canvas;
mod fonts;
mod layout;

pub use canvas::{EncodedImage, LopdfCanvas, PdfCanvas};
pub use fonts::StandardFont;
pub use layout::{page_size, should_rotate, GridLayout, Placement, Slot};

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use std::path::Path;

use crate::config::PdfSettings;
use crate::error::Error;
use crate::exif;
use crate::photo::Photo;
use layout::{caption_font_size, POINTS_PER_INCH};

/// Renders captioned photos into a PDF contact sheet.
#[derive(Debug, Clone)]
pub struct ContactSheetRenderer {
    settings: PdfSettings,
}

impl ContactSheetRenderer {
    pub fn new(settings: PdfSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &PdfSettings {
        &self.settings
    }

    /// Default output file name for a photo folder.
    pub fn default_filename(folder_name: &str) -> String {
        format!("{folder_name} Photos.pdf")
    }

    /// Render the captioned photos to a PDF at `output`.
    ///
    /// Uncaptioned photos are skipped. `progress` receives
    /// `(processed, total)` after each photo is placed. Nothing is written
    /// unless every photo renders.
    pub fn generate(
        &self,
        photos: &[Photo],
        output: &Path,
        progress: impl FnMut(usize, usize),
    ) -> Result<()> {
        let layout = GridLayout::new(&self.settings)?;
        let mut canvas = LopdfCanvas::new(layout.page_width, layout.page_height);
        let count = self.render(photos, &layout, &mut canvas, progress)?;
        canvas.save(output)?;
        log::info!(
            "Wrote {count} photos on {} pages to {}",
            canvas.page_count(),
            output.display()
        );
        Ok(())
    }

    /// Draw the captioned photos onto `canvas` without saving it.
    /// Returns the number of photos drawn.
    pub fn render<C: PdfCanvas>(
        &self,
        photos: &[Photo],
        layout: &GridLayout,
        canvas: &mut C,
        mut progress: impl FnMut(usize, usize),
    ) -> Result<usize> {
        let captioned: Vec<&Photo> = photos.iter().filter(|p| p.has_caption()).collect();
        if captioned.is_empty() {
            return Err(Error::NoCaptionedPhotos.into());
        }

        let font = StandardFont::resolve(&self.settings.font_family);
        let total = captioned.len();
        for (index, photo) in captioned.into_iter().enumerate() {
            let slot = layout.slot(index);
            if slot.page > 0 && slot.row == 0 && slot.column == 0 {
                canvas.show_page()?;
            }
            self.draw_cell(canvas, layout, font, photo, slot)
                .with_context(|| format!("Failed to render {}", photo.path().display()))?;
            progress(index + 1, total);
        }
        Ok(total)
    }

    fn draw_cell<C: PdfCanvas>(
        &self,
        canvas: &mut C,
        layout: &GridLayout,
        font: StandardFont,
        photo: &Photo,
        slot: Slot,
    ) -> Result<()> {
        let origin = layout.cell_origin(slot);
        let img = exif::open_upright(photo.path())?;
        let (width, height) = match photo.dimensions() {
            (0, _) | (_, 0) => img.dimensions(),
            dims => dims,
        };

        let placement = layout.place_image(origin, f64::from(width), f64::from(height));
        log::debug!(
            "{} -> page {} row {} col {}{}",
            photo.name(),
            slot.page + 1,
            slot.row + 1,
            slot.column + 1,
            if placement.rotated { " (rotated)" } else { "" }
        );
        let encoded = self.encode_for_pdf(img, &placement)?;
        canvas.draw_image(&encoded, &placement)?;

        let caption = photo.caption().unwrap_or_default();
        let size = caption_font_size(layout.image_width(), layout.caption_height, |s| {
            canvas.text_width(caption, font, s)
        });
        let (x, y) = layout.caption_origin(origin, canvas.text_width(caption, font, size));
        canvas.draw_text(caption, font, size, x, y);
        Ok(())
    }

    /// Resize to the drawn size at the target DPI and re-encode as JPEG.
    fn encode_for_pdf(&self, img: DynamicImage, placement: &Placement) -> Result<EncodedImage> {
        let scale = f64::from(self.settings.dpi) / POINTS_PER_INCH;
        // A rotated image's own width runs along the box height.
        let (box_width, box_height) = if placement.rotated {
            (placement.height, placement.width)
        } else {
            (placement.width, placement.height)
        };
        let target_width = ((box_width * scale).round() as u32).max(1);
        let target_height = ((box_height * scale).round() as u32).max(1);

        let resized = img
            .resize_exact(target_width, target_height, FilterType::Lanczos3)
            .to_rgb8();

        let mut data = Vec::new();
        JpegEncoder::new_with_quality(&mut data, self.settings.image_quality.jpeg_quality())
            .encode_image(&resized)
            .context("Failed to encode JPEG")?;

        Ok(EncodedImage {
            data,
            width: resized.width(),
            height: resized.height(),
        })
    }
}
