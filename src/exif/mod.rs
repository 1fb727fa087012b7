//! Caption and photo metadata reading and writing.
//!
//! - [`get_caption`]: Read a caption from EXIF UserComment, IPTC
//!   Caption/Abstract or XMP dc:description, in that order
//! - [`set_caption`]: Write a caption to the EXIF UserComment only
//! - [`get_timestamp`], [`get_orientation`], [`get_dimensions`] and
//!   [`is_landscape`]: Capture time and orientation-corrected geometry
//! - [`read_metadata`]: All of the above with a single read of the file
//!
//! Reading never fails: a malformed block degrades to "no value from this
//! source" and the next source is tried. Writing surfaces failures as
//! [`Error::CaptionWrite`](crate::error::Error::CaptionWrite).

mod container;
mod reader;
mod tiff;
mod view;
mod writer;

pub use container::{is_supported_image, ImageKind, SUPPORTED_EXTENSIONS};
pub use reader::{
    decode_html_entities, decode_user_comment, get_caption, get_dimensions, get_orientation,
    get_timestamp, is_landscape, open_upright, oriented_dimensions, read_metadata, PhotoMetadata,
};
pub use writer::{encode_user_comment, set_caption};

#[cfg(test)]
pub(crate) use container::fixtures;
