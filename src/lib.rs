//! # contact-sheet
//!
//! Keep photo captions inside the image files themselves and print captioned
//! photos as PDF contact sheets.
//!
//! Captions are read from EXIF `UserComment`, IPTC Caption-Abstract or XMP
//! `dc:description` (first non-empty wins) and always written back as EXIF
//! `UserComment`, leaving the rest of the file untouched. JPEG, PNG and TIFF
//! are supported.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use contact_sheet::config::Config;
//! use contact_sheet::photo::Photo;
//! use contact_sheet::sheet::ContactSheetRenderer;
//! use std::path::Path;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::load(Some("config.json".as_ref()))?;
//!
//!     let folder = Path::new("./Kitchen");
//!     let mut photos = Photo::from_directory(folder);
//!
//!     // Captions are written to the file immediately
//!     if let Some(first) = photos.first_mut() {
//!         first.set_caption(Some("Water damage under the sink"))?;
//!     }
//!
//!     // Uncaptioned photos are left out of the sheet
//!     let renderer = ContactSheetRenderer::new(config.pdf);
//!     let output = ContactSheetRenderer::default_filename("Kitchen");
//!     renderer.generate(&photos, Path::new(&output), |done, total| {
//!         println!("{done}/{total}");
//!     })?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Caching
//!
//! Browsing large folders re-reads the same files over and over.
//! [`cache::CacheStore`] keeps metadata records and thumbnails on disk,
//! keyed by path, modification time and size, so edits invalidate entries:
//!
//! ```rust,no_run
//! use contact_sheet::cache::CacheStore;
//! use contact_sheet::config::CacheConfig;
//! use contact_sheet::photo::Photo;
//!
//! fn main() -> anyhow::Result<()> {
//!     let cache = CacheStore::open(&CacheConfig::default())?;
//!     let photo = Photo::new("IMG_0001.jpg")?;
//!
//!     let meta = photo.resolve_cached(&cache);
//!     println!("{:?} {:?}", meta.caption, meta.dimensions);
//!
//!     let thumb = photo.thumbnail(&cache)?;
//!     println!("thumbnail {}x{}", thumb.width(), thumb.height());
//!
//!     cache.evict_old_entries();
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: PDF layout settings and cache location, stored as JSON
//! - [`exif`]: caption, timestamp and dimension extraction; caption writing
//! - [`photo`]: a photo file with lazily resolved metadata
//! - [`cache`]: on-disk thumbnail and metadata cache
//! - [`sheet`]: PDF contact sheet rendering
//! - [`error`]: conditions callers may need to tell apart

pub mod cache;
pub mod config;
pub mod error;
pub mod exif;
pub mod photo;
pub mod sheet;
