use anyhow::Result;
use chrono::NaiveDateTime;
use image::DynamicImage;
use std::cell::OnceCell;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::cache::{CacheStore, CachedMetadata, THUMBNAIL_SIZE};
use crate::error::Error;
use crate::exif::{self, ImageKind, PhotoMetadata};

/// An image file and its lazily resolved metadata.
///
/// Caption, timestamp and dimensions are read from the file on first access
/// and kept on the instance until [`Photo::reload`]. Two photos are equal
/// when their paths are equal, whatever their resolved state.
#[derive(Debug, Clone)]
pub struct Photo {
    path: PathBuf,
    metadata: OnceCell<PhotoMetadata>,
}

impl Photo {
    /// Create a photo for an existing file with a supported extension.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            return Err(Error::NotFound(path).into());
        }
        if ImageKind::from_path(&path).is_none() {
            let ext = path
                .extension()
                .map(|e| format!(".{}", e.to_string_lossy()))
                .unwrap_or_default();
            return Err(Error::UnsupportedFormat(ext).into());
        }
        Ok(Self {
            path,
            metadata: OnceCell::new(),
        })
    }

    /// All supported photos directly inside `directory`, sorted by file name.
    ///
    /// A missing directory yields an empty list.
    pub fn from_directory(directory: &Path) -> Vec<Photo> {
        if !directory.is_dir() {
            log::warn!("Not a directory: {}", directory.display());
            return Vec::new();
        }

        WalkDir::new(directory)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && exif::is_supported_image(e.path()))
            .filter_map(|e| match Photo::new(e.into_path()) {
                Ok(photo) => Some(photo),
                Err(err) => {
                    log::warn!("Skipping photo: {err:#}");
                    None
                }
            })
            .collect()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name of the photo.
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Whether metadata has been resolved for this instance.
    pub fn is_loaded(&self) -> bool {
        self.metadata.get().is_some()
    }

    fn metadata(&self) -> &PhotoMetadata {
        self.metadata.get_or_init(|| exif::read_metadata(&self.path))
    }

    pub fn caption(&self) -> Option<&str> {
        self.metadata().caption.as_deref()
    }

    pub fn has_caption(&self) -> bool {
        self.caption().is_some_and(|c| !c.is_empty())
    }

    /// Write a caption to the file immediately. `None` or `""` clears it.
    ///
    /// A resolved instance re-reads its caption from the file afterwards, so
    /// a cleared EXIF comment exposes any IPTC or XMP caption underneath.
    pub fn set_caption(&mut self, caption: Option<&str>) -> Result<()> {
        exif::set_caption(&self.path, caption.unwrap_or_default())?;

        if let Some(meta) = self.metadata.get_mut() {
            meta.caption = exif::get_caption(&self.path);
        }
        Ok(())
    }

    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        self.metadata().timestamp
    }

    /// Timestamp as `YYYY-MM-DD HH:MM:SS`, or `"Unknown"`.
    pub fn timestamp_str(&self) -> String {
        match self.timestamp() {
            Some(ts) => ts.format("%Y-%m-%d %H:%M:%S").to_string(),
            None => "Unknown".to_string(),
        }
    }

    /// Orientation-corrected (width, height); `(0, 0)` when unreadable.
    pub fn dimensions(&self) -> (u32, u32) {
        self.metadata().dimensions
    }

    pub fn width(&self) -> u32 {
        self.dimensions().0
    }

    pub fn height(&self) -> u32 {
        self.dimensions().1
    }

    pub fn is_landscape(&self) -> bool {
        self.metadata().is_landscape
    }

    /// Drop the resolved metadata and read it again from the file.
    pub fn reload(&mut self) {
        self.metadata = OnceCell::new();
        self.metadata();
    }

    /// Resolve metadata through the cache.
    ///
    /// A cache hit skips reading the file; a miss reads it and stores the
    /// record. Already-resolved photos are returned as they are.
    pub fn resolve_cached(&self, cache: &CacheStore) -> &PhotoMetadata {
        self.metadata.get_or_init(|| {
            if let Some(record) = cache.get_metadata(&self.path) {
                let [w, h] = record.dimensions.unwrap_or([0, 0]);
                return PhotoMetadata {
                    caption: record.caption,
                    timestamp: record.timestamp,
                    dimensions: (w, h),
                    is_landscape: record.is_landscape.unwrap_or(w > h),
                };
            }

            let meta = exif::read_metadata(&self.path);
            let record = CachedMetadata::new(
                meta.caption.clone(),
                meta.timestamp,
                Some(meta.dimensions),
                Some(meta.is_landscape),
            );
            cache.save_metadata(&self.path, &record);
            meta
        })
    }

    /// A thumbnail no larger than 200×200, upright, from the cache or
    /// generated and stored on a miss.
    pub fn thumbnail(&self, cache: &CacheStore) -> Result<DynamicImage> {
        if let Some(thumb) = cache.get_thumbnail(&self.path) {
            return Ok(thumb);
        }
        let thumb = exif::open_upright(&self.path)?.thumbnail(THUMBNAIL_SIZE, THUMBNAIL_SIZE);
        cache.save_thumbnail(&self.path, &thumb);
        Ok(thumb)
    }
}

impl PartialEq for Photo {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for Photo {}

impl Hash for Photo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}
