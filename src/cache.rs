//! On-disk cache for thumbnails and resolved photo metadata.
//!
//! Entries are keyed by a fingerprint of the photo's absolute path,
//! modification time and size, so an edited or replaced file simply misses.
//! Thumbnails (PNG) and metadata records (JSON) live in separate
//! subdirectories, sharded by the first two characters of the key:
//!
//! ```text
//! <root>/thumbnails/3f/3fa2…e1.png
//! <root>/metadata/3f/3fa2…e1.json
//! ```
//!
//! Every failure here degrades to a miss or a `false` return. Callers never
//! need to handle a cache error.

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use image::{DynamicImage, ImageFormat};
use serde::{Deserialize, Serialize};
use std::fs::{File, FileTimes};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use walkdir::WalkDir;

use crate::config::CacheConfig;

/// Schema version of metadata records. Records with another version miss.
pub const CACHE_VERSION: u32 = 1;

/// Longest edge of cached thumbnails, in pixels.
pub const THUMBNAIL_SIZE: u32 = 200;

/// Eviction deletes down to this fraction of the maximum size.
const EVICTION_TARGET: f64 = 0.8;

const THUMBNAILS_DIR: &str = "thumbnails";
const METADATA_DIR: &str = "metadata";

/// A cached metadata record.
///
/// Serialised as `{"version", "caption", "timestamp", "dimensions", "is_landscape"}`
/// with the timestamp as an ISO 8601 string and dimensions as `[width, height]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedMetadata {
    pub version: u32,
    pub caption: Option<String>,
    pub timestamp: Option<NaiveDateTime>,
    pub dimensions: Option<[u32; 2]>,
    pub is_landscape: Option<bool>,
}

impl CachedMetadata {
    pub fn new(
        caption: Option<String>,
        timestamp: Option<NaiveDateTime>,
        dimensions: Option<(u32, u32)>,
        is_landscape: Option<bool>,
    ) -> Self {
        Self {
            version: CACHE_VERSION,
            caption,
            timestamp,
            dimensions: dimensions.map(|(w, h)| [w, h]),
            is_landscape,
        }
    }
}

/// Cache statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub size_bytes: u64,
    pub size_mb: f64,
    pub max_size_mb: f64,
    pub thumbnail_count: usize,
    pub metadata_count: usize,
}

/// Size-bounded persistent store for thumbnails and metadata records.
#[derive(Debug, Clone)]
pub struct CacheStore {
    thumbnails_dir: PathBuf,
    metadata_dir: PathBuf,
    max_size: u64,
}

/// One file found while walking the cache.
struct CacheFile {
    path: PathBuf,
    accessed: SystemTime,
    size: u64,
}

impl CacheStore {
    /// Open (creating if needed) a cache rooted at `root`.
    pub fn new(root: impl Into<PathBuf>, max_size_bytes: u64) -> Result<Self> {
        let root = root.into();
        let thumbnails_dir = root.join(THUMBNAILS_DIR);
        let metadata_dir = root.join(METADATA_DIR);
        for dir in [&thumbnails_dir, &metadata_dir] {
            std::fs::create_dir_all(dir).with_context(|| {
                format!("Failed to create cache directory: {}", dir.display())
            })?;
        }
        Ok(Self {
            thumbnails_dir,
            metadata_dir,
            max_size: max_size_bytes,
        })
    }

    /// Open the cache described by the configuration.
    pub fn open(config: &CacheConfig) -> Result<Self> {
        Self::new(config.resolve_directory()?, config.max_size_bytes())
    }

    /// Maximum total size in bytes.
    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    fn thumbnail_path(&self, key: &str) -> PathBuf {
        self.thumbnails_dir.join(&key[..2]).join(format!("{key}.png"))
    }

    fn metadata_path(&self, key: &str) -> PathBuf {
        self.metadata_dir.join(&key[..2]).join(format!("{key}.json"))
    }

    /// Get the cached thumbnail for a photo.
    pub fn get_thumbnail(&self, photo: &Path) -> Option<DynamicImage> {
        let key = cache_key(photo).ok()?;
        let path = self.thumbnail_path(&key);
        if !path.exists() {
            log::debug!("Thumbnail cache miss: {}", photo.display());
            return None;
        }
        match image::open(&path) {
            Ok(img) => {
                touch(&path);
                Some(img)
            }
            Err(e) => {
                log::debug!("Unreadable cached thumbnail {}: {e}", path.display());
                None
            }
        }
    }

    /// Store a thumbnail for a photo. Returns whether it was written.
    pub fn save_thumbnail(&self, photo: &Path, thumbnail: &DynamicImage) -> bool {
        let result = cache_key(photo).and_then(|key| {
            let path = self.thumbnail_path(&key);
            create_parent(&path)?;
            thumbnail
                .save_with_format(&path, ImageFormat::Png)
                .context("Failed to write thumbnail")
        });
        report_write("thumbnail", photo, result)
    }

    /// Get the cached metadata record for a photo.
    ///
    /// Records written under another schema version are treated as absent.
    pub fn get_metadata(&self, photo: &Path) -> Option<CachedMetadata> {
        let key = cache_key(photo).ok()?;
        let path = self.metadata_path(&key);
        let contents = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(_) => {
                log::debug!("Metadata cache miss: {}", photo.display());
                return None;
            }
        };
        let record: CachedMetadata = match serde_json::from_str(&contents) {
            Ok(r) => r,
            Err(e) => {
                log::debug!("Unreadable metadata record {}: {e}", path.display());
                return None;
            }
        };
        if record.version != CACHE_VERSION {
            log::debug!(
                "Metadata record {} has version {}, expected {CACHE_VERSION}",
                path.display(),
                record.version
            );
            return None;
        }
        touch(&path);
        Some(record)
    }

    /// Store a metadata record for a photo. Returns whether it was written.
    pub fn save_metadata(&self, photo: &Path, record: &CachedMetadata) -> bool {
        let result = cache_key(photo).and_then(|key| {
            let path = self.metadata_path(&key);
            create_parent(&path)?;
            let record = CachedMetadata {
                version: CACHE_VERSION,
                ..record.clone()
            };
            let json = serde_json::to_string(&record).context("Failed to serialize record")?;
            std::fs::write(&path, json).context("Failed to write metadata record")
        });
        report_write("metadata", photo, result)
    }

    /// Total size of all cache entries in bytes.
    pub fn get_cache_size(&self) -> u64 {
        self.entries().map(|f| f.size).sum()
    }

    /// Evict least recently accessed entries once the cache exceeds its
    /// maximum size, down to 80% of the maximum. Returns the number evicted.
    pub fn evict_old_entries(&self) -> usize {
        let mut current = self.get_cache_size();
        if current <= self.max_size {
            return 0;
        }

        let mut files: Vec<CacheFile> = self.entries().collect();
        files.sort_by_key(|f| f.accessed);

        let target = (self.max_size as f64 * EVICTION_TARGET) as u64;
        let mut evicted = 0;
        for file in files {
            if current <= target {
                break;
            }
            match std::fs::remove_file(&file.path) {
                Ok(()) => {
                    current = current.saturating_sub(file.size);
                    evicted += 1;
                }
                Err(e) => log::debug!("Could not evict {}: {e}", file.path.display()),
            }
        }

        log::info!("Evicted {evicted} cache entries ({current} bytes remain)");
        evicted
    }

    /// Delete every cache entry and the emptied shard directories.
    /// Returns the number of entries deleted.
    pub fn clear(&self) -> usize {
        let mut deleted = 0;
        for dir in [&self.thumbnails_dir, &self.metadata_dir] {
            for entry in WalkDir::new(dir)
                .min_depth(1)
                .contents_first(true)
                .into_iter()
                .filter_map(|e| e.ok())
            {
                let path = entry.path();
                if entry.file_type().is_dir() {
                    if let Err(e) = std::fs::remove_dir(path) {
                        log::debug!("Could not remove {}: {e}", path.display());
                    }
                } else if std::fs::remove_file(path).is_ok() {
                    deleted += 1;
                }
            }
        }
        log::info!("Cleared {deleted} cache entries");
        deleted
    }

    /// Size and entry counts.
    pub fn get_cache_stats(&self) -> CacheStats {
        let size = self.get_cache_size();
        CacheStats {
            size_bytes: size,
            size_mb: round_mb(size),
            max_size_mb: round_mb(self.max_size),
            thumbnail_count: files_under(&self.thumbnails_dir).count(),
            metadata_count: files_under(&self.metadata_dir).count(),
        }
    }

    fn entries(&self) -> impl Iterator<Item = CacheFile> + '_ {
        [&self.thumbnails_dir, &self.metadata_dir]
            .into_iter()
            .flat_map(|dir| files_under(dir))
            .filter_map(|entry| {
                let meta = entry.metadata().ok()?;
                Some(CacheFile {
                    accessed: meta.accessed().or_else(|_| meta.modified()).ok()?,
                    size: meta.len(),
                    path: entry.into_path(),
                })
            })
    }
}

/// Fingerprint of a file: SHA-256 over `{absolute path}:{mtime}:{size}`,
/// truncated to 32 hex characters.
pub fn cache_key(photo: &Path) -> Result<String> {
    use sha2::{Digest, Sha256};

    let metadata = std::fs::metadata(photo)?;
    let absolute_path = std::path::absolute(photo)?;
    let modified_time = metadata
        .modified()?
        .duration_since(UNIX_EPOCH)?
        .as_secs_f64();
    let key_data = format!(
        "{}:{}:{}",
        absolute_path.display(),
        modified_time,
        metadata.len()
    );

    let result = Sha256::digest(key_data.as_bytes());
    // First 16 bytes (32 hex chars)
    Ok(hex::encode(&result[..16]))
}

fn files_under(dir: &Path) -> impl Iterator<Item = walkdir::DirEntry> {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create shard directory")?;
    }
    Ok(())
}

/// Refresh access and modification times; the access time drives eviction.
fn touch(path: &Path) {
    let now = SystemTime::now();
    let times = FileTimes::new().set_accessed(now).set_modified(now);
    let result = File::options()
        .write(true)
        .open(path)
        .and_then(|f| f.set_times(times));
    if let Err(e) = result {
        log::debug!("Could not touch {}: {e}", path.display());
    }
}

fn report_write(kind: &str, photo: &Path, result: Result<()>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            log::debug!("Could not cache {kind} for {}: {e:#}", photo.display());
            false
        }
    }
}

fn round_mb(bytes: u64) -> f64 {
    (bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use image::RgbImage;
    use std::time::Duration;
    use tempfile::TempDir;

    fn store(dir: &TempDir, max: u64) -> CacheStore {
        CacheStore::new(dir.path().join("cache"), max).unwrap()
    }

    fn photo(dir: &TempDir, name: &str, contents: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn sample_record() -> CachedMetadata {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap();
        CachedMetadata::new(Some("Hallway".into()), Some(ts), Some((4000, 3000)), Some(true))
    }

    /// Write a raw entry of `size` bytes with a fixed access time.
    fn raw_entry(store: &CacheStore, key: &str, size: usize, accessed_secs: u64) -> PathBuf {
        let path = store.thumbnail_path(key);
        create_parent(&path).unwrap();
        std::fs::write(&path, vec![0u8; size]).unwrap();
        let t = UNIX_EPOCH + Duration::from_secs(accessed_secs);
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_times(FileTimes::new().set_accessed(t).set_modified(t))
            .unwrap();
        path
    }

    // ── Keys ─────────────────────────────────────────────────────────

    #[test]
    fn cache_key_is_stable_and_short() {
        let dir = TempDir::new().unwrap();
        let p = photo(&dir, "a.jpg", b"content");
        let k1 = cache_key(&p).unwrap();
        assert_eq!(k1, cache_key(&p).unwrap());
        assert_eq!(k1.len(), 32);

        let q = photo(&dir, "b.jpg", b"content");
        assert_ne!(k1, cache_key(&q).unwrap());
    }

    #[test]
    fn cache_key_missing_file() {
        assert!(cache_key(Path::new("/nonexistent/photo.jpg")).is_err());
    }

    // ── Metadata ─────────────────────────────────────────────────────

    #[test]
    fn metadata_round_trip() {
        let dir = TempDir::new().unwrap();
        let cache = store(&dir, 1 << 20);
        let p = photo(&dir, "a.jpg", b"content");

        assert!(cache.get_metadata(&p).is_none());
        assert!(cache.save_metadata(&p, &sample_record()));
        assert_eq!(cache.get_metadata(&p), Some(sample_record()));
    }

    #[test]
    fn metadata_record_format() {
        let dir = TempDir::new().unwrap();
        let cache = store(&dir, 1 << 20);
        let p = photo(&dir, "a.jpg", b"content");
        cache.save_metadata(&p, &sample_record());

        let key = cache_key(&p).unwrap();
        let json = std::fs::read_to_string(cache.metadata_path(&key)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["version"], 1);
        assert_eq!(value["caption"], "Hallway");
        assert_eq!(value["timestamp"], "2024-01-15T10:30:00");
        assert_eq!(value["dimensions"], serde_json::json!([4000, 3000]));
        assert_eq!(value["is_landscape"], true);
        assert!(cache.metadata_path(&key).starts_with(cache.metadata_dir.join(&key[..2])));
    }

    #[test]
    fn touching_source_invalidates() {
        let dir = TempDir::new().unwrap();
        let cache = store(&dir, 1 << 20);
        let p = photo(&dir, "a.jpg", b"content");
        cache.save_metadata(&p, &sample_record());

        let later = SystemTime::now() + Duration::from_secs(60);
        File::options()
            .write(true)
            .open(&p)
            .unwrap()
            .set_modified(later)
            .unwrap();
        assert!(cache.get_metadata(&p).is_none());
    }

    #[test]
    fn version_mismatch_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let cache = store(&dir, 1 << 20);
        let p = photo(&dir, "a.jpg", b"content");
        cache.save_metadata(&p, &sample_record());

        let key = cache_key(&p).unwrap();
        let path = cache.metadata_path(&key);
        let json = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, json.replace("\"version\":1", "\"version\":99")).unwrap();
        assert!(cache.get_metadata(&p).is_none());

        std::fs::write(&path, "{ not json").unwrap();
        assert!(cache.get_metadata(&p).is_none());
    }

    #[test]
    fn save_for_missing_photo_fails_quietly() {
        let dir = TempDir::new().unwrap();
        let cache = store(&dir, 1 << 20);
        assert!(!cache.save_metadata(Path::new("/nonexistent/x.jpg"), &sample_record()));
    }

    // ── Thumbnails ───────────────────────────────────────────────────

    #[test]
    fn thumbnail_round_trip() {
        let dir = TempDir::new().unwrap();
        let cache = store(&dir, 1 << 20);
        let p = photo(&dir, "a.jpg", b"content");
        let thumb = DynamicImage::ImageRgb8(RgbImage::new(20, 10));

        assert!(cache.get_thumbnail(&p).is_none());
        assert!(cache.save_thumbnail(&p, &thumb));
        let cached = cache.get_thumbnail(&p).unwrap();
        assert_eq!((cached.width(), cached.height()), (20, 10));
    }

    #[test]
    fn hit_refreshes_access_time() {
        let dir = TempDir::new().unwrap();
        let cache = store(&dir, 1 << 20);
        let p = photo(&dir, "a.jpg", b"content");
        cache.save_metadata(&p, &sample_record());

        let path = cache.metadata_path(&cache_key(&p).unwrap());
        let old = UNIX_EPOCH + Duration::from_secs(1_000);
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_times(FileTimes::new().set_accessed(old).set_modified(old))
            .unwrap();

        cache.get_metadata(&p).unwrap();
        let accessed = std::fs::metadata(&path).unwrap().accessed().unwrap();
        assert!(accessed > old + Duration::from_secs(3600));
    }

    // ── Eviction ─────────────────────────────────────────────────────

    #[test]
    fn eviction_is_noop_under_limit() {
        let dir = TempDir::new().unwrap();
        let cache = store(&dir, 1000);
        raw_entry(&cache, "aa01", 300, 100);
        raw_entry(&cache, "bb02", 300, 200);
        assert_eq!(cache.evict_old_entries(), 0);
        assert_eq!(cache.get_cache_size(), 600);
    }

    #[test]
    fn eviction_removes_oldest_first_to_80_percent() {
        let dir = TempDir::new().unwrap();
        let cache = store(&dir, 1000);
        // Access times deliberately not in creation order.
        let e3 = raw_entry(&cache, "cc03", 300, 300);
        let e1 = raw_entry(&cache, "aa01", 300, 100);
        let e5 = raw_entry(&cache, "ee05", 300, 500);
        let e2 = raw_entry(&cache, "bb02", 300, 200);
        let e4 = raw_entry(&cache, "dd04", 300, 400);
        assert_eq!(cache.get_cache_size(), 1500);

        // 1500 → 1200 → 900 → 600 (≤ 800)
        assert_eq!(cache.evict_old_entries(), 3);
        assert!(cache.get_cache_size() <= 800);
        for gone in [&e1, &e2, &e3] {
            assert!(!gone.exists(), "{} should be evicted", gone.display());
        }
        for kept in [&e4, &e5] {
            assert!(kept.exists(), "{} should be kept", kept.display());
        }
    }

    // ── Clear / stats ────────────────────────────────────────────────

    #[test]
    fn clear_removes_entries_and_shards() {
        let dir = TempDir::new().unwrap();
        let cache = store(&dir, 1 << 20);
        let p = photo(&dir, "a.jpg", b"content");
        cache.save_metadata(&p, &sample_record());
        cache.save_thumbnail(&p, &DynamicImage::ImageRgb8(RgbImage::new(4, 4)));
        raw_entry(&cache, "ff09", 10, 1);

        assert_eq!(cache.clear(), 3);
        assert_eq!(cache.get_cache_size(), 0);
        assert_eq!(std::fs::read_dir(&cache.thumbnails_dir).unwrap().count(), 0);
        assert_eq!(std::fs::read_dir(&cache.metadata_dir).unwrap().count(), 0);

        // Still usable afterwards
        assert!(cache.save_metadata(&p, &sample_record()));
    }

    #[test]
    fn stats_count_entries() {
        let dir = TempDir::new().unwrap();
        let cache = store(&dir, 2 * 1024 * 1024);
        let a = photo(&dir, "a.jpg", b"a");
        let b = photo(&dir, "b.jpg", b"b");
        cache.save_metadata(&a, &sample_record());
        cache.save_metadata(&b, &sample_record());
        cache.save_thumbnail(&a, &DynamicImage::ImageRgb8(RgbImage::new(4, 4)));

        let stats = cache.get_cache_stats();
        assert_eq!(stats.thumbnail_count, 1);
        assert_eq!(stats.metadata_count, 2);
        assert_eq!(stats.size_bytes, cache.get_cache_size());
        assert_eq!(stats.max_size_mb, 2.0);
    }

    #[test]
    fn open_uses_configured_directory() {
        let dir = TempDir::new().unwrap();
        let config = CacheConfig {
            max_size_mb: 5,
            directory: Some(dir.path().join("configured")),
        };
        let cache = CacheStore::open(&config).unwrap();
        assert_eq!(cache.max_size(), 5 * 1024 * 1024);
        assert!(dir.path().join("configured").join("thumbnails").is_dir());
        assert!(dir.path().join("configured").join("metadata").is_dir());
    }
}
