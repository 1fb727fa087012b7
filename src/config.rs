use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Error;

/// Top-level configuration for the contact-sheet tools.
///
/// Holds the PDF layout settings and the thumbnail cache budget. Both are
/// handed to the renderer and the cache as plain values; nothing in the
/// library reads the config file on its own.
///
/// # Loading
///
/// ```rust,no_run
/// use contact_sheet::config::Config;
///
/// // From a JSON file
/// let config = Config::load(Some("config.json".as_ref())).unwrap();
///
/// // Or use defaults and customize
/// let mut config = Config::default();
/// config.pdf.rows = 3;
/// config.cache.max_size_mb = 512;
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Contact sheet layout.
    pub pdf: PdfSettings,
    /// On-disk thumbnail/metadata cache.
    pub cache: CacheConfig,
}

/// Page orientation for the contact sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Portrait,
    Landscape,
}

/// Image quality presets. Each maps to a JPEG re-encode quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageQuality {
    Low,
    Medium,
    High,
}

impl ImageQuality {
    /// JPEG quality used when embedding photos at this tier.
    pub fn jpeg_quality(self) -> u8 {
        match self {
            Self::Low => 50,
            Self::Medium => 70,
            Self::High => 90,
        }
    }
}

/// Settings for contact sheet generation.
///
/// Margins are in inches. `font_family` names one of the standard PDF fonts
/// (Helvetica, Times, Courier or a common alias such as Arial).
///
/// # Example
///
/// ```rust
/// use contact_sheet::config::{ImageQuality, Orientation, PdfSettings};
///
/// let settings = PdfSettings {
///     rows: 3,
///     columns: 2,
///     orientation: Orientation::Portrait,
///     image_quality: ImageQuality::High,
///     dpi: 150,
///     ..PdfSettings::default()
/// };
/// assert!(settings.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfSettings {
    pub rows: u32,
    pub columns: u32,
    pub orientation: Orientation,
    pub margin_top: f64,
    pub margin_bottom: f64,
    pub margin_left: f64,
    pub margin_right: f64,
    pub font_family: String,
    pub dpi: u32,
    pub image_quality: ImageQuality,
}

impl Default for PdfSettings {
    fn default() -> Self {
        Self {
            rows: 2,
            columns: 2,
            orientation: Orientation::Landscape,
            margin_top: 0.25,
            margin_bottom: 0.25,
            margin_left: 0.25,
            margin_right: 0.25,
            font_family: "Helvetica".to_string(),
            dpi: 75,
            image_quality: ImageQuality::Medium,
        }
    }
}

impl PdfSettings {
    /// Reject settings that cannot produce a page.
    ///
    /// Only checks what can be decided without a page size; the renderer
    /// additionally rejects margins that leave no printable area.
    pub fn validate(&self) -> Result<()> {
        if self.rows == 0 || self.columns == 0 {
            return Err(Error::InvalidSettings(format!(
                "grid must have at least one row and column (got {}x{})",
                self.rows, self.columns
            ))
            .into());
        }
        if self.dpi == 0 {
            return Err(Error::InvalidSettings("dpi must be positive".to_string()).into());
        }
        let margins = [
            self.margin_top,
            self.margin_bottom,
            self.margin_left,
            self.margin_right,
        ];
        if margins.iter().any(|m| !m.is_finite() || *m < 0.0) {
            return Err(
                Error::InvalidSettings("margins must be non-negative numbers".to_string()).into(),
            );
        }
        Ok(())
    }
}

/// Cache budget and location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum total size of the cache in megabytes.
    pub max_size_mb: u64,
    /// Cache root. `None` uses the platform cache directory.
    pub directory: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size_mb: 2048,
            directory: None,
        }
    }
}

impl CacheConfig {
    /// Maximum cache size in bytes.
    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_mb.saturating_mul(1024 * 1024)
    }

    /// Resolve the cache root directory.
    pub fn resolve_directory(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.directory {
            return Ok(dir.clone());
        }
        let root = dirs::cache_dir().context("Unable to find the platform cache directory")?;
        Ok(root.join("contact-sheet").join("thumbnail_cache"))
    }
}

impl Config {
    /// Resolve the config file path: same directory as the executable.
    pub fn config_path() -> Result<PathBuf> {
        let exe_path = std::env::current_exe().context("Failed to get executable path")?;
        let exe_dir = exe_path
            .parent()
            .context("Failed to get executable directory")?;
        Ok(exe_dir.join("config.json"))
    }

    /// Load config from the given path, or from the default location.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        if !config_path.exists() {
            log::warn!(
                "Config file not found at {}. Using defaults.",
                config_path.display()
            );
            return Ok(Self::default());
        }

        let contents =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;
        let config: Config =
            serde_json::from_str(&contents).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Save config to the given path, or to the default location.
    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_path, contents).context("Failed to write config file")?;
        log::info!("Config saved to {}", config_path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_pdf_settings() {
        let s = PdfSettings::default();
        assert_eq!((s.rows, s.columns), (2, 2));
        assert_eq!(s.orientation, Orientation::Landscape);
        assert_eq!(s.font_family, "Helvetica");
        assert_eq!(s.dpi, 75);
        assert_eq!(s.image_quality, ImageQuality::Medium);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn quality_tiers_map_to_jpeg_quality() {
        assert_eq!(ImageQuality::Low.jpeg_quality(), 50);
        assert_eq!(ImageQuality::Medium.jpeg_quality(), 70);
        assert_eq!(ImageQuality::High.jpeg_quality(), 90);
    }

    #[test]
    fn validate_rejects_empty_grid() {
        let s = PdfSettings {
            columns: 0,
            ..PdfSettings::default()
        };
        let err = s.validate().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::InvalidSettings(_))
        ));
    }

    #[test]
    fn validate_rejects_negative_margin() {
        let s = PdfSettings {
            margin_left: -0.5,
            ..PdfSettings::default()
        };
        assert!(s.validate().is_err());
    }

    #[test]
    fn enums_serialize_lowercase() {
        let json = serde_json::to_string(&PdfSettings::default()).unwrap();
        assert!(json.contains("\"orientation\":\"landscape\""));
        assert!(json.contains("\"image_quality\":\"medium\""));
    }

    #[test]
    fn load_missing_file_returns_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(Some(&dir.path().join("nope.json"))).unwrap();
        assert_eq!(config.pdf, PdfSettings::default());
        assert_eq!(config.cache.max_size_mb, 2048);
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");

        let mut config = Config::default();
        config.pdf.rows = 4;
        config.pdf.orientation = Orientation::Portrait;
        config.cache.max_size_mb = 10;
        config.save(Some(&path)).unwrap();

        let loaded = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded.pdf.rows, 4);
        assert_eq!(loaded.pdf.orientation, Orientation::Portrait);
        assert_eq!(loaded.cache.max_size_bytes(), 10 * 1024 * 1024);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "pdf": { "rows": 3 } }"#).unwrap();

        let loaded = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded.pdf.rows, 3);
        assert_eq!(loaded.pdf.columns, 2);
        assert_eq!(loaded.cache.max_size_mb, 2048);
    }

    #[test]
    fn explicit_cache_directory_wins() {
        let cfg = CacheConfig {
            max_size_mb: 1,
            directory: Some(PathBuf::from("/tmp/somewhere")),
        };
        assert_eq!(cfg.resolve_directory().unwrap(), PathBuf::from("/tmp/somewhere"));
    }
}
