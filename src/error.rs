use std::path::PathBuf;
use thiserror::Error;

/// Conditions a caller is expected to tell apart.
///
/// Library functions return `anyhow::Result`; when one of these is the cause,
/// recover it with `err.downcast_ref::<Error>()`.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Photo not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("No captioned photos to include in PDF")]
    NoCaptionedPhotos,

    #[error("Failed to save caption to {}", .0.display())]
    CaptionWrite(PathBuf),

    #[error("Invalid PDF settings: {0}")]
    InvalidSettings(String),
}
