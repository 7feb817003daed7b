//! Source and output format tags.
//!
//! The source format is decided exactly once, from the decoder's magic-byte
//! detection, and drives the compression-ladder strategy as an enum match
//! rather than string comparisons scattered through the logic.

use serde::Serialize;

/// Detected format of the uploaded source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Png,
    Jpeg,
    WebP,
    /// Any other decodable raster (TIFF, BMP, ...). Compressed on the
    /// lossy path like JPEG.
    Other,
}

impl SourceFormat {
    /// Map the decoder's detected format. `None` means the decoder could
    /// not identify the container, which only happens right before a
    /// decode failure anyway.
    pub(crate) fn from_detected(format: Option<image::ImageFormat>) -> Self {
        match format {
            Some(image::ImageFormat::Png) => Self::Png,
            Some(image::ImageFormat::Jpeg) => Self::Jpeg,
            Some(image::ImageFormat::WebP) => Self::WebP,
            _ => Self::Other,
        }
    }
}

/// Codec that won the compression ladder.
///
/// The upload flow persists this next to the stored preview so the
/// serving layer can set the right content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PreviewFormat {
    Jpeg,
    Png,
    WebP,
}

impl PreviewFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::WebP => "image/webp",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::WebP => "webp",
        }
    }
}
