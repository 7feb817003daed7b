//! Error taxonomy for the preview pipeline.
//!
//! Every variant is a per-call failure: the outermost boundary
//! ([`generate_preview_safe`](crate::preview::generate_preview_safe))
//! converts all of them into a skipped preview so one bad file never
//! aborts a batch of uploads.
//!
//! There is deliberately no "budget exhausted" variant. The compression
//! ladder always returns its last attempt, even when it exceeds the byte
//! budget. Size is a soft goal; a successfully encoded preview is the
//! hard requirement.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PreviewError {
    /// Input bytes are not a recognizable raster image.
    #[error("undecodable image: {0}")]
    Decode(#[source] image::ImageError),

    /// Input dimensions exceed the decompression-bomb cap. Checked from
    /// the header before any pixel data is decoded.
    #[error("image too large: {width}x{height} exceeds the {max_pixels} pixel cap")]
    TooLarge {
        width: u32,
        height: u32,
        max_pixels: u64,
    },

    /// Post-processing dimensions could not be determined. Should be
    /// unreachable after a successful decode; treated as non-recoverable
    /// for the call.
    #[error("could not determine preview dimensions")]
    Dimension,

    /// An encoder rejected the working raster.
    #[error("{codec} encode failed: {reason}")]
    Encode {
        codec: &'static str,
        reason: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PreviewError {
    pub(crate) fn encode(codec: &'static str, reason: impl ToString) -> Self {
        Self::Encode {
            codec,
            reason: reason.to_string(),
        }
    }
}
