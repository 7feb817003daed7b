//! High-level preview generation.
//!
//! These functions wire the stages together: normalize (decode, orient,
//! bound) then compress (watermark, budget ladder). The `_safe` variant
//! is the boundary the upload flow calls: every per-file failure
//! becomes `None` so sibling files in a batch keep going.

use crate::compress::{PreviewResult, compress};
use crate::config::PreviewConfig;
use crate::error::PreviewError;
use crate::normalize::normalize;
use tracing::warn;

/// Generate a preview from raw upload bytes.
///
/// `apply_watermark` distinguishes contributor-facing watermarked
/// previews from gallery-facing clean ones.
pub fn generate_preview(
    bytes: &[u8],
    apply_watermark: bool,
    config: &PreviewConfig,
) -> Result<PreviewResult, PreviewError> {
    let normalized = normalize(bytes, config)?;
    compress(normalized, apply_watermark, config)
}

/// Generate a preview, converting any failure into `None`.
///
/// This is the outermost boundary: batch-upload callers treat a missing
/// preview as a per-file condition, not a reason to abort the batch.
pub fn generate_preview_safe(
    bytes: &[u8],
    apply_watermark: bool,
    config: &PreviewConfig,
) -> Option<PreviewResult> {
    match generate_preview(bytes, apply_watermark, config) {
        Ok(result) => Some(result),
        Err(err) => {
            warn!(%err, "preview generation failed, skipping file");
            None
        }
    }
}
