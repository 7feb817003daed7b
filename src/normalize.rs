//! Resize/orient stage: decode, upright, bound.
//!
//! Takes raw upload bytes and produces an upright raster bounded to the
//! configured maximum width, plus the detected source format that
//! drives the compression ladder. The decompression-bomb cap is checked
//! against the container header *before* any pixel data is decoded,
//! so a crafted 60000x60000 file is rejected for the cost of a header
//! parse.

use crate::calculations::fit_width;
use crate::config::PreviewConfig;
use crate::error::PreviewError;
use crate::format::SourceFormat;
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};
use std::io::Cursor;
use tracing::debug;

/// Output of the resize/orient stage: the working raster and the facts
/// the compression stage needs about it.
pub struct NormalizedImage {
    pub image: DynamicImage,
    pub width: u32,
    pub height: u32,
    pub format: SourceFormat,
}

/// Decode `bytes`, apply any embedded EXIF rotation, and resize to fit
/// within `config.max_width` (never upscaling).
pub fn normalize(bytes: &[u8], config: &PreviewConfig) -> Result<NormalizedImage, PreviewError> {
    let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
    let format = SourceFormat::from_detected(reader.format());

    // Header-only dimension read: the bomb cap must trip before the
    // decoder allocates pixel buffers.
    let (header_w, header_h) = reader.into_dimensions().map_err(PreviewError::Decode)?;
    let pixels = header_w as u64 * header_h as u64;
    if pixels > config.max_input_pixels {
        return Err(PreviewError::TooLarge {
            width: header_w,
            height: header_h,
            max_pixels: config.max_input_pixels,
        });
    }

    let decoded = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .decode()
        .map_err(PreviewError::Decode)?;

    let upright = apply_orientation(decoded, read_orientation(bytes));

    let (w, h) = (upright.width(), upright.height());
    let (target_w, target_h) = fit_width((w, h), config.max_width);
    let resized = if (target_w, target_h) != (w, h) {
        upright.resize_exact(target_w, target_h, FilterType::Lanczos3)
    } else {
        upright
    };

    let (out_w, out_h) = (resized.width(), resized.height());
    if out_w == 0 || out_h == 0 {
        return Err(PreviewError::Dimension);
    }

    debug!(
        source = format!("{header_w}x{header_h}"),
        output = format!("{out_w}x{out_h}"),
        ?format,
        "normalized upload"
    );

    Ok(NormalizedImage {
        image: resized,
        width: out_w,
        height: out_h,
        format,
    })
}

/// Read the EXIF orientation tag (0x0112) from the raw bytes.
/// Returns 1 (upright) when there is no EXIF data or no orientation tag.
fn read_orientation(bytes: &[u8]) -> u32 {
    let mut cursor = Cursor::new(bytes);
    let Ok(exif) = exif::Reader::new().read_from_container(&mut cursor) else {
        return 1;
    };
    exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|field| field.value.get_uint(0))
        .unwrap_or(1)
}

/// Apply an EXIF orientation value so the raster is visually upright.
///
/// 1 = upright, 2 = mirrored, 3 = 180°, 4 = flipped vertically,
/// 5-8 = the four 90°-rotated variants. Unknown values pass through.
fn apply_orientation(img: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}
