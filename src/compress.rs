//! Compression/budget stage: watermark composite, then a format-aware
//! re-encode ladder that walks down quality, dimensions, and finally
//! codec until the byte budget is met or the options run out.
//!
//! The ladder never fails because of size alone. Whatever the final
//! rung produces is returned, over budget or not: dropping the preview
//! would be worse than serving a slightly heavy one.
//!
//! PNG sources get a dedicated path (lossless → palette → downsized
//! palette) because their alpha channel is the reason they were PNG in
//! the first place; the gallery's transparency checkerboard depends on
//! it. Only the very last rung trades alpha fidelity for size, and even
//! that rung is WebP rather than JPEG so the channel itself survives.

use crate::calculations::{WatermarkLayout, quality_ladder, scale_dimensions, watermark_layout};
use crate::config::PreviewConfig;
use crate::error::PreviewError;
use crate::format::{PreviewFormat, SourceFormat};
use crate::normalize::NormalizedImage;
use crate::tile::{WatermarkTile, watermark_tile};
use image::imageops::FilterType;
use image::{DynamicImage, ImageEncoder, ImageReader, RgbaImage, imageops};
use std::io::Cursor;
use tracing::debug;

/// Width factor for the fallback downsize pass.
const DOWNSIZE_RATIO: f64 = 0.75;

/// Palette floor for the aggressive quantization rung.
const MIN_PALETTE_COLORS: u16 = 32;

/// A finished preview: encoded bytes plus the facts the upload flow
/// persists alongside them.
#[derive(Debug, Clone)]
pub struct PreviewResult {
    pub buffer: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: PreviewFormat,
}

/// Run the compression stage on a normalized image.
pub fn compress(
    normalized: NormalizedImage,
    apply_watermark: bool,
    config: &PreviewConfig,
) -> Result<PreviewResult, PreviewError> {
    let NormalizedImage { image, format, .. } = normalized;

    let image = if apply_watermark {
        DynamicImage::ImageRgba8(composite_watermark(&image, watermark_tile()))
    } else {
        image
    };

    let (buffer, format) = match format {
        SourceFormat::Png => compress_png(&image, config)?,
        SourceFormat::Jpeg | SourceFormat::WebP | SourceFormat::Other => {
            compress_lossy(&image, config)?
        }
    };

    // Report the dimensions of what was actually encoded; a last-resort
    // downsize pass makes these smaller than the normalized input.
    let (width, height) = encoded_dimensions(&buffer)?;
    debug!(
        ?format,
        bytes = buffer.len(),
        output = format!("{width}x{height}"),
        "preview encoded"
    );

    Ok(PreviewResult {
        buffer,
        width,
        height,
        format,
    })
}

/// Stamp the watermark tile over the (already resized) image.
///
/// Images covering the tile in both dimensions get the cached tile
/// repeated as a pattern; smaller images get a single copy stretched to
/// their exact dimensions.
fn composite_watermark(image: &DynamicImage, tile: &WatermarkTile) -> RgbaImage {
    let mut canvas = image.to_rgba8();
    let (w, h) = canvas.dimensions();

    match watermark_layout((w, h), tile.side()) {
        WatermarkLayout::Tiled => {
            let side = tile.side();
            let mut y = 0;
            while y < h {
                let mut x = 0;
                while x < w {
                    imageops::overlay(&mut canvas, tile.raster(), x as i64, y as i64);
                    x += side;
                }
                y += side;
            }
        }
        WatermarkLayout::Stretched => {
            let stretched = imageops::resize(tile.raster(), w, h, FilterType::Lanczos3);
            imageops::overlay(&mut canvas, &stretched, 0, 0);
        }
    }

    canvas
}

/// PNG path: lossless first, then palette quantization, then one
/// downsize pass with a smaller palette, then the WebP last resort.
fn compress_png(
    image: &DynamicImage,
    config: &PreviewConfig,
) -> Result<(Vec<u8>, PreviewFormat), PreviewError> {
    let rgba = image.to_rgba8();

    let lossless = encode_png_best(&rgba)?;
    if lossless.len() <= config.byte_budget {
        return Ok((lossless, PreviewFormat::Png));
    }
    debug!(bytes = lossless.len(), "lossless png over budget");

    let quantized = encode_png_indexed(&rgba, config.png_palette_colors, config.png_palette_sample)?;
    if quantized.len() <= config.byte_budget {
        return Ok((quantized, PreviewFormat::Png));
    }
    debug!(bytes = quantized.len(), "quantized png over budget");

    let (down_w, down_h) = scale_dimensions(rgba.dimensions(), DOWNSIZE_RATIO);
    let downsized = imageops::resize(&rgba, down_w, down_h, FilterType::Lanczos3);
    let colors = (config.png_palette_colors / 2).max(MIN_PALETTE_COLORS);
    let aggressive = encode_png_indexed(&downsized, colors, config.png_palette_sample)?;
    if aggressive.len() <= config.byte_budget {
        return Ok((aggressive, PreviewFormat::Png));
    }
    debug!(bytes = aggressive.len(), "downsized png over budget");

    // Last resort. WebP still carries the alpha channel, so transparency
    // degrades in fidelity rather than disappearing.
    let webp = encode_webp(&DynamicImage::ImageRgba8(downsized), config.webp_fallback_quality);
    Ok((webp, PreviewFormat::WebP))
}

/// Lossy path (JPEG and everything that defaults to it): walk the
/// quality ladder, then downsize once at a relaxed quality, then WebP.
fn compress_lossy(
    image: &DynamicImage,
    config: &PreviewConfig,
) -> Result<(Vec<u8>, PreviewFormat), PreviewError> {
    let rungs = quality_ladder(
        config.jpeg_quality_start,
        config.jpeg_quality_floor,
        config.jpeg_quality_midpoint,
        config.jpeg_step_coarse,
        config.jpeg_step_fine,
    );
    for quality in rungs {
        let encoded = encode_jpeg(image, quality)?;
        if encoded.len() <= config.byte_budget {
            debug!(quality, bytes = encoded.len(), "jpeg met budget");
            return Ok((encoded, PreviewFormat::Jpeg));
        }
    }
    debug!("jpeg ladder hit quality floor over budget");

    // Floor reached without success: shrink once, relax the quality a
    // coarse step above the floor.
    let (down_w, down_h) = scale_dimensions((image.width(), image.height()), DOWNSIZE_RATIO);
    let downsized = image.resize_exact(down_w, down_h, FilterType::Lanczos3);
    let relaxed = config
        .jpeg_quality_floor
        .saturating_add(config.jpeg_step_coarse)
        .min(100);
    let encoded = encode_jpeg(&downsized, relaxed)?;
    if encoded.len() <= config.byte_budget {
        debug!(bytes = encoded.len(), "downsized jpeg met budget");
        return Ok((encoded, PreviewFormat::Jpeg));
    }

    // Last resort: WebP's better compression-per-quality ratio is the
    // one lever left. Returned whatever its size.
    let webp = encode_webp(&downsized, config.webp_fallback_quality);
    debug!(bytes = webp.len(), "webp last resort");
    Ok((webp, PreviewFormat::WebP))
}

fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, PreviewError> {
    let rgb = image.to_rgb8();
    let mut buf = Vec::new();
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, quality)
        .write_image(
            rgb.as_raw(),
            rgb.width(),
            rgb.height(),
            image::ExtendedColorType::Rgb8,
        )
        .map_err(|e| PreviewError::encode("jpeg", e))?;
    Ok(buf)
}

fn encode_png_best(rgba: &RgbaImage) -> Result<Vec<u8>, PreviewError> {
    let mut buf = Vec::new();
    image::codecs::png::PngEncoder::new_with_quality(
        &mut buf,
        image::codecs::png::CompressionType::Best,
        image::codecs::png::FilterType::Adaptive,
    )
    .write_image(
        rgba.as_raw(),
        rgba.width(),
        rgba.height(),
        image::ExtendedColorType::Rgba8,
    )
    .map_err(|e| PreviewError::encode("png", e))?;
    Ok(buf)
}

/// Indexed-color PNG via NeuQuant: palette in PLTE, per-entry alpha in
/// tRNS, so transparency survives quantization.
fn encode_png_indexed(
    rgba: &RgbaImage,
    colors: u16,
    sample: u8,
) -> Result<Vec<u8>, PreviewError> {
    let pixels = rgba.as_raw();
    let quantizer = color_quant::NeuQuant::new(sample as i32, colors as usize, pixels);

    let indices: Vec<u8> = pixels
        .chunks_exact(4)
        .map(|pixel| quantizer.index_of(pixel) as u8)
        .collect();

    let palette = quantizer.color_map_rgba();
    let mut plte = Vec::with_capacity(palette.len() / 4 * 3);
    let mut trns = Vec::with_capacity(palette.len() / 4);
    for entry in palette.chunks_exact(4) {
        plte.extend_from_slice(&entry[0..3]);
        trns.push(entry[3]);
    }

    let mut buf = Vec::new();
    let mut encoder = png::Encoder::new(&mut buf, rgba.width(), rgba.height());
    encoder.set_color(png::ColorType::Indexed);
    encoder.set_depth(png::BitDepth::Eight);
    encoder.set_compression(png::Compression::Best);
    encoder.set_palette(plte);
    encoder.set_trns(trns);
    let mut writer = encoder
        .write_header()
        .map_err(|e| PreviewError::encode("png", e))?;
    writer
        .write_image_data(&indices)
        .map_err(|e| PreviewError::encode("png", e))?;
    writer.finish().map_err(|e| PreviewError::encode("png", e))?;
    Ok(buf)
}

fn encode_webp(image: &DynamicImage, quality: u8) -> Vec<u8> {
    let rgba = image.to_rgba8();
    webp::Encoder::from_rgba(rgba.as_raw(), rgba.width(), rgba.height())
        .encode(quality as f32)
        .to_vec()
}

/// Header-only dimension read of the finished buffer.
fn encoded_dimensions(buffer: &[u8]) -> Result<(u32, u32), PreviewError> {
    ImageReader::new(Cursor::new(buffer))
        .with_guessed_format()?
        .into_dimensions()
        .map_err(|_| PreviewError::Dimension)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba};

    fn normalized(image: DynamicImage, format: SourceFormat) -> NormalizedImage {
        let (width, height) = (image.width(), image.height());
        NormalizedImage {
            image,
            width,
            height,
            format,
        }
    }

    /// Smooth gradient, compresses like photographic content.
    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([
                (x * 255 / width.max(1)) as u8,
                (y * 255 / height.max(1)) as u8,
                96,
            ])
        }))
    }

    /// Deterministic per-pixel noise, defeats every codec.
    fn noise(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            let mut v = x.wrapping_mul(0x9E37_79B9) ^ y.wrapping_mul(0x85EB_CA6B);
            v ^= v >> 13;
            v = v.wrapping_mul(0xC2B2_AE35);
            Rgb([(v & 0xFF) as u8, ((v >> 8) & 0xFF) as u8, ((v >> 16) & 0xFF) as u8])
        }))
    }

    fn translucent(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_fn(width, height, |x, _| {
            Rgba([200, 40, 40, if x % 2 == 0 { 128 } else { 255 }])
        }))
    }

    // =========================================================================
    // Watermark compositing
    // =========================================================================

    #[test]
    fn composite_preserves_dimensions() {
        let tile = watermark_tile();
        let large = DynamicImage::ImageRgb8(RgbImage::from_pixel(900, 500, Rgb([128, 128, 128])));
        assert_eq!(composite_watermark(&large, tile).dimensions(), (900, 500));

        let small = DynamicImage::ImageRgb8(RgbImage::from_pixel(150, 90, Rgb([128, 128, 128])));
        assert_eq!(composite_watermark(&small, tile).dimensions(), (150, 90));
    }

    #[test]
    fn tiled_composite_repeats_across_cells() {
        let tile = watermark_tile();
        let base = DynamicImage::ImageRgb8(RgbImage::from_pixel(900, 500, Rgb([128, 128, 128])));
        let stamped = composite_watermark(&base, tile);

        let changed_in = |x0: u32, x1: u32| {
            stamped
                .enumerate_pixels()
                .any(|(x, _, p)| x >= x0 && x < x1 && p.0[0] != 128)
        };
        // The mark shows up in the first tile cell and again in the second.
        assert!(changed_in(0, 400), "first cell should carry the mark");
        assert!(changed_in(400, 800), "second cell should repeat the mark");
    }

    #[test]
    fn stretched_composite_marks_small_images() {
        let tile = watermark_tile();
        let base = DynamicImage::ImageRgb8(RgbImage::from_pixel(150, 90, Rgb([128, 128, 128])));
        let stamped = composite_watermark(&base, tile);
        let changed = stamped.pixels().filter(|p| p.0[0] != 128).count();
        assert!(changed > 0, "stretched mark should alter pixels");
    }

    // =========================================================================
    // PNG path
    // =========================================================================

    #[test]
    fn small_png_stays_lossless() {
        let source = translucent(60, 40);
        let result = compress(
            normalized(source.clone(), SourceFormat::Png),
            false,
            &PreviewConfig::default(),
        )
        .unwrap();

        assert_eq!(result.format, PreviewFormat::Png);
        let decoded = image::load_from_memory(&result.buffer).unwrap();
        assert_eq!(decoded.to_rgba8(), source.to_rgba8());
    }

    #[test]
    fn png_over_budget_falls_to_palette_but_keeps_alpha() {
        // Noise forces the lossless rung over a small budget; quantized
        // indexed output with tRNS still reports an alpha-capable format.
        let source = DynamicImage::ImageRgba8(RgbaImage::from_fn(200, 200, |x, y| {
            let v = (x * 7 + y * 13) % 251;
            Rgba([v as u8, (v * 3 % 255) as u8, (v * 5 % 255) as u8, 200])
        }));
        let config = PreviewConfig {
            byte_budget: 20 * 1024,
            ..PreviewConfig::default()
        };
        let result = compress(normalized(source, SourceFormat::Png), false, &config).unwrap();

        assert_eq!(result.format, PreviewFormat::Png);
        assert!(result.buffer.len() <= config.byte_budget);
        let decoded = image::load_from_memory(&result.buffer).unwrap();
        assert!(decoded.color().has_alpha());
    }

    #[test]
    fn png_exhaustion_ends_in_webp_with_alpha() {
        let source = DynamicImage::ImageRgba8(RgbaImage::from_fn(300, 300, |x, y| {
            let mut v = x.wrapping_mul(0x9E37_79B9) ^ y.wrapping_mul(0x85EB_CA6B);
            v ^= v >> 13;
            Rgba([(v & 0xFF) as u8, ((v >> 8) & 0xFF) as u8, ((v >> 16) & 0xFF) as u8, 180])
        }));
        // Budget no PNG rung can meet for pure noise.
        let config = PreviewConfig {
            byte_budget: 1024,
            ..PreviewConfig::default()
        };
        let result = compress(normalized(source, SourceFormat::Png), false, &config).unwrap();

        assert_eq!(result.format, PreviewFormat::WebP);
        // Downsize pass ran before the codec swap.
        assert_eq!(result.width, 225);
        let decoded = image::load_from_memory(&result.buffer).unwrap();
        assert!(decoded.color().has_alpha());
    }

    // =========================================================================
    // Lossy path
    // =========================================================================

    #[test]
    fn smooth_jpeg_meets_budget_at_full_size() {
        let result = compress(
            normalized(gradient(640, 480), SourceFormat::Jpeg),
            false,
            &PreviewConfig::default(),
        )
        .unwrap();

        assert_eq!(result.format, PreviewFormat::Jpeg);
        assert!(result.buffer.len() <= PreviewConfig::default().byte_budget);
        assert_eq!((result.width, result.height), (640, 480));
    }

    #[test]
    fn noise_exhausts_ladder_and_still_returns() {
        let config = PreviewConfig {
            byte_budget: 2 * 1024,
            ..PreviewConfig::default()
        };
        let result = compress(normalized(noise(600, 448), SourceFormat::Jpeg), false, &config)
            .unwrap();

        // Last resort is WebP at the downsized dimensions.
        assert_eq!(result.format, PreviewFormat::WebP);
        assert_eq!(result.width, 450);
        assert_eq!(result.height, 336);
        assert!(!result.buffer.is_empty());
    }

    #[test]
    fn other_formats_take_the_lossy_path() {
        let result = compress(
            normalized(gradient(320, 240), SourceFormat::Other),
            false,
            &PreviewConfig::default(),
        )
        .unwrap();
        assert_eq!(result.format, PreviewFormat::Jpeg);
    }

    // =========================================================================
    // Watermark toggle
    // =========================================================================

    #[test]
    fn watermark_toggle_changes_output() {
        let source = gradient(500, 420);
        let clean = compress(
            normalized(source.clone(), SourceFormat::Jpeg),
            false,
            &PreviewConfig::default(),
        )
        .unwrap();
        let marked = compress(
            normalized(source, SourceFormat::Jpeg),
            true,
            &PreviewConfig::default(),
        )
        .unwrap();

        assert_ne!(clean.buffer, marked.buffer);
        assert_eq!((clean.width, clean.height), (marked.width, marked.height));
    }

    #[test]
    fn clean_png_preview_is_pixel_identical_to_input() {
        let source = translucent(80, 60);
        let result = compress(
            normalized(source.clone(), SourceFormat::Png),
            false,
            &PreviewConfig::default(),
        )
        .unwrap();
        let decoded = image::load_from_memory(&result.buffer).unwrap();
        assert_eq!(decoded.to_rgba8(), source.to_rgba8());
    }
}
