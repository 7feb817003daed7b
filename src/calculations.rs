//! Pure calculation functions for dimensions and the quality ladder.
//!
//! All functions here are pure and testable without any I/O or images.

/// Calculate dimensions that fit within a maximum width, preserving
/// aspect ratio.
///
/// Sources at or under the bound are returned unchanged; previews are
/// never upscaled.
///
/// # Examples
/// ```
/// # use klick_preview::calculations::fit_width;
/// // 4000x3000 bounded to 1024 → 1024x768
/// assert_eq!(fit_width((4000, 3000), 1024), (1024, 768));
///
/// // Already under the bound → unchanged
/// assert_eq!(fit_width((800, 600), 1024), (800, 600));
/// ```
pub fn fit_width(source: (u32, u32), max_width: u32) -> (u32, u32) {
    let (w, h) = source;
    if w <= max_width {
        return (w, h);
    }
    let ratio = max_width as f64 / w as f64;
    (max_width, ((h as f64 * ratio).round() as u32).max(1))
}

/// Scale dimensions by a factor, preserving aspect ratio.
///
/// Used for the fallback downsize pass when the quality ladder bottoms
/// out. Both dimensions are clamped to at least 1px.
pub fn scale_dimensions(source: (u32, u32), factor: f64) -> (u32, u32) {
    let (w, h) = source;
    (
        ((w as f64 * factor).round() as u32).max(1),
        ((h as f64 * factor).round() as u32).max(1),
    )
}

/// The descending sequence of JPEG qualities to try.
///
/// Steps by `coarse` above `midpoint` and by `fine` at or below it, so
/// the search moves fast through the high range where size barely drops
/// and slows down where each step matters.
///
/// # Examples
/// ```
/// # use klick_preview::calculations::quality_ladder;
/// assert_eq!(
///     quality_ladder(85, 20, 50, 10, 5),
///     vec![85, 75, 65, 55, 45, 40, 35, 30, 25, 20],
/// );
/// ```
pub fn quality_ladder(start: u8, floor: u8, midpoint: u8, coarse: u8, fine: u8) -> Vec<u8> {
    let mut rungs = Vec::new();
    let mut quality = start;
    loop {
        rungs.push(quality);
        let step = if quality > midpoint { coarse } else { fine };
        match quality.checked_sub(step) {
            Some(next) if next >= floor => quality = next,
            _ => break,
        }
    }
    rungs
}

/// How the watermark tile is applied to a resized preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatermarkLayout {
    /// Repeat the cached tile as a pattern across the full image.
    Tiled,
    /// Stretch a single tile copy to the image's exact dimensions.
    /// Used when the image is smaller than the tile in either dimension,
    /// where a repeating pattern would be wasted work and can look wrong.
    Stretched,
}

/// Decide the watermark layout for an image of the given dimensions.
pub fn watermark_layout(image: (u32, u32), tile_side: u32) -> WatermarkLayout {
    let (w, h) = image;
    if w >= tile_side && h >= tile_side {
        WatermarkLayout::Tiled
    } else {
        WatermarkLayout::Stretched
    }
}
