//! Watermark tile provider.
//!
//! The brand mark ships as an embedded SVG (vector paths only, no text
//! nodes, so rendering needs no fonts) and is rasterized exactly once
//! per process into a square transparent tile: a diagonal "KS" mark in
//! white at 25% alpha. The compression stage stamps this tile over
//! contributor-facing previews, either repeated as a pattern or
//! stretched to cover small images.
//!
//! The cache is a [`LazyLock`]: constructed on first demand, immutable
//! afterwards, shared by every call for the life of the process. A
//! malformed embedded mark is a packaging defect, not a per-request
//! condition, and panics at first use.

use image::{DynamicImage, ImageFormat, RgbaImage};
use std::io::Cursor;
use std::sync::LazyLock;

/// Side length of the watermark tile in pixels.
///
/// Also the threshold for the tiled-vs-stretched layout decision:
/// previews smaller than this in either dimension get a single
/// stretched copy instead of a repeating pattern.
pub const TILE_SIZE: u32 = 400;

/// The brand mark, authored at the tile's native size. Strokes only;
/// opacity is baked into the mark so compositing is a plain `over`.
const BRAND_MARK_SVG: &[u8] = br##"<svg width="400" height="400" viewBox="0 0 400 400" xmlns="http://www.w3.org/2000/svg">
  <g transform="rotate(-45 200 200)" fill="none" stroke="#ffffff" stroke-opacity="0.25" stroke-width="10" stroke-linecap="round" stroke-linejoin="round">
    <path d="M150 160 L150 240"/>
    <path d="M196 160 L150 200 L196 240"/>
    <path d="M252 170 C232 154 204 162 208 182 C212 202 248 198 252 218 C256 238 228 246 208 230"/>
  </g>
</svg>"##;

static TILE: LazyLock<WatermarkTile> =
    LazyLock::new(|| render_tile().expect("embedded watermark mark failed to render"));

/// The process-wide watermark tile: the rendered raster plus its PNG
/// encoding. Both come from the same single render: the raster feeds
/// compositing, the PNG bytes are the stable external representation.
pub struct WatermarkTile {
    rgba: RgbaImage,
    png: Vec<u8>,
}

impl WatermarkTile {
    /// The decoded tile raster (RGBA, transparent background).
    pub fn raster(&self) -> &RgbaImage {
        &self.rgba
    }

    /// PNG encoding of the tile. Byte-identical across calls.
    pub fn png_bytes(&self) -> &[u8] {
        &self.png
    }

    /// Tile side length in pixels.
    pub fn side(&self) -> u32 {
        self.rgba.width()
    }
}

/// Fetch the cached watermark tile, rendering it on first use.
pub fn watermark_tile() -> &'static WatermarkTile {
    &TILE
}

/// Rasterize the embedded SVG mark into a `TILE_SIZE` square tile.
fn render_tile() -> Result<WatermarkTile, String> {
    let options = resvg::usvg::Options::default();
    let tree = resvg::usvg::Tree::from_data(BRAND_MARK_SVG, &options)
        .map_err(|e| format!("brand mark SVG parse error: {e}"))?;

    let mut pixmap = resvg::tiny_skia::Pixmap::new(TILE_SIZE, TILE_SIZE)
        .ok_or_else(|| "failed to allocate tile pixmap".to_string())?;

    // Scale from the mark's authored size to the tile size.
    let authored = tree.size().width().max(1.0);
    let scale = TILE_SIZE as f32 / authored;
    let transform = resvg::tiny_skia::Transform::from_scale(scale, scale);
    resvg::render(&tree, transform, &mut pixmap.as_mut());

    // tiny-skia stores premultiplied pixels; convert to straight RGBA.
    let mut rgba = Vec::with_capacity((TILE_SIZE * TILE_SIZE * 4) as usize);
    for pixel in pixmap.pixels() {
        let c = pixel.demultiply();
        rgba.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
    }
    let rgba = RgbaImage::from_raw(TILE_SIZE, TILE_SIZE, rgba)
        .ok_or_else(|| "tile pixel buffer has unexpected length".to_string())?;

    let mut png = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(rgba.clone())
        .write_to(&mut png, ImageFormat::Png)
        .map_err(|e| format!("tile PNG encode failed: {e}"))?;

    Ok(WatermarkTile {
        rgba,
        png: png.into_inner(),
    })
}
