//! # klick-preview
//!
//! Preview generation for the KlickStock image marketplace: given the
//! raw bytes of an uploaded image, produce a size-bounded, optionally
//! watermarked derivative plus its final dimensions. The upload flow
//! stores the result next to the original; the gallery serves it in
//! place of the full asset.
//!
//! # Architecture: Three-Stage Pipeline
//!
//! ```text
//! 1. Tile      embedded SVG mark  →  cached 400px raster   (once per process)
//! 2. Normalize upload bytes       →  upright, bounded raster + source format
//! 3. Compress  raster             →  encoded preview ≤ byte budget (best effort)
//! ```
//!
//! The stages are independent on purpose:
//!
//! - **Tile** has no inputs and renders exactly once per process: the
//!   brand mark is static, so every call shares one raster.
//! - **Normalize** is where untrusted bytes are handled: header-first
//!   dimension checks reject decompression bombs before any pixel
//!   allocation, and EXIF rotation is applied so downstream stages only
//!   ever see upright images.
//! - **Compress** walks a format-aware ladder (quality, then dimensions,
//!   then codec) until the byte budget is met or options run out, and
//!   returns its last attempt either way. A preview that is slightly too
//!   heavy beats no preview.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`config`] | `PreviewConfig` tunables with production defaults and validation |
//! | [`error`] | `PreviewError`, the per-call failure taxonomy |
//! | [`format`] | Source/output format enums, decided once after decode |
//! | [`calculations`] | Pure dimension and ladder math, no I/O |
//! | [`tile`] | Watermark tile provider (process-wide cache) |
//! | [`normalize`] | Decode, EXIF orient, bounded resize |
//! | [`compress`] | Watermark composite + compression-budget ladder |
//! | [`preview`] | `generate_preview` / `generate_preview_safe` entry points |
//!
//! # Design Decisions
//!
//! ## PNG Stays PNG
//!
//! PNG sources carry transparency the gallery renders against a
//! checkerboard; silently flattening it is a correctness bug, not a
//! space optimization. The PNG ladder therefore exhausts lossless and
//! palette-quantized rungs before the last resort, and the last resort
//! is WebP (which still has an alpha channel) rather than JPEG.
//!
//! ## The Ladder Never Fails On Size
//!
//! The byte budget is a target, not a contract. A degenerate
//! high-entropy upload that cannot be brought under budget still gets a
//! preview: the final downsized WebP attempt is returned regardless of
//! its size. The only hard failures are undecodable input and the
//! defensive pixel cap.
//!
//! ## No Internal Parallelism
//!
//! Each call is one pure, synchronous computation. Batch uploads are
//! parallelized by the caller (one upload per task); the only shared
//! state is the watermark tile, which is immutable after first render,
//! so calls need no coordination.
//!
//! ## Callers Decide What A Failure Means
//!
//! [`generate_preview_safe`](preview::generate_preview_safe) converts
//! every per-call error into `None` and a `tracing` warning. One
//! corrupt file in a ten-file upload batch costs that file its preview,
//! nothing else.

pub mod calculations;
pub mod compress;
pub mod config;
pub mod error;
pub mod format;
pub mod normalize;
pub mod preview;
pub mod tile;

pub use compress::{PreviewResult, compress};
pub use config::{ConfigError, PreviewConfig};
pub use error::PreviewError;
pub use format::{PreviewFormat, SourceFormat};
pub use normalize::{NormalizedImage, normalize};
pub use preview::{generate_preview, generate_preview_safe};
pub use tile::{TILE_SIZE, WatermarkTile, watermark_tile};
