//! Preview generation tunables.
//!
//! The host application owns config loading (env, TOML, database, its
//! choice); this crate only defines the struct and its defaults. All
//! fields have production defaults, so embedding code can start from
//! `PreviewConfig::default()` and override the values it cares about.
//! Unknown keys are rejected to catch typos early.
//!
//! ```
//! use klick_preview::PreviewConfig;
//!
//! let config = PreviewConfig {
//!     max_width: 1024,
//!     byte_budget: 60 * 1024,
//!     ..PreviewConfig::default()
//! };
//! assert!(config.validate().is_ok());
//! ```
//!
//! The watermark tile side length is a process-wide constant
//! ([`TILE_SIZE`](crate::tile::TILE_SIZE)), not a per-call field: the
//! tile is rendered once per process and shared by every call.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config validation error: {0}")]
    Validation(String),
}

/// Tunables for the preview pipeline.
///
/// Defaults follow the current production deployment: 1600px previews
/// with a 60KB byte budget, JPEG ladder from 85 down to 20.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PreviewConfig {
    /// Maximum preview width in pixels. Height follows the source aspect
    /// ratio; sources narrower than this are never enlarged.
    pub max_width: u32,
    /// Target output size in bytes. A soft goal: the ladder stops early
    /// when it is met, and returns its last attempt when it cannot be.
    pub byte_budget: usize,
    /// Decompression-bomb cap: sources whose header reports more pixels
    /// than this are rejected before any pixel data is decoded.
    pub max_input_pixels: u64,
    /// First JPEG quality tried.
    pub jpeg_quality_start: u8,
    /// Lowest JPEG quality the ladder will try before falling back to a
    /// downsize pass.
    pub jpeg_quality_floor: u8,
    /// Quality above which the ladder steps by `jpeg_step_coarse`, at or
    /// below which it steps by `jpeg_step_fine`.
    pub jpeg_quality_midpoint: u8,
    pub jpeg_step_coarse: u8,
    pub jpeg_step_fine: u8,
    /// Palette size for the quantized PNG rung (2–256). The downsize
    /// rung halves this.
    pub png_palette_colors: u16,
    /// NeuQuant sampling factor (1–30; 1 is slowest/best).
    pub png_palette_sample: u8,
    /// Quality for the last-resort WebP encode.
    pub webp_fallback_quality: u8,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            max_width: 1600,
            byte_budget: 60 * 1024,
            max_input_pixels: 50_000_000,
            jpeg_quality_start: 85,
            jpeg_quality_floor: 20,
            jpeg_quality_midpoint: 50,
            jpeg_step_coarse: 10,
            jpeg_step_fine: 5,
            png_palette_colors: 256,
            png_palette_sample: 10,
            webp_fallback_quality: 45,
        }
    }
}

impl PreviewConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_width == 0 {
            return Err(ConfigError::Validation("max_width must be non-zero".into()));
        }
        if self.byte_budget == 0 {
            return Err(ConfigError::Validation(
                "byte_budget must be non-zero".into(),
            ));
        }
        if self.max_input_pixels == 0 {
            return Err(ConfigError::Validation(
                "max_input_pixels must be non-zero".into(),
            ));
        }
        for (name, value) in [
            ("jpeg_quality_start", self.jpeg_quality_start),
            ("jpeg_quality_floor", self.jpeg_quality_floor),
            ("jpeg_quality_midpoint", self.jpeg_quality_midpoint),
            ("webp_fallback_quality", self.webp_fallback_quality),
        ] {
            if value == 0 || value > 100 {
                return Err(ConfigError::Validation(format!("{name} must be 1-100")));
            }
        }
        if self.jpeg_quality_floor > self.jpeg_quality_start {
            return Err(ConfigError::Validation(
                "jpeg_quality_floor must not exceed jpeg_quality_start".into(),
            ));
        }
        if self.jpeg_step_coarse == 0 || self.jpeg_step_fine == 0 {
            return Err(ConfigError::Validation(
                "jpeg ladder steps must be non-zero".into(),
            ));
        }
        if self.png_palette_colors < 2 || self.png_palette_colors > 256 {
            return Err(ConfigError::Validation(
                "png_palette_colors must be 2-256".into(),
            ));
        }
        if self.png_palette_sample == 0 || self.png_palette_sample > 30 {
            return Err(ConfigError::Validation(
                "png_palette_sample must be 1-30".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(PreviewConfig::default().validate().is_ok());
    }

    #[test]
    fn default_budget_is_60kb() {
        assert_eq!(PreviewConfig::default().byte_budget, 61_440);
    }

    #[test]
    fn zero_max_width_rejected() {
        let config = PreviewConfig {
            max_width: 0,
            ..PreviewConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn quality_above_100_rejected() {
        let config = PreviewConfig {
            jpeg_quality_start: 101,
            ..PreviewConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn floor_above_start_rejected() {
        let config = PreviewConfig {
            jpeg_quality_start: 30,
            jpeg_quality_floor: 40,
            ..PreviewConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_step_rejected() {
        let config = PreviewConfig {
            jpeg_step_fine: 0,
            ..PreviewConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn single_color_palette_rejected() {
        let config = PreviewConfig {
            png_palette_colors: 1,
            ..PreviewConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_keys_rejected() {
        let result: Result<PreviewConfig, _> =
            serde_json::from_str(r#"{"max_width": 800, "no_such_key": 1}"#);
        assert!(result.is_err());
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: PreviewConfig = serde_json::from_str(r#"{"max_width": 800}"#).unwrap();
        assert_eq!(config.max_width, 800);
        assert_eq!(config.jpeg_quality_start, 85);
    }
}
