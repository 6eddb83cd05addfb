//! Core value types for mask refinement and compositing
//!
//! Every type here is an immutable value: pipeline stages borrow their inputs and
//! return freshly allocated results, so no buffer is ever shared between input and output.

use crate::error::{BgComposeError, Result};
use image::{GrayImage, Luma, RgbImage, RgbaImage};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Quantize a unit-range value to 8 bits: `round(clamp(v, 0, 1) * 255)`
#[must_use]
pub fn unit_to_u8(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Quantize a 0-255 range value to 8 bits with saturation
#[must_use]
pub fn saturate_u8(value: f32) -> u8 {
    value.clamp(0.0, 255.0).round() as u8
}

fn checked_len(width: u32, height: u32, channels: usize) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(channels))
        .ok_or_else(|| {
            BgComposeError::invalid_image(format!(
                "{}x{} image with {} channels overflows the address space",
                width, height, channels
            ))
        })
}

/// Per-pixel foreground probability field
///
/// Values are stored as an `(height, width)` array and are guaranteed to lie in
/// `[0, 1]`. `is_binary` marks masks whose values are already quantized to `{0, 1}`,
/// which lets the refiner skip thresholding.
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    data: Array2<f32>,
    width: u32,
    height: u32,
    is_binary: bool,
}

impl Mask {
    /// Create a mask from an `(height, width)` array, validating the value range
    ///
    /// # Errors
    /// - `InvalidMaskValue` if any value is outside `[0, 1]` or not finite
    /// - `InvalidImage` if a dimension does not fit in `u32`
    pub fn new(data: Array2<f32>, is_binary: bool) -> Result<Self> {
        let (rows, cols) = data.dim();
        let height = u32::try_from(rows)
            .map_err(|_| BgComposeError::invalid_image(format!("mask height {} too large", rows)))?;
        let width = u32::try_from(cols)
            .map_err(|_| BgComposeError::invalid_image(format!("mask width {} too large", cols)))?;

        if let Some(((row, col), &value)) = data
            .indexed_iter()
            .find(|(_, v)| !v.is_finite() || !(0.0..=1.0).contains(*v))
        {
            return Err(BgComposeError::InvalidMaskValue { row, col, value });
        }

        Ok(Self {
            data,
            width,
            height,
            is_binary,
        })
    }

    /// Create a probability mask from row-major values
    ///
    /// # Errors
    /// - `InvalidImage` if `values.len() != width * height`
    /// - `InvalidMaskValue` for out-of-range values
    pub fn from_vec(width: u32, height: u32, values: Vec<f32>) -> Result<Self> {
        let expected = checked_len(width, height, 1)?;
        if values.len() != expected {
            return Err(BgComposeError::invalid_image(format!(
                "mask buffer holds {} values, {}x{} requires {}",
                values.len(),
                width,
                height,
                expected
            )));
        }
        let data = Array2::from_shape_vec((height as usize, width as usize), values)
            .map_err(|e| BgComposeError::invalid_image(e.to_string()))?;
        Self::new(data, false)
    }

    /// Create a uniform mask
    ///
    /// # Errors
    /// - `InvalidMaskValue` if `value` is outside `[0, 1]`
    pub fn filled(width: u32, height: u32, value: f32) -> Result<Self> {
        Self::new(
            Array2::from_elem((height as usize, width as usize), value),
            false,
        )
    }

    /// Create a mask from an 8-bit grayscale image (`v / 255`)
    #[must_use]
    pub fn from_luma(image: &GrayImage) -> Self {
        let (width, height) = image.dimensions();
        let data = Array2::from_shape_fn((height as usize, width as usize), |(row, col)| {
            f32::from(image.get_pixel(col as u32, row as u32)[0]) / 255.0
        });
        Self {
            data,
            width,
            height,
            is_binary: false,
        }
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Mask dimensions as (width, height)
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[must_use]
    pub fn is_binary(&self) -> bool {
        self.is_binary
    }

    /// Raw `(height, width)` values
    #[must_use]
    pub fn data(&self) -> &Array2<f32> {
        &self.data
    }

    #[must_use]
    pub fn into_data(self) -> Array2<f32> {
        self.data
    }

    /// Value at pixel (x, y), or `None` outside the mask
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> Option<f32> {
        self.data.get((y as usize, x as usize)).copied()
    }

    /// 8-bit quantization of the mask (`round(v * 255)`)
    #[must_use]
    pub fn to_u8(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            Luma([unit_to_u8(self.data[[y as usize, x as usize]])])
        })
    }

    /// Hard threshold into a binary mask; values equal to `threshold` are foreground
    #[must_use]
    pub fn threshold(&self, threshold: f32) -> Self {
        Self {
            data: self
                .data
                .mapv(|v| if v >= threshold { 1.0 } else { 0.0 }),
            width: self.width,
            height: self.height,
            is_binary: true,
        }
    }

    /// Foreground/background pixel counts (foreground = value >= 0.5)
    #[must_use]
    pub fn statistics(&self) -> MaskStatistics {
        let total_pixels = self.data.len();
        let foreground_pixels = self.data.iter().filter(|&&v| v >= 0.5).count();
        let background_pixels = total_pixels - foreground_pixels;
        let (foreground_ratio, background_ratio) = if total_pixels == 0 {
            (0.0, 0.0)
        } else {
            (
                foreground_pixels as f32 / total_pixels as f32,
                background_pixels as f32 / total_pixels as f32,
            )
        };

        MaskStatistics {
            total_pixels,
            foreground_pixels,
            background_pixels,
            foreground_ratio,
            background_ratio,
        }
    }

    /// Build a non-binary mask from an 8-bit plane produced by a filter stage
    pub(crate) fn from_u8_plane(plane: &GrayImage) -> Self {
        Self::from_luma(plane)
    }

    /// Same values, flagged as continuous
    pub(crate) fn into_continuous(mut self) -> Self {
        self.is_binary = false;
        self
    }
}

/// Statistics about a mask
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskStatistics {
    pub total_pixels: usize,
    pub foreground_pixels: usize,
    pub background_pixels: usize,
    pub foreground_ratio: f32,
    pub background_ratio: f32,
}

/// 8-bit RGB input image
#[derive(Debug, Clone, PartialEq)]
pub struct ColorImage {
    buffer: RgbImage,
    source_path: Option<PathBuf>,
}

impl ColorImage {
    /// Create an image from interleaved RGB bytes
    ///
    /// # Errors
    /// - `InvalidImage` if `data.len() != width * height * 3`
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = checked_len(width, height, 3)?;
        if data.len() != expected {
            return Err(BgComposeError::invalid_image(format!(
                "RGB buffer holds {} bytes, {}x{} requires {}",
                data.len(),
                width,
                height,
                expected
            )));
        }
        let buffer = RgbImage::from_raw(width, height, data).ok_or_else(|| {
            BgComposeError::invalid_image(format!("cannot build {}x{} RGB image", width, height))
        })?;
        Ok(Self::from_rgb(buffer))
    }

    /// Solid-color image
    #[must_use]
    pub fn filled(width: u32, height: u32, color: Rgb) -> Self {
        Self::from_rgb(RgbImage::from_pixel(width, height, color.into()))
    }

    #[must_use]
    pub fn from_rgb(buffer: RgbImage) -> Self {
        Self {
            buffer,
            source_path: None,
        }
    }

    /// Record the file this image was decoded from
    #[must_use]
    pub fn with_source_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.source_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.buffer.height()
    }

    /// Image dimensions as (width, height)
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.buffer.dimensions()
    }

    #[must_use]
    pub fn as_rgb(&self) -> &RgbImage {
        &self.buffer
    }

    #[must_use]
    pub fn into_rgb(self) -> RgbImage {
        self.buffer
    }

    #[must_use]
    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }
}

/// 8-bit RGBA output image
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeImage {
    buffer: RgbaImage,
}

impl CompositeImage {
    /// Create an image from interleaved RGBA bytes
    ///
    /// # Errors
    /// - `InvalidImage` if `data.len() != width * height * 4`
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = checked_len(width, height, 4)?;
        if data.len() != expected {
            return Err(BgComposeError::invalid_image(format!(
                "RGBA buffer holds {} bytes, {}x{} requires {}",
                data.len(),
                width,
                height,
                expected
            )));
        }
        let buffer = RgbaImage::from_raw(width, height, data).ok_or_else(|| {
            BgComposeError::invalid_image(format!("cannot build {}x{} RGBA image", width, height))
        })?;
        Ok(Self { buffer })
    }

    #[must_use]
    pub fn from_rgba(buffer: RgbaImage) -> Self {
        Self { buffer }
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.buffer.height()
    }

    /// Image dimensions as (width, height)
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.buffer.dimensions()
    }

    #[must_use]
    pub fn as_rgba(&self) -> &RgbaImage {
        &self.buffer
    }

    #[must_use]
    pub fn into_rgba(self) -> RgbaImage {
        self.buffer
    }

    /// RGBA value at (x, y), or `None` outside the image
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        self.buffer.get_pixel_checked(x, y).map(|p| p.0)
    }

    /// Alpha channel in row-major order
    #[must_use]
    pub fn alpha_channel(&self) -> Vec<u8> {
        self.buffer.pixels().map(|p| p[3]).collect()
    }

    /// Buffer size in megabytes
    #[must_use]
    pub fn size_mb(&self) -> f64 {
        self.buffer.as_raw().len() as f64 / (1024.0 * 1024.0)
    }
}

/// Solid RGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);

    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl From<Rgb> for image::Rgb<u8> {
    fn from(color: Rgb) -> Self {
        image::Rgb([color.r, color.g, color.b])
    }
}

impl std::fmt::Display for Rgb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Parses `#rrggbb`, `rrggbb` or `r,g,b`
impl FromStr for Rgb {
    type Err = BgComposeError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let invalid = || {
            BgComposeError::invalid_config(format!(
                "Invalid color '{}': expected #rrggbb or r,g,b",
                s
            ))
        };

        if s.contains(',') {
            let parts = s
                .split(',')
                .map(|p| p.trim().parse::<u8>().map_err(|_| invalid()))
                .collect::<Result<Vec<u8>>>()?;
            return match parts.as_slice() {
                [r, g, b] => Ok(Self::new(*r, *g, *b)),
                _ => Err(invalid()),
            };
        }

        let hex = s.strip_prefix('#').unwrap_or(s);
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(invalid());
        }
        let channel = |range: std::ops::Range<usize>| {
            hex.get(range)
                .and_then(|h| u8::from_str_radix(h, 16).ok())
                .ok_or_else(invalid)
        };
        Ok(Self::new(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }
}

/// Bounding box of visible content, in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropBounds {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropBounds {
    /// Bounds as an (x, y, width, height) tuple
    #[must_use]
    pub fn as_tuple(&self) -> (u32, u32, u32, u32) {
        (self.x, self.y, self.width, self.height)
    }
}

/// Per-stage timing breakdown for one pipeline invocation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingTimings {
    /// Image loading and decoding (file-based entry points only)
    pub image_decode_ms: u64,

    /// Mask prediction at the inference boundary
    pub prediction_ms: u64,

    /// Threshold, morphology and feathering
    pub refinement_ms: u64,

    /// Alpha composition, background replacement or mask export
    pub composition_ms: u64,

    /// Content cropping
    pub crop_ms: u64,

    /// Total end-to-end processing time
    pub total_ms: u64,
}

impl ProcessingTimings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get timing summary for display
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "Total: {}ms | Decode: {}ms | Prediction: {}ms | Refinement: {}ms | Composition: {}ms | Crop: {}ms",
            self.total_ms,
            self.image_decode_ms,
            self.prediction_ms,
            self.refinement_ms,
            self.composition_ms,
            self.crop_ms
        )
    }
}
