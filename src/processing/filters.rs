//! Low-level filtering primitives: erosion, dilation and Gaussian blur
//!
//! The refiner and the background replacer only reach these through the
//! [`ImageFilters`] trait, so the primitive implementation can be swapped
//! (for a SIMD or GPU version, say) without touching the pipeline stages.
//! [`NativeFilters`] is the portable default: morphology runs on
//! `imageproc`, the blur is a separable convolution with reflect-101 borders.

// Loop indices below are bounded by the image geometry.
#![allow(clippy::indexing_slicing)]

use crate::{
    error::{BgComposeError, Result},
    types::saturate_u8,
};
use image::{GrayImage, Luma, RgbImage};
use imageproc::morphology::{self, Mask as MorphMask};

/// Blur radii past this multiple of the longest plane side are clamped
///
/// The kernel's sigma is then well above the reflect-101 period of either
/// axis, so the folded kernel is flat and the blur yields the plane mean.
const BLUR_RADIUS_SPAN: u64 = 8;

/// Elliptical (disk-shaped) structuring element of odd diameter
///
/// Row `i` of a diameter `2r + 1` element covers columns `r - dx ..= r + dx` with
/// `dx = round(r * sqrt((r^2 - (i - r)^2) / r^2))`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuringElement {
    radius: usize,
    half_widths: Vec<usize>,
}

impl StructuringElement {
    /// Disk of diameter `2 * radius + 1`
    #[must_use]
    pub fn ellipse(radius: u32) -> Self {
        let r = radius as usize;
        let rf = f64::from(radius);
        let inv_r2 = if radius == 0 { 0.0 } else { 1.0 / (rf * rf) };

        let half_widths = (0..=2 * r)
            .map(|i| {
                let dy = i as f64 - rf;
                let dx = (rf * ((rf * rf - dy * dy) * inv_r2).sqrt()).round() as usize;
                dx.min(r)
            })
            .collect();

        Self {
            radius: r,
            half_widths,
        }
    }

    /// Disk for `radius` on a `width x height` plane
    ///
    /// A disk whose radius reaches the plane diagonal already covers every
    /// pixel from every position, so larger radii are clamped to it.
    #[must_use]
    pub fn ellipse_for_plane(radius: u32, width: u32, height: u32) -> Self {
        let diagonal = f64::from(width.saturating_sub(1))
            .hypot(f64::from(height.saturating_sub(1)))
            .ceil() as u32;
        Self::ellipse(radius.min(diagonal))
    }

    /// Diameter of the element
    #[must_use]
    pub fn size(&self) -> usize {
        2 * self.radius + 1
    }

    #[must_use]
    pub fn radius(&self) -> usize {
        self.radius
    }

    /// Whether the element covers offset (col, row) within its bounding square
    #[must_use]
    pub fn contains(&self, col: usize, row: usize) -> bool {
        self.half_widths
            .get(row)
            .is_some_and(|&dx| col + dx >= self.radius && col <= self.radius + dx)
    }

    /// The element as an `imageproc` mask, if its radius fits one
    fn to_morph_mask(&self) -> Option<MorphMask> {
        let center = u8::try_from(self.radius).ok()?;
        let size = self.size() as u32;
        let shape = GrayImage::from_fn(size, size, |col, row| {
            Luma([if self.contains(col as usize, row as usize) { 255 } else { 0 }])
        });
        Some(MorphMask::from_image(&shape, center, center))
    }
}

/// Normalized 1-D Gaussian kernel of odd size, applied separably
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianKernel {
    weights: Vec<f32>,
}

impl GaussianKernel {
    /// Kernel of the given size with sigma derived from the size
    ///
    /// Sizes 1, 3, 5 and 7 use fixed binomial taps; larger sizes use
    /// `sigma = 0.3 * ((size - 1) * 0.5 - 1) + 0.8`.
    ///
    /// # Errors
    /// - `InvalidBlurKernel` if `size` is zero or even
    pub fn new(size: u32) -> Result<Self> {
        if size == 0 || size % 2 == 0 {
            return Err(BgComposeError::InvalidBlurKernel(format!(
                "kernel size must be a positive odd number, got {}",
                size
            )));
        }
        Ok(Self::with_odd_size(size))
    }

    fn with_odd_size(size: u32) -> Self {
        let weights = match size {
            1 => vec![1.0],
            3 => vec![0.25, 0.5, 0.25],
            5 => vec![0.0625, 0.25, 0.375, 0.25, 0.0625],
            7 => vec![
                0.031_25, 0.109_375, 0.218_75, 0.281_25, 0.218_75, 0.109_375, 0.031_25,
            ],
            _ => {
                let sigma = Self::sigma_for_size(size);
                let scale = -0.5 / (sigma * sigma);
                let center = f64::from(size - 1) * 0.5;
                let raw: Vec<f64> = (0..size)
                    .map(|i| {
                        let x = f64::from(i) - center;
                        (scale * x * x).exp()
                    })
                    .collect();
                let sum: f64 = raw.iter().sum();
                raw.into_iter().map(|w| (w / sum) as f32).collect()
            },
        };

        Self { weights }
    }

    /// Kernel of size `2 * radius + 1`
    ///
    /// # Errors
    /// - `InvalidBlurKernel` if the size overflows
    pub fn from_radius(radius: u32) -> Result<Self> {
        let size = radius
            .checked_mul(2)
            .and_then(|d| d.checked_add(1))
            .ok_or_else(|| {
                BgComposeError::InvalidBlurKernel(format!("radius {} is too large", radius))
            })?;
        Self::new(size)
    }

    /// Kernel of size `2 * radius + 1` for a `width x height` plane
    ///
    /// Radii far beyond the plane size are clamped, which leaves the blurred
    /// plane unchanged at 8-bit precision.
    #[must_use]
    pub fn for_plane(radius: u32, width: u32, height: u32) -> Self {
        let longest = u64::from(width.max(height)).max(1);
        let limit = (longest * BLUR_RADIUS_SPAN).min(u64::from(u32::MAX / 2 - 1));
        let radius = u64::from(radius).min(limit) as u32;
        Self::with_odd_size(2 * radius + 1)
    }

    /// Kernel whose size is `strength`, bumped to the next odd number when even
    ///
    /// # Errors
    /// - `InvalidBlurKernel` if the size overflows
    pub fn from_strength(strength: u32) -> Result<Self> {
        Self::from_radius(strength / 2)
    }

    /// Standard deviation used for generated kernels of `size`
    #[must_use]
    pub fn sigma_for_size(size: u32) -> f64 {
        0.3 * (f64::from(size.saturating_sub(1)) * 0.5 - 1.0) + 0.8
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.weights.len()
    }

    #[must_use]
    pub fn radius(&self) -> usize {
        self.weights.len() / 2
    }

    #[must_use]
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }
}

/// Filtering primitives needed by the pipeline
pub trait ImageFilters: Send + Sync {
    /// Grayscale erosion (minimum over the element); out-of-image pixels are ignored
    fn erode(&self, plane: &GrayImage, element: &StructuringElement) -> GrayImage;

    /// Grayscale dilation (maximum over the element); out-of-image pixels are ignored
    fn dilate(&self, plane: &GrayImage, element: &StructuringElement) -> GrayImage;

    /// Gaussian blur of a single-channel plane with reflect-101 borders
    fn gaussian_blur(&self, plane: &GrayImage, kernel: &GaussianKernel) -> GrayImage;

    /// Gaussian blur of each RGB channel with reflect-101 borders
    fn gaussian_blur_rgb(&self, image: &RgbImage, kernel: &GaussianKernel) -> RgbImage;

    /// Morphological opening: erosion followed by dilation
    fn open(&self, plane: &GrayImage, element: &StructuringElement) -> GrayImage {
        let eroded = self.erode(plane, element);
        self.dilate(&eroded, element)
    }

    /// Morphological closing: dilation followed by erosion
    fn close(&self, plane: &GrayImage, element: &StructuringElement) -> GrayImage {
        let dilated = self.dilate(plane, element);
        self.erode(&dilated, element)
    }
}

/// Default [`ImageFilters`] implementation
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeFilters;

#[derive(Clone, Copy)]
enum MorphOp {
    Erode,
    Dilate,
}

impl NativeFilters {
    fn morph(plane: &GrayImage, element: &StructuringElement, op: MorphOp) -> GrayImage {
        match (element.to_morph_mask(), op) {
            (Some(mask), MorphOp::Erode) => morphology::grayscale_erode(plane, &mask),
            (Some(mask), MorphOp::Dilate) => morphology::grayscale_dilate(plane, &mask),
            (None, _) => Self::morph_wide(plane, element, op),
        }
    }

    /// Row-span erosion/dilation for elements too wide for an `imageproc` mask
    fn morph_wide(plane: &GrayImage, element: &StructuringElement, op: MorphOp) -> GrayImage {
        let (width, height) = plane.dimensions();
        let (w, h) = (width as usize, height as usize);
        let src = plane.as_raw();
        let r = element.radius;

        let mut out = GrayImage::new(width, height);
        let dst: &mut [u8] = &mut out;

        for y in 0..h {
            // Element rows that land inside the plane
            let first = r.saturating_sub(y);
            let last = (r + (h - 1 - y)).min(2 * r);

            for x in 0..w {
                let mut acc = match op {
                    MorphOp::Erode => u8::MAX,
                    MorphOp::Dilate => u8::MIN,
                };

                for i in first..=last {
                    let sy = y + i - r;
                    let dx = element.half_widths[i];
                    let x0 = x.saturating_sub(dx);
                    let x1 = (x + dx).min(w - 1);
                    let span = &src[sy * w + x0..=sy * w + x1];

                    acc = match op {
                        MorphOp::Erode => span.iter().fold(acc, |a, &v| a.min(v)),
                        MorphOp::Dilate => span.iter().fold(acc, |a, &v| a.max(v)),
                    };
                }

                dst[y * w + x] = acc;
            }
        }

        out
    }
}

impl ImageFilters for NativeFilters {
    fn erode(&self, plane: &GrayImage, element: &StructuringElement) -> GrayImage {
        Self::morph(plane, element, MorphOp::Erode)
    }

    fn dilate(&self, plane: &GrayImage, element: &StructuringElement) -> GrayImage {
        Self::morph(plane, element, MorphOp::Dilate)
    }

    fn gaussian_blur(&self, plane: &GrayImage, kernel: &GaussianKernel) -> GrayImage {
        let (width, height) = plane.dimensions();
        let mut out = GrayImage::new(width, height);
        blur_interleaved(plane.as_raw(), &mut out, width as usize, height as usize, 1, kernel);
        out
    }

    fn gaussian_blur_rgb(&self, image: &RgbImage, kernel: &GaussianKernel) -> RgbImage {
        let (width, height) = image.dimensions();
        let mut out = RgbImage::new(width, height);
        blur_interleaved(image.as_raw(), &mut out, width as usize, height as usize, 3, kernel);
        out
    }
}

/// Map an out-of-range index back into `0..len` by mirroring without repeating the edge
fn reflect_101(index: isize, len: usize) -> usize {
    if len <= 1 {
        return 0;
    }
    let len = len as isize;
    let period = 2 * (len - 1);
    let m = index.rem_euclid(period);
    (if m >= len { period - m } else { m }) as usize
}

/// Kernel taps for an axis of `len` pixels as (offset, weight) pairs
///
/// Reflect-101 repeats with period `2 * (len - 1)`, so a kernel longer than
/// one period is folded onto it.
fn axis_taps(kernel: &GaussianKernel, len: usize) -> Vec<(isize, f32)> {
    let radius = kernel.radius() as isize;
    let weights = kernel.weights();
    let period = 2 * len.saturating_sub(1);

    if period == 0 {
        return vec![(0, weights.iter().sum())];
    }
    if weights.len() <= period {
        return weights
            .iter()
            .enumerate()
            .map(|(k, &w)| (k as isize - radius, w))
            .collect();
    }

    let mut folded = vec![0.0f32; period];
    for (k, &w) in weights.iter().enumerate() {
        folded[(k as isize - radius).rem_euclid(period as isize) as usize] += w;
    }
    folded
        .into_iter()
        .enumerate()
        .map(|(offset, w)| (offset as isize, w))
        .collect()
}

fn blur_interleaved(
    src: &[u8],
    dst: &mut [u8],
    width: usize,
    height: usize,
    channels: usize,
    kernel: &GaussianKernel,
) {
    if width == 0 || height == 0 {
        return;
    }

    let stride = width * channels;
    let x_taps = axis_taps(kernel, width);
    let y_taps = axis_taps(kernel, height);

    let mut horizontal = vec![0.0f32; src.len()];
    for y in 0..height {
        let row = y * stride;
        for x in 0..width {
            for c in 0..channels {
                let acc: f32 = x_taps
                    .iter()
                    .map(|&(offset, w)| {
                        let sx = reflect_101(x as isize + offset, width);
                        w * f32::from(src[row + sx * channels + c])
                    })
                    .sum();
                horizontal[row + x * channels + c] = acc;
            }
        }
    }

    for y in 0..height {
        for x in 0..width {
            for c in 0..channels {
                let column = x * channels + c;
                let acc: f32 = y_taps
                    .iter()
                    .map(|&(offset, w)| {
                        let sy = reflect_101(y as isize + offset, height);
                        w * horizontal[sy * stride + column]
                    })
                    .sum();
                dst[y * stride + column] = saturate_u8(acc);
            }
        }
    }
}
