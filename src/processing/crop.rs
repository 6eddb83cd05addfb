//! Cropping composites to their visible content

use crate::{
    config::DEFAULT_CROP_ALPHA_THRESHOLD,
    types::{CompositeImage, CropBounds},
};
use image::imageops;
use tracing::debug;

/// Finds and applies the tightest box around pixels with `alpha >= alpha_threshold`
///
/// A fully transparent image is left whole rather than cropped to nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentCropper {
    alpha_threshold: u8,
}

impl Default for ContentCropper {
    fn default() -> Self {
        Self::new(DEFAULT_CROP_ALPHA_THRESHOLD)
    }
}

impl ContentCropper {
    #[must_use]
    pub fn new(alpha_threshold: u8) -> Self {
        Self { alpha_threshold }
    }

    #[must_use]
    pub fn alpha_threshold(&self) -> u8 {
        self.alpha_threshold
    }

    /// Content bounding box, or the full frame if nothing reaches the threshold
    #[must_use]
    pub fn bounds(&self, image: &CompositeImage) -> CropBounds {
        let (width, height) = image.dimensions();
        let mut extent: Option<(u32, u32, u32, u32)> = None;

        for (x, y, pixel) in image.as_rgba().enumerate_pixels() {
            if pixel[3] < self.alpha_threshold {
                continue;
            }
            extent = Some(match extent {
                None => (x, y, x, y),
                Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
            });
        }

        match extent {
            Some((x0, y0, x1, y1)) => CropBounds {
                x: x0,
                y: y0,
                width: x1 - x0 + 1,
                height: y1 - y0 + 1,
            },
            None => CropBounds {
                x: 0,
                y: 0,
                width,
                height,
            },
        }
    }

    /// Image cropped to [`Self::bounds`]
    #[must_use]
    pub fn crop(&self, image: &CompositeImage) -> CompositeImage {
        Self::crop_to(image, &self.bounds(image))
    }

    /// Image cropped to precomputed `bounds`
    ///
    /// Bounds reaching past the image are clipped to it.
    #[must_use]
    pub fn crop_to(image: &CompositeImage, bounds: &CropBounds) -> CompositeImage {
        if bounds.as_tuple() == (0, 0, image.width(), image.height()) {
            return image.clone();
        }

        debug!(
            x = bounds.x,
            y = bounds.y,
            width = bounds.width,
            height = bounds.height,
            "Cropping to content"
        );
        let cropped =
            imageops::crop_imm(image.as_rgba(), bounds.x, bounds.y, bounds.width, bounds.height)
                .to_image();
        CompositeImage::from_rgba(cropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn with_alpha(width: u32, height: u32, opaque: &[(u32, u32, u8)]) -> CompositeImage {
        let mut buffer = RgbaImage::from_pixel(width, height, Rgba([9, 9, 9, 0]));
        for &(x, y, a) in opaque {
            buffer.put_pixel(x, y, Rgba([x as u8, y as u8, 0, a]));
        }
        CompositeImage::from_rgba(buffer)
    }

    #[test]
    fn test_bounds_of_content() {
        let image = with_alpha(10, 8, &[(2, 3, 255), (6, 5, 40)]);
        let bounds = ContentCropper::default().bounds(&image);
        assert_eq!(bounds.as_tuple(), (2, 3, 5, 3));
    }

    #[test]
    fn test_threshold_excludes_faint_pixels() {
        let image = with_alpha(10, 8, &[(2, 3, 255), (6, 5, 9)]);
        let bounds = ContentCropper::default().bounds(&image);
        assert_eq!(bounds.as_tuple(), (2, 3, 1, 1));

        // alpha equal to the threshold counts as content
        let image = with_alpha(10, 8, &[(2, 3, 255), (6, 5, 10)]);
        assert_eq!(ContentCropper::default().bounds(&image).as_tuple(), (2, 3, 5, 3));
    }

    #[test]
    fn test_fully_transparent_is_untouched() {
        let image = with_alpha(5, 4, &[]);
        let cropper = ContentCropper::default();
        assert_eq!(cropper.bounds(&image).as_tuple(), (0, 0, 5, 4));
        assert_eq!(cropper.crop(&image), image);
    }

    #[test]
    fn test_crop_keeps_pixels_and_is_idempotent() {
        let image = with_alpha(10, 8, &[(2, 3, 255), (6, 5, 200)]);
        let cropper = ContentCropper::new(100);
        let once = cropper.crop(&image);
        assert_eq!(once.dimensions(), (5, 3));
        assert_eq!(once.pixel(0, 0), Some([2, 3, 0, 255]));
        assert_eq!(once.pixel(4, 2), Some([6, 5, 0, 200]));

        let twice = cropper.crop(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_crop_to_matches_crop() {
        let image = with_alpha(10, 8, &[(1, 2, 255), (7, 6, 120)]);
        let cropper = ContentCropper::default();
        let bounds = cropper.bounds(&image);
        assert_eq!(ContentCropper::crop_to(&image, &bounds), cropper.crop(&image));

        let full = CropBounds {
            x: 0,
            y: 0,
            width: 10,
            height: 8,
        };
        assert_eq!(ContentCropper::crop_to(&image, &full), image);
    }

    #[test]
    fn test_zero_threshold_keeps_everything() {
        let image = with_alpha(4, 4, &[(1, 1, 255)]);
        assert_eq!(ContentCropper::new(0).crop(&image), image);
    }
}
