//! Alpha compositing of an RGB image with a refined mask

use crate::{
    error::{BgComposeError, Result},
    types::{unit_to_u8, ColorImage, CompositeImage, Mask},
};
use image::{Rgba, RgbaImage};
use tracing::instrument;

/// Attaches a mask to an image as its alpha channel
///
/// Color data is copied unchanged, including under fully transparent pixels.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlphaCompositor;

impl AlphaCompositor {
    /// RGBA image whose alpha is `round(mask * 255)`
    ///
    /// # Errors
    /// - `DimensionMismatch` if the mask and image sizes differ
    #[instrument(level = "debug", skip_all, fields(width = image.width(), height = image.height()))]
    pub fn compose(image: &ColorImage, mask: &Mask) -> Result<CompositeImage> {
        ensure_same_size("mask vs image", image, mask)?;

        let rgb = image.as_rgb();
        let alpha = mask.data();
        let output = RgbaImage::from_fn(image.width(), image.height(), |x, y| {
            let [r, g, b] = rgb.get_pixel(x, y).0;
            Rgba([r, g, b, unit_to_u8(alpha[[y as usize, x as usize]])])
        });

        Ok(CompositeImage::from_rgba(output))
    }
}

/// Fail with `DimensionMismatch` unless the mask covers the image exactly
pub(crate) fn ensure_same_size(context: &str, image: &ColorImage, mask: &Mask) -> Result<()> {
    if image.dimensions() == mask.dimensions() {
        Ok(())
    } else {
        Err(BgComposeError::dimension_mismatch(
            context,
            image.dimensions(),
            mask.dimensions(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Rgb;

    #[test]
    fn test_alpha_is_quantized_mask() {
        let image = ColorImage::new(3, 1, vec![10, 20, 30, 40, 50, 60, 70, 80, 90]).unwrap();
        let mask = Mask::from_vec(3, 1, vec![0.0, 0.5, 1.0]).unwrap();
        let output = AlphaCompositor::compose(&image, &mask).unwrap();

        assert_eq!(output.pixel(0, 0), Some([10, 20, 30, 0]));
        assert_eq!(output.pixel(1, 0), Some([40, 50, 60, 128]));
        assert_eq!(output.pixel(2, 0), Some([70, 80, 90, 255]));
    }

    #[test]
    fn test_dimension_mismatch() {
        let image = ColorImage::filled(4, 4, Rgb::WHITE);
        let mask = Mask::filled(4, 3, 1.0).unwrap();
        let err = AlphaCompositor::compose(&image, &mask).unwrap_err();
        assert!(matches!(
            err,
            BgComposeError::DimensionMismatch {
                expected: (4, 4),
                actual: (4, 3),
                ..
            }
        ));
    }

    #[test]
    fn test_compose_is_deterministic() {
        let image = ColorImage::filled(5, 5, Rgb::new(1, 2, 3));
        let mask = Mask::filled(5, 5, 0.42).unwrap();
        let first = AlphaCompositor::compose(&image, &mask).unwrap();
        let second = AlphaCompositor::compose(&image, &mask).unwrap();
        assert_eq!(first, second);
    }
}
