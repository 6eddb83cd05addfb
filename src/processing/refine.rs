//! Mask refinement: thresholding, morphological smoothing and feathering

use super::filters::{GaussianKernel, ImageFilters, NativeFilters, StructuringElement};
use crate::{config::RefineParams, error::Result, types::Mask};
use tracing::{debug, instrument};

/// Turns a raw probability mask into a clean alpha mask
///
/// Stages run in a fixed order:
/// 1. hard threshold (skipped for binary masks or a threshold of 0)
/// 2. opening then closing with a disk of diameter `2 * smooth_radius + 1`
/// 3. Gaussian feathering with a kernel of size `2 * feather_radius + 1`
///
/// Stages 2 and 3 run on the 8-bit quantization of the mask. The result is
/// always flagged as non-binary.
#[derive(Debug, Clone, Default)]
pub struct MaskRefiner<F = NativeFilters> {
    filters: F,
}

impl MaskRefiner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl<F: ImageFilters> MaskRefiner<F> {
    /// Refiner backed by a custom filter implementation
    pub fn with_filters(filters: F) -> Self {
        Self { filters }
    }

    /// Refine `mask` according to `params`
    ///
    /// Radii larger than the mask can resolve are clamped, so this succeeds
    /// for every valid mask and every valid `params`.
    #[instrument(level = "debug", skip_all, fields(width = mask.width(), height = mask.height()))]
    pub fn refine(&self, mask: &Mask, params: &RefineParams) -> Result<Mask> {
        let threshold = params.threshold();
        let smooth_radius = params.smooth_radius();
        let feather_radius = params.feather_radius();

        let thresholded = if !mask.is_binary() && threshold > 0.0 {
            debug!(threshold, "Thresholding mask");
            mask.threshold(threshold)
        } else {
            mask.clone()
        };

        if smooth_radius == 0 && feather_radius == 0 {
            return Ok(thresholded.into_continuous());
        }

        let mut plane = thresholded.to_u8();

        if smooth_radius > 0 {
            let element =
                StructuringElement::ellipse_for_plane(smooth_radius, mask.width(), mask.height());
            debug!(kernel = element.size(), "Applying morphological open/close");
            plane = self.filters.open(&plane, &element);
            plane = self.filters.close(&plane, &element);
        }

        if feather_radius > 0 {
            let kernel = GaussianKernel::for_plane(feather_radius, mask.width(), mask.height());
            debug!(kernel = kernel.size(), "Feathering mask edges");
            plane = self.filters.gaussian_blur(&plane, &kernel);
        }

        Ok(Mask::from_u8_plane(&plane))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GrayImage;

    fn mask_from_u8(width: u32, height: u32, data: Vec<u8>) -> Mask {
        Mask::from_luma(&GrayImage::from_raw(width, height, data).unwrap())
    }

    #[test]
    fn test_identity_params_preserve_values() {
        let mask = Mask::from_vec(3, 1, vec![0.1, 0.5, 0.9]).unwrap().threshold(0.5);
        assert!(mask.is_binary());

        let refined = MaskRefiner::new().refine(&mask, &RefineParams::identity()).unwrap();
        assert_eq!(refined.data(), mask.data());
        assert!(!refined.is_binary());
    }

    #[test]
    fn test_threshold_only() {
        let mask = Mask::from_vec(4, 1, vec![0.2, 0.5, 0.49, 1.0]).unwrap();
        let params = RefineParams::new(0.5, 0, 0).unwrap();
        let refined = MaskRefiner::new().refine(&mask, &params).unwrap();
        assert_eq!(
            refined.data().iter().copied().collect::<Vec<_>>(),
            vec![0.0, 1.0, 0.0, 1.0]
        );
        assert!(!refined.is_binary());
    }

    #[test]
    fn test_binary_masks_skip_thresholding() {
        // A binary-flagged mask is trusted as is, even with a high threshold
        let mask = Mask::from_vec(2, 1, vec![0.0, 1.0]).unwrap().threshold(0.5);
        let params = RefineParams::new(1.0, 0, 0).unwrap();
        let refined = MaskRefiner::new().refine(&mask, &params).unwrap();
        assert_eq!(refined.get(1, 0), Some(1.0));
    }

    #[test]
    fn test_smoothing_removes_speck_and_fills_hole() {
        let mut data = vec![0u8; 15 * 15];
        // isolated speck
        data[2 * 15 + 2] = 255;
        // solid 7x7 block with a hole in the middle
        for y in 6..13 {
            for x in 6..13 {
                data[y * 15 + x] = 255;
            }
        }
        data[9 * 15 + 9] = 0;

        let mask = mask_from_u8(15, 15, data);
        let params = RefineParams::new(0.5, 1, 0).unwrap();
        let refined = MaskRefiner::new().refine(&mask, &params).unwrap();

        assert_eq!(refined.get(2, 2), Some(0.0));
        assert_eq!(refined.get(9, 9), Some(1.0));
        assert_eq!(refined.get(9, 7), Some(1.0));
    }

    #[test]
    fn test_feathering_softens_edges() {
        let mut values = vec![0.0f32; 8];
        values[4..].fill(1.0);
        let mask = Mask::from_vec(8, 1, values).unwrap();
        let params = RefineParams::new(0.5, 0, 2).unwrap();
        let refined = MaskRefiner::new().refine(&mask, &params).unwrap();

        let edge_left = refined.get(3, 0).unwrap();
        let edge_right = refined.get(4, 0).unwrap();
        assert!(edge_left > 0.0 && edge_left < 0.5);
        assert!(edge_right > 0.5 && edge_right < 1.0);
        assert_eq!(refined.get(0, 0), Some(0.0));
        assert_eq!(refined.get(7, 0), Some(1.0));
    }

    #[test]
    fn test_larger_feather_blurs_more() {
        let mut values = vec![0.0f32; 32];
        values[16..].fill(1.0);
        let mask = Mask::from_vec(32, 1, values).unwrap();
        let refiner = MaskRefiner::new();

        let narrow = refiner.refine(&mask, &RefineParams::new(0.0, 0, 1).unwrap()).unwrap();
        let wide = refiner.refine(&mask, &RefineParams::new(0.0, 0, 6).unwrap()).unwrap();

        assert!(wide.get(12, 0).unwrap() > narrow.get(12, 0).unwrap());
        assert!(wide.get(19, 0).unwrap() < narrow.get(19, 0).unwrap());
    }

    #[test]
    fn test_huge_radii_are_clamped_to_the_plane() {
        let mask = Mask::from_vec(4, 1, vec![0.0, 1.0, 1.0, 1.0]).unwrap();
        let refiner = MaskRefiner::new();

        let feathered = refiner.refine(&mask, &RefineParams::new(0.5, 0, 4096).unwrap()).unwrap();
        let widest = refiner
            .refine(&mask, &RefineParams::new(0.5, 0, u32::MAX).unwrap())
            .unwrap();
        assert_eq!(feathered, widest);
        // A kernel far wider than the plane flattens it to the mean
        for x in 0..4 {
            assert_eq!(feathered.get(x, 0), Some(191.0 / 255.0));
        }

        let smoothed = refiner
            .refine(&mask, &RefineParams::new(0.5, u32::MAX, 0).unwrap())
            .unwrap();
        let bounded = refiner.refine(&mask, &RefineParams::new(0.5, 3, 0).unwrap()).unwrap();
        assert_eq!(smoothed, bounded);
    }

    #[test]
    fn test_refine_does_not_touch_input() {
        let mask = Mask::from_vec(2, 2, vec![0.3, 0.7, 0.7, 0.3]).unwrap();
        let before = mask.clone();
        let _ = MaskRefiner::new().refine(&mask, &RefineParams::default()).unwrap();
        assert_eq!(mask, before);
    }
}
