//! Standalone visual encodings of a mask

use crate::{
    error::{BgComposeError, Result},
    types::{saturate_u8, unit_to_u8, CompositeImage, Mask},
};
use image::{Rgba, RgbaImage};
use ndarray::ArrayView2;

/// Value range a mask's samples are expressed in
///
/// Inferred from the data: a maximum above 1.0 means the values are already
/// 0-255. An all-zero or all-one buffer is read as unit-scaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskScale {
    /// Values in [0, 1]
    Unit,
    /// Values in [0, 255]
    Byte,
}

impl MaskScale {
    #[must_use]
    pub fn detect(values: ArrayView2<'_, f32>) -> Self {
        let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        if max > 1.0 {
            Self::Byte
        } else {
            Self::Unit
        }
    }

    /// Value normalized to [0, 1]
    #[must_use]
    pub fn to_unit(self, value: f32) -> f32 {
        match self {
            Self::Unit => value.clamp(0.0, 1.0),
            Self::Byte => (value / 255.0).clamp(0.0, 1.0),
        }
    }

    /// Value quantized to 0-255
    #[must_use]
    pub fn to_byte(self, value: f32) -> u8 {
        match self {
            Self::Unit => unit_to_u8(value),
            Self::Byte => saturate_u8(value),
        }
    }
}

/// Renders masks as opaque grayscale, binary, or alpha-only RGBA images
#[derive(Debug, Clone, Copy, Default)]
pub struct MaskExporter;

impl MaskExporter {
    /// Mask value in R=G=B, alpha 255
    #[must_use]
    pub fn export_grayscale(mask: &Mask) -> CompositeImage {
        render(mask.data().view(), mask.dimensions(), |scale, v| {
            let g = scale.to_byte(v);
            [g, g, g, 255]
        })
    }

    /// `255` where the normalized value is at least `threshold`, else `0`; alpha 255
    #[must_use]
    pub fn export_binary(mask: &Mask, threshold: f32) -> CompositeImage {
        render(mask.data().view(), mask.dimensions(), |scale, v| {
            let g = if scale.to_unit(v) >= threshold { 255 } else { 0 };
            [g, g, g, 255]
        })
    }

    /// Opaque white with the mask value in the alpha channel
    #[must_use]
    pub fn export_alpha_only(mask: &Mask) -> CompositeImage {
        render(mask.data().view(), mask.dimensions(), |scale, v| {
            [255, 255, 255, scale.to_byte(v)]
        })
    }

    /// [`Self::export_grayscale`] for raw `(height, width)` values of either scale
    ///
    /// # Errors
    /// - `InvalidImage` if a dimension does not fit in `u32`
    pub fn export_grayscale_values(values: ArrayView2<'_, f32>) -> Result<CompositeImage> {
        let dims = checked_dimensions(values)?;
        Ok(render(values, dims, |scale, v| {
            let g = scale.to_byte(v);
            [g, g, g, 255]
        }))
    }

    /// [`Self::export_binary`] for raw `(height, width)` values of either scale
    ///
    /// # Errors
    /// - `InvalidImage` if a dimension does not fit in `u32`
    pub fn export_binary_values(
        values: ArrayView2<'_, f32>,
        threshold: f32,
    ) -> Result<CompositeImage> {
        let dims = checked_dimensions(values)?;
        Ok(render(values, dims, |scale, v| {
            let g = if scale.to_unit(v) >= threshold { 255 } else { 0 };
            [g, g, g, 255]
        }))
    }

    /// [`Self::export_alpha_only`] for raw `(height, width)` values of either scale
    ///
    /// # Errors
    /// - `InvalidImage` if a dimension does not fit in `u32`
    pub fn export_alpha_only_values(values: ArrayView2<'_, f32>) -> Result<CompositeImage> {
        let dims = checked_dimensions(values)?;
        Ok(render(values, dims, |scale, v| {
            [255, 255, 255, scale.to_byte(v)]
        }))
    }
}

fn checked_dimensions(values: ArrayView2<'_, f32>) -> Result<(u32, u32)> {
    let (rows, cols) = values.dim();
    match (u32::try_from(cols), u32::try_from(rows)) {
        (Ok(width), Ok(height)) => Ok((width, height)),
        _ => Err(BgComposeError::invalid_image(format!(
            "{}x{} mask is too large to export",
            cols, rows
        ))),
    }
}

fn render<F>(values: ArrayView2<'_, f32>, (width, height): (u32, u32), pixel: F) -> CompositeImage
where
    F: Fn(MaskScale, f32) -> [u8; 4],
{
    let scale = MaskScale::detect(values);
    CompositeImage::from_rgba(RgbaImage::from_fn(width, height, |x, y| {
        Rgba(pixel(scale, values[[y as usize, x as usize]]))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    #[test]
    fn test_binary_export() {
        let mask = Mask::from_vec(2, 1, vec![0.2, 0.6]).unwrap();
        let output = MaskExporter::export_binary(&mask, 0.5);
        assert_eq!(output.pixel(0, 0), Some([0, 0, 0, 255]));
        assert_eq!(output.pixel(1, 0), Some([255, 255, 255, 255]));
    }

    #[test]
    fn test_binary_threshold_is_inclusive() {
        let mask = Mask::from_vec(1, 1, vec![0.5]).unwrap();
        assert_eq!(
            MaskExporter::export_binary(&mask, 0.5).pixel(0, 0),
            Some([255, 255, 255, 255])
        );
    }

    #[test]
    fn test_grayscale_export() {
        let mask = Mask::from_vec(3, 1, vec![0.0, 0.5, 1.0]).unwrap();
        let output = MaskExporter::export_grayscale(&mask);
        assert_eq!(output.pixel(0, 0), Some([0, 0, 0, 255]));
        assert_eq!(output.pixel(1, 0), Some([128, 128, 128, 255]));
        assert_eq!(output.pixel(2, 0), Some([255, 255, 255, 255]));
    }

    #[test]
    fn test_alpha_only_export() {
        let mask = Mask::from_vec(2, 1, vec![0.0, 0.25]).unwrap();
        let output = MaskExporter::export_alpha_only(&mask);
        assert_eq!(output.pixel(0, 0), Some([255, 255, 255, 0]));
        assert_eq!(output.pixel(1, 0), Some([255, 255, 255, 64]));
    }

    #[test]
    fn test_scale_detection() {
        assert_eq!(MaskScale::detect(array![[0.0, 1.0]].view()), MaskScale::Unit);
        assert_eq!(MaskScale::detect(array![[0.0, 2.0]].view()), MaskScale::Byte);
        assert_eq!(MaskScale::detect(Array2::<f32>::zeros((0, 0)).view()), MaskScale::Unit);
    }

    #[test]
    fn test_byte_scaled_values_match_unit_scaled() {
        let unit = array![[0.0f32, 0.2, 0.6, 1.0]];
        let byte = unit.mapv(|v| v * 255.0);

        assert_eq!(
            MaskExporter::export_grayscale_values(unit.view()).unwrap(),
            MaskExporter::export_grayscale_values(byte.view()).unwrap()
        );
        assert_eq!(
            MaskExporter::export_binary_values(unit.view(), 0.5).unwrap(),
            MaskExporter::export_binary_values(byte.view(), 0.5).unwrap()
        );
        assert_eq!(
            MaskExporter::export_alpha_only_values(unit.view()).unwrap(),
            MaskExporter::export_alpha_only_values(byte.view()).unwrap()
        );
    }
}
