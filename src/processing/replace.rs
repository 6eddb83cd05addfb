//! Background replacement: flattening the foreground onto a new background

use super::{
    compose::ensure_same_size,
    export::MaskScale,
    filters::{GaussianKernel, ImageFilters, NativeFilters},
};
use crate::{
    error::{BgComposeError, Result},
    types::{saturate_u8, ColorImage, CompositeImage, Mask, Rgb},
};
use image::{imageops, imageops::FilterType, Rgba, RgbImage, RgbaImage};
use std::borrow::Cow;
use tracing::{debug, instrument};

/// Blends `image` over a substitute background: `out = fg * a + bg * (1 - a)`
///
/// Every output pixel is fully opaque.
#[derive(Debug, Clone, Default)]
pub struct BackgroundReplacer<F = NativeFilters> {
    filters: F,
}

impl BackgroundReplacer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl<F: ImageFilters> BackgroundReplacer<F> {
    /// Replacer backed by a custom filter implementation
    pub fn with_filters(filters: F) -> Self {
        Self { filters }
    }

    /// Flatten onto a solid color
    ///
    /// # Errors
    /// - `DimensionMismatch` if the mask and image sizes differ
    #[instrument(level = "debug", skip(self, image, mask), fields(width = image.width(), height = image.height()))]
    pub fn replace_with_color(
        &self,
        image: &ColorImage,
        mask: &Mask,
        color: Rgb,
    ) -> Result<CompositeImage> {
        ensure_same_size("mask vs image", image, mask)?;
        let fill = [color.r, color.g, color.b];
        Ok(blend(image, mask, |_, _| fill))
    }

    /// Flatten onto another image, resized with Lanczos3 when its size differs
    ///
    /// # Errors
    /// - `DimensionMismatch` if the mask and image sizes differ
    /// - `InvalidImage` if the background is empty while the image is not
    #[instrument(level = "debug", skip_all, fields(width = image.width(), height = image.height()))]
    pub fn replace_with_image(
        &self,
        image: &ColorImage,
        mask: &Mask,
        background: &ColorImage,
    ) -> Result<CompositeImage> {
        ensure_same_size("mask vs image", image, mask)?;

        let (width, height) = image.dimensions();
        let resized: Cow<'_, RgbImage> = if background.dimensions() == (width, height) {
            Cow::Borrowed(background.as_rgb())
        } else {
            if width > 0 && height > 0 && (background.width() == 0 || background.height() == 0) {
                return Err(BgComposeError::invalid_image(format!(
                    "cannot resize empty {}x{} background to {}x{}",
                    background.width(),
                    background.height(),
                    width,
                    height
                )));
            }
            debug!(
                from_width = background.width(),
                from_height = background.height(),
                "Resizing background image"
            );
            Cow::Owned(imageops::resize(
                background.as_rgb(),
                width,
                height,
                FilterType::Lanczos3,
            ))
        };

        Ok(blend(image, mask, |x, y| resized.get_pixel(x, y).0))
    }

    /// Flatten onto a Gaussian-blurred copy of the image
    ///
    /// An even `blur_strength` is bumped to the next odd kernel size. Strengths
    /// far beyond the image size are clamped.
    ///
    /// # Errors
    /// - `DimensionMismatch` if the mask and image sizes differ
    #[instrument(level = "debug", skip(self, image, mask), fields(width = image.width(), height = image.height()))]
    pub fn replace_with_blur(
        &self,
        image: &ColorImage,
        mask: &Mask,
        blur_strength: u32,
    ) -> Result<CompositeImage> {
        ensure_same_size("mask vs image", image, mask)?;

        let kernel = GaussianKernel::for_plane(blur_strength / 2, image.width(), image.height());
        let blurred = self.filters.gaussian_blur_rgb(image.as_rgb(), &kernel);

        Ok(blend(image, mask, |x, y| blurred.get_pixel(x, y).0))
    }
}

fn blend<B>(image: &ColorImage, mask: &Mask, background: B) -> CompositeImage
where
    B: Fn(u32, u32) -> [u8; 3],
{
    let values = mask.data();
    let scale = MaskScale::detect(values.view());
    let rgb = image.as_rgb();

    CompositeImage::from_rgba(RgbaImage::from_fn(image.width(), image.height(), |x, y| {
        let alpha = scale.to_unit(values[[y as usize, x as usize]]);
        let fg = rgb.get_pixel(x, y).0;
        let bg = background(x, y);
        let mix = |c: usize| saturate_u8(f32::from(fg[c]) * alpha + f32::from(bg[c]) * (1.0 - alpha));
        Rgba([mix(0), mix(1), mix(2), 255])
    }))
}
