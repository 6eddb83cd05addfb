//! Inference boundary: where raw foreground masks come from
//!
//! The pipeline never runs a model itself. A [`MaskPredictor`] hands it a raw
//! probability mask for an image; the predictors here read masks produced
//! elsewhere (by a segmentation model run out of process, or by hand).

use crate::{
    error::{BgComposeError, Result},
    services::ImageIOService,
    types::{ColorImage, Mask},
};
use std::path::{Path, PathBuf};

/// Default file name suffix for sidecar masks (`photo.jpg` -> `photo_mask.png`)
pub const DEFAULT_MASK_SUFFIX: &str = "_mask";

/// Supplies a raw foreground mask for an image
pub trait MaskPredictor: Send + Sync {
    /// Predict the foreground probability mask for `image`
    ///
    /// # Errors
    /// - `ModelNotFound` if no mask source is available
    /// - `InferenceFailed` if the mask cannot be produced or does not fit the image
    fn predict_mask(&self, image: &ColorImage) -> Result<Mask>;

    /// Short human-readable predictor name
    fn name(&self) -> &str;
}

/// Reads precomputed masks stored next to (or alongside) the input images
///
/// For an image `dir/photo.jpg` the mask is `<mask_dir or dir>/photo<suffix>.png`.
#[derive(Debug, Clone)]
pub struct SidecarMaskPredictor {
    mask_dir: Option<PathBuf>,
    suffix: String,
}

impl Default for SidecarMaskPredictor {
    fn default() -> Self {
        Self {
            mask_dir: None,
            suffix: DEFAULT_MASK_SUFFIX.to_string(),
        }
    }
}

impl SidecarMaskPredictor {
    /// Look for masks next to the images, using [`DEFAULT_MASK_SUFFIX`]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look for masks in a dedicated directory
    #[must_use]
    pub fn with_mask_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.mask_dir = Some(dir.into());
        self
    }

    /// Change the file name suffix (may be empty)
    #[must_use]
    pub fn with_suffix<S: Into<String>>(mut self, suffix: S) -> Self {
        self.suffix = suffix.into();
        self
    }

    /// Where the mask for `image_path` is expected
    #[must_use]
    pub fn mask_path_for(&self, image_path: &Path) -> PathBuf {
        let stem = image_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let dir = self
            .mask_dir
            .clone()
            .or_else(|| image_path.parent().map(Path::to_path_buf))
            .unwrap_or_default();
        dir.join(format!("{}{}.png", stem, self.suffix))
    }
}

impl MaskPredictor for SidecarMaskPredictor {
    fn predict_mask(&self, image: &ColorImage) -> Result<Mask> {
        let source = image.source_path().ok_or_else(|| {
            BgComposeError::model_not_found(
                "image has no source path to locate a sidecar mask for",
            )
        })?;
        let mask_path = self.mask_path_for(source);

        if !mask_path.is_file() {
            return Err(BgComposeError::model_not_found(format!(
                "no mask for '{}' (expected '{}')",
                source.display(),
                mask_path.display()
            )));
        }

        log::debug!("Reading sidecar mask {}", mask_path.display());
        let mask = ImageIOService::load_mask(&mask_path).map_err(|e| {
            BgComposeError::inference_failed(format!(
                "cannot read mask '{}': {}",
                mask_path.display(),
                e
            ))
        })?;

        ensure_fits(&mask, image, &mask_path.display().to_string())?;
        Ok(mask)
    }

    fn name(&self) -> &str {
        "sidecar"
    }
}

/// Returns the same mask for every image of matching size
#[derive(Debug, Clone)]
pub struct StaticMaskPredictor {
    mask: Mask,
}

impl StaticMaskPredictor {
    #[must_use]
    pub fn new(mask: Mask) -> Self {
        Self { mask }
    }

    /// Predictor serving the mask stored in `path`
    ///
    /// # Errors
    /// - `ModelNotFound` if the file does not exist
    /// - `InferenceFailed` if it cannot be decoded
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(BgComposeError::model_not_found(format!(
                "mask file '{}' does not exist",
                path.display()
            )));
        }
        let mask = ImageIOService::load_mask(path).map_err(|e| {
            BgComposeError::inference_failed(format!("cannot read mask '{}': {}", path.display(), e))
        })?;
        Ok(Self::new(mask))
    }
}

impl MaskPredictor for StaticMaskPredictor {
    fn predict_mask(&self, image: &ColorImage) -> Result<Mask> {
        ensure_fits(&self.mask, image, "static mask")?;
        Ok(self.mask.clone())
    }

    fn name(&self) -> &str {
        "static"
    }
}

fn ensure_fits(mask: &Mask, image: &ColorImage, source: &str) -> Result<()> {
    if mask.dimensions() == image.dimensions() {
        return Ok(());
    }
    Err(BgComposeError::inference_failed(format!(
        "{} is {}x{} but the image is {}x{}",
        source,
        mask.width(),
        mask.height(),
        image.width(),
        image.height()
    )))
}
