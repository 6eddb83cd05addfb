//! Configuration types for mask refinement and compositing

use crate::{
    error::{BgComposeError, Result},
    types::Rgb,
    utils::NumericValidator,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default alpha threshold used by the content cropper
pub const DEFAULT_CROP_ALPHA_THRESHOLD: u8 = 10;

/// Default Gaussian kernel size for blurred-background replacement
pub const DEFAULT_BLUR_STRENGTH: u32 = 51;

/// Default binarization threshold for binary mask export
pub const DEFAULT_BINARY_EXPORT_THRESHOLD: f32 = 0.5;

/// Parameters for the mask refiner
///
/// Constructed through [`RefineParams::new`], which rejects thresholds outside `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RefineParams {
    threshold: f32,
    smooth_radius: u32,
    feather_radius: u32,
}

impl RefineParams {
    /// Create validated refinement parameters
    ///
    /// # Errors
    /// - `InvalidConfig` if `threshold` is not finite or outside `[0, 1]`
    pub fn new(threshold: f32, smooth_radius: u32, feather_radius: u32) -> Result<Self> {
        if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
            return Err(BgComposeError::config_value_error(
                "threshold",
                threshold,
                "0.0-1.0",
                Some(0.5),
            ));
        }

        Ok(Self {
            threshold,
            smooth_radius,
            feather_radius,
        })
    }

    /// Parameters that leave a mask untouched
    #[must_use]
    pub fn identity() -> Self {
        Self {
            threshold: 0.0,
            smooth_radius: 0,
            feather_radius: 0,
        }
    }

    #[must_use]
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    #[must_use]
    pub fn smooth_radius(&self) -> u32 {
        self.smooth_radius
    }

    #[must_use]
    pub fn feather_radius(&self) -> u32 {
        self.feather_radius
    }
}

impl Default for RefineParams {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            smooth_radius: 2,
            feather_radius: 1,
        }
    }
}

/// Background shown behind transparent previews
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreviewBackground {
    #[default]
    Checkerboard,
    White,
    Black,
}

/// What ends up behind the foreground
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum BackgroundMode {
    /// Keep the background transparent (alpha compositing)
    #[default]
    Transparent,
    /// Flatten onto a solid color
    Color { color: Rgb },
    /// Flatten onto another image, resized to fit
    Image { path: PathBuf },
    /// Flatten onto a blurred copy of the input
    Blur { strength: u32 },
}

impl std::fmt::Display for BackgroundMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transparent => write!(f, "transparent"),
            Self::Color { color } => write!(f, "color({})", color),
            Self::Image { path } => write!(f, "image({})", path.display()),
            Self::Blur { strength } => write!(f, "blur({})", strength),
        }
    }
}

/// Standalone mask encodings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "lowercase")]
pub enum MaskExportFormat {
    /// Mask value in R=G=B, opaque
    Grayscale,
    /// Thresholded black/white, opaque
    Binary { threshold: f32 },
    /// Opaque white with the mask in the alpha channel
    AlphaOnly,
}

impl MaskExportFormat {
    /// Short name used in file suffixes and logs
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Grayscale => "grayscale",
            Self::Binary { .. } => "binary",
            Self::AlphaOnly => "alpha",
        }
    }
}

/// Application settings for the compositing pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Foreground cutoff applied to raw probabilities (0 disables thresholding)
    pub threshold: f32,

    /// Morphology kernel radius in pixels (0 disables smoothing)
    pub smooth_pixels: u32,

    /// Feathering blur radius in pixels (0 disables feathering)
    pub feather_pixels: u32,

    /// Crop the output to its visible content
    pub auto_crop_output: bool,

    /// Alpha value at or above which a pixel counts as content when cropping
    pub crop_alpha_threshold: u8,

    /// Preview background for transparent results
    pub preview_background: PreviewBackground,

    /// Default output folder (`None` = ask or use the input folder)
    pub default_save_folder: Option<PathBuf>,

    /// Background replacement mode
    pub background: BackgroundMode,

    /// Threshold used when exporting binary masks
    pub mask_export_binary_threshold: f32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            smooth_pixels: 2,
            feather_pixels: 1,
            auto_crop_output: false,
            crop_alpha_threshold: DEFAULT_CROP_ALPHA_THRESHOLD,
            preview_background: PreviewBackground::default(),
            default_save_folder: None,
            background: BackgroundMode::default(),
            mask_export_binary_threshold: DEFAULT_BINARY_EXPORT_THRESHOLD,
        }
    }
}

impl Settings {
    /// Create a new settings builder
    #[must_use]
    pub fn builder() -> SettingsBuilder {
        SettingsBuilder::default()
    }

    /// Validate all settings
    ///
    /// # Errors
    /// - Threshold or binary export threshold outside 0.0-1.0
    /// - Blur strength of zero
    pub fn validate(&self) -> Result<()> {
        self.refine_params()?;

        NumericValidator::validate_percentage(self.mask_export_binary_threshold).map_err(|_| {
            BgComposeError::config_value_error(
                "mask export threshold",
                self.mask_export_binary_threshold,
                "0.0-1.0",
                Some(DEFAULT_BINARY_EXPORT_THRESHOLD),
            )
        })?;

        if let BackgroundMode::Blur { strength } = self.background {
            NumericValidator::validate_positive(strength, "blur strength")?;
        }

        Ok(())
    }

    /// Refinement parameters derived from these settings
    ///
    /// # Errors
    /// - `InvalidConfig` if the threshold is outside 0.0-1.0
    pub fn refine_params(&self) -> Result<RefineParams> {
        RefineParams::new(self.threshold, self.smooth_pixels, self.feather_pixels)
    }

    /// Format used for binary mask export
    #[must_use]
    pub fn binary_export_format(&self) -> MaskExportFormat {
        MaskExportFormat::Binary {
            threshold: self.mask_export_binary_threshold,
        }
    }
}

/// Builder for `Settings`
#[derive(Debug, Default)]
pub struct SettingsBuilder {
    settings: Settings,
}

impl SettingsBuilder {
    #[must_use]
    pub fn threshold(mut self, threshold: f32) -> Self {
        self.settings.threshold = threshold;
        self
    }

    #[must_use]
    pub fn smooth_pixels(mut self, pixels: u32) -> Self {
        self.settings.smooth_pixels = pixels;
        self
    }

    #[must_use]
    pub fn feather_pixels(mut self, pixels: u32) -> Self {
        self.settings.feather_pixels = pixels;
        self
    }

    #[must_use]
    pub fn auto_crop_output(mut self, enabled: bool) -> Self {
        self.settings.auto_crop_output = enabled;
        self
    }

    #[must_use]
    pub fn crop_alpha_threshold(mut self, threshold: u8) -> Self {
        self.settings.crop_alpha_threshold = threshold;
        self
    }

    #[must_use]
    pub fn preview_background(mut self, background: PreviewBackground) -> Self {
        self.settings.preview_background = background;
        self
    }

    #[must_use]
    pub fn default_save_folder<P: Into<PathBuf>>(mut self, folder: P) -> Self {
        self.settings.default_save_folder = Some(folder.into());
        self
    }

    #[must_use]
    pub fn background(mut self, background: BackgroundMode) -> Self {
        self.settings.background = background;
        self
    }

    #[must_use]
    pub fn mask_export_binary_threshold(mut self, threshold: f32) -> Self {
        self.settings.mask_export_binary_threshold = threshold;
        self
    }

    /// Build and validate the settings
    ///
    /// # Errors
    /// - Any failure reported by [`Settings::validate`]
    pub fn build(self) -> Result<Settings> {
        self.settings.validate()?;
        Ok(self.settings)
    }
}
