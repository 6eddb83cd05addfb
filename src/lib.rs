#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # bgcompose
//!
//! Mask refinement and compositing for background removal.
//!
//! A segmentation model produces a raw foreground probability mask; everything
//! after that lives here. The raw mask is cleaned up (threshold, morphological
//! smoothing, feathering) and then used to cut the foreground out onto
//! transparency, to put it in front of a new background (solid color, another
//! image, or a blurred copy of the original), or to export the mask itself.
//! Results can be cropped to their visible content.
//!
//! ## Features
//!
//! - **Mask refinement**: threshold, open/close with an elliptical kernel, Gaussian feathering
//! - **Compositing**: straight-alpha RGBA cut-outs
//! - **Background replacement**: color, image (Lanczos3 resized) or blurred original
//! - **Mask export**: grayscale, binary, or alpha-only PNGs
//! - **Auto-crop**: tight bounds around pixels above an alpha threshold
//! - **Batch processing**: bounded worker pool over many files with progress reporting
//! - **CLI Integration**: Optional command-line interface (enable with `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bgcompose::{
//!     BackgroundRemovalProcessor, BackgroundSource, Rgb, Settings, SidecarMaskPredictor,
//!     ImageIOService,
//! };
//! use std::sync::Arc;
//!
//! # fn example() -> anyhow::Result<()> {
//! let settings = Settings::builder()
//!     .smooth_pixels(3)
//!     .feather_pixels(2)
//!     .auto_crop_output(true)
//!     .build()?;
//!
//! // Masks are read from `photo_mask.png` next to `photo.jpg`
//! let processor =
//!     BackgroundRemovalProcessor::new(settings, Arc::new(SidecarMaskPredictor::new()))?;
//!
//! let image = ImageIOService::load_image("photo.jpg")?;
//! let cutout = processor.remove_background(&image)?;
//! cutout.save_png("photo_nobg.png")?;
//!
//! let on_white = processor.replace_background(&image, &BackgroundSource::Color(Rgb::WHITE))?;
//! on_white.save_png("photo_white.png")?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Pipeline stages
//!
//! The stages in [`processing`] are usable on their own:
//!
//! ```rust
//! use bgcompose::{AlphaCompositor, ColorImage, Mask, MaskRefiner, RefineParams, Rgb};
//!
//! # fn example() -> bgcompose::Result<()> {
//! let image = ColorImage::filled(4, 4, Rgb::new(200, 30, 30));
//! let raw = Mask::filled(4, 4, 0.8)?;
//! let refined = MaskRefiner::new().refine(&raw, &RefineParams::new(0.5, 0, 0)?)?;
//! let cutout = AlphaCompositor::compose(&image, &refined)?;
//! assert_eq!(cutout.pixel(0, 0), Some([200, 30, 30, 255]));
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```
//!
//! ### Feature Flags
//!
//! - `cli` (default): Command-line interface and progress bar
//! - `webp-support` (default): WebP image decoding
//! - `tracing-json`: JSON log output for the CLI
//!
//! ### Library-Only Usage
//!
//! ```toml
//! [dependencies]
//! bgcompose = { version = "0.1", default-features = false }
//! ```

pub mod batch;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod inference;
pub mod processing;
pub mod processor;
pub mod services;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;
pub mod utils;

// Internal imports for lib functions
use std::sync::Arc;
use tokio::io::AsyncRead;

// Public API exports
pub use batch::{
    BatchItemError, BatchItemResult, BatchOperation, BatchProcessor, BatchResult, DEFAULT_WORKERS,
};
pub use config::{
    BackgroundMode, MaskExportFormat, PreviewBackground, RefineParams, Settings, SettingsBuilder,
};
pub use error::{BgComposeError, Result};
pub use inference::{MaskPredictor, SidecarMaskPredictor, StaticMaskPredictor};
pub use processing::{
    AlphaCompositor, BackgroundReplacer, ContentCropper, GaussianKernel, ImageFilters,
    MaskExporter, MaskRefiner, MaskScale, NativeFilters, StructuringElement,
};
pub use processor::{BackgroundRemovalProcessor, BackgroundSource, RemovalResult};
pub use services::{
    BatchProgress, ConsoleProgressReporter, ImageIOService, JsonSettingsStore,
    NoOpProgressReporter, ProcessingStage, ProgressReporter, ProgressTracker, ProgressUpdate,
    SettingsStore,
};
pub use types::{
    ColorImage, CompositeImage, CropBounds, Mask, MaskStatistics, ProcessingTimings, Rgb,
};
pub use utils::NumericValidator;

#[cfg(feature = "cli")]
pub use tracing_config::{init_cli_tracing, spans, TracingConfig, TracingFormat};

/// Composite an image held in memory with its raw mask
///
/// Both buffers may be in any supported format; the mask is read as luma.
/// The output follows `settings` (refinement, background mode, auto-crop).
///
/// # Examples
///
/// ```rust,no_run
/// use bgcompose::{composite_from_bytes, Settings};
///
/// # async fn example(upload: Vec<u8>, mask: Vec<u8>) -> anyhow::Result<()> {
/// let result = composite_from_bytes(&upload, &mask, &Settings::default()).await?;
/// let png = result.to_png_bytes()?;
/// # Ok(())
/// # }
/// ```
pub async fn composite_from_bytes(
    image_bytes: &[u8],
    mask_bytes: &[u8],
    settings: &Settings,
) -> Result<RemovalResult> {
    let image = ImageIOService::load_from_bytes(image_bytes)?;
    let mask = ImageIOService::load_mask_from_bytes(mask_bytes)?;

    let background = match &settings.background {
        BackgroundMode::Transparent => None,
        BackgroundMode::Color { color } => Some(BackgroundSource::Color(*color)),
        BackgroundMode::Image { path } => Some(BackgroundSource::Image(
            ImageIOService::load_image(path)?,
        )),
        BackgroundMode::Blur { strength } => Some(BackgroundSource::Blur(*strength)),
    };

    let processor = BackgroundRemovalProcessor::new(
        settings.clone(),
        Arc::new(StaticMaskPredictor::new(mask)),
    )?;

    match background {
        None => processor.remove_background(&image),
        Some(source) => processor.replace_background(&image, &source),
    }
}

/// Composite an image and its raw mask read from async streams
///
/// # Examples
///
/// ```rust,no_run
/// use bgcompose::{composite_from_reader, Settings};
/// use tokio::fs::File;
///
/// # async fn example() -> anyhow::Result<()> {
/// let image = File::open("photo.jpg").await?;
/// let mask = File::open("photo_mask.png").await?;
/// let result = composite_from_reader(image, mask, &Settings::default()).await?;
/// result.save_png("photo_nobg.png")?;
/// # Ok(())
/// # }
/// ```
pub async fn composite_from_reader<R, M>(
    mut image_reader: R,
    mut mask_reader: M,
    settings: &Settings,
) -> Result<RemovalResult>
where
    R: AsyncRead + Unpin,
    M: AsyncRead + Unpin,
{
    let mut image_bytes = Vec::new();
    tokio::io::AsyncReadExt::read_to_end(&mut image_reader, &mut image_bytes)
        .await
        .map_err(|e| BgComposeError::processing(format!("Failed to read image stream: {}", e)))?;

    let mut mask_bytes = Vec::new();
    tokio::io::AsyncReadExt::read_to_end(&mut mask_reader, &mut mask_bytes)
        .await
        .map_err(|e| BgComposeError::processing(format!("Failed to read mask stream: {}", e)))?;

    composite_from_bytes(&image_bytes, &mask_bytes, settings).await
}
