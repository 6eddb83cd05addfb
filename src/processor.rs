//! Background removal processor
//!
//! [`BackgroundRemovalProcessor`] wires the inference boundary to the refinement
//! and compositing pipeline. Every entry point runs the same sequence:
//! predict (unless a raw mask is supplied) → refine → compose / replace / export
//! → optional auto-crop, recording per-stage timings along the way.

use crate::{
    config::{BackgroundMode, MaskExportFormat, Settings, DEFAULT_BLUR_STRENGTH},
    error::Result,
    inference::MaskPredictor,
    processing::{
        AlphaCompositor, BackgroundReplacer, ContentCropper, MaskExporter, MaskRefiner,
    },
    services::{
        ImageIOService, NoOpProgressReporter, ProcessingStage, ProgressReporter, ProgressTracker,
        ProgressUpdate,
    },
    types::{ColorImage, CompositeImage, CropBounds, Mask, ProcessingTimings, Rgb},
};
use instant::Instant;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Replacement background for [`BackgroundRemovalProcessor::replace_background`]
#[derive(Debug, Clone, PartialEq)]
pub enum BackgroundSource {
    /// Solid color
    Color(Rgb),
    /// Another image, resized to the input's size
    Image(ColorImage),
    /// Blurred copy of the input with the given kernel size
    Blur(u32),
}

impl Default for BackgroundSource {
    fn default() -> Self {
        Self::Blur(DEFAULT_BLUR_STRENGTH)
    }
}

/// Last pipeline stage of a run
#[derive(Debug, Clone, Copy)]
enum Terminal<'a> {
    Compose,
    Replace(&'a BackgroundSource),
    Export(MaskExportFormat),
}

/// Output of one pipeline run
#[derive(Debug, Clone)]
pub struct RemovalResult {
    /// Final image (composite, flattened replacement, or exported mask)
    pub output: CompositeImage,
    /// Mask as returned by the predictor, kept for re-processing with new settings
    pub raw_mask: Mask,
    /// Mask after threshold, morphology and feathering
    pub refined_mask: Mask,
    /// Content bounds when the output was auto-cropped
    pub crop_bounds: Option<CropBounds>,
    /// Per-stage timings
    pub timings: ProcessingTimings,
    /// Input (width, height)
    pub input_size: (u32, u32),
}

impl RemovalResult {
    #[must_use]
    pub fn was_cropped(&self) -> bool {
        self.crop_bounds.is_some()
    }

    /// Output buffer size in megabytes
    #[must_use]
    pub fn output_size_mb(&self) -> f64 {
        self.output.size_mb()
    }

    /// Save the output as PNG
    ///
    /// # Errors
    /// - Directory creation, encoding or write failures
    pub fn save_png<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        ImageIOService::save_png(&self.output, path)
    }

    /// Encode the output as PNG bytes
    ///
    /// # Errors
    /// - Encoding failures
    pub fn to_png_bytes(&self) -> Result<Vec<u8>> {
        ImageIOService::encode_png(&self.output)
    }
}

/// Runs the refinement and compositing use cases against a mask predictor
pub struct BackgroundRemovalProcessor {
    settings: Settings,
    predictor: Arc<dyn MaskPredictor>,
    refiner: MaskRefiner,
    replacer: BackgroundReplacer,
    reporter: Arc<dyn ProgressReporter>,
}

impl std::fmt::Debug for BackgroundRemovalProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundRemovalProcessor")
            .field("settings", &self.settings)
            .field("predictor", &self.predictor.name())
            .finish_non_exhaustive()
    }
}

impl BackgroundRemovalProcessor {
    /// Create a processor
    ///
    /// # Errors
    /// - `InvalidConfig` if `settings` fail validation
    pub fn new(settings: Settings, predictor: Arc<dyn MaskPredictor>) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            settings,
            predictor,
            refiner: MaskRefiner::new(),
            replacer: BackgroundReplacer::new(),
            reporter: Arc::new(NoOpProgressReporter),
        })
    }

    /// Report per-stage progress to `reporter`
    #[must_use]
    pub fn with_progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Replace the settings used by subsequent runs
    ///
    /// # Errors
    /// - `InvalidConfig` if `settings` fail validation; the old settings are kept
    pub fn set_settings(&mut self, settings: Settings) -> Result<()> {
        settings.validate()?;
        self.settings = settings;
        Ok(())
    }

    #[must_use]
    pub fn predictor_name(&self) -> &str {
        self.predictor.name()
    }

    /// Predict, refine, compose and optionally auto-crop
    ///
    /// # Errors
    /// - `ModelNotFound` / `InferenceFailed` from the predictor
    /// - `DimensionMismatch` if the predicted mask does not fit the image
    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    pub fn remove_background(&self, image: &ColorImage) -> Result<RemovalResult> {
        self.run(image, None, Terminal::Compose)
    }

    /// Re-run refinement and composition on a previously predicted raw mask
    ///
    /// # Errors
    /// - `DimensionMismatch` if `raw_mask` does not fit the image
    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    pub fn recompose(&self, image: &ColorImage, raw_mask: &Mask) -> Result<RemovalResult> {
        self.run(image, Some(raw_mask.clone()), Terminal::Compose)
    }

    /// Predict, refine and flatten onto `source`, then optionally auto-crop
    ///
    /// # Errors
    /// - `ModelNotFound` / `InferenceFailed` from the predictor
    /// - `DimensionMismatch` if the predicted mask does not fit the image
    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    pub fn replace_background(
        &self,
        image: &ColorImage,
        source: &BackgroundSource,
    ) -> Result<RemovalResult> {
        self.run(image, None, Terminal::Replace(source))
    }

    /// Predict, refine and render the mask in `format`
    ///
    /// # Errors
    /// - `ModelNotFound` / `InferenceFailed` from the predictor
    #[instrument(skip_all, fields(width = image.width(), height = image.height(), format = format.name()))]
    pub fn export_mask(
        &self,
        image: &ColorImage,
        format: MaskExportFormat,
    ) -> Result<RemovalResult> {
        self.run(image, None, Terminal::Export(format))
    }

    /// Load an image file and produce the output selected by `mode`
    ///
    /// # Errors
    /// - I/O and decoding failures for the input (or the background image)
    /// - Any error of [`Self::remove_background`] or [`Self::replace_background`]
    #[instrument(skip_all, fields(path = %path.as_ref().display(), mode = %mode))]
    pub fn process_file<P: AsRef<Path>>(
        &self,
        path: P,
        mode: &BackgroundMode,
    ) -> Result<RemovalResult> {
        let (image, decode_ms) = self.load_timed(path.as_ref())?;

        let mut result = match mode {
            BackgroundMode::Transparent => self.remove_background(&image)?,
            BackgroundMode::Color { color } => {
                self.replace_background(&image, &BackgroundSource::Color(*color))?
            },
            BackgroundMode::Image { path: background } => {
                let background = ImageIOService::load_image(background)?;
                self.replace_background(&image, &BackgroundSource::Image(background))?
            },
            BackgroundMode::Blur { strength } => {
                self.replace_background(&image, &BackgroundSource::Blur(*strength))?
            },
        };

        result.timings.image_decode_ms = decode_ms;
        result.timings.total_ms += decode_ms;
        Ok(result)
    }

    /// Load an image file and export its refined mask
    ///
    /// # Errors
    /// - I/O and decoding failures for the input
    /// - Any error of [`Self::export_mask`]
    pub fn export_mask_file<P: AsRef<Path>>(
        &self,
        path: P,
        format: MaskExportFormat,
    ) -> Result<RemovalResult> {
        let (image, decode_ms) = self.load_timed(path.as_ref())?;
        let mut result = self.export_mask(&image, format)?;
        result.timings.image_decode_ms = decode_ms;
        result.timings.total_ms += decode_ms;
        Ok(result)
    }

    fn load_timed(&self, path: &Path) -> Result<(ColorImage, u64)> {
        let start = Instant::now();
        self.reporter
            .report_progress(ProgressUpdate::new(ProcessingStage::ImageLoading, start));
        let image = ImageIOService::load_image(path).map_err(|e| {
            self.reporter
                .report_error(ProcessingStage::ImageLoading, &e.to_string());
            e
        })?;
        let decode_ms = start.elapsed().as_millis() as u64;
        debug!(decode_ms, "Loaded {}x{} input", image.width(), image.height());
        Ok((image, decode_ms))
    }

    fn run(
        &self,
        image: &ColorImage,
        raw_mask: Option<Mask>,
        terminal: Terminal<'_>,
    ) -> Result<RemovalResult> {
        let mut tracker = ProgressTracker::new(Arc::clone(&self.reporter));
        let result = self.run_tracked(image, raw_mask, terminal, &mut tracker);
        match &result {
            Ok(result) => tracker.report_completion(&result.timings),
            Err(e) => tracker.report_error(&e.to_string()),
        }
        result
    }

    fn run_tracked(
        &self,
        image: &ColorImage,
        raw_mask: Option<Mask>,
        terminal: Terminal<'_>,
        tracker: &mut ProgressTracker,
    ) -> Result<RemovalResult> {
        let total_start = Instant::now();
        let mut timings = ProcessingTimings::new();

        let raw_mask = match raw_mask {
            Some(mask) => mask,
            None => {
                tracker.report_stage(ProcessingStage::MaskPrediction);
                let start = Instant::now();
                let mask = self.predictor.predict_mask(image)?;
                timings.prediction_ms = start.elapsed().as_millis() as u64;
                debug!(
                    predictor = self.predictor.name(),
                    prediction_ms = timings.prediction_ms,
                    "Mask predicted"
                );
                mask
            },
        };

        tracker.report_stage(ProcessingStage::Refinement);
        let start = Instant::now();
        let params = self.settings.refine_params()?;
        let refined_mask = self.refiner.refine(&raw_mask, &params)?;
        timings.refinement_ms = start.elapsed().as_millis() as u64;

        let start = Instant::now();
        let output = match terminal {
            Terminal::Compose => {
                tracker.report_stage(ProcessingStage::Composition);
                AlphaCompositor::compose(image, &refined_mask)?
            },
            Terminal::Replace(source) => {
                tracker.report_stage(ProcessingStage::BackgroundReplacement);
                match source {
                    BackgroundSource::Color(color) => {
                        self.replacer.replace_with_color(image, &refined_mask, *color)?
                    },
                    BackgroundSource::Image(background) => {
                        self.replacer
                            .replace_with_image(image, &refined_mask, background)?
                    },
                    BackgroundSource::Blur(strength) => {
                        self.replacer
                            .replace_with_blur(image, &refined_mask, *strength)?
                    },
                }
            },
            Terminal::Export(format) => {
                tracker.report_stage(ProcessingStage::MaskExport);
                match format {
                    MaskExportFormat::Grayscale => MaskExporter::export_grayscale(&refined_mask),
                    MaskExportFormat::Binary { threshold } => {
                        MaskExporter::export_binary(&refined_mask, threshold)
                    },
                    MaskExportFormat::AlphaOnly => MaskExporter::export_alpha_only(&refined_mask),
                }
            },
        };
        timings.composition_ms = start.elapsed().as_millis() as u64;

        let crop_output =
            self.settings.auto_crop_output && !matches!(terminal, Terminal::Export(_));
        let (output, crop_bounds) = if crop_output {
            tracker.report_stage(ProcessingStage::Cropping);
            let start = Instant::now();
            let cropper = ContentCropper::new(self.settings.crop_alpha_threshold);
            let bounds = cropper.bounds(&output);
            let cropped = ContentCropper::crop_to(&output, &bounds);
            timings.crop_ms = start.elapsed().as_millis() as u64;
            (cropped, Some(bounds))
        } else {
            (output, None)
        };

        timings.total_ms = total_start.elapsed().as_millis() as u64;
        tracker.report_stage(ProcessingStage::Completed);
        info!(
            width = output.width(),
            height = output.height(),
            cropped = crop_bounds.is_some(),
            "Pipeline finished: {}",
            timings.summary()
        );

        Ok(RemovalResult {
            output,
            raw_mask,
            refined_mask,
            crop_bounds,
            timings,
            input_size: image.dimensions(),
        })
    }
}
