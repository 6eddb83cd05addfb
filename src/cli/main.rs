//! Background compositing CLI tool
//!
//! Command-line interface that refines precomputed foreground masks and composites
//! the results through the unified processor.

use super::config::CliConfigBuilder;
use crate::{
    batch::{BatchOperation, BatchProcessor, BatchResult},
    processor::BackgroundRemovalProcessor,
    services::{
        BatchProgress, ProcessingStage, ProgressReporter, ProgressUpdate, SettingsStore,
        SUPPORTED_EXTENSIONS,
    },
    tracing_config::{init_cli_tracing, spans},
    types::ProcessingTimings,
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, Instrument};

/// Mask refinement and background compositing tool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "bgcompose")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Input image files or directories
    #[arg(value_name = "INPUT", required_unless_present = "save_settings")]
    pub input: Vec<String>,

    /// Output file (single input) or directory (batch processing)
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: Option<PathBuf>,

    /// Process directories recursively
    #[arg(short, long)]
    pub recursive: bool,

    /// Pattern for batch processing (e.g., "*.jpg")
    #[arg(long)]
    pub pattern: Option<String>,

    /// Mask file for a single input image
    #[arg(long, value_name = "FILE")]
    pub mask: Option<PathBuf>,

    /// Directory holding sidecar masks [default: next to each image]
    #[arg(long, value_name = "DIR")]
    pub mask_dir: Option<PathBuf>,

    /// File name suffix of sidecar masks (photo.jpg -> photo<SUFFIX>.png)
    #[arg(long, default_value = crate::inference::DEFAULT_MASK_SUFFIX)]
    pub mask_suffix: String,

    /// Foreground threshold (0.0-1.0, 0 keeps soft probabilities)
    #[arg(long)]
    pub threshold: Option<f32>,

    /// Morphological smoothing radius in pixels
    #[arg(long)]
    pub smooth: Option<u32>,

    /// Edge feathering radius in pixels
    #[arg(long)]
    pub feather: Option<u32>,

    /// Crop results to their visible content
    #[arg(long)]
    pub auto_crop: bool,

    /// Alpha value at or above which a pixel counts as content when cropping
    #[arg(long)]
    pub crop_threshold: Option<u8>,

    /// What to put behind the foreground
    #[arg(long, value_enum)]
    pub background: Option<CliBackground>,

    /// Background color ("#rrggbb" or "r,g,b")
    #[arg(long)]
    pub color: Option<String>,

    /// Background image, resized to each input
    #[arg(long, value_name = "FILE")]
    pub background_image: Option<PathBuf>,

    /// Gaussian blur strength for blurred backgrounds
    #[arg(long)]
    pub blur_strength: Option<u32>,

    /// Export the refined mask instead of a composite
    #[arg(long, value_enum)]
    pub export_mask: Option<CliMaskFormat>,

    /// Threshold for binary mask export (0.0-1.0)
    #[arg(long)]
    pub binary_threshold: Option<f32>,

    /// Settings file [default: per-user config directory]
    #[arg(long, value_name = "FILE")]
    pub settings: Option<PathBuf>,

    /// Persist the effective settings
    #[arg(long)]
    pub save_settings: bool,

    /// Number of concurrent workers for batch processing
    #[arg(short, long, default_value_t = crate::batch::DEFAULT_WORKERS)]
    pub workers: usize,

    /// Write a JSON batch report
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliBackground {
    Transparent,
    Color,
    Image,
    Blur,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliMaskFormat {
    Grayscale,
    Binary,
    Alpha,
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_cli_tracing(cli.verbose).context("Failed to initialize tracing")?;

    CliConfigBuilder::validate_cli(&cli).context("Invalid CLI arguments")?;

    let store = CliConfigBuilder::settings_store(&cli);
    let base = CliConfigBuilder::base_settings(&cli, store.as_ref())?;
    let settings = CliConfigBuilder::settings_from_cli(&cli, base)?;

    if cli.save_settings {
        let store = store.context("No settings location available; pass --settings")?;
        store
            .save(&settings)
            .with_context(|| format!("Failed to save settings to {}", store.path().display()))?;
        info!("Saved settings to {}", store.path().display());
        if cli.input.is_empty() {
            return Ok(());
        }
    }

    let operation = CliConfigBuilder::operation(&cli, &settings);
    let predictor = CliConfigBuilder::predictor(&cli)?;

    info!("Starting bgcompose");
    info!("Input(s): {}", cli.input.join(", "));
    info!("Mask source: {}", predictor.name());
    debug!(?settings, "Effective settings");

    let processor = BackgroundRemovalProcessor::new(settings, predictor)
        .context("Failed to create background removal processor")?;

    let start_time = Instant::now();
    let processed_count = process_inputs(&cli, processor, operation).await?;

    info!(
        "Processed {} image(s) in {:.2}s",
        processed_count,
        start_time.elapsed().as_secs_f64()
    );

    Ok(())
}

/// Process every input, one file directly or many through the batch processor
async fn process_inputs(
    cli: &Cli,
    processor: BackgroundRemovalProcessor,
    operation: BatchOperation,
) -> Result<usize> {
    let mut all_files = Vec::new();

    for input in &cli.input {
        let path = PathBuf::from(input);

        if path.is_file() {
            if is_image_file(&path) {
                all_files.push(path);
            } else {
                warn!("Skipping unsupported file: {}", path.display());
            }
        } else if path.is_dir() {
            all_files.extend(find_image_files(&path, cli.recursive, cli.pattern.as_deref())?);
        } else {
            anyhow::bail!(
                "Input path does not exist or is not accessible: {}",
                path.display()
            );
        }
    }

    // Sidecar masks live next to their images; never treat them as inputs
    if cli.mask_dir.is_none() && !cli.mask_suffix.is_empty() {
        all_files.retain(|path| !is_sidecar_mask(path, &cli.mask_suffix));
    }

    if all_files.is_empty() {
        warn!("No supported image files found in the provided inputs");
        return Ok(0);
    }

    all_files.sort();
    all_files.dedup();

    info!("Found {} image file(s) to process", all_files.len());

    if all_files.len() == 1 && cli.report.is_none() {
        if let Some(input) = all_files.first() {
            process_single_file(cli, &processor, &operation, input)?;
        }
        return Ok(1);
    }

    let output_dir = batch_output_dir(cli, &processor)?;
    let progress_bar = ProgressBar::new(all_files.len() as u64);
    progress_bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    let batch = BatchProcessor::new(Arc::new(processor))
        .with_workers(cli.workers)?
        .with_operation(operation)
        .with_progress_reporter(Arc::new(IndicatifBatchReporter::new(progress_bar.clone())));

    let result = batch
        .process(&all_files, &output_dir)
        .instrument(spans::batch_processing(all_files.len(), batch.workers()))
        .await?;

    progress_bar.finish_with_message(format!(
        "Completed! Processed: {}, Failed: {}",
        result.successful, result.failed
    ));

    log_batch_summary(&result);

    if let Some(report) = &cli.report {
        let json = result.to_json()?;
        std::fs::write(report, json)
            .with_context(|| format!("Failed to write report {}", report.display()))?;
        info!("Wrote batch report to {}", report.display());
    }

    Ok(result.successful)
}

fn process_single_file(
    cli: &Cli,
    processor: &BackgroundRemovalProcessor,
    operation: &BatchOperation,
    input: &Path,
) -> Result<()> {
    let span = spans::file_processing(input, &operation_label(operation));
    let _guard = span.enter();

    let result = match operation {
        BatchOperation::Remove(mode) => processor.process_file(input, mode),
        BatchOperation::ExportMask(format) => processor.export_mask_file(input, *format),
    }
    .with_context(|| format!("Failed to process {}", input.display()))?;

    let output = single_output_path(cli.output.as_deref(), input, operation);
    result
        .save_png(&output)
        .with_context(|| format!("Failed to save {}", output.display()))?;

    info!(
        "Saved {} ({:.2} MB, masks from {})",
        output.display(),
        result.output_size_mb(),
        processor.predictor_name()
    );
    debug!("{}", result.timings.summary());
    Ok(())
}

/// Output directory for a batch run, created if missing
fn batch_output_dir(cli: &Cli, processor: &BackgroundRemovalProcessor) -> Result<PathBuf> {
    let output_path = cli
        .output
        .clone()
        .or_else(|| processor.settings().default_save_folder.clone())
        .unwrap_or_else(|| PathBuf::from("."));

    if output_path.is_file() {
        anyhow::bail!(
            "Output path exists and is a file, not a directory: {}",
            output_path.display()
        );
    }
    Ok(output_path)
}

/// Explicit output file, a file inside an explicit output directory, or a
/// file next to the input
fn single_output_path(output: Option<&Path>, input: &Path, operation: &BatchOperation) -> PathBuf {
    let file_name = operation.output_file_name(input);
    match output {
        Some(path) if path.is_dir() => path.join(file_name),
        Some(path) => path.to_path_buf(),
        None => input.parent().unwrap_or(Path::new(".")).join(file_name),
    }
}

fn operation_label(operation: &BatchOperation) -> String {
    match operation {
        BatchOperation::Remove(mode) => mode.to_string(),
        BatchOperation::ExportMask(format) => format!("mask-{}", format.name()),
    }
}

fn log_batch_summary(result: &BatchResult) {
    if result.failed > 0 {
        warn!(
            "Some files failed to process. Processed: {}, Failed: {}",
            result.successful, result.failed
        );
        for error in &result.errors {
            warn!("  {}: {}", error.input.display(), error.message);
        }
    }

    let total_secs = result.total_time_ms as f64 / 1000.0;
    info!("Batch processing summary:");
    info!("  Files processed: {}", result.successful);
    info!("  Files failed: {}", result.failed);
    info!("  Success rate: {:.1}%", result.success_rate());
    info!("  Total time: {:.2}s", total_secs);
    info!(
        "  Average per file: {:.2}s",
        if result.successful > 0 {
            total_secs / result.successful as f64
        } else {
            0.0
        }
    );
}

/// Progress bar driven by batch progress updates
struct IndicatifBatchReporter {
    bar: ProgressBar,
}

impl IndicatifBatchReporter {
    fn new(bar: ProgressBar) -> Self {
        Self { bar }
    }
}

impl ProgressReporter for IndicatifBatchReporter {
    fn report_progress(&self, _update: ProgressUpdate) {}

    fn report_completion(&self, _timings: &ProcessingTimings) {}

    fn report_error(&self, stage: ProcessingStage, error: &str) {
        self.bar
            .suspend(|| warn!("{} failed: {}", stage.description(), error));
    }

    fn report_batch_progress(&self, progress: &BatchProgress) {
        self.bar.set_position(progress.completed as u64);
        if let Some(file) = &progress.current_file {
            self.bar.set_message(file.clone());
        }
    }
}

/// Find image files in a directory
fn find_image_files(dir: &Path, recursive: bool, pattern: Option<&str>) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    if recursive {
        for entry in walkdir::WalkDir::new(dir) {
            let entry = entry?;
            if entry.file_type().is_file() {
                let path = entry.path();
                if is_image_file(path) && matches_pattern(path, pattern) {
                    files.push(path.to_path_buf());
                }
            }
        }
    } else {
        for entry in std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read directory {}", dir.display()))?
        {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                let path = entry.path();
                if is_image_file(&path) && matches_pattern(&path, pattern) {
                    files.push(path);
                }
            }
        }
    }

    Ok(files)
}

/// Check if file is a supported image based on extension
fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

fn is_sidecar_mask(path: &Path, suffix: &str) -> bool {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .is_some_and(|stem| stem.ends_with(suffix))
}

/// Check if file matches the given pattern
fn matches_pattern(path: &Path, pattern: Option<&str>) -> bool {
    match pattern {
        Some(pat) => path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|filename| {
                glob::Pattern::new(pat)
                    .map(|p| p.matches(filename))
                    .unwrap_or(false)
            }),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackgroundMode, MaskExportFormat};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_is_image_file() {
        assert!(is_image_file(Path::new("test.jpg")));
        assert!(is_image_file(Path::new("test.PNG")));
        assert!(is_image_file(Path::new("test.webp")));
        assert!(is_image_file(Path::new("test.bmp")));
        assert!(!is_image_file(Path::new("test.tiff")));
        assert!(!is_image_file(Path::new("test.txt")));
        assert!(!is_image_file(Path::new("test")));
    }

    #[test]
    fn test_matches_pattern() {
        let path = Path::new("photo_01.jpg");
        assert!(matches_pattern(path, None));
        assert!(matches_pattern(path, Some("*.jpg")));
        assert!(matches_pattern(path, Some("photo_*")));
        assert!(!matches_pattern(path, Some("*.png")));
        assert!(!matches_pattern(path, Some("[")));
    }

    #[test]
    fn test_sidecar_mask_detection() {
        assert!(is_sidecar_mask(Path::new("cat_mask.png"), "_mask"));
        assert!(!is_sidecar_mask(Path::new("cat.png"), "_mask"));
        assert!(!is_sidecar_mask(Path::new("masked.png"), "_mask"));
    }

    #[test]
    fn test_single_output_path() {
        let temp_dir = TempDir::new().unwrap();
        let input = Path::new("/photos/cat.jpg");
        let remove = BatchOperation::Remove(BackgroundMode::Transparent);

        assert_eq!(
            single_output_path(None, input, &remove),
            PathBuf::from("/photos/cat_nobg.png")
        );
        assert_eq!(
            single_output_path(Some(Path::new("/out/result.png")), input, &remove),
            PathBuf::from("/out/result.png")
        );
        assert_eq!(
            single_output_path(
                Some(temp_dir.path()),
                input,
                &BatchOperation::ExportMask(MaskExportFormat::Grayscale)
            ),
            temp_dir.path().join("cat_grayscale_mask.png")
        );
    }

    #[test]
    fn test_find_image_files() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("nested");
        fs::create_dir(&nested).unwrap();
        fs::write(temp_dir.path().join("a.png"), b"").unwrap();
        fs::write(temp_dir.path().join("b.jpg"), b"").unwrap();
        fs::write(temp_dir.path().join("notes.txt"), b"").unwrap();
        fs::write(nested.join("c.png"), b"").unwrap();

        let mut flat = find_image_files(temp_dir.path(), false, None).unwrap();
        flat.sort();
        assert_eq!(flat.len(), 2);

        let recursive = find_image_files(temp_dir.path(), true, Some("*.png")).unwrap();
        assert_eq!(recursive.len(), 2);
        assert!(recursive.iter().all(|p| p.extension().unwrap() == "png"));
    }

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from([
            "bgcompose",
            "in.png",
            "-o",
            "out",
            "--background",
            "blur",
            "--blur-strength",
            "21",
            "-vv",
        ])
        .unwrap();
        assert_eq!(cli.input, vec!["in.png".to_string()]);
        assert_eq!(cli.output, Some(PathBuf::from("out")));
        assert_eq!(cli.background, Some(CliBackground::Blur));
        assert_eq!(cli.blur_strength, Some(21));
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.workers, crate::batch::DEFAULT_WORKERS);
        assert_eq!(cli.mask_suffix, "_mask");

        assert!(Cli::try_parse_from(["bgcompose"]).is_err());
        assert!(Cli::try_parse_from(["bgcompose", "--save-settings"]).is_ok());
    }
}
