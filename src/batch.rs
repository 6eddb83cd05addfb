//! Batch orchestration over many input files
//!
//! Items run on tokio's blocking pool, bounded by a semaphore. Every item is
//! independent: a failure is recorded in the [`BatchResult`] and the rest of
//! the batch carries on.

use crate::{
    config::{BackgroundMode, MaskExportFormat},
    error::{BgComposeError, Result},
    processor::BackgroundRemovalProcessor,
    services::{BatchProgress, NoOpProgressReporter, ProgressReporter},
    utils::NumericValidator,
};
use chrono::{DateTime, Utc};
use instant::Instant;
use serde::Serialize;
use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};
use tokio::sync::Semaphore;
use tracing::{info, instrument, warn};

/// Default number of concurrent workers
pub const DEFAULT_WORKERS: usize = 4;

/// What to produce for every item of a batch
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOperation {
    /// Foreground cut-out or background replacement, written as `<stem>_nobg.png`
    Remove(BackgroundMode),
    /// Refined mask export, written as `<stem>_<format>_mask.png`
    ExportMask(MaskExportFormat),
}

impl Default for BatchOperation {
    fn default() -> Self {
        Self::Remove(BackgroundMode::Transparent)
    }
}

impl BatchOperation {
    /// Output file name for `input`
    #[must_use]
    pub fn output_file_name(&self, input: &Path) -> String {
        self.file_name_for_stem(&file_stem(input))
    }

    fn file_name_for_stem(&self, stem: &str) -> String {
        match self {
            Self::Remove(_) => format!("{stem}_nobg.png"),
            Self::ExportMask(format) => format!("{stem}_{}_mask.png", format.name()),
        }
    }
}

fn file_stem(input: &Path) -> String {
    input
        .file_stem()
        .map_or_else(|| "output".to_string(), |s| s.to_string_lossy().into_owned())
}

/// Outcome of one successful batch item
#[derive(Debug, Clone, Serialize)]
pub struct BatchItemResult {
    pub input: PathBuf,
    pub output: PathBuf,
    pub width: u32,
    pub height: u32,
    pub cropped: bool,
    pub processing_ms: u64,
}

/// A failed batch item
#[derive(Debug, Clone, Serialize)]
pub struct BatchItemError {
    pub input: PathBuf,
    pub message: String,
}

/// Summary of a whole batch run
#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    /// Successful items, in input order
    pub items: Vec<BatchItemResult>,
    /// Failed items, in input order
    pub errors: Vec<BatchItemError>,
    pub total_time_ms: u64,
    pub started_at: DateTime<Utc>,
}

impl BatchResult {
    /// Share of successful items in percent; an empty batch is 0%
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.successful as f64 / self.total as f64 * 100.0
        }
    }

    /// Pretty-printed JSON report
    ///
    /// # Errors
    /// - Serialization failure
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Runs a [`BackgroundRemovalProcessor`] over many files concurrently
pub struct BatchProcessor {
    processor: Arc<BackgroundRemovalProcessor>,
    workers: usize,
    operation: BatchOperation,
    reporter: Arc<dyn ProgressReporter>,
}

impl std::fmt::Debug for BatchProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchProcessor")
            .field("processor", &self.processor)
            .field("workers", &self.workers)
            .field("operation", &self.operation)
            .finish_non_exhaustive()
    }
}

impl BatchProcessor {
    /// Batch processor using the processor's configured background mode
    #[must_use]
    pub fn new(processor: Arc<BackgroundRemovalProcessor>) -> Self {
        let operation = BatchOperation::Remove(processor.settings().background.clone());
        Self {
            processor,
            workers: DEFAULT_WORKERS,
            operation,
            reporter: Arc::new(NoOpProgressReporter),
        }
    }

    /// Set the number of concurrent workers
    ///
    /// # Errors
    /// - `InvalidConfig` if `workers` is 0 or unreasonably large
    pub fn with_workers(mut self, workers: usize) -> Result<Self> {
        self.workers = NumericValidator::validate_worker_count(workers)?;
        Ok(self)
    }

    #[must_use]
    pub fn with_operation(mut self, operation: BatchOperation) -> Self {
        self.operation = operation;
        self
    }

    #[must_use]
    pub fn with_progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers
    }

    #[must_use]
    pub fn operation(&self) -> &BatchOperation {
        &self.operation
    }

    /// Process every input, writing results into `output_dir`
    ///
    /// Only failing to create `output_dir` fails the whole call; per-item
    /// failures end up in [`BatchResult::errors`].
    ///
    /// # Errors
    /// - `Io` if the output directory cannot be created
    #[instrument(skip_all, fields(count = inputs.len(), workers = self.workers))]
    pub async fn process(&self, inputs: &[PathBuf], output_dir: &Path) -> Result<BatchResult> {
        let started_at = Utc::now();
        let start = Instant::now();

        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|e| BgComposeError::file_io_error("create output directory", output_dir, &e))?;

        let total = inputs.len();
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let progress = Arc::new(Mutex::new(BatchProgress {
            total,
            ..BatchProgress::default()
        }));

        info!("Processing {} files with {} workers", total, self.workers);

        let outputs = self.output_paths(inputs, output_dir);
        let tasks = inputs.iter().zip(outputs).map(|(input, output)| {
            let semaphore = Arc::clone(&semaphore);
            let progress = Arc::clone(&progress);
            let processor = Arc::clone(&self.processor);
            let reporter = Arc::clone(&self.reporter);
            let operation = self.operation.clone();
            let input = input.clone();

            async move {
                let outcome = match semaphore.acquire_owned().await {
                    Ok(_permit) => {
                        let (task_input, task_output) = (input.clone(), output.clone());
                        tokio::task::spawn_blocking(move || {
                            process_item(&processor, &operation, &task_input, &task_output)
                        })
                        .await
                        .unwrap_or_else(|e| {
                            Err(BgComposeError::processing(format!("worker task failed: {e}")))
                        })
                    },
                    Err(e) => Err(BgComposeError::processing(format!("worker pool closed: {e}"))),
                };

                let snapshot = {
                    let mut progress = match progress.lock() {
                        Ok(guard) => guard,
                        Err(poisoned) => poisoned.into_inner(),
                    };
                    progress.completed += 1;
                    if outcome.is_err() {
                        progress.failed += 1;
                    }
                    progress.current_file = input
                        .file_name()
                        .map(|name| name.to_string_lossy().into_owned());
                    progress.elapsed_ms = start.elapsed().as_millis() as u64;
                    progress.clone()
                };
                reporter.report_batch_progress(&snapshot);

                (input, outcome)
            }
        });

        let outcomes = futures::future::join_all(tasks).await;

        let mut items = Vec::new();
        let mut errors = Vec::new();
        for (input, outcome) in outcomes {
            match outcome {
                Ok(item) => items.push(item),
                Err(e) => {
                    warn!("Failed to process {}: {}", input.display(), e);
                    errors.push(BatchItemError {
                        input,
                        message: e.to_string(),
                    });
                },
            }
        }

        let result = BatchResult {
            total,
            successful: items.len(),
            failed: errors.len(),
            items,
            errors,
            total_time_ms: start.elapsed().as_millis() as u64,
            started_at,
        };

        info!(
            "Batch finished: {}/{} succeeded ({:.1}%) in {}ms",
            result.successful,
            result.total,
            result.success_rate(),
            result.total_time_ms
        );

        Ok(result)
    }

    /// Output path for every input, unique within the batch
    ///
    /// The first input with a given stem gets the plain name. Later inputs with
    /// the same stem fold their extension, then a counter, into the stem.
    /// Names are compared case-insensitively.
    fn output_paths(&self, inputs: &[PathBuf], output_dir: &Path) -> Vec<PathBuf> {
        let mut taken = HashSet::new();

        inputs
            .iter()
            .map(|input| {
                let stem = file_stem(input);
                let extension = input
                    .extension()
                    .map(|extension| extension.to_string_lossy().into_owned());

                let mut attempt = 0_usize;
                let name = loop {
                    let candidate = match (attempt, &extension) {
                        (0, _) => stem.clone(),
                        (1, Some(extension)) => format!("{stem}_{extension}"),
                        (n, _) => format!("{stem}_{n}"),
                    };
                    let name = self.operation.file_name_for_stem(&candidate);
                    if taken.insert(name.to_lowercase()) {
                        break name;
                    }
                    attempt += 1;
                };

                if name != self.operation.output_file_name(input) {
                    warn!("Output name clash for {}, writing {}", input.display(), name);
                }
                output_dir.join(name)
            })
            .collect()
    }
}

fn process_item(
    processor: &BackgroundRemovalProcessor,
    operation: &BatchOperation,
    input: &Path,
    output: &Path,
) -> Result<BatchItemResult> {
    let result = match operation {
        BatchOperation::Remove(mode) => processor.process_file(input, mode)?,
        BatchOperation::ExportMask(format) => processor.export_mask_file(input, *format)?,
    };
    result.save_png(output)?;

    let (width, height) = result.output.dimensions();
    Ok(BatchItemResult {
        input: input.to_path_buf(),
        output: output.to_path_buf(),
        width,
        height,
        cropped: result.was_cropped(),
        processing_ms: result.timings.total_ms,
    })
}
