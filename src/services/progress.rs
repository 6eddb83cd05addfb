//! Progress reporting service
//!
//! Separates progress reporting from the pipeline so that different frontends
//! (CLI progress bars, logs, GUIs) can present it their own way.

use crate::types::ProcessingTimings;
use instant::Instant;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Progress stages of a single pipeline invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    /// Loading and decoding input image
    ImageLoading,
    /// Obtaining the raw mask at the inference boundary
    MaskPrediction,
    /// Threshold, morphology and feathering
    Refinement,
    /// Attaching the mask as alpha
    Composition,
    /// Flattening onto a substitute background
    BackgroundReplacement,
    /// Rendering the mask as a standalone image
    MaskExport,
    /// Cropping to visible content
    Cropping,
    /// Processing completed
    Completed,
}

impl ProcessingStage {
    /// Get a human-readable description of the processing stage
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            ProcessingStage::ImageLoading => "Loading input image",
            ProcessingStage::MaskPrediction => "Predicting foreground mask",
            ProcessingStage::Refinement => "Refining mask",
            ProcessingStage::Composition => "Compositing alpha",
            ProcessingStage::BackgroundReplacement => "Replacing background",
            ProcessingStage::MaskExport => "Exporting mask",
            ProcessingStage::Cropping => "Cropping to content",
            ProcessingStage::Completed => "Processing completed",
        }
    }

    /// Get the typical progress percentage for this stage
    #[must_use]
    pub fn progress_percentage(&self) -> u8 {
        match self {
            ProcessingStage::ImageLoading => 10,
            ProcessingStage::MaskPrediction => 40,
            ProcessingStage::Refinement => 70,
            ProcessingStage::Composition
            | ProcessingStage::BackgroundReplacement
            | ProcessingStage::MaskExport => 85,
            ProcessingStage::Cropping => 95,
            ProcessingStage::Completed => 100,
        }
    }
}

/// Progress update containing stage and timing information
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// Current processing stage
    pub stage: ProcessingStage,
    /// Progress percentage (0-100)
    pub progress: u8,
    /// Human-readable stage description
    pub description: String,
    /// Elapsed time since processing started (milliseconds)
    pub elapsed_ms: u64,
}

impl ProgressUpdate {
    /// Create a new progress update
    #[must_use]
    pub fn new(stage: ProcessingStage, start_time: Instant) -> Self {
        Self {
            progress: stage.progress_percentage(),
            description: stage.description().to_string(),
            elapsed_ms: start_time.elapsed().as_millis() as u64,
            stage,
        }
    }
}

/// Aggregate progress of a batch job
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchProgress {
    /// Number of items in the batch
    pub total: usize,
    /// Items finished so far, successful or not
    pub completed: usize,
    /// Items that failed
    pub failed: usize,
    /// Item that just finished
    pub current_file: Option<String>,
    /// Time since the batch started (milliseconds)
    pub elapsed_ms: u64,
}

impl BatchProgress {
    /// Completion percentage (0.0-100.0); an empty batch counts as done
    #[must_use]
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.completed as f64 / self.total as f64 * 100.0
        }
    }

    /// Remaining time extrapolated from the average item time
    #[must_use]
    pub fn eta_ms(&self) -> Option<u64> {
        if self.completed == 0 {
            return None;
        }
        let remaining = self.total.saturating_sub(self.completed) as u64;
        Some(self.elapsed_ms / self.completed as u64 * remaining)
    }

    /// Items that finished without error
    #[must_use]
    pub fn successful(&self) -> usize {
        self.completed.saturating_sub(self.failed)
    }
}

/// Trait for reporting progress during pipeline runs
pub trait ProgressReporter: Send + Sync {
    /// Report a progress update
    fn report_progress(&self, update: ProgressUpdate);

    /// Report processing completion with final timings
    fn report_completion(&self, timings: &ProcessingTimings);

    /// Report an error during processing
    fn report_error(&self, stage: ProcessingStage, error: &str);

    /// Report batch progress after each finished item
    fn report_batch_progress(&self, progress: &BatchProgress) {
        // Default implementation does nothing
        let _ = progress;
    }
}

/// No-op progress reporter that discards all progress updates
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn report_progress(&self, _update: ProgressUpdate) {}

    fn report_completion(&self, _timings: &ProcessingTimings) {}

    fn report_error(&self, _stage: ProcessingStage, _error: &str) {}
}

/// Console progress reporter that logs progress through `log`
#[derive(Debug, Clone, Copy)]
pub struct ConsoleProgressReporter {
    verbose: bool,
}

impl ConsoleProgressReporter {
    /// Create a new console progress reporter
    ///
    /// # Arguments
    /// * `verbose` - Whether to show detailed progress information
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Format duration in milliseconds to human-readable string
    fn format_duration(ms: u64) -> String {
        let seconds = ms / 1000;
        if seconds < 60 {
            format!("{}s", seconds)
        } else {
            format!("{}m {}s", seconds / 60, seconds % 60)
        }
    }
}

impl ProgressReporter for ConsoleProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        if self.verbose {
            log::info!(
                "[{}%] {} ({}ms elapsed)",
                update.progress,
                update.description,
                update.elapsed_ms
            );
        } else {
            log::info!("[{}%] {}", update.progress, update.description);
        }
    }

    fn report_completion(&self, timings: &ProcessingTimings) {
        log::info!("✅ Processing completed in {}ms", timings.total_ms);

        if self.verbose {
            log::info!("  📊 Detailed timings:");
            log::info!("    • Image decode: {}ms", timings.image_decode_ms);
            log::info!("    • Prediction: {}ms", timings.prediction_ms);
            log::info!("    • Refinement: {}ms", timings.refinement_ms);
            log::info!("    • Composition: {}ms", timings.composition_ms);
            log::info!("    • Crop: {}ms", timings.crop_ms);
        }
    }

    fn report_error(&self, stage: ProcessingStage, error: &str) {
        log::error!("❌ Error during {}: {}", stage.description(), error);
    }

    fn report_batch_progress(&self, progress: &BatchProgress) {
        let eta = progress
            .eta_ms()
            .map_or_else(|| "calculating...".to_string(), Self::format_duration);
        log::info!(
            "📁 {}/{} ({:.1}%) - {} failed - {} elapsed, ETA {}{}",
            progress.completed,
            progress.total,
            progress.percentage(),
            progress.failed,
            Self::format_duration(progress.elapsed_ms),
            eta,
            progress
                .current_file
                .as_deref()
                .map(|f| format!(" - {}", f))
                .unwrap_or_default()
        );
    }
}

/// Progress tracker that manages timing and progress reporting
pub struct ProgressTracker {
    reporter: Arc<dyn ProgressReporter>,
    start_time: Instant,
    current_stage: Option<ProcessingStage>,
}

impl ProgressTracker {
    /// Create a new progress tracker with the specified reporter
    #[must_use]
    pub fn new(reporter: Arc<dyn ProgressReporter>) -> Self {
        Self {
            reporter,
            start_time: Instant::now(),
            current_stage: None,
        }
    }

    /// Create a progress tracker with no-op reporter (for testing/disabled progress)
    #[must_use]
    pub fn no_op() -> Self {
        Self::new(Arc::new(NoOpProgressReporter))
    }

    /// Create a progress tracker with console reporter
    #[must_use]
    pub fn console(verbose: bool) -> Self {
        Self::new(Arc::new(ConsoleProgressReporter::new(verbose)))
    }

    /// Report progress for a specific stage
    pub fn report_stage(&mut self, stage: ProcessingStage) {
        self.current_stage = Some(stage);
        self.reporter
            .report_progress(ProgressUpdate::new(stage, self.start_time));
    }

    /// Report completion with final timings
    pub fn report_completion(&self, timings: &ProcessingTimings) {
        self.reporter.report_completion(timings);
    }

    /// Report an error against the most recent stage
    pub fn report_error(&self, error: &str) {
        let stage = self.current_stage.unwrap_or(ProcessingStage::MaskPrediction);
        self.reporter.report_error(stage, error);
    }

    /// Get the elapsed time since tracking started
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    /// Get the current processing stage
    #[must_use]
    pub fn current_stage(&self) -> Option<ProcessingStage> {
        self.current_stage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct TestProgressReporter {
        updates: Arc<Mutex<Vec<ProgressUpdate>>>,
        completions: Arc<Mutex<Vec<ProcessingTimings>>>,
        errors: Arc<Mutex<Vec<(ProcessingStage, String)>>>,
    }

    impl ProgressReporter for TestProgressReporter {
        fn report_progress(&self, update: ProgressUpdate) {
            self.updates.lock().unwrap().push(update);
        }

        fn report_completion(&self, timings: &ProcessingTimings) {
            self.completions.lock().unwrap().push(timings.clone());
        }

        fn report_error(&self, stage: ProcessingStage, error: &str) {
            self.errors.lock().unwrap().push((stage, error.to_string()));
        }
    }

    #[test]
    fn test_processing_stage_progress_ordering() {
        let stages = [
            ProcessingStage::ImageLoading,
            ProcessingStage::MaskPrediction,
            ProcessingStage::Refinement,
            ProcessingStage::Composition,
            ProcessingStage::Cropping,
            ProcessingStage::Completed,
        ];
        for pair in stages.windows(2) {
            assert!(pair[0].progress_percentage() < pair[1].progress_percentage());
        }
        assert_eq!(ProcessingStage::Completed.progress_percentage(), 100);
        assert!(!ProcessingStage::Refinement.description().is_empty());
    }

    #[test]
    fn test_progress_tracker() {
        let reporter = TestProgressReporter::default();
        let updates = Arc::clone(&reporter.updates);
        let completions = Arc::clone(&reporter.completions);
        let errors = Arc::clone(&reporter.errors);

        let mut tracker = ProgressTracker::new(Arc::new(reporter));
        assert_eq!(tracker.current_stage(), None);

        tracker.report_error("early");
        tracker.report_stage(ProcessingStage::MaskPrediction);
        tracker.report_stage(ProcessingStage::Refinement);
        tracker.report_error("boom");
        tracker.report_completion(&ProcessingTimings::default());

        let updates = updates.lock().unwrap();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].stage, ProcessingStage::MaskPrediction);
        assert_eq!(updates[1].description, "Refining mask");
        assert_eq!(tracker.current_stage(), Some(ProcessingStage::Refinement));
        assert_eq!(
            errors.lock().unwrap().as_slice(),
            &[
                (ProcessingStage::MaskPrediction, "early".to_string()),
                (ProcessingStage::Refinement, "boom".to_string())
            ]
        );
        assert_eq!(completions.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_batch_progress_math() {
        let progress = BatchProgress {
            total: 4,
            completed: 2,
            failed: 1,
            current_file: Some("a.png".to_string()),
            elapsed_ms: 1000,
        };
        assert_eq!(progress.percentage(), 50.0);
        assert_eq!(progress.eta_ms(), Some(1000));
        assert_eq!(progress.successful(), 1);

        let fresh = BatchProgress {
            total: 3,
            ..Default::default()
        };
        assert_eq!(fresh.eta_ms(), None);
        assert_eq!(fresh.percentage(), 0.0);
        assert_eq!(BatchProgress::default().percentage(), 100.0);
    }

    #[test]
    fn test_reporters_as_trait_objects() {
        let reporters: Vec<Box<dyn ProgressReporter>> = vec![
            Box::new(NoOpProgressReporter),
            Box::new(ConsoleProgressReporter::new(true)),
            Box::new(ConsoleProgressReporter::new(false)),
        ];
        let progress = BatchProgress {
            total: 1,
            completed: 1,
            ..Default::default()
        };
        for reporter in &reporters {
            reporter.report_progress(ProgressUpdate::new(
                ProcessingStage::Completed,
                Instant::now(),
            ));
            reporter.report_batch_progress(&progress);
            reporter.report_completion(&ProcessingTimings::default());
            reporter.report_error(ProcessingStage::ImageLoading, "unreadable");
        }
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(ConsoleProgressReporter::format_duration(5_400), "5s");
        assert_eq!(ConsoleProgressReporter::format_duration(125_000), "2m 5s");
    }
}
