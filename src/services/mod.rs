//! Collaborators around the pipeline: file I/O, settings persistence and progress reporting

pub mod io;
pub mod progress;
pub mod settings;

pub use io::{ImageIOService, SUPPORTED_EXTENSIONS};
pub use progress::{
    BatchProgress, ConsoleProgressReporter, NoOpProgressReporter, ProcessingStage,
    ProgressReporter, ProgressTracker, ProgressUpdate,
};
pub use settings::{JsonSettingsStore, SettingsStore};
