//! Service layer: file I/O and progress reporting kept apart from the
//! processing logic

pub mod io;
pub mod progress;

pub use io::ImageIOService;
pub use progress::{
    NoOpProgressReporter, ProcessingStage, ProgressReporter, ProgressTracker, ProgressUpdate,
};
