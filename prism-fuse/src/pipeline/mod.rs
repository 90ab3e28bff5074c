//! End-to-end fusion runs

pub mod driver;
pub mod progress;

pub use driver::FusionPipeline;
pub use progress::{
    CancelToken, LogProgress, NoProgress, ProgressObserver, ProgressUpdate, RunStats,
};
