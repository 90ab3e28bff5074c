//! Progress reporting, cancellation and run statistics.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use tracing::info;

/// Receives `(message, fraction)` updates from a fusion run.
///
/// Called once at start, at every anchor boundary, and at completion with
/// a fraction of 1.0.
pub trait ProgressObserver {
    fn on_progress(&mut self, message: &str, fraction: f32);
}

impl<F: FnMut(&str, f32)> ProgressObserver for F {
    fn on_progress(&mut self, message: &str, fraction: f32) {
        self(message, fraction)
    }
}

/// A progress update sent over a channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub message: String,
    pub fraction: f32,
}

/// Forwards updates to a channel the caller polls. A dropped receiver is ignored.
impl ProgressObserver for Sender<ProgressUpdate> {
    fn on_progress(&mut self, message: &str, fraction: f32) {
        let _ = self.send(ProgressUpdate {
            message: message.to_string(),
            fraction,
        });
    }
}

/// Logs updates at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressObserver for LogProgress {
    fn on_progress(&mut self, message: &str, fraction: f32) {
        info!("[{:>3.0}%] {}", fraction * 100.0, message);
    }
}

/// Discards updates.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn on_progress(&mut self, _message: &str, _fraction: f32) {}
}

/// Shared cancellation flag, checked at batch boundaries.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Counters for one fusion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunStats {
    pub anchors_processed: usize,
    /// Mesh vertices read across all processed anchors.
    pub vertices_in: usize,
    /// Points fused, synthesized ones included, before outlier removal.
    pub points_generated: usize,
    pub points_written: usize,
    pub outliers_removed: usize,
    /// Points no frame could color.
    pub sentinel_points: usize,
    pub enhanced_points: usize,
    pub malformed_triangles: usize,
    pub cancelled: bool,
}

impl std::fmt::Display for RunStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} anchors, {} vertices -> {} points written ({} generated, {} outliers removed, {} uncolored)",
            self.anchors_processed,
            self.vertices_in,
            self.points_written,
            self.points_generated,
            self.outliers_removed,
            self.sentinel_points
        )?;
        if self.cancelled {
            write!(f, " [cancelled]")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_closure_observer() {
        let mut seen = Vec::new();
        {
            let mut observer = |msg: &str, fraction: f32| seen.push((msg.to_string(), fraction));
            let observer: &mut dyn ProgressObserver = &mut observer;
            observer.on_progress("start", 0.0);
            observer.on_progress("done", 1.0);
        }
        assert_eq!(seen, vec![("start".to_string(), 0.0), ("done".to_string(), 1.0)]);
    }

    #[test]
    fn test_channel_observer() {
        let (mut tx, rx) = mpsc::channel();
        tx.on_progress("half", 0.5);
        assert_eq!(
            rx.recv().unwrap(),
            ProgressUpdate {
                message: "half".into(),
                fraction: 0.5
            }
        );
        drop(rx);
        // Must not panic once the receiver is gone.
        tx.on_progress("late", 1.0);
    }

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
