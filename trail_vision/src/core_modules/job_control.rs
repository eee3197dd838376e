// THEORY:
// The `job_control` module defines the engine's side of every long-running pass:
// how it reports progress, how it hands out preview images, and how it learns that
// the caller wants it to stop. All three are plain traits passed into each job, so
// there is no global wiring and a test can drive a job with closures.
//
// Cancellation is cooperative. A job polls once at the top of each per-frame
// iteration and, when asked to stop, returns whatever it has accumulated so far
// with `JobStatus::Cancelled`. Stopping early is a successful outcome, not an
// error.

use image::RgbImage;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Receives an integer percentage after each processed frame.
pub trait ProgressSink {
    fn report(&mut self, percent: u8);
}

impl<F: FnMut(u8)> ProgressSink for F {
    fn report(&mut self, percent: u8) {
        self(percent)
    }
}

/// Receives images for display outside the engine.
pub trait PreviewSink {
    fn show(&mut self, image: &RgbImage);
}

impl<F: FnMut(&RgbImage)> PreviewSink for F {
    fn show(&mut self, image: &RgbImage) {
        self(image)
    }
}

/// A polled predicate that turns true once cancellation is requested.
pub trait CancellationSource {
    fn is_cancelled(&self) -> bool;
}

impl<F: Fn() -> bool> CancellationSource for F {
    fn is_cancelled(&self) -> bool {
        self()
    }
}

/// Shared cancellation flag, cloned between the caller and the worker.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }
}

impl CancellationSource for CancellationToken {
    fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// A cancellation source that never fires.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverCancel;

impl CancellationSource for NeverCancel {
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// How a job ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Completed,
    Cancelled,
}

/// The result of a job together with how it ended. Cancelled jobs still carry
/// their partial output.
#[derive(Debug, Clone)]
pub struct JobOutcome<T> {
    pub output: T,
    pub status: JobStatus,
}

impl<T> JobOutcome<T> {
    pub fn completed(output: T) -> Self {
        Self {
            output,
            status: JobStatus::Completed,
        }
    }

    pub fn cancelled(output: T) -> Self {
        Self {
            output,
            status: JobStatus::Cancelled,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == JobStatus::Cancelled
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> JobOutcome<U> {
        JobOutcome {
            output: f(self.output),
            status: self.status,
        }
    }
}

/// Per-job wiring of progress and cancellation, threaded through the frame loop.
pub struct JobContext<'a> {
    progress: &'a mut dyn ProgressSink,
    cancel: &'a dyn CancellationSource,
    last_percent: u8,
}

impl<'a> JobContext<'a> {
    pub fn new(progress: &'a mut dyn ProgressSink, cancel: &'a dyn CancellationSource) -> Self {
        Self {
            progress,
            cancel,
            last_percent: 0,
        }
    }

    /// Polled once per frame, before the frame's work starts.
    pub fn should_stop(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Reports `processed * 100 / total`, never going backwards.
    pub fn frame_done(&mut self, processed: usize, total: usize) {
        let percent = if total == 0 {
            100
        } else {
            (processed.min(total) * 100 / total) as u8
        };
        self.last_percent = self.last_percent.max(percent);
        self.progress.report(self.last_percent);
    }
}
