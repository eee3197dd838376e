// THEORY:
// The `job_runner` moves a pipeline pass off the caller's thread. The caller gets a
// `JobHandle` immediately and stays free to watch progress, collect previews or
// cancel, while a single background worker grinds through the frames.
//
// Key architectural principles:
// 1.  **One Job At A Time**: Passes depend on each other's output, so the runner
//     admits a single job. A request while one is active is rejected, not queued.
// 2.  **Sequential Inside**: A job runs its frames strictly in order on one blocking
//     worker; each frame depends on the running state left by the previous one.
// 3.  **Ownership Hand-Off**: The worker owns the detections or composite it builds
//     and hands them back through the handle on completion or cancellation.
// 4.  **Async Notification**: Progress is published on a `watch` channel and previews
//     on an unbounded `mpsc` channel, so the caller never blocks on a frame.

use crate::core_modules::detection_box::PerFrameDetections;
use crate::core_modules::job_control::{
    CancellationSource, CancellationToken, JobOutcome, PreviewSink, ProgressSink,
};
use crate::core_modules::keyframes::{ExclusionKeyframe, validate_keyframes};
use crate::error::{EngineError, EngineResult};
use crate::pipeline::{EngineConfig, TrailPipeline};
use image::RgbImage;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Clears the runner's busy flag when the worker finishes, however it finishes.
struct BusyGuard {
    busy: Arc<AtomicBool>,
}

impl BusyGuard {
    fn acquire(busy: &Arc<AtomicBool>) -> Option<Self> {
        busy.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                busy: Arc::clone(busy),
            })
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// The caller's side of a running job.
pub struct JobHandle<T> {
    cancel: CancellationToken,
    progress: watch::Receiver<u8>,
    previews: mpsc::UnboundedReceiver<RgbImage>,
    task: JoinHandle<EngineResult<JobOutcome<T>>>,
}

impl<T> JobHandle<T> {
    /// Asks the worker to stop after the frame it is on.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// A receiver that observes every progress update.
    pub fn progress(&self) -> watch::Receiver<u8> {
        self.progress.clone()
    }

    pub fn latest_progress(&self) -> u8 {
        *self.progress.borrow()
    }

    /// The next preview image, or `None` once the worker is done and every
    /// preview has been taken.
    pub async fn next_preview(&mut self) -> Option<RgbImage> {
        self.previews.recv().await
    }

    /// Waits for the worker and returns its output. Cancelled jobs return their
    /// partial output with `JobStatus::Cancelled`.
    pub async fn join(self) -> EngineResult<JobOutcome<T>> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(EngineError::WorkerFailed(e.to_string())),
        }
    }
}

/// Runs pipeline passes on a background worker, one at a time.
pub struct JobRunner {
    pipeline: TrailPipeline,
    busy: Arc<AtomicBool>,
}

impl JobRunner {
    pub fn new(pipeline: TrailPipeline) -> Self {
        Self {
            pipeline,
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn pipeline(&self) -> &TrailPipeline {
        &self.pipeline
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// New settings apply to the next job; rejected while a job is running.
    pub fn set_config(&mut self, config: EngineConfig) -> EngineResult<()> {
        if self.is_busy() {
            return Err(EngineError::JobAlreadyRunning);
        }
        self.pipeline.set_config(config)
    }

    pub fn spawn_detection(&self) -> EngineResult<JobHandle<PerFrameDetections>> {
        self.spawn(|pipeline, progress, preview, cancel| pipeline.detect(progress, preview, cancel))
    }

    pub fn spawn_composite(&self, detections: PerFrameDetections) -> EngineResult<JobHandle<RgbImage>> {
        self.spawn(move |pipeline, progress, preview, cancel| {
            pipeline.composite(&detections, progress, preview, cancel)
        })
    }

    pub fn spawn_exclusion_composite(&self, keyframes: Vec<ExclusionKeyframe>) -> EngineResult<JobHandle<RgbImage>> {
        validate_keyframes(&keyframes)?;
        self.spawn(move |pipeline, progress, preview, cancel| {
            pipeline.composite_with_exclusions(&keyframes, progress, preview, cancel)
        })
    }

    /// Corrections run on the caller's thread and are refused while a job may be
    /// touching the same detections.
    pub fn correct(
        &self,
        detections: &mut PerFrameDetections,
        x: u32,
        y: u32,
        preview: &mut dyn PreviewSink,
    ) -> EngineResult<usize> {
        if self.is_busy() {
            return Err(EngineError::JobAlreadyRunning);
        }
        Ok(self.pipeline.correct(detections, x, y, preview))
    }

    fn spawn<T, F>(&self, job: F) -> EngineResult<JobHandle<T>>
    where
        T: Send + 'static,
        F: FnOnce(
                &TrailPipeline,
                &mut dyn ProgressSink,
                &mut dyn PreviewSink,
                &dyn CancellationSource,
            ) -> EngineResult<JobOutcome<T>>
            + Send
            + 'static,
    {
        self.pipeline.config().validate()?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| EngineError::WorkerFailed(format!("no async runtime: {e}")))?;
        let guard = BusyGuard::acquire(&self.busy).ok_or_else(|| {
            warn!("Rejected job: another job is running");
            EngineError::JobAlreadyRunning
        })?;

        let cancel = CancellationToken::new();
        let (progress_tx, progress_rx) = watch::channel(0u8);
        let (preview_tx, preview_rx) = mpsc::unbounded_channel();
        let pipeline = self.pipeline.clone();
        let worker_cancel = cancel.clone();

        let task = runtime.spawn_blocking(move || {
            let _guard = guard;
            let mut progress = move |percent: u8| {
                let _ = progress_tx.send(percent);
            };
            let mut preview = move |image: &RgbImage| {
                let _ = preview_tx.send(image.clone());
            };
            debug!("Worker started");
            let result = job(&pipeline, &mut progress, &mut preview, &worker_cancel);
            debug!(ok = result.is_ok(), "Worker finished");
            result
        });

        Ok(JobHandle {
            cancel,
            progress: progress_rx,
            previews: preview_rx,
            task,
        })
    }
}
