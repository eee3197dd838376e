// THEORY:
// The `pipeline` module is the top-level, synchronous API of the trail engine. It
// wires the core modules into the three passes a caller runs over one clip:
//
// 1.  **Detection pass**: MotionDetector over every consecutive frame pair, then the
//     OverlapFilter, producing `PerFrameDetections` and a boxed preview on frame 0.
// 2.  **Composite pass**: the compositor's primary path, stitching each stored
//     detection's silhouette onto frame 0.
// 3.  **Exclusion composite pass**: the compositor's secondary path, driven by the
//     operator's exclusion keyframes instead of stored detections.
//
// Between passes the caller may run corrections against the returned detections.
// Every pass takes its progress, preview and cancellation contracts as explicit
// arguments and builds its running state (centroid track, background model) fresh,
// so two passes never share anything but the read-only frames.

use crate::core_modules::compositor::{accumulate_action, detection_preview, stitch_detections};
use crate::core_modules::correction::CorrectionController;
use crate::core_modules::detection_box::PerFrameDetections;
use crate::core_modules::frame::FrameSequence;
use crate::core_modules::job_control::{
    CancellationSource, JobContext, JobOutcome, PreviewSink, ProgressSink,
};
use crate::core_modules::keyframes::{ExclusionKeyframe, interpolate};
use crate::core_modules::motion_detector::{CentroidTrack, MotionDetector};
use crate::core_modules::overlap_filter::filter_overlaps;
use crate::core_modules::region_extractor::RegionExtractor;
use crate::error::{EngineError, EngineResult};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

// Re-export key data structures for the public API.
pub use crate::core_modules::detection_box::DetectionBox;
pub use crate::core_modules::job_control::{CancellationToken, JobStatus};

/// Tunable parameters of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Intensity cutoff used both for frame differencing and for silhouette
    /// thresholding. A pixel passes when it is strictly greater.
    pub threshold: u8,
    /// Minimum centroid displacement between consecutive frames, in pixels.
    pub min_speed: u32,
    /// Contours must enclose strictly less than this area to be candidates.
    pub max_size: u32,
    /// Default reach of a correction around the operator's point, in pixels.
    pub correction_radius: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            threshold: 25,
            min_speed: 600,
            max_size: 1000,
            correction_radius: 0,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if self.max_size == 0 {
            return Err(EngineError::invalid_config("max_size must be positive"));
        }
        Ok(())
    }
}

/// The engine for one loaded clip.
#[derive(Debug, Clone)]
pub struct TrailPipeline {
    frames: Arc<FrameSequence>,
    config: EngineConfig,
}

impl TrailPipeline {
    pub fn new(frames: Arc<FrameSequence>, config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self { frames, config })
    }

    pub fn frames(&self) -> &FrameSequence {
        &self.frames
    }

    pub fn shared_frames(&self) -> Arc<FrameSequence> {
        Arc::clone(&self.frames)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: EngineConfig) -> EngineResult<()> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    /// Runs fast-object detection over every consecutive frame pair.
    ///
    /// Each processed frame gets an entry in the result. The boxed preview on
    /// frame 0 is shown once at the end, cancelled or not.
    pub fn detect(
        &self,
        progress: &mut dyn ProgressSink,
        preview: &mut dyn PreviewSink,
        cancel: &dyn CancellationSource,
    ) -> EngineResult<JobOutcome<PerFrameDetections>> {
        self.config.validate()?;
        let detector = MotionDetector::new(&self.config);
        let mut track = CentroidTrack::new();
        let mut detections = PerFrameDetections::new();
        let mut ctx = JobContext::new(progress, cancel);
        let total = self.frames.len();
        info!(frames = total, config = ?self.config, "Starting detection pass");

        let mut cancelled = false;
        for index in 1..total {
            if ctx.should_stop() {
                cancelled = true;
                break;
            }
            let (Some(previous), Some(current)) = (self.frames.get(index - 1), self.frames.get(index)) else {
                break;
            };

            let raw = detector.detect(current, previous, &mut track);
            let boxes = filter_overlaps(&raw);
            debug!(frame = index, raw = raw.len(), kept = boxes.len(), "Frame processed");
            detections.insert(index, boxes);
            ctx.frame_done(index + 1, total);
        }

        info!(
            frames = detections.len(),
            boxes = detections.total_boxes(),
            cancelled,
            "Detection pass finished"
        );
        preview.show(&detection_preview(&self.frames, &detections));

        Ok(if cancelled {
            JobOutcome::cancelled(detections)
        } else {
            JobOutcome::completed(detections)
        })
    }

    /// Stitches the silhouettes of `detections` onto frame 0.
    pub fn composite(
        &self,
        detections: &PerFrameDetections,
        progress: &mut dyn ProgressSink,
        preview: &mut dyn PreviewSink,
        cancel: &dyn CancellationSource,
    ) -> EngineResult<JobOutcome<RgbImage>> {
        self.config.validate()?;
        let extractor = RegionExtractor::new(self.config.threshold);
        let mut ctx = JobContext::new(progress, cancel);
        info!(boxes = detections.total_boxes(), "Starting composite pass");

        let outcome = stitch_detections(&self.frames, detections, &extractor, &mut ctx);
        info!(status = ?outcome.status, "Composite pass finished");
        preview.show(&outcome.output);
        Ok(outcome)
    }

    /// Builds the action image by background subtraction, suppressing foreground
    /// inside the interpolated exclusion circles. An empty keyframe list disables
    /// exclusion entirely.
    pub fn composite_with_exclusions(
        &self,
        keyframes: &[ExclusionKeyframe],
        progress: &mut dyn ProgressSink,
        preview: &mut dyn PreviewSink,
        cancel: &dyn CancellationSource,
    ) -> EngineResult<JobOutcome<RgbImage>> {
        self.config.validate()?;
        let circles = interpolate(keyframes, self.frames.len())?;
        let mut ctx = JobContext::new(progress, cancel);
        info!(keyframes = keyframes.len(), "Starting exclusion composite pass");

        let outcome = accumulate_action(&self.frames, &circles, self.config.threshold, &mut ctx);
        info!(status = ?outcome.status, "Exclusion composite pass finished");
        preview.show(&outcome.output);
        Ok(outcome)
    }

    /// Removes detections within the configured correction radius of a point.
    pub fn correct(
        &self,
        detections: &mut PerFrameDetections,
        x: u32,
        y: u32,
        preview: &mut dyn PreviewSink,
    ) -> usize {
        self.correct_with_radius(detections, x, y, self.config.correction_radius, preview)
    }

    pub fn correct_with_radius(
        &self,
        detections: &mut PerFrameDetections,
        x: u32,
        y: u32,
        radius: u32,
        preview: &mut dyn PreviewSink,
    ) -> usize {
        CorrectionController::new(&self.frames).remove_near(detections, x, y, radius, preview)
    }
}
