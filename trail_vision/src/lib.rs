// THEORY:
// This file is the main entry point for the `trail_vision` library crate.
//
// The public surface is deliberately small. `TrailPipeline` runs the detection,
// composite and exclusion composite passes synchronously over a loaded
// `FrameSequence`; `JobRunner` runs the same passes on a background worker and
// hands back a `JobHandle` for progress, previews and cancellation. The
// `core_modules` stay public so callers can reuse individual pieces (the overlap
// filter, keyframe interpolation, the viewport mapping) on their own.

pub mod core_modules;
pub mod error;
pub mod job_runner;
pub mod pipeline;

pub use core_modules::correction::Viewport;
pub use core_modules::detection_box::PerFrameDetections;
pub use core_modules::frame::{FrameSequence, FrameSource, ImageDirectorySource, suggested_output_name};
pub use core_modules::keyframes::{ExclusionKeyframe, keyframe_indices};
pub use error::{EngineError, EngineResult};
pub use job_runner::{JobHandle, JobRunner};
pub use pipeline::{CancellationToken, DetectionBox, EngineConfig, JobStatus, TrailPipeline};
