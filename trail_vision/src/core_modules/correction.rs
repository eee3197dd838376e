//! Manual correction of detections: the operator points at a wrongly detected
//! object and every stored box within `radius` of that point is dropped.

use crate::core_modules::compositor::detection_preview;
use crate::core_modules::detection_box::PerFrameDetections;
use crate::core_modules::frame::FrameSequence;
use crate::core_modules::job_control::PreviewSink;
use tracing::info;

/// Removes detections near a point and redraws the preview when anything changed.
///
/// Runs on the caller's thread against detections already returned by a job; it
/// must not be used while a job is working on the same data.
pub struct CorrectionController<'a> {
    frames: &'a FrameSequence,
}

impl<'a> CorrectionController<'a> {
    pub fn new(frames: &'a FrameSequence) -> Self {
        Self { frames }
    }

    /// Drops every box whose rectangle lies within `radius` of `(x, y)` (a radius
    /// of zero means the point must be inside or on the box). Returns the number
    /// of boxes removed; the preview is rebuilt and shown only if that is non-zero.
    pub fn remove_near(
        &self,
        detections: &mut PerFrameDetections,
        x: u32,
        y: u32,
        radius: u32,
        preview: &mut dyn PreviewSink,
    ) -> usize {
        let (px, py, limit) = (x as f64, y as f64, radius as f64);
        let removed = detections.remove_where(|b| b.distance_to(px, py) <= limit);

        if removed > 0 {
            info!(x, y, radius, removed, remaining = detections.total_boxes(), "Removed detections");
            preview.show(&detection_preview(self.frames, detections));
        }
        removed
    }
}

/// A preview surface that shows the frame aspect-fit and centered.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Maps a point on the viewport back to frame pixel coordinates, clamped to
    /// the frame. Points in the letterbox snap to the nearest edge.
    pub fn to_frame_coordinates(&self, x: f64, y: f64, frame_width: u32, frame_height: u32) -> (u32, u32) {
        if self.width == 0 || self.height == 0 || frame_width == 0 || frame_height == 0 {
            return (0, 0);
        }
        let (fw, fh) = (frame_width as f64, frame_height as f64);
        let scale = (self.width as f64 / fw).min(self.height as f64 / fh);
        let offset_x = (self.width as f64 - fw * scale) / 2.0;
        let offset_y = (self.height as f64 - fh * scale) / 2.0;

        let fx = ((x - offset_x) / scale).floor();
        let fy = ((y - offset_y) / scale).floor();
        (
            fx.clamp(0.0, fw - 1.0) as u32,
            fy.clamp(0.0, fh - 1.0) as u32,
        )
    }
}
