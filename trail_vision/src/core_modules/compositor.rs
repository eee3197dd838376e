// THEORY:
// The `compositor` is where per-frame evidence becomes the single still image the
// engine exists to produce. It has two independent ways of doing that.
//
// 1.  **Primary Path (stitching)**: Starts from a copy of frame 0 and, frame by
//     frame in ascending order, pastes the silhouette of every stored detection
//     into the composite. Later frames overwrite earlier ones where they overlap,
//     so the last appearance of an object wins. A detection whose silhouette
//     cannot be extracted is logged and skipped; it never aborts the composite.
// 2.  **Secondary Path (background subtraction)**: Ignores stored detections and
//     instead learns an adaptive background. Every frame's foreground (minus the
//     operator's exclusion circle for that frame) is OR-ed into an "action" image,
//     and each clearly defined foreground contour is additionally copied in with
//     its exact original pixels.
//
// Both paths poll for cancellation once per frame and return the partially built
// image when stopped. The detection preview drawn after a detection pass (and after
// every effective correction) also lives here.

use crate::core_modules::background_model::BackgroundModel;
use crate::core_modules::detection_box::PerFrameDetections;
use crate::core_modules::frame::FrameSequence;
use crate::core_modules::job_control::{JobContext, JobOutcome};
use crate::core_modules::keyframes::ExclusionCircle;
use crate::core_modules::raster::{self, MASK_ON};
use crate::core_modules::region_extractor::RegionExtractor;
use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::distance_transform::Norm;
use imageproc::geometry::contour_area;
use imageproc::morphology::{close, open};
use tracing::{debug, warn};

/// Color of detection outlines in previews.
pub const PREVIEW_BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
/// Outline width of detection boxes in previews, in pixels.
pub const PREVIEW_BOX_THICKNESS: u32 = 2;
/// Foreground contours must enclose more than this area to be copied verbatim.
pub const SECONDARY_MIN_CONTOUR_AREA: f64 = 50.0;
/// Radius of the square structuring element used to denoise foreground masks.
const MORPHOLOGY_RADIUS: u8 = 1;

/// Draws every stored detection as an outline on a copy of frame 0.
pub fn detection_preview(frames: &FrameSequence, detections: &PerFrameDetections) -> RgbImage {
    let mut preview = frames.first().clone();
    for region in detections.all_boxes() {
        raster::draw_box_outline(&mut preview, region, PREVIEW_BOX_COLOR, PREVIEW_BOX_THICKNESS);
    }
    preview
}

/// Primary path: stitches the silhouette of every detection onto frame 0.
pub fn stitch_detections(
    frames: &FrameSequence,
    detections: &PerFrameDetections,
    extractor: &RegionExtractor,
    ctx: &mut JobContext<'_>,
) -> JobOutcome<RgbImage> {
    let mut composite = frames.first().clone();
    let total = frames.len();

    for (frame_index, boxes) in detections.iter() {
        if ctx.should_stop() {
            debug!(frame_index, "Composite cancelled");
            return JobOutcome::cancelled(composite);
        }
        let Some(frame) = frames.get(frame_index) else {
            warn!(frame_index, "Detections reference a frame outside the sequence");
            continue;
        };

        for region in boxes {
            match extractor.extract(frame, region) {
                Ok(Some(silhouette)) => {
                    image::imageops::replace(
                        &mut composite,
                        &silhouette.pixels,
                        region.x as i64,
                        region.y as i64,
                    );
                }
                Ok(None) => {
                    debug!(frame_index, ?region, "No silhouette in box");
                }
                Err(e) => {
                    warn!(frame_index, ?region, error = %e, "Skipping object");
                }
            }
        }
        ctx.frame_done(frame_index + 1, total);
    }

    JobOutcome::completed(composite)
}

/// Secondary path: background subtraction with per-frame exclusion circles.
///
/// `circles` is either empty (no exclusion) or holds one circle per frame.
pub fn accumulate_action(
    frames: &FrameSequence,
    circles: &[ExclusionCircle],
    threshold: u8,
    ctx: &mut JobContext<'_>,
) -> JobOutcome<RgbImage> {
    let mut action = frames.first().clone();
    let mut model = BackgroundModel::new(frames.first(), threshold);
    let total = frames.len();

    for (frame_index, frame) in frames.iter().enumerate() {
        if ctx.should_stop() {
            debug!(frame_index, "Action accumulation cancelled");
            return JobOutcome::cancelled(action);
        }

        let mut mask = denoise(&model.apply(frame));
        if let Some(circle) = circles.get(frame_index) {
            clear_circle(&mut mask, circle);
        }

        or_masked(&mut action, frame, &mask);

        for contour in raster::external_contours(&mask) {
            if contour_area(&contour.points) > SECONDARY_MIN_CONTOUR_AREA {
                let region = raster::filled_mask(mask.width(), mask.height(), &contour.points);
                copy_masked(&mut action, frame, &region);
            }
        }

        ctx.frame_done(frame_index + 1, total);
    }

    JobOutcome::completed(action)
}

/// Opening removes speckle, closing then fills small gaps.
fn denoise(mask: &GrayImage) -> GrayImage {
    let opened = open(mask, Norm::LInf, MORPHOLOGY_RADIUS);
    close(&opened, Norm::LInf, MORPHOLOGY_RADIUS)
}

fn clear_circle(mask: &mut GrayImage, circle: &ExclusionCircle) {
    for (x, y, pixel) in mask.enumerate_pixels_mut() {
        if circle.contains(x, y) {
            *pixel = Luma([0]);
        }
    }
}

fn or_masked(action: &mut RgbImage, frame: &RgbImage, mask: &GrayImage) {
    for (x, y, pixel) in action.enumerate_pixels_mut() {
        if mask.get_pixel(x, y)[0] == MASK_ON {
            let source = frame.get_pixel(x, y);
            for c in 0..3 {
                pixel[c] |= source[c];
            }
        }
    }
}

fn copy_masked(action: &mut RgbImage, frame: &RgbImage, mask: &GrayImage) {
    for (x, y, pixel) in action.enumerate_pixels_mut() {
        if mask.get_pixel(x, y)[0] == MASK_ON {
            *pixel = *frame.get_pixel(x, y);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::detection_box::DetectionBox;
    use crate::core_modules::job_control::NeverCancel;
    use std::cell::Cell;

    fn frame_with_rect(size: u32, x0: u32, y0: u32, side: u32, color: Rgb<u8>) -> RgbImage {
        RgbImage::from_fn(size, size, |x, y| {
            if x >= x0 && x < x0 + side && y >= y0 && y < y0 + side {
                color
            } else {
                Rgb([0, 0, 0])
            }
        })
    }

    fn run_stitch(frames: &FrameSequence, detections: &PerFrameDetections) -> JobOutcome<RgbImage> {
        let mut sink = |_: u8| {};
        let mut ctx = JobContext::new(&mut sink, &NeverCancel);
        stitch_detections(frames, detections, &RegionExtractor::new(25), &mut ctx)
    }

    #[test]
    fn silhouettes_are_pasted_onto_frame_zero() {
        let frames = FrameSequence::new(vec![
            RgbImage::new(20, 20),
            frame_with_rect(20, 4, 4, 4, Rgb([250, 0, 0])),
            frame_with_rect(20, 12, 12, 4, Rgb([0, 250, 0])),
        ])
        .unwrap();
        let mut detections = PerFrameDetections::new();
        detections.insert(1, vec![DetectionBox::new(4, 4, 4, 4)]);
        detections.insert(2, vec![DetectionBox::new(12, 12, 4, 4)]);

        let outcome = run_stitch(&frames, &detections);

        assert!(!outcome.is_cancelled());
        assert_eq!(outcome.output.get_pixel(5, 5), &Rgb([250, 0, 0]));
        assert_eq!(outcome.output.get_pixel(13, 13), &Rgb([0, 250, 0]));
        assert_eq!(outcome.output.get_pixel(0, 0), &Rgb([0, 0, 0]));
    }

    #[test]
    fn objects_in_the_frame_corner_are_pasted() {
        let frames = FrameSequence::new(vec![
            RgbImage::from_pixel(20, 20, Rgb([7, 7, 7])),
            frame_with_rect(20, 0, 0, 5, Rgb([250, 250, 250])),
        ])
        .unwrap();
        let mut detections = PerFrameDetections::new();
        detections.insert(1, vec![DetectionBox::new(0, 0, 5, 5)]);

        let outcome = run_stitch(&frames, &detections);

        assert_eq!(outcome.output.get_pixel(0, 0), &Rgb([250, 250, 250]));
        assert_eq!(outcome.output.get_pixel(4, 4), &Rgb([250, 250, 250]));
        assert_eq!(outcome.output.get_pixel(5, 5), &Rgb([7, 7, 7]));
    }

    #[test]
    fn later_frames_win_where_boxes_overlap() {
        let frames = FrameSequence::new(vec![
            RgbImage::new(20, 20),
            frame_with_rect(20, 4, 4, 6, Rgb([250, 0, 0])),
            frame_with_rect(20, 4, 4, 6, Rgb([0, 250, 0])),
        ])
        .unwrap();
        let mut detections = PerFrameDetections::new();
        detections.insert(1, vec![DetectionBox::new(4, 4, 6, 6)]);
        detections.insert(2, vec![DetectionBox::new(4, 4, 6, 6)]);

        let outcome = run_stitch(&frames, &detections);
        assert_eq!(outcome.output.get_pixel(6, 6), &Rgb([0, 250, 0]));
    }

    #[test]
    fn bad_boxes_are_skipped_not_fatal() {
        let frames = FrameSequence::new(vec![
            RgbImage::from_pixel(20, 20, Rgb([7, 7, 7])),
            frame_with_rect(20, 4, 4, 4, Rgb([250, 250, 250])),
        ])
        .unwrap();
        let mut detections = PerFrameDetections::new();
        detections.insert(
            1,
            vec![
                DetectionBox::new(18, 18, 5, 5),
                DetectionBox::new(14, 14, 3, 3),
                DetectionBox::new(4, 4, 4, 4),
            ],
        );

        let outcome = run_stitch(&frames, &detections);
        assert_eq!(outcome.output.get_pixel(5, 5), &Rgb([250, 250, 250]));
        assert_eq!(outcome.output.get_pixel(19, 19), &Rgb([7, 7, 7]));
    }

    #[test]
    fn preview_outlines_every_box() {
        let frames = FrameSequence::new(vec![RgbImage::new(20, 20)]).unwrap();
        let mut detections = PerFrameDetections::new();
        detections.insert(1, vec![DetectionBox::new(2, 2, 5, 5)]);
        detections.insert(2, vec![DetectionBox::new(10, 10, 5, 5)]);

        let preview = detection_preview(&frames, &detections);
        assert_eq!(preview.get_pixel(2, 2), &PREVIEW_BOX_COLOR);
        assert_eq!(preview.get_pixel(14, 14), &PREVIEW_BOX_COLOR);
        assert_eq!(preview.get_pixel(0, 0), &Rgb([0, 0, 0]));
    }

    #[test]
    fn action_image_collects_moving_objects() {
        let frames = FrameSequence::new(vec![
            RgbImage::new(40, 40),
            frame_with_rect(40, 2, 2, 10, Rgb([200, 0, 0])),
            frame_with_rect(40, 25, 25, 10, Rgb([0, 200, 0])),
        ])
        .unwrap();
        let mut sink = |_: u8| {};
        let mut ctx = JobContext::new(&mut sink, &NeverCancel);

        let outcome = accumulate_action(&frames, &[], 25, &mut ctx);

        assert_eq!(outcome.output.get_pixel(6, 6), &Rgb([200, 0, 0]));
        assert_eq!(outcome.output.get_pixel(30, 30), &Rgb([0, 200, 0]));
        assert_eq!(outcome.output.get_pixel(20, 5), &Rgb([0, 0, 0]));
    }

    #[test]
    fn exclusion_circle_suppresses_foreground() {
        let frames = FrameSequence::new(vec![
            RgbImage::new(40, 40),
            frame_with_rect(40, 2, 2, 10, Rgb([200, 0, 0])),
            frame_with_rect(40, 25, 25, 10, Rgb([0, 200, 0])),
        ])
        .unwrap();
        let circle = ExclusionCircle { center: (30, 30), radius: 12 };
        let circles = vec![circle; 3];
        let mut sink = |_: u8| {};
        let mut ctx = JobContext::new(&mut sink, &NeverCancel);

        let outcome = accumulate_action(&frames, &circles, 25, &mut ctx);

        assert_eq!(outcome.output.get_pixel(6, 6), &Rgb([200, 0, 0]));
        assert_eq!(outcome.output.get_pixel(30, 30), &Rgb([0, 0, 0]));
    }

    #[test]
    fn cancelled_accumulation_returns_partial_image() {
        let frames = FrameSequence::new(vec![
            RgbImage::new(40, 40),
            frame_with_rect(40, 2, 2, 10, Rgb([200, 0, 0])),
            frame_with_rect(40, 25, 25, 10, Rgb([0, 200, 0])),
        ])
        .unwrap();
        let polls = Cell::new(0);
        let stop_after_two = || {
            polls.set(polls.get() + 1);
            polls.get() > 2
        };
        let mut sink = |_: u8| {};
        let mut ctx = JobContext::new(&mut sink, &stop_after_two);

        let outcome = accumulate_action(&frames, &[], 25, &mut ctx);

        assert!(outcome.is_cancelled());
        assert_eq!(outcome.output.get_pixel(6, 6), &Rgb([200, 0, 0]));
        assert_eq!(outcome.output.get_pixel(30, 30), &Rgb([0, 0, 0]));
    }
}
