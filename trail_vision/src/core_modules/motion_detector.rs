// THEORY:
// The `motion_detector` module finds "fast objects": regions whose intensity changed
// sharply between two consecutive frames and whose position moved far enough since
// the previous frame to count as genuine motion rather than flicker.
//
// Key architectural principles:
// 1.  **Differencing, Not Modelling**: Each frame is compared only against its direct
//     predecessor. There is no learned background here; that is the job of the
//     compositor's secondary path.
// 2.  **One-Frame Memory**: The `CentroidTrack` remembers the centroids of the
//     previous frame's candidate contours and nothing more. It is replaced wholesale
//     after every frame, whether or not anything was accepted.
// 3.  **Explicit State**: The track is owned by the caller and threaded through each
//     call, so a job creates one fresh track and nothing leaks between runs.
// 4.  **Faithful Correspondence**: A candidate is compared against *every* previous
//     centroid and emitted once per centroid it outran. A single contour can
//     therefore appear several times in one frame's output; the overlap filter
//     collapses those copies downstream.

use crate::core_modules::detection_box::DetectionBox;
use crate::core_modules::raster;
use crate::pipeline::EngineConfig;
use image::RgbImage;
use imageproc::contrast::{ThresholdType, threshold};
use imageproc::geometry::contour_area;
use tracing::trace;

/// Contours must enclose strictly more than this many pixels to be candidates.
pub const MIN_CONTOUR_AREA: f64 = 5.0;

/// Centroids of the previous frame's candidate contours.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CentroidTrack {
    centroids: Vec<(f64, f64)>,
}

impl CentroidTrack {
    pub fn new() -> Self {
        Self::default()
    }

    /// A track seeded with known centroids, e.g. to resume from a known frame.
    pub fn from_centroids(centroids: Vec<(f64, f64)>) -> Self {
        Self { centroids }
    }

    pub fn centroids(&self) -> &[(f64, f64)] {
        &self.centroids
    }

    pub fn is_empty(&self) -> bool {
        self.centroids.is_empty()
    }
}

/// A contour that passed the area filter in the current frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub bounding_box: DetectionBox,
    pub centroid: (f64, f64),
    pub area: f64,
}

/// Stateless fast-object detector; the only running state is the `CentroidTrack`.
#[derive(Debug, Clone)]
pub struct MotionDetector {
    threshold: u8,
    min_speed: f64,
    max_size: f64,
}

impl MotionDetector {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            threshold: config.threshold,
            min_speed: config.min_speed as f64,
            max_size: config.max_size as f64,
        }
    }

    /// Candidate contours of the thresholded difference between two frames.
    pub fn candidates(&self, current: &RgbImage, previous: &RgbImage) -> Vec<Candidate> {
        let diff = raster::abs_diff(&raster::intensity(previous), &raster::intensity(current));
        let mask = threshold(&diff, self.threshold, ThresholdType::Binary);

        raster::external_contours(&mask)
            .into_iter()
            .filter_map(|contour| {
                let area = contour_area(&contour.points);
                if !(area > MIN_CONTOUR_AREA && area < self.max_size) {
                    return None;
                }
                let bounding_box = raster::bounding_box(&contour.points)?;
                Some(Candidate {
                    bounding_box,
                    centroid: bounding_box.center(),
                    area,
                })
            })
            .collect()
    }

    /// Detects fast objects in `current` and replaces `track` with this frame's
    /// candidate centroids.
    pub fn detect(
        &self,
        current: &RgbImage,
        previous: &RgbImage,
        track: &mut CentroidTrack,
    ) -> Vec<DetectionBox> {
        let candidates = self.candidates(current, previous);

        let mut accepted = Vec::new();
        for candidate in &candidates {
            for &(prev_x, prev_y) in track.centroids() {
                let speed = (candidate.centroid.0 - prev_x).hypot(candidate.centroid.1 - prev_y);
                if speed > self.min_speed {
                    trace!(speed, min_speed = self.min_speed, "Fast object accepted");
                    accepted.push(candidate.bounding_box);
                }
            }
        }

        track.centroids = candidates.iter().map(|c| c.centroid).collect();
        accepted
    }
}
