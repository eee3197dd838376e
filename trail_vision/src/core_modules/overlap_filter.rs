//! Per-frame deduplication of spatially overlapping detections.

use crate::core_modules::detection_box::DetectionBox;

/// True when `candidate` intersects any box in `others`.
pub fn overlaps_any(candidate: &DetectionBox, others: &[DetectionBox]) -> bool {
    others.iter().any(|other| candidate.intersects(other))
}

/// Keeps each box that does not intersect a box kept before it. Order is
/// preserved, so the earliest of two overlapping boxes wins.
pub fn filter_overlaps(boxes: &[DetectionBox]) -> Vec<DetectionBox> {
    let mut kept: Vec<DetectionBox> = Vec::with_capacity(boxes.len());
    for candidate in boxes {
        if !overlaps_any(candidate, &kept) {
            kept.push(*candidate);
        }
    }
    kept
}
