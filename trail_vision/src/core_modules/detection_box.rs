// THEORY:
// A `DetectionBox` is the engine's unit of "something moved here". Like the blob
// containers it descends from, it is a "dumb" value type: an axis-aligned rectangle
// in the pixel space of one specific frame. Which frame it belongs to is recorded
// by the `PerFrameDetections` map that holds it, never by the box itself.
//
// `PerFrameDetections` is the hand-off format between every layer: the motion
// detector fills it, the overlap filter thins it, the correction controller
// prunes it, and the compositor consumes it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An axis-aligned rectangle in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DetectionBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl DetectionBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Exclusive right edge.
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// The box center, used as the object's centroid for speed correspondence.
    pub fn center(&self) -> (f64, f64) {
        (
            self.x as f64 + self.width as f64 / 2.0,
            self.y as f64 + self.height as f64 / 2.0,
        )
    }

    /// True when the box is non-degenerate and lies entirely inside a
    /// `frame_width` x `frame_height` frame.
    pub fn fits_within(&self, frame_width: u32, frame_height: u32) -> bool {
        self.width > 0
            && self.height > 0
            && self.right() <= frame_width
            && self.bottom() <= frame_height
    }

    /// Strict interior overlap; boxes that merely share an edge do not intersect.
    pub fn intersects(&self, other: &DetectionBox) -> bool {
        self.x < other.right()
            && self.right() > other.x
            && self.y < other.bottom()
            && self.bottom() > other.y
    }

    /// Shortest distance from a point to the closed rectangle
    /// `[x, x + width] x [y, y + height]`. Zero inside or on the boundary.
    pub fn distance_to(&self, px: f64, py: f64) -> f64 {
        let (left, top) = (self.x as f64, self.y as f64);
        let (right, bottom) = (self.right() as f64, self.bottom() as f64);
        let dx = (left - px).max(0.0).max(px - right);
        let dy = (top - py).max(0.0).max(py - bottom);
        dx.hypot(dy)
    }
}

/// Detection lists keyed by frame index, iterated in ascending frame order.
///
/// Every frame the detector processes gets an entry, even when nothing was
/// accepted, so the entry count tracks how far a pass got.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerFrameDetections {
    frames: BTreeMap<usize, Vec<DetectionBox>>,
}

impl PerFrameDetections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, frame_index: usize, boxes: Vec<DetectionBox>) {
        self.frames.insert(frame_index, boxes);
    }

    pub fn get(&self, frame_index: usize) -> Option<&[DetectionBox]> {
        self.frames.get(&frame_index).map(Vec::as_slice)
    }

    /// Number of frames with an entry (empty entries included).
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn total_boxes(&self) -> usize {
        self.frames.values().map(Vec::len).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &[DetectionBox])> {
        self.frames.iter().map(|(index, boxes)| (*index, boxes.as_slice()))
    }

    /// Every box in frame order, flattened.
    pub fn all_boxes(&self) -> impl Iterator<Item = &DetectionBox> {
        self.frames.values().flatten()
    }

    /// Drops every box for which `remove` returns true and reports how many went.
    pub fn remove_where<F>(&mut self, mut remove: F) -> usize
    where
        F: FnMut(&DetectionBox) -> bool,
    {
        let mut removed = 0;
        for boxes in self.frames.values_mut() {
            let before = boxes.len();
            boxes.retain(|b| !remove(b));
            removed += before - boxes.len();
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touching_boxes_do_not_intersect() {
        let a = DetectionBox::new(0, 0, 10, 10);
        let b = DetectionBox::new(10, 0, 10, 10);
        assert!(!a.intersects(&b));
        assert!(a.intersects(&DetectionBox::new(9, 9, 2, 2)));
    }

    #[test]
    fn distance_is_zero_on_the_boundary() {
        let b = DetectionBox::new(10, 10, 5, 5);
        assert_eq!(b.distance_to(15.0, 12.0), 0.0);
        assert_eq!(b.distance_to(12.0, 12.0), 0.0);
        assert_eq!(b.distance_to(18.0, 19.0), 5.0);
    }

    #[test]
    fn fits_within_checks_every_edge() {
        assert!(DetectionBox::new(16, 16, 4, 4).fits_within(20, 20));
        assert!(!DetectionBox::new(17, 16, 4, 4).fits_within(20, 20));
        assert!(!DetectionBox::new(0, 0, 0, 4).fits_within(20, 20));
    }

    #[test]
    fn remove_where_keeps_empty_entries() {
        let mut detections = PerFrameDetections::new();
        detections.insert(1, vec![DetectionBox::new(0, 0, 2, 2)]);
        detections.insert(2, vec![DetectionBox::new(5, 5, 2, 2), DetectionBox::new(0, 0, 1, 1)]);

        let removed = detections.remove_where(|b| b.x == 0);

        assert_eq!(removed, 2);
        assert_eq!(detections.len(), 2);
        assert_eq!(detections.get(1), Some(&[][..]));
        assert_eq!(detections.total_boxes(), 1);
    }

    #[test]
    fn detections_survive_a_json_round_trip() {
        let mut detections = PerFrameDetections::new();
        detections.insert(1, Vec::new());
        detections.insert(3, vec![DetectionBox::new(4, 5, 6, 7)]);

        let json = serde_json::to_string(&detections).unwrap();
        let restored: PerFrameDetections = serde_json::from_str(&json).unwrap();

        assert_eq!(restored, detections);
        assert_eq!(restored.get(1), Some(&[][..]));
        assert_eq!(
            serde_json::to_value(DetectionBox::new(4, 5, 6, 7)).unwrap(),
            serde_json::json!({"x": 4, "y": 5, "width": 6, "height": 7})
        );
    }
}
