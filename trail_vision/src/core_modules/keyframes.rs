// THEORY:
// Exclusion zones let an operator say "ignore this subject" without marking every
// frame. They circle the subject on a handful of keyframes and the interpolator
// fills in the rest: before the first mark the first circle holds, after the last
// mark the last circle holds, and in between center and radius move linearly.

use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};

/// A circle the operator drew on one keyframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExclusionKeyframe {
    pub frame_index: usize,
    pub center: (i32, i32),
    pub radius: u32,
}

impl ExclusionKeyframe {
    pub fn new(frame_index: usize, center: (i32, i32), radius: u32) -> Self {
        Self {
            frame_index,
            center,
            radius,
        }
    }

    /// Returns the keyframe only if the operator actually drew a circle.
    pub fn confirmed(frame_index: usize, center: Option<(i32, i32)>, radius: u32) -> Option<Self> {
        match center {
            Some(center) if radius > 0 => Some(Self::new(frame_index, center, radius)),
            _ => None,
        }
    }
}

/// The exclusion circle in effect on one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExclusionCircle {
    pub center: (i32, i32),
    pub radius: u32,
}

impl ExclusionCircle {
    pub fn contains(&self, x: u32, y: u32) -> bool {
        let dx = x as i64 - self.center.0 as i64;
        let dy = y as i64 - self.center.1 as i64;
        let r = self.radius as i64;
        dx * dx + dy * dy <= r * r
    }
}

/// `count` frame indices spread evenly over `0..frame_count`, first and last
/// included, truncated to integers.
pub fn keyframe_indices(frame_count: usize, count: usize) -> Vec<usize> {
    if frame_count == 0 || count == 0 {
        return Vec::new();
    }
    if count == 1 {
        return vec![0];
    }
    let last = (frame_count - 1) as f64;
    (0..count)
        .map(|i| (last * i as f64 / (count - 1) as f64) as usize)
        .collect()
}

/// Rejects keyframes whose indices are not strictly increasing or whose radius is
/// zero.
pub fn validate_keyframes(keyframes: &[ExclusionKeyframe]) -> EngineResult<()> {
    if let Some(k) = keyframes.iter().find(|k| k.radius == 0) {
        return Err(EngineError::invalid_config(format!(
            "exclusion keyframe at frame {} has zero radius",
            k.frame_index
        )));
    }
    if let Some(pair) = keyframes.windows(2).find(|w| w[1].frame_index <= w[0].frame_index) {
        return Err(EngineError::invalid_config(format!(
            "exclusion keyframe indices must be strictly increasing ({} then {})",
            pair[0].frame_index, pair[1].frame_index
        )));
    }
    Ok(())
}

/// One circle per frame in `0..frame_count`, or an empty vector when there are no
/// keyframes.
pub fn interpolate(keyframes: &[ExclusionKeyframe], frame_count: usize) -> EngineResult<Vec<ExclusionCircle>> {
    validate_keyframes(keyframes)?;
    let (Some(first), Some(last)) = (keyframes.first(), keyframes.last()) else {
        return Ok(Vec::new());
    };

    let circles = (0..frame_count)
        .map(|i| {
            if i <= first.frame_index {
                return circle_of(first);
            }
            if i >= last.frame_index {
                return circle_of(last);
            }
            let j = keyframes.partition_point(|k| k.frame_index <= i);
            let (a, b) = (&keyframes[j - 1], &keyframes[j]);
            let t = (i - a.frame_index) as f64 / (b.frame_index - a.frame_index) as f64;
            ExclusionCircle {
                center: (
                    lerp(a.center.0 as f64, b.center.0 as f64, t).round() as i32,
                    lerp(a.center.1 as f64, b.center.1 as f64, t).round() as i32,
                ),
                radius: lerp(a.radius as f64, b.radius as f64, t).round() as u32,
            }
        })
        .collect();
    Ok(circles)
}

fn circle_of(keyframe: &ExclusionKeyframe) -> ExclusionCircle {
    ExclusionCircle {
        center: keyframe.center,
        radius: keyframe.radius,
    }
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_endpoints_hold_for_every_frame() {
        let keyframes = [
            ExclusionKeyframe::new(0, (40, 30), 12),
            ExclusionKeyframe::new(9, (40, 30), 12),
        ];
        let circles = interpolate(&keyframes, 10).unwrap();
        assert_eq!(circles.len(), 10);
        assert!(circles.iter().all(|c| *c == ExclusionCircle { center: (40, 30), radius: 12 }));
    }

    #[test]
    fn midpoints_are_linear_and_rounded() {
        let keyframes = [
            ExclusionKeyframe::new(2, (0, 0), 10),
            ExclusionKeyframe::new(6, (10, -10), 20),
        ];
        let circles = interpolate(&keyframes, 9).unwrap();

        assert_eq!(circles[0], circles[2]);
        assert_eq!(circles[3], ExclusionCircle { center: (3, -3), radius: 13 });
        assert_eq!(circles[4], ExclusionCircle { center: (5, -5), radius: 15 });
        assert_eq!(circles[8], ExclusionCircle { center: (10, -10), radius: 20 });
    }

    #[test]
    fn three_keyframes_use_the_bracketing_pair() {
        let keyframes = [
            ExclusionKeyframe::new(0, (0, 0), 4),
            ExclusionKeyframe::new(4, (8, 0), 4),
            ExclusionKeyframe::new(8, (8, 8), 8),
        ];
        let circles = interpolate(&keyframes, 9).unwrap();
        assert_eq!(circles[2].center, (4, 0));
        assert_eq!(circles[4].center, (8, 0));
        assert_eq!(circles[6], ExclusionCircle { center: (8, 4), radius: 6 });
    }

    #[test]
    fn no_keyframes_disables_exclusion() {
        assert!(interpolate(&[], 5).unwrap().is_empty());
    }

    #[test]
    fn invalid_keyframes_are_rejected() {
        let zero = [ExclusionKeyframe::new(0, (1, 1), 0)];
        assert!(matches!(interpolate(&zero, 3), Err(EngineError::InvalidConfig(_))));

        let unordered = [
            ExclusionKeyframe::new(3, (1, 1), 2),
            ExclusionKeyframe::new(3, (1, 1), 2),
        ];
        assert!(matches!(interpolate(&unordered, 5), Err(EngineError::InvalidConfig(_))));
    }

    #[test]
    fn unconfirmed_marks_are_dropped() {
        assert_eq!(ExclusionKeyframe::confirmed(4, Some((1, 2)), 0), None);
        assert_eq!(ExclusionKeyframe::confirmed(4, None, 5), None);
        assert!(ExclusionKeyframe::confirmed(4, Some((1, 2)), 5).is_some());
    }

    #[test]
    fn keyframe_indices_span_the_clip() {
        assert_eq!(keyframe_indices(10, 4), vec![0, 3, 6, 9]);
        assert_eq!(keyframe_indices(5, 1), vec![0]);
        assert!(keyframe_indices(0, 3).is_empty());
    }

    #[test]
    fn circle_contains_its_rim() {
        let circle = ExclusionCircle { center: (5, 5), radius: 3 };
        assert!(circle.contains(8, 5));
        assert!(!circle.contains(8, 6));
    }
}
