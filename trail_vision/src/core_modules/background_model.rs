// THEORY:
// The `BackgroundModel` is the adaptive memory behind the compositor's secondary
// path. Where the motion detector only ever compares a frame with its predecessor,
// this model slowly learns what the scene looks like when nothing is moving and
// reports every pixel that currently deviates from it.
//
// Key architectural principles:
// 1.  **Per-Pixel Running Mean**: Each pixel channel keeps an exponential moving
//     average. A small, fixed learning rate means a subject that stays in view keeps
//     standing out for a long time; the operator's exclusion zones exist to cover
//     exactly that case.
// 2.  **Seeded, Not Learned From Nothing**: The first frame initialises the model so
//     there is no warm-up period full of false foreground.
// 3.  **Explicit State**: One model per job, created fresh and threaded through the
//     per-frame loop, never shared.

use crate::core_modules::raster::MASK_ON;
use image::{GrayImage, Luma, RgbImage};

/// Fraction of each new frame blended into the model, equivalent to a history of
/// 500 frames.
pub const DEFAULT_LEARNING_RATE: f32 = 1.0 / 500.0;

#[derive(Debug, Clone)]
pub struct BackgroundModel {
    width: u32,
    height: u32,
    mean: Vec<f32>,
    learning_rate: f32,
    threshold: f32,
}

impl BackgroundModel {
    /// Seeds the model with `first_frame`.
    pub fn new(first_frame: &RgbImage, threshold: u8) -> Self {
        Self::with_learning_rate(first_frame, threshold, DEFAULT_LEARNING_RATE)
    }

    pub fn with_learning_rate(first_frame: &RgbImage, threshold: u8, learning_rate: f32) -> Self {
        Self {
            width: first_frame.width(),
            height: first_frame.height(),
            mean: first_frame.as_raw().iter().map(|&v| v as f32).collect(),
            learning_rate: learning_rate.clamp(0.0, 1.0),
            threshold: threshold as f32,
        }
    }

    /// Binary foreground mask: a pixel is foreground when any channel deviates
    /// from the model by more than the threshold.
    pub fn foreground(&self, frame: &RgbImage) -> GrayImage {
        let raw = frame.as_raw();
        GrayImage::from_fn(self.width, self.height, |x, y| {
            let base = ((y * self.width + x) * 3) as usize;
            let deviates = (0..3).any(|c| (raw[base + c] as f32 - self.mean[base + c]).abs() > self.threshold);
            if deviates { Luma([MASK_ON]) } else { Luma([0]) }
        })
    }

    /// Blends `frame` into the running mean.
    pub fn update(&mut self, frame: &RgbImage) {
        let rate = self.learning_rate;
        for (mean, &value) in self.mean.iter_mut().zip(frame.as_raw()) {
            *mean += rate * (value as f32 - *mean);
        }
    }

    /// Foreground of `frame` against the current model, then learns from it.
    pub fn apply(&mut self, frame: &RgbImage) -> GrayImage {
        let mask = self.foreground(frame);
        self.update(frame);
        mask
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn seed_frame_has_no_foreground() {
        let frame = RgbImage::from_pixel(8, 8, Rgb([90, 90, 90]));
        let mut model = BackgroundModel::new(&frame, 25);
        assert!(model.apply(&frame).pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn new_object_is_foreground() {
        let background = RgbImage::from_pixel(8, 8, Rgb([10, 10, 10]));
        let mut frame = background.clone();
        frame.put_pixel(3, 4, Rgb([10, 200, 10]));
        let model = BackgroundModel::new(&background, 25);

        let mask = model.foreground(&frame);
        assert_eq!(mask.get_pixel(3, 4)[0], MASK_ON);
        assert_eq!(mask.pixels().filter(|p| p[0] == MASK_ON).count(), 1);
    }

    #[test]
    fn persistent_change_is_absorbed_at_full_rate() {
        let background = RgbImage::from_pixel(4, 4, Rgb([0, 0, 0]));
        let changed = RgbImage::from_pixel(4, 4, Rgb([100, 100, 100]));
        let mut model = BackgroundModel::with_learning_rate(&background, 25, 1.0);

        assert!(model.apply(&changed).pixels().all(|p| p[0] == MASK_ON));
        assert!(model.apply(&changed).pixels().all(|p| p[0] == 0));
    }
}
