// THEORY:
// The `region_extractor` turns a rectangular detection into a silhouette. A box is a
// coarse answer ("something moved in here"); the silhouette is the set of pixels
// inside it that actually belong to the object, so the composite shows the object
// and not a pasted rectangle of background.
//
// The extractor thresholds the cropped intensity, traces external contours and
// fills the *first* one discovered in raster order. That is not necessarily the
// largest contour. Picking the largest would often give a cleaner cut-out, but the
// first-found rule is what the composite has always been built with.

use crate::core_modules::detection_box::DetectionBox;
use crate::core_modules::raster::{self, MASK_ON};
use crate::error::{EngineError, EngineResult};
use image::{GrayImage, Rgb, RgbImage};
use imageproc::contrast::{ThresholdType, threshold};

/// The foreground pixels of one detection, cropped to its box.
#[derive(Debug, Clone)]
pub struct Silhouette {
    /// Cropped color pixels with everything outside the mask zeroed.
    pub pixels: RgbImage,
    /// Filled mask of the selected contour, same size as `pixels`.
    pub mask: GrayImage,
}

#[derive(Debug, Clone, Copy)]
pub struct RegionExtractor {
    threshold: u8,
}

impl RegionExtractor {
    pub fn new(threshold: u8) -> Self {
        Self { threshold }
    }

    /// Extracts the silhouette of `region` from `frame`.
    ///
    /// `Ok(None)` means the thresholded crop holds no contour and the box should be
    /// skipped. A box that does not fit the frame is an extraction error.
    pub fn extract(&self, frame: &RgbImage, region: &DetectionBox) -> EngineResult<Option<Silhouette>> {
        if !region.fits_within(frame.width(), frame.height()) {
            return Err(EngineError::extraction(format!(
                "box {region:?} does not fit a {}x{} frame",
                frame.width(),
                frame.height()
            )));
        }

        let roi = raster::crop(frame, region);
        let binary = threshold(&raster::intensity(&roi), self.threshold, ThresholdType::Binary);
        let contours = raster::external_contours(&binary);
        let Some(first) = contours.first() else {
            return Ok(None);
        };

        let mask = raster::filled_mask(roi.width(), roi.height(), &first.points);
        let pixels = RgbImage::from_fn(roi.width(), roi.height(), |x, y| {
            if mask.get_pixel(x, y)[0] == MASK_ON {
                *roi.get_pixel(x, y)
            } else {
                Rgb([0, 0, 0])
            }
        });
        Ok(Some(Silhouette { pixels, mask }))
    }
}
