//! Raster primitives shared by the detector, the extractor and the compositor:
//! intensity conversion, differencing, external contour tracing, mask filling
//! and box drawing. Thresholding and contour areas come straight from
//! `imageproc::contrast::threshold` and `imageproc::geometry::contour_area`.

use crate::core_modules::detection_box::DetectionBox;
use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::contours::{BorderType, Contour, find_contours};
use imageproc::drawing::{draw_hollow_rect_mut, draw_polygon_mut};
use imageproc::point::Point;
use imageproc::rect::Rect;

pub const MASK_ON: u8 = 255;

/// Single-channel intensity view of a color frame.
pub fn intensity(frame: &RgbImage) -> GrayImage {
    image::imageops::grayscale(frame)
}

/// Per-pixel absolute difference of two equally sized intensity images.
pub fn abs_diff(a: &GrayImage, b: &GrayImage) -> GrayImage {
    GrayImage::from_fn(a.width(), a.height(), |x, y| {
        let pa = a.get_pixel(x, y)[0];
        let pb = b.get_pixel(x, y)[0];
        Luma([pa.abs_diff(pb)])
    })
}

/// Outer borders that are not nested inside a hole of another border, in
/// raster-scan discovery order.
///
/// The tracer never starts a border on column 0, so the mask is traced inside a
/// one-pixel zero frame and the points are shifted back afterwards.
pub fn external_contours(mask: &GrayImage) -> Vec<Contour<i32>> {
    let mut padded = GrayImage::new(mask.width() + 2, mask.height() + 2);
    image::imageops::replace(&mut padded, mask, 1, 1);

    find_contours::<i32>(&padded)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .map(|c| {
            let points = c.points.iter().map(|p| Point::new(p.x - 1, p.y - 1)).collect();
            Contour::new(points, c.border_type, None)
        })
        .collect()
}

/// Smallest box covering every border point, in the mask's coordinate space.
pub fn bounding_box(points: &[Point<i32>]) -> Option<DetectionBox> {
    let min_x = points.iter().map(|p| p.x).min()?;
    let max_x = points.iter().map(|p| p.x).max()?;
    let min_y = points.iter().map(|p| p.y).min()?;
    let max_y = points.iter().map(|p| p.y).max()?;
    if min_x < 0 || min_y < 0 {
        return None;
    }
    Some(DetectionBox::new(
        min_x as u32,
        min_y as u32,
        (max_x - min_x + 1) as u32,
        (max_y - min_y + 1) as u32,
    ))
}

/// Fills the region enclosed by `points` (border included) into a fresh
/// `width` x `height` mask.
pub fn filled_mask(width: u32, height: u32, points: &[Point<i32>]) -> GrayImage {
    let mut mask = GrayImage::new(width, height);
    fill_contour_mut(&mut mask, points);
    mask
}

/// Fills a contour into an existing mask. The polygon fill needs at least three
/// vertices and an open ring, so the border pixels are always set explicitly.
pub fn fill_contour_mut(mask: &mut GrayImage, points: &[Point<i32>]) {
    let mut ring: Vec<Point<i32>> = Vec::with_capacity(points.len());
    for p in points {
        if ring.last() != Some(p) {
            ring.push(*p);
        }
    }
    while ring.len() > 1 && ring.first() == ring.last() {
        ring.pop();
    }
    if ring.len() >= 3 {
        draw_polygon_mut(mask, &ring, Luma([MASK_ON]));
    }
    for p in points {
        if p.x >= 0 && p.y >= 0 && (p.x as u32) < mask.width() && (p.y as u32) < mask.height() {
            mask.put_pixel(p.x as u32, p.y as u32, Luma([MASK_ON]));
        }
    }
}

/// Copy of `frame` restricted to the box.
pub fn crop(frame: &RgbImage, region: &DetectionBox) -> RgbImage {
    image::imageops::crop_imm(frame, region.x, region.y, region.width, region.height).to_image()
}

/// Draws a hollow rectangle `thickness` pixels wide, growing inwards.
pub fn draw_box_outline(canvas: &mut RgbImage, region: &DetectionBox, color: Rgb<u8>, thickness: u32) {
    for inset in 0..thickness {
        let width = region.width.saturating_sub(2 * inset);
        let height = region.height.saturating_sub(2 * inset);
        if width == 0 || height == 0 {
            break;
        }
        let rect = Rect::at((region.x + inset) as i32, (region.y + inset) as i32).of_size(width, height);
        draw_hollow_rect_mut(canvas, rect, color);
    }
}
