//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

use super::params::{CropSpec, ResizeMode};

/// Scale one edge by the ratio of two others, rounding, never below 1px.
fn scale_edge(edge: u32, numerator: u32, denominator: u32) -> u32 {
    ((edge as f64 * numerator as f64 / denominator as f64).round() as u32).max(1)
}

/// Calculate the output size of a resize.
///
/// # Arguments
/// * `source` - Current image dimensions (width, height)
/// * `width`, `height` - Requested dimensions; `None` means "derive from the other"
/// * `mode` - How to combine the two when both are given
/// * `max` - Upper bounds (width, height); requests above them are clamped
///
/// # Returns
/// * `None` if neither dimension was requested
/// * `Some((width, height))` - Final output dimensions, never above `max`
///
/// # Examples
/// ```
/// # use imgserve::imaging::calculations::calculate_resize_dimensions;
/// # use imgserve::imaging::ResizeMode;
/// // 400x300, width=100 → 100x75
/// assert_eq!(
///     calculate_resize_dimensions((400, 300), Some(100), None, ResizeMode::Exact, (2048, 2048)),
///     Some((100, 75))
/// );
/// ```
pub fn calculate_resize_dimensions(
    source: (u32, u32),
    width: Option<u32>,
    height: Option<u32>,
    mode: ResizeMode,
    max: (u32, u32),
) -> Option<(u32, u32)> {
    let (src_w, src_h) = source;
    let (max_w, max_h) = max;
    let width = width.filter(|&w| w > 0).map(|w| w.min(max_w));
    let height = height.filter(|&h| h > 0).map(|h| h.min(max_h));

    match (width, height) {
        (None, None) => None,
        (Some(w), None) => Some(fit_within(
            (w, scale_edge(src_h, w, src_w)),
            (max_w, max_h),
        )),
        (None, Some(h)) => Some(fit_within(
            (scale_edge(src_w, h, src_h), h),
            (max_w, max_h),
        )),
        (Some(w), Some(h)) => match mode {
            ResizeMode::Exact | ResizeMode::Fill => Some((w, h)),
            ResizeMode::Fit => Some(fit_within(source, (w, h))),
        },
    }
}

/// Largest size with the aspect ratio of `size` that fits inside `bounds`.
///
/// Sizes already inside the bounds are returned unchanged.
pub fn fit_within(size: (u32, u32), bounds: (u32, u32)) -> (u32, u32) {
    let (w, h) = size;
    let (max_w, max_h) = bounds;
    if w <= max_w && h <= max_h {
        return (w, h);
    }
    if w as u64 * max_h as u64 >= h as u64 * max_w as u64 {
        // Wider than the box: width is the binding edge
        (max_w, scale_edge(h, max_w, w).min(max_h))
    } else {
        (scale_edge(w, max_h, h).min(max_w), max_h)
    }
}

/// Calculate dimensions needed to fill a target area (resize before crop).
///
/// Returns dimensions that completely cover the target area while maintaining
/// the source aspect ratio. One dimension will match exactly, the other may exceed.
///
/// # Arguments
/// * `source` - Original image dimensions (width, height)
/// * `target` - Target area dimensions (width, height)
///
/// # Returns
/// * `(width, height)` - Fill dimensions (at least one matches target)
pub fn calculate_fill_dimensions(source: (u32, u32), target: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = source;
    let (tgt_w, tgt_h) = target;

    let src_aspect = src_w as f64 / src_h as f64;
    let tgt_aspect = tgt_w as f64 / tgt_h as f64;

    if src_aspect > tgt_aspect {
        // Source is wider: height will match, width will exceed
        let h = tgt_h;
        let w = ((h as f64 * src_aspect).round() as u32).max(tgt_w);
        (w, h)
    } else {
        // Source is taller: width will match, height will exceed
        let w = tgt_w;
        let h = ((w as f64 / src_aspect).round() as u32).max(tgt_h);
        (w, h)
    }
}

/// A pixel rectangle: origin plus size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Resolve a crop request against the actual image size.
///
/// Rectangles are intersected with the image bounds; anchored windows are
/// shrunk to fit and positioned by their anchor. Returns `None` when the
/// result would be empty.
pub fn calculate_crop_rect(image: (u32, u32), spec: &CropSpec) -> Option<Rect> {
    let (img_w, img_h) = image;
    match *spec {
        CropSpec::Rect { x0, y0, x1, y1 } => {
            let x1 = x1.min(img_w);
            let y1 = y1.min(img_h);
            if x0 >= x1 || y0 >= y1 {
                return None;
            }
            Some(Rect {
                x: x0,
                y: y0,
                width: x1 - x0,
                height: y1 - y0,
            })
        }
        CropSpec::Anchored {
            width,
            height,
            anchor,
        } => {
            let w = width.min(img_w);
            let h = height.min(img_h);
            if w == 0 || h == 0 {
                return None;
            }
            let (fx, fy) = anchor.factors();
            Some(Rect {
                x: (img_w - w) * fx / 2,
                y: (img_h - h) * fy / 2,
                width: w,
                height: h,
            })
        }
    }
}

/// Size of the canvas that holds an image rotated by `degrees`.
pub fn calculate_rotated_bounds(size: (u32, u32), degrees: f64) -> (u32, u32) {
    let (w, h) = (size.0 as f64, size.1 as f64);
    let radians = degrees.to_radians();
    let (sin, cos) = (radians.sin().abs(), radians.cos().abs());
    // Shave float noise so 45° on a square doesn't grow by an extra pixel
    let bound = |v: f64| ((v - 1e-6).ceil() as u32).max(1);
    (bound(w * cos + h * sin), bound(w * sin + h * cos))
}

/// Normalize an angle into `[0, 360)`.
pub fn normalize_degrees(degrees: f64) -> f64 {
    let d = degrees.rem_euclid(360.0);
    // rem_euclid can return 360.0 for tiny negative inputs
    if d >= 360.0 { 0.0 } else { d }
}
