//! Pixel operations.
//!
//! These functions combine the pure [`calculations`](super::calculations) with
//! the actual raster work. They never fail: every size they receive has
//! already been clamped and validated by the caller.

use super::calculations::{Rect, calculate_fill_dimensions, calculate_rotated_bounds, normalize_degrees};
use super::params::{Background, Interpolation, ResizeMode, Resampling};
use image::imageops;
use image::{DynamicImage, GenericImageView, ImageBuffer, Rgba};
use imageproc::geometric_transformations::rotate_about_center;
use std::sync::LazyLock;

/// 16-bit RGBA buffer, the working format for rotation and gamma.
pub type Rgba16Image = ImageBuffer<Rgba<u16>, Vec<u16>>;

/// Gamma of the sRGB-like transfer curve assumed for encoded images.
pub const GAMMA: f64 = 2.2;

static TO_LINEAR: LazyLock<Vec<u16>> = LazyLock::new(|| transfer_table(GAMMA));
static FROM_LINEAR: LazyLock<Vec<u16>> = LazyLock::new(|| transfer_table(1.0 / GAMMA));

fn transfer_table(exponent: f64) -> Vec<u16> {
    (0..=u16::MAX)
        .map(|v| ((f64::from(v) / 65535.0).powf(exponent) * 65535.0).round() as u16)
        .collect()
}

fn apply_table(buf: &mut Rgba16Image, table: &[u16]) {
    for pixel in buf.pixels_mut() {
        // Alpha is already linear
        for c in &mut pixel.0[..3] {
            *c = table[usize::from(*c)];
        }
    }
}

/// Convert to 16-bit RGBA in linear light.
pub fn linearize(img: &DynamicImage) -> Rgba16Image {
    let mut buf = img.to_rgba16();
    apply_table(&mut buf, &TO_LINEAR);
    buf
}

/// Re-apply the transfer curve to a linear-light buffer.
pub fn delinearize(mut buf: Rgba16Image) -> Rgba16Image {
    apply_table(&mut buf, &FROM_LINEAR);
    buf
}

/// Cut `rect` out of `img`. The rect must lie inside the image.
pub fn crop(img: &DynamicImage, rect: Rect) -> DynamicImage {
    img.crop_imm(rect.x, rect.y, rect.width, rect.height)
}

/// Rotate counter-clockwise by `degrees`.
///
/// Quarter turns are lossless pixel shuffles. Any other angle grows the canvas
/// to the rotated bounds and fills the exposed corners with `background`.
pub fn rotate(
    img: DynamicImage,
    degrees: f64,
    interpolation: Interpolation,
    background: Background,
) -> DynamicImage {
    let degrees = normalize_degrees(degrees);
    if degrees == 0.0 {
        return img;
    } else if degrees == 90.0 {
        return img.rotate270();
    } else if degrees == 180.0 {
        return img.rotate180();
    } else if degrees == 270.0 {
        return img.rotate90();
    }

    let (w, h) = img.dimensions();
    let (out_w, out_h) = calculate_rotated_bounds((w, h), degrees);
    let fill = background.to_rgba16();

    // Work on a canvas big enough for both the source and the result, so the
    // rotation never clips before the final crop.
    let (canvas_w, canvas_h) = (w.max(out_w), h.max(out_h));
    let mut canvas = Rgba16Image::from_pixel(canvas_w, canvas_h, fill);
    imageops::replace(
        &mut canvas,
        &img.to_rgba16(),
        i64::from((canvas_w - w) / 2),
        i64::from((canvas_h - h) / 2),
    );

    // imageproc rotates clockwise for positive theta
    let theta = -(degrees.to_radians() as f32);
    let rotated = rotate_about_center(&canvas, theta, interpolation.to_imageproc(), fill);
    let cropped = imageops::crop_imm(
        &rotated,
        (canvas_w - out_w) / 2,
        (canvas_h - out_h) / 2,
        out_w,
        out_h,
    )
    .to_image();
    DynamicImage::ImageRgba16(cropped)
}

/// Resize to `size`.
///
/// [`ResizeMode::Fill`] scales to cover `size` with the aspect ratio intact,
/// then center-crops the overflow. The other modes scale to `size` directly;
/// aspect handling for them already happened when `size` was computed.
pub fn resize(
    img: &DynamicImage,
    size: (u32, u32),
    mode: ResizeMode,
    resampling: Resampling,
) -> DynamicImage {
    let (w, h) = size;
    let filter = resampling.filter();
    match mode {
        ResizeMode::Fill => {
            let (fill_w, fill_h) = calculate_fill_dimensions(img.dimensions(), size);
            img.resize_exact(fill_w, fill_h, filter)
                .crop_imm((fill_w - w) / 2, (fill_h - h) / 2, w, h)
        }
        ResizeMode::Exact | ResizeMode::Fit => img.resize_exact(w, h, filter),
    }
}
