//! Shared test utilities for the imgserve test suite.
//!
//! Fixtures are generated in memory with the real encoders rather than
//! checked in, so every test states the exact size and frame count it needs.
//!
//! # Usage
//!
//! ```ignore
//! use crate::test_helpers::*;
//!
//! let tmp = tempfile::TempDir::new().unwrap();
//! write_fixture(tmp.path(), "photo.jpg", &jpeg_image(400, 300));
//!
//! let gif = corrupt_gif_frame(&animated_gif(100, 40, 5), 2);
//! assert_eq!(decode(&gif).dimensions(), (100, 40));
//! ```

use crate::imaging::{ImageBackend, Quality, RustBackend};
use crate::types::{Format, Image};
use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, Delay, DynamicImage, Frame, Rgb, RgbImage, Rgba, RgbaImage};
use std::io::Cursor;
use std::path::Path;

// =========================================================================
// Fixture images
// =========================================================================

fn gradient(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            128,
        ])
    }))
}

/// A JPEG with a smooth gradient, so quality settings make a visible
/// difference in size.
pub fn jpeg_image(width: u32, height: u32) -> Image {
    RustBackend::new()
        .encode(&gradient(width, height), Format::Jpeg, Quality::default())
        .unwrap()
}

pub fn png_image(width: u32, height: u32) -> Image {
    RustBackend::new()
        .encode(&gradient(width, height), Format::Png, Quality::default())
        .unwrap()
}

/// A looping GIF whose frames are solid, distinct colors.
pub fn animated_gif(width: u32, height: u32, frames: usize) -> Image {
    let frames = (0..frames)
        .map(|i| {
            let shade = (i * 40 % 256) as u8;
            let buffer = RgbaImage::from_pixel(width, height, Rgba([shade, 255 - shade, 96, 255]));
            Frame::from_parts(buffer, 0, 0, Delay::from_numer_denom_ms(100, 1))
        })
        .collect();
    RustBackend::new().encode_frames(frames).unwrap()
}

/// Break the LZW stream of one frame (0-based) by giving it an invalid
/// minimum code size. Frames before it still decode.
pub fn corrupt_gif_frame(gif: &Image, target: usize) -> Image {
    let mut data = gif.data.to_vec();
    let color_table_len = |packed: u8| {
        if packed & 0x80 != 0 {
            3 * (1usize << ((packed & 0x07) + 1))
        } else {
            0
        }
    };

    // Header (6) + logical screen descriptor (7) + global color table
    let mut pos = 13 + color_table_len(data[10]);
    let mut frame = 0;
    loop {
        match data[pos] {
            // Extension: label byte, then data sub-blocks
            0x21 => pos = skip_sub_blocks(&data, pos + 2),
            // Image descriptor (10) + local color table, then the LZW code size
            0x2C => {
                pos += 10 + color_table_len(data[pos + 9]);
                if frame == target {
                    data[pos] = 0x0F;
                    return Image::new(Format::Gif, data);
                }
                pos = skip_sub_blocks(&data, pos + 1);
                frame += 1;
            }
            other => panic!("frame {target} not found (block 0x{other:02x} at {pos})"),
        }
    }
}

fn skip_sub_blocks(data: &[u8], mut pos: usize) -> usize {
    loop {
        let len = usize::from(data[pos]);
        pos += 1;
        if len == 0 {
            return pos;
        }
        pos += len;
    }
}

// =========================================================================
// Inspection
// =========================================================================

/// Decode the first frame.
pub fn decode(image: &Image) -> DynamicImage {
    image::load_from_memory(&image.data).unwrap()
}

pub fn gif_frame_count(image: &Image) -> usize {
    GifDecoder::new(Cursor::new(&image.data[..]))
        .unwrap()
        .into_frames()
        .count()
}

// =========================================================================
// Filesystem
// =========================================================================

pub fn write_fixture(dir: &Path, name: &str, image: &Image) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, &image.data).unwrap();
}
