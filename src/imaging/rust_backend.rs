//! Pure Rust codec backend. No system libraries; every codec is statically
//! linked into the binary.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, GIF, BMP, TIFF) | `image::load_from_memory_with_format` |
//! | Decode GIF frames | `image::codecs::gif::GifDecoder` + `AnimationDecoder::into_frames` |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` with explicit quality |
//! | Encode → PNG, GIF, BMP, TIFF | `DynamicImage::write_to` |
//! | Encode GIF frames | `image::codecs::gif::GifEncoder`, infinite repeat |

use super::backend::{BackendError, ImageBackend};
use super::params::Quality;
use crate::types::{Format, Image};
use image::codecs::gif::{GifDecoder, GifEncoder, Repeat};
use image::codecs::jpeg::JpegEncoder;
use image::{AnimationDecoder, DynamicImage, Frame};
use std::io::Cursor;

/// NeuQuant speed for GIF palette quantization (1 = best, 30 = fastest).
const GIF_ENCODE_SPEED: i32 = 10;

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_error(format: Format, err: impl std::fmt::Display) -> BackendError {
    BackendError::Decode(format!("failed to decode {format}: {err}"))
}

fn encode_error(format: Format, err: impl std::fmt::Display) -> BackendError {
    BackendError::Encode(format!("failed to encode {format}: {err}"))
}

/// Reduce a raster to 8-bit RGB or RGBA, keeping alpha only if present.
fn to_8bit(raster: &DynamicImage) -> DynamicImage {
    if raster.color().has_alpha() {
        DynamicImage::ImageRgba8(raster.to_rgba8())
    } else {
        DynamicImage::ImageRgb8(raster.to_rgb8())
    }
}

impl ImageBackend for RustBackend {
    fn decode(&self, image: &Image) -> Result<DynamicImage, BackendError> {
        image::load_from_memory_with_format(&image.data, image.format.to_image_format())
            .map_err(|e| decode_error(image.format, e))
    }

    fn decode_frames(&self, image: &Image) -> Result<Vec<Frame>, BackendError> {
        if image.format != Format::Gif {
            let raster = self.decode(image)?;
            return Ok(vec![Frame::new(raster.to_rgba8())]);
        }
        let decoder =
            GifDecoder::new(Cursor::new(&image.data[..])).map_err(|e| decode_error(Format::Gif, e))?;
        let frames = decoder
            .into_frames()
            .collect_frames()
            .map_err(|e| decode_error(Format::Gif, e))?;
        if frames.is_empty() {
            return Err(decode_error(Format::Gif, "no frames"));
        }
        Ok(frames)
    }

    fn encode(
        &self,
        raster: &DynamicImage,
        format: Format,
        quality: Quality,
    ) -> Result<Image, BackendError> {
        let mut buf = Vec::new();
        match format {
            Format::Jpeg => {
                let encoder = JpegEncoder::new_with_quality(&mut buf, quality.value());
                DynamicImage::ImageRgb8(raster.to_rgb8())
                    .write_with_encoder(encoder)
                    .map_err(|e| encode_error(format, e))?;
            }
            Format::Gif => {
                DynamicImage::ImageRgba8(raster.to_rgba8())
                    .write_to(&mut Cursor::new(&mut buf), format.to_image_format())
                    .map_err(|e| encode_error(format, e))?;
            }
            Format::Png | Format::Bmp | Format::Tiff => {
                to_8bit(raster)
                    .write_to(&mut Cursor::new(&mut buf), format.to_image_format())
                    .map_err(|e| encode_error(format, e))?;
            }
        }
        Ok(Image::new(format, buf))
    }

    fn encode_frames(&self, frames: Vec<Frame>) -> Result<Image, BackendError> {
        let mut buf = Vec::new();
        {
            // The trailer is written when the encoder drops
            let mut encoder = GifEncoder::new_with_speed(&mut buf, GIF_ENCODE_SPEED);
            encoder
                .set_repeat(Repeat::Infinite)
                .map_err(|e| encode_error(Format::Gif, e))?;
            encoder
                .encode_frames(frames)
                .map_err(|e| encode_error(Format::Gif, e))?;
        }
        Ok(Image::new(Format::Gif, buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{animated_gif, corrupt_gif_frame, jpeg_image, png_image};
    use image::GenericImageView;

    #[test]
    fn decode_synthetic_jpeg() {
        let backend = RustBackend::new();
        let raster = backend.decode(&jpeg_image(200, 150)).unwrap();
        assert_eq!(raster.dimensions(), (200, 150));
    }

    #[test]
    fn decode_garbage_errors() {
        let backend = RustBackend::new();
        let result = backend.decode(&Image::new(Format::Png, &b"not a png"[..]));
        assert!(matches!(result, Err(BackendError::Decode(_))));
    }

    #[test]
    fn encode_every_format_produces_detectable_bytes() {
        let backend = RustBackend::new();
        let raster = backend.decode(&png_image(32, 16)).unwrap();
        for format in Format::ALL {
            let encoded = backend.encode(&raster, format, Quality::default()).unwrap();
            assert_eq!(encoded.format, format);
            let detected = image::guess_format(&encoded.data).unwrap();
            assert_eq!(Format::from_image_format(detected), Some(format));
            let decoded = backend.decode(&encoded).unwrap();
            assert_eq!(decoded.dimensions(), (32, 16));
        }
    }

    #[test]
    fn jpeg_quality_changes_output_size() {
        let backend = RustBackend::new();
        let raster = backend.decode(&jpeg_image(256, 256)).unwrap();
        let low = backend.encode(&raster, Format::Jpeg, Quality::new(10)).unwrap();
        let high = backend.encode(&raster, Format::Jpeg, Quality::new(100)).unwrap();
        assert!(low.len() < high.len());
    }

    #[test]
    fn decode_frames_returns_every_gif_frame() {
        let backend = RustBackend::new();
        let frames = backend.decode_frames(&animated_gif(8, 6, 5)).unwrap();
        assert_eq!(frames.len(), 5);
        assert_eq!(frames[0].buffer().dimensions(), (8, 6));
    }

    #[test]
    fn decode_frames_of_static_image_is_single_frame() {
        let backend = RustBackend::new();
        let frames = backend.decode_frames(&png_image(4, 4)).unwrap();
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn corrupt_frame_fails_frames_but_not_first_frame_decode() {
        let backend = RustBackend::new();
        let gif = corrupt_gif_frame(&animated_gif(8, 6, 5), 2);
        assert!(backend.decode_frames(&gif).is_err());
        assert_eq!(backend.decode(&gif).unwrap().dimensions(), (8, 6));
    }

    #[test]
    fn encode_frames_roundtrips_frame_count() {
        let backend = RustBackend::new();
        let frames = backend.decode_frames(&animated_gif(8, 8, 3)).unwrap();
        let encoded = backend.encode_frames(frames).unwrap();
        assert_eq!(encoded.format, Format::Gif);
        assert_eq!(backend.decode_frames(&encoded).unwrap().len(), 3);
    }
}
