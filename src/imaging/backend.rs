//! Codec backend trait and shared types.
//!
//! The [`ImageBackend`] trait is the boundary to the codec: everything that
//! turns bytes into pixels or pixels into bytes goes through it. The rest of
//! the pipeline only ever sees [`DynamicImage`] rasters and [`Image`] values.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), built on the `image`
//! crate's pure-Rust codecs.

use super::params::Quality;
use crate::types::{Format, Image};
use image::{DynamicImage, Frame};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("{0}")]
    Decode(String),
    #[error("{0}")]
    Encode(String),
}

/// Trait for codec backends.
///
/// Static images go through [`decode`](Self::decode) /
/// [`encode`](Self::encode); animated ones through the `_frames` pair.
pub trait ImageBackend: Send + Sync {
    /// Decode to a single raster. Multi-frame inputs yield their first frame.
    fn decode(&self, image: &Image) -> Result<DynamicImage, BackendError>;

    /// Decode every frame of an animated image, fully composited.
    fn decode_frames(&self, image: &Image) -> Result<Vec<Frame>, BackendError>;

    /// Encode a raster. `quality` only affects lossy formats.
    fn encode(
        &self,
        raster: &DynamicImage,
        format: Format,
        quality: Quality,
    ) -> Result<Image, BackendError>;

    /// Encode frames as a looping animation.
    fn encode_frames(&self, frames: Vec<Frame>) -> Result<Image, BackendError>;
}
