//! Format dispatch: animated versus static processing.
//!
//! GIF sources that stay GIF go through the [`AnimatedHandler`], which
//! transforms every frame. Everything else, and any animated request that
//! fails for whatever reason, goes through the [`StaticHandler`] on the first
//! frame. The fallback is a recovery path, so it is logged as a warning and
//! never surfaces as an error by itself.
//!
//! Handlers are synchronous and CPU-bound; the server layer runs them on the
//! blocking pool.

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::imaging::{ImageBackend, Interpolation, Quality, Resampling};
use crate::params::Params;
use crate::processor::{GammaCorrection, Processor, ProcessorChain};
use crate::types::{Format, Image};
use image::{DynamicImage, Frame};
use rayon::prelude::*;
use std::sync::Arc;
use tracing::warn;

/// Turns a source image into an output image for one request.
pub trait Handler: Send + Sync {
    fn handle(&self, source: &Image, params: &Params) -> Result<Image, ServerError>;
}

/// Requested output format, if any.
fn output_format(params: &Params) -> Result<Option<Format>, ServerError> {
    params
        .opt_str("format")?
        .map(|s| s.parse::<Format>().map_err(|e| ServerError::invalid("format", e)))
        .transpose()
}

/// Single-raster pipeline: decode, gamma-wrapped processing, encode.
pub struct StaticHandler {
    backend: Arc<dyn ImageBackend>,
    processor: GammaCorrection<ProcessorChain>,
    default_quality: Quality,
}

impl StaticHandler {
    pub fn new(
        backend: Arc<dyn ImageBackend>,
        processor: GammaCorrection<ProcessorChain>,
        default_quality: Quality,
    ) -> Self {
        Self {
            backend,
            processor,
            default_quality,
        }
    }
}

impl Handler for StaticHandler {
    fn handle(&self, source: &Image, params: &Params) -> Result<Image, ServerError> {
        let target = output_format(params)?.unwrap_or(source.format);
        let quality = params.opt_int("quality")?;

        // Nothing to do: hand back the original bytes
        if !self.processor.changes(params) && target == source.format && quality.is_none() {
            return Ok(source.clone());
        }

        let raster = self.backend.decode(source)?;
        let raster = self.processor.process(raster, params)?;
        let quality = quality
            .and_then(Quality::try_from_i64)
            .unwrap_or(self.default_quality);
        Ok(self.backend.encode(&raster, target, quality)?)
    }
}

/// Frame-by-frame pipeline for animated GIFs.
pub struct AnimatedHandler {
    backend: Arc<dyn ImageBackend>,
    processor: ProcessorChain,
}

impl AnimatedHandler {
    pub fn new(backend: Arc<dyn ImageBackend>, processor: ProcessorChain) -> Self {
        Self { backend, processor }
    }
}

impl Handler for AnimatedHandler {
    fn handle(&self, source: &Image, params: &Params) -> Result<Image, ServerError> {
        if !self.processor.changes(params) {
            return Ok(source.clone());
        }

        let frames = self.backend.decode_frames(source)?;
        let frames = frames
            .into_par_iter()
            .map(|frame| {
                let delay = frame.delay();
                let raster = DynamicImage::ImageRgba8(frame.into_buffer());
                let out = self.processor.process(raster, params)?;
                Ok(Frame::from_parts(out.to_rgba8(), 0, 0, delay))
            })
            .collect::<Result<Vec<_>, ServerError>>()?;
        Ok(self.backend.encode_frames(frames)?)
    }
}

/// Chooses between the animated and static pipelines.
pub struct FormatDispatcher {
    animated: AnimatedHandler,
    fallback: StaticHandler,
}

impl FormatDispatcher {
    pub fn new(animated: AnimatedHandler, fallback: StaticHandler) -> Self {
        Self { animated, fallback }
    }

    /// Both pipelines over one backend, with their default filters: cubic
    /// and Lanczos for stills, nearest-neighbor for animation frames.
    pub fn from_config(backend: Arc<dyn ImageBackend>, config: &ServerConfig) -> Self {
        let max = (config.max_width, config.max_height);
        let animated = AnimatedHandler::new(
            Arc::clone(&backend),
            ProcessorChain::standard(Interpolation::Nearest, Resampling::Nearest, max),
        );
        let fallback = StaticHandler::new(
            backend,
            GammaCorrection::new(
                ProcessorChain::standard(Interpolation::Cubic, Resampling::Lanczos, max),
                config.gamma_correction,
            ),
            Quality::new(config.quality),
        );
        Self::new(animated, fallback)
    }
}

impl Handler for FormatDispatcher {
    fn handle(&self, source: &Image, params: &Params) -> Result<Image, ServerError> {
        let wants_animation = matches!(output_format(params)?, None | Some(Format::Gif));
        if source.format.is_animated() && wants_animation {
            match self.animated.handle(source, params) {
                Ok(image) => return Ok(image),
                Err(err) => {
                    warn!(error = %err, params = %params, "animated pipeline failed, using first frame");
                }
            }
        }
        self.fallback.handle(source, params)
    }
}
