//! Raster transforms driven by the parameter store.
//!
//! A [`ProcessorChain`] runs crop, rotate and resize in that fixed order.
//! Every processor is a no-op when its parameters are absent, and reports as
//! much through [`Processor::changes`] so callers can skip decoding entirely.
//! [`GammaCorrection`] wraps a chain and runs it in linear light.

use crate::error::ServerError;
use crate::imaging::calculations::{calculate_crop_rect, calculate_resize_dimensions};
use crate::imaging::operations::{self, Rgba16Image};
use crate::imaging::{Background, CropSpec, Interpolation, Resampling, ResizeMode};
use crate::params::Params;
use image::{DynamicImage, GenericImageView};
use std::str::FromStr;

/// A pure raster transform.
pub trait Processor: Send + Sync {
    /// Whether [`process`](Self::process) would touch the image for these
    /// parameters.
    fn changes(&self, params: &Params) -> bool;

    fn process(&self, img: DynamicImage, params: &Params) -> Result<DynamicImage, ServerError>;
}

/// Read an optional string parameter and parse it, attributing failures to
/// `key`.
fn parsed<T>(params: &Params, key: &str) -> Result<Option<T>, ServerError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    params
        .opt_str(key)?
        .map(|s| s.parse::<T>().map_err(|e| ServerError::invalid(key, e.to_string())))
        .transpose()
}

pub struct CropProcessor;

impl Processor for CropProcessor {
    fn changes(&self, params: &Params) -> bool {
        params.has("crop")
    }

    fn process(&self, img: DynamicImage, params: &Params) -> Result<DynamicImage, ServerError> {
        let Some(spec) = parsed::<CropSpec>(params, "crop")? else {
            return Ok(img);
        };
        let rect = calculate_crop_rect(img.dimensions(), &spec).ok_or_else(|| {
            let (w, h) = img.dimensions();
            ServerError::invalid("crop", format!("'{spec}' lies outside the {w}x{h} image"))
        })?;
        Ok(operations::crop(&img, rect))
    }
}

pub struct RotateProcessor {
    pub default_interpolation: Interpolation,
}

impl Processor for RotateProcessor {
    fn changes(&self, params: &Params) -> bool {
        params.has("angle")
    }

    fn process(&self, img: DynamicImage, params: &Params) -> Result<DynamicImage, ServerError> {
        let Some(degrees) = params.opt_float("angle")? else {
            return Ok(img);
        };
        let interpolation =
            parsed::<Interpolation>(params, "interpolation")?.unwrap_or(self.default_interpolation);
        let background = parsed::<Background>(params, "background")?.unwrap_or_default();
        Ok(operations::rotate(img, degrees, interpolation, background))
    }
}

pub struct ResizeProcessor {
    pub default_resampling: Resampling,
    /// Upper bound on output dimensions (width, height).
    pub max: (u32, u32),
}

impl ResizeProcessor {
    fn dimension(params: &Params, key: &str) -> Result<Option<u32>, ServerError> {
        Ok(params
            .opt_int(key)?
            .map(|v| u32::try_from(v.max(0)).unwrap_or(u32::MAX)))
    }
}

impl Processor for ResizeProcessor {
    fn changes(&self, params: &Params) -> bool {
        params.has("width") || params.has("height")
    }

    fn process(&self, img: DynamicImage, params: &Params) -> Result<DynamicImage, ServerError> {
        let width = Self::dimension(params, "width")?;
        let height = Self::dimension(params, "height")?;
        let mode = parsed::<ResizeMode>(params, "mode")?.unwrap_or_default();
        let Some(size) = calculate_resize_dimensions(img.dimensions(), width, height, mode, self.max)
        else {
            return Ok(img);
        };
        if size == img.dimensions() {
            return Ok(img);
        }
        let resampling =
            parsed::<Resampling>(params, "resampling")?.unwrap_or(self.default_resampling);
        Ok(operations::resize(&img, size, mode, resampling))
    }
}

/// Processors applied in sequence.
pub struct ProcessorChain {
    processors: Vec<Box<dyn Processor>>,
}

impl ProcessorChain {
    pub fn new(processors: Vec<Box<dyn Processor>>) -> Self {
        Self { processors }
    }

    /// Crop, then rotate, then resize.
    pub fn standard(interpolation: Interpolation, resampling: Resampling, max: (u32, u32)) -> Self {
        Self::new(vec![
            Box::new(CropProcessor),
            Box::new(RotateProcessor {
                default_interpolation: interpolation,
            }),
            Box::new(ResizeProcessor {
                default_resampling: resampling,
                max,
            }),
        ])
    }
}

impl Processor for ProcessorChain {
    fn changes(&self, params: &Params) -> bool {
        self.processors.iter().any(|p| p.changes(params))
    }

    fn process(&self, img: DynamicImage, params: &Params) -> Result<DynamicImage, ServerError> {
        self.processors
            .iter()
            .try_fold(img, |img, p| p.process(img, params))
    }
}

/// Runs the wrapped processor on linear-light pixels.
///
/// Resampling in gamma-encoded space darkens edges and fine detail; in linear
/// space averages come out right. The `gamma` parameter overrides
/// `enabled_by_default` per request.
pub struct GammaCorrection<P> {
    pub inner: P,
    pub enabled_by_default: bool,
}

impl<P: Processor> GammaCorrection<P> {
    pub fn new(inner: P, enabled_by_default: bool) -> Self {
        Self {
            inner,
            enabled_by_default,
        }
    }
}

/// Drop back to 8 bits per channel, keeping alpha only where it is used.
fn narrow(buf: Rgba16Image) -> DynamicImage {
    let opaque = buf.pixels().all(|p| p[3] == u16::MAX);
    let wide = DynamicImage::ImageRgba16(buf);
    if opaque {
        DynamicImage::ImageRgb8(wide.to_rgb8())
    } else {
        DynamicImage::ImageRgba8(wide.to_rgba8())
    }
}

impl<P: Processor> Processor for GammaCorrection<P> {
    fn changes(&self, params: &Params) -> bool {
        self.inner.changes(params)
    }

    fn process(&self, img: DynamicImage, params: &Params) -> Result<DynamicImage, ServerError> {
        if !self.inner.changes(params) {
            return Ok(img);
        }
        let enabled = params.opt_bool("gamma")?.unwrap_or(self.enabled_by_default);
        if !enabled {
            return self.inner.process(img, params);
        }
        let linear = DynamicImage::ImageRgba16(operations::linearize(&img));
        let processed = self.inner.process(linear, params)?;
        Ok(narrow(operations::delinearize(processed.into_rgba16())))
    }
}
