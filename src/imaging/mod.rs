//! Image processing, pure Rust.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode / encode** | `image` codecs (JPEG, PNG, GIF, BMP, TIFF) |
//! | **Crop** | `DynamicImage::crop_imm` |
//! | **Rotate** | quarter turns via `image`, other angles via `imageproc::rotate_about_center` |
//! | **Resize** | `DynamicImage::resize_exact` with a selectable filter |
//! | **Gamma** | 16-bit lookup tables, γ = 2.2 |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Data structures describing image operations
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Operations**: Pixel work combining calculations with `image`/`imageproc`

pub mod backend;
pub mod calculations;
pub mod operations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, ImageBackend};
pub use params::{Anchor, Background, CropSpec, Interpolation, Quality, Resampling, ResizeMode};
pub use rust_backend::RustBackend;
