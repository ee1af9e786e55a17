//! # imgserve
//!
//! An HTTP image server that crops, rotates, resizes and re-encodes images
//! on the fly. Source images live in a plain directory; every transform is
//! described by the request URL, so any output can be regenerated from its
//! URL alone and cached by it.
//!
//! # Architecture: Layered Server Stack
//!
//! A request flows through a parser chain, then through a stack of server
//! layers, each wrapping the next:
//!
//! ```text
//! HTTP ─→ ParserChain ─→ CacheServer ─→ LimitServer ─→ HandlerServer ─→ SourceServer
//!          (Params)      (LRU, bytes)    (semaphore)    (FormatDispatcher)  (read file)
//! ```
//!
//! The layering exists for three reasons:
//!
//! - **Purity**: the output is a function of the parameter store alone, which
//!   makes the store's hash usable as both cache key and `ETag`.
//! - **Bounded cost**: the limiter caps CPU-bound work, and the cache sits
//!   outside it so hits never queue.
//! - **Testability**: every layer is a [`server::Server`] and can be tested
//!   against a fake inner server.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`params`] | Typed, ordered per-request parameter store with a canonical serialization |
//! | [`parse`] | Parser chain: query string and path → parameter store |
//! | [`source`] | Path sanitizing and source file lookup with format sniffing |
//! | [`processor`] | Crop → rotate → resize chain, gamma-correct wrapper |
//! | [`dispatch`] | Animated GIF versus static pipeline, with fallback |
//! | [`server`] | The async [`Server`](server::Server) trait, limiter, and stack assembly |
//! | [`cache`] | Parameter hashing and the byte-budget LRU cache layer |
//! | [`http`] | axum router, headers, conditional requests, error mapping |
//! | [`config`] | `ServerConfig`: TOML loading, validation, stock config |
//! | [`imaging`] | Pure-Rust codecs and pixel operations |
//! | [`types`] | `Format` and `Image`, shared by every layer |
//! | [`error`] | `ServerError` and `ParamError` |
//!
//! # Design Decisions
//!
//! ## Animated Fallback
//!
//! Animated GIFs are processed frame by frame. Real-world GIFs are often
//! slightly broken in a later frame while the first one is fine, so any
//! failure in the animated pipeline falls back to processing the first frame
//! as a still. A degraded image is served instead of an error.
//!
//! ## Clamping, Not Rejecting
//!
//! Requested sizes above `max_width`/`max_height` are scaled down to fit.
//! Clients that ask for too much get the largest allowed image.
//!
//! ## Pure-Rust Imaging
//!
//! The [`imaging`] module uses the `image` crate for codecs and resampling and
//! `imageproc` for arbitrary-angle rotation. No system libraries are needed;
//! the binary is self-contained.

pub mod cache;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod imaging;
pub mod params;
pub mod parse;
pub mod processor;
pub mod server;
pub mod source;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
