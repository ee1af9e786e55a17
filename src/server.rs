//! The layered server stack.
//!
//! Every layer implements [`Server`] and wraps the next one:
//!
//! ```text
//! CacheServer → LimitServer → HandlerServer → SourceServer
//!   (lookup)     (semaphore)   (dispatch on      (read file)
//!                               blocking pool)
//! ```
//!
//! [`build_server`] assembles the stack from a [`ServerConfig`]. A cache
//! budget of `0` leaves the cache layer out.

use crate::cache::CacheServer;
use crate::config::ServerConfig;
use crate::dispatch::{FormatDispatcher, Handler};
use crate::error::ServerError;
use crate::imaging::RustBackend;
use crate::params::Params;
use crate::source::SourceResolver;
use crate::types::Image;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Produces the image a parameter set describes.
#[async_trait]
pub trait Server: Send + Sync {
    async fn get(&self, params: &Params) -> Result<Image, ServerError>;
}

#[async_trait]
impl<S: Server + ?Sized> Server for Arc<S> {
    async fn get(&self, params: &Params) -> Result<Image, ServerError> {
        (**self).get(params).await
    }
}

/// Innermost layer: returns the untouched source named by `source`.
pub struct SourceServer {
    resolver: SourceResolver,
}

impl SourceServer {
    pub fn new(resolver: SourceResolver) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl Server for SourceServer {
    async fn get(&self, params: &Params) -> Result<Image, ServerError> {
        let source = params.get_str("source")?;
        self.resolver.resolve(source).await
    }
}

/// Runs a [`Handler`] over whatever the inner server returns.
///
/// The handler is CPU-bound and runs on tokio's blocking pool. Once started it
/// runs to completion even if the request is dropped.
pub struct HandlerServer<S> {
    inner: S,
    handler: Arc<dyn Handler>,
}

impl<S> HandlerServer<S> {
    pub fn new(inner: S, handler: Arc<dyn Handler>) -> Self {
        Self { inner, handler }
    }
}

#[async_trait]
impl<S: Server> Server for HandlerServer<S> {
    async fn get(&self, params: &Params) -> Result<Image, ServerError> {
        let source = self.inner.get(params).await?;
        let handler = Arc::clone(&self.handler);
        let params = params.clone();
        tokio::task::spawn_blocking(move || handler.handle(&source, &params))
            .await
            .map_err(|e| ServerError::Unexpected(format!("processing task failed: {e}")))?
    }
}

/// Caps the number of requests inside the inner server.
///
/// Excess requests queue on the semaphore in arrival order. Admitted work
/// runs on its own task that owns the permit, so a dropped request keeps its
/// slot until the work it started has finished.
pub struct LimitServer<S> {
    inner: Arc<S>,
    permits: Arc<Semaphore>,
}

impl<S> LimitServer<S> {
    pub fn new(inner: S, limit: usize) -> Self {
        Self {
            inner: Arc::new(inner),
            permits: Arc::new(Semaphore::new(limit)),
        }
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

#[async_trait]
impl<S: Server + 'static> Server for LimitServer<S> {
    async fn get(&self, params: &Params) -> Result<Image, ServerError> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| ServerError::Unexpected("concurrency limiter closed".into()))?;
        let inner = Arc::clone(&self.inner);
        let params = params.clone();
        tokio::spawn(async move {
            let result = inner.get(&params).await;
            drop(permit);
            result
        })
        .await
        .map_err(|e| ServerError::Unexpected(format!("limited task failed: {e}")))?
    }
}

/// Assemble the full stack from configuration.
pub fn build_server(config: &ServerConfig) -> Arc<dyn Server> {
    let dispatcher = FormatDispatcher::from_config(Arc::new(RustBackend::new()), config);
    let source = SourceServer::new(SourceResolver::new(&config.source_dir));
    let handled = HandlerServer::new(source, Arc::new(dispatcher));
    let limited = LimitServer::new(handled, config.effective_concurrency());

    if config.cache_size == 0 {
        Arc::new(limited)
    } else {
        Arc::new(CacheServer::new(limited, config.cache_size))
    }
}
