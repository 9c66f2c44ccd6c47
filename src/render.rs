//! Render backend abstraction
//!
//! The pool and workers only ever talk to a backend through these traits, so
//! the orchestration core runs the same against headless Chrome or a test
//! double.

use crate::{CrawlError, Viewport};
use async_trait::async_trait;

/// A single render-capable handle, bound to one browser tab or context.
#[async_trait]
pub trait RenderResource: Send + Sync + 'static {
    /// Load `url` into this resource.
    async fn navigate(&self, url: &str) -> Result<(), CrawlError>;
}

/// Creates and destroys render resources.
///
/// Implementations do not need to limit concurrency themselves; the
/// [`ResourcePool`](crate::ResourcePool) caps outstanding allocations.
#[async_trait]
pub trait RenderBackend: Send + Sync + 'static {
    type Resource: RenderResource;

    async fn allocate(&self, viewport: &Viewport) -> Result<Self::Resource, CrawlError>;

    /// Destroy a resource previously returned by `allocate`. Must not fail.
    async fn release(&self, resource: Self::Resource);

    /// Tear down anything the backend owns (browser process, handler task).
    async fn shutdown(&self) {}
}
