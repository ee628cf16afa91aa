//! Captioning backends.
//!
//! Every backend family implements [`CaptionBackend`]: `load` acquires
//! whatever the family needs, `infer` turns one image plus a prompt into a
//! caption, and `close` releases it again. [`DefaultBackendFactory`] builds
//! the right adapter for a registry descriptor.

pub mod florence2;
pub mod ollama;

use std::path::Path;

use async_trait::async_trait;

use crate::config::BackendsConfig;
use crate::error::Result;
use crate::registry::{BackendDescriptor, BackendFamily};

pub use florence2::Florence2Backend;
pub use ollama::OllamaBackend;

/// Contract shared by all backend families.
///
/// Uses `async_trait` because the selector holds backends as
/// `Box<dyn CaptionBackend>`.
///
/// `infer` must not be called concurrently on one instance; the service
/// selector serializes calls.
#[async_trait]
pub trait CaptionBackend: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Acquire the resources this backend needs.
    ///
    /// Fails with `BackendUnavailable` when the runtime, model files, or
    /// endpoint are missing.
    async fn load(&mut self) -> Result<()>;

    /// Caption one image. Never returns an empty caption.
    async fn infer(&self, image: &Path, prompt: &str) -> Result<String>;

    /// Release held resources. Safe to call repeatedly or before `load`.
    async fn close(&mut self);
}

/// Builds a backend adapter for a descriptor.
pub trait BackendFactory: Send + Sync {
    fn create(&self, descriptor: &BackendDescriptor) -> Result<Box<dyn CaptionBackend>>;
}

/// Factory keyed by [`BackendFamily`], configured from `[backends]`.
#[derive(Debug, Clone, Default)]
pub struct DefaultBackendFactory {
    config: BackendsConfig,
}

impl DefaultBackendFactory {
    pub fn new(config: BackendsConfig) -> Self {
        Self { config }
    }
}

impl BackendFactory for DefaultBackendFactory {
    fn create(&self, descriptor: &BackendDescriptor) -> Result<Box<dyn CaptionBackend>> {
        match descriptor.family {
            BackendFamily::Ollama => Ok(Box::new(OllamaBackend::new(
                &self.config.ollama,
                &descriptor.model_id,
            ))),
            BackendFamily::Florence2 => Ok(Box::new(Florence2Backend::new(
                &self.config.florence2,
                &descriptor.model_id,
            ))),
        }
    }
}
