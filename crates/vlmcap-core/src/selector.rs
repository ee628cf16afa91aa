//! Service selector: owns the one active captioning backend.
//!
//! Two states: idle (no backend) and active (one loaded backend bound to a
//! registry descriptor). The active slot sits behind an async mutex that is
//! held for the whole `infer` call, so inference against the active backend
//! is serialized.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::backend::{BackendFactory, CaptionBackend};
use crate::error::{CaptionError, Result};
use crate::registry::{BackendDescriptor, Registry};

struct ActiveBackend {
    descriptor: BackendDescriptor,
    backend: Box<dyn CaptionBackend>,
}

/// Start/stop lifecycle and inference routing for the active backend.
pub struct ServiceSelector {
    registry: Arc<Registry>,
    factory: Box<dyn BackendFactory>,
    active: Mutex<Option<ActiveBackend>>,
}

impl ServiceSelector {
    pub fn new(registry: Arc<Registry>, factory: Box<dyn BackendFactory>) -> Self {
        Self {
            registry,
            factory,
            active: Mutex::new(None),
        }
    }

    /// Load the backend registered under `id` and make it active.
    ///
    /// Callers are expected to `close()` first. If a backend is still active
    /// it is closed here before the new one loads, so at most one is ever
    /// held. On load failure the selector stays idle.
    pub async fn start(&self, id: &str) -> Result<()> {
        let descriptor = self.registry.descriptor_for(id)?.clone();

        let mut active = self.active.lock().await;
        if let Some(mut previous) = active.take() {
            tracing::warn!(
                "Starting '{}' while '{}' is still active; closing it first",
                descriptor.id,
                previous.descriptor.id
            );
            previous.backend.close().await;
        }

        let mut backend = self.factory.create(&descriptor)?;
        tracing::info!(
            "Starting '{}' on {} (model {})",
            descriptor.id,
            backend.name(),
            descriptor.model_id
        );
        backend.load().await?;

        *active = Some(ActiveBackend {
            descriptor,
            backend,
        });
        Ok(())
    }

    /// Caption one image with the active backend.
    ///
    /// The backend's output is cleaned with [`clean_caption`].
    pub async fn caption(&self, image: &Path, prompt: &str) -> Result<String> {
        let active = self.active.lock().await;
        let active = active.as_ref().ok_or(CaptionError::NoActiveBackend)?;

        let raw = active.backend.infer(image, prompt).await?;
        Ok(clean_caption(&raw).to_string())
    }

    /// Close the active backend. No-op when idle.
    pub async fn close(&self) {
        let mut active = self.active.lock().await;
        if let Some(mut current) = active.take() {
            current.backend.close().await;
            tracing::info!("Closed '{}' on {}", current.descriptor.id, current.backend.name());
        }
    }

    /// Descriptor of the active backend, if any.
    pub async fn active_model(&self) -> Option<BackendDescriptor> {
        self.active
            .lock()
            .await
            .as_ref()
            .map(|a| a.descriptor.clone())
    }

    pub async fn is_active(&self) -> bool {
        self.active.lock().await.is_some()
    }
}

/// Drop a trailing parenthetical some models append: everything from the
/// first `" ("` on is removed.
pub fn clean_caption(caption: &str) -> &str {
    match caption.find(" (") {
        Some(idx) => &caption[..idx],
        None => caption,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::{StubCounters, StubFactory};
    use std::time::Duration;

    fn selector_with(factory: StubFactory) -> ServiceSelector {
        ServiceSelector::new(Arc::new(Registry::builtin()), Box::new(factory))
    }

    #[test]
    fn test_clean_caption_truncates_parenthetical() {
        assert_eq!(clean_caption("a red car (confidence 0.9)"), "a red car");
    }

    #[test]
    fn test_clean_caption_without_marker_is_unchanged() {
        assert_eq!(clean_caption("a red car"), "a red car");
        // No space before the parenthesis: not a match
        assert_eq!(clean_caption("a car(red)"), "a car(red)");
        assert_eq!(clean_caption(""), "");
    }

    #[test]
    fn test_clean_caption_cuts_at_first_marker() {
        assert_eq!(clean_caption("a (b) c (d)"), "a");
    }

    #[tokio::test]
    async fn test_start_while_idle_becomes_active() {
        let factory = StubFactory::echo();
        let counters = factory.counters();
        let selector = selector_with(factory);

        assert!(!selector.is_active().await);
        selector.start("Qwen3-VLM-8B-Ollama").await.unwrap();
        assert!(selector.is_active().await);
        assert_eq!(
            selector.active_model().await.unwrap().id,
            "Qwen3-VLM-8B-Ollama"
        );
        assert_eq!(StubCounters::get(&counters.loads), 1);
    }

    #[tokio::test]
    async fn test_caption_while_idle_fails() {
        let selector = selector_with(StubFactory::echo());
        let err = selector
            .caption(Path::new("a.jpg"), "Describe")
            .await
            .unwrap_err();
        assert!(matches!(err, CaptionError::NoActiveBackend));
    }

    #[tokio::test]
    async fn test_unknown_model_leaves_selector_idle() {
        let factory = StubFactory::echo();
        let counters = factory.counters();
        let selector = selector_with(factory);

        let err = selector.start("no-such-model").await.unwrap_err();
        assert!(matches!(err, CaptionError::UnknownModel(_)));
        assert!(!selector.is_active().await);
        assert_eq!(StubCounters::get(&counters.created), 0);
    }

    #[tokio::test]
    async fn test_load_failure_leaves_selector_idle() {
        let selector = selector_with(StubFactory::echo().failing_load());
        let err = selector.start("Qwen3-VLM-8B-Ollama").await.unwrap_err();
        assert!(matches!(err, CaptionError::BackendUnavailable { .. }));
        assert!(!selector.is_active().await);
    }

    #[tokio::test]
    async fn test_close_twice_is_idle_without_error() {
        let factory = StubFactory::echo();
        let counters = factory.counters();
        let selector = selector_with(factory);
        selector.start("Qwen3-VLM-8B-Ollama").await.unwrap();

        selector.close().await;
        assert!(!selector.is_active().await);
        selector.close().await;
        assert!(!selector.is_active().await);
        assert_eq!(StubCounters::get(&counters.closes), 1);
    }

    #[tokio::test]
    async fn test_start_while_active_closes_previous() {
        let factory = StubFactory::echo();
        let counters = factory.counters();
        let selector = selector_with(factory);

        selector.start("Qwen3-VLM-8B-Ollama").await.unwrap();
        selector.start("MiniCPM-V-2.6-8b-Ollama").await.unwrap();

        assert_eq!(StubCounters::get(&counters.closes), 1);
        assert_eq!(StubCounters::get(&counters.loads), 2);
        assert_eq!(
            selector.active_model().await.unwrap().id,
            "MiniCPM-V-2.6-8b-Ollama"
        );
    }

    #[tokio::test]
    async fn test_caption_applies_cleanup() {
        let selector = selector_with(StubFactory::new(|_, _| {
            Ok("a red car (confidence 0.9)".to_string())
        }));
        selector.start("Qwen3-VLM-8B-Ollama").await.unwrap();
        let caption = selector
            .caption(Path::new("car.jpg"), "Describe")
            .await
            .unwrap();
        assert_eq!(caption, "a red car");
    }

    #[tokio::test]
    async fn test_caption_propagates_inference_error() {
        let selector = selector_with(StubFactory::new(|_, _| {
            Err(CaptionError::inference("backend timeout"))
        }));
        selector.start("Qwen3-VLM-8B-Ollama").await.unwrap();
        let err = selector
            .caption(Path::new("a.jpg"), "Describe")
            .await
            .unwrap_err();
        assert_eq!(err.detail(), "backend timeout");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_captions_are_serialized() {
        let factory = StubFactory::echo().with_delay(Duration::from_millis(50));
        let counters = factory.counters();
        let selector = Arc::new(selector_with(factory));
        selector.start("Qwen3-VLM-8B-Ollama").await.unwrap();

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let selector = selector.clone();
                tokio::spawn(async move {
                    selector
                        .caption(Path::new(&format!("{i}.jpg")), "Describe")
                        .await
                })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }

        assert_eq!(StubCounters::get(&counters.infers), 4);
        assert_eq!(StubCounters::get(&counters.max_in_flight), 1);
    }
}
