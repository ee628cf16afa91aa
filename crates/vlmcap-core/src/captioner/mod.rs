//! Request orchestration.
//!
//! [`Captioner`] is the context object the CLI (or any other front end)
//! talks to. It owns the registry, the service selector and the job tracker,
//! validates inputs, resolves prompts, and runs directory jobs on a
//! background task.

mod discovery;
mod worker;

pub use discovery::ImageDiscovery;
pub use worker::{sidecar_path, write_sidecar};

use std::path::Path;
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;

use crate::backend::{BackendFactory, DefaultBackendFactory};
use crate::config::{Config, ProcessingConfig};
use crate::error::{CaptionError, Result};
use crate::job::{JobProgress, JobTracker};
use crate::registry::{BackendDescriptor, PromptTemplate, Registry};
use crate::selector::ServiceSelector;

use self::worker::JobRun;

/// Entry point for captioning.
pub struct Captioner {
    processing: ProcessingConfig,
    registry: Arc<Registry>,
    selector: Arc<ServiceSelector>,
    jobs: JobTracker,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Captioner {
    /// Create a captioner with the registry and backends described by `config`.
    pub fn new(config: &Config) -> Self {
        let factory = DefaultBackendFactory::new(config.backends.clone());
        Self::with_factory(config, Box::new(factory))
    }

    /// Create a captioner that builds backends with `factory`.
    pub fn with_factory(config: &Config, factory: Box<dyn BackendFactory>) -> Self {
        let registry = Arc::new(Registry::from_config(&config.registry));
        Self {
            processing: config.processing.clone(),
            selector: Arc::new(ServiceSelector::new(registry.clone(), factory)),
            registry,
            jobs: JobTracker::new(),
            worker: Mutex::new(None),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Registered models in listing order.
    pub fn list_models(&self) -> &[BackendDescriptor] {
        self.registry.models()
    }

    /// Registered prompts in listing order.
    pub fn list_prompts(&self) -> &[PromptTemplate] {
        self.registry.prompts()
    }

    /// Make `model_id` the active backend, closing any current one first.
    pub async fn start_service(&self, model_id: &str) -> Result<()> {
        // Validate before tearing down the current backend.
        self.registry.descriptor_for(model_id)?;
        self.selector.close().await;
        self.selector.start(model_id).await
    }

    /// Stop the tracked job and close the active backend. Idempotent.
    pub async fn stop_service(&self) {
        self.stop_job();
        self.selector.close().await;
    }

    /// Descriptor of the active backend, if any.
    pub async fn active_model(&self) -> Option<BackendDescriptor> {
        self.selector.active_model().await
    }

    /// Caption one image with the active backend.
    ///
    /// `prompt` is prompt text, not a key. `append` is added after a space.
    pub async fn caption_one(
        &self,
        image: &Path,
        prompt: &str,
        append: Option<&str>,
    ) -> Result<String> {
        if !image.is_file() {
            return Err(CaptionError::ImageNotFound(image.to_path_buf()));
        }
        let prompt = compose_prompt(prompt, append);
        self.selector.caption(image, &prompt).await
    }

    /// Start a background job captioning every image in `directory`.
    ///
    /// Returns the accepted file names in processing order. The job runs on
    /// its own task; poll [`job_progress`](Self::job_progress) to follow it.
    pub fn caption_directory(
        &self,
        directory: &Path,
        prompt_key: &str,
        append: Option<&str>,
    ) -> Result<Vec<String>> {
        let prompt = compose_prompt(self.registry.prompt_for(prompt_key)?, append);
        let files = ImageDiscovery::new(&self.processing).list(directory)?;
        let job = self.jobs.create(files)?;
        let files = job.files().to_vec();

        tracing::debug!(
            "Accepted {} files from {:?} with prompt '{prompt_key}'",
            files.len(),
            directory
        );

        let run = JobRun {
            selector: self.selector.clone(),
            job,
            directory: directory.to_path_buf(),
            prompt,
            sidecar_extension: self.processing.sidecar_extension.clone(),
        };
        let handle = tokio::spawn(run.run());
        *self.worker.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);

        Ok(files)
    }

    /// Progress of the tracked directory job.
    pub fn job_progress(&self) -> Result<JobProgress> {
        self.jobs.progress()
    }

    /// Detach the tracked job and stop its worker before the next file.
    /// Idempotent.
    pub fn stop_job(&self) {
        if self.jobs.stop() {
            tracing::info!("Directory job stopped");
        }
    }

    /// Wait for the most recently started directory worker to exit.
    pub async fn wait_for_job(&self) {
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!("Directory worker failed: {e}");
            }
        }
    }
}

/// `"{prompt} {append}"`, or just the prompt when there is nothing to append.
fn compose_prompt(prompt: &str, append: Option<&str>) -> String {
    match append.map(str::trim).filter(|a| !a.is_empty()) {
        Some(extra) => format!("{prompt} {extra}"),
        None => prompt.to_string(),
    }
}
