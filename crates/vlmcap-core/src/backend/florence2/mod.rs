//! Local Florence-2 backend running on ONNX Runtime.
//!
//! Stateful: `load` reads the exported graphs and tokenizer into memory and
//! holds them until `close`. Inference is CPU/GPU bound and runs on the
//! blocking thread pool.

mod model;
mod preprocess;
mod task;

pub use task::Florence2Task;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use self::model::Florence2Model;
use super::CaptionBackend;
use crate::config::{expand_path, Florence2Config};
use crate::error::{CaptionError, Result};

pub const VISION_ENCODER_FILE: &str = "vision_encoder.onnx";
pub const EMBED_TOKENS_FILE: &str = "embed_tokens.onnx";
pub const ENCODER_FILE: &str = "encoder_model.onnx";
pub const DECODER_FILE: &str = "decoder_model.onnx";
pub const TOKENIZER_FILE: &str = "tokenizer.json";

/// Files a Florence-2 model directory must contain, as
/// `(path in the Hugging Face repo, local file name)`.
pub const MODEL_FILES: &[(&str, &str)] = &[
    ("onnx/vision_encoder.onnx", VISION_ENCODER_FILE),
    ("onnx/embed_tokens.onnx", EMBED_TOKENS_FILE),
    ("onnx/encoder_model.onnx", ENCODER_FILE),
    ("onnx/decoder_model.onnx", DECODER_FILE),
    ("tokenizer.json", TOKENIZER_FILE),
];

/// Directory holding the files of `model_id` under `model_dir`.
///
/// `onnx-community/Florence-2-base-ft` lands in
/// `{model_dir}/onnx-community--Florence-2-base-ft`.
pub fn model_path(model_dir: &Path, model_id: &str) -> PathBuf {
    model_dir.join(model_id.replace('/', "--"))
}

/// Local files of `MODEL_FILES` that are missing from `dir`.
pub fn missing_files(dir: &Path) -> Vec<&'static str> {
    MODEL_FILES
        .iter()
        .map(|(_, local)| *local)
        .filter(|local| !dir.join(local).exists())
        .collect()
}

/// Florence-2 backend.
pub struct Florence2Backend {
    model_id: String,
    model_dir: PathBuf,
    max_new_tokens: usize,
    model: Option<Arc<Florence2Model>>,
}

impl Florence2Backend {
    pub fn new(config: &Florence2Config, model_id: &str) -> Self {
        Self {
            model_id: model_id.to_string(),
            model_dir: model_path(&expand_path(&config.model_dir), model_id),
            max_new_tokens: config.max_new_tokens,
            model: None,
        }
    }
}

#[async_trait]
impl CaptionBackend for Florence2Backend {
    fn name(&self) -> &str {
        "florence2"
    }

    async fn load(&mut self) -> Result<()> {
        if self.model.is_some() {
            return Ok(());
        }

        let missing = missing_files(&self.model_dir);
        if !missing.is_empty() {
            return Err(CaptionError::BackendUnavailable {
                backend: format!("florence2:{}", self.model_id),
                message: format!(
                    "Missing {} in {:?}. Run `vlmcap models download` first.",
                    missing.join(", "),
                    self.model_dir
                ),
            });
        }

        tracing::info!("Loading Florence-2 model from {:?}", self.model_dir);
        let dir = self.model_dir.clone();
        let max_new_tokens = self.max_new_tokens;
        let model = tokio::task::spawn_blocking(move || Florence2Model::load(&dir, max_new_tokens))
            .await
            .map_err(|e| CaptionError::BackendUnavailable {
                backend: format!("florence2:{}", self.model_id),
                message: format!("Model loading task failed: {e}"),
            })??;

        self.model = Some(Arc::new(model));
        tracing::info!("Florence-2 model loaded successfully");
        Ok(())
    }

    async fn infer(&self, image: &Path, prompt: &str) -> Result<String> {
        let model = self
            .model
            .clone()
            .ok_or_else(|| CaptionError::inference("Model has not been loaded"))?;

        let task = Florence2Task::from_prompt(prompt);
        let path = image.to_path_buf();
        tracing::debug!("Florence-2 {} on {:?}", task.token(), path);

        let caption = tokio::task::spawn_blocking(move || {
            let decoded = image::open(&path)
                .map_err(|e| CaptionError::inference(format!("Failed to open image: {e}")))?;
            model.generate(&decoded, task)
        })
        .await
        .map_err(|e| CaptionError::inference(format!("Inference task failed: {e}")))??;

        if caption.is_empty() {
            return Err(CaptionError::inference(format!(
                "Florence-2 produced no output for {}",
                task.token()
            )));
        }
        Ok(caption)
    }

    async fn close(&mut self) {
        // Dropping the sessions frees the runtime's memory.
        if self.model.take().is_some() {
            tracing::info!("Florence-2 model unloaded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend_in(dir: &Path) -> Florence2Backend {
        let config = Florence2Config {
            model_dir: dir.to_path_buf(),
            max_new_tokens: 8,
        };
        Florence2Backend::new(&config, "onnx-community/Florence-2-base-ft")
    }

    #[test]
    fn test_model_path_flattens_repo_id() {
        let path = model_path(Path::new("/models"), "onnx-community/Florence-2-base-ft");
        assert_eq!(
            path,
            PathBuf::from("/models/onnx-community--Florence-2-base-ft")
        );
    }

    #[test]
    fn test_missing_files_lists_everything_for_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(missing_files(dir.path()).len(), MODEL_FILES.len());

        std::fs::write(dir.path().join(TOKENIZER_FILE), "{}").unwrap();
        let missing = missing_files(dir.path());
        assert_eq!(missing.len(), MODEL_FILES.len() - 1);
        assert!(!missing.contains(&TOKENIZER_FILE));
    }

    #[tokio::test]
    async fn test_load_without_files_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = backend_in(dir.path());
        let err = backend.load().await.unwrap_err();
        match err {
            CaptionError::BackendUnavailable { message, .. } => {
                assert!(message.contains("vlmcap models download"), "{message}");
            }
            other => panic!("Expected BackendUnavailable, got {other}"),
        }
        assert!(backend.model.is_none());
    }

    #[tokio::test]
    async fn test_infer_before_load_fails() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend_in(dir.path());
        let err = backend
            .infer(Path::new("a.jpg"), "Describe in detail")
            .await
            .unwrap_err();
        assert!(matches!(err, CaptionError::Inference { .. }));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = backend_in(dir.path());
        backend.close().await;
        backend.close().await;
        assert!(backend.model.is_none());
    }
}
