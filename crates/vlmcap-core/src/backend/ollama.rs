//! Ollama backend for vision models served over the local chat API.
//!
//! Stateless: every caption is one self-contained `/api/chat` request, so
//! `load` only checks that the server answers. `close` asks Ollama to evict
//! the model from memory.

use super::CaptionBackend;
use crate::config::OllamaConfig;
use crate::error::{CaptionError, Result};
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, Instant};

/// Ollama chat backend.
pub struct OllamaBackend {
    endpoint: String,
    model: String,
    client: reqwest::Client,
    request_timeout: Duration,
    check_on_load: bool,
    loaded: bool,
}

impl OllamaBackend {
    pub fn new(config: &OllamaConfig, model: &str) -> Self {
        Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client: reqwest::Client::new(),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            check_on_load: config.check_on_load,
            loaded: false,
        }
    }

    fn chat_request(&self, prompt: &str, image_b64: String) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
                images: vec![image_b64],
            }],
            stream: false,
        }
    }
}

/// Ollama /api/chat request body.
#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
    images: Vec<String>,
}

/// Ollama /api/chat response.
#[derive(Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

/// Ollama /api/tags response.
#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Deserialize)]
struct TagEntry {
    name: String,
}

/// Ollama /api/generate body used to unload a model.
#[derive(Serialize)]
struct UnloadRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    keep_alive: u32,
}

#[async_trait]
impl CaptionBackend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn load(&mut self) -> Result<()> {
        if self.check_on_load {
            let url = format!("{}/api/tags", self.endpoint);
            let unavailable = |message: String| CaptionError::BackendUnavailable {
                backend: format!("ollama:{}", self.model),
                message,
            };

            let resp = self
                .client
                .get(&url)
                .timeout(Duration::from_secs(5))
                .send()
                .await
                .map_err(|e| unavailable(format!("Ollama not reachable at {}: {e}", self.endpoint)))?;

            if !resp.status().is_success() {
                return Err(unavailable(format!("Ollama HTTP {}", resp.status())));
            }

            match resp.json::<TagsResponse>().await {
                Ok(tags) if !tags.models.iter().any(|m| m.name == self.model) => {
                    tracing::warn!(
                        "Model '{}' is not pulled on {}; the first caption will wait for a pull \
                         or fail",
                        self.model,
                        self.endpoint
                    );
                }
                Ok(_) => {}
                Err(e) => tracing::debug!("Could not parse Ollama model list: {e}"),
            }
        }

        // Nothing to hold in memory: each chat call is self-contained.
        self.loaded = true;
        tracing::info!("Ollama backend ready ({} at {})", self.model, self.endpoint);
        Ok(())
    }

    async fn infer(&self, image: &Path, prompt: &str) -> Result<String> {
        let bytes = tokio::fs::read(image)
            .await
            .map_err(|e| CaptionError::inference(format!("Failed to read image: {e}")))?;
        let image_b64 = base64::engine::general_purpose::STANDARD.encode(&bytes);

        let url = format!("{}/api/chat", self.endpoint);
        let start = Instant::now();

        let resp = self
            .client
            .post(&url)
            .json(&self.chat_request(prompt, image_b64))
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| CaptionError::inference(format!("Ollama request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(CaptionError::inference(format!(
                "Ollama HTTP {status}: {text}"
            )));
        }

        let chat: ChatResponse = resp.json().await.map_err(|e| {
            CaptionError::inference(format!("Failed to parse Ollama response: {e}"))
        })?;

        let text = chat.message.content.trim().to_string();
        if text.is_empty() {
            return Err(CaptionError::inference(
                "Ollama returned empty response, no content generated",
            ));
        }

        tracing::debug!(
            "Ollama captioned {:?} in {}ms",
            image,
            start.elapsed().as_millis()
        );
        Ok(text)
    }

    async fn close(&mut self) {
        if !self.loaded {
            return;
        }
        self.loaded = false;

        let url = format!("{}/api/generate", self.endpoint);
        let body = UnloadRequest {
            model: &self.model,
            prompt: "",
            keep_alive: 0,
        };
        match self
            .client
            .post(&url)
            .json(&body)
            .timeout(Duration::from_secs(10))
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => {
                tracing::info!("Ollama unloaded {}", self.model);
            }
            Ok(resp) => tracing::warn!("Ollama unload of {} returned {}", self.model, resp.status()),
            Err(e) => tracing::warn!("Ollama unload of {} failed: {e}", self.model),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_config() -> OllamaConfig {
        OllamaConfig {
            // Port 9 (discard) refuses connections on test machines
            endpoint: "http://127.0.0.1:9/".to_string(),
            request_timeout_secs: 2,
            check_on_load: true,
        }
    }

    #[test]
    fn test_endpoint_trailing_slash_trimmed() {
        let backend = OllamaBackend::new(&unreachable_config(), "qwen3-vl:8b");
        assert_eq!(backend.endpoint, "http://127.0.0.1:9");
    }

    #[test]
    fn test_chat_request_shape() {
        let backend = OllamaBackend::new(&OllamaConfig::default(), "minicpm-v:8b");
        let body = serde_json::to_value(backend.chat_request("Describe", "AAAA".into())).unwrap();
        assert_eq!(body["model"], "minicpm-v:8b");
        assert_eq!(body["stream"], false);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "Describe");
        assert_eq!(body["messages"][0]["images"][0], "AAAA");
    }

    #[test]
    fn test_chat_response_parses() {
        let raw = r#"{"model":"qwen3-vl:8b","message":{"role":"assistant","content":" a cat "},"done":true}"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.message.content, " a cat ");
    }

    #[tokio::test]
    async fn test_load_unreachable_is_unavailable() {
        let mut backend = OllamaBackend::new(&unreachable_config(), "qwen3-vl:8b");
        let err = backend.load().await.unwrap_err();
        assert!(matches!(err, CaptionError::BackendUnavailable { .. }), "{err}");
        assert!(!backend.loaded);
    }

    #[tokio::test]
    async fn test_load_without_check_succeeds() {
        let config = OllamaConfig {
            check_on_load: false,
            ..unreachable_config()
        };
        let mut backend = OllamaBackend::new(&config, "qwen3-vl:8b");
        backend.load().await.unwrap();
        assert!(backend.loaded);
    }

    #[tokio::test]
    async fn test_infer_missing_image_is_inference_error() {
        let backend = OllamaBackend::new(&unreachable_config(), "qwen3-vl:8b");
        let err = backend
            .infer(Path::new("/nonexistent/ghost.jpg"), "Describe")
            .await
            .unwrap_err();
        assert!(err.detail().contains("Failed to read image"), "{err}");
    }

    #[tokio::test]
    async fn test_infer_unreachable_is_inference_error() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("a.jpg");
        std::fs::write(&image, [0xFF, 0xD8, 0xFF]).unwrap();

        let backend = OllamaBackend::new(&unreachable_config(), "qwen3-vl:8b");
        let err = backend.infer(&image, "Describe").await.unwrap_err();
        assert!(matches!(err, CaptionError::Inference { .. }));
        assert!(err.detail().contains("Ollama request failed"), "{err}");
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let mut backend = OllamaBackend::new(&unreachable_config(), "qwen3-vl:8b");
        backend.close().await;
        backend.close().await;
        assert!(!backend.loaded);
    }
}
