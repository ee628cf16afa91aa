//! Sub-configuration structs with their defaults.

use crate::registry::BackendFamily;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Directory listing and sidecar settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Image extensions accepted by directory jobs (case-insensitive)
    pub supported_formats: Vec<String>,

    /// Extension of the caption file written next to each image
    pub sidecar_extension: String,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            supported_formats: ["jpg", "jpeg", "png", "bmp", "gif", "tiff", "webp"]
                .into_iter()
                .map(String::from)
                .collect(),
            sidecar_extension: "txt".to_string(),
        }
    }
}

/// Per-family backend settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendsConfig {
    /// Ollama (remote chat) settings
    pub ollama: OllamaConfig,

    /// Florence-2 (local ONNX) settings
    pub florence2: Florence2Config,
}

/// Ollama configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    /// Ollama API endpoint
    pub endpoint: String,

    /// HTTP timeout for one chat request, in seconds
    pub request_timeout_secs: u64,

    /// Check that the endpoint answers when the backend is started
    pub check_on_load: bool,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            // Vision models running locally can be slow
            request_timeout_secs: 300,
            check_on_load: true,
        }
    }
}

/// Florence-2 configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Florence2Config {
    /// Directory holding one subdirectory per downloaded model
    pub model_dir: PathBuf,

    /// Upper bound on generated tokens per caption
    pub max_new_tokens: usize,
}

impl Default for Florence2Config {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("~/.vlmcap/models"),
            max_new_tokens: 1024,
        }
    }
}

/// Extra registry entries appended to the built-in catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Additional models
    pub models: Vec<ModelEntry>,

    /// Additional prompts, keyed by prompt key
    pub prompts: BTreeMap<String, String>,
}

/// A model declared in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEntry {
    /// Registry id
    pub id: String,

    /// Human-readable name (defaults to the id)
    #[serde(default)]
    pub display_name: Option<String>,

    /// Backend family serving this model
    pub family: BackendFamily,

    /// Model name understood by the backend
    pub model_id: String,

    /// Description shown in model listings
    #[serde(default)]
    pub description: String,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
