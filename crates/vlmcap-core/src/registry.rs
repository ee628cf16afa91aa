//! Backend registry: the catalog of captioning models and prompt templates.
//!
//! The registry is built once (built-in entries plus any extras from the
//! config file) and is read-only afterwards.

use crate::config::RegistryConfig;
use crate::error::{CaptionError, Result};
use serde::{Deserialize, Serialize};

/// Backend family that serves a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendFamily {
    /// Remote stateless chat API served by Ollama
    Ollama,
    /// Local Florence-2 model running on ONNX Runtime
    Florence2,
}

impl BackendFamily {
    /// True for families that hold model weights in this process.
    pub fn is_local(self) -> bool {
        matches!(self, BackendFamily::Florence2)
    }
}

impl std::fmt::Display for BackendFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendFamily::Ollama => write!(f, "ollama"),
            BackendFamily::Florence2 => write!(f, "florence2"),
        }
    }
}

/// A model the user can start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendDescriptor {
    /// Unique registry key
    pub id: String,
    /// Human-readable name
    pub display_name: String,
    /// Family that knows how to run this model
    pub family: BackendFamily,
    /// Model name understood by the family (Ollama tag, Hugging Face repo)
    pub model_id: String,
    /// Description shown in model listings
    pub description: String,
}

/// A named prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptTemplate {
    pub key: String,
    pub text: String,
}

struct BuiltinModel {
    id: &'static str,
    display_name: &'static str,
    family: BackendFamily,
    model_id: &'static str,
    description: &'static str,
}

const BUILTIN_MODELS: &[BuiltinModel] = &[
    BuiltinModel {
        id: "Qwen3-VLM-8B-Ollama",
        display_name: "Qwen3-VLM-8B-Ollama",
        family: BackendFamily::Ollama,
        model_id: "qwen3-vl:8b",
        description: "Qwen3-VLM-8B using local Ollama server.",
    },
    BuiltinModel {
        id: "microsoft/Florence-2-base-ft",
        display_name: "microsoft/Florence-2-base-ft",
        family: BackendFamily::Florence2,
        model_id: "onnx-community/Florence-2-base-ft",
        description: "Local Florence-2 base (fine-tuned) running on ONNX Runtime. \
                      Run `vlmcap models download` first.",
    },
    BuiltinModel {
        id: "MiniCPM-V-2.6-8b-Ollama",
        display_name: "MiniCPM-V 2.6 Ollama",
        family: BackendFamily::Ollama,
        model_id: "minicpm-v:8b",
        description: "Mini-CPM-V-2.6 8B using local Ollama server.",
    },
];

const BUILTIN_PROMPTS: &[(&str, &str)] = &[
    (
        "detailed",
        "Describe the image in detail in one paragraph. Response should be text only without Markdown.",
    ),
    (
        "short",
        "Provide a brief description of the image within 40 words or less.",
    ),
    (
        "tags",
        "Provide a comma delimited list of tags that describe the image in order of relevance.",
    ),
];

/// Read-only catalog of models and prompts.
#[derive(Debug, Clone)]
pub struct Registry {
    models: Vec<BackendDescriptor>,
    prompts: Vec<PromptTemplate>,
}

impl Registry {
    /// Build a registry from explicit entries. Later duplicates replace earlier ones
    /// in place, so listing order follows first appearance.
    pub fn new(models: Vec<BackendDescriptor>, prompts: Vec<PromptTemplate>) -> Self {
        let mut registry = Self {
            models: Vec::with_capacity(models.len()),
            prompts: Vec::with_capacity(prompts.len()),
        };
        for model in models {
            registry.insert_model(model);
        }
        for prompt in prompts {
            registry.insert_prompt(prompt);
        }
        registry
    }

    /// The built-in catalog.
    pub fn builtin() -> Self {
        let models = BUILTIN_MODELS
            .iter()
            .map(|m| BackendDescriptor {
                id: m.id.to_string(),
                display_name: m.display_name.to_string(),
                family: m.family,
                model_id: m.model_id.to_string(),
                description: m.description.to_string(),
            })
            .collect();
        let prompts = BUILTIN_PROMPTS
            .iter()
            .map(|(key, text)| PromptTemplate {
                key: key.to_string(),
                text: text.to_string(),
            })
            .collect();
        Self::new(models, prompts)
    }

    /// The built-in catalog extended with entries from the config file.
    pub fn from_config(config: &RegistryConfig) -> Self {
        let mut registry = Self::builtin();
        for entry in &config.models {
            registry.insert_model(BackendDescriptor {
                id: entry.id.clone(),
                display_name: entry.display_name.clone().unwrap_or_else(|| entry.id.clone()),
                family: entry.family,
                model_id: entry.model_id.clone(),
                description: entry.description.clone(),
            });
        }
        for (key, text) in &config.prompts {
            registry.insert_prompt(PromptTemplate {
                key: key.clone(),
                text: text.clone(),
            });
        }
        registry
    }

    fn insert_model(&mut self, model: BackendDescriptor) {
        match self.models.iter_mut().find(|m| m.id == model.id) {
            Some(existing) => {
                tracing::debug!("Registry entry '{}' overridden", model.id);
                *existing = model;
            }
            None => self.models.push(model),
        }
    }

    fn insert_prompt(&mut self, prompt: PromptTemplate) {
        match self.prompts.iter_mut().find(|p| p.key == prompt.key) {
            Some(existing) => *existing = prompt,
            None => self.prompts.push(prompt),
        }
    }

    /// Look up a model by id.
    pub fn descriptor_for(&self, id: &str) -> Result<&BackendDescriptor> {
        self.models
            .iter()
            .find(|m| m.id == id)
            .ok_or_else(|| CaptionError::UnknownModel(id.to_string()))
    }

    /// Model ids in listing order.
    pub fn list_ids(&self) -> Vec<&str> {
        self.models.iter().map(|m| m.id.as_str()).collect()
    }

    /// All models in listing order.
    pub fn models(&self) -> &[BackendDescriptor] {
        &self.models
    }

    /// Resolve a prompt key to its text.
    pub fn prompt_for(&self, key: &str) -> Result<&str> {
        self.prompts
            .iter()
            .find(|p| p.key == key)
            .map(|p| p.text.as_str())
            .ok_or_else(|| CaptionError::UnknownPrompt(key.to_string()))
    }

    /// All prompts in listing order.
    pub fn prompts(&self) -> &[PromptTemplate] {
        &self.prompts
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelEntry;

    #[test]
    fn test_builtin_ids_in_order() {
        let registry = Registry::builtin();
        assert_eq!(
            registry.list_ids(),
            vec![
                "Qwen3-VLM-8B-Ollama",
                "microsoft/Florence-2-base-ft",
                "MiniCPM-V-2.6-8b-Ollama"
            ]
        );
    }

    #[test]
    fn test_descriptor_for_known_and_unknown() {
        let registry = Registry::builtin();
        let descriptor = registry.descriptor_for("MiniCPM-V-2.6-8b-Ollama").unwrap();
        assert_eq!(descriptor.family, BackendFamily::Ollama);
        assert_eq!(descriptor.model_id, "minicpm-v:8b");

        let err = registry.descriptor_for("gpt-9").unwrap_err();
        assert!(matches!(err, CaptionError::UnknownModel(id) if id == "gpt-9"));
    }

    #[test]
    fn test_prompt_for() {
        let registry = Registry::builtin();
        assert!(registry.prompt_for("short").unwrap().contains("brief"));
        assert!(matches!(
            registry.prompt_for("haiku"),
            Err(CaptionError::UnknownPrompt(_))
        ));
    }

    #[test]
    fn test_from_config_appends_and_overrides() {
        let mut config = RegistryConfig::default();
        config.models.push(ModelEntry {
            id: "Llava-7B-Ollama".into(),
            display_name: None,
            family: BackendFamily::Ollama,
            model_id: "llava:7b".into(),
            description: "LLaVA".into(),
        });
        config
            .prompts
            .insert("short".into(), "One sentence only.".into());

        let registry = Registry::from_config(&config);
        assert_eq!(registry.list_ids().len(), 4);
        assert_eq!(registry.list_ids()[3], "Llava-7B-Ollama");
        assert_eq!(
            registry.descriptor_for("Llava-7B-Ollama").unwrap().display_name,
            "Llava-7B-Ollama"
        );
        assert_eq!(registry.prompt_for("short").unwrap(), "One sentence only.");
        assert_eq!(registry.prompts()[1].key, "short");
    }

    #[test]
    fn test_family_is_local() {
        assert!(BackendFamily::Florence2.is_local());
        assert!(!BackendFamily::Ollama.is_local());
        assert_eq!(BackendFamily::Florence2.to_string(), "florence2");
    }
}
