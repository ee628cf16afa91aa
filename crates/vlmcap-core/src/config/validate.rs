//! Configuration validation.

use crate::error::ConfigError;

use super::Config;

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.processing.supported_formats.is_empty() {
            return Err(ConfigError::ValidationError(
                "processing.supported_formats must not be empty".into(),
            ));
        }
        let sidecar = &self.processing.sidecar_extension;
        if sidecar.is_empty() || sidecar.contains('.') || sidecar.contains('/') {
            return Err(ConfigError::ValidationError(
                "processing.sidecar_extension must be a bare extension like \"txt\"".into(),
            ));
        }
        if self
            .processing
            .supported_formats
            .iter()
            .any(|fmt| fmt.eq_ignore_ascii_case(sidecar))
        {
            return Err(ConfigError::ValidationError(
                "processing.sidecar_extension must not be an image format".into(),
            ));
        }
        if self.backends.ollama.endpoint.is_empty() {
            return Err(ConfigError::ValidationError(
                "backends.ollama.endpoint must not be empty".into(),
            ));
        }
        if self.backends.ollama.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "backends.ollama.request_timeout_secs must be > 0".into(),
            ));
        }
        if self.backends.florence2.max_new_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "backends.florence2.max_new_tokens must be > 0".into(),
            ));
        }
        for model in &self.registry.models {
            if model.id.is_empty() || model.model_id.is_empty() {
                return Err(ConfigError::ValidationError(
                    "registry.models entries need a non-empty id and model_id".into(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_passes_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_formats() {
        let mut config = Config::default();
        config.processing.supported_formats.clear();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("supported_formats"));
    }

    #[test]
    fn test_validate_rejects_dotted_sidecar_extension() {
        let mut config = Config::default();
        config.processing.sidecar_extension = ".txt".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("sidecar_extension"));
    }

    #[test]
    fn test_validate_rejects_image_sidecar_extension() {
        let mut config = Config::default();
        config.processing.sidecar_extension = "PNG".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("image format"));
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = Config::default();
        config.backends.ollama.request_timeout_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("request_timeout_secs"));
    }

    #[test]
    fn test_validate_rejects_zero_max_tokens() {
        let mut config = Config::default();
        config.backends.florence2.max_new_tokens = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_new_tokens"));
    }
}
