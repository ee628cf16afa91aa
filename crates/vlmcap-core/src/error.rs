//! Error types for vlmcap.
//!
//! Client errors (bad identifiers, bad paths), sequencing errors (captioning
//! before a backend is started) and backend failures are kept apart so the
//! outer layer can map each to the right response.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for vlmcap operations.
#[derive(Error, Debug)]
pub enum CaptionError {
    /// Model id is not in the registry
    #[error("Unknown model '{0}'")]
    UnknownModel(String),

    /// Prompt key is not in the registry
    #[error("Unknown prompt '{0}'")]
    UnknownPrompt(String),

    /// The backend's runtime, hardware, or endpoint is missing
    #[error("Backend '{backend}' unavailable: {message}")]
    BackendUnavailable { backend: String, message: String },

    /// Captioning was requested before any backend was started
    #[error("No service model has been started")]
    NoActiveBackend,

    /// Backend-level failure for one image
    #[error("Inference failed: {message}")]
    Inference { message: String },

    /// Image path given to a single caption request does not exist
    #[error("Image not found: {0}")]
    ImageNotFound(PathBuf),

    /// Directory path does not exist or is not a directory
    #[error("Directory '{0}' does not exist or is not a directory")]
    InvalidDirectory(PathBuf),

    /// A directory job is still running
    #[error("A captioning job is already in progress")]
    JobAlreadyInProgress,

    /// No directory job is tracked
    #[error("No captioning job is in progress")]
    NoJobInProgress,

    /// Status update for a file that is not part of the tracked job
    #[error("File '{0}' is not part of the current job")]
    UnknownJobFile(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CaptionError {
    /// Shorthand for an inference failure.
    pub fn inference(message: impl Into<String>) -> Self {
        Self::Inference {
            message: message.into(),
        }
    }

    /// The bare failure message, as recorded in a directory job's file status.
    ///
    /// Inference failures carry their backend message without the
    /// "Inference failed" prefix; everything else uses its display form.
    pub fn detail(&self) -> String {
        match self {
            Self::Inference { message } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Convenience type alias for vlmcap results.
pub type Result<T> = std::result::Result<T, CaptionError>;
