//! vlmcap core - caption images with vision-language models.
//!
//! One model is active at a time. Images are captioned one by one or a whole
//! directory at once, in which case a caption file is written next to every
//! image and progress can be polled while the job runs in the background.
//!
//! # Architecture
//!
//! ```text
//! Registry → ServiceSelector (one active CaptionBackend) → Captioner
//!                                                            ├─ caption_one
//!                                                            └─ caption_directory → JobTracker
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use vlmcap_core::{Captioner, Config};
//!
//! #[tokio::main]
//! async fn main() -> vlmcap_core::Result<()> {
//!     let config = Config::load()?;
//!     let captioner = Captioner::new(&config);
//!
//!     captioner.start_service("Qwen3-VLM-8B-Ollama").await?;
//!     let prompt = captioner.registry().prompt_for("short")?.to_string();
//!     let caption = captioner.caption_one("./cat.jpg".as_ref(), &prompt, None).await?;
//!     println!("{caption}");
//!     captioner.stop_service().await;
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod captioner;
pub mod config;
pub mod error;
pub mod job;
pub mod registry;
pub mod selector;

pub use backend::{BackendFactory, CaptionBackend, DefaultBackendFactory};
pub use captioner::Captioner;
pub use config::Config;
pub use error::{CaptionError, ConfigError, Result};
pub use job::{DirectoryJob, FileState, FileStatus, JobProgress, JobTracker};
pub use registry::{BackendDescriptor, BackendFamily, PromptTemplate, Registry};
pub use selector::{clean_caption, ServiceSelector};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
