//! Command handlers.

pub mod caption;
pub mod config;
pub mod directory;
pub mod models;
pub mod prompts;

use std::path::{Path, PathBuf};

/// Expand a leading `~` in a user-supplied path.
pub fn expand(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned())
}
