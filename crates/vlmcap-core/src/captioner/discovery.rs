//! Image listing for directory jobs.

use std::path::Path;
use walkdir::WalkDir;

use crate::config::ProcessingConfig;
use crate::error::{CaptionError, Result};

/// Finds captionable images directly inside a directory.
pub struct ImageDiscovery {
    supported_formats: Vec<String>,
}

impl ImageDiscovery {
    pub fn new(config: &ProcessingConfig) -> Self {
        Self {
            supported_formats: config
                .supported_formats
                .iter()
                .map(|f| f.to_lowercase())
                .collect(),
        }
    }

    /// List image file names in `dir`, sorted by name.
    ///
    /// Subdirectories are not descended into. Fails with `InvalidDirectory`
    /// if `dir` is missing or not a directory.
    pub fn list(&self, dir: &Path) -> Result<Vec<String>> {
        if !dir.is_dir() {
            return Err(CaptionError::InvalidDirectory(dir.to_path_buf()));
        }

        let mut files: Vec<String> = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && self.is_supported(e.path()))
            .filter_map(|e| match e.file_name().to_str() {
                Some(name) => Some(name.to_string()),
                None => {
                    tracing::warn!("Skipping {:?}: file name is not valid UTF-8", e.path());
                    None
                }
            })
            .collect();

        files.sort();
        Ok(files)
    }

    /// Check if a file has a supported extension.
    fn is_supported(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                let ext_lower = ext.to_lowercase();
                self.supported_formats.iter().any(|fmt| *fmt == ext_lower)
            })
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn discovery() -> ImageDiscovery {
        ImageDiscovery::new(&ProcessingConfig::default())
    }

    #[test]
    fn test_is_supported() {
        let discovery = discovery();
        for name in ["a.jpg", "a.JPG", "a.jpeg", "a.png", "a.bmp", "a.gif", "a.tiff", "a.webp"] {
            assert!(discovery.is_supported(Path::new(name)), "{name}");
        }
        assert!(!discovery.is_supported(Path::new("a.txt")));
        assert!(!discovery.is_supported(Path::new("a.heic")));
        assert!(!discovery.is_supported(Path::new("jpg")));
    }

    #[test]
    fn test_lists_only_images_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["c.webp", "a.jpg", "b.PNG", "notes.txt"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }

        let files = discovery().list(dir.path()).unwrap();
        assert_eq!(files, vec!["a.jpg", "b.PNG", "c.webp"]);
    }

    #[test]
    fn test_does_not_recurse() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("top.jpg"), b"x").unwrap();
        fs::create_dir(dir.path().join("nested.jpg")).unwrap();
        fs::write(dir.path().join("nested.jpg").join("inner.jpg"), b"x").unwrap();

        let files = discovery().list(dir.path()).unwrap();
        assert_eq!(files, vec!["top.jpg"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_skips_non_utf8_names() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("ok.jpg"), b"x").unwrap();
        let bad = OsStr::from_bytes(b"bad\xff.jpg");
        if fs::write(dir.path().join(bad), b"x").is_err() {
            // Filesystem rejects non-UTF-8 names.
            return;
        }

        let files = discovery().list(dir.path()).unwrap();
        assert_eq!(files, vec!["ok.jpg"]);
    }

    #[test]
    fn test_missing_directory_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            discovery().list(&missing),
            Err(CaptionError::InvalidDirectory(p)) if p == missing
        ));
    }

    #[test]
    fn test_file_is_not_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.jpg");
        fs::write(&file, b"x").unwrap();
        assert!(matches!(
            discovery().list(&file),
            Err(CaptionError::InvalidDirectory(_))
        ));
    }
}
