//! Background processing of a directory job.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::error::Result;
use crate::job::{DirectoryJob, FileState};
use crate::selector::ServiceSelector;

/// Everything the worker needs, owned so it can run on a spawned task.
pub(crate) struct JobRun {
    pub selector: Arc<ServiceSelector>,
    pub job: Arc<DirectoryJob>,
    pub directory: PathBuf,
    pub prompt: String,
    pub sidecar_extension: String,
}

impl JobRun {
    /// Caption every file of the job in listing order.
    ///
    /// A failed file is recorded as Error and the loop moves on. The job's
    /// cancellation flag is checked before each file.
    pub async fn run(self) {
        let start = Instant::now();
        let total = self.job.total_files();
        tracing::info!("Captioning {} images in {:?}", total, self.directory);

        for (index, file) in self.job.files().iter().enumerate() {
            if self.job.is_cancelled() {
                tracing::info!("Directory job stopped after {index} of {total} files");
                return;
            }

            self.mark(file, FileState::Processing, String::new());
            let image = self.directory.join(file);

            match self.caption_and_persist(&image).await {
                Ok(caption) => {
                    tracing::debug!("[{}/{}] {file}: {caption}", index + 1, total);
                    self.mark(file, FileState::Success, caption);
                }
                Err(e) => {
                    tracing::warn!("[{}/{}] {file}: {e}", index + 1, total);
                    self.mark(file, FileState::Error, e.detail());
                }
            }
        }

        let progress = self.job.progress();
        tracing::info!(
            "Directory job finished in {:.1}s: {} succeeded, {} failed",
            start.elapsed().as_secs_f64(),
            progress.success_count,
            progress.error_count
        );
    }

    async fn caption_and_persist(&self, image: &Path) -> Result<String> {
        let caption = self.selector.caption(image, &self.prompt).await?;
        write_sidecar(image, &self.sidecar_extension, &caption).await?;
        Ok(caption)
    }

    fn mark(&self, file: &str, state: FileState, message: String) {
        if let Err(e) = self.job.update(file, state, message) {
            tracing::error!("Failed to record {state} for {file}: {e}");
        }
    }
}

/// Path of the caption file written next to `image`.
pub fn sidecar_path(image: &Path, extension: &str) -> PathBuf {
    image.with_extension(extension)
}

/// Write `caption` next to `image`, replacing any existing sidecar.
pub async fn write_sidecar(image: &Path, extension: &str, caption: &str) -> Result<PathBuf> {
    let path = sidecar_path(image, extension);
    tokio::fs::write(&path, caption).await?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sidecar_path_replaces_extension() {
        assert_eq!(
            sidecar_path(Path::new("/photos/a.jpg"), "txt"),
            PathBuf::from("/photos/a.txt")
        );
        assert_eq!(
            sidecar_path(Path::new("/photos/archive.tar.png"), "txt"),
            PathBuf::from("/photos/archive.tar.txt")
        );
    }

    #[tokio::test]
    async fn test_write_sidecar_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("a.jpg");
        std::fs::write(dir.path().join("a.txt"), "old caption").unwrap();

        let written = write_sidecar(&image, "txt", "a cat").await.unwrap();
        assert_eq!(written, dir.path().join("a.txt"));
        assert_eq!(std::fs::read_to_string(written).unwrap(), "a cat");
    }
}
