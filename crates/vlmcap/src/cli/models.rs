//! The `vlmcap models` command for listing and fetching models.

use std::path::Path;

use clap::{Args, Subcommand};
use serde::Serialize;
use vlmcap_core::backend::florence2::{missing_files, model_path, MODEL_FILES};
use vlmcap_core::{BackendDescriptor, BackendFamily, Config, Registry};

/// Arguments for the `models` command.
#[derive(Args, Debug)]
pub struct ModelsArgs {
    #[command(subcommand)]
    pub command: ModelsCommand,
}

/// Subcommands for model management.
#[derive(Subcommand, Debug)]
pub enum ModelsCommand {
    /// List registered models and whether they are ready to use
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Download the files of a local model
    Download {
        /// Model id (see `vlmcap models list`)
        id: String,
    },

    /// Show local model directory path
    Path,
}

/// Install state of a model as shown by `models list`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum ModelStatus {
    /// Served by an Ollama endpoint; pulled outside vlmcap
    Remote,
    Ready,
    NotInstalled,
}

impl std::fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelStatus::Remote => write!(f, "remote"),
            ModelStatus::Ready => write!(f, "ready"),
            ModelStatus::NotInstalled => write!(f, "not installed"),
        }
    }
}

#[derive(Serialize)]
struct ModelRow<'a> {
    id: &'a str,
    family: BackendFamily,
    model_id: &'a str,
    description: &'a str,
    status: ModelStatus,
}

fn status_of(descriptor: &BackendDescriptor, model_dir: &Path) -> ModelStatus {
    match descriptor.family {
        BackendFamily::Ollama => ModelStatus::Remote,
        BackendFamily::Florence2 => {
            if missing_files(&model_path(model_dir, &descriptor.model_id)).is_empty() {
                ModelStatus::Ready
            } else {
                ModelStatus::NotInstalled
            }
        }
    }
}

/// Execute the models command.
pub async fn execute(args: ModelsArgs, config: &Config) -> anyhow::Result<()> {
    let registry = Registry::from_config(&config.registry);
    let model_dir = config.model_dir();

    match args.command {
        ModelsCommand::List { json } => {
            let rows: Vec<ModelRow> = registry
                .models()
                .iter()
                .map(|m| ModelRow {
                    id: &m.id,
                    family: m.family,
                    model_id: &m.model_id,
                    description: &m.description,
                    status: status_of(m, &model_dir),
                })
                .collect();

            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
                return Ok(());
            }

            println!("Models:");
            println!("  Local model directory: {}\n", model_dir.display());
            for row in &rows {
                println!("  - {:32} {:10} {}", row.id, row.family.to_string(), row.status);
                println!("      {}", row.description);
            }
        }

        ModelsCommand::Download { id } => {
            let descriptor = registry.descriptor_for(&id)?;
            if !descriptor.family.is_local() {
                anyhow::bail!(
                    "'{}' is served by Ollama. Pull it there instead: ollama pull {}",
                    descriptor.id,
                    descriptor.model_id
                );
            }

            let client = reqwest::Client::new();
            download_model(&client, &descriptor.model_id, &model_dir).await?;
            tracing::info!("All downloads complete.");
        }

        ModelsCommand::Path => {
            println!("{}", model_dir.display());
        }
    }

    Ok(())
}

/// Download every file of a Florence-2 export from Hugging Face.
///
/// Skips files already present.
async fn download_model(
    client: &reqwest::Client,
    repo: &str,
    model_dir: &Path,
) -> anyhow::Result<()> {
    let dest_dir = model_path(model_dir, repo);
    std::fs::create_dir_all(&dest_dir)?;

    for (remote, local) in MODEL_FILES {
        let dest = dest_dir.join(local);
        if dest.exists() {
            tracing::info!("{} already exists at {:?}", local, dest);
            continue;
        }

        let url = huggingface_url(repo, remote);
        tracing::info!("Downloading {}...", local);
        tracing::info!("  Source: {}", url);
        tracing::info!("  Destination: {:?}", dest);

        download_file(client, &url, &dest).await?;

        let file_size = std::fs::metadata(&dest)?.len();
        tracing::info!(
            "  {} complete ({:.1} MB)",
            local,
            file_size as f64 / (1024.0 * 1024.0)
        );
    }

    Ok(())
}

fn huggingface_url(repo: &str, remote_path: &str) -> String {
    format!("https://huggingface.co/{repo}/resolve/main/{remote_path}")
}

/// Download a file from a URL to a local path, streaming to disk.
///
/// Writes to a `.part` file first and renames on success, so an interrupted
/// download is never mistaken for a complete one.
async fn download_file(client: &reqwest::Client, url: &str, dest: &Path) -> anyhow::Result<()> {
    use futures_util::StreamExt;
    use tokio::io::AsyncWriteExt;

    let response = client
        .get(url)
        .send()
        .await?
        .error_for_status()
        .map_err(|e| anyhow::anyhow!("Download failed: {e}"))?;

    let total_size = response.content_length();
    if let Some(size) = total_size {
        tracing::info!("  Size: {:.1} MB", size as f64 / (1024.0 * 1024.0));
    }

    let partial = partial_path(dest);
    let mut file = tokio::fs::File::create(&partial).await?;
    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        downloaded += chunk.len() as u64;

        if let Some(total) = total_size {
            if downloaded % (50 * 1024 * 1024) < chunk.len() as u64 {
                tracing::info!(
                    "  Progress: {:.0}%",
                    downloaded as f64 / total as f64 * 100.0
                );
            }
        }
    }

    file.flush().await?;
    drop(file);
    tokio::fs::rename(&partial, dest).await?;
    Ok(())
}

fn partial_path(dest: &Path) -> std::path::PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_huggingface_url() {
        assert_eq!(
            huggingface_url("onnx-community/Florence-2-base-ft", "onnx/encoder_model.onnx"),
            "https://huggingface.co/onnx-community/Florence-2-base-ft/resolve/main/onnx/encoder_model.onnx"
        );
    }

    #[test]
    fn test_partial_path_keeps_extension() {
        assert_eq!(
            partial_path(Path::new("/models/x/decoder_model.onnx")),
            Path::new("/models/x/decoder_model.onnx.part")
        );
    }

    #[test]
    fn test_status_of_each_family() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::builtin();

        let ollama = registry.descriptor_for("Qwen3-VLM-8B-Ollama").unwrap();
        assert_eq!(status_of(ollama, dir.path()), ModelStatus::Remote);

        let florence = registry
            .descriptor_for("microsoft/Florence-2-base-ft")
            .unwrap();
        assert_eq!(status_of(florence, dir.path()), ModelStatus::NotInstalled);

        let model_dir = model_path(dir.path(), &florence.model_id);
        std::fs::create_dir_all(&model_dir).unwrap();
        for (_, local) in MODEL_FILES {
            std::fs::write(model_dir.join(local), b"x").unwrap();
        }
        assert_eq!(status_of(florence, dir.path()), ModelStatus::Ready);
    }
}
