//! The `vlmcap caption` command.

use std::path::PathBuf;

use clap::Args;
use serde::Serialize;
use vlmcap_core::{Captioner, Config};

use super::expand;

/// Arguments for the `caption` command.
#[derive(Args, Debug)]
pub struct CaptionArgs {
    /// Image to caption
    pub image: PathBuf,

    /// Model id (see `vlmcap models list`)
    #[arg(short, long)]
    pub model: String,

    /// Prompt key (see `vlmcap prompts`)
    #[arg(short, long, default_value = "detailed")]
    pub prompt: String,

    /// Extra text appended to the prompt
    #[arg(short, long)]
    pub append: Option<String>,

    /// Print a JSON object instead of the bare caption
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct CaptionOutput<'a> {
    file: &'a str,
    model: &'a str,
    prompt: &'a str,
    caption: &'a str,
}

pub async fn execute(args: CaptionArgs, config: &Config) -> anyhow::Result<()> {
    let image = expand(&args.image);
    let captioner = Captioner::new(config);
    let prompt = captioner.registry().prompt_for(&args.prompt)?.to_string();

    captioner.start_service(&args.model).await?;
    let result = captioner
        .caption_one(&image, &prompt, args.append.as_deref())
        .await;
    captioner.stop_service().await;
    let caption = result?;

    if args.json {
        let file = image.to_string_lossy();
        let output = CaptionOutput {
            file: &file,
            model: &args.model,
            prompt: &args.prompt,
            caption: &caption,
        };
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!("{caption}");
    }
    Ok(())
}
