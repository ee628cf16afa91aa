//! The `vlmcap prompts` command.

use std::collections::BTreeMap;

use clap::Args;
use vlmcap_core::{Config, Registry};

/// Arguments for the `prompts` command.
#[derive(Args, Debug)]
pub struct PromptsArgs {
    /// Print a JSON object of key → text
    #[arg(long)]
    pub json: bool,
}

pub fn execute(args: PromptsArgs, config: &Config) -> anyhow::Result<()> {
    let registry = Registry::from_config(&config.registry);

    if args.json {
        let map: BTreeMap<&str, &str> = registry
            .prompts()
            .iter()
            .map(|p| (p.key.as_str(), p.text.as_str()))
            .collect();
        println!("{}", serde_json::to_string_pretty(&map)?);
        return Ok(());
    }

    for prompt in registry.prompts() {
        println!("{:10} {}", prompt.key, prompt.text);
    }
    Ok(())
}
