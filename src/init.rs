//! init-config command: Write a settings file with the default timings
//!
//! The file is plain `Settings` YAML, so every value can be edited and
//! passed back with `--config`.

use crate::config::Settings;
use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;

const HEADER: &str = "# dealer-scout settings\n# Times are in seconds. Remove a key to fall back to its default.\n";

#[derive(Args)]
pub struct InitArgs {
    /// Settings file to create
    #[arg(short, long, default_value = "dealer-scout.yaml")]
    pub output: PathBuf,

    /// Replace an existing file
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
pub struct InitOutput {
    pub created: String,
    pub file: String,
    pub throttle_secs: u64,
    pub render_timeout_secs: u64,
}

#[derive(Debug, Serialize)]
struct InitRefusal {
    error: &'static str,
    message: String,
    file: String,
}

pub async fn run_init(args: InitArgs) -> Result<()> {
    let file = args.output.display().to_string();

    if args.output.exists() && !args.force {
        let refusal = InitRefusal {
            error: "file_exists",
            message: format!("{} already exists. Use --force to overwrite.", file),
            file,
        };
        println!("{}", serde_json::to_string(&refusal)?);
        bail!("File exists");
    }

    let settings = Settings::default();
    let yaml = format!("{}{}", HEADER, serde_yaml::to_string(&settings)?);
    tokio::fs::write(&args.output, yaml)
        .await
        .with_context(|| format!("Failed to write {}", file))?;

    let output = InitOutput {
        created: Utc::now().to_rfc3339(),
        file,
        throttle_secs: settings.crawl.throttle_secs,
        render_timeout_secs: settings.render.timeout_secs,
    };
    println!("{}", serde_json::to_string(&output)?);

    Ok(())
}
