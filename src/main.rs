use anyhow::Result;
use clap::Parser;
use owo_colors::OwoColorize;
use voxloop::cli::Cli;
use voxloop::config::{Config, Credentials, load_instructions};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.list_devices {
        for device in voxloop::audio::capture::list_devices()? {
            println!("{device}");
        }
        return Ok(());
    }

    let mut config = match cli.config.as_deref() {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default(&Config::default_path()),
    }
    .with_env_overrides();

    // Apply CLI overrides
    if let Some(device) = cli.device {
        config.audio.device = Some(device);
    }
    if let Some(path) = cli.instructions {
        config.session.instructions = path;
    }

    // Both fail fast: the pipeline never starts without credentials and
    // the instruction text.
    let credentials = Credentials::from_env()?;
    let instructions = load_instructions(&config.session.instructions)?;

    voxloop::app::run(config, credentials, instructions, cli.quiet, cli.verbose).await?;

    eprintln!("{}", "Goodbye.".green());
    Ok(())
}
