use anyhow::{Context, Result};
use clap::Subcommand;

use crate::models::Config;

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    #[command(about = "Write a default configuration file")]
    Init {
        #[arg(long, short = 'f', help = "Force overwrite existing config")]
        force: bool,
    },
    #[command(about = "Show the resolved configuration")]
    Show,
    #[command(about = "Show the configuration file path")]
    Path,
}

pub async fn handle_config(cmd: ConfigCommand, _verbose: bool) -> Result<()> {
    match cmd {
        ConfigCommand::Init { force } => handle_init(force),
        ConfigCommand::Show => handle_show(),
        ConfigCommand::Path => handle_path(),
    }
}

fn handle_init(force: bool) -> Result<()> {
    let path = Config::config_path()
        .ok_or_else(|| anyhow::anyhow!("could not determine config directory"))?;

    if path.exists() && !force {
        anyhow::bail!(
            "Config already exists at: {}\nUse --force to overwrite.",
            path.display()
        );
    }

    Config::default()
        .save()
        .context("failed to write config file")?;
    println!("Created config at: {}", path.display());

    Ok(())
}

fn handle_show() -> Result<()> {
    let mut config = Config::load()?;

    // Secrets never hit stdout
    if config.embedding.api_key.is_some() {
        config.embedding.api_key = Some("********".to_string());
    }
    if config.vector_store.api_key.is_some() {
        config.vector_store.api_key = Some("********".to_string());
    }

    if let Some(path) = Config::config_path()
        && path.exists()
    {
        println!("# Config file: {}", path.display());
        println!();
    }
    print!("{}", toml::to_string_pretty(&config)?);

    Ok(())
}

fn handle_path() -> Result<()> {
    let path = Config::config_path()
        .ok_or_else(|| anyhow::anyhow!("could not determine config directory"))?;

    if path.exists() {
        println!("Config file (active): {}", path.display());
    } else {
        println!("Config file (would be): {}", path.display());
    }

    Ok(())
}
